//! GEMM against a naive triple loop, bit for bit.

use nchwc_kernels::{sgemm, Sequential, Transpose, WorkSplitter};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MULTIPLIERS: [f32; 6] = [0.0, -0.0, 0.25, -0.5, 1.0, -1.0];

struct Case {
    trans_a: Transpose,
    trans_b: Transpose,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    beta: f32,
}

impl Case {
    fn stored_a(&self) -> (usize, usize) {
        match self.trans_a {
            Transpose::NoTrans => (self.m, self.k),
            Transpose::Trans => (self.k, self.m),
        }
    }

    fn stored_b(&self) -> (usize, usize) {
        match self.trans_b {
            Transpose::NoTrans => (self.k, self.n),
            Transpose::Trans => (self.n, self.k),
        }
    }
}

fn random_buffer(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-4.0f32..4.0)).collect()
}

fn reference(case: &Case, a: &[f32], lda: usize, b: &[f32], ldb: usize, c: &mut [f32], ldc: usize) {
    for i in 0..case.m {
        for j in 0..case.n {
            let mut sum = 0.0f32;
            for p in 0..case.k {
                let av = match case.trans_a {
                    Transpose::NoTrans => a[i * lda + p],
                    Transpose::Trans => a[p * lda + i],
                };
                let bv = match case.trans_b {
                    Transpose::NoTrans => b[p * ldb + j],
                    Transpose::Trans => b[j * ldb + p],
                };
                sum += av * bv;
            }
            let out = &mut c[i * ldc + j];
            *out = (*out * case.beta) + (sum * case.alpha);
        }
    }
}

/// Run one case with padded leading dimensions and compare every element of C,
/// including the padding columns that must stay untouched.
fn check(case: &Case, rng: &mut StdRng, ctx: Option<&dyn WorkSplitter>) {
    let (ar, ac) = case.stored_a();
    let (br, bc) = case.stored_b();
    let (lda, ldb, ldc) = (ac + 3, bc + 1, case.n + 2);
    let a = random_buffer(rng, ar * lda);
    let b = random_buffer(rng, br * ldb);
    let mut expected = random_buffer(rng, case.m * ldc);
    let mut actual = expected.clone();

    reference(case, &a, lda, &b, ldb, &mut expected, ldc);
    sgemm(
        case.trans_a,
        case.trans_b,
        case.m,
        case.n,
        case.k,
        case.alpha,
        &a,
        lda,
        &b,
        ldb,
        case.beta,
        &mut actual,
        ldc,
        ctx,
    );

    for (i, (e, g)) in expected.iter().zip(actual.iter()).enumerate() {
        assert_eq!(
            e.to_bits(),
            g.to_bits(),
            "{:?}/{:?} m={} n={} k={} alpha={} beta={}: element {} expected {} got {}",
            case.trans_a,
            case.trans_b,
            case.m,
            case.n,
            case.k,
            case.alpha,
            case.beta,
            i,
            e,
            g
        );
    }
}

const TRANSPOSES: [(Transpose, Transpose); 4] = [
    (Transpose::NoTrans, Transpose::NoTrans),
    (Transpose::NoTrans, Transpose::Trans),
    (Transpose::Trans, Transpose::NoTrans),
    (Transpose::Trans, Transpose::Trans),
];

#[test]
fn test_all_transposes_and_multipliers() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for &(trans_a, trans_b) in &TRANSPOSES {
        for &alpha in &MULTIPLIERS {
            for &beta in &MULTIPLIERS {
                for &(m, n, k) in &[(1, 1, 1), (3, 17, 8), (9, 4, 33), (16, 16, 16)] {
                    let case = Case {
                        trans_a,
                        trans_b,
                        m,
                        n,
                        k,
                        alpha,
                        beta,
                    };
                    check(&case, &mut rng, None);
                }
            }
        }
    }
}

#[test]
fn test_square_sizes_up_to_64() {
    let mut rng = StdRng::seed_from_u64(64);
    for size in 1..=64 {
        for &(trans_a, trans_b) in &TRANSPOSES {
            let case = Case {
                trans_a,
                trans_b,
                m: size,
                n: size,
                k: size,
                alpha: 1.0,
                beta: 0.0,
            };
            check(&case, &mut rng, None);
        }
    }
}

#[test]
fn test_negative_zero_product_survives() {
    // Every product is -0: the sum stays +0 and alpha = -1 flips it to -0.
    // C * beta is -1 * +0 = -0, and -0 + -0 keeps the sign.
    let a = [-0.0f32; 4];
    let b = [1.0f32; 4];
    let mut c = [-1.0f32; 4];
    sgemm(
        Transpose::NoTrans,
        Transpose::NoTrans,
        2,
        2,
        2,
        -1.0,
        &a,
        2,
        &b,
        2,
        0.0,
        &mut c,
        2,
        None,
    );
    assert!(c.iter().all(|v| v.to_bits() == (-0.0f32).to_bits()));
}

#[test]
fn test_signed_zero_scalars_combine_with_c() {
    // Every (alpha, beta) pair over signed zeros, with C of both signs.
    for &alpha in &[0.0f32, -0.0] {
        for &beta in &[0.0f32, -0.0] {
            for &c0 in &[0.5f32, -0.5] {
                let mut c = [c0];
                sgemm(
                    Transpose::NoTrans,
                    Transpose::NoTrans,
                    1,
                    1,
                    1,
                    alpha,
                    &[1.0],
                    1,
                    &[2.0],
                    1,
                    beta,
                    &mut c,
                    1,
                    None,
                );
                let want = (c0 * beta) + (2.0 * alpha);
                assert_eq!(
                    c[0].to_bits(),
                    want.to_bits(),
                    "alpha={} beta={} c={}",
                    alpha,
                    beta,
                    c0
                );
            }
        }
    }
}

#[test]
fn test_explicit_sequential_context() {
    let mut rng = StdRng::seed_from_u64(7);
    let case = Case {
        trans_a: Transpose::Trans,
        trans_b: Transpose::NoTrans,
        m: 40,
        n: 23,
        k: 19,
        alpha: -0.5,
        beta: 0.25,
    };
    check(&case, &mut rng, Some(&Sequential));
}

#[cfg(feature = "parallel")]
#[test]
fn test_rayon_bands_match_reference() {
    let pool = nchwc_kernels::RayonSplitter::with_threads(4).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    for &(trans_a, trans_b) in &TRANSPOSES {
        let case = Case {
            trans_a,
            trans_b,
            m: 61,
            n: 45,
            k: 37,
            alpha: 0.25,
            beta: -1.0,
        };
        check(&case, &mut rng, Some(&pool));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_matches_reference(
        m in 1usize..=64,
        n in 1usize..=64,
        k in 1usize..=64,
        trans in 0usize..4,
        alpha in 0usize..6,
        beta in 0usize..6,
        seed in any::<u64>(),
    ) {
        let (trans_a, trans_b) = TRANSPOSES[trans];
        let case = Case {
            trans_a,
            trans_b,
            m,
            n,
            k,
            alpha: MULTIPLIERS[alpha],
            beta: MULTIPLIERS[beta],
        };
        let mut rng = StdRng::seed_from_u64(seed);
        check(&case, &mut rng, None);
    }
}
