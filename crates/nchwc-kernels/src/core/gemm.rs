//! Blocked GEMM loop nest.

use super::kernel::Microkernel;
use super::packing::{pack_a, pack_b, packed_a_size, packed_b_size, MatRef};
use super::tiling::{round_up, BlockIterator, TilingParams};

/// Combine an accumulated dot product with the existing output value.
///
/// Always `(c * beta) + (sum * alpha)`, so signed zeros follow IEEE rules
/// and a NaN or infinite `c` propagates even when `beta` is zero.
#[inline(always)]
pub fn combine(c: f32, sum: f32, alpha: f32, beta: f32) -> f32 {
    (c * beta) + (sum * alpha)
}

/// Blocked `C := alpha * op(A) * op(B) + beta * C` for one region of C.
///
/// `a` is positioned at the region's first row, `c` at element
/// `(first row, 0)`. Only the `m × n` window addressed through `ldc` is
/// read or written. Per element, the dot product is accumulated in a tile
/// buffer that persists across depth blocks, so the summation order is
/// exactly `k = 0, 1, ..., K-1`.
#[allow(clippy::too_many_arguments)]
pub fn gemm_inner<K: Microkernel>(
    kernel: &K,
    tiling: &TilingParams,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &MatRef<'_>,
    b: &MatRef<'_>,
    beta: f32,
    c: &mut [f32],
    ldc: usize,
) {
    if m == 0 || n == 0 || k == 0 {
        return;
    }
    debug_assert_eq!(tiling.mr, K::MR);
    debug_assert_eq!(tiling.nr, K::NR);

    let mr = K::MR;
    let nr = K::NR;
    let mc = tiling.mc.min(round_up(m, mr));
    let nc = tiling.nc.min(round_up(n, nr));

    let mut packed_a = vec![0.0f32; packed_a_size(mc, k, mr)];
    let mut packed_b = vec![0.0f32; packed_b_size(k, nc, nr)];
    let mut acc = vec![0.0f32; mc * nc];

    for (jc, nc_cur) in BlockIterator::new(n, nc) {
        pack_b(b, jc, nc_cur, k, nr, &mut packed_b);
        let n_panels = nc_cur.div_ceil(nr);

        for (ic, mc_cur) in BlockIterator::new(m, mc) {
            pack_a(a, ic, mc_cur, k, mr, &mut packed_a);
            let m_panels = mc_cur.div_ceil(mr);
            acc.fill(0.0);

            for (pc, kc_cur) in BlockIterator::new(k, tiling.kc) {
                for jp in 0..n_panels {
                    let b_panel = &packed_b[jp * k * nr + pc * nr..];
                    for ip in 0..m_panels {
                        let a_panel = &packed_a[ip * k * mr + pc * mr..];
                        let tile = &mut acc[ip * mr * nc + jp * nr..];
                        kernel.accumulate(kc_cur, a_panel, b_panel, tile, nc);
                    }
                }
            }

            for i in 0..mc_cur {
                let dst = &mut c[(ic + i) * ldc + jc..(ic + i) * ldc + jc + nc_cur];
                let src = &acc[i * nc..i * nc + nc_cur];
                for (c_val, &sum) in dst.iter_mut().zip(src.iter()) {
                    *c_val = combine(*c_val, sum, alpha, beta);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::PortableMicrokernel;
    use crate::core::packing::Transpose;

    fn naive(m: usize, n: usize, k: usize, a: &[f32], b: &[f32]) -> Vec<f32> {
        let mut c = vec![0.0f32; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0f32;
                for p in 0..k {
                    sum += a[i * k + p] * b[p * n + j];
                }
                c[i * n + j] = sum;
            }
        }
        c
    }

    #[test]
    fn test_small_tiles_cross_every_block_boundary() {
        // Tiny tiling forces multiple jc/ic/pc blocks plus ragged edges.
        let tiling = TilingParams::new(16, 16, 5, 8, 8);
        let (m, n, k) = (21, 19, 13);
        let a: Vec<f32> = (0..m * k).map(|i| ((i * 7) % 11) as f32 * 0.125 - 0.5).collect();
        let b: Vec<f32> = (0..k * n).map(|i| ((i * 5) % 13) as f32 * 0.25 - 1.0).collect();
        let mut c = vec![f32::NAN; m * n];

        gemm_inner(
            &PortableMicrokernel,
            &tiling,
            m,
            n,
            k,
            1.0,
            &MatRef::new(&a, k, Transpose::NoTrans),
            &MatRef::new(&b, n, Transpose::NoTrans),
            0.0,
            &mut c,
            n,
        );

        let expected = naive(m, n, k, &a, &b);
        for (i, (got, want)) in c.iter().zip(expected.iter()).enumerate() {
            assert_eq!(got.to_bits(), want.to_bits(), "element {}", i);
        }
    }

    #[test]
    fn test_window_outside_n_untouched() {
        let (m, n, k, ldc) = (3, 2, 4, 5);
        let a = vec![1.0f32; m * k];
        let b = vec![2.0f32; k * n];
        let mut c = vec![-7.0f32; m * ldc];

        gemm_inner(
            &PortableMicrokernel,
            &TilingParams::default(),
            m,
            n,
            k,
            1.0,
            &MatRef::new(&a, k, Transpose::NoTrans),
            &MatRef::new(&b, n, Transpose::NoTrans),
            1.0,
            &mut c,
            ldc,
        );

        for row in 0..m {
            assert_eq!(&c[row * ldc..row * ldc + n], &[1.0, 1.0]);
            assert!(c[row * ldc + n..(row + 1) * ldc].iter().all(|&v| v == -7.0));
        }
    }

    #[test]
    fn test_combine_signed_zero() {
        // (-0.5 * -0) + (2 * -0) = +0 + -0 = +0
        assert_eq!(combine(-0.5, 2.0, -0.0, -0.0).to_bits(), 0);
        // (-0.5 * 0) + (3 * -0) = -0 + -0 = -0
        assert_eq!(combine(-0.5, 3.0, -0.0, 0.0).to_bits(), (-0.0f32).to_bits());
        assert_eq!(combine(-0.5, 3.0, 0.0, 1.0), -0.5);
        // A zero beta still reads C.
        assert!(combine(f32::NAN, 2.0, 0.5, 0.0).is_nan());
        assert!(combine(f32::INFINITY, 2.0, 0.5, -0.0).is_nan());
    }
}
