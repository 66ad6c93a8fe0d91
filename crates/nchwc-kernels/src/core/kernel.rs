//! Microkernel trait and portable implementation.

/// Innermost `MR × NR` tile update of the blocked GEMM.
///
/// Implementations must accumulate strictly in ascending `p` with a
/// separately rounded multiply and add per step. Every GEMM result is then
/// bit-identical to the naive triple loop regardless of the blocking.
pub trait Microkernel: Sync {
    /// Rows of the output tile.
    const MR: usize;
    /// Columns of the output tile.
    const NR: usize;

    /// `acc[i*acc_ld + j] += a[p*MR + i] * b[p*NR + j]` for `p in 0..kc`.
    ///
    /// `a` and `b` are packed panels positioned at the first depth index of
    /// the current block; `acc` is positioned at the tile's top-left corner.
    fn accumulate(&self, kc: usize, a: &[f32], b: &[f32], acc: &mut [f32], acc_ld: usize);
}

/// Scalar 8×8 microkernel, the reference for all vector variants.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableMicrokernel;

impl Microkernel for PortableMicrokernel {
    const MR: usize = 8;
    const NR: usize = 8;

    fn accumulate(&self, kc: usize, a: &[f32], b: &[f32], acc: &mut [f32], acc_ld: usize) {
        const MR: usize = PortableMicrokernel::MR;
        const NR: usize = PortableMicrokernel::NR;

        let mut c = [[0.0f32; NR]; MR];
        for (i, row) in c.iter_mut().enumerate() {
            row.copy_from_slice(&acc[i * acc_ld..i * acc_ld + NR]);
        }

        for p in 0..kc {
            let a_col = &a[p * MR..(p + 1) * MR];
            let b_row = &b[p * NR..(p + 1) * NR];
            for (row, &a_val) in c.iter_mut().zip(a_col.iter()) {
                for (c_val, &b_val) in row.iter_mut().zip(b_row.iter()) {
                    *c_val += a_val * b_val;
                }
            }
        }

        for (i, row) in c.iter().enumerate() {
            acc[i * acc_ld..i * acc_ld + NR].copy_from_slice(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portable_accumulates_outer_products() {
        let kc = 2;
        let a: Vec<f32> = (0..kc * 8).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..kc * 8).map(|i| (i % 3) as f32).collect();
        let mut acc = vec![1.0f32; 8 * 10];

        PortableMicrokernel.accumulate(kc, &a, &b, &mut acc, 10);

        for i in 0..8 {
            for j in 0..8 {
                let mut expected = 1.0f32;
                for p in 0..kc {
                    expected += a[p * 8 + i] * b[p * 8 + j];
                }
                assert_eq!(acc[i * 10 + j], expected, "tile ({}, {})", i, j);
            }
            // Columns outside the tile are untouched.
            assert_eq!(acc[i * 10 + 8], 1.0);
            assert_eq!(acc[i * 10 + 9], 1.0);
        }
    }
}
