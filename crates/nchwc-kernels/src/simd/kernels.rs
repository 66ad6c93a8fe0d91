//! Architecture-specific GEMM microkernels.

#[cfg(target_arch = "x86_64")]
pub use avx::AvxMicrokernel;

#[cfg(target_arch = "x86_64")]
mod avx {
    use crate::core::Microkernel;
    use std::arch::x86_64::*;

    /// 8×8 microkernel on 256-bit AVX registers.
    ///
    /// One register per output row; each depth step broadcasts an A value
    /// and multiplies by the B row, then adds. Multiply and add are separate
    /// instructions, matching the portable kernel bit for bit.
    #[derive(Debug, Clone, Copy)]
    pub struct AvxMicrokernel {
        _detected: (),
    }

    impl AvxMicrokernel {
        /// Returns the kernel only if the CPU supports AVX.
        pub fn new() -> Option<Self> {
            if is_x86_feature_detected!("avx") {
                Some(Self { _detected: () })
            } else {
                None
            }
        }
    }

    impl Microkernel for AvxMicrokernel {
        const MR: usize = 8;
        const NR: usize = 8;

        fn accumulate(&self, kc: usize, a: &[f32], b: &[f32], acc: &mut [f32], acc_ld: usize) {
            assert!(a.len() >= kc * Self::MR, "packed A panel too short");
            assert!(b.len() >= kc * Self::NR, "packed B panel too short");
            assert!(
                acc.len() >= (Self::MR - 1) * acc_ld + Self::NR,
                "accumulator tile too short"
            );
            // Safety: AVX support was checked in `new`, and the assertions
            // above bound every pointer offset used below.
            unsafe { accumulate_avx(kc, a.as_ptr(), b.as_ptr(), acc.as_mut_ptr(), acc_ld) }
        }
    }

    #[target_feature(enable = "avx")]
    unsafe fn accumulate_avx(kc: usize, a: *const f32, b: *const f32, acc: *mut f32, acc_ld: usize) {
        let mut c = [_mm256_setzero_ps(); 8];
        for (i, row) in c.iter_mut().enumerate() {
            *row = _mm256_loadu_ps(acc.add(i * acc_ld));
        }

        let mut ap = a;
        let mut bp = b;
        for _ in 0..kc {
            let b_row = _mm256_loadu_ps(bp);
            for (i, row) in c.iter_mut().enumerate() {
                let a_val = _mm256_set1_ps(*ap.add(i));
                *row = _mm256_add_ps(*row, _mm256_mul_ps(a_val, b_row));
            }
            ap = ap.add(8);
            bp = bp.add(8);
        }

        for (i, row) in c.iter().enumerate() {
            _mm256_storeu_ps(acc.add(i * acc_ld), *row);
        }
    }
}
