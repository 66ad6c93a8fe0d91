//! Runtime microkernel selection.

use crate::core::{gemm_inner, MatRef, PortableMicrokernel, TilingParams};

#[cfg(target_arch = "x86_64")]
use super::detect::{simd_level, SimdLevel};
#[cfg(target_arch = "x86_64")]
use super::kernels::AvxMicrokernel;

/// Run the blocked GEMM on the best microkernel for this CPU.
#[allow(clippy::too_many_arguments)]
pub fn gemm_dispatch(
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
    #[cfg(target_arch = "x86_64")]
    {
        if simd_level() >= SimdLevel::Avx {
            if let Some(kernel) = AvxMicrokernel::new() {
                let tiling = TilingParams::for_kernel::<AvxMicrokernel>();
                gemm_inner(&kernel, &tiling, m, n, k, alpha, a, b, beta, c, ldc);
                return;
            }
        }
    }

    let tiling = TilingParams::for_kernel::<PortableMicrokernel>();
    gemm_inner(&PortableMicrokernel, &tiling, m, n, k, alpha, a, b, beta, c, ldc);
}
