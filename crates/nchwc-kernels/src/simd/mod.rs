//! SIMD capability detection and microkernel dispatch.
//!
//! # Supported Architectures
//!
//! | Architecture | Tier | f32 lanes | GEMM microkernel | NCHWc block |
//! |--------------|------|-----------|------------------|-------------|
//! | x86_64 | AVX-512F | 16 | AVX 8×8 | 16 |
//! | x86_64 | AVX | 8 | AVX 8×8 | 8 |
//! | aarch64 | NEON | 4 | portable 8×8 | 4 |
//! | any | portable | - | portable 8×8 | 8 |
//!
//! # Runtime Dispatch
//!
//! 1. [`simd_level()`] detects CPU features once per process
//! 2. [`gemm_dispatch`] routes to the matching microkernel
//! 3. The portable kernel is used when nothing better is available
//!
//! Every microkernel multiplies and adds as two separately rounded
//! operations, so switching tiers never changes a single output bit.

mod detect;
pub mod dispatch;
pub mod kernels;

pub use detect::{simd_level, SimdLevel};
pub use dispatch::gemm_dispatch;
pub use kernels::*;
