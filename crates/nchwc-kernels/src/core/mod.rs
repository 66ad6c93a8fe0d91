//! Core single-precision GEMM using BLIS-style blocking.
//!
//! This module provides the portable loop nest behind [`crate::sgemm`],
//! organised for cache efficiency the way the BLIS framework does it.
//!
//! # Algorithm Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Loop 5: for jc in 0..N step NC    (partition columns of B)     │
//! │   Pack B[0:K, jc:NC] → B̃                                       │
//! │   Loop 4: for ic in 0..M step MC  (partition rows of A)        │
//! │     Pack A[ic:MC, 0:K] → Ã, clear tile accumulator             │
//! │     Loop 3: for pc in 0..K step KC  (partition depth)          │
//! │       Loop 2: for jr in 0..NC step NR                          │
//! │         Loop 1: for ir in 0..MC step MR                        │
//! │           microkernel(Ã[ir, pc], B̃[pc, jr], acc[ir, jr])       │
//! │     C[ic:MC, jc:NC] = beta*C + alpha*acc                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The depth loop sits inside the row/column blocks so each output element
//! keeps one running sum from `k = 0` to `K - 1`. Combined with microkernels
//! that never fuse multiply and add, this makes every blocked result
//! bit-identical to the naive triple loop.
//!
//! # Module Contents
//!
//! - [`gemm`](gemm): the blocking loop nest
//! - [`kernel`](kernel): [`Microkernel`] trait and [`PortableMicrokernel`]
//! - [`packing`](packing): [`MatRef`] strided views and panel packing
//! - [`tiling`](tiling): [`TilingParams`] and [`BlockIterator`]

mod gemm;
mod kernel;
mod packing;
mod tiling;

pub use gemm::{combine, gemm_inner};
pub use kernel::{Microkernel, PortableMicrokernel};
pub use packing::{pack_a, pack_b, packed_a_size, packed_b_size, MatRef, Transpose};
pub use tiling::{round_up, BlockIterator, TilingParams};
