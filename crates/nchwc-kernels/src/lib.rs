//! CPU kernels for neural-network inference: GEMM, convolution, pooling
//! and the NCHWc blocked-channel layout.
//!
//! # Overview
//!
//! | Module | Provides |
//! |--------|----------|
//! | [`api`] | [`sgemm`], [`matmul`], the [`Gemm`] builder |
//! | [`conv`] | [`ConvParameters`], direct and blocked convolution |
//! | [`pool`] | [`PoolParameters`], max and average pooling |
//! | [`layout`] | NCHW ↔ NCHWc reorders for tensors, filters and bias |
//! | [`parallel`] | [`WorkSplitter`] and its implementations |
//! | [`simd`] | CPU feature detection and microkernel dispatch |
//!
//! Every kernel is exact with respect to naive reference math: sums are
//! accumulated in a fixed order with separately rounded multiply and add,
//! so the blocked paths reproduce the direct paths bit for bit.
//!
//! # Quick Start
//!
//! ```
//! use nchwc_kernels::{
//!     conv, prepare_convolution, Activation, ConvDescriptor, Padding, TensorShape,
//!     FilterShape, SpatialDims,
//! };
//!
//! let input = TensorShape::new(1, 1, SpatialDims::new(&[3, 3]).unwrap()).unwrap();
//! let filter = FilterShape::new(1, 1, SpatialDims::new(&[2, 2]).unwrap()).unwrap();
//! let desc = ConvDescriptor::new(input, filter);
//! let (params, _bytes) = prepare_convolution(&desc).unwrap();
//!
//! let x: Vec<f32> = (1..=9).map(|v| v as f32).collect();
//! let w = vec![1.0f32; 4];
//! let mut working = vec![0.0f32; params.working_buffer_len()];
//! let mut y = vec![0.0f32; params.output_shape().elements()];
//!
//! conv(&params, &x, &w, None, &mut working, &mut y, None);
//! assert_eq!(y, vec![12.0, 16.0, 24.0, 28.0]);
//! ```
//!
//! # Parallelism
//!
//! Every entry point takes `ctx: Option<&dyn WorkSplitter>`. `None` runs on
//! the calling thread; with the default `parallel` feature,
//! [`RayonSplitter`] fans work out on a rayon pool.

pub mod api;
pub mod conv;
pub mod core;
pub mod error;
pub mod layout;
pub mod parallel;
pub mod pool;
pub mod simd;
pub mod types;

pub use api::{matmul, sgemm, Gemm};
pub use conv::{
    conv, conv_nchwc, nchwc_conv, prepare_convolution, ConvAlgorithm, ConvDescriptor,
    ConvParameters, NchwcStrategy,
};
pub use crate::core::{TilingParams, Transpose};
pub use error::{KernelError, Result};
pub use layout::{
    align_bias, block_size, reorder_filter_oihwbibo, reorder_filter_oihwbo, reorder_input,
    reorder_output, NchwcLayout, MAX_BLOCK_SIZE,
};
#[cfg(feature = "parallel")]
pub use parallel::RayonSplitter;
pub use parallel::{Sequential, WorkSplitter};
pub use pool::{nchwc_pool, pool, pool_nchwc, PoolParameters, PoolingKind};
pub use simd::{simd_level, SimdLevel};
pub use types::{
    output_extent, Activation, FilterShape, Padding, SpatialDims, TensorShape, MAX_SPATIAL_DIMS,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::api::{matmul, sgemm, Gemm};
    pub use crate::conv::{conv, conv_nchwc, prepare_convolution, ConvDescriptor, ConvParameters};
    pub use crate::core::Transpose;
    pub use crate::error::{KernelError, Result};
    pub use crate::layout::NchwcLayout;
    pub use crate::parallel::WorkSplitter;
    pub use crate::pool::{pool, PoolParameters, PoolingKind};
    pub use crate::types::{Activation, FilterShape, Padding, SpatialDims, TensorShape};
}
