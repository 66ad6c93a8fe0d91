//! Tensor shape and parameter descriptors.
//!
//! Everything in this module is a plain value object: shapes, padding and
//! activation descriptors are validated on construction and never mutated
//! afterwards. Kernels consume them by reference.
//!
//! # Spatial Normalisation
//!
//! Spatial extents of rank 1, 2 or 3 are stored as `[depth, height, width]`
//! with leading axes set to 1:
//!
//! | Rank | Caller shape | Stored as |
//! |------|--------------|-----------|
//! | 1 | `[W]` | `[1, 1, W]` |
//! | 2 | `[H, W]` | `[1, H, W]` |
//! | 3 | `[D, H, W]` | `[D, H, W]` |
//!
//! A 2D convolution is therefore a 3D convolution with a unit depth axis,
//! which costs nothing at runtime and lets every kernel share one loop nest.
//!
//! # Output Extent
//!
//! ```text
//! out = floor((in + pad_begin + pad_end - (dilation * (kernel - 1) + 1)) / stride) + 1
//! ```
//!
//! See [`output_extent`].

mod activation;
mod shape;

pub use activation::Activation;
pub(crate) use shape::{axis_values, check_rank, derive_output};
pub use shape::{output_extent, FilterShape, Padding, SpatialDims, TensorShape, MAX_SPATIAL_DIMS};
