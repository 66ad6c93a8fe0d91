//! NCHWc blocked-channel layout.
//!
//! A blocked tensor stores channels in groups of `B` interleaved innermost:
//!
//! ```text
//! NCHW   [N][C][spatial...]
//! NCHWc  [N][Cp/B][spatial...][B]        Cp = ceil(C / B) * B
//! ```
//!
//! Channels in the padded tail of the last block are zero. Filters use one
//! of two blocked forms:
//!
//! | Form | Layout | Used by |
//! |------|--------|---------|
//! | OIHWBo | `[Op/B][I][kernel...][Bo]` | depthwise, NCHW-input kernels |
//! | OIHWBiBo | `[Op/B][Ip/B][kernel...][Bi][Bo]` | fully blocked kernels |
//!
//! `B` follows the CPU's vector width (see [`block_size`]) but any power of
//! two can be requested through [`NchwcLayout::with_block_size`].

mod filter;
mod reorder;

use once_cell::sync::Lazy;

use crate::error::{KernelError, Result};
use crate::parallel::WorkSplitter;
use crate::simd::simd_level;
use crate::types::{FilterShape, TensorShape};

static BLOCK_SIZE: Lazy<usize> = Lazy::new(|| {
    let level = simd_level();
    let block = level.f32_lanes();
    log::debug!("NCHWc block size {} for {}", block, level.name());
    block
});

/// Largest block size a layout accepts.
pub const MAX_BLOCK_SIZE: usize = 64;

/// The channel block size used by this process, fixed on first use.
pub fn block_size() -> usize {
    *BLOCK_SIZE
}

/// Block layout descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NchwcLayout {
    block: usize,
}

impl NchwcLayout {
    /// Layout with the process block size.
    pub fn native() -> Self {
        Self {
            block: block_size(),
        }
    }

    /// Layout with an explicit block size, which must be a power of two
    /// no larger than [`MAX_BLOCK_SIZE`].
    pub fn with_block_size(block: usize) -> Result<Self> {
        if !block.is_power_of_two() || block > MAX_BLOCK_SIZE {
            return Err(KernelError::InvalidBlockSize(block));
        }
        Ok(Self { block })
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block
    }

    /// `ceil(channels / B) * B`.
    #[inline]
    pub fn padded_channels(&self, channels: usize) -> usize {
        channels.div_ceil(self.block) * self.block
    }

    /// Number of channel blocks.
    #[inline]
    pub fn channel_blocks(&self, channels: usize) -> usize {
        channels.div_ceil(self.block)
    }

    /// Element count of `shape` in blocked layout.
    pub fn blocked_len(&self, shape: &TensorShape) -> usize {
        shape.batch * self.padded_channels(shape.channels) * shape.plane()
    }

    /// Element count of an OIHWBo filter.
    pub fn oihwbo_len(&self, filter: &FilterShape) -> usize {
        self.padded_channels(filter.output_channels) * filter.input_channels * filter.kernel.volume()
    }

    /// Element count of an OIHWBiBo filter.
    pub fn oihwbibo_len(&self, filter: &FilterShape) -> usize {
        self.padded_channels(filter.output_channels)
            * self.padded_channels(filter.input_channels)
            * filter.kernel.volume()
    }

    /// NCHW → NCHWc. Tail channels of the last block are zero-filled.
    ///
    /// # Panics
    /// If `input` is shorter than `shape` or `output` shorter than
    /// [`blocked_len`](Self::blocked_len).
    pub fn reorder_input(
        &self,
        shape: &TensorShape,
        input: &[f32],
        output: &mut [f32],
        ctx: Option<&dyn WorkSplitter>,
    ) {
        reorder::to_blocked(self.block, shape, input, output, ctx);
    }

    /// NCHWc → NCHW, dropping the tail channels.
    ///
    /// # Panics
    /// If `blocked` is shorter than [`blocked_len`](Self::blocked_len) or
    /// `output` shorter than `shape`.
    pub fn reorder_output(
        &self,
        shape: &TensorShape,
        blocked: &[f32],
        output: &mut [f32],
        ctx: Option<&dyn WorkSplitter>,
    ) {
        reorder::from_blocked(self.block, shape, blocked, output, ctx);
    }

    /// `[O][I][kernel...]` → `[Op/B][I][kernel...][Bo]`.
    pub fn reorder_filter_oihwbo(&self, filter: &FilterShape, src: &[f32], dst: &mut [f32]) {
        filter::to_oihwbo(self.block, filter, src, dst);
    }

    /// `[O][I][kernel...]` → `[Op/B][Ip/B][kernel...][Bi][Bo]`.
    pub fn reorder_filter_oihwbibo(&self, filter: &FilterShape, src: &[f32], dst: &mut [f32]) {
        filter::to_oihwbibo(self.block, filter, src, dst);
    }

    /// Copy `bias` into `dst` and zero the remainder.
    pub fn align_bias(&self, bias: &[f32], dst: &mut [f32]) {
        filter::align_bias(bias, dst);
    }
}

impl Default for NchwcLayout {
    fn default() -> Self {
        Self::native()
    }
}

/// [`NchwcLayout::reorder_input`] with the process block size.
pub fn reorder_input(shape: &TensorShape, input: &[f32], output: &mut [f32]) {
    NchwcLayout::native().reorder_input(shape, input, output, None);
}

/// [`NchwcLayout::reorder_output`] with the process block size.
pub fn reorder_output(shape: &TensorShape, blocked: &[f32], output: &mut [f32]) {
    NchwcLayout::native().reorder_output(shape, blocked, output, None);
}

/// [`NchwcLayout::reorder_filter_oihwbo`] with the process block size.
pub fn reorder_filter_oihwbo(filter: &FilterShape, src: &[f32], dst: &mut [f32]) {
    NchwcLayout::native().reorder_filter_oihwbo(filter, src, dst);
}

/// [`NchwcLayout::reorder_filter_oihwbibo`] with the process block size.
pub fn reorder_filter_oihwbibo(filter: &FilterShape, src: &[f32], dst: &mut [f32]) {
    NchwcLayout::native().reorder_filter_oihwbibo(filter, src, dst);
}

/// Copy `bias` into a padded buffer, zeroing the tail.
pub fn align_bias(bias: &[f32], dst: &mut [f32]) {
    filter::align_bias(bias, dst);
}
