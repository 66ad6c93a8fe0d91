//! Convolution: parameter preparation, the direct im2col + GEMM path and
//! the blocked NCHWc path.
//!
//! # Paths
//!
//! ```text
//!                 ConvDescriptor
//!                       │ ConvParameters::prepare
//!                       ▼
//!                 ConvParameters ── ConvAlgorithm ──► conv()        (NCHW in, NCHW out)
//!                       │
//!                       └───────── NchwcStrategy ──► nchwc_conv()  (blocked buffers)
//!                                                      ▲
//!                                   conv_nchwc() ──────┘ reorder in, run, reorder out
//! ```
//!
//! Both paths accumulate each output element over (input channel, kernel
//! depth, kernel row, kernel column) in that order starting from `+0`, then
//! add bias and apply the activation, so their results agree bit for bit.

mod direct;
mod nchwc;

pub use direct::conv;
pub use nchwc::{conv_nchwc, nchwc_conv};

use crate::error::{KernelError, Result};
use crate::layout::NchwcLayout;
use crate::types::{
    axis_values, check_rank, derive_output, Activation, FilterShape, Padding, SpatialDims,
    TensorShape, MAX_SPATIAL_DIMS,
};

/// How the direct path feeds the GEMM engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvAlgorithm {
    /// 1×1 kernel, unit stride, no padding: the input plane is already the
    /// GEMM right operand.
    GemmDirect,
    /// Expand receptive fields into a working buffer (im2col) first.
    Expand,
}

/// Blocked execution plan, selected once per parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NchwcStrategy {
    /// One input and one output channel per group; blocked input, OIHWBo filter.
    Depthwise,
    /// 1×1 kernel, no padding, single group; blocked input, OIHWBiBo filter.
    Pointwise,
    /// Enough input channels per group to fill a block; blocked input,
    /// OIHWBiBo filter.
    Nchwc,
    /// Too few input channels to block; natural input, OIHWBo filter.
    Nchw,
}

impl NchwcStrategy {
    /// Whether the strategy consumes a blocked (NCHWc) input tensor.
    #[inline]
    pub fn reorders_input(self) -> bool {
        !matches!(self, NchwcStrategy::Nchw)
    }

    /// Whether the filter is blocked on output channels only.
    #[inline]
    pub fn uses_oihwbo(self) -> bool {
        matches!(self, NchwcStrategy::Depthwise | NchwcStrategy::Nchw)
    }
}

/// User-facing description of a convolution.
///
/// Only the input and filter shapes are required; everything else defaults
/// to a single group, unit stride and dilation, no padding and no
/// activation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvDescriptor {
    input: TensorShape,
    filter: FilterShape,
    groups: usize,
    padding: Padding,
    strides: Option<Vec<usize>>,
    dilations: Option<Vec<usize>>,
    activation: Activation,
    output_dims: Option<Vec<usize>>,
    layout: Option<NchwcLayout>,
}

impl ConvDescriptor {
    pub fn new(input: TensorShape, filter: FilterShape) -> Self {
        Self {
            input,
            filter,
            groups: 1,
            padding: Padding::zero(),
            strides: None,
            dilations: None,
            activation: Activation::Identity,
            output_dims: None,
            layout: None,
        }
    }

    pub fn groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Per-axis strides, one entry per spatial axis.
    pub fn strides(mut self, strides: &[usize]) -> Self {
        self.strides = Some(strides.to_vec());
        self
    }

    /// Per-axis dilations, one entry per spatial axis.
    pub fn dilations(mut self, dilations: &[usize]) -> Self {
        self.dilations = Some(dilations.to_vec());
        self
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Expected `[N, O, spatial...]`; preparation fails if it disagrees
    /// with the derived output shape.
    pub fn output_dims(mut self, dims: &[usize]) -> Self {
        self.output_dims = Some(dims.to_vec());
        self
    }

    /// Block layout for the blocked path. Defaults to [`NchwcLayout::native`].
    pub fn layout(mut self, layout: NchwcLayout) -> Self {
        self.layout = Some(layout);
        self
    }
}

/// Validated, derived convolution geometry.
///
/// Immutable once prepared; the same parameters can drive any number of
/// kernel calls, concurrently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvParameters {
    input: TensorShape,
    filter: FilterShape,
    output: TensorShape,
    groups: usize,
    ic_per_group: usize,
    oc_per_group: usize,
    padding: Padding,
    strides: [usize; MAX_SPATIAL_DIMS],
    dilations: [usize; MAX_SPATIAL_DIMS],
    activation: Activation,
    algorithm: ConvAlgorithm,
    working_len: usize,
    strategy: NchwcStrategy,
    layout: NchwcLayout,
}

impl ConvParameters {
    /// Validate a descriptor and derive everything the kernels need.
    pub fn prepare(desc: &ConvDescriptor) -> Result<Self> {
        let input = desc.input;
        let filter = desc.filter;
        let rank = input.spatial.rank();
        check_rank(rank)?;
        if filter.kernel.rank() != rank {
            return Err(KernelError::DimensionMismatch(format!(
                "kernel rank {} does not match input spatial rank {}",
                filter.kernel.rank(),
                rank
            )));
        }
        if desc.groups == 0 {
            return Err(KernelError::ZeroDimension("group count".to_string()));
        }
        if input.channels != filter.input_channels * desc.groups {
            return Err(KernelError::DimensionMismatch(format!(
                "input has {} channels, filter expects {} per group × {} groups",
                input.channels, filter.input_channels, desc.groups
            )));
        }
        if filter.output_channels % desc.groups != 0 {
            return Err(KernelError::DimensionMismatch(format!(
                "{} output channels do not divide into {} groups",
                filter.output_channels, desc.groups
            )));
        }

        let strides = axis_values(rank, desc.strides.as_deref(), "strides")?;
        let dilations = axis_values(rank, desc.dilations.as_deref(), "dilations")?;
        let out_spatial = derive_output(
            &input.spatial,
            &filter.kernel,
            &dilations,
            &desc.padding,
            &strides,
        )?;
        let output = TensorShape::new(input.batch, filter.output_channels, out_spatial)?;

        if let Some(expected) = &desc.output_dims {
            let derived = output.dims();
            if *expected != derived {
                return Err(KernelError::OutputShapeMismatch {
                    expected: derived,
                    got: expected.clone(),
                });
            }
        }

        let ic_per_group = filter.input_channels;
        let oc_per_group = filter.output_channels / desc.groups;
        let unit_kernel = filter.kernel.volume() == 1;

        let algorithm = if unit_kernel && desc.padding.is_zero() && strides == [1; MAX_SPATIAL_DIMS] {
            ConvAlgorithm::GemmDirect
        } else {
            ConvAlgorithm::Expand
        };
        let working_len = match algorithm {
            ConvAlgorithm::GemmDirect => 0,
            ConvAlgorithm::Expand => ic_per_group * filter.kernel.volume() * out_spatial.volume(),
        };

        let layout = desc.layout.unwrap_or_else(NchwcLayout::native);
        let strategy = select_strategy(
            desc.groups,
            ic_per_group,
            oc_per_group,
            unit_kernel && desc.padding.is_zero(),
            layout.block_size(),
        );
        log::debug!(
            "conv {:?} -> {:?}: groups={} algorithm={:?} strategy={:?} block={}",
            input.dims(),
            output.dims(),
            desc.groups,
            algorithm,
            strategy,
            layout.block_size()
        );

        Ok(Self {
            input,
            filter,
            output,
            groups: desc.groups,
            ic_per_group,
            oc_per_group,
            padding: desc.padding,
            strides,
            dilations,
            activation: desc.activation,
            algorithm,
            working_len,
            strategy,
            layout,
        })
    }

    #[inline]
    pub fn input_shape(&self) -> &TensorShape {
        &self.input
    }

    #[inline]
    pub fn filter_shape(&self) -> &FilterShape {
        &self.filter
    }

    #[inline]
    pub fn output_shape(&self) -> &TensorShape {
        &self.output
    }

    #[inline]
    pub fn kernel(&self) -> &SpatialDims {
        &self.filter.kernel
    }

    #[inline]
    pub fn groups(&self) -> usize {
        self.groups
    }

    #[inline]
    pub fn input_channels_per_group(&self) -> usize {
        self.ic_per_group
    }

    #[inline]
    pub fn output_channels_per_group(&self) -> usize {
        self.oc_per_group
    }

    #[inline]
    pub fn padding(&self) -> &Padding {
        &self.padding
    }

    /// Strides as `[depth, height, width]`.
    #[inline]
    pub fn strides(&self) -> [usize; MAX_SPATIAL_DIMS] {
        self.strides
    }

    /// Dilations as `[depth, height, width]`.
    #[inline]
    pub fn dilations(&self) -> [usize; MAX_SPATIAL_DIMS] {
        self.dilations
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn algorithm(&self) -> ConvAlgorithm {
        self.algorithm
    }

    #[inline]
    pub fn strategy(&self) -> NchwcStrategy {
        self.strategy
    }

    #[inline]
    pub fn layout(&self) -> NchwcLayout {
        self.layout
    }

    /// Elements of scratch required by [`conv`].
    #[inline]
    pub fn working_buffer_len(&self) -> usize {
        self.working_len
    }

    /// Bytes of scratch required by [`conv`].
    #[inline]
    pub fn working_buffer_bytes(&self) -> usize {
        self.working_len * std::mem::size_of::<f32>()
    }

    /// Element count of the blocked input [`nchwc_conv`] expects.
    pub fn nchwc_input_len(&self) -> usize {
        if self.strategy.reorders_input() {
            self.layout.blocked_len(&self.input)
        } else {
            self.input.elements()
        }
    }

    /// Element count of the blocked filter [`nchwc_conv`] expects.
    pub fn nchwc_filter_len(&self) -> usize {
        if self.strategy.uses_oihwbo() {
            self.layout.oihwbo_len(&self.filter)
        } else {
            self.layout.oihwbibo_len(&self.filter)
        }
    }

    /// Element count of the blocked output [`nchwc_conv`] writes.
    pub fn nchwc_output_len(&self) -> usize {
        self.layout.blocked_len(&self.output)
    }

    /// Padded output channel count, the length of an aligned bias.
    pub fn nchwc_bias_len(&self) -> usize {
        self.layout.padded_channels(self.output.channels)
    }

    /// Elements of scratch required by [`conv_nchwc`].
    pub fn nchwc_workspace_len(&self) -> usize {
        let input = if self.strategy.reorders_input() {
            self.nchwc_input_len()
        } else {
            0
        };
        input + self.nchwc_filter_len() + self.nchwc_bias_len() + self.nchwc_output_len()
    }
}

/// Prepare parameters and report the direct path's scratch size in bytes.
pub fn prepare_convolution(desc: &ConvDescriptor) -> Result<(ConvParameters, usize)> {
    let params = ConvParameters::prepare(desc)?;
    let bytes = params.working_buffer_bytes();
    Ok((params, bytes))
}

fn select_strategy(
    groups: usize,
    ic_per_group: usize,
    oc_per_group: usize,
    unit_unpadded: bool,
    block: usize,
) -> NchwcStrategy {
    if groups > 1 && ic_per_group == 1 && oc_per_group == 1 {
        NchwcStrategy::Depthwise
    } else if ic_per_group >= block {
        if unit_unpadded && groups == 1 {
            NchwcStrategy::Pointwise
        } else {
            NchwcStrategy::Nchwc
        }
    } else {
        NchwcStrategy::Nchw
    }
}
