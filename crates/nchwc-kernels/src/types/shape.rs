//! Shape, padding and window geometry descriptors.

use crate::error::{KernelError, Result};

/// Maximum number of spatial axes handled by the kernels.
pub const MAX_SPATIAL_DIMS: usize = 3;

/// Spatial extent of a tensor or kernel, rank 1 to 3.
///
/// Internally the extent is always stored as `[depth, height, width]`;
/// lower ranks fill the leading axes with 1 so every kernel can iterate
/// over three axes unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpatialDims {
    rank: usize,
    dims: [usize; MAX_SPATIAL_DIMS],
}

impl SpatialDims {
    /// Build from a rank-length slice of positive extents.
    pub fn new(dims: &[usize]) -> Result<Self> {
        let rank = dims.len();
        check_rank(rank)?;
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(KernelError::ZeroDimension(format!(
                "spatial axis {} of {:?}",
                axis, dims
            )));
        }
        let mut full = [1; MAX_SPATIAL_DIMS];
        full[MAX_SPATIAL_DIMS - rank..].copy_from_slice(dims);
        Ok(Self { rank, dims: full })
    }

    pub(crate) fn from_full(rank: usize, dims: [usize; MAX_SPATIAL_DIMS]) -> Self {
        Self { rank, dims }
    }

    /// Number of spatial axes.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The rank-length extents, outermost first.
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.dims[MAX_SPATIAL_DIMS - self.rank..]
    }

    /// Extents padded to `[depth, height, width]`.
    #[inline]
    pub fn full(&self) -> [usize; MAX_SPATIAL_DIMS] {
        self.dims
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.dims[0]
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.dims[1]
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.dims[2]
    }

    /// Product of all extents.
    #[inline]
    pub fn volume(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Per-axis padding before and after the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Padding {
    pub begin: [usize; MAX_SPATIAL_DIMS],
    pub end: [usize; MAX_SPATIAL_DIMS],
}

impl Padding {
    /// No padding on any axis.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Parse the `[begin..., end...]` convention (length `2 * rank`).
    pub fn new(rank: usize, pads: &[usize]) -> Result<Self> {
        check_rank(rank)?;
        if pads.len() != 2 * rank {
            return Err(KernelError::DimensionMismatch(format!(
                "padding has {} entries, expected {} for rank {}",
                pads.len(),
                2 * rank,
                rank
            )));
        }
        let offset = MAX_SPATIAL_DIMS - rank;
        let mut padding = Self::zero();
        padding.begin[offset..].copy_from_slice(&pads[..rank]);
        padding.end[offset..].copy_from_slice(&pads[rank..]);
        Ok(padding)
    }

    /// Same amount before and after on each axis.
    pub fn symmetric(rank: usize, pads: &[usize]) -> Result<Self> {
        let mut both = pads.to_vec();
        both.extend_from_slice(pads);
        Self::new(rank, &both)
    }

    /// True when no axis carries any padding.
    pub fn is_zero(&self) -> bool {
        self.begin.iter().chain(self.end.iter()).all(|&p| p == 0)
    }
}

/// Parse per-axis stride/dilation style values, defaulting to 1.
pub(crate) fn axis_values(rank: usize, values: Option<&[usize]>, what: &str) -> Result<[usize; MAX_SPATIAL_DIMS]> {
    let mut full = [1; MAX_SPATIAL_DIMS];
    if let Some(values) = values {
        if values.len() != rank {
            return Err(KernelError::DimensionMismatch(format!(
                "{} has {} entries, expected {}",
                what,
                values.len(),
                rank
            )));
        }
        if values.contains(&0) {
            return Err(KernelError::ZeroDimension(format!("{} {:?}", what, values)));
        }
        full[MAX_SPATIAL_DIMS - rank..].copy_from_slice(values);
    }
    Ok(full)
}

pub(crate) fn check_rank(rank: usize) -> Result<()> {
    if (1..=MAX_SPATIAL_DIMS).contains(&rank) {
        Ok(())
    } else {
        Err(KernelError::UnsupportedRank(rank))
    }
}

/// Output extent of a sliding window along one axis.
///
/// `floor((input + pad_begin + pad_end - (dilation * (kernel - 1) + 1)) / stride) + 1`,
/// computed in signed arithmetic so undersized inputs yield a non-positive value.
#[inline]
pub fn output_extent(
    input: usize,
    kernel: usize,
    dilation: usize,
    pad_begin: usize,
    pad_end: usize,
    stride: usize,
) -> i64 {
    let span = input as i64 + pad_begin as i64 + pad_end as i64;
    let window = dilation as i64 * (kernel as i64 - 1) + 1;
    let numerator = span - window;
    if numerator < 0 {
        // Floor division toward negative infinity.
        return (numerator - (stride as i64 - 1)) / stride as i64 + 1;
    }
    numerator / stride as i64 + 1
}

/// Derive the full output extent of a window, failing on any non-positive axis.
pub(crate) fn derive_output(
    input: &SpatialDims,
    kernel: &SpatialDims,
    dilation: &[usize; MAX_SPATIAL_DIMS],
    padding: &Padding,
    stride: &[usize; MAX_SPATIAL_DIMS],
) -> Result<SpatialDims> {
    let rank = input.rank();
    let mut out = [1; MAX_SPATIAL_DIMS];
    for axis in 0..MAX_SPATIAL_DIMS {
        let extent = output_extent(
            input.full()[axis],
            kernel.full()[axis],
            dilation[axis],
            padding.begin[axis],
            padding.end[axis],
            stride[axis],
        );
        if extent <= 0 {
            return Err(KernelError::EmptyOutput {
                axis: axis + rank - MAX_SPATIAL_DIMS,
                value: extent,
            });
        }
        out[axis] = extent as usize;
    }
    Ok(SpatialDims::from_full(rank, out))
}

/// Shape of an activation tensor: `[batch, channels, spatial...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorShape {
    pub batch: usize,
    pub channels: usize,
    pub spatial: SpatialDims,
}

impl TensorShape {
    pub fn new(batch: usize, channels: usize, spatial: SpatialDims) -> Result<Self> {
        if batch == 0 || channels == 0 {
            return Err(KernelError::ZeroDimension(format!(
                "batch={} channels={}",
                batch, channels
            )));
        }
        Ok(Self {
            batch,
            channels,
            spatial,
        })
    }

    /// Parse `[N, C, spatial...]` with 1 to 3 spatial axes.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        if dims.len() < 3 {
            return Err(KernelError::UnsupportedRank(dims.len().saturating_sub(2)));
        }
        Self::new(dims[0], dims[1], SpatialDims::new(&dims[2..])?)
    }

    /// Full dims as `[N, C, spatial...]`.
    pub fn dims(&self) -> Vec<usize> {
        let mut dims = vec![self.batch, self.channels];
        dims.extend_from_slice(self.spatial.as_slice());
        dims
    }

    /// Elements in one channel plane.
    #[inline]
    pub fn plane(&self) -> usize {
        self.spatial.volume()
    }

    /// Total element count.
    #[inline]
    pub fn elements(&self) -> usize {
        self.batch * self.channels * self.plane()
    }
}

/// Shape of a convolution filter: `[output channels, input channels per group, kernel...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterShape {
    pub output_channels: usize,
    pub input_channels: usize,
    pub kernel: SpatialDims,
}

impl FilterShape {
    pub fn new(output_channels: usize, input_channels: usize, kernel: SpatialDims) -> Result<Self> {
        if output_channels == 0 || input_channels == 0 {
            return Err(KernelError::ZeroDimension(format!(
                "filter output_channels={} input_channels={}",
                output_channels, input_channels
            )));
        }
        Ok(Self {
            output_channels,
            input_channels,
            kernel,
        })
    }

    /// Parse `[O, I, kernel...]`.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        if dims.len() < 3 {
            return Err(KernelError::UnsupportedRank(dims.len().saturating_sub(2)));
        }
        Self::new(dims[0], dims[1], SpatialDims::new(&dims[2..])?)
    }

    #[inline]
    pub fn elements(&self) -> usize {
        self.output_channels * self.input_channels * self.kernel.volume()
    }
}
