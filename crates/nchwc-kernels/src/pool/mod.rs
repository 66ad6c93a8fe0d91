//! Spatial pooling over 1D, 2D and 3D windows.
//!
//! Each output element reduces the input values under its window, clamped
//! to the input bounds:
//!
//! | Kind | Reduction | Divisor |
//! |------|-----------|---------|
//! | [`PoolingKind::Maximum`] | max, starting at `f32::MIN` | - |
//! | [`PoolingKind::AverageExcludePad`] | sum | clamped window volume |
//! | [`PoolingKind::AverageIncludePad`] | sum | full kernel volume |
//!
//! Channel planes are independent, so the natural-layout kernel splits work
//! per `(batch, channel)` and the blocked kernel per `(batch, channel block)`.

mod nchwc;

pub use nchwc::{nchwc_pool, pool_nchwc};

use crate::error::{KernelError, Result};
use crate::layout::NchwcLayout;
use crate::parallel::{resolve, WorkSplitter};
use crate::types::{
    axis_values, check_rank, derive_output, Padding, SpatialDims, TensorShape, MAX_SPATIAL_DIMS,
};

/// Pooling reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolingKind {
    Maximum,
    /// Average over the in-bounds part of the window.
    AverageExcludePad,
    /// Average over the full window, padding counted as zeros.
    AverageIncludePad,
}

/// Validated pooling geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolParameters {
    kind: PoolingKind,
    input: TensorShape,
    output: TensorShape,
    kernel: SpatialDims,
    padding: Padding,
    strides: [usize; MAX_SPATIAL_DIMS],
}

impl PoolParameters {
    /// Pooling with an explicit window.
    ///
    /// Fails when the kernel rank differs from the input's, when any
    /// padding is at least the kernel extent on its axis, or when the
    /// derived output is empty.
    pub fn new(
        kind: PoolingKind,
        input: TensorShape,
        kernel: &[usize],
        padding: Padding,
        strides: Option<&[usize]>,
    ) -> Result<Self> {
        let rank = input.spatial.rank();
        check_rank(rank)?;
        if kernel.len() != rank {
            return Err(KernelError::DimensionMismatch(format!(
                "kernel has {} axes, input has {}",
                kernel.len(),
                rank
            )));
        }
        let kernel = SpatialDims::new(kernel)?;
        let strides = axis_values(rank, strides, "strides")?;

        let offset = MAX_SPATIAL_DIMS - rank;
        if padding.begin[..offset].iter().chain(padding.end[..offset].iter()).any(|&p| p != 0) {
            return Err(KernelError::DimensionMismatch(format!(
                "padding {:?} has more axes than rank {}",
                padding, rank
            )));
        }
        for axis in offset..MAX_SPATIAL_DIMS {
            let extent = kernel.full()[axis];
            let worst = padding.begin[axis].max(padding.end[axis]);
            if worst >= extent {
                return Err(KernelError::PaddingExceedsKernel {
                    axis: axis - offset,
                    padding: worst,
                    kernel: extent,
                });
            }
        }

        let out_spatial = derive_output(&input.spatial, &kernel, &[1; MAX_SPATIAL_DIMS], &padding, &strides)?;
        let output = TensorShape::new(input.batch, input.channels, out_spatial)?;
        Ok(Self {
            kind,
            input,
            output,
            kernel,
            padding,
            strides,
        })
    }

    /// Global pooling: the window covers the whole input plane.
    pub fn global(kind: PoolingKind, input: TensorShape) -> Result<Self> {
        Self::new(kind, input, input.spatial.as_slice(), Padding::zero(), None)
    }

    /// Fail unless the derived output matches `dims` (`[N, C, spatial...]`).
    pub fn check_output_dims(&self, dims: &[usize]) -> Result<()> {
        let derived = self.output.dims();
        if derived != dims {
            return Err(KernelError::OutputShapeMismatch {
                expected: derived,
                got: dims.to_vec(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn kind(&self) -> PoolingKind {
        self.kind
    }

    #[inline]
    pub fn input_shape(&self) -> &TensorShape {
        &self.input
    }

    #[inline]
    pub fn output_shape(&self) -> &TensorShape {
        &self.output
    }

    #[inline]
    pub fn kernel(&self) -> &SpatialDims {
        &self.kernel
    }

    #[inline]
    pub fn padding(&self) -> &Padding {
        &self.padding
    }

    #[inline]
    pub fn strides(&self) -> [usize; MAX_SPATIAL_DIMS] {
        self.strides
    }

    /// Elements of scratch required by [`pool_nchwc`].
    pub fn nchwc_workspace_len(&self, layout: &NchwcLayout) -> usize {
        layout.blocked_len(&self.input) + layout.blocked_len(&self.output)
    }

    /// Clamped window `[start, end)` per axis for output pixel `p`.
    #[inline]
    pub(crate) fn window(&self, p: usize) -> ([usize; MAX_SPATIAL_DIMS], [usize; MAX_SPATIAL_DIMS]) {
        let [_, oh, ow] = self.output.spatial.full();
        let coords = [p / (oh * ow), (p / ow) % oh, p % ow];
        let input = self.input.spatial.full();
        let kernel = self.kernel.full();
        let mut start = [0; MAX_SPATIAL_DIMS];
        let mut end = [0; MAX_SPATIAL_DIMS];
        for axis in 0..MAX_SPATIAL_DIMS {
            let origin = (coords[axis] * self.strides[axis]) as i64 - self.padding.begin[axis] as i64;
            start[axis] = origin.max(0) as usize;
            end[axis] = ((origin + kernel[axis] as i64) as usize).min(input[axis]);
        }
        (start, end)
    }

    /// Divisor for an average over a window with `live` in-bounds elements.
    #[inline]
    pub(crate) fn divisor(&self, live: usize) -> f32 {
        match self.kind {
            PoolingKind::AverageIncludePad => self.kernel.volume() as f32,
            _ => live as f32,
        }
    }

    /// Pool a natural-layout `[N, C, spatial...]` buffer.
    ///
    /// # Panics
    /// If `input` or `output` is shorter than its shape.
    pub fn pool(&self, input: &[f32], output: &mut [f32], ctx: Option<&dyn WorkSplitter>) {
        let in_plane = self.input.plane();
        let out_plane = self.output.plane();
        assert!(input.len() >= self.input.elements(), "input too short");
        assert!(output.len() >= self.output.elements(), "output too short");
        let [_, ih, iw] = self.input.spatial.full();

        resolve(ctx).for_each_chunk(
            &mut output[..self.output.elements()],
            out_plane,
            &|plane: usize, dst: &mut [f32]| {
                let src = &input[plane * in_plane..][..in_plane];
                for (p, out) in dst.iter_mut().enumerate() {
                    let (start, end) = self.window(p);
                    let mut maximum = f32::MIN;
                    let mut sum = 0.0f32;
                    for z in start[0]..end[0] {
                        for y in start[1]..end[1] {
                            let row = &src[(z * ih + y) * iw..][..iw];
                            for &v in &row[start[2]..end[2]] {
                                if maximum < v {
                                    maximum = v;
                                }
                                sum += v;
                            }
                        }
                    }
                    *out = match self.kind {
                        PoolingKind::Maximum => maximum,
                        _ => {
                            let live = (end[0] - start[0]) * (end[1] - start[1]) * (end[2] - start[2]);
                            sum / self.divisor(live)
                        }
                    };
                }
            },
        );
    }
}

/// Validate and run a natural-layout pooling in one call.
///
/// `kernel_shape = None` pools globally over each plane; `padding` uses
/// the `[begin..., end...]` convention and defaults to zero; `output_shape`
/// must equal the derived `[N, C, out_spatial...]`.
#[allow(clippy::too_many_arguments)]
pub fn pool(
    kind: PoolingKind,
    input_shape: &[usize],
    kernel_shape: Option<&[usize]>,
    padding: Option<&[usize]>,
    strides: Option<&[usize]>,
    output_shape: &[usize],
    input: &[f32],
    output: &mut [f32],
    ctx: Option<&dyn WorkSplitter>,
) -> Result<()> {
    let shape = TensorShape::from_dims(input_shape)?;
    let params = match kernel_shape {
        Some(kernel) => {
            let padding = match padding {
                Some(pads) => Padding::new(shape.spatial.rank(), pads)?,
                None => Padding::zero(),
            };
            PoolParameters::new(kind, shape, kernel, padding, strides)?
        }
        None => PoolParameters::global(kind, shape)?,
    };
    params.check_output_dims(output_shape)?;
    params.pool(input, output, ctx);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[usize]) -> TensorShape {
        TensorShape::from_dims(dims).unwrap()
    }

    #[test]
    fn test_max_pool_ones() {
        let mut out = vec![0.0; 4];
        pool(
            PoolingKind::Maximum,
            &[1, 1, 4, 4],
            Some(&[3, 3]),
            None,
            None,
            &[1, 1, 2, 2],
            &[1.0; 16],
            &mut out,
            None,
        )
        .unwrap();
        assert_eq!(out, vec![1.0; 4]);
    }

    #[test]
    fn test_corner_divisors() {
        let params_for = |kind| {
            PoolParameters::new(
                kind,
                shape(&[1, 1, 4, 4]),
                &[3, 3],
                Padding::symmetric(2, &[1, 1]).unwrap(),
                None,
            )
            .unwrap()
        };
        let input = [1.0f32; 16];

        let mut include = vec![0.0; 16];
        params_for(PoolingKind::AverageIncludePad).pool(&input, &mut include, None);
        assert_eq!(include[0], 4.0 / 9.0);
        assert_eq!(include[15], 4.0 / 9.0);
        assert_eq!(include[1], 6.0 / 9.0);
        assert_eq!(include[5], 1.0);

        let mut exclude = vec![0.0; 16];
        params_for(PoolingKind::AverageExcludePad).pool(&input, &mut exclude, None);
        assert_eq!(exclude, vec![1.0; 16]);
    }

    #[test]
    fn test_max_pool_negative_values_and_stride() {
        let input: Vec<f32> = (0..10).map(|v| -(v as f32)).collect();
        let params = PoolParameters::new(PoolingKind::Maximum, shape(&[1, 1, 10]), &[3], Padding::zero(), Some(&[4])).unwrap();
        assert_eq!(params.output_shape().dims(), vec![1, 1, 2]);
        let mut out = vec![0.0; 2];
        params.pool(&input, &mut out, None);
        assert_eq!(out, vec![0.0, -4.0]);
    }

    #[test]
    fn test_global_average() {
        let input: Vec<f32> = (0..2 * 2 * 3).map(|v| v as f32).collect();
        let mut out = vec![0.0; 2];
        pool(
            PoolingKind::AverageExcludePad,
            &[1, 2, 2, 3],
            None,
            None,
            None,
            &[1, 2, 1, 1],
            &input,
            &mut out,
            None,
        )
        .unwrap();
        assert_eq!(out, vec![2.5, 8.5]);
    }

    #[test]
    fn test_pool_3d_include_pad() {
        let params = PoolParameters::new(
            PoolingKind::AverageIncludePad,
            shape(&[1, 1, 2, 2, 2]),
            &[2, 2, 2],
            Padding::new(3, &[1, 0, 0, 0, 0, 0]).unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(params.output_shape().dims(), vec![1, 1, 2, 1, 1]);
        let mut out = vec![0.0; 2];
        params.pool(&[8.0; 8], &mut out, None);
        // First window hangs one slice into the padding.
        assert_eq!(out, vec![4.0, 8.0]);
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            PoolParameters::new(
                PoolingKind::Maximum,
                shape(&[1, 1, 4, 4]),
                &[2, 2],
                Padding::new(2, &[0, 2, 0, 0]).unwrap(),
                None,
            ),
            Err(KernelError::PaddingExceedsKernel {
                axis: 1,
                padding: 2,
                kernel: 2
            })
        );
        assert!(matches!(
            PoolParameters::new(PoolingKind::Maximum, shape(&[1, 1, 4, 4]), &[2], Padding::zero(), None),
            Err(KernelError::DimensionMismatch(_))
        ));
        assert!(matches!(
            PoolParameters::new(
                PoolingKind::Maximum,
                shape(&[1, 1, 4]),
                &[2],
                Padding::new(2, &[1, 0, 0, 0]).unwrap(),
                None
            ),
            Err(KernelError::DimensionMismatch(_))
        ));
        assert_eq!(
            PoolParameters::new(PoolingKind::Maximum, shape(&[1, 1, 2, 2]), &[3, 1], Padding::zero(), None),
            Err(KernelError::EmptyOutput { axis: 0, value: 0 })
        );

        let mut out = vec![0.0; 9];
        assert_eq!(
            pool(
                PoolingKind::Maximum,
                &[1, 1, 4, 4],
                Some(&[2, 2]),
                None,
                None,
                &[1, 1, 3, 2],
                &[0.0; 16],
                &mut out,
                None,
            ),
            Err(KernelError::OutputShapeMismatch {
                expected: vec![1, 1, 3, 3],
                got: vec![1, 1, 3, 2],
            })
        );
    }
}
