//! Direct convolution through the GEMM engine.

use super::{ConvAlgorithm, ConvParameters};
use crate::api::sgemm;
use crate::core::Transpose;
use crate::parallel::{resolve, WorkSplitter};

/// Convolve natural-layout buffers.
///
/// For each batch and group the receptive fields are expanded into
/// `working` (skipped for [`ConvAlgorithm::GemmDirect`]) and multiplied by
/// the group's filter rows, writing straight into `output`. Bias is then
/// added per output channel and the activation applied.
///
/// # Arguments
/// - `input`: `[N, C, spatial...]`
/// - `filter`: `[O, C / groups, kernel...]`
/// - `bias`: `O` values, or `None`
/// - `working`: at least [`ConvParameters::working_buffer_len`] elements
/// - `output`: `[N, O, out_spatial...]`
///
/// # Panics
/// If any buffer is shorter than the parameters require.
pub fn conv(
    params: &ConvParameters,
    input: &[f32],
    filter: &[f32],
    bias: Option<&[f32]>,
    working: &mut [f32],
    output: &mut [f32],
    ctx: Option<&dyn WorkSplitter>,
) {
    let in_shape = params.input_shape();
    let out_shape = params.output_shape();
    assert!(input.len() >= in_shape.elements(), "input too short");
    assert!(filter.len() >= params.filter_shape().elements(), "filter too short");
    assert!(output.len() >= out_shape.elements(), "output too short");
    assert!(working.len() >= params.working_buffer_len(), "working buffer too short");
    if let Some(bias) = bias {
        assert!(bias.len() >= out_shape.channels, "bias too short");
    }

    let in_plane = in_shape.plane();
    let out_plane = out_shape.plane();
    let icpg = params.input_channels_per_group();
    let ocpg = params.output_channels_per_group();
    let depth = icpg * params.kernel().volume();
    let group_filter = ocpg * depth;

    for n in 0..in_shape.batch {
        for g in 0..params.groups() {
            let group_input = &input[(n * in_shape.channels + g * icpg) * in_plane..][..icpg * in_plane];
            let first_oc = n * out_shape.channels + g * ocpg;
            let group_output = &mut output[first_oc * out_plane..][..ocpg * out_plane];
            // sgemm reads C even with beta = 0.
            group_output.fill(0.0);

            let columns: &[f32] = match params.algorithm() {
                ConvAlgorithm::GemmDirect => group_input,
                ConvAlgorithm::Expand => {
                    let cols = &mut working[..depth * out_plane];
                    im2col(params, group_input, cols, ctx);
                    &*cols
                }
            };

            sgemm(
                Transpose::NoTrans,
                Transpose::NoTrans,
                ocpg,
                out_plane,
                depth,
                1.0,
                &filter[g * group_filter..][..group_filter],
                depth,
                columns,
                out_plane,
                0.0,
                group_output,
                out_plane,
                ctx,
            );

            let group_bias = bias.map(|b| &b[g * ocpg..(g + 1) * ocpg]);
            finish_planes(group_output, out_plane, group_bias, params, ctx);
        }
    }
}

/// Expand one group's input into `[channel * kernel volume][out_plane]` columns.
///
/// Row `c * KS + ((kd * KH) + ky) * KW + kx` holds, for every output
/// position, the input value under that kernel tap or zero where the tap
/// lands in padding.
fn im2col(params: &ConvParameters, input: &[f32], cols: &mut [f32], ctx: Option<&dyn WorkSplitter>) {
    let [id, ih, iw] = params.input_shape().spatial.full();
    let [od, oh, ow] = params.output_shape().spatial.full();
    let [kd, kh, kw] = params.kernel().full();
    let [sd, sh, sw] = params.strides();
    let [dd, dh, dw] = params.dilations();
    let [pd, ph, pw] = params.padding().begin;
    let ks = kd * kh * kw;
    let in_plane = id * ih * iw;

    resolve(ctx).for_each_chunk(
        cols,
        od * oh * ow,
        &|row: usize, dst: &mut [f32]| {
            let c = row / ks;
            let tap = row % ks;
            let (z, y, x) = (tap / (kh * kw), (tap / kw) % kh, tap % kw);
            let plane = &input[c * in_plane..][..in_plane];

            let mut out = dst.iter_mut();
            for oz in 0..od {
                let iz = (oz * sd + z * dd).wrapping_sub(pd);
                for oy in 0..oh {
                    let iy = (oy * sh + y * dh).wrapping_sub(ph);
                    for ox in 0..ow {
                        let ix = (ox * sw + x * dw).wrapping_sub(pw);
                        let value = if iz < id && iy < ih && ix < iw {
                            plane[(iz * ih + iy) * iw + ix]
                        } else {
                            0.0
                        };
                        if let Some(slot) = out.next() {
                            *slot = value;
                        }
                    }
                }
            }
        },
    );
}

/// Add per-channel bias and apply the activation over consecutive planes.
fn finish_planes(
    planes: &mut [f32],
    plane_len: usize,
    bias: Option<&[f32]>,
    params: &ConvParameters,
    ctx: Option<&dyn WorkSplitter>,
) {
    let activation = params.activation();
    if bias.is_none() && activation.is_identity() {
        return;
    }
    resolve(ctx).for_each_chunk(
        planes,
        plane_len,
        &|channel: usize, plane: &mut [f32]| {
            if let Some(bias) = bias {
                let b = bias[channel];
                for v in plane.iter_mut() {
                    *v += b;
                }
            }
            activation.apply_slice(plane);
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::{ConvDescriptor, ConvParameters};
    use crate::types::{Activation, FilterShape, Padding, SpatialDims, TensorShape};

    fn prepare(desc: ConvDescriptor) -> ConvParameters {
        ConvParameters::prepare(&desc).unwrap()
    }

    fn run(params: &ConvParameters, x: &[f32], w: &[f32], bias: Option<&[f32]>) -> Vec<f32> {
        let mut working = vec![f32::NAN; params.working_buffer_len()];
        let mut y = vec![f32::NAN; params.output_shape().elements()];
        conv(params, x, w, bias, &mut working, &mut y, None);
        y
    }

    fn shapes(n: usize, c: usize, spatial: &[usize], o: usize, i: usize, k: &[usize]) -> ConvDescriptor {
        ConvDescriptor::new(
            TensorShape::new(n, c, SpatialDims::new(spatial).unwrap()).unwrap(),
            FilterShape::new(o, i, SpatialDims::new(k).unwrap()).unwrap(),
        )
    }

    #[test]
    fn test_padded_3x3_sum() {
        // All-ones 3x3 input and kernel, padding 1: counts of in-bounds taps.
        let params = prepare(shapes(1, 1, &[3, 3], 1, 1, &[3, 3]).padding(Padding::symmetric(2, &[1, 1]).unwrap()));
        let y = run(&params, &[1.0; 9], &[1.0; 9], None);
        assert_eq!(y, vec![4.0, 6.0, 4.0, 6.0, 9.0, 6.0, 4.0, 6.0, 4.0]);
    }

    #[test]
    fn test_bias_and_activation() {
        let params = prepare(shapes(1, 1, &[2, 2], 2, 1, &[1, 1]).activation(Activation::Relu));
        assert_eq!(params.algorithm(), ConvAlgorithm::GemmDirect);
        let x = [1.0, -2.0, 3.0, -4.0];
        let w = [1.0, 2.0];
        let y = run(&params, &x, &w, Some(&[0.5, -10.0]));
        assert_eq!(y, vec![1.5, 0.0, 3.5, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_groups_stay_separate() {
        // Two groups of one channel each, 1x1 kernel, channel multiplier 2.
        let params = prepare(shapes(1, 2, &[1, 2], 4, 1, &[1, 1]).groups(2));
        let x = [1.0, 2.0, 10.0, 20.0];
        let w = [1.0, -1.0, 2.0, 3.0];
        let y = run(&params, &x, &w, None);
        assert_eq!(y, vec![1.0, 2.0, -1.0, -2.0, 20.0, 40.0, 30.0, 60.0]);
    }

    #[test]
    fn test_stride_and_dilation_1d() {
        // x = 0..8, kernel taps at offsets 0 and 2, stride 3.
        let params = prepare(shapes(1, 1, &[8], 1, 1, &[2]).strides(&[3]).dilations(&[2]));
        let x: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let y = run(&params, &x, &[1.0, 10.0], None);
        // outputs at 0, 3: (0 + 20), (3 + 50)
        assert_eq!(y, vec![20.0, 53.0]);
    }
}
