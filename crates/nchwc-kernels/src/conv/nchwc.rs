//! Block-native convolution kernels and the reorder orchestrator.

use super::{ConvParameters, NchwcStrategy};
use crate::layout::MAX_BLOCK_SIZE;
use crate::parallel::{resolve, WorkSplitter};
use crate::types::{Activation, MAX_SPATIAL_DIMS};

/// Input values addressed by (batch, absolute channel, spatial offset).
trait ChannelSource: Sync {
    fn at(&self, n: usize, c: usize, s: usize) -> f32;
}

struct NchwSource<'a> {
    data: &'a [f32],
    channels: usize,
    plane: usize,
}

impl ChannelSource for NchwSource<'_> {
    #[inline(always)]
    fn at(&self, n: usize, c: usize, s: usize) -> f32 {
        self.data[(n * self.channels + c) * self.plane + s]
    }
}

struct NchwcSource<'a> {
    data: &'a [f32],
    blocks: usize,
    plane: usize,
    block: usize,
}

impl NchwcSource<'_> {
    /// All `B` lanes of channel block `cb` at spatial offset `s`.
    #[inline(always)]
    fn pixel(&self, n: usize, cb: usize, s: usize) -> &[f32] {
        &self.data[((n * self.blocks + cb) * self.plane + s) * self.block..][..self.block]
    }
}

impl ChannelSource for NchwcSource<'_> {
    #[inline(always)]
    fn at(&self, n: usize, c: usize, s: usize) -> f32 {
        let cb = c / self.block;
        self.data[((n * self.blocks + cb) * self.plane + s) * self.block + c % self.block]
    }
}

/// Weights addressed by (output block, input channel within the group,
/// kernel tap). Each address yields the `B` output lanes of the block,
/// which are contiguous in both blocked filter layouts.
trait FilterView: Sync {
    fn lanes(&self, ob: usize, i: usize, k: usize) -> &[f32];
}

struct Oihwbo<'a> {
    data: &'a [f32],
    inputs: usize,
    taps: usize,
    block: usize,
}

impl FilterView for Oihwbo<'_> {
    #[inline(always)]
    fn lanes(&self, ob: usize, i: usize, k: usize) -> &[f32] {
        &self.data[((ob * self.inputs + i) * self.taps + k) * self.block..][..self.block]
    }
}

struct Oihwbibo<'a> {
    data: &'a [f32],
    in_blocks: usize,
    taps: usize,
    block: usize,
}

impl FilterView for Oihwbibo<'_> {
    #[inline(always)]
    fn lanes(&self, ob: usize, i: usize, k: usize) -> &[f32] {
        let ib = i / self.block;
        let bi = i % self.block;
        let at = (((ob * self.in_blocks + ib) * self.taps + k) * self.block + bi) * self.block;
        &self.data[at..][..self.block]
    }
}

/// Sliding-window geometry as `[depth, height, width]` arrays.
#[derive(Clone, Copy)]
struct Window {
    input: [usize; MAX_SPATIAL_DIMS],
    output: [usize; MAX_SPATIAL_DIMS],
    kernel: [usize; MAX_SPATIAL_DIMS],
    stride: [usize; MAX_SPATIAL_DIMS],
    dilation: [usize; MAX_SPATIAL_DIMS],
    pad: [usize; MAX_SPATIAL_DIMS],
}

impl Window {
    fn new(params: &ConvParameters) -> Self {
        Self {
            input: params.input_shape().spatial.full(),
            output: params.output_shape().spatial.full(),
            kernel: params.kernel().full(),
            stride: params.strides(),
            dilation: params.dilations(),
            pad: params.padding().begin,
        }
    }

    #[inline]
    fn output_coords(&self, p: usize) -> [usize; MAX_SPATIAL_DIMS] {
        let [_, oh, ow] = self.output;
        [p / (oh * ow), (p / ow) % oh, p % ow]
    }

    /// Call `f(tap, input offset)` for every in-bounds tap of output `p`,
    /// in kernel order.
    #[inline]
    fn for_each_tap(&self, p: usize, mut f: impl FnMut(usize, usize)) {
        let [id, ih, iw] = self.input;
        let [kd, kh, kw] = self.kernel;
        let [oz, oy, ox] = self.output_coords(p);
        for z in 0..kd {
            let iz = (oz * self.stride[0] + z * self.dilation[0]).wrapping_sub(self.pad[0]);
            if iz >= id {
                continue;
            }
            for y in 0..kh {
                let iy = (oy * self.stride[1] + y * self.dilation[1]).wrapping_sub(self.pad[1]);
                if iy >= ih {
                    continue;
                }
                for x in 0..kw {
                    let ix = (ox * self.stride[2] + x * self.dilation[2]).wrapping_sub(self.pad[2]);
                    if ix >= iw {
                        continue;
                    }
                    f((z * kh + y) * kw + x, (iz * ih + iy) * iw + ix);
                }
            }
        }
    }

    /// Input offset under a 1×1 unpadded kernel.
    #[inline]
    fn pointwise_source(&self, p: usize) -> usize {
        let [_, ih, iw] = self.input;
        let [oz, oy, ox] = self.output_coords(p);
        (oz * self.stride[0] * ih + oy * self.stride[1]) * iw + ox * self.stride[2]
    }
}

/// `acc[j] += w[j] * x` over the shorter of the two slices.
#[inline(always)]
fn axpy(acc: &mut [f32], w: &[f32], x: f32) {
    for (sum, &wv) in acc.iter_mut().zip(w) {
        *sum += wv * x;
    }
}

/// Per-call constants shared by every output block.
struct BlockPlan<'a> {
    block: usize,
    out_channels: usize,
    out_blocks: usize,
    out_plane: usize,
    icpg: usize,
    ocpg: usize,
    window: Window,
    bias: Option<&'a [f32]>,
    activation: Activation,
}

impl BlockPlan<'_> {
    /// Lanes of block `ob` that map to real output channels.
    #[inline]
    fn live_lanes(&self, ob: usize) -> usize {
        self.block.min(self.out_channels - ob * self.block)
    }

    /// Write one output pixel: bias, activation, zero tail.
    #[inline]
    fn store(&self, ob: usize, live: usize, acc: &[f32], dst: &mut [f32]) {
        for (bo, out) in dst.iter_mut().enumerate() {
            *out = if bo < live {
                let mut v = acc[bo];
                if let Some(bias) = self.bias {
                    v += bias[ob * self.block + bo];
                }
                self.activation.apply(v)
            } else {
                0.0
            };
        }
    }

    /// One input channel per lane: lane `bo` of block `ob` reads channel
    /// `ob * B + bo` of the same block.
    fn depthwise(&self, x: &NchwcSource<'_>, w: &Oihwbo<'_>, n: usize, ob: usize, p: usize, acc: &mut [f32]) {
        self.window.for_each_tap(p, |k, s| {
            let xs = x.pixel(n, ob, s);
            let ws = w.lanes(ob, 0, k);
            for ((sum, &wv), &xv) in acc.iter_mut().zip(ws).zip(xs) {
                *sum += wv * xv;
            }
        });
    }

    fn pointwise(&self, x: &NchwcSource<'_>, w: &Oihwbibo<'_>, n: usize, ob: usize, p: usize, acc: &mut [f32]) {
        let s = self.window.pointwise_source(p);
        for i in 0..self.icpg {
            axpy(acc, w.lanes(ob, i, 0), x.at(n, i, s));
        }
    }

    /// Lanes of one output block split into runs that share a group, so
    /// each run reads the same input channels.
    fn grouped<X: ChannelSource, W: FilterView>(
        &self,
        x: &X,
        w: &W,
        n: usize,
        ob: usize,
        p: usize,
        acc: &mut [f32],
    ) {
        let first = ob * self.block;
        let live = acc.len();
        let mut lo = 0;
        while lo < live {
            let g = (first + lo) / self.ocpg;
            let hi = ((g + 1) * self.ocpg - first).min(live);
            let ic0 = g * self.icpg;
            let run = &mut acc[lo..hi];
            for i in 0..self.icpg {
                self.window.for_each_tap(p, |k, s| {
                    axpy(run, &w.lanes(ob, i, k)[lo..hi], x.at(n, ic0 + i, s));
                });
            }
            lo = hi;
        }
    }

    fn run_block<F>(&self, index: usize, dst: &mut [f32], pixel_sum: &F)
    where
        F: Fn(usize, usize, usize, &mut [f32]) + Sync,
    {
        let n = index / self.out_blocks;
        let ob = index % self.out_blocks;
        let live = self.live_lanes(ob);
        let mut scratch = [0.0f32; MAX_BLOCK_SIZE];

        for (p, pixel) in dst.chunks_exact_mut(self.block).enumerate() {
            let acc = &mut scratch[..live];
            acc.fill(0.0);
            pixel_sum(n, ob, p, acc);
            self.store(ob, live, &scratch[..live], pixel);
        }
    }

    /// Run `pixel_sum(n, ob, p, acc)` for every output pixel, one output
    /// block per chunk. `acc` holds the block's live lanes, zeroed.
    fn run<F>(&self, output: &mut [f32], ctx: Option<&dyn WorkSplitter>, pixel_sum: F)
    where
        F: Fn(usize, usize, usize, &mut [f32]) + Sync,
    {
        resolve(ctx).for_each_chunk(
            output,
            self.out_plane * self.block,
            &|index: usize, dst: &mut [f32]| self.run_block(index, dst, &pixel_sum),
        );
    }
}

/// Convolve pre-reordered buffers.
///
/// The buffer layouts follow [`ConvParameters::strategy`]:
///
/// | Strategy | input | filter |
/// |----------|-------|--------|
/// | `Depthwise` | NCHWc | OIHWBo |
/// | `Pointwise`, `Nchwc` | NCHWc | OIHWBiBo |
/// | `Nchw` | NCHW | OIHWBo |
///
/// `output` is NCHWc with [`ConvParameters::nchwc_output_len`] elements;
/// lanes past the last real output channel are written as zero. `bias`
/// holds at least one value per real output channel (an aligned bias is
/// accepted).
///
/// # Panics
/// If any buffer is shorter than the parameters require.
pub fn nchwc_conv(
    params: &ConvParameters,
    input: &[f32],
    filter: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
    ctx: Option<&dyn WorkSplitter>,
) {
    let layout = params.layout();
    let block = layout.block_size();
    let in_shape = params.input_shape();
    let out_shape = params.output_shape();
    let strategy = params.strategy();
    let taps = params.kernel().volume();

    assert!(input.len() >= params.nchwc_input_len(), "blocked input too short");
    assert!(filter.len() >= params.nchwc_filter_len(), "blocked filter too short");
    assert!(output.len() >= params.nchwc_output_len(), "blocked output too short");
    if let Some(bias) = bias {
        assert!(bias.len() >= out_shape.channels, "bias too short");
    }

    let plan = BlockPlan {
        block,
        out_channels: out_shape.channels,
        out_blocks: layout.channel_blocks(out_shape.channels),
        out_plane: out_shape.plane(),
        icpg: params.input_channels_per_group(),
        ocpg: params.output_channels_per_group(),
        window: Window::new(params),
        bias,
        activation: params.activation(),
    };
    let output = &mut output[..params.nchwc_output_len()];

    let blocked_input = NchwcSource {
        data: input,
        blocks: layout.channel_blocks(in_shape.channels),
        plane: in_shape.plane(),
        block,
    };
    let oihwbo = Oihwbo {
        data: filter,
        inputs: plan.icpg,
        taps,
        block,
    };
    let oihwbibo = Oihwbibo {
        data: filter,
        in_blocks: layout.channel_blocks(plan.icpg),
        taps,
        block,
    };

    match strategy {
        NchwcStrategy::Depthwise => plan.run(output, ctx, |n, ob, p, acc: &mut [f32]| {
            plan.depthwise(&blocked_input, &oihwbo, n, ob, p, acc)
        }),
        NchwcStrategy::Pointwise => plan.run(output, ctx, |n, ob, p, acc: &mut [f32]| {
            plan.pointwise(&blocked_input, &oihwbibo, n, ob, p, acc)
        }),
        NchwcStrategy::Nchwc => plan.run(output, ctx, |n, ob, p, acc: &mut [f32]| {
            plan.grouped(&blocked_input, &oihwbibo, n, ob, p, acc)
        }),
        NchwcStrategy::Nchw => {
            let natural = NchwSource {
                data: input,
                channels: in_shape.channels,
                plane: in_shape.plane(),
            };
            plan.run(output, ctx, |n, ob, p, acc: &mut [f32]| {
                plan.grouped(&natural, &oihwbo, n, ob, p, acc)
            })
        }
    }
}

/// Blocked convolution on natural-layout buffers.
///
/// Reorders the input (when the strategy needs it), the filter and the
/// bias into `workspace`, runs [`nchwc_conv`] and reorders the result back
/// into `output`. `workspace` must hold
/// [`ConvParameters::nchwc_workspace_len`] elements.
///
/// Produces exactly the same values as [`conv`](super::conv).
pub fn conv_nchwc(
    params: &ConvParameters,
    input: &[f32],
    filter: &[f32],
    bias: Option<&[f32]>,
    workspace: &mut [f32],
    output: &mut [f32],
    ctx: Option<&dyn WorkSplitter>,
) {
    assert!(
        workspace.len() >= params.nchwc_workspace_len(),
        "NCHWc workspace too short"
    );
    let layout = params.layout();
    let strategy = params.strategy();
    let out_channels = params.output_shape().channels;

    let input_len = if strategy.reorders_input() {
        params.nchwc_input_len()
    } else {
        0
    };
    let (blocked_input, rest) = workspace.split_at_mut(input_len);
    let (blocked_filter, rest) = rest.split_at_mut(params.nchwc_filter_len());
    let (aligned_bias, rest) = rest.split_at_mut(params.nchwc_bias_len());
    let blocked_output = &mut rest[..params.nchwc_output_len()];

    let source: &[f32] = if strategy.reorders_input() {
        layout.reorder_input(params.input_shape(), input, blocked_input, ctx);
        &*blocked_input
    } else {
        input
    };

    if strategy.uses_oihwbo() {
        layout.reorder_filter_oihwbo(params.filter_shape(), filter, blocked_filter);
    } else {
        layout.reorder_filter_oihwbibo(params.filter_shape(), filter, blocked_filter);
    }

    let bias = match bias {
        Some(bias) => {
            layout.align_bias(&bias[..out_channels], aligned_bias);
            Some(&*aligned_bias)
        }
        None => None,
    };

    nchwc_conv(params, source, blocked_filter, bias, blocked_output, ctx);
    layout.reorder_output(params.output_shape(), blocked_output, output, ctx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::{conv, ConvDescriptor};
    use crate::layout::NchwcLayout;
    use crate::types::{FilterShape, Padding, SpatialDims, TensorShape};

    fn values(len: usize, seed: u32) -> Vec<f32> {
        (0..len as u32)
            .map(|i| ((i.wrapping_mul(2654435761).wrapping_add(seed)) % 97) as f32 / 16.0 - 3.0)
            .collect()
    }

    fn both_paths(desc: &ConvDescriptor, with_bias: bool) -> (Vec<f32>, Vec<f32>) {
        let params = ConvParameters::prepare(desc).unwrap();
        let x = values(params.input_shape().elements(), 1);
        let w = values(params.filter_shape().elements(), 2);
        let b = values(params.output_shape().channels, 3);
        let bias = if with_bias { Some(b.as_slice()) } else { None };

        let mut working = vec![0.0; params.working_buffer_len()];
        let mut direct = vec![f32::NAN; params.output_shape().elements()];
        conv(&params, &x, &w, bias, &mut working, &mut direct, None);

        let mut workspace = vec![f32::NAN; params.nchwc_workspace_len()];
        let mut blocked = vec![f32::NAN; params.output_shape().elements()];
        conv_nchwc(&params, &x, &w, bias, &mut workspace, &mut blocked, None);
        (direct, blocked)
    }

    fn assert_bitwise(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert_eq!(x.to_bits(), y.to_bits(), "element {}: {} vs {}", i, x, y);
        }
    }

    fn desc(c: usize, o: usize, i: usize, kernel: &[usize], block: usize) -> ConvDescriptor {
        ConvDescriptor::new(
            TensorShape::new(2, c, SpatialDims::new(&[6, 5]).unwrap()).unwrap(),
            FilterShape::new(o, i, SpatialDims::new(kernel).unwrap()).unwrap(),
        )
        .padding(Padding::new(2, &[1, 0, 1, 2]).unwrap())
        .layout(NchwcLayout::with_block_size(block).unwrap())
    }

    #[test]
    fn test_nchw_strategy_matches_direct() {
        let d = desc(3, 6, 3, &[3, 3], 4);
        assert_eq!(ConvParameters::prepare(&d).unwrap().strategy(), NchwcStrategy::Nchw);
        let (direct, blocked) = both_paths(&d, true);
        assert_bitwise(&direct, &blocked);
    }

    #[test]
    fn test_depthwise_matches_direct() {
        let d = desc(5, 5, 1, &[3, 3], 4).groups(5).strides(&[2, 1]);
        assert_eq!(ConvParameters::prepare(&d).unwrap().strategy(), NchwcStrategy::Depthwise);
        let (direct, blocked) = both_paths(&d, true);
        assert_bitwise(&direct, &blocked);
    }

    #[test]
    fn test_grouped_nchwc_straddling_blocks() {
        // 3 output channels per group with B=4: blocks mix groups.
        let d = desc(8, 6, 4, &[2, 3], 4).groups(2).dilations(&[2, 1]);
        assert_eq!(ConvParameters::prepare(&d).unwrap().strategy(), NchwcStrategy::Nchwc);
        let (direct, blocked) = both_paths(&d, false);
        assert_bitwise(&direct, &blocked);
    }

    #[test]
    fn test_pointwise_strided_matches_direct() {
        let d = ConvDescriptor::new(
            TensorShape::new(1, 9, SpatialDims::new(&[5, 7]).unwrap()).unwrap(),
            FilterShape::new(7, 9, SpatialDims::new(&[1, 1]).unwrap()).unwrap(),
        )
        .strides(&[2, 3])
        .layout(NchwcLayout::with_block_size(8).unwrap());
        assert_eq!(ConvParameters::prepare(&d).unwrap().strategy(), NchwcStrategy::Pointwise);
        let (direct, blocked) = both_paths(&d, true);
        assert_bitwise(&direct, &blocked);
    }

    #[test]
    fn test_largest_block_size_matches_direct() {
        let block = MAX_BLOCK_SIZE;
        let depthwise = desc(block + 6, block + 6, 1, &[3, 3], block).groups(block + 6);
        assert_eq!(
            ConvParameters::prepare(&depthwise).unwrap().strategy(),
            NchwcStrategy::Depthwise
        );
        let (direct, blocked) = both_paths(&depthwise, true);
        assert_bitwise(&direct, &blocked);

        let dense = desc(block, block + 3, block, &[2, 2], block);
        assert_eq!(ConvParameters::prepare(&dense).unwrap().strategy(), NchwcStrategy::Nchwc);
        let (direct, blocked) = both_paths(&dense, true);
        assert_bitwise(&direct, &blocked);
    }

    #[test]
    fn test_tail_lanes_written_as_zero() {
        let d = desc(3, 3, 3, &[1, 1], 4);
        let params = ConvParameters::prepare(&d).unwrap();
        let layout = params.layout();
        let x = values(params.input_shape().elements(), 7);
        let w = values(params.filter_shape().elements(), 8);

        let mut filter = vec![0.0; params.nchwc_filter_len()];
        layout.reorder_filter_oihwbo(params.filter_shape(), &w, &mut filter);
        let mut out = vec![f32::NAN; params.nchwc_output_len()];
        nchwc_conv(&params, &x, &filter, None, &mut out, None);

        for pixel in out.chunks_exact(4) {
            assert_eq!(pixel[3], 0.0);
            assert!(pixel[..3].iter().all(|v| v.is_finite()));
        }
    }
}
