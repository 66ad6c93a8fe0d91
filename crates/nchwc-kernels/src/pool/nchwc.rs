//! Pooling on NCHWc buffers.

use super::{PoolParameters, PoolingKind};
use crate::layout::NchwcLayout;
use crate::parallel::{resolve, WorkSplitter};

/// Pool a blocked `[N][Cp/B][spatial...][B]` buffer into a blocked output.
///
/// Every lane is reduced exactly as the natural-layout kernel reduces its
/// plane, so real channels match [`PoolParameters::pool`] bit for bit.
/// Tail lanes read the zero padding and stay finite.
///
/// # Panics
/// If either buffer is shorter than its blocked length under `layout`.
pub fn nchwc_pool(
    params: &PoolParameters,
    layout: &NchwcLayout,
    input: &[f32],
    output: &mut [f32],
    ctx: Option<&dyn WorkSplitter>,
) {
    let block = layout.block_size();
    let in_shape = params.input_shape();
    let out_shape = params.output_shape();
    let in_len = layout.blocked_len(in_shape);
    let out_len = layout.blocked_len(out_shape);
    assert!(input.len() >= in_len, "blocked input too short");
    assert!(output.len() >= out_len, "blocked output too short");

    let in_block = in_shape.plane() * block;
    let [_, ih, iw] = in_shape.spatial.full();
    let kind = params.kind();

    resolve(ctx).for_each_chunk(
        &mut output[..out_len],
        out_shape.plane() * block,
        &|index: usize, dst: &mut [f32]| {
            let src = &input[index * in_block..][..in_block];
            let mut maximum = vec![f32::MIN; block];
            let mut sum = vec![0.0f32; block];

            for (p, pixel) in dst.chunks_exact_mut(block).enumerate() {
                let (start, end) = params.window(p);
                maximum.fill(f32::MIN);
                sum.fill(0.0);
                for z in start[0]..end[0] {
                    for y in start[1]..end[1] {
                        for x in start[2]..end[2] {
                            let lanes = &src[((z * ih + y) * iw + x) * block..][..block];
                            for ((m, s), &v) in maximum.iter_mut().zip(sum.iter_mut()).zip(lanes) {
                                if *m < v {
                                    *m = v;
                                }
                                *s += v;
                            }
                        }
                    }
                }

                match kind {
                    PoolingKind::Maximum => pixel.copy_from_slice(&maximum),
                    _ => {
                        let live = (end[0] - start[0]) * (end[1] - start[1]) * (end[2] - start[2]);
                        let divisor = params.divisor(live);
                        for (out, &s) in pixel.iter_mut().zip(sum.iter()) {
                            *out = s / divisor;
                        }
                    }
                }
            }
        },
    );
}

/// Blocked pooling on natural-layout buffers.
///
/// Reorders the input into `workspace`, runs [`nchwc_pool`] and reorders
/// the result back. `workspace` must hold
/// [`PoolParameters::nchwc_workspace_len`] elements.
pub fn pool_nchwc(
    params: &PoolParameters,
    layout: &NchwcLayout,
    input: &[f32],
    workspace: &mut [f32],
    output: &mut [f32],
    ctx: Option<&dyn WorkSplitter>,
) {
    assert!(
        workspace.len() >= params.nchwc_workspace_len(layout),
        "NCHWc workspace too short"
    );
    let (blocked_input, rest) = workspace.split_at_mut(layout.blocked_len(params.input_shape()));
    let blocked_output = &mut rest[..layout.blocked_len(params.output_shape())];

    layout.reorder_input(params.input_shape(), input, blocked_input, ctx);
    nchwc_pool(params, layout, blocked_input, blocked_output, ctx);
    layout.reorder_output(params.output_shape(), blocked_output, output, ctx);
}
