//! Activation tensor reorders between NCHW and NCHWc.

use crate::parallel::{resolve, WorkSplitter};
use crate::types::TensorShape;

/// One unit of work per (batch, channel block): `plane * B` contiguous outputs.
pub(super) fn to_blocked(
    block: usize,
    shape: &TensorShape,
    input: &[f32],
    output: &mut [f32],
    ctx: Option<&dyn WorkSplitter>,
) {
    let channels = shape.channels;
    let plane = shape.plane();
    let blocks = channels.div_ceil(block);
    let total = shape.batch * blocks * plane * block;
    assert!(input.len() >= shape.elements(), "NCHW input too short");
    assert!(output.len() >= total, "NCHWc output too short");

    resolve(ctx).for_each_chunk(
        &mut output[..total],
        plane * block,
        &|index: usize, dst: &mut [f32]| {
            let n = index / blocks;
            let c0 = (index % blocks) * block;
            let live = block.min(channels - c0);
            for lane in 0..live {
                let src = &input[(n * channels + c0 + lane) * plane..][..plane];
                for (s, &v) in src.iter().enumerate() {
                    dst[s * block + lane] = v;
                }
            }
            if live < block {
                for pixel in dst.chunks_exact_mut(block) {
                    pixel[live..].fill(0.0);
                }
            }
        },
    );
}

/// One unit of work per natural channel plane.
pub(super) fn from_blocked(
    block: usize,
    shape: &TensorShape,
    blocked: &[f32],
    output: &mut [f32],
    ctx: Option<&dyn WorkSplitter>,
) {
    let channels = shape.channels;
    let plane = shape.plane();
    let blocks = channels.div_ceil(block);
    assert!(
        blocked.len() >= shape.batch * blocks * plane * block,
        "NCHWc input too short"
    );
    assert!(output.len() >= shape.elements(), "NCHW output too short");

    resolve(ctx).for_each_chunk(
        &mut output[..shape.elements()],
        plane,
        &|index: usize, dst: &mut [f32]| {
            let n = index / channels;
            let c = index % channels;
            let base = (n * blocks + c / block) * plane * block;
            let lane = c % block;
            for (s, v) in dst.iter_mut().enumerate() {
                *v = blocked[base + s * block + lane];
            }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpatialDims;

    fn shape(n: usize, c: usize, spatial: &[usize]) -> TensorShape {
        TensorShape::new(n, c, SpatialDims::new(spatial).unwrap()).unwrap()
    }

    #[test]
    fn test_to_blocked_interleaves_and_zero_fills() {
        // 3 channels, 2 pixels, B=4.
        let s = shape(1, 3, &[2]);
        let input = [1.0, 2.0, 10.0, 20.0, 100.0, 200.0];
        let mut out = vec![f32::NAN; 8];
        to_blocked(4, &s, &input, &mut out, None);
        assert_eq!(out, vec![1.0, 10.0, 100.0, 0.0, 2.0, 20.0, 200.0, 0.0]);
    }

    #[test]
    fn test_round_trip_preserves_negative_zero() {
        let s = shape(2, 5, &[2, 3]);
        let input: Vec<f32> = (0..s.elements())
            .map(|i| if i % 7 == 0 { -0.0 } else { i as f32 - 20.5 })
            .collect();
        let mut blocked = vec![0.0f32; 2 * 8 * 6];
        let mut back = vec![f32::NAN; s.elements()];

        to_blocked(4, &s, &input, &mut blocked, None);
        from_blocked(4, &s, &blocked, &mut back, None);

        for (i, (x, y)) in input.iter().zip(back.iter()).enumerate() {
            assert_eq!(x.to_bits(), y.to_bits(), "element {}", i);
        }
    }
}
