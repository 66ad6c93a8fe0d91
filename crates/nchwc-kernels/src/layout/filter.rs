//! Filter and bias reorders.

use crate::types::FilterShape;

pub(super) fn to_oihwbo(block: usize, filter: &FilterShape, src: &[f32], dst: &mut [f32]) {
    let o_total = filter.output_channels;
    let inputs = filter.input_channels;
    let ks = filter.kernel.volume();
    let o_blocks = o_total.div_ceil(block);
    assert!(src.len() >= filter.elements(), "filter too short");
    assert!(dst.len() >= o_blocks * block * inputs * ks, "OIHWBo buffer too short");

    for ob in 0..o_blocks {
        for i in 0..inputs {
            for k in 0..ks {
                let out = &mut dst[((ob * inputs + i) * ks + k) * block..][..block];
                for (bo, v) in out.iter_mut().enumerate() {
                    let o = ob * block + bo;
                    *v = if o < o_total {
                        src[(o * inputs + i) * ks + k]
                    } else {
                        0.0
                    };
                }
            }
        }
    }
}

pub(super) fn to_oihwbibo(block: usize, filter: &FilterShape, src: &[f32], dst: &mut [f32]) {
    let o_total = filter.output_channels;
    let i_total = filter.input_channels;
    let ks = filter.kernel.volume();
    let o_blocks = o_total.div_ceil(block);
    let i_blocks = i_total.div_ceil(block);
    assert!(src.len() >= filter.elements(), "filter too short");
    assert!(
        dst.len() >= o_blocks * i_blocks * ks * block * block,
        "OIHWBiBo buffer too short"
    );

    for ob in 0..o_blocks {
        for ib in 0..i_blocks {
            for k in 0..ks {
                let tile = &mut dst[((ob * i_blocks + ib) * ks + k) * block * block..][..block * block];
                for (bi, row) in tile.chunks_exact_mut(block).enumerate() {
                    let i = ib * block + bi;
                    for (bo, v) in row.iter_mut().enumerate() {
                        let o = ob * block + bo;
                        *v = if o < o_total && i < i_total {
                            src[(o * i_total + i) * ks + k]
                        } else {
                            0.0
                        };
                    }
                }
            }
        }
    }
}

pub(super) fn align_bias(bias: &[f32], dst: &mut [f32]) {
    assert!(dst.len() >= bias.len(), "aligned bias buffer too short");
    let (head, tail) = dst.split_at_mut(bias.len());
    head.copy_from_slice(bias);
    tail.fill(0.0);
}
