//! Cache tiling parameters and block iteration.

use super::kernel::Microkernel;

/// Cache blocking sizes for the GEMM loop nest.
///
/// `mc` and `nc` must be multiples of the microkernel's `mr` and `nr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingParams {
    /// Rows of A per L2 block.
    pub mc: usize,
    /// Columns of B per L3 block.
    pub nc: usize,
    /// Depth per block.
    pub kc: usize,
    /// Microkernel rows.
    pub mr: usize,
    /// Microkernel columns.
    pub nr: usize,
}

impl TilingParams {
    /// Defaults for an 8×8 f32 microkernel.
    pub const F32_8X8: Self = Self {
        mc: 128,
        nc: 256,
        kc: 256,
        mr: 8,
        nr: 8,
    };

    pub fn new(mc: usize, nc: usize, kc: usize, mr: usize, nr: usize) -> Self {
        assert!(mr > 0 && nr > 0 && kc > 0, "tiling sizes must be positive");
        assert!(mc >= mr && mc % mr == 0, "mc={} must be a multiple of mr={}", mc, mr);
        assert!(nc >= nr && nc % nr == 0, "nc={} must be a multiple of nr={}", nc, nr);
        Self { mc, nc, kc, mr, nr }
    }

    /// Default blocking sized for a given microkernel.
    pub fn for_kernel<K: Microkernel>() -> Self {
        let base = Self::F32_8X8;
        Self::new(
            round_up(base.mc, K::MR),
            round_up(base.nc, K::NR),
            base.kc,
            K::MR,
            K::NR,
        )
    }
}

impl Default for TilingParams {
    fn default() -> Self {
        Self::F32_8X8
    }
}

/// Round `value` up to a multiple of `multiple`.
#[inline]
pub fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

/// Iterates `(start, len)` blocks of `step` over `0..total`.
#[derive(Debug, Clone)]
pub struct BlockIterator {
    pos: usize,
    total: usize,
    step: usize,
}

impl BlockIterator {
    pub fn new(total: usize, step: usize) -> Self {
        assert!(step > 0, "block step must be positive");
        Self { pos: 0, total, step }
    }
}

impl Iterator for BlockIterator {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.total {
            return None;
        }
        let start = self.pos;
        let len = self.step.min(self.total - start);
        self.pos += len;
        Some((start, len))
    }
}
