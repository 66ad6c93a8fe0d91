//! Strided matrix views and operand packing.

/// Whether a GEMM operand is used as stored or transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transpose {
    #[default]
    NoTrans,
    Trans,
}

/// Read-only view of `op(X)` over a row-major buffer with leading dimension `ld`.
///
/// `at(row, col)` addresses the logical (possibly transposed) matrix, so the
/// packing routines never reason about storage order.
#[derive(Debug, Clone, Copy)]
pub struct MatRef<'a> {
    data: &'a [f32],
    ld: usize,
    trans: Transpose,
}

impl<'a> MatRef<'a> {
    pub fn new(data: &'a [f32], ld: usize, trans: Transpose) -> Self {
        Self { data, ld, trans }
    }

    /// Element `(row, col)` of the logical matrix.
    #[inline(always)]
    pub fn at(&self, row: usize, col: usize) -> f32 {
        match self.trans {
            Transpose::NoTrans => self.data[row * self.ld + col],
            Transpose::Trans => self.data[col * self.ld + row],
        }
    }

    /// View starting at logical row `row0`.
    pub fn rows_from(&self, row0: usize) -> Self {
        let offset = match self.trans {
            Transpose::NoTrans => row0 * self.ld,
            Transpose::Trans => row0,
        };
        Self {
            data: &self.data[offset.min(self.data.len())..],
            ld: self.ld,
            trans: self.trans,
        }
    }

    /// Contiguous logical row segment, available only for untransposed storage.
    #[inline(always)]
    fn row_segment(&self, row: usize, col0: usize, len: usize) -> Option<&'a [f32]> {
        match self.trans {
            Transpose::NoTrans => {
                let start = row * self.ld + col0;
                Some(&self.data[start..start + len])
            }
            Transpose::Trans => None,
        }
    }
}

/// Buffer length for packing `rows × k` of A into `mr`-row panels.
pub fn packed_a_size(rows: usize, k: usize, mr: usize) -> usize {
    rows.div_ceil(mr) * mr * k
}

/// Buffer length for packing `k × cols` of B into `nr`-column panels.
pub fn packed_b_size(k: usize, cols: usize, nr: usize) -> usize {
    cols.div_ceil(nr) * nr * k
}

/// Pack rows `row0..row0 + rows` of A (all `k` columns) into `mr`-row panels.
///
/// Panel `p` occupies `out[p*k*mr..]` with layout `[k][mr]`; rows past the
/// end are zero-filled.
pub fn pack_a(a: &MatRef<'_>, row0: usize, rows: usize, k: usize, mr: usize, out: &mut [f32]) {
    let panels = rows.div_ceil(mr);
    debug_assert!(out.len() >= panels * mr * k);
    for p in 0..panels {
        let panel = &mut out[p * k * mr..(p + 1) * k * mr];
        let live = mr.min(rows - p * mr);
        for kk in 0..k {
            let dst = &mut panel[kk * mr..(kk + 1) * mr];
            for (i, v) in dst.iter_mut().enumerate() {
                *v = if i < live {
                    a.at(row0 + p * mr + i, kk)
                } else {
                    0.0
                };
            }
        }
    }
}

/// Pack columns `col0..col0 + cols` of B (all `k` rows) into `nr`-column panels.
///
/// Panel `p` occupies `out[p*k*nr..]` with layout `[k][nr]`; columns past
/// the end are zero-filled.
pub fn pack_b(b: &MatRef<'_>, col0: usize, cols: usize, k: usize, nr: usize, out: &mut [f32]) {
    let panels = cols.div_ceil(nr);
    debug_assert!(out.len() >= panels * nr * k);
    for p in 0..panels {
        let panel = &mut out[p * k * nr..(p + 1) * k * nr];
        let live = nr.min(cols - p * nr);
        for kk in 0..k {
            let dst = &mut panel[kk * nr..(kk + 1) * nr];
            if let Some(src) = b.row_segment(kk, col0 + p * nr, live) {
                dst[..live].copy_from_slice(src);
            } else {
                for (j, v) in dst[..live].iter_mut().enumerate() {
                    *v = b.at(kk, col0 + p * nr + j);
                }
            }
            dst[live..].fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matref_transpose_addressing() {
        // Stored 2x3: [[1,2,3],[4,5,6]]
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let plain = MatRef::new(&data, 3, Transpose::NoTrans);
        let trans = MatRef::new(&data, 3, Transpose::Trans);
        assert_eq!(plain.at(1, 2), 6.0);
        assert_eq!(trans.at(2, 1), 6.0);
        assert_eq!(trans.at(0, 1), 4.0);
        assert_eq!(trans.rows_from(1).at(0, 1), 5.0);
        assert_eq!(plain.rows_from(1).at(0, 0), 4.0);
    }

    #[test]
    fn test_pack_a_zero_fills_tail_rows() {
        // 3x2 matrix packed with mr=2: two panels, second half-empty.
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let a = MatRef::new(&data, 2, Transpose::NoTrans);
        let mut out = vec![f32::NAN; packed_a_size(3, 2, 2)];
        pack_a(&a, 0, 3, 2, 2, &mut out);
        assert_eq!(out, vec![1.0, 3.0, 2.0, 4.0, 5.0, 0.0, 6.0, 0.0]);
    }

    #[test]
    fn test_pack_b_transposed_matches_plain() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        // B = 2x3 plain, and the same logical matrix stored transposed (3x2).
        let stored_t = [1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
        let plain = MatRef::new(&data, 3, Transpose::NoTrans);
        let trans = MatRef::new(&stored_t, 2, Transpose::Trans);

        let mut out_plain = vec![0.0; packed_b_size(2, 3, 4)];
        let mut out_trans = vec![0.0; packed_b_size(2, 3, 4)];
        pack_b(&plain, 0, 3, 2, 4, &mut out_plain);
        pack_b(&trans, 0, 3, 2, 4, &mut out_trans);

        assert_eq!(out_plain, out_trans);
        assert_eq!(out_plain, vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0]);
    }
}
