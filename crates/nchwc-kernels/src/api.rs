use crate::core::{round_up, MatRef, Transpose};
use crate::parallel::{resolve, WorkSplitter};
use crate::simd::gemm_dispatch;

/// Row granularity of a parallel band; matches the microkernel height.
const BAND_ROWS: usize = 8;

/// Single-precision GEMM: `C := alpha * op(A) * op(B) + beta * C`
///
/// `op(A)` is `m × k`, `op(B)` is `k × n` and C is `m × n`, all stored
/// row-major with the given leading dimensions. Only the `m × n` window of
/// C addressed through `ldc` is read or written.
///
/// Each output element accumulates its dot product in `k` order starting at
/// `+0`, with separately rounded multiply and add, and is then combined as
/// `(C * beta) + (sum * alpha)`, so C is always read and must hold finite
/// values even when `beta == 0`.
/// If any of `m`, `n`, `k` is zero the call does nothing.
///
/// C is split into row bands that run on `ctx` (sequentially when `None`).
///
/// # Panics
/// If a leading dimension is smaller than the stored row width, or a
/// buffer is too short for the window it addresses.
///
/// # Example
///
/// ```
/// use nchwc_kernels::{sgemm, Transpose};
///
/// let a = [1.0f32, 2.0, 3.0, 4.0];
/// let b = [5.0f32, 6.0, 7.0, 8.0];
/// let mut c = [0.0f32; 4];
///
/// sgemm(
///     Transpose::NoTrans, Transpose::NoTrans,
///     2, 2, 2, 1.0, &a, 2, &b, 2, 0.0, &mut c, 2, None,
/// );
/// assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
/// ```
#[allow(clippy::too_many_arguments)]
pub fn sgemm(
    trans_a: Transpose,
    trans_b: Transpose,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    beta: f32,
    c: &mut [f32],
    ldc: usize,
    ctx: Option<&dyn WorkSplitter>,
) {
    if m == 0 || n == 0 || k == 0 {
        return;
    }

    check_operand("A", trans_a, m, k, a.len(), lda);
    check_operand("B", trans_b, k, n, b.len(), ldb);
    assert!(ldc >= n, "ldc={} is smaller than n={}", ldc, n);
    let window = (m - 1) * ldc + n;
    assert!(
        c.len() >= window,
        "C has {} elements, window needs {}",
        c.len(),
        window
    );

    let a_ref = MatRef::new(a, lda, trans_a);
    let b_ref = MatRef::new(b, ldb, trans_b);

    let splitter = resolve(ctx);
    let bands = splitter.degree_of_parallelism().clamp(1, m.div_ceil(BAND_ROWS));
    let rows_per_band = round_up(m.div_ceil(bands), BAND_ROWS).min(m);
    log::trace!(
        "sgemm m={} n={} k={} trans=({:?}, {:?}) bands={} rows_per_band={}",
        m,
        n,
        k,
        trans_a,
        trans_b,
        m.div_ceil(rows_per_band),
        rows_per_band
    );

    splitter.for_each_chunk(
        &mut c[..window],
        rows_per_band * ldc,
        &|index: usize, band: &mut [f32]| {
            let row0 = index * rows_per_band;
            let rows = rows_per_band.min(m - row0);
            gemm_dispatch(rows, n, k, alpha, &a_ref.rows_from(row0), &b_ref, beta, band, ldc);
        },
    );
}

/// Assert that a stored operand covers the logical `rows × cols` matrix.
fn check_operand(name: &str, trans: Transpose, rows: usize, cols: usize, len: usize, ld: usize) {
    let (stored_rows, stored_cols) = match trans {
        Transpose::NoTrans => (rows, cols),
        Transpose::Trans => (cols, rows),
    };
    assert!(
        ld >= stored_cols,
        "leading dimension of {} ({}) is smaller than its row width {}",
        name,
        ld,
        stored_cols
    );
    let needed = (stored_rows - 1) * ld + stored_cols;
    assert!(
        len >= needed,
        "{} has {} elements, needs {}",
        name,
        len,
        needed
    );
}

/// Plain matrix product `C = A * B` of row-major, contiguous matrices.
///
/// # Arguments
/// - `a`: Matrix A data, `m × k`
/// - `b`: Matrix B data, `k × n`
///
/// # Returns
/// Result matrix C of size `m × n` in row-major order
///
/// # Example
///
/// ```
/// use nchwc_kernels::matmul;
///
/// let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3
/// let b = vec![1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0]; // 3x2
///
/// let c = matmul(&a, 2, 3, &b, 2);
/// assert_eq!(c, vec![4.0, 5.0, 10.0, 11.0]);
/// ```
pub fn matmul(a: &[f32], m: usize, k: usize, b: &[f32], n: usize) -> Vec<f32> {
    assert_eq!(a.len(), m * k, "A dimensions mismatch");
    assert_eq!(b.len(), k * n, "B dimensions mismatch");

    let mut c = vec![0.0f32; m * n];
    sgemm(
        Transpose::NoTrans,
        Transpose::NoTrans,
        m,
        n,
        k,
        1.0,
        a,
        k,
        b,
        n,
        0.0,
        &mut c,
        n.max(1),
        None,
    );
    c
}

/// Builder for configuring a GEMM call.
///
/// Provides a fluent API for transposition, alpha/beta scaling and the
/// work splitter.
///
/// # Example
///
/// ```
/// use nchwc_kernels::Gemm;
///
/// let a = vec![1.0f32; 6]; // 2x3
/// let b = vec![1.0f32; 6]; // 3x2
/// let mut c = vec![1.0f32; 4]; // 2x2
///
/// Gemm::new(2, 2, 3)
///     .alpha(2.0)
///     .beta(1.0)
///     .execute(&a, 3, &b, 2, &mut c, 2);
/// assert_eq!(c, vec![7.0; 4]);
/// ```
#[derive(Clone, Copy)]
pub struct Gemm<'a> {
    m: usize,
    n: usize,
    k: usize,
    trans_a: Transpose,
    trans_b: Transpose,
    alpha: f32,
    beta: f32,
    ctx: Option<&'a dyn WorkSplitter>,
}

impl<'a> Gemm<'a> {
    /// Create a new GEMM builder computing `C = op(A) * op(B)`.
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            trans_a: Transpose::NoTrans,
            trans_b: Transpose::NoTrans,
            alpha: 1.0,
            beta: 0.0,
            ctx: None,
        }
    }

    /// Transpose matrix A.
    pub fn trans_a(mut self) -> Self {
        self.trans_a = Transpose::Trans;
        self
    }

    /// Transpose matrix B.
    pub fn trans_b(mut self) -> Self {
        self.trans_b = Transpose::Trans;
        self
    }

    /// Scale applied to the product.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Scale applied to the existing contents of C.
    pub fn beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    /// Run row bands on the given splitter.
    pub fn splitter(mut self, ctx: &'a dyn WorkSplitter) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Execute the GEMM operation.
    ///
    /// # Arguments
    /// - `a`: Matrix A data
    /// - `lda`: Leading dimension of A
    /// - `b`: Matrix B data
    /// - `ldb`: Leading dimension of B
    /// - `c`: Output matrix C (must be pre-allocated)
    /// - `ldc`: Leading dimension of C
    pub fn execute(self, a: &[f32], lda: usize, b: &[f32], ldb: usize, c: &mut [f32], ldc: usize) {
        sgemm(
            self.trans_a,
            self.trans_b,
            self.m,
            self.n,
            self.k,
            self.alpha,
            a,
            lda,
            b,
            ldb,
            self.beta,
            c,
            ldc,
            self.ctx,
        );
    }
}

impl std::fmt::Debug for Gemm<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gemm")
            .field("m", &self.m)
            .field("n", &self.n)
            .field("k", &self.k)
            .field("trans_a", &self.trans_a)
            .field("trans_b", &self.trans_b)
            .field("alpha", &self.alpha)
            .field("beta", &self.beta)
            .field("parallel", &self.ctx.is_some())
            .finish()
    }
}
