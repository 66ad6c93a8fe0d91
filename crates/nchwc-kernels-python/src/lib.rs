//! Python bindings for the NCHWc kernel library.
//!
//! This module exposes GEMM, 2D convolution and 2D pooling over NumPy
//! `float32` arrays. Work runs on rayon's global pool.
//!
//! Convolution and pooling return `(data, shape)` where `data` is the
//! flattened NCHW output and `shape` its `[N, C, H, W]` dimensions.

use numpy::{
    IntoPyArray, PyArray1, PyReadonlyArray1, PyReadonlyArray2, PyReadonlyArray4,
    PyUntypedArrayMethods,
};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

// Use fully qualified path to avoid naming conflict with the pymodule
use ::nchwc_kernels::{
    conv, conv_nchwc, pool_nchwc, prepare_convolution, sgemm as kernel_sgemm, Activation,
    ConvDescriptor, FilterShape, KernelError, NchwcLayout, Padding, PoolParameters, PoolingKind,
    RayonSplitter, TensorShape, Transpose,
};

fn value_error(err: KernelError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn parse_activation(name: &str, alpha: f32, min: f32, max: f32) -> PyResult<Activation> {
    match name {
        "identity" => Ok(Activation::Identity),
        "relu" => Ok(Activation::Relu),
        "leaky_relu" => Ok(Activation::LeakyRelu { alpha }),
        "clip" => Ok(Activation::Clip { min, max }),
        other => Err(PyValueError::new_err(format!(
            "Unknown activation '{}': expected identity, relu, leaky_relu or clip",
            other
        ))),
    }
}

fn parse_pooling(name: &str) -> PyResult<PoolingKind> {
    match name {
        "max" => Ok(PoolingKind::Maximum),
        "avg" | "avg_exclude_pad" => Ok(PoolingKind::AverageExcludePad),
        "avg_include_pad" => Ok(PoolingKind::AverageIncludePad),
        other => Err(PyValueError::new_err(format!(
            "Unknown pooling kind '{}': expected max, avg_exclude_pad or avg_include_pad",
            other
        ))),
    }
}

/// Single-precision GEMM: C = alpha * op(A) @ op(B)
///
/// Args:
///     a: Matrix A of shape (M, K), or (K, M) with trans_a
///     b: Matrix B of shape (K, N), or (N, K) with trans_b
///     alpha: Scale applied to the product
///     trans_a: Use A transposed
///     trans_b: Use B transposed
///
/// Returns:
///     Result matrix C of shape (M, N) as a flattened array
#[pyfunction]
#[pyo3(signature = (a, b, alpha = 1.0, trans_a = false, trans_b = false))]
fn sgemm<'py>(
    py: Python<'py>,
    a: PyReadonlyArray2<'py, f32>,
    b: PyReadonlyArray2<'py, f32>,
    alpha: f32,
    trans_a: bool,
    trans_b: bool,
) -> PyResult<Bound<'py, PyArray1<f32>>> {
    let a_shape = a.shape();
    let b_shape = b.shape();
    let (m, k) = if trans_a {
        (a_shape[1], a_shape[0])
    } else {
        (a_shape[0], a_shape[1])
    };
    let (kb, n) = if trans_b {
        (b_shape[1], b_shape[0])
    } else {
        (b_shape[0], b_shape[1])
    };

    if k != kb {
        return Err(PyValueError::new_err(format!(
            "Dimension mismatch: op(A) is {}x{}, op(B) is {}x{}",
            m, k, kb, n
        )));
    }

    let a_data = a.as_slice()?;
    let b_data = b.as_slice()?;
    let splitter = RayonSplitter::global();

    let mut c = vec![0.0f32; m * n];
    kernel_sgemm(
        if trans_a { Transpose::Trans } else { Transpose::NoTrans },
        if trans_b { Transpose::Trans } else { Transpose::NoTrans },
        m,
        n,
        k,
        alpha,
        a_data,
        a_shape[1].max(1),
        b_data,
        b_shape[1].max(1),
        0.0,
        &mut c,
        n.max(1),
        Some(&splitter),
    );

    Ok(c.into_pyarray(py))
}

/// 2D convolution of an NCHW tensor.
///
/// Args:
///     x: Input of shape (N, C, H, W)
///     w: Filter of shape (O, C / groups, KH, KW)
///     bias: Optional bias of shape (O,)
///     stride: (SH, SW)
///     padding: (top, left, bottom, right)
///     dilation: (DH, DW)
///     groups: Group count
///     activation: identity, relu, leaky_relu or clip
///     alpha: Negative slope for leaky_relu
///     clip_min, clip_max: Bounds for clip
///     blocked: Run the NCHWc path instead of im2col + GEMM
///
/// Returns:
///     Tuple of (data, shape) with data flattened in NCHW order
#[pyfunction]
#[pyo3(signature = (
    x, w, bias = None, stride = (1, 1), padding = (0, 0, 0, 0), dilation = (1, 1),
    groups = 1, activation = "identity", alpha = 0.01, clip_min = f32::MIN,
    clip_max = f32::MAX, blocked = false
))]
#[allow(clippy::too_many_arguments)]
fn conv2d<'py>(
    py: Python<'py>,
    x: PyReadonlyArray4<'py, f32>,
    w: PyReadonlyArray4<'py, f32>,
    bias: Option<PyReadonlyArray1<'py, f32>>,
    stride: (usize, usize),
    padding: (usize, usize, usize, usize),
    dilation: (usize, usize),
    groups: usize,
    activation: &str,
    alpha: f32,
    clip_min: f32,
    clip_max: f32,
    blocked: bool,
) -> PyResult<(Bound<'py, PyArray1<f32>>, Vec<usize>)> {
    let input = TensorShape::from_dims(x.shape()).map_err(value_error)?;
    let filter = FilterShape::from_dims(w.shape()).map_err(value_error)?;
    let pads = Padding::new(2, &[padding.0, padding.1, padding.2, padding.3]).map_err(value_error)?;

    let desc = ConvDescriptor::new(input, filter)
        .groups(groups)
        .padding(pads)
        .strides(&[stride.0, stride.1])
        .dilations(&[dilation.0, dilation.1])
        .activation(parse_activation(activation, alpha, clip_min, clip_max)?);
    let (params, _) = prepare_convolution(&desc).map_err(value_error)?;

    let bias_data = match &bias {
        Some(b) => {
            let data = b.as_slice()?;
            if data.len() != filter.output_channels {
                return Err(PyValueError::new_err(format!(
                    "Bias has {} values, filter has {} output channels",
                    data.len(),
                    filter.output_channels
                )));
            }
            Some(data)
        }
        None => None,
    };

    let x_data = x.as_slice()?;
    let w_data = w.as_slice()?;
    let splitter = RayonSplitter::global();
    let mut y = vec![0.0f32; params.output_shape().elements()];

    if blocked {
        let mut workspace = vec![0.0f32; params.nchwc_workspace_len()];
        conv_nchwc(&params, x_data, w_data, bias_data, &mut workspace, &mut y, Some(&splitter));
    } else {
        let mut working = vec![0.0f32; params.working_buffer_len()];
        conv(&params, x_data, w_data, bias_data, &mut working, &mut y, Some(&splitter));
    }

    Ok((y.into_pyarray(py), params.output_shape().dims()))
}

/// 2D pooling of an NCHW tensor.
///
/// Args:
///     x: Input of shape (N, C, H, W)
///     kind: max, avg_exclude_pad (alias avg) or avg_include_pad
///     kernel: (KH, KW); omit for global pooling
///     stride: (SH, SW)
///     padding: (top, left, bottom, right)
///
/// Returns:
///     Tuple of (data, shape) with data flattened in NCHW order
#[pyfunction]
#[pyo3(signature = (x, kind = "max", kernel = None, stride = (1, 1), padding = (0, 0, 0, 0)))]
fn pool2d<'py>(
    py: Python<'py>,
    x: PyReadonlyArray4<'py, f32>,
    kind: &str,
    kernel: Option<(usize, usize)>,
    stride: (usize, usize),
    padding: (usize, usize, usize, usize),
) -> PyResult<(Bound<'py, PyArray1<f32>>, Vec<usize>)> {
    let kind = parse_pooling(kind)?;
    let input = TensorShape::from_dims(x.shape()).map_err(value_error)?;
    let params = match kernel {
        Some((kh, kw)) => {
            let pads = Padding::new(2, &[padding.0, padding.1, padding.2, padding.3])
                .map_err(value_error)?;
            PoolParameters::new(kind, input, &[kh, kw], pads, Some(&[stride.0, stride.1]))
        }
        None => PoolParameters::global(kind, input),
    }
    .map_err(value_error)?;

    let x_data = x.as_slice()?;
    let splitter = RayonSplitter::global();
    let layout = NchwcLayout::native();
    let mut workspace = vec![0.0f32; params.nchwc_workspace_len(&layout)];
    let mut y = vec![0.0f32; params.output_shape().elements()];
    pool_nchwc(&params, &layout, x_data, &mut workspace, &mut y, Some(&splitter));

    Ok((y.into_pyarray(py), params.output_shape().dims()))
}

/// Channel block size of the NCHWc layout on this CPU.
#[pyfunction]
fn block_size() -> usize {
    ::nchwc_kernels::block_size()
}

/// Name of the detected SIMD tier.
#[pyfunction]
fn simd_level() -> &'static str {
    ::nchwc_kernels::simd_level().name()
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(sgemm, m)?)?;
    m.add_function(wrap_pyfunction!(conv2d, m)?)?;
    m.add_function(wrap_pyfunction!(pool2d, m)?)?;
    m.add_function(wrap_pyfunction!(block_size, m)?)?;
    m.add_function(wrap_pyfunction!(simd_level, m)?)?;
    Ok(())
}
