//! Python bindings over the per-pixel kernels

use crate::core::composite::median_of;
use crate::core::{normalized_difference, surface_temperature_celsius, QaDecoder, QaFlag};
use numpy::{PyReadonlyArray2, PyReadonlyArray3, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

/// Convert PyReadonlyArray2 to ndarray Array2
fn numpy_to_array2<T>(arr: PyReadonlyArray2<T>) -> ndarray::Array2<T>
where
    T: Copy + numpy::Element,
{
    arr.as_array().to_owned()
}

fn flag_from_bit(bit: u8) -> PyResult<QaFlag> {
    let flag = match bit {
        0 => QaFlag::Fill,
        1 => QaFlag::DilatedCloud,
        2 => QaFlag::Cirrus,
        3 => QaFlag::Cloud,
        4 => QaFlag::Snow,
        5 => QaFlag::CloudShadow,
        6 => QaFlag::Clear,
        7 => QaFlag::Water,
        _ => return Err(PyValueError::new_err(format!("Unsupported QA bit: {}", bit))),
    };
    Ok(flag)
}

/// Decode one QA bit; returns 1.0 where set, 0.0 where clear, NaN for no-value QA
#[pyfunction]
fn decode_qa(py: Python, qa: PyReadonlyArray2<f32>, bit: u8) -> PyResult<PyObject> {
    let flag = flag_from_bit(bit)?;
    let decoded = QaDecoder::decode(&numpy_to_array2(qa), flag).mapv(|v| match v {
        Some(true) => 1.0f32,
        Some(false) => 0.0,
        None => f32::NAN,
    });
    Ok(decoded.to_pyarray(py).into())
}

/// Surface temperature in degrees Celsius from ST_B10 digital numbers
#[pyfunction]
fn surface_temperature(py: Python, dn: PyReadonlyArray2<f32>) -> PyResult<PyObject> {
    let celsius = surface_temperature_celsius(&numpy_to_array2(dn));
    Ok(celsius.to_pyarray(py).into())
}

#[pyfunction(name = "normalized_difference")]
fn py_normalized_difference(
    py: Python,
    band_a: PyReadonlyArray2<f32>,
    band_b: PyReadonlyArray2<f32>,
) -> PyResult<PyObject> {
    let nd = normalized_difference(&numpy_to_array2(band_a), &numpy_to_array2(band_b))
        .map_err(|e| PyRuntimeError::new_err(format!("{}", e)))?;
    Ok(nd.to_pyarray(py).into())
}

/// Per-pixel median over the first axis of a (time, rows, cols) stack, skipping NaN
#[pyfunction]
fn median_composite(py: Python, stack: PyReadonlyArray3<f32>) -> PyResult<PyObject> {
    let stack = stack.as_array();
    let (depth, rows, cols) = stack.dim();
    if depth == 0 {
        return Err(PyValueError::new_err("Empty stack"));
    }

    let composite = ndarray::Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut samples: Vec<f32> = (0..depth).map(|t| stack[[t, r, c]]).filter(|v| !v.is_nan()).collect();
        median_of(&mut samples).unwrap_or(f32::NAN)
    });
    Ok(composite.to_pyarray(py).into())
}

#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(decode_qa, m)?)?;
    m.add_function(wrap_pyfunction!(surface_temperature, m)?)?;
    m.add_function(wrap_pyfunction!(py_normalized_difference, m)?)?;
    m.add_function(wrap_pyfunction!(median_composite, m)?)?;
    Ok(())
}
