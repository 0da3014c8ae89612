//! Python bindings

use crate::config::RunConfig;
use crate::core::date_decoder::DateDecoder;
use crate::pipeline::run_products;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::path::Path;

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(run_config, m)?)?;
    m.add_function(wrap_pyfunction!(decode_window, m)?)?;
    Ok(())
}

/// Run every product of a TOML config; returns the site files written
#[pyfunction]
fn run_config(config_path: String) -> PyResult<Vec<String>> {
    let config = RunConfig::from_file(&config_path)
        .map_err(|e| PyErr::new::<PyValueError, _>(format!("{}", e)))?;
    let results = run_products(&config, &[])
        .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("{}", e)))?;

    let mut files = Vec::new();
    let mut failed = Vec::new();
    for (name, result) in results {
        match result {
            Ok(report) => files.extend(report.files.iter().map(|p| p.display().to_string())),
            Err(e) => failed.push(format!("{}: {}", name, e)),
        }
    }
    if !failed.is_empty() {
        return Err(PyErr::new::<PyRuntimeError, _>(failed.join("; ")));
    }
    Ok(files)
}

/// Acquisition window of an image file name as a dict
#[pyfunction]
#[pyo3(signature = (filename, marker = 'm'))]
fn decode_window(py: Python<'_>, filename: String, marker: char) -> PyResult<PyObject> {
    let decoder = DateDecoder::new(marker)
        .map_err(|e| PyErr::new::<PyValueError, _>(format!("{}", e)))?;
    let (token, window) = decoder
        .decode_path(Path::new(&filename))
        .map_err(|e| PyErr::new::<PyValueError, _>(format!("{}", e)))?;

    let dict = PyDict::new(py);
    dict.set_item("token", token)?;
    dict.set_item("s_day", window.start_day)?;
    dict.set_item("s_month", window.start_month)?;
    dict.set_item("s_year", window.start_year)?;
    dict.set_item("s_date", window.start_date)?;
    dict.set_item("e_day", window.end_day)?;
    dict.set_item("e_month", window.end_month)?;
    dict.set_item("e_year", window.end_year)?;
    dict.set_item("e_date", window.end_date)?;
    Ok(dict.into())
}
