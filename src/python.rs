//! Python bindings, built with `--features python`.

use std::collections::BTreeMap;

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::error::ErrorKind;
use crate::models::{EmitScanRecord, FitModel, MatImage, ScanRecord, TwissParam};
use crate::UnpackError;

fn to_py_err(err: UnpackError) -> PyErr {
    match err.kind() {
        ErrorKind::UnreadableInput => PyIOError::new_err(err.diagnostic()),
        ErrorKind::MalformedRecord => PyValueError::new_err(err.diagnostic()),
    }
}

/// Read-only view of a correlation-plot scan.
#[pyclass(name = "CorrPlotScan", frozen)]
struct PyCorrPlotScan {
    inner: ScanRecord,
}

#[pymethods]
impl PyCorrPlotScan {
    #[getter]
    fn file(&self) -> Option<String> {
        self.inner.source().map(|p| p.display().to_string())
    }

    #[getter]
    fn fields(&self) -> Vec<String> {
        self.inner.fields().to_vec()
    }

    #[getter]
    fn accelerator(&self) -> Option<String> {
        self.inner.accelerator().map(str::to_string)
    }

    #[getter]
    fn status(&self) -> Option<Vec<i64>> {
        self.inner.status().map(<[i64]>::to_vec)
    }

    #[getter]
    fn ctrl_pv(&self) -> Option<String> {
        self.inner.ctrl_pv().map(str::to_string)
    }

    #[getter]
    fn ctrl_vals(&self) -> Option<Vec<f64>> {
        self.inner.ctrl_vals().map(<[f64]>::to_vec)
    }

    #[getter]
    fn iterations(&self) -> usize {
        self.inner.iterations()
    }

    #[getter]
    fn samples(&self) -> Option<usize> {
        self.inner.samples()
    }

    #[getter]
    fn beam_names(&self) -> Option<Vec<String>> {
        self.inner.beam_names().map(<[String]>::to_vec)
    }

    #[getter]
    fn timestamp(&self) -> Option<f64> {
        self.inner.timestamp()
    }

    /// Channel values of one fit, keyed by channel name.
    fn fit(
        &self,
        iteration: usize,
        sample: usize,
        model: usize,
    ) -> Option<BTreeMap<String, Vec<f64>>> {
        let model = FitModel::from_index(model)?;
        let fit = self.inner.beam()?.fit(iteration, sample, model)?;
        Some(
            fit.channels
                .iter()
                .map(|(name, array)| (name.clone(), array.real.clone()))
                .collect(),
        )
    }

    fn __repr__(&self) -> String {
        format!(
            "CorrPlotScan(ctrl_pv={:?}, iterations={}, samples={:?})",
            self.inner.ctrl_pv(),
            self.inner.iterations(),
            self.inner.samples()
        )
    }
}

/// Read-only view of an emittance scan.
#[pyclass(name = "EmitScan", frozen)]
struct PyEmitScan {
    inner: EmitScanRecord,
}

/// Twiss values keyed by fit model label.
fn by_label(values: Option<BTreeMap<FitModel, f64>>) -> Option<BTreeMap<&'static str, f64>> {
    values.map(|v| v.into_iter().map(|(m, x)| (m.label(), x)).collect())
}

#[pymethods]
impl PyEmitScan {
    #[getter]
    fn file(&self) -> Option<String> {
        self.inner.source().map(|p| p.display().to_string())
    }

    #[getter]
    fn fields(&self) -> Vec<String> {
        self.inner.fields().to_vec()
    }

    #[getter]
    fn name(&self) -> Option<String> {
        self.inner.name().map(str::to_string)
    }

    #[getter]
    fn quad_name(&self) -> Option<String> {
        self.inner.quad_name().map(str::to_string)
    }

    #[getter]
    fn quad_vals(&self) -> Option<Vec<f64>> {
        self.inner.quad_vals().map(<[f64]>::to_vec)
    }

    #[getter]
    fn iterations(&self) -> usize {
        self.inner.iterations()
    }

    #[getter]
    fn charge(&self) -> Option<f64> {
        self.inner.charge()
    }

    #[getter]
    fn energy(&self) -> Option<f64> {
        self.inner.energy()
    }

    #[getter]
    fn timestamp(&self) -> Option<f64> {
        self.inner.timestamp()
    }

    #[getter]
    fn emit_x(&self) -> Option<BTreeMap<&'static str, f64>> {
        by_label(self.inner.emit_x())
    }

    #[getter]
    fn emit_y(&self) -> Option<BTreeMap<&'static str, f64>> {
        by_label(self.inner.emit_y())
    }

    #[getter]
    fn beta_x(&self) -> Option<BTreeMap<&'static str, f64>> {
        by_label(self.inner.beta_x())
    }

    #[getter]
    fn beta_y(&self) -> Option<BTreeMap<&'static str, f64>> {
        by_label(self.inner.beta_y())
    }

    #[getter]
    fn alpha_x(&self) -> Option<BTreeMap<&'static str, f64>> {
        by_label(self.inner.alpha_x())
    }

    #[getter]
    fn alpha_y(&self) -> Option<BTreeMap<&'static str, f64>> {
        by_label(self.inner.alpha_y())
    }

    #[getter]
    fn bmag_x(&self) -> Option<BTreeMap<&'static str, f64>> {
        by_label(self.inner.bmag_x())
    }

    #[getter]
    fn bmag_y(&self) -> Option<BTreeMap<&'static str, f64>> {
        by_label(self.inner.bmag_y())
    }

    /// Values of one twiss parameter by index, 0 (emit x) to 7 (bmag y).
    fn twiss(&self, param: usize) -> Option<BTreeMap<&'static str, f64>> {
        let param = TwissParam::ALL.get(param).copied()?;
        by_label(self.inner.twiss_param(param))
    }

    fn __repr__(&self) -> String {
        format!(
            "EmitScan(quad_name={:?}, iterations={})",
            self.inner.quad_name(),
            self.inner.iterations()
        )
    }
}

/// Read-only view of a profile-monitor image.
#[pyclass(name = "MatImage", frozen)]
struct PyMatImage {
    inner: MatImage,
}

#[pymethods]
impl PyMatImage {
    #[getter]
    fn file(&self) -> Option<String> {
        self.inner.source().map(|p| p.display().to_string())
    }

    #[getter]
    fn camera_name(&self) -> Option<String> {
        self.inner.camera_name().map(str::to_string)
    }

    /// The image as a list of pixel rows.
    #[getter]
    fn image(&self) -> Option<Vec<Vec<f64>>> {
        self.inner.image_rows()
    }

    #[getter]
    fn timestamp(&self) -> Option<f64> {
        self.inner.timestamp()
    }

    #[getter]
    fn pulse_id(&self) -> Option<i64> {
        self.inner.pulse_id()
    }

    #[getter]
    fn resolution(&self) -> Option<f64> {
        self.inner.resolution()
    }

    #[getter]
    fn roi(&self) -> (Option<i64>, Option<i64>, Option<i64>, Option<i64>) {
        (
            self.inner.roi_x(),
            self.inner.roi_y(),
            self.inner.roi_x_n(),
            self.inner.roi_y_n(),
        )
    }

    #[getter]
    fn center(&self) -> (Option<f64>, Option<f64>) {
        (self.inner.center_x(), self.inner.center_y())
    }

    #[getter]
    fn bit_depth(&self) -> Option<i64> {
        self.inner.bit_depth()
    }
}

#[pyfunction]
fn load_corr_plot(path: &str) -> PyResult<PyCorrPlotScan> {
    let inner = ScanRecord::open(path).map_err(to_py_err)?;
    Ok(PyCorrPlotScan { inner })
}

#[pyfunction]
fn load_emit_scan(path: &str) -> PyResult<PyEmitScan> {
    let inner = EmitScanRecord::open(path).map_err(to_py_err)?;
    Ok(PyEmitScan { inner })
}

#[pyfunction]
fn load_mat_image(path: &str) -> PyResult<PyMatImage> {
    let inner = MatImage::open(path).map_err(to_py_err)?;
    Ok(PyMatImage { inner })
}

#[pyfunction]
fn fit_models() -> Vec<&'static str> {
    FitModel::ALL.iter().map(|m| m.label()).collect()
}

#[pymodule]
fn scanmat(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyCorrPlotScan>()?;
    m.add_class::<PyEmitScan>()?;
    m.add_class::<PyMatImage>()?;
    m.add_function(wrap_pyfunction!(load_corr_plot, m)?)?;
    m.add_function(wrap_pyfunction!(load_emit_scan, m)?)?;
    m.add_function(wrap_pyfunction!(load_mat_image, m)?)?;
    m.add_function(wrap_pyfunction!(fit_models, m)?)?;
    Ok(())
}
