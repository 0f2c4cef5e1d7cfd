// Python bindings for the detectors, built with `--features python`.
//
// Inputs are float64 matrices of shape (rows, features); flags come back as a
// numpy bool array.

use crate::error::PipelineError;
use crate::models::model_detector::{ModelConfig, ModelDetector};
use crate::models::threshold::ThresholdDetector;
use numpy::{PyArray1, PyArray2, ToPyArray};
use pyo3::exceptions::{PyFileNotFoundError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

impl From<PipelineError> for PyErr {
    fn from(err: PipelineError) -> PyErr {
        match err {
            PipelineError::ModelNotFound { .. } => PyFileNotFoundError::new_err(err.to_string()),
            PipelineError::InvalidConfig(_)
            | PipelineError::FeatureMismatch { .. }
            | PipelineError::EmptyTrainingSet
            | PipelineError::MalformedDocument { .. } => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

#[pyclass(name = "ThresholdDetector")]
pub struct PyThresholdDetector {
    inner: ThresholdDetector,
}

#[pymethods]
impl PyThresholdDetector {
    #[new]
    #[pyo3(signature = (threshold = 3.5))]
    fn new(threshold: f64) -> PyResult<Self> {
        Ok(PyThresholdDetector { inner: ThresholdDetector::new(threshold)? })
    }

    /// Nothing to learn; kept for interface parity with ModelDetector.
    fn fit(&mut self, _x: &PyArray2<f64>) -> PyResult<()> {
        Ok(())
    }

    fn predict<'py>(&self, py: Python<'py>, x: &PyArray2<f64>) -> PyResult<&'py PyArray1<bool>> {
        let view = unsafe { x.as_array() };
        Ok(self.inner.predict_matrix(view).to_pyarray(py))
    }
}

#[pyclass(name = "ModelDetector")]
pub struct PyModelDetector {
    inner: ModelDetector,
}

#[pymethods]
impl PyModelDetector {
    #[new]
    #[pyo3(signature = (
        contamination = 0.02,
        random_state = 42,
        n_estimators = 100,
        max_samples = 256
    ))]
    fn new(contamination: f64, random_state: u64, n_estimators: usize, max_samples: usize) -> PyResult<Self> {
        let config = ModelConfig {
            contamination,
            random_seed: random_state,
            n_estimators,
            max_samples,
            ..Default::default()
        };
        Ok(PyModelDetector { inner: ModelDetector::new(config)? })
    }

    fn fit(&mut self, x: &PyArray2<f64>) -> PyResult<()> {
        let view = unsafe { x.as_array() };
        Ok(self.inner.fit_matrix(view)?)
    }

    fn predict<'py>(&self, py: Python<'py>, x: &PyArray2<f64>) -> PyResult<&'py PyArray1<bool>> {
        let view = unsafe { x.as_array() };
        Ok(self.inner.predict_matrix(view)?.to_pyarray(py))
    }

    fn score_samples<'py>(&self, py: Python<'py>, x: &PyArray2<f64>) -> PyResult<&'py PyArray1<f64>> {
        let view = unsafe { x.as_array() };
        Ok(self.inner.score_matrix(view)?.to_pyarray(py))
    }

    fn save(&self, path: &str) -> PyResult<()> {
        Ok(self.inner.save(path)?)
    }

    #[staticmethod]
    fn load(path: &str) -> PyResult<Self> {
        Ok(PyModelDetector { inner: ModelDetector::load(path)? })
    }
}
