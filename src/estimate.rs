//! # Model Entry Points
//!
//! `Slope` bundles an immutable [`SlopeConfig`] behind a builder API: pick a
//! penalty profile, fit a path, cross-validate. The model itself holds no
//! data and no mutable state, so one instance can drive any number of
//! concurrent fits.
//!
//! ```ignore
//! let model = Slope::new().lambda_type(LambdaType::Bh).q(0.2);
//! let path = model.path(x.view(), y.view())?;
//! let cv = model.cv(x.view(), y.view(), &CvGrid::default(), &CvSettings::default())?;
//! ```

use crate::cv::{cross_validate, CvGrid, CvResult, CvSettings};
use crate::path::{fit_path, Path};
use crate::types::{LambdaType, SlopeConfig};
use ndarray::{ArrayView1, ArrayView2};
use thiserror::Error;

/// Errors surfaced by fitting and cross-validation.
///
/// A solver that merely fails to converge within its iteration cap is *not*
/// an error: the result carries the best iterate with its convergence flag
/// cleared. Errors are reserved for malformed inputs (nothing is partially
/// executed) and for numerical breakdown mid-solve, which aborts that solve
/// rather than letting non-finite values contaminate downstream averages.
#[derive(Error)]
pub enum SlopeError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Numerical instability at iteration {iteration}: {detail}")]
    NumericalInstability { iteration: usize, detail: String },
}

// Ensure Debug prints with actual line breaks by delegating to Display.
impl core::fmt::Debug for SlopeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self)
    }
}

/// A SLOPE/Lasso model: configuration plus entry points.
#[derive(Debug, Clone, Default)]
pub struct Slope {
    config: SlopeConfig,
}

impl Slope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from a fully specified configuration.
    pub fn with_config(config: SlopeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SlopeConfig {
        &self.config
    }

    pub fn lambda_type(mut self, lambda_type: LambdaType) -> Self {
        self.config.lambda_type = lambda_type;
        self
    }

    /// False-discovery-rate target for the BH profile.
    pub fn q(mut self, q: f64) -> Self {
        self.config.q = q;
        self
    }

    pub fn fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.config.fit_intercept = fit_intercept;
        self
    }

    pub fn standardize(mut self, standardize: bool) -> Self {
        self.config.standardize = standardize;
        self
    }

    pub fn path_length(mut self, path_length: usize) -> Self {
        self.config.path_length = path_length;
        self
    }

    pub fn alpha_min_ratio(mut self, ratio: f64) -> Self {
        self.config.alpha_min_ratio = Some(ratio);
        self
    }

    /// Explicit penalty-scale sequence, replacing the automatic grid.
    pub fn alphas(mut self, alphas: Vec<f64>) -> Self {
        self.config.alphas = Some(alphas);
        self
    }

    /// Active-predictor ceiling for early path termination.
    pub fn max_active(mut self, ceiling: usize) -> Self {
        self.config.max_active = Some(ceiling);
        self
    }

    pub fn tolerance(mut self, tol: f64) -> Self {
        self.config.tol = tol;
        self
    }

    pub fn max_iterations(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    /// Fit the full regularization path.
    pub fn path(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<Path, SlopeError> {
        fit_path(x, y, &self.config)
    }

    /// Cross-validate this model over a hyperparameter grid.
    pub fn cv(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        grid: &CvGrid,
        settings: &CvSettings,
    ) -> Result<CvResult, SlopeError> {
        cross_validate(self, x, y, grid, settings)
    }
}
