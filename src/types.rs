use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

/// Selector for the per-rank penalty weight profile.
///
/// `Lasso` gives a constant sequence (ordinary L1 penalty); `Bh` gives the
/// Benjamini-Hochberg sequence of SLOPE, which controls the false discovery
/// rate at level `q` under orthogonal designs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LambdaType {
    Lasso,
    Bh,
}

impl LambdaType {
    /// Whether this profile consumes the FDR target `q`.
    pub fn uses_q(&self) -> bool {
        matches!(self, LambdaType::Bh)
    }

    /// Stable numeric encoding used in cross-validation parameter maps.
    pub fn as_f64(&self) -> f64 {
        match self {
            LambdaType::Lasso => 0.0,
            LambdaType::Bh => 1.0,
        }
    }
}

/// Closed set of loss families the solver understands.
///
/// Only the Gaussian squared-error loss is implemented today; the enum exists
/// so that adding a family is a new tagged variant with its own loss/gradient
/// math, not an open-ended trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    Gaussian,
}

impl Family {
    /// Negative-gradient carrier of the smooth loss: for the Gaussian loss
    /// this is the plain residual `y - eta`.
    pub fn residual(&self, y: ArrayView1<'_, f64>, eta: &Array1<f64>) -> Array1<f64> {
        match self {
            Family::Gaussian => &y - eta,
        }
    }

    /// Smooth part of the primal objective, `(1/2n) * sum(residual^2)`.
    pub fn primal_loss(&self, residual: &Array1<f64>, n: usize) -> f64 {
        match self {
            Family::Gaussian => residual.dot(residual) / (2.0 * n as f64),
        }
    }

    /// Dual objective at a feasible dual point `theta`, from the Fenchel
    /// conjugate of the Gaussian loss: `<theta, y> - (n/2) * |theta|^2`.
    pub fn dual_objective(&self, theta: &Array1<f64>, y: ArrayView1<'_, f64>, n: usize) -> f64 {
        match self {
            Family::Gaussian => theta.dot(&y) - 0.5 * n as f64 * theta.dot(theta),
        }
    }
}

/// Fitted coefficient vector, one entry per predictor. Zero entries mark
/// excluded predictors.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coefficients(pub Array1<f64>);

impl Coefficients {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }

    pub fn zeros(len: usize) -> Self {
        Self(Array1::zeros(len))
    }

    /// Number of non-zero entries.
    pub fn n_active(&self) -> usize {
        self.0.iter().filter(|v| **v != 0.0).count()
    }
}

impl Deref for Coefficients {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Coefficients {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<Array1<f64>> for Coefficients {
    fn as_ref(&self) -> &Array1<f64> {
        &self.0
    }
}

impl From<Array1<f64>> for Coefficients {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

impl From<Coefficients> for Array1<f64> {
    fn from(values: Coefficients) -> Self {
        values.0
    }
}

fn default_path_length() -> usize {
    100
}

fn default_tol() -> f64 {
    1e-4
}

fn default_max_iter() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_q() -> f64 {
    0.2
}

/// Immutable fit configuration, passed by reference into every call.
///
/// There is deliberately no global or process-wide state: two fits with
/// different configurations may run concurrently without interference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlopeConfig {
    pub lambda_type: LambdaType,
    /// False-discovery-rate target for the BH sequence, in (0,1).
    #[serde(default = "default_q")]
    pub q: f64,
    pub family: Family,
    /// Fit an intercept via response/column centering (default true).
    #[serde(default = "default_true")]
    pub fit_intercept: bool,
    /// Standardize columns to unit scale before fitting (default true). The
    /// transform is retained and coefficients are reported on the original
    /// data scale either way.
    #[serde(default = "default_true")]
    pub standardize: bool,
    /// Number of penalty scales on an automatically generated path.
    #[serde(default = "default_path_length")]
    pub path_length: usize,
    /// Ratio of the smallest to the largest penalty scale on an automatic
    /// path. `None` picks 1e-4 when n > p and 1e-2 otherwise.
    #[serde(default)]
    pub alpha_min_ratio: Option<f64>,
    /// Explicit penalty scales, overriding the automatic grid. Values must be
    /// positive and finite; they are sorted into descending order.
    #[serde(default)]
    pub alphas: Option<Vec<f64>>,
    /// Ceiling on the active-predictor count; once a path step exceeds it the
    /// path terminates early. `None` means unlimited.
    #[serde(default)]
    pub max_active: Option<usize>,
    /// Relative duality-gap tolerance for the solver.
    #[serde(default = "default_tol")]
    pub tol: f64,
    /// Iteration cap for a single solve. Exceeding it is non-fatal: the best
    /// iterate is returned with its convergence flag cleared.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            lambda_type: LambdaType::Bh,
            q: default_q(),
            family: Family::Gaussian,
            fit_intercept: true,
            standardize: true,
            path_length: default_path_length(),
            alpha_min_ratio: None,
            alphas: None,
            max_active: None,
            tol: default_tol(),
            max_iter: default_max_iter(),
        }
    }
}

impl SlopeConfig {
    /// Fail-fast validation of every knob that does not depend on the data.
    pub fn validate(&self) -> Result<(), crate::estimate::SlopeError> {
        use crate::estimate::SlopeError;
        if !(self.q > 0.0 && self.q < 1.0) {
            return Err(SlopeError::InvalidParameter(format!(
                "q must lie in (0,1), got {}",
                self.q
            )));
        }
        if self.path_length == 0 {
            return Err(SlopeError::InvalidParameter(
                "path_length must be at least 1".to_string(),
            ));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(SlopeError::InvalidParameter(format!(
                "tol must be positive and finite, got {}",
                self.tol
            )));
        }
        if self.max_iter == 0 {
            return Err(SlopeError::InvalidParameter(
                "max_iter must be at least 1".to_string(),
            ));
        }
        if let Some(ratio) = self.alpha_min_ratio {
            if !(ratio.is_finite() && ratio > 0.0 && ratio < 1.0) {
                return Err(SlopeError::InvalidParameter(format!(
                    "alpha_min_ratio must lie in (0,1), got {ratio}"
                )));
            }
        }
        if let Some(alphas) = &self.alphas {
            if alphas.is_empty() {
                return Err(SlopeError::InvalidParameter(
                    "explicit alpha sequence must be non-empty".to_string(),
                ));
            }
            for &alpha in alphas {
                if !(alpha.is_finite() && alpha > 0.0) {
                    return Err(SlopeError::InvalidParameter(format!(
                        "explicit alphas must be positive and finite, got {alpha}"
                    )));
                }
            }
        }
        Ok(())
    }
}
