//! # Path Fitter
//!
//! Drives the solver across a descending sequence of penalty scales. The
//! scale grid runs log-spaced from the data-derived maximum (the smallest
//! scale at which the zero vector is optimal) down to a small fraction of
//! it, unless the caller supplies an explicit grid. Each step warm-starts
//! from its predecessor's coefficients; the first step starts at zero.
//!
//! Steps are strictly sequential — the warm-start chain is a data
//! dependency, so a path must never be parallelized internally.

use crate::estimate::SlopeError;
use crate::lambda::lambda_sequence;
use crate::preprocess::standardize;
use crate::solver::{dual_ball_scale, solve, SolverSettings};
use crate::types::{Coefficients, SlopeConfig};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// One fitted point on a regularization path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStep {
    /// Penalty scale multiplying the unit weight sequence.
    pub alpha: f64,
    /// Coefficients on the original data scale.
    pub coefficients: Coefficients,
    pub intercept: f64,
    /// Number of non-zero coefficients.
    pub n_active: usize,
    /// Residual sum of squares of this fit (the Gaussian deviance).
    pub deviance: f64,
    /// False when the solver hit its iteration cap at this step; the step
    /// still holds the best iterate found.
    pub converged: bool,
}

/// An ordered regularization path, strictly decreasing in penalty scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    pub steps: Vec<PathStep>,
    /// Unit penalty-weight profile shared by every step.
    pub lambda: Array1<f64>,
}

impl Path {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The penalty scales actually fitted, in descending order.
    pub fn alphas(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.alpha).collect()
    }

    /// The last (least penalized, most complex) step.
    pub fn last(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// The step whose scale is nearest to `alpha` in log space. The path is
    /// descending, so early-terminated paths resolve to their last step.
    pub fn nearest_step(&self, alpha: f64) -> Option<&PathStep> {
        self.steps.iter().min_by(|a, b| {
            let da = (a.alpha.ln() - alpha.ln()).abs();
            let db = (b.alpha.ln() - alpha.ln()).abs();
            da.total_cmp(&db)
        })
    }

    /// True when every step's solver run converged.
    pub fn all_converged(&self) -> bool {
        self.steps.iter().all(|s| s.converged)
    }
}

/// Log-spaced descending grid of `count` scales from `alpha_max` down to
/// `alpha_max * ratio`.
fn log_spaced_grid(alpha_max: f64, ratio: f64, count: usize) -> Vec<f64> {
    if count == 1 {
        return vec![alpha_max];
    }
    let log_max = alpha_max.ln();
    let log_min = (alpha_max * ratio).ln();
    (0..count)
        .map(|i| {
            let t = i as f64 / (count - 1) as f64;
            (log_max + t * (log_min - log_max)).exp()
        })
        .collect()
}

/// Fit a full regularization path.
///
/// Returns the accumulated path; a path shorter than the requested grid
/// means the active-set ceiling stopped it early, which is a normal outcome.
pub fn fit_path(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    config: &SlopeConfig,
) -> Result<Path, SlopeError> {
    config.validate()?;
    let n = x.nrows();
    let p = x.ncols();
    if n == 0 || p == 0 {
        return Err(SlopeError::InvalidParameter(
            "design matrix must have at least one row and one column".to_string(),
        ));
    }
    if y.len() != n {
        return Err(SlopeError::InvalidParameter(format!(
            "response length {} does not match {} observations",
            y.len(),
            n
        )));
    }
    if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
        return Err(SlopeError::InvalidParameter(
            "design matrix and response must be finite".to_string(),
        ));
    }

    let weights = lambda_sequence(config.lambda_type, p, config.q)?;
    let (xs, transform) = standardize(x, config.fit_intercept, config.standardize);
    let y_mean = if config.fit_intercept {
        y.mean().unwrap_or(0.0)
    } else {
        0.0
    };
    let yc = &y - y_mean;

    let alphas = match &config.alphas {
        Some(explicit) => {
            let mut grid = explicit.clone();
            grid.sort_unstable_by(|a, b| b.total_cmp(a));
            grid
        }
        None => {
            let c = xs.t().dot(&yc) / n as f64;
            let alpha_max = dual_ball_scale(c.view(), weights.view());
            if !(alpha_max.is_finite() && alpha_max > 0.0) {
                return Err(SlopeError::InvalidParameter(
                    "cannot derive a penalty scale: the response is orthogonal to every predictor"
                        .to_string(),
                ));
            }
            let ratio = config
                .alpha_min_ratio
                .unwrap_or(if n > p { 1e-4 } else { 1e-2 });
            log_spaced_grid(alpha_max, ratio, config.path_length)
        }
    };

    let settings = SolverSettings {
        tol: config.tol,
        max_iter: config.max_iter,
    };
    let mut warm = Coefficients::zeros(p);
    let mut steps: Vec<PathStep> = Vec::with_capacity(alphas.len());

    for &alpha in &alphas {
        let scaled = &weights * alpha;
        let fit = solve(
            xs.view(),
            yc.view(),
            scaled.view(),
            &warm,
            config.family,
            &settings,
        )?;
        if !fit.converged {
            log::warn!(
                "path step at alpha {alpha:.4e} stopped at the iteration cap (gap {:.3e})",
                fit.gap
            );
        }

        let n_active = fit.coefficients.n_active();
        let (restored, intercept) = transform.original_scale(&fit.coefficients, y_mean);
        let predictions = x.dot(&restored) + intercept;
        let deviance = y
            .iter()
            .zip(predictions.iter())
            .map(|(yi, pi)| (yi - pi) * (yi - pi))
            .sum();

        steps.push(PathStep {
            alpha,
            coefficients: Coefficients::new(restored),
            intercept,
            n_active,
            deviance,
            converged: fit.converged,
        });

        if let Some(ceiling) = config.max_active {
            if n_active > ceiling {
                log::warn!(
                    "path terminated early at alpha {alpha:.4e}: {n_active} active predictors exceed the ceiling of {ceiling}"
                );
                break;
            }
        }
        warm = fit.coefficients;
    }

    Ok(Path {
        steps,
        lambda: weights,
    })
}
