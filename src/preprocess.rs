//! Column standardization with a retained, invertible transform.
//!
//! Fits run on centered/scaled copies of the design; the transform maps the
//! fitted coefficients back to the original data scale and produces the
//! intercept. Constant columns get a unit scale so they pass through the
//! solver untouched (centering makes them identically zero, so they can
//! never become active).

use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Mean/scale parameters applied to a design matrix before a fit.
#[derive(Debug, Clone)]
pub struct Transform {
    pub means: Array1<f64>,
    pub scales: Array1<f64>,
}

impl Transform {
    /// Map coefficients fitted on the transformed design back to the
    /// original data scale, and recover the intercept from the response
    /// mean (zero when no intercept was requested, in which case `y_mean`
    /// and `means` are both zero).
    pub fn original_scale(&self, beta: &Array1<f64>, y_mean: f64) -> (Array1<f64>, f64) {
        let restored = beta / &self.scales;
        let intercept = y_mean - restored.dot(&self.means);
        (restored, intercept)
    }
}

/// Center and/or scale the columns of `x`, returning the transformed copy
/// and the transform. Scaling uses the population standard deviation.
pub fn standardize(x: ArrayView2<'_, f64>, center: bool, scale: bool) -> (Array2<f64>, Transform) {
    let p = x.ncols();
    let n = x.nrows() as f64;

    let means = if center {
        x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(p))
    } else {
        Array1::zeros(p)
    };

    let mut out = x.to_owned();
    if center {
        for (j, &m) in means.iter().enumerate() {
            out.column_mut(j).mapv_inplace(|v| v - m);
        }
    }

    let mut scales = Array1::<f64>::ones(p);
    if scale {
        for j in 0..p {
            let col = out.column(j);
            // Uncentered scaling still removes the mean from the variance so
            // the two modes agree on spread.
            let residual_mean = if center { 0.0 } else { col.mean().unwrap_or(0.0) };
            let var = col.dot(&col) / n - residual_mean * residual_mean;
            let sd = var.max(0.0).sqrt();
            if sd > 0.0 {
                scales[j] = sd;
                out.column_mut(j).mapv_inplace(|v| v / sd);
            }
        }
    }

    (out, Transform { means, scales })
}
