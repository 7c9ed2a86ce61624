//! Penalty sequence construction.
//!
//! A penalty-weight sequence assigns one non-negative weight per coefficient
//! rank, sorted non-increasing. A constant sequence recovers the Lasso; the
//! Benjamini-Hochberg sequence gives SLOPE its false-discovery-rate control.
//! Sequences produced here are *unit* profiles: the path fitter multiplies
//! them by a scalar penalty scale `alpha`.

use crate::estimate::SlopeError;
use crate::probability::standard_normal_quantile;
use crate::types::LambdaType;
use ndarray::{Array1, ArrayView1};

/// Build the unit penalty-weight sequence for `p` predictors.
///
/// - `LambdaType::Lasso`: `p` ones. Every rank is penalized equally.
/// - `LambdaType::Bh`: `w[i] = Φ⁻¹(1 − (i+1)·q / (2p))` for ranks
///   `i = 0..p`. The construction bounds the expected proportion of falsely
///   selected predictors by `q` under orthogonal designs (Bogdan et al.).
///
/// The BH quantiles are strictly decreasing analytically; floating-point
/// ties are resolved by clamping each entry to its predecessor, in rank
/// order, so the output is non-increasing by construction rather than by a
/// value-comparison sort.
pub fn lambda_sequence(
    lambda_type: LambdaType,
    p: usize,
    q: f64,
) -> Result<Array1<f64>, SlopeError> {
    if p == 0 {
        return Err(SlopeError::InvalidParameter(
            "penalty sequence requires at least one predictor".to_string(),
        ));
    }
    if !(q.is_finite() && q > 0.0 && q < 1.0) {
        return Err(SlopeError::InvalidParameter(format!(
            "q must lie in (0,1), got {q}"
        )));
    }

    match lambda_type {
        LambdaType::Lasso => Ok(Array1::ones(p)),
        LambdaType::Bh => {
            let mut weights = Array1::<f64>::zeros(p);
            let denom = 2.0 * p as f64;
            for i in 0..p {
                let prob = 1.0 - (i as f64 + 1.0) * q / denom;
                let w = standard_normal_quantile(prob)
                    .map_err(SlopeError::InvalidParameter)?;
                weights[i] = if i > 0 { w.min(weights[i - 1]) } else { w };
            }
            Ok(weights)
        }
    }
}

/// Fail-fast check of the invariants every weight sequence entering the
/// solver must satisfy: finite, non-negative, non-increasing, not all zero.
/// A violating sequence is an error, never silently corrected.
pub fn validate_weights(weights: ArrayView1<'_, f64>) -> Result<(), SlopeError> {
    if weights.is_empty() {
        return Err(SlopeError::InvalidParameter(
            "weight sequence must be non-empty".to_string(),
        ));
    }
    let mut prev = f64::INFINITY;
    for (i, &w) in weights.iter().enumerate() {
        if !w.is_finite() || w < 0.0 {
            return Err(SlopeError::InvalidParameter(format!(
                "weight {i} must be finite and non-negative, got {w}"
            )));
        }
        if w > prev {
            return Err(SlopeError::InvalidParameter(format!(
                "weight sequence must be non-increasing; weight {i} = {w} exceeds its predecessor {prev}"
            )));
        }
        prev = w;
    }
    if weights[0] == 0.0 {
        return Err(SlopeError::InvalidParameter(
            "weight sequence must not be identically zero".to_string(),
        ));
    }
    Ok(())
}
