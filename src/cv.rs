//! # Cross-Validator
//!
//! Splits the observations into k near-equal folds, refits the path on each
//! fold's training rows for every hyperparameter combination, scores
//! held-out mean squared error, and selects the combination and penalty
//! scale with the lowest average loss.
//!
//! The (fold x grid-point) tasks are independent and run on the rayon pool;
//! each task owns its fold-sliced copies of the data and results are merged
//! by indexed writes into preallocated storage — no shared mutable
//! accumulation.

use crate::estimate::{Slope, SlopeError};
use crate::path::fit_path;
use crate::types::{LambdaType, SlopeConfig};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_n_folds() -> usize {
    10
}

/// Resampling knobs. The seed fixes the fold shuffle, making the whole
/// cross-validation deterministic for a given grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvSettings {
    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    #[serde(default)]
    pub seed: u64,
}

impl Default for CvSettings {
    fn default() -> Self {
        Self {
            n_folds: default_n_folds(),
            seed: 0,
        }
    }
}

/// Hyperparameter grid. Empty axes fall back to the model's own settings;
/// `qs` only applies to lambda types that consume an FDR target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvGrid {
    pub lambda_types: Vec<LambdaType>,
    pub qs: Vec<f64>,
}

impl Default for CvGrid {
    fn default() -> Self {
        Self {
            lambda_types: Vec::new(),
            qs: vec![0.1, 0.2],
        }
    }
}

/// Surjective assignment of observation indices to k non-empty folds.
#[derive(Debug, Clone)]
pub struct FoldPartition {
    assignment: Vec<usize>,
    k: usize,
}

impl FoldPartition {
    /// Shuffled round-robin assignment of `n` observations to `k` folds.
    /// Fold sizes differ by at most one; every fold is non-empty.
    pub fn new(n: usize, k: usize, seed: u64) -> Result<Self, SlopeError> {
        if k < 2 || k > n {
            return Err(SlopeError::InvalidParameter(format!(
                "fold count must lie in [2, n] = [2, {n}], got {k}"
            )));
        }
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
        let mut assignment = vec![0usize; n];
        for (pos, &obs) in order.iter().enumerate() {
            assignment[obs] = pos % k;
        }
        Ok(Self { assignment, k })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Fold assignment of one observation, or `None` when the index is out
    /// of range.
    pub fn fold_of(&self, observation: usize) -> Option<usize> {
        self.assignment.get(observation).copied()
    }

    /// Disjoint (training, validation) index sets for one fold.
    pub fn split(&self, fold: usize) -> (Vec<usize>, Vec<usize>) {
        let mut train = Vec::with_capacity(self.assignment.len());
        let mut valid = Vec::new();
        for (i, &f) in self.assignment.iter().enumerate() {
            if f == fold {
                valid.push(i);
            } else {
                train.push(i);
            }
        }
        (train, valid)
    }
}

/// Held-out statistics for one hyperparameter combination across the whole
/// penalty-scale axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvGridStats {
    pub lambda_type: LambdaType,
    pub q: Option<f64>,
    /// Penalty scales of the full-data reference path, descending.
    pub alphas: Vec<f64>,
    /// Average held-out loss per scale.
    pub mean_losses: Vec<f64>,
    /// Per-fold held-out losses, one row per fold.
    pub fold_losses: Array2<f64>,
    /// Active-predictor counts from the full-data reference path.
    pub n_active: Vec<usize>,
    /// False when any solve (reference or fold) hit its iteration cap.
    pub all_converged: bool,
}

/// The selected grid point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvBest {
    pub lambda_type: LambdaType,
    pub q: Option<f64>,
    pub alpha: f64,
    pub mean_loss: f64,
    pub n_active: usize,
}

/// Everything the cross-validation produced: the selection plus the full
/// per-grid-point statistics, retained for inspection. Owned by the caller
/// and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvResult {
    pub best: CvBest,
    pub grid: Vec<CvGridStats>,
}

impl CvResult {
    /// Name-to-value mapping of the selected configuration: `"lambda_type"`
    /// (numeric encoding), `"alpha"`, and `"q"` when the profile uses one.
    pub fn best_params(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("lambda_type".to_string(), self.best.lambda_type.as_f64());
        map.insert("alpha".to_string(), self.best.alpha);
        if let Some(q) = self.best.q {
            map.insert("q".to_string(), q);
        }
        map
    }
}

struct FoldEval {
    combo: usize,
    fold: usize,
    losses: Vec<f64>,
    converged: bool,
}

fn expand_combos(model: &Slope, grid: &CvGrid) -> Result<Vec<(LambdaType, Option<f64>)>, SlopeError> {
    let lambda_types = if grid.lambda_types.is_empty() {
        vec![model.config().lambda_type]
    } else {
        grid.lambda_types.clone()
    };
    let qs = if grid.qs.is_empty() {
        vec![model.config().q]
    } else {
        grid.qs.clone()
    };
    for &q in &qs {
        if !(q.is_finite() && q > 0.0 && q < 1.0) {
            return Err(SlopeError::InvalidParameter(format!(
                "grid q values must lie in (0,1), got {q}"
            )));
        }
    }
    let mut combos = Vec::new();
    for &lt in &lambda_types {
        if lt.uses_q() {
            for &q in &qs {
                combos.push((lt, Some(q)));
            }
        } else {
            combos.push((lt, None));
        }
    }
    Ok(combos)
}

/// Run k-fold cross-validation for `model` over `grid`.
///
/// The penalty-scale axis of each grid point is the full-data path's scale
/// grid for that combination; fold refits reuse it so every fold scores the
/// same scales. Selection takes the minimum average held-out loss, breaking
/// ties by fewer active predictors and then by grid iteration order.
pub fn cross_validate(
    model: &Slope,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    grid: &CvGrid,
    settings: &CvSettings,
) -> Result<CvResult, SlopeError> {
    let n = x.nrows();
    if y.len() != n {
        return Err(SlopeError::InvalidParameter(format!(
            "response length {} does not match {} observations",
            y.len(),
            n
        )));
    }
    let partition = FoldPartition::new(n, settings.n_folds, settings.seed)?;
    let combos = expand_combos(model, grid)?;

    let configs: Vec<SlopeConfig> = combos
        .iter()
        .map(|&(lt, q)| {
            let mut cfg = model.config().clone();
            cfg.lambda_type = lt;
            if let Some(q) = q {
                cfg.q = q;
            }
            cfg.alphas = None;
            cfg
        })
        .collect();

    // Full-data reference paths fix the alpha grid per combination. Grid
    // points are independent, so these fits run in parallel too.
    let ref_paths = configs
        .clone()
        .into_par_iter()
        .map(|cfg| fit_path(x, y, &cfg))
        .collect::<Result<Vec<_>, SlopeError>>()?;

    let splits: Vec<(Vec<usize>, Vec<usize>)> =
        (0..partition.k()).map(|f| partition.split(f)).collect();
    let tasks: Vec<(usize, usize)> = (0..combos.len())
        .flat_map(|ci| (0..splits.len()).map(move |fi| (ci, fi)))
        .collect();

    let evals = tasks
        .into_par_iter()
        .map(|(ci, fi)| -> Result<FoldEval, SlopeError> {
            let (train, valid) = &splits[fi];
            let xt = x.select(Axis(0), train);
            let yt = y.select(Axis(0), train);
            let xv = x.select(Axis(0), valid);
            let yv = y.select(Axis(0), valid);

            let mut cfg = configs[ci].clone();
            cfg.alphas = Some(ref_paths[ci].alphas());
            let path = fit_path(xt.view(), yt.view(), &cfg)?;
            let last = path.last().ok_or_else(|| {
                SlopeError::InvalidParameter("path fitting produced no steps".to_string())
            })?;

            // An early-terminated fold path resolves missing scales to its
            // last (nearest) step.
            let n_alphas = ref_paths[ci].len();
            let mut losses = Vec::with_capacity(n_alphas);
            for i in 0..n_alphas {
                let step = path.steps.get(i).unwrap_or(last);
                let pred = xv.dot(&step.coefficients.0) + step.intercept;
                let mse = pred
                    .iter()
                    .zip(yv.iter())
                    .map(|(p, o)| (p - o) * (p - o))
                    .sum::<f64>()
                    / yv.len() as f64;
                losses.push(mse);
            }
            Ok(FoldEval {
                combo: ci,
                fold: fi,
                losses,
                converged: path.all_converged(),
            })
        })
        .collect::<Result<Vec<_>, SlopeError>>()?;

    // Indexed-write reduction into per-combination loss tables.
    let k = splits.len();
    let mut fold_losses: Vec<Array2<f64>> = ref_paths
        .iter()
        .map(|p| Array2::zeros((k, p.len())))
        .collect();
    let mut converged: Vec<bool> = ref_paths.iter().map(|p| p.all_converged()).collect();
    for ev in &evals {
        for (i, &loss) in ev.losses.iter().enumerate() {
            fold_losses[ev.combo][[ev.fold, i]] = loss;
        }
        converged[ev.combo] &= ev.converged;
    }

    let mut stats = Vec::with_capacity(combos.len());
    for (ci, &(lt, q)) in combos.iter().enumerate() {
        let path = &ref_paths[ci];
        let losses = &fold_losses[ci];
        let mean_losses: Vec<f64> = (0..path.len())
            .map(|i| losses.column(i).sum() / k as f64)
            .collect();
        stats.push(CvGridStats {
            lambda_type: lt,
            q,
            alphas: path.alphas(),
            mean_losses,
            fold_losses: losses.clone(),
            n_active: path.steps.iter().map(|s| s.n_active).collect(),
            all_converged: converged[ci],
        });
    }

    // Minimum average loss; ties prefer the sparser model, then the earlier
    // grid point.
    let mut best: Option<CvBest> = None;
    for st in &stats {
        for (ai, &loss) in st.mean_losses.iter().enumerate() {
            let n_active = st.n_active[ai];
            let better = match &best {
                None => true,
                Some(b) => loss < b.mean_loss || (loss == b.mean_loss && n_active < b.n_active),
            };
            if better {
                best = Some(CvBest {
                    lambda_type: st.lambda_type,
                    q: st.q,
                    alpha: st.alphas[ai],
                    mean_loss: loss,
                    n_active,
                });
            }
        }
    }
    let best = best.ok_or_else(|| {
        SlopeError::InvalidParameter("cross-validation grid produced no candidates".to_string())
    })?;

    if let Some(chosen) = stats.iter().find(|st| {
        st.lambda_type == best.lambda_type && st.q == best.q
    }) {
        if !chosen.all_converged {
            log::warn!(
                "selected grid point (lambda_type {:?}, q {:?}) includes solves that hit the iteration cap",
                best.lambda_type,
                best.q
            );
        }
    }

    Ok(CvResult { best, grid: stats })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_every_observation_exactly_once() {
        let part = FoldPartition::new(10, 5, 42).expect("valid partition");
        let mut counts = vec![0usize; 5];
        for i in 0..10 {
            counts[part.fold_of(i).expect("in range")] += 1;
        }
        assert!(counts.iter().all(|&c| c == 2));

        for fold in 0..5 {
            let (train, valid) = part.split(fold);
            assert_eq!(train.len() + valid.len(), 10);
            assert!(!valid.is_empty());
            for &i in &valid {
                assert_eq!(part.fold_of(i), Some(fold));
            }
            for &i in &train {
                assert_ne!(part.fold_of(i), Some(fold));
            }
        }
    }

    #[test]
    fn fold_of_out_of_range_is_none() {
        let part = FoldPartition::new(6, 3, 0).expect("valid partition");
        assert!(part.fold_of(5).is_some());
        assert_eq!(part.fold_of(6), None);
    }

    #[test]
    fn partition_sizes_differ_by_at_most_one() {
        let part = FoldPartition::new(13, 4, 7).expect("valid partition");
        let mut counts = vec![0usize; 4];
        for i in 0..13 {
            counts[part.fold_of(i).expect("in range")] += 1;
        }
        let max = counts.iter().max().copied().unwrap_or(0);
        let min = counts.iter().min().copied().unwrap_or(0);
        assert!(max - min <= 1, "sizes {counts:?}");
        assert!(min >= 1);
    }

    #[test]
    fn partition_is_deterministic_for_a_seed() {
        let a = FoldPartition::new(20, 5, 99).expect("valid");
        let b = FoldPartition::new(20, 5, 99).expect("valid");
        for i in 0..20 {
            assert_eq!(a.fold_of(i), b.fold_of(i));
        }
    }

    #[test]
    fn partition_rejects_out_of_range_k() {
        assert!(FoldPartition::new(10, 1, 0).is_err());
        assert!(FoldPartition::new(10, 11, 0).is_err());
        assert!(FoldPartition::new(10, 10, 0).is_ok());
        assert!(FoldPartition::new(10, 2, 0).is_ok());
    }

    #[test]
    fn grid_q_values_are_validated_up_front() {
        let model = Slope::new();
        let grid = CvGrid {
            lambda_types: vec![LambdaType::Bh],
            qs: vec![0.1, 1.5],
        };
        let err = expand_combos(&model, &grid).expect_err("q out of range");
        assert!(matches!(err, SlopeError::InvalidParameter(_)));
    }

    #[test]
    fn lasso_ignores_the_q_axis() {
        let model = Slope::new();
        let grid = CvGrid {
            lambda_types: vec![LambdaType::Lasso, LambdaType::Bh],
            qs: vec![0.1, 0.2],
        };
        let combos = expand_combos(&model, &grid).expect("valid grid");
        // One Lasso entry plus one Bh entry per q.
        assert_eq!(combos.len(), 3);
        assert_eq!(combos[0], (LambdaType::Lasso, None));
        assert_eq!(combos[1], (LambdaType::Bh, Some(0.1)));
        assert_eq!(combos[2], (LambdaType::Bh, Some(0.2)));
    }
}
