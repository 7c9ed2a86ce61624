//! Regularization paths for sorted-L1 penalized regression.
//!
//! Fits ordinary Lasso and SLOPE (Sorted L-One Penalized Estimation) linear
//! models across a descending sequence of penalty strengths, and selects the
//! best path point by k-fold cross-validation. The sorted-L1 penalty weights
//! coefficients by the rank of their magnitude; with the Benjamini-Hochberg
//! weight sequence this controls the false discovery rate of the selected
//! predictors.

#![deny(dead_code)]
#![deny(unused_imports)]

pub mod cv;
pub mod estimate;
pub mod lambda;
pub mod linalg;
pub mod path;
pub mod preprocess;
pub mod probability;
pub mod solver;
pub mod types;

pub use cv::{cross_validate, CvBest, CvGrid, CvGridStats, CvResult, CvSettings, FoldPartition};
pub use estimate::{Slope, SlopeError};
pub use lambda::lambda_sequence;
pub use path::{fit_path, Path, PathStep};
pub use solver::{solve, SolveResult, SolverSettings};
pub use types::{Coefficients, Family, LambdaType, SlopeConfig};
