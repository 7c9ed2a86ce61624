use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2};
use sortedl1::linalg::least_squares;
use sortedl1::{LambdaType, Slope};

/// The 10x3 reference problem used throughout the path scenarios.
fn reference_data() -> (Array2<f64>, Array1<f64>) {
    let x = array![
        [1.0, 2.0, 3.0],
        [4.0, 5.0, 6.0],
        [7.0, 8.0, 9.0],
        [1.0, 0.0, 1.0],
        [0.0, 1.0, 0.0],
        [2.0, 1.0, 3.0],
        [3.0, 2.0, 1.0],
        [4.0, 0.0, 2.0],
        [0.0, 3.0, 1.0],
        [1.0, 1.0, 1.0]
    ];
    let y = array![1.0, 2.0, 3.0, 1.0, 0.0, 2.0, 1.0, 3.0, 0.0, 1.0];
    (x, y)
}

/// Ordinary least squares with an intercept column, as the unpenalized
/// reference the low-penalty end of the path should approach.
fn ols_with_intercept(x: &Array2<f64>, y: &Array1<f64>) -> (Array1<f64>, f64) {
    let n = x.nrows();
    let p = x.ncols();
    let mut augmented = Array2::<f64>::ones((n, p + 1));
    for i in 0..n {
        for j in 0..p {
            augmented[[i, j + 1]] = x[[i, j]];
        }
    }
    let full = least_squares(augmented.view(), y.view()).expect("full-rank reference problem");
    let mut beta = Array1::<f64>::zeros(p);
    for j in 0..p {
        beta[j] = full[j + 1];
    }
    (beta, full[0])
}

#[test]
fn lasso_path_spans_zero_to_least_squares() {
    let (x, y) = reference_data();
    let model = Slope::new().lambda_type(LambdaType::Lasso);
    let path = model.path(x.view(), y.view()).expect("path fits");
    assert_eq!(path.len(), 100);
    assert!(path.all_converged());

    // Highest penalty: the zero vector, predicting the response mean.
    let first = &path.steps[0];
    assert_eq!(first.n_active, 0);
    assert!(first.coefficients.iter().all(|&v| v == 0.0));
    assert_abs_diff_eq!(first.intercept, 1.4, epsilon = 1e-10);

    // Lowest penalty: all three predictors active, close to OLS.
    let (ols_beta, ols_intercept) = ols_with_intercept(&x, &y);
    let last = path.last().expect("non-empty path");
    assert_eq!(last.n_active, 3);
    for j in 0..3 {
        assert!(last.coefficients[j].abs() > 1e-3, "coefficient {j} is zero");
        assert!(
            (last.coefficients[j] - ols_beta[j]).abs() < 0.05 * (1.0 + ols_beta[j].abs()),
            "coefficient {j}: {} vs OLS {}",
            last.coefficients[j],
            ols_beta[j]
        );
    }
    assert!(
        (last.intercept - ols_intercept).abs() < 0.05 * (1.0 + ols_intercept.abs()),
        "intercept {} vs OLS {}",
        last.intercept,
        ols_intercept
    );
}

#[test]
fn path_alphas_decrease_and_deviance_does_not_increase() {
    let (x, y) = reference_data();
    let model = Slope::new().lambda_type(LambdaType::Lasso);
    let path = model.path(x.view(), y.view()).expect("path fits");

    let alphas = path.alphas();
    for w in alphas.windows(2) {
        assert!(w[0] > w[1], "alphas not strictly decreasing: {w:?}");
    }
    let slack = 1e-6 * path.steps[0].deviance;
    for w in path.steps.windows(2) {
        assert!(
            w[1].deviance <= w[0].deviance + slack,
            "training deviance increased: {} -> {}",
            w[0].deviance,
            w[1].deviance
        );
    }
}

#[test]
fn bh_path_diverges_from_the_lasso_path() {
    let (x, y) = reference_data();
    let lasso = Slope::new()
        .lambda_type(LambdaType::Lasso)
        .path(x.view(), y.view())
        .expect("lasso path fits");
    let slope = Slope::new()
        .lambda_type(LambdaType::Bh)
        .q(0.2)
        .path(x.view(), y.view())
        .expect("bh path fits");

    // The BH profile is strictly decreasing over ranks, unlike the constant
    // Lasso profile, so the two paths cannot coincide index by index.
    assert!(slope.lambda[0] > slope.lambda[2]);
    assert!(lasso.lambda.iter().all(|&w| w == 1.0));

    let shared = lasso.len().min(slope.len());
    let mut differs = false;
    for i in 0..shared {
        let a = &lasso.steps[i];
        let b = &slope.steps[i];
        if a.n_active != b.n_active {
            differs = true;
            break;
        }
        let max_diff = a
            .coefficients
            .iter()
            .zip(b.coefficients.iter())
            .map(|(u, v)| (u - v).abs())
            .fold(0.0f64, f64::max);
        if max_diff > 1e-6 {
            differs = true;
            break;
        }
    }
    assert!(differs, "lasso and bh paths are identical at every index");
}

#[test]
fn unstandardized_interceptless_path_approaches_raw_least_squares() {
    let (x, y) = reference_data();
    let model = Slope::new()
        .lambda_type(LambdaType::Lasso)
        .standardize(false)
        .fit_intercept(false);
    let path = model.path(x.view(), y.view()).expect("path fits");

    let ols = least_squares(x.view(), y.view()).expect("full column rank");
    let last = path.last().expect("non-empty path");
    assert_eq!(last.intercept, 0.0);
    for j in 0..3 {
        assert!(
            (last.coefficients[j] - ols[j]).abs() < 0.05 * (1.0 + ols[j].abs()),
            "coefficient {j}: {} vs OLS {}",
            last.coefficients[j],
            ols[j]
        );
    }
}

#[test]
fn path_recovers_a_sparse_signal_on_synthetic_data() {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    let mut rng = StdRng::seed_from_u64(3);
    let standard = Normal::new(0.0, 1.0).expect("valid distribution");
    let noise = Normal::new(0.0, 0.1).expect("valid distribution");
    let (n, p) = (60, 8);
    let mut x = Array2::<f64>::zeros((n, p));
    for v in x.iter_mut() {
        *v = standard.sample(&mut rng);
    }
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        y[i] = 3.0 * x[[i, 0]] - 2.0 * x[[i, 1]] + noise.sample(&mut rng);
    }

    let path = Slope::new().q(0.1).path(x.view(), y.view()).expect("path fits");
    assert!(path.all_converged());

    // The low-penalty end is essentially the least-squares fit of a strong
    // two-predictor signal.
    let last = path.last().expect("non-empty path");
    assert!((last.coefficients[0] - 3.0).abs() < 0.2);
    assert!((last.coefficients[1] + 2.0).abs() < 0.2);

    // Mid-path, the signal predictors are in while noise predictors are
    // still excluded.
    assert!(path.steps.iter().any(|s| {
        s.coefficients[0].abs() > 1.0 && s.coefficients[1].abs() > 0.5 && s.n_active < p
    }));
}

#[test]
fn explicit_alpha_grid_is_respected() {
    let (x, y) = reference_data();
    let model = Slope::new()
        .lambda_type(LambdaType::Lasso)
        .alphas(vec![0.5, 0.05, 0.005]);
    let path = model.path(x.view(), y.view()).expect("path fits");
    assert_eq!(path.alphas(), vec![0.5, 0.05, 0.005]);
    // Sparsity can only grow (weakly) as the penalty drops on this data.
    assert!(path.steps[0].n_active <= path.last().expect("non-empty").n_active);
}
