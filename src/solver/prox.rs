//! Sorted-L1 proximal operator.
//!
//! Computes `argmin_b 0.5*||b - z||^2 + sum_i lambda_i * |b|_(i)` where
//! `|b|_(i)` is the i-th largest absolute entry. The minimizer is found by
//! sorting `|z|` in decreasing order, subtracting the (non-increasing)
//! weight sequence, projecting the result onto the non-increasing cone with
//! a pool-adjacent-violators pass, clamping at zero, and restoring the
//! original order and signs.

use ndarray::{Array1, ArrayView1};

/// Pool-adjacent-violators projection onto the non-increasing cone.
///
/// Overwrites `values` with the closest (in least squares) non-increasing
/// sequence. This is an orthogonal projection, hence idempotent: running it
/// on its own output leaves the values unchanged.
pub fn pav_nonincreasing(values: &mut [f64]) {
    let p = values.len();
    if p < 2 {
        return;
    }

    // Blocks of pooled ranks, tracked as (first rank, last rank, sum).
    let mut block_start = vec![0usize; p];
    let mut block_end = vec![0usize; p];
    let mut block_sum = vec![0.0f64; p];
    let mut block_avg = vec![0.0f64; p];
    let mut top = 0usize;

    for (i, &v) in values.iter().enumerate() {
        block_start[top] = i;
        block_end[top] = i;
        block_sum[top] = v;
        block_avg[top] = v;
        top += 1;
        while top > 1 && block_avg[top - 2] <= block_avg[top - 1] {
            block_end[top - 2] = block_end[top - 1];
            block_sum[top - 2] += block_sum[top - 1];
            block_avg[top - 2] =
                block_sum[top - 2] / (block_end[top - 2] - block_start[top - 2] + 1) as f64;
            top -= 1;
        }
    }

    for blk in 0..top {
        for rank in block_start[blk]..=block_end[blk] {
            values[rank] = block_avg[blk];
        }
    }
}

/// Apply the sorted-L1 proximal operator to `z` with weights `lambdas`.
///
/// `lambdas` must be non-increasing and non-negative; callers validate this
/// once at the solver boundary.
pub fn sorted_l1_prox(z: ArrayView1<'_, f64>, lambdas: ArrayView1<'_, f64>) -> Array1<f64> {
    let p = z.len();
    debug_assert_eq!(p, lambdas.len());
    if p == 0 {
        return Array1::zeros(0);
    }

    // Permutation sorting |z| into decreasing order.
    let mut order: Vec<usize> = (0..p).collect();
    order.sort_unstable_by(|&a, &b| z[b].abs().total_cmp(&z[a].abs()));

    let mut pooled: Vec<f64> = (0..p).map(|i| z[order[i]].abs() - lambdas[i]).collect();
    pav_nonincreasing(&mut pooled);

    let mut out = Array1::<f64>::zeros(p);
    for (rank, &value) in pooled.iter().enumerate() {
        if value <= 0.0 {
            // Pooled values are non-increasing; everything below stays zero.
            break;
        }
        let j = order[rank];
        out[j] = value * z[j].signum();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn constant_weights_reduce_to_soft_thresholding() {
        let z = array![3.0, -1.5, 0.2, -4.0];
        let lam = array![1.0, 1.0, 1.0, 1.0];
        let got = sorted_l1_prox(z.view(), lam.view());
        let expected = array![2.0, -0.5, 0.0, -3.0];
        for j in 0..4 {
            assert!((got[j] - expected[j]).abs() < 1e-12, "coord {j}: {}", got[j]);
        }
    }

    #[test]
    fn zero_weights_are_the_identity() {
        let z = array![0.5, -2.0, 1.25];
        let lam = array![0.0, 0.0, 0.0];
        let got = sorted_l1_prox(z.view(), lam.view());
        for j in 0..3 {
            assert!((got[j] - z[j]).abs() < 1e-12);
        }
    }

    #[test]
    fn pooling_averages_adjacent_violators() {
        // |z| sorted is [4, 3.9]; after subtracting [3, 1] the values
        // [1.0, 2.9] violate monotonicity and pool to their average 1.95.
        let z = array![4.0, -3.9];
        let lam = array![3.0, 1.0];
        let got = sorted_l1_prox(z.view(), lam.view());
        assert!((got[0] - 1.95).abs() < 1e-12);
        assert!((got[1] + 1.95).abs() < 1e-12);
    }

    #[test]
    fn pav_projection_is_idempotent() {
        let mut once = vec![2.0, 2.4, 1.2, 0.3, 0.1, -0.05, 0.7];
        pav_nonincreasing(&mut once);
        let mut twice = once.clone();
        pav_nonincreasing(&mut twice);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a - b).abs() < 1e-15, "{a} vs {b}");
        }
        // And the output really is non-increasing.
        for w in once.windows(2) {
            assert!(w[0] >= w[1] - 1e-15);
        }
    }

    #[test]
    fn pav_leaves_monotone_input_untouched() {
        let mut values = vec![3.0, 2.0, 2.0, -1.0];
        let original = values.clone();
        pav_nonincreasing(&mut values);
        assert_eq!(values, original);
    }

    #[test]
    fn zero_is_the_unique_fixed_point_under_positive_weights() {
        let lam = array![1.0, 0.5];
        let z = Array1::<f64>::zeros(2);
        let got = sorted_l1_prox(z.view(), lam.view());
        assert!(got.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn output_magnitudes_follow_input_ranking() {
        let z = array![-5.0, 1.0, 3.0, -2.0, 0.1];
        let lam = array![1.2, 1.0, 0.7, 0.4, 0.1];
        let got = sorted_l1_prox(z.view(), lam.view());

        let mut order: Vec<usize> = (0..z.len()).collect();
        order.sort_unstable_by(|&a, &b| z[b].abs().total_cmp(&z[a].abs()));
        for w in order.windows(2) {
            assert!(
                got[w[0]].abs() >= got[w[1]].abs() - 1e-12,
                "ranking violated between {} and {}",
                w[0],
                w[1]
            );
        }
        // Signs never flip.
        for j in 0..z.len() {
            assert!(got[j] * z[j] >= 0.0);
        }
    }

    #[test]
    fn fully_thresholded_input_is_zero() {
        let z = array![0.3, -0.2, 0.1];
        let lam = array![1.0, 0.9, 0.8];
        let got = sorted_l1_prox(z.view(), lam.view());
        assert!(got.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let z = Array1::<f64>::zeros(0);
        let lam = Array1::<f64>::zeros(0);
        assert_eq!(sorted_l1_prox(z.view(), lam.view()).len(), 0);
    }
}
