//! Dense least-squares solvers.
//!
//! Normal equations are factored with nalgebra: Cholesky first, LU when the
//! Gram matrix is not numerically positive definite.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};

/// Relative ridge added to the normal-equation diagonal.
const RIDGE: f64 = 1e-9;

/// Solves the symmetric system `a · x = b`.
///
/// Returns `None` for (numerically) singular systems.
pub(crate) fn solve(a: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let x = match a.clone().cholesky() {
        Some(chol) => chol.solve(b),
        None => a.lu().solve(b)?,
    };
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Ordinary least squares over the `active` columns of `x`.
///
/// The returned vector has one entry per column of `x`; inactive columns
/// get 0.
pub(crate) fn least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    active: &[usize],
) -> Option<Array1<f64>> {
    let mut beta = Array1::zeros(x.ncols());
    if active.is_empty() {
        return Some(beta);
    }

    let design =
        DMatrix::from_fn(x.nrows(), active.len(), |i, j| x[(i, active[j])]);
    let target = DVector::from_iterator(y.len(), y.iter().copied());
    let mut gram = design.tr_mul(&design);
    let rhs = design.tr_mul(&target);

    let scale = gram.diagonal().iter().copied().fold(0.0, f64::max).max(1.0);
    for i in 0..active.len() {
        gram[(i, i)] += RIDGE * scale;
    }

    let solution = solve(gram, &rhs)?;
    for (&col, &value) in active.iter().zip(solution.iter()) {
        beta[col] = value;
    }
    Some(beta)
}

/// Least squares with `beta[j] >= 0` for every column where
/// `non_negative[j]` is set.
///
/// Active-set refits: while a constrained coefficient is negative, the most
/// negative one is pinned to zero and the rest refit.
pub(crate) fn non_negative_least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    non_negative: &[bool],
) -> Option<Array1<f64>> {
    let mut active: Vec<usize> = (0..x.ncols()).collect();
    loop {
        let beta = least_squares(x, y, &active)?;
        let worst = active
            .iter()
            .copied()
            .filter(|&j| non_negative[j] && beta[j] < 0.0)
            .min_by(|&i, &j| beta[i].total_cmp(&beta[j]));
        match worst {
            None => return Some(beta),
            Some(j) => active.retain(|&k| k != j),
        }
    }
}

/// Coefficient of determination of `fitted` against `observed`.
///
/// 0 when `observed` has no variance.
pub(crate) fn r_squared(observed: ArrayView1<f64>, fitted: ArrayView1<f64>) -> f64 {
    let mean = observed.mean().unwrap_or(0.0);
    let ss_tot: f64 = observed.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = observed
        .iter()
        .zip(fitted)
        .map(|(y, f)| (y - f).powi(2))
        .sum();
    if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot }
}

/// Mean absolute percentage error as a fraction, over non-zero observations.
pub(crate) fn mape(observed: ArrayView1<f64>, fitted: ArrayView1<f64>) -> f64 {
    let (sum, count) = observed
        .iter()
        .zip(fitted)
        .filter(|(y, _)| **y != 0.0)
        .fold((0.0, 0usize), |(sum, count), (y, f)| {
            (sum + ((y - f) / y).abs(), count + 1)
        });
    if count == 0 {
        0.0
    } else {
        #[expect(clippy::cast_precision_loss, reason = "row counts are small")]
        let n = count as f64;
        sum / n
    }
}
