//! Media transforms: carryover (adstock) and diminishing returns (Hill).

use ndarray::{Array1, ArrayView1};

/// Maximum carryover lag, in time steps.
pub(crate) const MAX_LAG: usize = 8;

/// Delayed geometric adstock with normalized weights.
///
/// Weight at lag `l` is `decay^((l - peak)^2)`, so the effect peaks `peak`
/// steps after exposure; `peak = 0` is plain geometric decay. Weights over
/// `0..max_lag` sum to 1, preserving the series' total.
pub(crate) fn adstock(
    x: ArrayView1<f64>,
    decay: f64,
    peak: usize,
    max_lag: usize,
) -> Array1<f64> {
    let mut weights: Vec<f64> = (0..max_lag.max(1))
        .map(|lag| {
            let distance = lag.abs_diff(peak);
            #[expect(
                clippy::cast_possible_truncation,
                clippy::cast_possible_wrap,
                reason = "lags are below MAX_LAG"
            )]
            let exponent = (distance * distance) as i32;
            decay.powi(exponent)
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        for w in &mut weights {
            *w /= total;
        }
    }

    Array1::from_shape_fn(x.len(), |t| {
        weights
            .iter()
            .enumerate()
            .take(t + 1)
            .map(|(lag, w)| x[t - lag] * w)
            .sum()
    })
}

/// Hill saturation `x^s / (ec^s + x^s)`, in `[0, 1)` for `x >= 0`.
///
/// Negative inputs are treated as zero exposure.
pub(crate) fn hill(x: ArrayView1<f64>, ec: f64, slope: f64) -> Array1<f64> {
    let ec_s = ec.powf(slope);
    x.mapv(|v| {
        let v = v.max(0.0);
        let v_s = v.powf(slope);
        let denom = ec_s + v_s;
        if denom > 0.0 { v_s / denom } else { 0.0 }
    })
}
