//! Built-in regression backend (`native-v1`).
//!
//! Not a Bayesian sampler. The KPI is regressed on
//!
//! ```text
//! kpi[g, t] = intercept[g]
//!           + Σ_c beta[c] · hill(adstock(media[g, ·, c] / scale[c]))[t]
//!           + Σ_k gamma[k] · control[g, t, k]
//!           + Fourier seasonal terms
//! ```
//!
//! with `beta >= 0`. Adstock and Hill parameters are picked per channel by
//! grid search with coordinate sweeps. Posterior-like draws come from a
//! residual bootstrap laid out as `chains × keep`, which lets the normalizer
//! derive credible intervals the same way it does for a real sampler.

use std::f64::consts::TAU;

use itertools::iproduct;
use mmm_adapter::ModelInputArrays;
use mmm_schemas::{ModelOutput, SamplerSettings, Tensor};
use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, debug_span, info};

use crate::error::BackendError;
use crate::linalg::{mape, non_negative_least_squares, r_squared};
use crate::transform::{MAX_LAG, adstock, hill};
use crate::{BackendDescriptor, ModelBackend};

const DECAY_GRID: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
const PEAK_GRID: [usize; 4] = [0, 1, 2, 3];
/// Half-saturation points as multiples of the channel's mean exposure.
const EC_GRID: [f64; 4] = [0.5, 1.0, 1.5, 2.0];
const SLOPE_GRID: [f64; 3] = [1.0, 2.0, 3.0];
const SWEEPS: usize = 2;
const HARMONICS: usize = 2;
/// Seasonal terms need a few cycles' worth of points to be identifiable.
const MIN_POINTS_FOR_SEASONALITY: usize = 8;

/// Response parameters of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ChannelParams {
    decay: f64,
    peak: usize,
    ec: f64,
    slope: f64,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            decay: 0.5,
            peak: 0,
            ec: 1.0,
            slope: 2.0,
        }
    }
}

/// Regression backend that needs no external runtime.
#[derive(Debug, Clone, Default)]
pub struct NativeBackend;

impl ModelBackend for NativeBackend {
    fn descriptor(&self) -> BackendDescriptor {
        BackendDescriptor {
            id: "native-v1",
            model_type: "mmm_native".to_string(),
            api_version: None,
        }
    }

    fn fit(
        &self,
        input: &ModelInputArrays,
        sampler: &SamplerSettings,
    ) -> Result<ModelOutput, BackendError> {
        let _span = debug_span!("native.fit").entered();
        Fit::new(input)?.run(sampler)
    }
}

/// Fit state: flattened observations plus the fixed part of the design.
struct Fit<'a> {
    input: &'a ModelInputArrays,
    /// `kpi` flattened geo-major, one entry per (geo, time).
    y: Array1<f64>,
    /// Intercepts, seasonality and controls.
    base: Array2<f64>,
    /// Per-channel divisor making exposures unit-mean.
    scale: Vec<f64>,
}

impl<'a> Fit<'a> {
    fn new(input: &'a ModelInputArrays) -> Result<Self, BackendError> {
        let (g, t) = (input.n_geos(), input.n_times());
        let n = g * t;
        if n < 2 {
            return Err(BackendError::numerical(
                "at least two observations are needed",
            ));
        }

        let y = Array1::from_iter(input.kpi.iter().copied());

        let seasonal = if input.seasonality >= 3 && t >= MIN_POINTS_FOR_SEASONALITY {
            2 * HARMONICS
        } else {
            0
        };
        let controls = standardized_controls(input);
        let k = controls.as_ref().map_or(0, |c| c.ncols());

        let mut base = Array2::zeros((n, g + seasonal + k));
        for gi in 0..g {
            base.slice_mut(s![gi * t..(gi + 1) * t, gi]).fill(1.0);
        }
        if seasonal > 0 {
            let period = f64::from(input.seasonality);
            for row in 0..n {
                #[expect(clippy::cast_precision_loss, reason = "time index is small")]
                let phase = TAU * (row % t) as f64 / period;
                for h in 0..HARMONICS {
                    #[expect(clippy::cast_precision_loss, reason = "harmonic index")]
                    let m = (h + 1) as f64;
                    base[(row, g + 2 * h)] = (m * phase).sin();
                    base[(row, g + 2 * h + 1)] = (m * phase).cos();
                }
            }
        }
        if let Some(controls) = controls {
            base.slice_mut(s![.., g + seasonal..]).assign(&controls);
        }

        let scale = (0..input.n_channels())
            .map(|c| {
                let values = input.media.slice(s![.., .., c]);
                let positive: Vec<f64> =
                    values.iter().copied().filter(|v| *v > 0.0).collect();
                if positive.is_empty() {
                    1.0
                } else {
                    #[expect(clippy::cast_precision_loss, reason = "row counts are small")]
                    let len = positive.len() as f64;
                    positive.iter().sum::<f64>() / len
                }
            })
            .collect();

        Ok(Self {
            input,
            y,
            base,
            scale,
        })
    }

    fn run(&self, sampler: &SamplerSettings) -> Result<ModelOutput, BackendError> {
        let channels = self.input.n_channels();
        let mut params = vec![ChannelParams::default(); channels];
        let mut features: Vec<Array1<f64>> = (0..channels)
            .map(|c| self.feature(c, params[c]))
            .collect();

        for sweep in 0..SWEEPS {
            for c in 0..channels {
                let mut best = (f64::INFINITY, params[c], features[c].clone());
                for (&decay, &peak) in iproduct!(&DECAY_GRID, &PEAK_GRID) {
                    let carried = self.carried(c, decay, peak);
                    for (&ec, &slope) in iproduct!(&EC_GRID, &SLOPE_GRID) {
                        let candidate = saturate(&carried, ec, slope);
                        features[c] = candidate;
                        let design = self.design(&features);
                        let Some(beta) = self.solve(&design, self.y.view()) else {
                            continue;
                        };
                        let residual = sse(&design, &beta, self.y.view());
                        if residual < best.0 {
                            let chosen = ChannelParams {
                                decay,
                                peak,
                                ec,
                                slope,
                            };
                            best = (residual, chosen, features[c].clone());
                        }
                    }
                }
                params[c] = best.1;
                features[c] = best.2;
            }
            debug!(sweep, "native.sweep");
        }

        let design = self.design(&features);
        let beta = self
            .solve(&design, self.y.view())
            .ok_or_else(|| BackendError::numerical("normal equations are singular"))?;
        let fitted = design.dot(&beta);
        let residuals = &self.y - &fitted;

        let r2 = r_squared(self.y.view(), fitted.view());
        let error = mape(self.y.view(), fitted.view());
        info!(r_squared = r2, mape = error, "native.fitted");

        let (roi, incremental) =
            self.bootstrap(&design, &beta, &fitted, &residuals, sampler);

        let shape = vec![sampler.chains as usize, sampler.keep as usize, channels];
        let to_tensor = |data: Vec<f64>| {
            Tensor::new(shape.clone(), data).ok_or_else(|| {
                BackendError::numerical("bootstrap produced a ragged draw set")
            })
        };

        #[expect(clippy::cast_precision_loss, reason = "peaks are at most 3")]
        let peaks: Vec<f64> = params.iter().map(|p| p.peak as f64).collect();

        Ok(ModelOutput {
            roi: Some(to_tensor(roi)?),
            incremental_outcome: Some(to_tensor(incremental)?),
            adstock_decay: Some(Tensor::vector(params.iter().map(|p| p.decay).collect())),
            adstock_peak: Some(Tensor::vector(peaks)),
            saturation_ec: Some(Tensor::vector(params.iter().map(|p| p.ec).collect())),
            saturation_slope: Some(Tensor::vector(
                params.iter().map(|p| p.slope).collect(),
            )),
            r_squared: Some(r2),
            mape: Some(error),
            ..ModelOutput::default()
        })
    }

    /// Residual bootstrap. Returns row-major `(chain, draw, channel)` ROI
    /// and incremental-outcome draws.
    fn bootstrap(
        &self,
        design: &Array2<f64>,
        beta: &Array1<f64>,
        fitted: &Array1<f64>,
        residuals: &Array1<f64>,
        sampler: &SamplerSettings,
    ) -> (Vec<f64>, Vec<f64>) {
        let channels = self.input.n_channels();
        let media_offset = self.base.ncols();
        let feature_totals: Vec<f64> = (0..channels)
            .map(|c| design.column(media_offset + c).sum())
            .collect();
        let spend = self.input.spend_per_channel();
        let discard = sampler.adapt + sampler.burnin;
        let n = self.y.len();

        let mut roi = Vec::with_capacity((sampler.chains * sampler.keep) as usize * channels);
        let mut incremental = Vec::with_capacity(roi.capacity());

        for chain in 0..sampler.chains {
            let mut rng = StdRng::seed_from_u64(sampler.seed.wrapping_add(u64::from(chain)));
            for draw in 0..discard + sampler.keep {
                let resampled: Array1<f64> = Array1::from_shape_fn(n, |i| {
                    fitted[i] + residuals[rng.gen_range(0..n)]
                });
                if draw < discard {
                    continue;
                }
                let draw_beta = self
                    .solve(design, resampled.view())
                    .unwrap_or_else(|| beta.clone());
                for c in 0..channels {
                    let outcome = draw_beta[media_offset + c] * feature_totals[c];
                    incremental.push(outcome);
                    roi.push(if spend[c] > 0.0 { outcome / spend[c] } else { 0.0 });
                }
            }
        }
        (roi, incremental)
    }

    /// Adstocked, unit-mean exposure of channel `c`, flattened geo-major.
    fn carried(&self, c: usize, decay: f64, peak: usize) -> Array1<f64> {
        let t = self.input.n_times();
        let mut out = Array1::zeros(self.y.len());
        for (gi, series) in self
            .input
            .media
            .slice(s![.., .., c])
            .axis_iter(Axis(0))
            .enumerate()
        {
            let scaled = series.mapv(|v| v / self.scale[c]);
            out.slice_mut(s![gi * t..(gi + 1) * t])
                .assign(&adstock(scaled.view(), decay, peak, MAX_LAG));
        }
        out
    }

    fn feature(&self, c: usize, params: ChannelParams) -> Array1<f64> {
        saturate(&self.carried(c, params.decay, params.peak), params.ec, params.slope)
    }

    fn design(&self, features: &[Array1<f64>]) -> Array2<f64> {
        let (n, b) = self.base.dim();
        let mut design = Array2::zeros((n, b + features.len()));
        design.slice_mut(s![.., ..b]).assign(&self.base);
        for (c, feature) in features.iter().enumerate() {
            design.column_mut(b + c).assign(feature);
        }
        design
    }

    fn solve(&self, design: &Array2<f64>, y: ArrayView1<f64>) -> Option<Array1<f64>> {
        let media_offset = self.base.ncols();
        let non_negative: Vec<bool> =
            (0..design.ncols()).map(|j| j >= media_offset).collect();
        non_negative_least_squares(design.view(), y, &non_negative)
    }
}

fn saturate(carried: &Array1<f64>, ec: f64, slope: f64) -> Array1<f64> {
    hill(carried.view(), ec, slope)
}

fn sse(design: &Array2<f64>, beta: &Array1<f64>, y: ArrayView1<f64>) -> f64 {
    let fitted = design.dot(beta);
    y.iter().zip(&fitted).map(|(a, b)| (a - b).powi(2)).sum()
}

/// Controls flattened geo-major and standardized per column. Constant
/// columns are dropped.
fn standardized_controls(input: &ModelInputArrays) -> Option<Array2<f64>> {
    let data = input.controls_data.as_ref()?;
    let (g, t, k) = data.dim();
    let flat = data
        .to_shape((g * t, k))
        .ok()?
        .to_owned();

    let columns: Vec<Array1<f64>> = flat
        .axis_iter(Axis(1))
        .filter_map(|column| {
            let mean = column.mean()?;
            let std = column.std(0.0);
            (std > 0.0).then(|| column.mapv(|v| (v - mean) / std))
        })
        .collect();
    if columns.is_empty() {
        return None;
    }

    let mut out = Array2::zeros((g * t, columns.len()));
    for (j, column) in columns.iter().enumerate() {
        out.column_mut(j).assign(column);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use mmm_schemas::MediaSource;
    use ndarray::{Array3, array};

    use super::*;

    /// Two channels; sales respond to tv only.
    fn synthetic(weeks: usize) -> ModelInputArrays {
        let tv: Vec<f64> = (0..weeks).map(|w| 50.0 + 40.0 * ((w % 5) as f64)).collect();
        let radio: Vec<f64> = (0..weeks).map(|w| 30.0 + 10.0 * ((w % 3) as f64)).collect();
        let carried = adstock(
            Array1::from(tv.iter().map(|v| v / 130.0).collect::<Vec<_>>()).view(),
            0.5,
            0,
            MAX_LAG,
        );
        let sales: Vec<f64> = carried
            .iter()
            .map(|x| 1_000.0 + 400.0 * x / (1.0 + x))
            .collect();

        let media = Array3::from_shape_fn((1, weeks, 2), |(_, w, c)| {
            if c == 0 { tv[w] } else { radio[w] }
        });
        ModelInputArrays {
            geos: vec!["national".into()],
            times: (0..weeks)
                .map(|w| format!("2024-{:02}-{:02}", 1 + w / 28, 1 + w % 28))
                .collect(),
            channels: vec!["tv_spend".into(), "radio_spend".into()],
            controls: Vec::new(),
            kpi: Array2::from_shape_vec((1, weeks), sales).unwrap(),
            media: media.clone(),
            media_spend: media,
            controls_data: None,
            population: array![1_000_000.0],
            media_source: MediaSource::Spend,
            seasonality: 52,
        }
    }

    #[test]
    fn test_fit_recovers_signal() {
        let input = synthetic(40);
        let sampler = SamplerSettings {
            chains: 2,
            adapt: 3,
            burnin: 2,
            keep: 10,
            seed: 7,
        };
        let output = NativeBackend.fit(&input, &sampler).unwrap();

        assert!(output.r_squared.unwrap() > 0.9);
        let roi = output.roi.unwrap();
        assert_eq!(roi.shape(), &[2, 10, 2]);
        assert!(roi.data().iter().all(|v| *v >= 0.0));

        let incremental = output.incremental_outcome.unwrap();
        let mean = |c: usize| {
            let values: Vec<f64> = incremental.data().iter().skip(c).step_by(2).copied().collect();
            values.iter().sum::<f64>() / values.len() as f64
        };
        assert!(mean(0) > mean(1), "tv should carry the effect");
    }

    #[test]
    fn test_same_seed_same_draws() {
        let input = synthetic(20);
        let sampler = SamplerSettings {
            chains: 1,
            adapt: 1,
            burnin: 1,
            keep: 5,
            seed: 11,
        };
        let a = NativeBackend.fit(&input, &sampler).unwrap();
        let b = NativeBackend.fit(&input, &sampler).unwrap();
        assert_eq!(a.roi, b.roi);
    }

    #[test]
    fn test_single_observation_rejected() {
        let mut input = synthetic(20);
        input.times.truncate(1);
        input.kpi = array![[1.0]];
        input.media = Array3::zeros((1, 1, 2));
        input.media_spend = Array3::zeros((1, 1, 2));
        let err = NativeBackend
            .fit(&input, &SamplerSettings::default())
            .unwrap_err();
        assert!(err.is_numerical());
    }
}
