//! Result normalization for marketing-mix training.
//!
//! Backends report posteriors in whatever shape they naturally produce. This
//! crate reduces them to the fixed per-channel result document, whichever
//! representation a backend chose, and fills gaps with neutral defaults that
//! are always recorded in `provenance.fallbacks`.
//!
//! Precedence per quantity (first available wins):
//!
//! | quantity      | sources                                                          |
//! |---------------|------------------------------------------------------------------|
//! | contribution  | `contribution`, `incremental_outcome`, `roi x spend` (flagged)   |
//! | roi           | `roi`, `incremental_outcome / spend`, 1.0 (flagged)              |
//! | roi bounds    | `roi_lower`/`roi_upper`, 5%/95% sample quantiles, roi +/- 20%   |
//! | curves        | posterior tensor, else a flagged default                         |
//!
//! The +/- 20% bounds are labelled [`IntervalSource::Approximate`]; they are
//! a placeholder, not a credible interval.

mod budget;
mod error;
mod reduce;

use indexmap::IndexMap;
use mmm_schemas::{
    Adstock, ChannelAnalysis, ColumnProvenance, FallbackNote, FitMetrics,
    IntervalSource, ModelOutput, Provenance, Quantity, ResponseCurve,
    Saturation, Tensor, TrainingReport,
};
use tracing::{debug_span, info, warn};

#[doc(inline)]
pub use crate::budget::{TOP_CHANNEL_BOOST, reallocate};
#[doc(inline)]
pub use crate::error::NormalizeError;
#[doc(inline)]
pub use crate::reduce::{reduce_to_channels, sample_interval};

/// Relative half-width of the approximate ROI interval.
pub const APPROXIMATE_ROI_SPREAD: f64 = 0.2;

/// Quantiles used for sample-based ROI intervals.
pub const INTERVAL_QUANTILES: (f64, f64) = (0.05, 0.95);

/// Neutral defaults for quantities a backend did not report.
pub mod defaults {
    pub const ROI: f64 = 1.0;
    pub const SATURATION_EC: f64 = 1.0;
    pub const SATURATION_SLOPE: f64 = 3.0;
    pub const ADSTOCK_DECAY: f64 = 0.5;
    pub const ADSTOCK_PEAK: f64 = 0.0;
    pub const R_SQUARED: f64 = 0.0;
    pub const MAPE: f64 = 0.0;
}

/// Everything besides the posterior that the report needs.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    /// `model_type` of the backend that produced the output.
    pub model_type: &'a str,
    /// Version-tagged backend id.
    pub backend: &'a str,
    /// Channel names in configured order.
    pub channels: &'a [String],
    /// Total raw spend per channel, read from the input table.
    pub spend: &'a IndexMap<String, f64>,
    /// How each logical field was bound to input columns.
    pub columns: &'a IndexMap<String, ColumnProvenance>,
}

/// Reduces backend output to the result document.
///
/// `training_info` and `data_quality` are left for the caller to attach.
pub fn normalize(
    output: &ModelOutput,
    ctx: &NormalizeContext<'_>,
) -> Result<TrainingReport, NormalizeError> {
    let _span = debug_span!("normalize").entered();
    let mut n = Normalizer {
        ctx,
        fallbacks: Vec::new(),
    };
    let channels = ctx.channels;
    let spend: Vec<f64> = channels
        .iter()
        .map(|c| ctx.spend.get(c).copied().unwrap_or(0.0))
        .collect();

    let roi = n.roi(output, &spend)?;
    let contribution = n.contribution(output, &roi, &spend)?;
    let (roi_lower, roi_upper, interval) = n.roi_bounds(output, &roi)?;

    let ec = n.curve(
        output.saturation_ec.as_ref(),
        Quantity::SaturationEc,
        defaults::SATURATION_EC,
    )?;
    let slope = n.curve(
        output.saturation_slope.as_ref(),
        Quantity::SaturationSlope,
        defaults::SATURATION_SLOPE,
    )?;
    let decay = n.curve(
        output.adstock_decay.as_ref(),
        Quantity::AdstockDecay,
        defaults::ADSTOCK_DECAY,
    )?;
    let peak = n.curve(
        output.adstock_peak.as_ref(),
        Quantity::AdstockPeak,
        defaults::ADSTOCK_PEAK,
    )?;

    let metrics = FitMetrics {
        r_squared: n.metric(
            output.r_squared,
            Quantity::RSquared,
            defaults::R_SQUARED,
        )?,
        mape: n.metric(output.mape, Quantity::Mape, defaults::MAPE)?,
    };

    let contribution_total: f64 = contribution.iter().sum();
    let spend_total: f64 = spend.iter().sum();

    let mut channel_analysis = IndexMap::with_capacity(channels.len());
    let mut response_curves = IndexMap::with_capacity(channels.len());
    for (c, name) in channels.iter().enumerate() {
        channel_analysis.insert(
            name.clone(),
            ChannelAnalysis {
                contribution: contribution[c],
                contribution_percentage: share(
                    contribution[c],
                    contribution_total,
                ),
                roi: roi[c],
                roi_lower: roi_lower[c],
                roi_upper: roi_upper[c],
                roi_interval: interval,
                spend_percentage: Some(share(spend[c], spend_total)),
                total_spend: Some(spend[c]),
            },
        );
        response_curves.insert(
            name.clone(),
            ResponseCurve {
                saturation: Saturation {
                    ec: ec[c],
                    slope: slope[c],
                },
                adstock: Adstock {
                    decay: decay[c],
                    peak: lag(peak[c]),
                },
            },
        );
    }

    let optimization = reallocate(channels, &spend, &roi);

    if !n.fallbacks.is_empty() {
        warn!(count = n.fallbacks.len(), "normalize.fallbacks");
    }
    info!(
        channels = channels.len(),
        interval = ?interval,
        "normalize.complete"
    );

    Ok(TrainingReport {
        model_type: ctx.model_type.to_string(),
        success: true,
        metrics,
        channel_analysis,
        response_curves,
        optimization,
        provenance: Provenance {
            backend: ctx.backend.to_string(),
            fallbacks: n.fallbacks,
            columns: ctx.columns.clone(),
            mock_fallback_reason: None,
        },
        training_info: None,
        data_quality: None,
    })
}

/// `part / total`, or 0 when the total is not positive.
fn share(part: f64, total: f64) -> f64 {
    if total > 0.0 { part / total } else { 0.0 }
}

/// Rounds a reduced peak lag to whole time steps.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "clamped to the u32 range first"
)]
fn lag(value: f64) -> u32 {
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

struct Normalizer<'a, 'c> {
    ctx: &'a NormalizeContext<'c>,
    fallbacks: Vec<FallbackNote>,
}

impl Normalizer<'_, '_> {
    fn channels(&self) -> usize {
        self.ctx.channels.len()
    }

    /// Reduces a tensor and rejects NaN or infinite results.
    fn reduce(
        &self,
        name: &str,
        tensor: &Tensor,
    ) -> Result<Vec<f64>, NormalizeError> {
        let values = reduce_to_channels(name, tensor, self.channels())?;
        self.check_finite(name, &values)?;
        Ok(values)
    }

    fn check_finite(
        &self,
        name: &str,
        values: &[f64],
    ) -> Result<(), NormalizeError> {
        match values.iter().position(|v| !v.is_finite()) {
            Some(c) => {
                Err(NormalizeError::non_finite(name, &self.ctx.channels[c]))
            }
            None => Ok(()),
        }
    }

    fn flag(&mut self, quantity: Quantity, channel: Option<&str>, value: f64) {
        self.fallbacks.push(FallbackNote {
            quantity,
            channel: channel.map(str::to_string),
            value,
        });
    }

    fn roi(
        &mut self,
        output: &ModelOutput,
        spend: &[f64],
    ) -> Result<Vec<f64>, NormalizeError> {
        if let Some(roi) = &output.roi {
            return self.reduce("roi", roi);
        }
        if let Some(incremental) = &output.incremental_outcome {
            let incremental = self.reduce("incremental_outcome", incremental)?;
            return Ok(incremental
                .iter()
                .zip(spend)
                .map(|(i, s)| if *s > 0.0 { i / s } else { 0.0 })
                .collect());
        }
        self.flag(Quantity::Roi, None, defaults::ROI);
        Ok(vec![defaults::ROI; self.channels()])
    }

    fn contribution(
        &mut self,
        output: &ModelOutput,
        roi: &[f64],
        spend: &[f64],
    ) -> Result<Vec<f64>, NormalizeError> {
        if let Some(contribution) = &output.contribution {
            return self.reduce("contribution", contribution);
        }
        if let Some(incremental) = &output.incremental_outcome {
            return self.reduce("incremental_outcome", incremental);
        }
        let derived: Vec<f64> =
            roi.iter().zip(spend).map(|(r, s)| r * s).collect();
        for (name, value) in self.ctx.channels.iter().zip(&derived) {
            self.flag(Quantity::Contribution, Some(name), *value);
        }
        Ok(derived)
    }

    fn roi_bounds(
        &mut self,
        output: &ModelOutput,
        roi: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>, IntervalSource), NormalizeError> {
        if let (Some(lower), Some(upper)) =
            (&output.roi_lower, &output.roi_upper)
        {
            let lower = self.reduce("roi_lower", lower)?;
            let upper = self.reduce("roi_upper", upper)?;
            return Ok((lower, upper, IntervalSource::Credible));
        }
        if let Some(samples) = &output.roi {
            let (lo, hi) = INTERVAL_QUANTILES;
            let interval =
                sample_interval("roi", samples, self.channels(), lo, hi)?;
            if let Some((lower, upper)) = interval {
                self.check_finite("roi", &lower)?;
                self.check_finite("roi", &upper)?;
                return Ok((lower, upper, IntervalSource::Credible));
            }
        }
        let lower =
            roi.iter().map(|r| r * (1.0 - APPROXIMATE_ROI_SPREAD)).collect();
        let upper =
            roi.iter().map(|r| r * (1.0 + APPROXIMATE_ROI_SPREAD)).collect();
        Ok((lower, upper, IntervalSource::Approximate))
    }

    fn curve(
        &mut self,
        tensor: Option<&Tensor>,
        quantity: Quantity,
        default: f64,
    ) -> Result<Vec<f64>, NormalizeError> {
        match tensor {
            Some(tensor) => self.reduce(quantity_name(quantity), tensor),
            None => {
                self.flag(quantity, None, default);
                Ok(vec![default; self.channels()])
            }
        }
    }

    fn metric(
        &mut self,
        value: Option<f64>,
        quantity: Quantity,
        default: f64,
    ) -> Result<f64, NormalizeError> {
        match value {
            Some(v) if v.is_finite() => Ok(v),
            Some(_) => {
                Err(NormalizeError::non_finite(quantity_name(quantity), "all"))
            }
            None => {
                self.flag(quantity, None, default);
                Ok(default)
            }
        }
    }
}

fn quantity_name(quantity: Quantity) -> &'static str {
    match quantity {
        Quantity::Roi => "roi",
        Quantity::Contribution => "contribution",
        Quantity::SaturationEc => "saturation_ec",
        Quantity::SaturationSlope => "saturation_slope",
        Quantity::AdstockDecay => "adstock_decay",
        Quantity::AdstockPeak => "adstock_peak",
        Quantity::RSquared => "r_squared",
        Quantity::Mape => "mape",
    }
}
