//! Geo × time × channel model input arrays.

use mmm_schemas::{MediaSource, ModelInputPayload};
use ndarray::{Array1, Array2, Array3, Axis};

use crate::error::AdapterError;

/// Label of the single geography used when the table has no geo column.
pub const NATIONAL_GEO: &str = "national";

/// Adapted model input.
///
/// Every time-indexed array shares the axis in `times`, and every
/// channel-indexed array shares the order in `channels`. [`validate`]
/// re-checks both.
///
/// [`validate`]: ModelInputArrays::validate
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputArrays {
    pub geos: Vec<String>,
    /// Strictly ascending `YYYY-MM-DD` keys.
    pub times: Vec<String>,
    pub channels: Vec<String>,
    pub controls: Vec<String>,
    /// `(geo, time)`
    pub kpi: Array2<f64>,
    /// `(geo, time, channel)`, exposure values.
    pub media: Array3<f64>,
    /// `(geo, time, channel)`, spend values.
    pub media_spend: Array3<f64>,
    /// `(geo, time, control)`, absent when there are no controls.
    pub controls_data: Option<Array3<f64>>,
    /// `(geo)`
    pub population: Array1<f64>,
    pub media_source: MediaSource,
    pub seasonality: u32,
}

impl ModelInputArrays {
    pub fn n_geos(&self) -> usize {
        self.geos.len()
    }

    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Total spend per channel over all geos and times.
    pub fn spend_per_channel(&self) -> Array1<f64> {
        self.media_spend.sum_axis(Axis(0)).sum_axis(Axis(0))
    }

    /// KPI summed over geographies, one value per time step.
    pub fn national_kpi(&self) -> Array1<f64> {
        self.kpi.sum_axis(Axis(0))
    }

    /// Checks every dimensional invariant.
    pub fn validate(&self) -> Result<(), AdapterError> {
        let (g, t, c) = (self.n_geos(), self.n_times(), self.n_channels());

        if g == 0 || t == 0 || c == 0 {
            return Err(AdapterError::shape(format!(
                "empty axis: {g} geos, {t} times, {c} channels"
            )));
        }
        if !self.times.windows(2).all(|w| w[0] < w[1]) {
            return Err(AdapterError::shape(
                "time axis is not strictly ascending",
            ));
        }
        expect_shape("kpi", self.kpi.shape(), &[g, t])?;
        expect_shape("media", self.media.shape(), &[g, t, c])?;
        expect_shape("media_spend", self.media_spend.shape(), &[g, t, c])?;
        match &self.controls_data {
            Some(controls) => expect_shape(
                "controls",
                controls.shape(),
                &[g, t, self.controls.len()],
            )?,
            None if !self.controls.is_empty() => {
                return Err(AdapterError::shape(format!(
                    "{} controls named but no control data",
                    self.controls.len()
                )));
            }
            None => {}
        }
        expect_shape("population", self.population.shape(), &[g])?;

        let all_finite = self.kpi.iter().all(|v| v.is_finite())
            && self.media.iter().all(|v| v.is_finite())
            && self.media_spend.iter().all(|v| v.is_finite())
            && self.population.iter().all(|v| v.is_finite());
        if !all_finite {
            return Err(AdapterError::shape("non-finite value in model input"));
        }
        Ok(())
    }

    /// Converts to the nested-list wire form.
    pub fn to_payload(&self) -> ModelInputPayload {
        ModelInputPayload {
            geos: self.geos.clone(),
            times: self.times.clone(),
            channels: self.channels.clone(),
            controls: self.controls.clone(),
            kpi: self.kpi.outer_iter().map(|row| row.to_vec()).collect(),
            media: nest3(&self.media),
            media_spend: nest3(&self.media_spend),
            controls_data: self.controls_data.as_ref().map(nest3),
            population: self.population.to_vec(),
            media_source: self.media_source,
            seasonality: self.seasonality,
        }
    }
}

fn expect_shape(
    name: &str,
    actual: &[usize],
    expected: &[usize],
) -> Result<(), AdapterError> {
    if actual == expected {
        Ok(())
    } else {
        Err(AdapterError::shape(format!(
            "{name} has shape {actual:?}, expected {expected:?}"
        )))
    }
}

fn nest3(array: &Array3<f64>) -> Vec<Vec<Vec<f64>>> {
    array
        .outer_iter()
        .map(|geo| geo.outer_iter().map(|time| time.to_vec()).collect())
        .collect()
}
