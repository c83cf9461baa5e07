//! Reduction of posterior tensors to one value per channel.
//!
//! The last axis of every tensor is the channel axis; all leading axes are
//! sampling axes and are averaged away together. Averaging chains first and
//! then draws gives the same arithmetic mean, so the leading axes are simply
//! flattened into one sample axis.

use itertools::Itertools;
use mmm_schemas::Tensor;
use ndarray::{ArrayView2, Axis};

use crate::error::NormalizeError;

/// Views a tensor of rank 1 to 3 as `(samples, channels)`.
fn samples<'a>(
    quantity: &str,
    tensor: &'a Tensor,
    channels: usize,
) -> Result<ArrayView2<'a, f64>, NormalizeError> {
    if tensor.rank() > 3 {
        return Err(NormalizeError::shape(
            quantity,
            format!("rank {} exceeds (chain, draw, channel)", tensor.rank()),
        ));
    }
    let width = tensor.shape().last().copied().unwrap_or(channels);
    if width != channels {
        return Err(NormalizeError::shape(
            quantity,
            format!("last axis is {width}, expected {channels} channels"),
        ));
    }
    let count: usize = tensor.shape().iter().rev().skip(1).product();
    if count == 0 {
        return Err(NormalizeError::shape(quantity, "no samples"));
    }
    ArrayView2::from_shape((count, channels), tensor.data())
        .map_err(|err| NormalizeError::shape(quantity, err.to_string()))
}

/// Averages a tensor over every axis except the channel axis.
pub fn reduce_to_channels(
    quantity: &str,
    tensor: &Tensor,
    channels: usize,
) -> Result<Vec<f64>, NormalizeError> {
    if tensor.rank() == 0 {
        // One value shared by every channel.
        return Ok(vec![tensor.data()[0]; channels]);
    }
    let view = samples(quantity, tensor, channels)?;
    view.mean_axis(Axis(0))
        .map(|mean| mean.to_vec())
        .ok_or_else(|| NormalizeError::shape(quantity, "no samples"))
}

/// Per-channel `(lower, upper)` quantiles across all samples.
///
/// Returns `None` when the tensor holds fewer than two samples per channel,
/// since a point estimate has no spread to summarize.
pub fn sample_interval(
    quantity: &str,
    tensor: &Tensor,
    channels: usize,
    lower: f64,
    upper: f64,
) -> Result<Option<(Vec<f64>, Vec<f64>)>, NormalizeError> {
    if tensor.rank() < 2 {
        return Ok(None);
    }
    let view = samples(quantity, tensor, channels)?;
    if view.nrows() < 2 {
        return Ok(None);
    }
    let (lo, hi) = view
        .axis_iter(Axis(1))
        .map(|column| {
            let sorted = column.iter().copied().sorted_by(f64::total_cmp).collect_vec();
            (quantile(&sorted, lower), quantile(&sorted, upper))
        })
        .unzip();
    Ok(Some((lo, hi)))
}

/// Linearly interpolated quantile of sorted, non-empty values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let last = sorted.len() - 1;
    #[expect(
        clippy::cast_precision_loss,
        reason = "sample counts are far below 2^52"
    )]
    let position = q.clamp(0.0, 1.0) * last as f64;
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "position is within 0..=last"
    )]
    let below = position.floor() as usize;
    let above = (below + 1).min(last);
    #[expect(
        clippy::cast_precision_loss,
        reason = "sample counts are far below 2^52"
    )]
    let weight = position - below as f64;
    sorted[below] + (sorted[above] - sorted[below]) * weight
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_scalar_broadcasts() {
        let reduced = reduce_to_channels("r", &Tensor::scalar(0.4), 3).unwrap();
        assert_eq!(reduced, vec![0.4, 0.4, 0.4]);
    }

    #[test]
    fn test_rank3_averages_chains_and_draws() {
        // 2 chains x 2 draws x 2 channels.
        let tensor = Tensor::new(
            vec![2, 2, 2],
            vec![1.0, 10.0, 3.0, 30.0, 5.0, 50.0, 7.0, 70.0],
        )
        .unwrap();
        let reduced = reduce_to_channels("roi", &tensor, 2).unwrap();
        assert_eq!(reduced, vec![4.0, 40.0]);
    }

    #[test]
    fn test_channel_mismatch_is_shape_error() {
        let tensor = Tensor::vector(vec![1.0, 2.0, 3.0]);
        let err = reduce_to_channels("roi", &tensor, 2).unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_rank4_rejected() {
        let tensor = Tensor::new(vec![1, 1, 1, 2], vec![1.0, 2.0]).unwrap();
        assert!(reduce_to_channels("roi", &tensor, 2).unwrap_err().is_shape());
    }

    #[test]
    fn test_interval_needs_two_samples() {
        let point = Tensor::vector(vec![1.0, 2.0]);
        assert!(sample_interval("roi", &point, 2, 0.05, 0.95).unwrap().is_none());

        let single = Tensor::new(vec![1, 1, 2], vec![1.0, 2.0]).unwrap();
        assert!(sample_interval("roi", &single, 2, 0.05, 0.95).unwrap().is_none());
    }

    #[test]
    fn test_interval_quantiles() {
        // 11 draws of one channel: 0, 1, ..., 10.
        let draws: Vec<f64> = (0..=10).map(f64::from).collect();
        let tensor = Tensor::new(vec![11, 1], draws).unwrap();
        let (lo, hi) = sample_interval("roi", &tensor, 1, 0.05, 0.95)
            .unwrap()
            .unwrap();
        assert!((lo[0] - 0.5).abs() < 1e-12);
        assert!((hi[0] - 9.5).abs() < 1e-12);
    }

    proptest! {
        /// Reduction is a no-op when there is nothing to average.
        #[test]
        fn test_singleton_axes_are_noop(
            values in prop::collection::vec(-1e6f64..1e6, 1..8),
        ) {
            let channels = values.len();
            let flat = Tensor::vector(values.clone());
            let nested = flat.reshape(vec![1, 1, channels]).unwrap();

            let a = reduce_to_channels("roi", &flat, channels).unwrap();
            let b = reduce_to_channels("roi", &nested, channels).unwrap();
            prop_assert_eq!(&a, &values);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn test_mean_within_sample_range(
            draws in prop::collection::vec(0.0f64..100.0, 2..40),
        ) {
            let count = draws.len();
            let tensor = Tensor::new(vec![count, 1], draws.clone()).unwrap();
            let mean = reduce_to_channels("roi", &tensor, 1).unwrap()[0];
            let (min, max) = draws
                .iter()
                .fold((f64::MAX, f64::MIN), |(lo, hi), &d| (lo.min(d), hi.max(d)));
            prop_assert!(mean >= min - 1e-9 && mean <= max + 1e-9);

            let (lo, hi) = sample_interval("roi", &tensor, 1, 0.05, 0.95)
                .unwrap()
                .unwrap();
            prop_assert!(lo[0] <= hi[0]);
            prop_assert!(lo[0] >= min && hi[0] <= max);
        }
    }
}
