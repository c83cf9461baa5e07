//! Budget reallocation heuristic.
//!
//! This is a rank-based rule of thumb, not an optimizer. It moves budget
//! toward channels with higher estimated ROI but makes no optimality claim,
//! and with unreliable ROI estimates it can report a negative lift.
//!
//! Channels are ranked by ROI, descending, with ties kept in configured
//! order. The top channel's allocation is boosted by [`TOP_CHANNEL_BOOST`];
//! the channel at rank `i` of `n` in the middle keeps `(n - i) / n` of its
//! current allocation; the lowest-ROI channel receives whatever budget is
//! left (never negative). The result is rescaled to the original total.

use indexmap::IndexMap;
use itertools::Itertools;
use mmm_schemas::OptimizationSummary;
use tracing::debug;

/// Multiplier applied to the highest-ROI channel's allocation.
pub const TOP_CHANNEL_BOOST: f64 = 1.3;

/// Reallocates `current` budget across `channels` using `roi`.
///
/// The three slices are parallel, in configured channel order. The
/// returned `optimal_allocation` sums to `current_budget`; a budget that
/// is not positive is returned unchanged.
pub fn reallocate(
    channels: &[String],
    current: &[f64],
    roi: &[f64],
) -> OptimizationSummary {
    let n = channels.len();
    let total: f64 = current.iter().sum();

    // Stable sort keeps configured order among equal ROIs.
    let ranked = (0..n)
        .sorted_by(|&a, &b| roi[b].total_cmp(&roi[a]))
        .collect_vec();

    let mut proposed = vec![0.0; n];
    for (rank, &c) in ranked.iter().enumerate() {
        proposed[c] = if rank == 0 {
            current[c] * TOP_CHANNEL_BOOST
        } else if rank + 1 < n {
            #[expect(
                clippy::cast_precision_loss,
                reason = "channel counts are tiny"
            )]
            let weight = (n - rank) as f64 / n as f64;
            current[c] * weight
        } else {
            0.0
        };
    }
    if n >= 2 {
        let last = ranked[n - 1];
        let assigned: f64 = proposed.iter().sum();
        proposed[last] = (total - assigned).max(0.0);
    }

    // Without a positive budget there is nothing to move.
    let optimal = if total > 0.0 {
        rescale(&proposed, total, &ranked)
    } else {
        current.to_vec()
    };

    let lift_absolute: f64 =
        (0..n).map(|c| (optimal[c] - current[c]) * roi[c]).sum();
    let expected_lift = if total > 0.0 {
        lift_absolute / total * 100.0
    } else {
        0.0
    };
    debug!(channels = n, total, expected_lift, "budget.reallocated");

    let by_channel = |values: &[f64]| -> IndexMap<String, f64> {
        channels.iter().cloned().zip(values.iter().copied()).collect()
    };
    let changes = (0..n)
        .map(|c| {
            if current[c] > 0.0 {
                (optimal[c] - current[c]) / current[c] * 100.0
            } else {
                0.0
            }
        })
        .collect_vec();

    OptimizationSummary {
        current_budget: total,
        current_allocation: by_channel(current),
        optimal_allocation: by_channel(&optimal),
        changes: by_channel(&changes),
        expected_lift,
        expected_lift_absolute: lift_absolute,
    }
}

/// Scales `proposed` to sum to `total`.
///
/// Floating-point drift left after scaling is absorbed by the largest
/// allocation so the sum matches as closely as `f64` allows.
fn rescale(proposed: &[f64], total: f64, ranked: &[usize]) -> Vec<f64> {
    let sum: f64 = proposed.iter().sum();
    if sum <= 0.0 {
        return vec![0.0; proposed.len()];
    }
    let factor = total / sum;
    let mut scaled: Vec<f64> = proposed.iter().map(|p| p * factor).collect();

    let largest = ranked
        .iter()
        .copied()
        .max_by(|&a, &b| scaled[a].total_cmp(&scaled[b]));
    if let Some(largest) = largest {
        let rest: f64 = (0..scaled.len())
            .filter(|&c| c != largest)
            .map(|c| scaled[c])
            .sum();
        scaled[largest] = (total - rest).max(0.0);
    }
    scaled
}
