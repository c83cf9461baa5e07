//! Mock backend (`mock-v1`): fabricated, plausible output for UI work.
//!
//! Values are drawn from fixed ranges and are unrelated to the data beyond
//! its spend and KPI totals. The model type is always tagged `_mock` so the
//! output cannot pass for a real fit.

use mmm_adapter::ModelInputArrays;
use mmm_schemas::{ModelOutput, SamplerSettings, Tensor};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Dirichlet;
use tracing::{info, warn};

use crate::error::BackendError;
use crate::{BackendDescriptor, ModelBackend};

/// Symmetric concentration of the contribution-share Dirichlet.
const SHARE_CONCENTRATION: f64 = 2.0;

/// Generates mock model output from a seed.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    /// Prefix for the `_mock` model type, e.g. `meridian` when standing in
    /// for the subprocess backend.
    label: Option<String>,
}

impl MockBackend {
    /// A mock standing in for another backend's model type.
    pub fn standing_in_for(model_type: &str) -> Self {
        Self {
            label: Some(model_type.to_string()),
        }
    }

    /// Model type written to the result document.
    pub fn model_type(&self) -> String {
        match &self.label {
            Some(label) => format!("{label}_mock"),
            None => "meridian_mock".to_string(),
        }
    }
}

impl ModelBackend for MockBackend {
    fn descriptor(&self) -> BackendDescriptor {
        BackendDescriptor {
            id: "mock-v1",
            model_type: self.model_type(),
            api_version: None,
        }
    }

    fn fit(
        &self,
        input: &ModelInputArrays,
        sampler: &SamplerSettings,
    ) -> Result<ModelOutput, BackendError> {
        warn!(model_type = %self.model_type(), "mock.generating");
        let channels = input.n_channels();
        let mut rng = StdRng::seed_from_u64(sampler.seed);

        let roi: Vec<f64> = (0..channels).map(|_| rng.gen_range(0.5..=3.5)).collect();

        let shares: Vec<f64> = if channels == 1 {
            vec![1.0]
        } else {
            Dirichlet::new_with_size(SHARE_CONCENTRATION, channels)
                .map_err(|err| BackendError::unsupported(err.to_string()))?
                .sample(&mut rng)
        };

        let spend = input.spend_per_channel();
        let implied: f64 = roi.iter().zip(&spend).map(|(r, s)| r * s).sum();
        let total = if implied > 0.0 {
            implied
        } else {
            input.kpi.sum().max(0.0)
        };
        let contribution: Vec<f64> = shares.iter().map(|s| s * total).collect();

        let ec = (0..channels).map(|_| rng.gen_range(0.3..=0.7)).collect();
        let slope = (0..channels).map(|_| rng.gen_range(1.0..=3.0)).collect();
        let decay = (0..channels).map(|_| rng.gen_range(0.1..=0.9)).collect();
        let peak = (0..channels)
            .map(|_| f64::from(rng.gen_range(0u8..=3)))
            .collect();

        let output = ModelOutput {
            roi: Some(Tensor::vector(roi)),
            contribution: Some(Tensor::vector(contribution)),
            saturation_ec: Some(Tensor::vector(ec)),
            saturation_slope: Some(Tensor::vector(slope)),
            adstock_decay: Some(Tensor::vector(decay)),
            adstock_peak: Some(Tensor::vector(peak)),
            r_squared: Some(rng.gen_range(0.7..=0.95)),
            mape: Some(rng.gen_range(0.05..=0.15)),
            ..ModelOutput::default()
        };
        info!(channels, "mock.generated");
        Ok(output)
    }
}
