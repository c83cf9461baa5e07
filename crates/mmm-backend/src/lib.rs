//! Model backends for marketing-mix training.
//!
//! A backend takes adapted [`ModelInputArrays`] plus sampler settings and
//! returns a [`ModelOutput`]: posterior tensors of whatever rank the
//! implementation naturally produces. Backends are chosen once, from
//! configuration, and each is tagged with a version so the normalizer never
//! has to probe which API it is talking to.
//!
//! | id              | model type      | notes                                   |
//! |-----------------|-----------------|-----------------------------------------|
//! | `native-v1`     | `mmm_native`    | built-in regression, bootstrap draws    |
//! | `subprocess-v1` | `meridian`      | external bridge over stdin/stdout JSON  |
//! | `mock-v1`       | `meridian_mock` | seeded fabricated values                |

mod error;
mod linalg;
mod mock;
mod native;
mod subprocess;
mod transform;

use mmm_adapter::ModelInputArrays;
use mmm_schemas::{BackendConfig, BackendKind, ModelOutput, SamplerSettings};

#[doc(inline)]
pub use crate::error::BackendError;
#[doc(inline)]
pub use crate::mock::MockBackend;
#[doc(inline)]
pub use crate::native::NativeBackend;
#[doc(inline)]
pub use crate::subprocess::SubprocessBackend;

/// Identity of a backend implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    /// Version-tagged implementation id, e.g. `native-v1`.
    pub id: &'static str,
    /// Value written as `model_type` in the result document.
    pub model_type: String,
    /// External library API version, when the backend wraps one.
    pub api_version: Option<String>,
}

/// A model fitting implementation.
pub trait ModelBackend {
    fn descriptor(&self) -> BackendDescriptor;

    /// Fits the model.
    ///
    /// # Errors
    ///
    /// Any failure is an external-model error; the input has already been
    /// validated by the adapter.
    fn fit(
        &self,
        input: &ModelInputArrays,
        sampler: &SamplerSettings,
    ) -> Result<ModelOutput, BackendError>;
}

/// Builds the backend named by the configuration.
pub fn select_backend(
    config: &BackendConfig,
    threads: Option<usize>,
) -> Result<Box<dyn ModelBackend>, BackendError> {
    Ok(match config.kind {
        BackendKind::Native => Box::new(NativeBackend),
        BackendKind::Subprocess => Box::new(SubprocessBackend::new(
            config.command.clone(),
            config.api_version.clone(),
            threads,
        )?),
        BackendKind::Mock => Box::new(MockBackend::default()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_kind() {
        let native = select_backend(&BackendConfig::default(), None).unwrap();
        assert_eq!(native.descriptor().id, "native-v1");

        let mock = select_backend(
            &BackendConfig {
                kind: BackendKind::Mock,
                ..BackendConfig::default()
            },
            None,
        )
        .unwrap();
        assert_eq!(mock.descriptor().model_type, "meridian_mock");

        let bridge = select_backend(
            &BackendConfig {
                kind: BackendKind::Subprocess,
                command: vec!["python3".into(), "bridge.py".into()],
                api_version: Some("1.1".into()),
            },
            Some(4),
        )
        .unwrap();
        let descriptor = bridge.descriptor();
        assert_eq!(descriptor.id, "subprocess-v1");
        assert_eq!(descriptor.api_version.as_deref(), Some("1.1"));
    }

    #[test]
    fn test_subprocess_without_command() {
        let err = select_backend(
            &BackendConfig {
                kind: BackendKind::Subprocess,
                ..BackendConfig::default()
            },
            None,
        )
        .err()
        .unwrap();
        assert!(err.is_unsupported());
    }
}
