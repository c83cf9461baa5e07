//! Schema definitions for the mmm training pipeline.
//!
//! This crate contains the data structures that cross a process or stage
//! boundary: the JSON run configuration, the input payload handed to an
//! external model, the posterior tensors it returns, the result document
//! consumed by the front end, and the progress events streamed on stdout.
//!
//! The schemas are designed to be:
//! - **Self-describing**: JSON Schema for the configuration and TypeScript
//!   bindings for the result document are generated from these types
//! - **Ordered**: every per-channel map is an `IndexMap` so channel order from
//!   the configuration survives serialization
//! - **Shared**: used by the adapter, backend, normalizer and CLI crates

mod config;
mod error;
mod payload;
mod posterior;
mod progress;
mod result;
#[cfg(test)]
mod testutil;

#[doc(inline)]
pub use config::*;
#[doc(inline)]
pub use error::ConfigError;
#[doc(inline)]
pub use payload::*;
#[doc(inline)]
pub use posterior::*;
#[doc(inline)]
pub use progress::*;
#[doc(inline)]
pub use result::*;
