//! Core types for driftwatch.
//!
//! - [`ApplicationDescriptor`]: one application whose deployment tracks a registry tag
//! - [`Digest`]: content digest compared between registry and cluster
//! - [`load_descriptors`]: YAML configuration loading and validation

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod descriptor;
pub mod digest;
pub mod error;

pub use descriptor::{ApplicationDescriptor, load_descriptors, parse_descriptors};
pub use digest::Digest;
pub use error::{Error, Result};
