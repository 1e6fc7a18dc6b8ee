#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # driftwatch
//!
//! Restarts Kubernetes deployments whose tag has moved to a new image digest.
//!
//! This library re-exports the workspace crates and holds the CLI surface.

pub use driftwatch_core;
pub use driftwatch_reconciler;

pub mod cli;
