//! CLI definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

/// Default location of the applications file.
pub const DEFAULT_CONF_FILE: &str = "/etc/driftwatch/config.yaml";

/// driftwatch - restart deployments when their tag moves to a new digest
#[derive(Parser, Debug)]
#[command(name = "driftwatch")]
#[command(version)]
#[command(about = "Keeps Kubernetes deployments running the newest image published for their tag")]
#[command(
    long_about = "driftwatch polls the GitHub container registry for the digest each configured tag points at, compares it with the digests running in the cluster, and rolls deployments that have drifted."
)]
pub struct Cli {
    /// Path to a kubeconfig file; in-cluster or default config when omitted
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Path of the applications file
    #[arg(long, env = "DRIFTWATCH_CONF_FILE", default_value = DEFAULT_CONF_FILE)]
    pub conf: PathBuf,

    /// GitHub token used to read package versions
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, value_parser = parse_token)]
    pub token: String,

    /// Interval between each check in seconds
    #[arg(
        long,
        env = "DRIFTWATCH_INTERVAL_SECONDS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval_seconds: u64,

    /// Timeout applied to every registry and cluster call, in seconds
    #[arg(long, env = "DRIFTWATCH_REQUEST_TIMEOUT_SECONDS", default_value_t = 30)]
    pub request_timeout_seconds: u64,

    /// Base URL of the GitHub API
    #[arg(long, env = "DRIFTWATCH_REGISTRY_URL", default_value = driftwatch_reconciler::GITHUB_API_URL)]
    pub registry_url: Url,

    /// Applications reconciled at the same time
    #[arg(long, env = "DRIFTWATCH_CONCURRENCY", default_value = "1")]
    pub concurrency: NonZeroUsize,

    /// Run a single cycle, print its summary as JSON and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,
}

impl Cli {
    /// Pause between cycles.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Bound on each network call; never zero.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

fn parse_token(value: &str) -> Result<String, String> {
    let token = value.trim();
    if token.is_empty() {
        return Err("token must not be blank".to_string());
    }
    Ok(token.to_string())
}
