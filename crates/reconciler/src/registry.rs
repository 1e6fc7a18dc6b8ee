//! Registry resolver: which digest does a tag currently point at.

use std::time::Duration;

use async_trait::async_trait;
use driftwatch_core::{ApplicationDescriptor, Digest};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::types::RegistryVersionRecord;

/// Public GitHub API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Pinned GitHub REST API version.
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Error bodies longer than this are cut before being reported.
const MAX_ERROR_BODY: usize = 2048;

/// Resolves the digest a descriptor's tag points at.
#[async_trait]
pub trait RegistryResolver: Send + Sync {
    /// Fetch the version listing and return the digest carrying the tag.
    async fn resolve_digest(&self, app: &ApplicationDescriptor) -> Result<Digest>;
}

/// First record, in listing order, carrying `tag`.
///
/// Registries should never attach one tag to two versions; if one does, the
/// earliest listed version wins.
#[must_use]
pub fn select_digest<'a>(records: &'a [RegistryVersionRecord], tag: &str) -> Option<&'a str> {
    records
        .iter()
        .find(|record| record.has_tag(tag))
        .map(|record| record.version.as_str())
}

/// Resolve a descriptor against an already fetched listing.
///
/// # Errors
///
/// Returns [`Error::VersionNotFound`] when no record carries the tag, or a
/// parse error when the matching version is not a usable digest.
pub fn resolve_from_listing(
    app: &ApplicationDescriptor,
    records: &[RegistryVersionRecord],
) -> Result<Digest> {
    let version = select_digest(records, &app.tag).ok_or_else(|| {
        Error::version_not_found(format!("{}/{}", app.account, app.image_name), &app.tag)
    })?;
    Ok(Digest::new(version)?)
}

/// GitHub Container Registry package versions endpoint.
#[derive(Clone)]
pub struct GitHubRegistry {
    base_url: Url,
    token: String,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl GitHubRegistry {
    /// Create a resolver against `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the HTTP client cannot be built.
    pub fn new(base_url: Url, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("driftwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::transport(base_url.as_str(), e.to_string()))?;

        Ok(Self {
            base_url,
            token: token.into(),
            timeout,
            http_client,
        })
    }

    /// `GET /users/{account}/packages/container/{image}/versions`.
    fn versions_url(&self, app: &ApplicationDescriptor) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                Error::invalid_config(format!("registry URL {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend([
                "users",
                app.account.as_str(),
                "packages",
                "container",
                app.image_name.as_str(),
                "versions",
            ]);
        Ok(url)
    }

    /// Fetch the version listing of a package.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses (with the response body) and
    /// undecodable bodies are returned as distinct errors.
    pub async fn list_versions(
        &self,
        app: &ApplicationDescriptor,
    ) -> Result<Vec<RegistryVersionRecord>> {
        let url = self.versions_url(app)?;
        debug!(url = %url, app = %app.full_name(), "Fetching package versions");

        let response = self
            .http_client
            .get(url.clone())
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&url, &e))?;

        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        let versions: Vec<PackageVersion> =
            serde_json::from_str(&body).map_err(|e| Error::invalid_response(e.to_string()))?;
        Ok(versions.into_iter().map(Into::into).collect())
    }

    fn transport_error(&self, url: &Url, error: &reqwest::Error) -> Error {
        if error.is_timeout() {
            let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
            return Error::timeout(format!("GET {url}"), timeout_ms);
        }
        Error::transport(url.as_str(), error.to_string())
    }
}

impl std::fmt::Debug for GitHubRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubRegistry")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RegistryResolver for GitHubRegistry {
    async fn resolve_digest(&self, app: &ApplicationDescriptor) -> Result<Digest> {
        let records = self.list_versions(app).await?;
        resolve_from_listing(app, &records)
    }
}

/// Package version as returned by the GitHub packages API.
#[derive(Debug, Deserialize)]
struct PackageVersion {
    name: String,
    #[serde(default)]
    metadata: Option<PackageMetadata>,
}

#[derive(Debug, Deserialize)]
struct PackageMetadata {
    #[serde(default)]
    container: Option<ContainerMetadata>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetadata {
    #[serde(default)]
    tags: Vec<String>,
}

impl From<PackageVersion> for RegistryVersionRecord {
    fn from(version: PackageVersion) -> Self {
        let tags = version
            .metadata
            .and_then(|m| m.container)
            .map(|c| c.tags)
            .unwrap_or_default();
        Self {
            version: version.name,
            tags,
        }
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let cut = (0..=max).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
        body.truncate(cut);
    }
    body
}
