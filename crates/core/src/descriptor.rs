//! Application descriptors and configuration file loading.
//!
//! The configuration file is a YAML sequence, one record per application:
//!
//! ```yaml
//! - username: acme
//!   image_name: api
//!   tag: prod
//!   k8s_namespace: default
//!   k8s_deployment: api
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// One application whose deployment follows a registry tag.
///
/// Immutable once loaded. Identity is `(account, image_name, tag)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationDescriptor {
    /// Registry account owning the package.
    #[serde(rename = "username")]
    pub account: String,
    /// Package / image name within the account.
    pub image_name: String,
    /// Tag the deployment tracks.
    pub tag: String,
    /// Namespace of the target deployment.
    #[serde(rename = "k8s_namespace")]
    pub namespace: String,
    /// Name of the target deployment.
    #[serde(rename = "k8s_deployment")]
    pub deployment: String,
}

impl ApplicationDescriptor {
    /// Create a descriptor.
    pub fn new(
        account: impl Into<String>,
        image_name: impl Into<String>,
        tag: impl Into<String>,
        namespace: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            image_name: image_name.into(),
            tag: tag.into(),
            namespace: namespace.into(),
            deployment: deployment.into(),
        }
    }

    /// `account/image_name:tag`, used in logs.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}:{}", self.account, self.image_name, self.tag)
    }

    /// `namespace/deployment`.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}/{}", self.namespace, self.deployment)
    }

    fn validate(&self, index: usize) -> Result<()> {
        [
            ("username", &self.account),
            ("image_name", &self.image_name),
            ("tag", &self.tag),
            ("k8s_namespace", &self.namespace),
            ("k8s_deployment", &self.deployment),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map_or(Ok(()), |(field, _)| Err(Error::empty_field(index, field)))
    }
}

impl fmt::Display for ApplicationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.full_name(), self.target())
    }
}

/// Parse and validate descriptors from YAML text.
///
/// An empty document or empty sequence yields no applications.
///
/// # Errors
///
/// Returns an error when the YAML is malformed, a field is blank, or two
/// records target the same deployment.
pub fn parse_descriptors(yaml: &str) -> Result<Vec<ApplicationDescriptor>> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }

    let apps: Option<Vec<ApplicationDescriptor>> =
        serde_yaml::from_str(yaml).map_err(|e| Error::yaml_parse_failed(e.to_string()))?;
    let apps = apps.unwrap_or_default();

    apps.iter()
        .enumerate()
        .try_for_each(|(index, app)| app.validate(index))?;
    reject_duplicate_targets(&apps)?;

    Ok(apps)
}

/// Read, parse and validate the configuration file at `path`.
///
/// # Errors
///
/// Returns [`Error::FileReadFailed`] when the file cannot be read, otherwise
/// the errors of [`parse_descriptors`].
pub fn load_descriptors(path: &Path) -> Result<Vec<ApplicationDescriptor>> {
    let content =
        std::fs::read_to_string(path).map_err(|e| Error::file_read_failed(path, e.to_string()))?;
    let apps = parse_descriptors(&content)?;
    debug!(path = %path.display(), count = apps.len(), "Loaded application descriptors");
    Ok(apps)
}

fn reject_duplicate_targets(apps: &[ApplicationDescriptor]) -> Result<()> {
    let mut seen: HashMap<(&str, &str), usize> = HashMap::with_capacity(apps.len());
    for (index, app) in apps.iter().enumerate() {
        let key = (app.namespace.as_str(), app.deployment.as_str());
        if let Some(&first) = seen.get(&key) {
            return Err(Error::DuplicateApplication {
                index,
                first,
                name: app.target(),
            });
        }
        seen.insert(key, index);
    }
    Ok(())
}
