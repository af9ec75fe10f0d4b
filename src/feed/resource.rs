//! Curated resources as they arrive from the directory.

use super::repo_path::RepoPath;
use serde::{Deserialize, Serialize};

/// One entry of the curated list: a display name plus an optional link to the
/// project's code hosting presence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub name: String,
    pub profile_url: Option<String>,
}

impl ResourceRef {
    #[must_use]
    pub fn new(name: impl Into<String>, profile_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile_url: Some(profile_url.into()),
        }
    }

    /// Normalized repository path, when the profile URL resolves to one.
    #[must_use]
    pub fn repo_path(&self) -> Option<RepoPath> {
        RepoPath::resolve(self.profile_url.as_deref()?)
    }

    /// Stable cache key derived from the name and the resolved path.
    ///
    /// The name is lowercased with every non-alphanumeric run of characters
    /// replaced by `_`, and the path joins in with its `/` flattened to `_`,
    /// so distinct resources pointing at the same repository keep separate
    /// entries.
    #[must_use]
    pub fn cache_key(&self) -> Option<String> {
        let path = self.repo_path()?;

        let name: String = self
            .name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        Some(format!("github_{name}_{}", path.to_string().replace('/', "_")))
    }
}
