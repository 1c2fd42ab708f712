//! HTTP cache validators, remembered per URL between runs

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// `ETag` / `Last-Modified` pair captured from one response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validators {
    /// Value of the `ETag` response header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Value of the `Last-Modified` response header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl Validators {
    /// Whether neither header was present
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// URL → validators captured on a previous fetch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatorCache {
    entries: BTreeMap<String, Validators>,
}

impl ValidatorCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Validators for `url`, if any were captured
    pub fn get(&self, url: &str) -> Option<&Validators> {
        self.entries.get(url)
    }

    /// Remember the validators a response for `url` carried
    ///
    /// A response without validators clears whatever was stored for `url`, so a
    /// server that stops sending them is not asked conditionally any more.
    pub fn record(&mut self, url: impl Into<String>, validators: Validators) {
        let url = url.into();
        if validators.is_empty() {
            self.entries.remove(&url);
        } else {
            self.entries.insert(url, validators);
        }
    }

    /// Number of URLs with validators
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no validators are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a cache file
    ///
    /// A missing or unreadable file yields an empty cache; conditional requests
    /// are an optimisation, never a reason to fail the run.
    pub async fn load(path: &Path) -> Self {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read validator cache");
                return Self::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt validator cache");
                Self::default()
            }
        }
    }

    /// Write the cache atomically
    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        crate::snapshot::write_atomic(path, &bytes).await
    }
}
