// src/credentials.rs
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::RdecError;

/// Plain-text API key storage: one line, trimmed, created on first use.
///
/// The key is read or created once per process and treated as immutable
/// afterwards; commands load it a single time when they build their client.
#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    path: PathBuf,
}

impl ApiKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored key, prompting through `prompt` and persisting the
    /// answer if no key file exists yet. An empty or dismissed prompt is a
    /// configuration error.
    pub fn load_or_create(
        &self,
        prompt: &dyn Fn(&str) -> Option<String>,
    ) -> Result<String, RdecError> {
        if let Ok(text) = std::fs::read_to_string(&self.path) {
            let key = text.lines().next().unwrap_or("").trim().to_string();
            if key.is_empty() {
                return Err(RdecError::Configuration(format!(
                    "API key file '{}' is empty",
                    self.path.display()
                )));
            }
            return Ok(key);
        }

        warn!("no API key at '{}', prompting for one", self.path.display());
        let key = prompt("Please enter your decompilation service API key:")
            .map(|k| k.trim().to_string())
            .unwrap_or_default();
        if key.is_empty() {
            return Err(RdecError::Configuration("no API key provided".to_string()));
        }

        std::fs::write(&self.path, format!("{}\n", key))?;
        info!("API key has been saved to disk");
        Ok(key)
    }
}
