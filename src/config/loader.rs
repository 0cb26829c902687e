// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawSubmissionPolicy, ServerSettings, SubmissionPolicy};
use crate::errors::{JobsubError, Result};

/// Load a submission policy from a given path and return the raw document.
///
/// Files ending in `.toml` are read as TOML, everything else as JSON. This
/// only performs deserialization; use [`load_policy`] for validation.
pub fn load_policy_from_path(path: impl AsRef<Path>) -> Result<RawSubmissionPolicy> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        JobsubError::ConfigError(format!("reading submission policy {:?}: {e}", path))
    })?;

    let raw = if is_toml(path) {
        toml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };
    Ok(raw)
}

/// Load a submission policy from path and validate it.
pub fn load_policy(path: impl AsRef<Path>) -> Result<SubmissionPolicy> {
    let raw = load_policy_from_path(path)?;
    SubmissionPolicy::try_from(raw)
}

/// Load the workflow server connection settings (JSON).
pub fn load_server_settings(path: impl AsRef<Path>) -> Result<ServerSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        JobsubError::ConfigError(format!("reading server settings {:?}: {e}", path))
    })?;
    let settings: ServerSettings = serde_json::from_str(&contents)?;
    settings.effective_port()?;
    Ok(settings)
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}
