use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::presentation_definition::PresentationDefinition;

/// Verifier configuration, usually loaded once at startup.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// The presentation definitions to register.
    pub definitions: Vec<PresentationDefinition>,
    pub duplicate_definitions: DuplicatePolicy,
    /// Accept plain credential objects embedded in presentations.
    pub accept_embedded_credentials: bool,
}

/// What registering a definition under an id that is already taken does.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Replace,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(json);
        serde_path_to_error::deserialize(&mut deserializer).context("invalid configuration")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("in {}", path.display()))
    }
}
