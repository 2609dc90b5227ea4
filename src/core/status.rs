use std::{collections::HashMap, fmt};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::credential::CredentialStatus;

/// The lifecycle state of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Active,
    Suspended,
    Revoked,
}

impl StatusState {
    pub const ALL: [StatusState; 3] = [Self::Active, Self::Suspended, Self::Revoked];
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
        }
        .fmt(f)
    }
}

/// Resolves the current lifecycle state of a credential from its status
/// reference, e.g. by fetching and reading its status list.
#[async_trait]
pub trait StatusResolver: fmt::Debug {
    async fn resolve(&self, status: &CredentialStatus) -> Result<StatusState>;
}

/// A local in-memory status registry, keyed by status entry id. Not for production use!
///
/// Entries are fixed once the resolver is built. Resolving a status entry that
/// was never recorded is an error.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusResolver {
    entries: HashMap<String, StatusState>,
}

impl MemoryStatusResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state of the status entry `id`.
    pub fn with_status(mut self, id: impl Into<String>, state: StatusState) -> Self {
        let id = id.into();
        tracing::debug!("status entry {id} is {state}");
        self.entries.insert(id, state);
        self
    }
}

#[async_trait]
impl StatusResolver for MemoryStatusResolver {
    async fn resolve(&self, status: &CredentialStatus) -> Result<StatusState> {
        self.entries
            .get(&status.id)
            .copied()
            .with_context(|| format!("unknown status entry `{}`", status.id))
    }
}
