use std::collections::HashMap;

use crate::{
    config::{Config, DuplicatePolicy},
    core::presentation_definition::{DefinitionError, PresentationDefinition},
};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("presentation definition `{0}` is already registered")]
    DuplicateDefinition(String),
    #[error("invalid presentation definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),
}

/// The presentation definitions a verifier accepts submissions for, indexed
/// by definition id.
///
/// Built once, then shared read-only between requests.
#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    definitions: HashMap<String, PresentationDefinition>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the definitions of a [Config], following its
    /// duplicate policy.
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for definition in config.definitions.iter().cloned() {
            match config.duplicate_definitions {
                DuplicatePolicy::Reject => registry.register(definition)?,
                DuplicatePolicy::Replace => {
                    registry.replace(definition)?;
                }
            }
        }
        Ok(registry)
    }

    /// Register a definition, rejecting it if its id is already taken.
    pub fn register(&mut self, definition: PresentationDefinition) -> Result<(), RegistryError> {
        definition.validate()?;

        if self.definitions.contains_key(definition.id()) {
            return Err(RegistryError::DuplicateDefinition(definition.id().to_owned()));
        }

        tracing::debug!("registered presentation definition {}", definition.id());
        self.definitions
            .insert(definition.id().to_owned(), definition);
        Ok(())
    }

    /// Register a definition, replacing and returning any definition with the
    /// same id.
    pub fn replace(
        &mut self,
        definition: PresentationDefinition,
    ) -> Result<Option<PresentationDefinition>, RegistryError> {
        definition.validate()?;

        let previous = self
            .definitions
            .insert(definition.id().to_owned(), definition);
        if let Some(previous) = &previous {
            tracing::info!("replaced presentation definition {}", previous.id());
        }
        Ok(previous)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&PresentationDefinition> {
        self.definitions.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
