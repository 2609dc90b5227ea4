use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use crate::{
    config::Config,
    core::{
        codec::Codec,
        jwt::JwtVerifier,
        status::{MemoryStatusResolver, StatusResolver},
    },
};

use error::{FailureReason, ValidationError};
use matcher::Matcher;
use prevalidation::{prevalidate, PreValidated};
use registry::DefinitionRegistry;

pub use matcher::{Binding, ProcessedSubmission};

pub mod error;
mod matcher;
pub mod prevalidation;
pub mod registry;

/// Validates presentation submissions against the registered presentation
/// definitions.
///
/// Processing is stateless: a [Verifier] can be shared between tasks and
/// used for any number of submissions concurrently.
#[derive(Debug, Clone)]
pub struct Verifier {
    registry: Arc<DefinitionRegistry>,
    codec: Codec,
    status_resolver: Arc<dyn StatusResolver + Send + Sync>,
    clock: fn() -> DateTime<Utc>,
}

impl Verifier {
    /// Build a new verifier.
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::default()
    }

    /// The definitions this verifier accepts submissions for.
    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    /// Process a raw submission of the form
    /// `{ "presentation_submission": {..}, "presentation": "<jwt>" }`.
    ///
    /// The shape of the input is checked and its definition looked up before
    /// the presentation is decoded, so unknown definitions never reach the
    /// [JwtVerifier].
    pub async fn process(&self, raw: &Json) -> Result<ProcessedSubmission, ValidationError> {
        let PreValidated {
            submission,
            presentation,
        } = prevalidate(raw).inspect_err(|e| tracing::debug!("rejected submission: {e}"))?;

        let Some(definition) = self.registry.find_by_id(submission.definition_id()) else {
            tracing::debug!(
                "no presentation definition registered for {}",
                submission.definition_id()
            );
            return Err(
                FailureReason::UnknownDefinition(submission.definition_id().to_owned()).into(),
            );
        };

        let presentation = self
            .codec
            .decode_presentation(&presentation)
            .await
            .map_err(|e| {
                tracing::warn!("failed to decode presentation: {e}");
                FailureReason::Decoding(e)
            })?;

        Matcher {
            status_resolver: self.status_resolver.as_ref(),
            now: (self.clock)(),
        }
        .process(submission, presentation, definition)
        .await
    }

    /// Parse `raw` as JSON, then [process](Verifier::process) it.
    pub async fn process_str(&self, raw: &str) -> Result<ProcessedSubmission, ValidationError> {
        let raw: Json = serde_json::from_str(raw)
            .map_err(|e| FailureReason::MalformedInput(format!("invalid JSON: {e}")))?;
        self.process(&raw).await
    }
}

/// Builder struct for [Verifier].
#[derive(Debug, Clone, Default)]
pub struct VerifierBuilder {
    registry: Option<Arc<DefinitionRegistry>>,
    jwt_verifier: Option<Arc<dyn JwtVerifier + Send + Sync>>,
    status_resolver: Option<Arc<dyn StatusResolver + Send + Sync>>,
    accept_embedded_credentials: bool,
    clock: Option<fn() -> DateTime<Utc>>,
}

impl VerifierBuilder {
    /// Build the verifier.
    pub fn build(self) -> Result<Verifier> {
        let Self {
            registry,
            jwt_verifier,
            status_resolver,
            accept_embedded_credentials,
            clock,
        } = self;

        let Some(registry) = registry else {
            bail!("definition registry is required, see `with_registry` or `with_config`")
        };

        let Some(jwt_verifier) = jwt_verifier else {
            bail!("jwt verifier is required, see `with_jwt_verifier`")
        };

        let status_resolver: Arc<dyn StatusResolver + Send + Sync> = match status_resolver {
            Some(status_resolver) => status_resolver,
            None => Arc::new(MemoryStatusResolver::new()),
        };

        let clock = clock.unwrap_or(Utc::now);
        let codec = Codec::new(jwt_verifier)
            .accept_embedded_credentials(accept_embedded_credentials)
            .with_clock(clock);

        Ok(Verifier {
            registry,
            codec,
            status_resolver,
            clock,
        })
    }

    /// Set the [DefinitionRegistry] of the definitions the [Verifier] accepts.
    pub fn with_registry(mut self, registry: impl Into<Arc<DefinitionRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Build the registry and codec options from a [Config].
    pub fn with_config(mut self, config: &Config) -> Result<Self> {
        self.registry = Some(Arc::new(DefinitionRegistry::from_config(config)?));
        self.accept_embedded_credentials = config.accept_embedded_credentials;
        Ok(self)
    }

    /// Set the [JwtVerifier] that checks the presentation and credential
    /// signatures.
    pub fn with_jwt_verifier(mut self, verifier: Arc<dyn JwtVerifier + Send + Sync>) -> Self {
        self.jwt_verifier = Some(verifier);
        self
    }

    /// Set the [StatusResolver] used for status directives. Defaults to an
    /// empty [MemoryStatusResolver].
    pub fn with_status_resolver(
        mut self,
        status_resolver: Arc<dyn StatusResolver + Send + Sync>,
    ) -> Self {
        self.status_resolver = Some(status_resolver);
        self
    }

    /// Accept plain credential objects embedded in presentations.
    pub fn accept_embedded_credentials(mut self, accept: bool) -> Self {
        self.accept_embedded_credentials = accept;
        self
    }

    /// Override the clock used for credential expiration and presentation
    /// validity checks.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = Some(clock);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::jwt::P256Verifier;

    #[test]
    fn required_parts() {
        let error = Verifier::builder().build().unwrap_err();
        assert!(error.to_string().contains("with_registry"));

        let error = Verifier::builder()
            .with_registry(DefinitionRegistry::new())
            .build()
            .unwrap_err();
        assert!(error.to_string().contains("with_jwt_verifier"));

        assert!(Verifier::builder()
            .with_registry(DefinitionRegistry::new())
            .with_jwt_verifier(Arc::new(P256Verifier::new()))
            .build()
            .is_ok());
    }
}
