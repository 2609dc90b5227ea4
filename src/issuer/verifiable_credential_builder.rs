use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};

use crate::core::{
    codec::CredentialPayload,
    credential::{CredentialStatus, CREDENTIALS_V1_CONTEXT, VERIFIABLE_CREDENTIAL_TYPE},
    jwt::JwtClaims,
};

/// Context of identity attestations such as `KYCAMLAttestation`.
pub const IDENTITY_CONTEXT: &str = "https://verite.id/identity";

/// Builds the JWT payload of a Verifiable Credential attesting one claim set
/// about a subject.
///
/// ```
/// use presentation_exchange::issuer::VerifiableCredentialBuilder;
/// use serde_json::json;
///
/// let payload = VerifiableCredentialBuilder::new(
///     "KYCAMLAttestation",
///     "did:example:holder",
///     json!({ "approved": true }),
/// )
/// .build();
///
/// assert_eq!(
///     payload.claims()["vc"]["credentialSubject"]["KYCAMLAttestation"]["approved"],
///     true
/// );
/// ```
#[derive(Debug, Clone)]
pub struct VerifiableCredentialBuilder {
    claims: JwtClaims,
    vc: Map<String, Json>,
}

impl VerifiableCredentialBuilder {
    /// The attestation is stored under its type in `credentialSubject`, next
    /// to the subject `id`.
    pub fn new(
        attestation_type: impl Into<String>,
        subject: impl Into<String>,
        attestation: Json,
    ) -> Self {
        let attestation_type = attestation_type.into();
        let subject = subject.into();

        let mut claims = JwtClaims::new();
        claims.insert("sub".into(), Json::String(subject.clone()));

        let mut credential_subject = Map::new();
        credential_subject.insert(attestation_type.clone(), attestation);
        credential_subject.insert("id".into(), Json::String(subject));

        let mut vc = Map::new();
        vc.insert(
            "@context".into(),
            Json::Array(vec![CREDENTIALS_V1_CONTEXT.into(), IDENTITY_CONTEXT.into()]),
        );
        vc.insert(
            "type".into(),
            Json::Array(vec![
                VERIFIABLE_CREDENTIAL_TYPE.into(),
                Json::String(attestation_type),
            ]),
        );
        vc.insert("credentialSubject".into(), Json::Object(credential_subject));

        Self { claims, vc }
    }

    /// Set the credential identifier, carried in `jti`.
    pub fn set_id(mut self, id: impl Into<String>) -> Self {
        self.claims.insert("jti".into(), Json::String(id.into()));
        self
    }

    /// Replace the attestation context.
    pub fn set_context(mut self, context: Vec<String>) -> Self {
        let context = std::iter::once(CREDENTIALS_V1_CONTEXT.to_owned())
            .chain(context.into_iter().filter(|c| *c != CREDENTIALS_V1_CONTEXT))
            .map(Json::String)
            .collect();
        self.vc.insert("@context".into(), Json::Array(context));
        self
    }

    pub fn set_credential_status(mut self, status: CredentialStatus) -> Self {
        self.vc.insert(
            "credentialStatus".into(),
            serde_json::to_value(status)
                // SAFETY: a credential status is a flat record of strings.
                .unwrap(),
        );
        self
    }

    /// Set the date from which the credential is valid, carried in `nbf`.
    pub fn set_issuance_date(mut self, issuance_date: DateTime<Utc>) -> Self {
        self.claims
            .insert("nbf".into(), issuance_date.timestamp().into());
        self
    }

    /// Set the expiration date, carried in `exp`.
    pub fn set_expiration_date(mut self, expiration_date: DateTime<Utc>) -> Self {
        self.claims
            .insert("exp".into(), expiration_date.timestamp().into());
        self
    }

    pub fn build(self) -> CredentialPayload {
        let Self { mut claims, vc } = self;
        claims.insert("vc".into(), Json::Object(vc));
        CredentialPayload(claims)
    }
}
