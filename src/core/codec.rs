use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value as Json};

use super::{
    credential::{
        Credential, CredentialStatus, CredentialSubject, Decoded, Embedded, Jwt, JwtProof,
        Presentation,
    },
    jwt::{JwtClaims, JwtSigner, JwtVerifier},
};

/// How deep presentations may be nested inside one another.
pub const MAX_NESTING_DEPTH: usize = 4;

/// Tolerated clock difference, in seconds, when checking the validity window
/// of a presentation token.
pub const CLOCK_SKEW_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum DecodingError {
    #[error("token verification failed: {0:#}")]
    Verification(anyhow::Error),
    #[error("token payload carries neither a `vc` nor a `vp` claim")]
    UnknownEnvelope,
    #[error("expected a verifiable {expected} but found a verifiable {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("missing required property `{0}`")]
    MissingProperty(&'static str),
    #[error("invalid property `{property}`: {reason}")]
    InvalidProperty {
        property: &'static str,
        reason: String,
    },
    #[error("invalid timestamp in `{0}`")]
    InvalidTimestamp(&'static str),
    #[error("embedded credential objects are not accepted, credentials must be signed tokens")]
    EmbeddedCredentialRejected,
    #[error("presentations are nested more than {0} levels deep")]
    NestingTooDeep(usize),
    #[error("presentation holder `{holder}` is not the signer `{signer}`")]
    HolderMismatch { holder: String, signer: String },
    #[error("presentation expired at {0}")]
    PresentationExpired(DateTime<Utc>),
    #[error("presentation is not valid before {0}")]
    PresentationNotYetValid(DateTime<Utc>),
}

/// Decodes signed VC and VP tokens into [Credential]s and [Presentation]s.
///
/// Every token goes through the [JwtVerifier] before its payload is looked
/// at, so a decoded value has always had its signature checked.
///
/// Presentation tokens must also be within their `nbf`/`exp` window.
/// Credential expiration is left to the evaluator, which reports it per
/// input descriptor.
#[derive(Debug, Clone)]
pub struct Codec {
    verifier: Arc<dyn JwtVerifier + Send + Sync>,
    accept_embedded_credentials: bool,
    clock: fn() -> DateTime<Utc>,
}

impl Codec {
    pub fn new(verifier: Arc<dyn JwtVerifier + Send + Sync>) -> Self {
        Self {
            verifier,
            accept_embedded_credentials: false,
            clock: Utc::now,
        }
    }

    /// Override the clock presentation validity windows are checked against.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Accept plain credential objects in `vp.verifiableCredential`, trusting
    /// the presentation signature to cover them.
    pub fn accept_embedded_credentials(mut self, accept: bool) -> Self {
        self.accept_embedded_credentials = accept;
        self
    }

    /// Decode a token of either kind.
    pub async fn decode(&self, token: &str) -> Result<Decoded, DecodingError> {
        self.decode_at_depth(token, 0).await
    }

    pub async fn decode_credential(
        &self,
        jwt: &Jwt<Credential>,
    ) -> Result<Credential, DecodingError> {
        match self.decode(jwt.as_str()).await? {
            Decoded::Credential(credential) => Ok(credential),
            decoded => Err(DecodingError::UnexpectedKind {
                expected: "credential",
                found: decoded.kind(),
            }),
        }
    }

    pub async fn decode_presentation(
        &self,
        jwt: &Jwt<Presentation>,
    ) -> Result<Presentation, DecodingError> {
        match self.decode(jwt.as_str()).await? {
            Decoded::Presentation(presentation) => Ok(presentation),
            decoded => Err(DecodingError::UnexpectedKind {
                expected: "presentation",
                found: decoded.kind(),
            }),
        }
    }

    fn decode_at_depth<'a>(
        &'a self,
        token: &'a str,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Decoded, DecodingError>> + Send + 'a>> {
        Box::pin(async move {
            if depth > MAX_NESTING_DEPTH {
                return Err(DecodingError::NestingTooDeep(MAX_NESTING_DEPTH));
            }

            let claims = self
                .verifier
                .verify(token)
                .await
                .map_err(DecodingError::Verification)?;

            if claims.contains_key("vc") {
                credential_from_claims(claims)
                    .map(|credential| Credential {
                        proof: Some(JwtProof::new(token)),
                        ..credential
                    })
                    .map(Decoded::Credential)
            } else if claims.contains_key("vp") {
                self.check_validity_window(&claims)?;
                self.presentation_from_claims(claims, depth)
                    .await
                    .map(|presentation| Presentation {
                        proof: Some(JwtProof::new(token)),
                        ..presentation
                    })
                    .map(Decoded::Presentation)
            } else {
                Err(DecodingError::UnknownEnvelope)
            }
        })
    }

    fn check_validity_window(&self, claims: &JwtClaims) -> Result<(), DecodingError> {
        let now = (self.clock)();
        let skew = Duration::seconds(CLOCK_SKEW_SECS);

        if let Some(exp) = claims.get("exp") {
            let expiration = numeric_date(exp, "exp")?;
            if expiration + skew <= now {
                return Err(DecodingError::PresentationExpired(expiration));
            }
        }

        if let Some(nbf) = claims.get("nbf") {
            let not_before = numeric_date(nbf, "nbf")?;
            if not_before - skew > now {
                return Err(DecodingError::PresentationNotYetValid(not_before));
            }
        }

        Ok(())
    }

    async fn presentation_from_claims(
        &self,
        mut claims: JwtClaims,
        depth: usize,
    ) -> Result<Presentation, DecodingError> {
        let Some(Json::Object(mut vp)) = claims.remove("vp") else {
            return Err(DecodingError::InvalidProperty {
                property: "vp",
                reason: "expected an object".into(),
            });
        };

        // The holder is the signer; `sub` is never trusted to name it.
        let signer = string_claim(&claims, "iss")
            .ok_or(DecodingError::MissingProperty("iss"))?
            .to_owned();
        let holder = match vp.get("holder") {
            Some(Json::String(holder)) if *holder != signer => {
                return Err(DecodingError::HolderMismatch {
                    holder: holder.clone(),
                    signer,
                })
            }
            Some(Json::String(_)) | None => signer,
            Some(_) => {
                return Err(DecodingError::InvalidProperty {
                    property: "vp.holder",
                    reason: "expected a string".into(),
                })
            }
        };

        let entries = match vp.remove("verifiableCredential") {
            None => Vec::new(),
            Some(Json::Array(entries)) => entries,
            Some(entry @ (Json::String(_) | Json::Object(_))) => vec![entry],
            Some(_) => {
                return Err(DecodingError::InvalidProperty {
                    property: "vp.verifiableCredential",
                    reason: "expected an array".into(),
                })
            }
        };

        let mut verifiable_credential = Vec::with_capacity(entries.len());
        for entry in entries {
            let embedded = match entry {
                Json::String(token) => match self.decode_at_depth(&token, depth + 1).await? {
                    Decoded::Credential(credential) => Embedded::Credential(credential),
                    Decoded::Presentation(presentation) => Embedded::Presentation(presentation),
                },
                // The presentation signature covers the object, never its own proof.
                Json::Object(_) if self.accept_embedded_credentials => {
                    Credential::deserialize(&entry)
                        .map(|credential| Credential {
                            proof: None,
                            ..credential
                        })
                        .map(Embedded::Credential)
                        .map_err(|e| DecodingError::InvalidProperty {
                            property: "vp.verifiableCredential",
                            reason: e.to_string(),
                        })?
                }
                Json::Object(_) => return Err(DecodingError::EmbeddedCredentialRejected),
                _ => {
                    return Err(DecodingError::InvalidProperty {
                        property: "vp.verifiableCredential",
                        reason: "entries must be tokens or credential objects".into(),
                    })
                }
            };
            verifiable_credential.push(embedded);
        }

        Ok(Presentation {
            context: string_list(vp.get("@context"), "vp.@context")?.unwrap_or_default(),
            id: string_claim(&claims, "jti")
                .or_else(|| string_claim(&vp, "id"))
                .map(ToOwned::to_owned),
            types: string_list(vp.get("type"), "vp.type")?
                .ok_or(DecodingError::MissingProperty("vp.type"))?,
            holder,
            verifiable_credential,
            proof: None,
        })
    }
}

fn credential_from_claims(mut claims: JwtClaims) -> Result<Credential, DecodingError> {
    let Some(Json::Object(mut vc)) = claims.remove("vc") else {
        return Err(DecodingError::InvalidProperty {
            property: "vc",
            reason: "expected an object".into(),
        });
    };

    let issuer = string_claim(&claims, "iss")
        .ok_or(DecodingError::MissingProperty("iss"))?
        .to_owned();

    let types = string_list(vc.get("type"), "vc.type")?
        .filter(|types| !types.is_empty())
        .ok_or(DecodingError::MissingProperty("vc.type"))?;

    let Some(Json::Object(mut subject_claims)) = vc.remove("credentialSubject") else {
        return Err(DecodingError::MissingProperty("vc.credentialSubject"));
    };
    let subject_id = match subject_claims.remove("id") {
        Some(Json::String(id)) => Some(id),
        Some(_) => {
            return Err(DecodingError::InvalidProperty {
                property: "vc.credentialSubject.id",
                reason: "expected a string".into(),
            })
        }
        None => None,
    };
    let subject = match (string_claim(&claims, "sub"), subject_id) {
        (Some(sub), Some(id)) if sub != id => {
            return Err(DecodingError::InvalidProperty {
                property: "sub",
                reason: format!("`{sub}` does not match credentialSubject.id `{id}`"),
            })
        }
        (Some(sub), _) => sub.to_owned(),
        (None, Some(id)) => id,
        (None, None) => return Err(DecodingError::MissingProperty("sub")),
    };

    let expiration_date = match claims.get("exp") {
        Some(exp) => Some(numeric_date(exp, "exp")?),
        None => vc
            .get("expirationDate")
            .map(|date| string_date(date, "vc.expirationDate"))
            .transpose()?,
    };
    let issuance_date = match claims.get("nbf") {
        Some(nbf) => Some(numeric_date(nbf, "nbf")?),
        None => match vc.get("issuanceDate") {
            Some(date) => Some(string_date(date, "vc.issuanceDate")?),
            None => claims
                .get("iat")
                .map(|iat| numeric_date(iat, "iat"))
                .transpose()?,
        },
    };

    let credential_status = vc
        .remove("credentialStatus")
        .or_else(|| claims.remove("credentialStatus"))
        .map(|status| {
            CredentialStatus::deserialize(&status).map_err(|e| DecodingError::InvalidProperty {
                property: "credentialStatus",
                reason: e.to_string(),
            })
        })
        .transpose()?;

    Ok(Credential {
        context: string_list(vc.get("@context"), "vc.@context")?.unwrap_or_default(),
        id: string_claim(&claims, "jti")
            .or_else(|| string_claim(&vc, "id"))
            .map(ToOwned::to_owned),
        types,
        issuer,
        issuance_date,
        expiration_date,
        credential_subject: CredentialSubject {
            id: subject,
            claims: subject_claims,
        },
        credential_status,
        proof: None,
    })
}

fn string_claim<'a>(claims: &'a Map<String, Json>, name: &str) -> Option<&'a str> {
    claims.get(name).and_then(Json::as_str)
}

/// A string or array of strings. `None` when the property is absent.
fn string_list(
    value: Option<&Json>,
    property: &'static str,
) -> Result<Option<Vec<String>>, DecodingError> {
    let invalid = || DecodingError::InvalidProperty {
        property,
        reason: "expected a string or an array of strings".into(),
    };

    match value {
        None => Ok(None),
        Some(Json::String(value)) => Ok(Some(vec![value.clone()])),
        Some(Json::Array(values)) => values
            .iter()
            .map(|value| value.as_str().map(ToOwned::to_owned).ok_or_else(invalid))
            .collect::<Result<_, _>>()
            .map(Some),
        Some(_) => Err(invalid()),
    }
}

/// A JWT NumericDate: seconds since the epoch.
fn numeric_date(value: &Json, property: &'static str) -> Result<DateTime<Utc>, DecodingError> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|seconds| seconds as i64))
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
        .ok_or(DecodingError::InvalidTimestamp(property))
}

fn string_date(value: &Json, property: &'static str) -> Result<DateTime<Utc>, DecodingError> {
    value
        .as_str()
        .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
        .map(|date| date.with_timezone(&Utc))
        .ok_or(DecodingError::InvalidTimestamp(property))
}

/// A payload that can be signed into a [Jwt].
pub trait Envelope: Into<JwtClaims> {
    /// What the signed token decodes to.
    type Decoded;
}

/// The JWT payload of a Verifiable Credential, as built by
/// [VerifiableCredentialBuilder](crate::issuer::VerifiableCredentialBuilder).
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialPayload(pub(crate) JwtClaims);

impl CredentialPayload {
    pub fn claims(&self) -> &JwtClaims {
        &self.0
    }
}

impl From<CredentialPayload> for JwtClaims {
    fn from(payload: CredentialPayload) -> Self {
        payload.0
    }
}

impl Envelope for CredentialPayload {
    type Decoded = Credential;
}

/// The JWT payload of a Verifiable Presentation, as built by
/// [VerifiablePresentationBuilder](crate::holder::VerifiablePresentationBuilder).
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationPayload(pub(crate) JwtClaims);

impl PresentationPayload {
    pub fn claims(&self) -> &JwtClaims {
        &self.0
    }
}

impl From<PresentationPayload> for JwtClaims {
    fn from(payload: PresentationPayload) -> Self {
        payload.0
    }
}

impl Envelope for PresentationPayload {
    type Decoded = Presentation;
}

/// Sign a payload, producing a token typed by what it decodes to.
pub async fn encode<E, S>(payload: E, signer: &S) -> anyhow::Result<Jwt<E::Decoded>>
where
    E: Envelope,
    S: JwtSigner + Sync + ?Sized,
{
    signer.sign(payload.into()).await.map(Jwt::new)
}
