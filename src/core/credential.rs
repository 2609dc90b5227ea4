use std::{fmt, marker::PhantomData};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as Json};
use url::Url;

use super::jwt;
use crate::utils::one_or_many;

/// The base context of every W3C Verifiable Credential and Presentation.
pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

pub const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";

pub const VERIFIABLE_PRESENTATION_TYPE: &str = "VerifiablePresentation";

pub const JWT_PROOF_TYPE: &str = "JwtProof2020";

/// A signed, still-encoded token whose payload decodes to a `T`.
///
/// The type parameter only records what the token is expected to contain; the
/// token itself is opaque until it has gone through the
/// [Codec](crate::core::codec::Codec).
pub struct Jwt<T> {
    token: String,
    kind: PhantomData<fn() -> T>,
}

impl<T> Jwt<T> {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn into_string(self) -> String {
        self.token
    }
}

impl<T> Clone for Jwt<T> {
    fn clone(&self) -> Self {
        Self::new(self.token.clone())
    }
}

impl<T> fmt::Debug for Jwt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Jwt").field(&self.token).finish()
    }
}

impl<T> fmt::Display for Jwt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.token.fmt(f)
    }
}

impl<T> PartialEq for Jwt<T> {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl<T> Eq for Jwt<T> {}

impl<T> Serialize for Jwt<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.token.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Jwt<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// A decoded, signature-checked Verifiable Credential.
///
/// The serialized form is the W3C data model representation, which is also
/// the document that descriptor map paths and field constraint paths are
/// evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(
        rename = "@context",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub(crate) context: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(rename = "type", deserialize_with = "one_or_many")]
    pub(crate) types: Vec<String>,
    #[serde(deserialize_with = "issuer_id")]
    pub(crate) issuer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) issuance_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) expiration_date: Option<DateTime<Utc>>,
    pub(crate) credential_subject: CredentialSubject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) credential_status: Option<CredentialStatus>,
    #[serde(
        default,
        deserialize_with = "jwt_proof",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) proof: Option<JwtProof>,
}

impl Credential {
    pub fn context(&self) -> &[String] {
        &self.context
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn has_type(&self, credential_type: &str) -> bool {
        self.types.iter().any(|t| t == credential_type)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The identity the credential makes claims about.
    pub fn subject(&self) -> &str {
        &self.credential_subject.id
    }

    /// The attested claims, keyed by attestation type.
    pub fn claims(&self) -> &Map<String, Json> {
        &self.credential_subject.claims
    }

    pub fn issuance_date(&self) -> Option<&DateTime<Utc>> {
        self.issuance_date.as_ref()
    }

    pub fn expiration_date(&self) -> Option<&DateTime<Utc>> {
        self.expiration_date.as_ref()
    }

    pub fn credential_status(&self) -> Option<&CredentialStatus> {
        self.credential_status.as_ref()
    }

    /// The token the credential was decoded from. `None` for credentials
    /// embedded as plain objects.
    pub fn proof(&self) -> Option<&JwtProof> {
        self.proof.as_ref()
    }

    /// Whether the credential has expired at `now`.
    ///
    /// A credential without an expiration date never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date
            .is_some_and(|expiration_date| expiration_date < now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Return the W3C JSON representation of the credential.
    pub fn to_json(&self) -> Json {
        serde_json::to_value(self)
            // SAFETY: a credential only holds strings, timestamps and JSON
            //         values, all of which have a JSON representation.
            .unwrap()
    }
}

/// The `credentialSubject` of a credential: the subject identity plus the
/// attested claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSubject {
    pub id: String,
    #[serde(flatten)]
    pub claims: Map<String, Json>,
}

/// Reference to the revocation/suspension status of a credential.
///
/// See: <https://w3c-ccg.github.io/vc-status-list-2021/#revocationlist2021>
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    /// Identifier of this credential's status entry.
    pub id: String,
    #[serde(rename = "type")]
    pub status_type: String,
    /// Position of this credential's status in the status list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_list_index: Option<StatusListIndex>,
    /// Location of the status list credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_list_credential: Option<Url>,
}

/// Index of a credential's status bit within a status list.
///
/// Serialized as a decimal string, as status list entries require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatusListIndex(usize);

impl StatusListIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl TryFrom<String> for StatusListIndex {
    type Error = std::num::ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map(Self)
    }
}

impl From<StatusListIndex> for String {
    fn from(index: StatusListIndex) -> Self {
        index.0.to_string()
    }
}

/// A decoded, signature-checked Verifiable Presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    #[serde(
        rename = "@context",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub(crate) context: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(rename = "type", deserialize_with = "one_or_many")]
    pub(crate) types: Vec<String>,
    pub(crate) holder: String,
    pub(crate) verifiable_credential: Vec<Embedded>,
    #[serde(
        default,
        deserialize_with = "jwt_proof",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) proof: Option<JwtProof>,
}

impl Presentation {
    pub fn context(&self) -> &[String] {
        &self.context
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn verifiable_credential(&self) -> &[Embedded] {
        &self.verifiable_credential
    }

    /// The token the presentation was decoded from.
    pub fn proof(&self) -> Option<&JwtProof> {
        self.proof.as_ref()
    }

    /// Iterate over the credentials embedded directly in this presentation.
    pub fn credentials(&self) -> impl Iterator<Item = &Credential> {
        self.verifiable_credential
            .iter()
            .filter_map(|embedded| match embedded {
                Embedded::Credential(credential) => Some(credential),
                Embedded::Presentation(_) => None,
            })
    }

    /// Return the W3C JSON representation of the presentation, with every
    /// embedded entry in its decoded form.
    pub fn to_json(&self) -> Json {
        serde_json::to_value(self)
            // SAFETY: see `Credential::to_json`.
            .unwrap()
    }
}

/// The proof of a value decoded from a JWT: the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtProof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub jwt: String,
}

impl JwtProof {
    pub fn new(jwt: impl Into<String>) -> Self {
        Self {
            proof_type: JWT_PROOF_TYPE.into(),
            jwt: jwt.into(),
        }
    }

    /// The algorithm the token was signed with, from its `alg` header.
    pub fn alg(&self) -> Option<String> {
        jwt::header_alg(&self.jwt).ok()
    }
}

/// An entry of a presentation's `verifiableCredential` array, once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Embedded {
    Presentation(Presentation),
    Credential(Credential),
}

/// The result of decoding a token of unknown kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Credential(Credential),
    Presentation(Presentation),
}

impl Decoded {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Credential(_) => "credential",
            Self::Presentation(_) => "presentation",
        }
    }
}

/// Proofs other than a [JwtProof], e.g. linked-data proofs, are dropped.
fn jwt_proof<'de, D>(deserializer: D) -> Result<Option<JwtProof>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Json>::deserialize(deserializer)?.and_then(|proof| {
        JwtProof::deserialize(proof)
            .ok()
            .filter(|proof| proof.proof_type == JWT_PROOF_TYPE)
    }))
}

/// `issuer` may be a plain identifier or an object carrying an `id`.
fn issuer_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Issuer {
        Id(String),
        Object { id: String },
    }

    Ok(match Issuer::deserialize(deserializer)? {
        Issuer::Id(id) | Issuer::Object { id } => id,
    })
}
