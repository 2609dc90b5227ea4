use std::{collections::HashMap, fmt::Debug};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use chrono::Utc;
use p256::ecdsa::{signature::Signer as _, Signature, SigningKey};
use serde_json::{json, Map, Value as Json};
use ssi::jwk::JWK;

/// The claims of a JWT payload.
pub type JwtClaims = Map<String, Json>;

const ES256: &str = "ES256";

/// Signs JWT payloads on behalf of an issuer or holder.
#[async_trait]
pub trait JwtSigner: Debug {
    /// The identifier (usually a DID) of the signer, written into `iss`.
    fn id(&self) -> &str;
    /// The algorithm that will be used to sign.
    fn alg(&self) -> &str;
    /// Sign the claims, returning the compact serialization of the token.
    ///
    /// Implementations set `iss` to [JwtSigner::id] and `iat` when absent.
    async fn sign(&self, claims: JwtClaims) -> Result<String>;
}

/// Checks the signature of a JWT against the key of its issuer.
#[async_trait]
pub trait JwtVerifier: Debug {
    /// Verify the token and return its claims.
    ///
    /// Fails if the signature is invalid, the issuer key cannot be resolved,
    /// or the `vp.holder` of a presentation is not the signer.
    async fn verify(&self, token: &str) -> Result<JwtClaims>;
}

/// An ES256 signer over a P-256 key.
#[derive(Debug)]
pub struct P256Signer {
    id: String,
    key: SigningKey,
    jwk: JWK,
}

impl P256Signer {
    pub fn new(id: impl Into<String>, key: SigningKey) -> Result<Self> {
        let pk: p256::PublicKey = key.verifying_key().into();
        let jwk = serde_json::from_str(&pk.to_jwk_string())?;
        Ok(Self {
            id: id.into(),
            key,
            jwk,
        })
    }

    /// The public JWK of the signer.
    pub fn jwk(&self) -> &JWK {
        &self.jwk
    }
}

#[async_trait]
impl JwtSigner for P256Signer {
    fn id(&self) -> &str {
        &self.id
    }

    fn alg(&self) -> &str {
        ES256
    }

    async fn sign(&self, mut claims: JwtClaims) -> Result<String> {
        claims.insert("iss".into(), Json::String(self.id.clone()));
        claims
            .entry("iat")
            .or_insert_with(|| Utc::now().timestamp().into());

        let header = json!({
            "alg": self.alg(),
            "typ": "JWT",
            "kid": self.id,
        });
        let header_b64: String =
            serde_json::to_vec(&header).map(|b| BASE64_URL_SAFE_NO_PAD.encode(b))?;
        let body_b64 = serde_json::to_vec(&claims).map(|b| BASE64_URL_SAFE_NO_PAD.encode(b))?;
        let payload = [header_b64.as_bytes(), b".", body_b64.as_bytes()].concat();
        let signature: Signature = self.key.sign(&payload);
        let signature_b64 = BASE64_URL_SAFE_NO_PAD.encode(signature.to_vec());
        Ok(format!("{header_b64}.{body_b64}.{signature_b64}"))
    }
}

/// Verifies ES256 tokens against a static map of issuer identifiers to keys.
///
/// A local key map, standing in for DID resolution. Not for production use!
#[derive(Debug, Clone, Default)]
pub struct P256Verifier {
    keys: HashMap<String, JWK>,
}

impl P256Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `jwk` for tokens issued by `id`.
    pub fn with_key(mut self, id: impl Into<String>, jwk: JWK) -> Self {
        self.keys.insert(id.into(), jwk);
        self
    }
}

#[async_trait]
impl JwtVerifier for P256Verifier {
    async fn verify(&self, token: &str) -> Result<JwtClaims> {
        let alg = header_alg(token)?;
        if alg != ES256 {
            bail!("token was signed with unsupported algorithm: {alg}")
        }

        let unverified = decode_unverified(token)?;
        let Some(Json::String(issuer)) = unverified.get("iss") else {
            bail!("'iss' was missing from jwt claims")
        };
        let jwk = self
            .keys
            .get(issuer)
            .with_context(|| format!("unable to resolve a key for issuer '{issuer}'"))?;

        let claims: JwtClaims = ssi::claims::jwt::decode_verify(token, jwk)
            .context("token signature could not be verified")?;

        if let Some(holder) = claims
            .get("vp")
            .and_then(|vp| vp.get("holder"))
            .and_then(Json::as_str)
        {
            if holder != issuer {
                bail!("presentation holder '{holder}' is not the signer '{issuer}'")
            }
        }

        tracing::debug!("verified token issued by {issuer}");

        Ok(claims)
    }
}

/// Decode the claims of a token without checking its signature.
///
/// Only useful for inspecting tokens; never trust the result.
pub fn decode_unverified(token: &str) -> Result<JwtClaims> {
    ssi::claims::jwt::decode_unverified::<JwtClaims>(token).context("unable to decode jwt claims")
}

/// Decode the header of a token without checking its signature.
pub fn decode_header(token: &str) -> Result<JwtClaims> {
    let (headers_b64, _, _) = ssi::claims::jws::split_jws(token)?;

    let headers_json_bytes = BASE64_URL_SAFE_NO_PAD
        .decode(headers_b64)
        .context("jwt headers were not valid base64url")?;

    serde_json::from_slice::<JwtClaims>(&headers_json_bytes)
        .context("jwt headers were not valid json")
}

/// The `alg` header of a token.
pub fn header_alg(token: &str) -> Result<String> {
    let Json::String(alg) = decode_header(token)?
        .remove("alg")
        .context("'alg' was missing from jwt headers")?
    else {
        bail!("'alg' header was not a string")
    };
    Ok(alg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(id: &str) -> P256Signer {
        P256Signer::new(id, SigningKey::random(&mut rand::thread_rng())).unwrap()
    }

    fn claims(value: Json) -> JwtClaims {
        match value {
            Json::Object(claims) => claims,
            _ => panic!("claims must be an object"),
        }
    }

    #[tokio::test]
    async fn sign_and_verify() {
        let signer = signer("did:example:issuer");
        let verifier = P256Verifier::new().with_key(signer.id(), signer.jwk().clone());

        let token = signer
            .sign(claims(json!({ "sub": "did:example:holder" })))
            .await
            .unwrap();
        let verified = verifier.verify(&token).await.unwrap();

        assert_eq!(verified["iss"], "did:example:issuer");
        assert_eq!(verified["sub"], "did:example:holder");
        assert!(verified["iat"].is_i64());
    }

    #[tokio::test]
    async fn unknown_issuer_is_rejected() {
        let signer = signer("did:example:issuer");
        let token = signer.sign(JwtClaims::new()).await.unwrap();

        let error = P256Verifier::new().verify(&token).await.unwrap_err();
        assert!(error.to_string().contains("did:example:issuer"));
    }

    #[tokio::test]
    async fn tampered_payload_is_rejected() {
        let signer = signer("did:example:issuer");
        let verifier = P256Verifier::new().with_key(signer.id(), signer.jwk().clone());
        let token = signer
            .sign(claims(json!({ "sub": "did:example:holder" })))
            .await
            .unwrap();

        let mut forged = decode_unverified(&token).unwrap();
        forged.insert("sub".into(), "did:example:mallory".into());
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_payload = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        parts[1] = &forged_payload;

        assert!(verifier.verify(&parts.join(".")).await.is_err());
    }

    #[tokio::test]
    async fn holder_must_be_the_signer() {
        let signer = signer("did:example:holder");
        let verifier = P256Verifier::new().with_key(signer.id(), signer.jwk().clone());
        let token = signer
            .sign(claims(json!({ "vp": { "holder": "did:example:someone-else" } })))
            .await
            .unwrap();

        assert!(verifier.verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn header_names_the_algorithm() {
        let signer = signer("did:example:issuer");
        let token = signer.sign(JwtClaims::new()).await.unwrap();

        assert_eq!(header_alg(&token).unwrap(), "ES256");
        assert_eq!(decode_header(&token).unwrap()["kid"], "did:example:issuer");
    }

    #[tokio::test]
    async fn other_algorithms_are_rejected() {
        let signer = signer("did:example:issuer");
        let verifier = P256Verifier::new().with_key(signer.id(), signer.jwk().clone());
        let token = signer.sign(JwtClaims::new()).await.unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let header = BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"EdDSA","typ":"JWT"}"#);
        parts[0] = &header;

        let error = verifier.verify(&parts.join(".")).await.unwrap_err();
        assert!(error.to_string().contains("EdDSA"));
    }

    #[test]
    fn not_a_token() {
        assert!(decode_unverified("not-a-token").is_err());
        assert!(decode_unverified("a.b.c").is_err());
    }
}
