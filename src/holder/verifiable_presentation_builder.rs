use chrono::Utc;
use serde_json::{Map, Value as Json};

use crate::core::{
    codec::PresentationPayload,
    credential::{
        Credential, Jwt, Presentation, CREDENTIALS_V1_CONTEXT, VERIFIABLE_PRESENTATION_TYPE,
    },
    jwt::JwtClaims,
};

#[derive(Debug, Clone)]
pub struct VerifiablePresentationBuilderOptions {
    /// The holder presenting the credentials. Must be the identity of the
    /// signer the payload will be encoded with.
    pub holder: String,
    pub audience: Option<String>,
    pub nonce: Option<String>,
    /// Expiration is in seconds from `now`.
    /// e.g. 3600 for 1 hour.
    pub expiration_secs: Option<i64>,
    pub credentials: Vec<Jwt<Credential>>,
}

/// Builds the JWT payload of a Verifiable Presentation.
///
/// The payload is signed with [encode](crate::core::codec::encode), which
/// adds the `iss` and `iat` claims of the holder's signer.
#[derive(Debug, Clone)]
pub struct VerifiablePresentationBuilder {
    claims: JwtClaims,
    vp: Map<String, Json>,
    verifiable_credential: Vec<Json>,
}

impl VerifiablePresentationBuilder {
    /// Returns a builder for a presentation held by `holder`, with no
    /// embedded credentials.
    pub fn new(holder: impl Into<String>) -> Self {
        let holder = holder.into();

        let mut claims = JwtClaims::new();
        claims.insert("sub".into(), Json::String(holder.clone()));

        let mut vp = Map::new();
        vp.insert(
            "@context".into(),
            Json::Array(vec![CREDENTIALS_V1_CONTEXT.into()]),
        );
        vp.insert(
            "type".into(),
            Json::Array(vec![VERIFIABLE_PRESENTATION_TYPE.into()]),
        );
        vp.insert("holder".into(), Json::String(holder));

        Self {
            claims,
            vp,
            verifiable_credential: Vec::new(),
        }
    }

    /// Returns a presentation payload from options.
    ///
    /// The expiration date, if any, is counted from the current time.
    pub fn from_options(options: VerifiablePresentationBuilderOptions) -> PresentationPayload {
        let mut builder = Self::new(options.holder);

        if let Some(audience) = options.audience {
            builder = builder.add_audience(audience);
        }
        if let Some(nonce) = options.nonce {
            builder = builder.set_nonce(nonce);
        }
        if let Some(expiration_secs) = options.expiration_secs {
            builder = builder.set_expiration_date(Utc::now().timestamp() + expiration_secs);
        }

        options
            .credentials
            .into_iter()
            .fold(builder, Self::add_credential)
            .build()
    }

    /// Embed a signed credential.
    pub fn add_credential(mut self, credential: Jwt<Credential>) -> Self {
        self.verifiable_credential
            .push(Json::String(credential.into_string()));
        self
    }

    /// Embed a signed presentation, for presentation-within-presentation
    /// submissions.
    pub fn add_presentation(mut self, presentation: Jwt<Presentation>) -> Self {
        self.verifiable_credential
            .push(Json::String(presentation.into_string()));
        self
    }

    /// Add an audience to the verifiable presentation.
    /// The audience is the entity to which the verifiable presentation is addressed.
    /// This is typically the verifier of the verifiable presentation.
    pub fn add_audience(mut self, audience: impl Into<String>) -> Self {
        self.claims
            .insert("aud".into(), Json::String(audience.into()));
        self
    }

    pub fn set_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.claims.insert("nonce".into(), Json::String(nonce.into()));
        self
    }

    /// Set the issuance date of the verifiable presentation.
    pub fn set_issuance_date(mut self, issuance_date: i64) -> Self {
        self.claims.insert("iat".into(), issuance_date.into());
        self
    }

    /// Set the expiration date of the verifiable presentation.
    pub fn set_expiration_date(mut self, expiration_date: i64) -> Self {
        self.claims.insert("exp".into(), expiration_date.into());
        self
    }

    pub fn build(self) -> PresentationPayload {
        let Self {
            mut claims,
            mut vp,
            verifiable_credential,
        } = self;

        vp.insert(
            "verifiableCredential".into(),
            Json::Array(verifiable_credential),
        );
        claims.insert("vp".into(), Json::Object(vp));

        PresentationPayload(claims)
    }
}
