use core::fmt;
use std::{borrow::Cow, collections::HashMap, str::FromStr};

use serde::{Deserialize, Serialize};

const FORMAT_JWT: &str = "jwt";
const FORMAT_JWT_VC: &str = "jwt_vc";
const FORMAT_JWT_VP: &str = "jwt_vp";
const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";
const FORMAT_JWT_VP_JSON: &str = "jwt_vp_json";
const FORMAT_LDP_VC: &str = "ldp_vc";
const FORMAT_LDP_VP: &str = "ldp_vp";

/// A Json object of claim formats accepted by a definition or input descriptor.
pub type ClaimFormatMap = HashMap<ClaimFormatDesignation, ClaimFormatPayload>;

/// Algorithm or proof type restrictions attached to a claim format.
///
/// Algorithm lists are checked against the `alg` header of each submitted
/// token. Proof type lists only apply to linked-data proofs, which are never
/// checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimFormatPayload {
    #[serde(rename = "alg")]
    Alg(Vec<String>),
    #[serde(rename = "proof_type")]
    ProofType(Vec<String>),
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl ClaimFormatPayload {
    /// Whether a token signed with `alg` satisfies this restriction.
    pub fn accepts_alg(&self, alg: &str) -> bool {
        match self {
            Self::Alg(algs) => algs.iter().any(|a| a == alg),
            _ => true,
        }
    }
}

/// The claim format designation used by descriptor maps and `format` objects.
///
/// See the [claim format registry](https://identity.foundation/claim-format-registry/#registry).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClaimFormatDesignation {
    /// A JSON Web Token without a W3C payload profile.
    Jwt,
    /// A JWT carrying a W3C Verifiable Credential in its `vc` claim.
    JwtVc,
    /// A JWT carrying a W3C Verifiable Presentation in its `vp` claim.
    JwtVp,
    JwtVcJson,
    JwtVpJson,
    /// Linked-data proof credential. Only accepted when embedded credential
    /// objects are enabled, as the codec never checks linked-data proofs.
    LdpVc,
    LdpVp,
    /// Any other designation. Always rejected by the submission matcher.
    Other(String),
}

impl ClaimFormatDesignation {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_JWT => Self::Jwt,
            FORMAT_JWT_VC => Self::JwtVc,
            FORMAT_JWT_VP => Self::JwtVp,
            FORMAT_JWT_VC_JSON => Self::JwtVcJson,
            FORMAT_JWT_VP_JSON => Self::JwtVpJson,
            FORMAT_LDP_VC => Self::LdpVc,
            FORMAT_LDP_VP => Self::LdpVp,
            _ => Self::Other(name.into_owned()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Jwt => FORMAT_JWT,
            Self::JwtVc => FORMAT_JWT_VC,
            Self::JwtVp => FORMAT_JWT_VP,
            Self::JwtVcJson => FORMAT_JWT_VC_JSON,
            Self::JwtVpJson => FORMAT_JWT_VP_JSON,
            Self::LdpVc => FORMAT_LDP_VC,
            Self::LdpVp => FORMAT_LDP_VP,
            Self::Other(other) => other,
        }
    }

    /// Whether the format designates a credential submitted as a signed JWT.
    pub fn is_jwt_credential(&self) -> bool {
        matches!(self, Self::Jwt | Self::JwtVc | Self::JwtVcJson)
    }

    /// Whether the format designates a single credential, signed or embedded
    /// as a plain object.
    pub fn is_credential(&self) -> bool {
        self.is_jwt_credential() || matches!(self, Self::LdpVc)
    }

    /// Whether the format designates a presentation, i.e. a container that a
    /// `path_nested` descriptor can descend into.
    pub fn is_presentation(&self) -> bool {
        matches!(self, Self::JwtVp | Self::JwtVpJson | Self::LdpVp)
    }
}

impl From<&str> for ClaimFormatDesignation {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for ClaimFormatDesignation {
    fn from(value: String) -> Self {
        Self::from_name(Cow::Owned(value))
    }
}

impl FromStr for ClaimFormatDesignation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl fmt::Display for ClaimFormatDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for ClaimFormatDesignation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimFormatDesignation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn parses_format_map() {
        let value = json!({
            "jwt_vc": { "alg": ["ES256", "EdDSA"] },
            "jwt_vp": { "alg": ["ES256"] },
            "ldp_vc": { "proof_type": ["Ed25519Signature2018"] },
            "com.example.custom_vc": { "version": "1.0" }
        });

        let map: ClaimFormatMap = serde_json::from_value(value).unwrap();

        assert_eq!(
            map.get(&ClaimFormatDesignation::JwtVc),
            Some(&ClaimFormatPayload::Alg(vec!["ES256".into(), "EdDSA".into()]))
        );
        assert!(map.contains_key(&ClaimFormatDesignation::LdpVc));
        assert!(map.contains_key(&ClaimFormatDesignation::Other(
            "com.example.custom_vc".into()
        )));
    }

    #[test]
    fn alg_restrictions() {
        let algs = ClaimFormatPayload::Alg(vec!["ES256".into(), "EdDSA".into()]);
        assert!(algs.accepts_alg("EdDSA"));
        assert!(!algs.accepts_alg("RS256"));

        let proof_types = ClaimFormatPayload::ProofType(vec!["Ed25519Signature2018".into()]);
        assert!(proof_types.accepts_alg("ES256"));
    }

    #[test]
    fn format_kinds() {
        assert!(ClaimFormatDesignation::from("jwt_vc").is_jwt_credential());
        assert!(!ClaimFormatDesignation::from("jwt_vp").is_jwt_credential());
        assert!(ClaimFormatDesignation::from("jwt_vp").is_presentation());
        assert!(!ClaimFormatDesignation::from("ldp_vc").is_jwt_credential());
        assert!(ClaimFormatDesignation::from("ldp_vc").is_credential());
        assert!(!ClaimFormatDesignation::from("custom").is_credential());
        assert_eq!(ClaimFormatDesignation::JwtVpJson.to_string(), "jwt_vp_json");
    }
}
