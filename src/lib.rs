//! This library validates [Presentation Exchange] submissions of JWT
//! Verifiable Credentials and Presentations.
//!
//! [Presentation Exchange]: <https://identity.foundation/presentation-exchange/spec/v2.0.0/>
//!
//! # Verifier Usage
//!
//! A verifier registers the [`PresentationDefinition`]s it accepts, then
//! processes submissions with the [`Verifier`] type:
//!
//! ```ignore
//! use presentation_exchange::config::Config;
//! use presentation_exchange::core::jwt::P256Verifier;
//! use presentation_exchange::verifier::Verifier;
//!
//! let config = Config::from_path("verifier.json")?;
//! let verifier = Verifier::builder()
//!     .with_config(&config)?
//!     .with_jwt_verifier(Arc::new(P256Verifier::new().with_key(issuer_did, issuer_jwk)))
//!     .with_status_resolver(status_resolver)
//!     .build()?;
//!
//! // `{ "presentation_submission": { .. }, "presentation": "<jwt>" }`
//! match verifier.process(&request_body).await {
//!     Ok(processed) => {
//!         for binding in processed.bindings() {
//!             println!("{} -> {:?}", binding.descriptor_id(), binding.credential().types());
//!         }
//!     }
//!     Err(e) => return Err(Rejection(e.failure_detail())),
//! }
//! ```
//!
//! Every rejection carries a [`FailureCode`] and, when it concerns one, the
//! id of the failing input descriptor.
//!
//! [`PresentationDefinition`]: crate::core::presentation_definition::PresentationDefinition
//! [`Verifier`]: crate::verifier::Verifier
//! [`FailureCode`]: crate::verifier::error::FailureCode
//!
//! # Issuer and Holder Usage
//!
//! Credentials are built with the [`VerifiableCredentialBuilder`] and signed
//! with a [`JwtSigner`]. Holders wrap them in a presentation with the
//! [`VerifiablePresentationBuilder`]:
//!
//! ```ignore
//! use presentation_exchange::core::codec::encode;
//! use presentation_exchange::holder::VerifiablePresentationBuilder;
//! use presentation_exchange::issuer::VerifiableCredentialBuilder;
//!
//! let credential = encode(
//!     VerifiableCredentialBuilder::new("KYCAMLAttestation", holder_did, attestation).build(),
//!     &issuer_signer,
//! )
//! .await?;
//!
//! let presentation = encode(
//!     VerifiablePresentationBuilder::new(holder_did)
//!         .add_credential(credential)
//!         .build(),
//!     &holder_signer,
//! )
//! .await?;
//! ```
//!
//! [`VerifiableCredentialBuilder`]: crate::issuer::VerifiableCredentialBuilder
//! [`VerifiablePresentationBuilder`]: crate::holder::VerifiablePresentationBuilder
//! [`JwtSigner`]: crate::core::jwt::JwtSigner
//!
//! # Processing Overview
//!
//! 1. *Pre-validation*: the input must carry a well-formed
//!    `presentation_submission` and a `presentation` token.
//! 2. *Definition lookup*: the submission's `definition_id` must be registered.
//! 3. *Decoding*: the presentation and every credential it embeds are checked
//!    by the [`JwtVerifier`] and normalized by the [`Codec`].
//! 4. *Matching*: every input descriptor must be answered by exactly one
//!    descriptor map entry, whose path selects a credential that satisfies
//!    the descriptor's constraints.
//!
//! [`JwtVerifier`]: crate::core::jwt::JwtVerifier
//! [`Codec`]: crate::core::codec::Codec

pub mod config;
pub mod core;
pub mod holder;
pub mod issuer;
pub mod utils;
pub mod verifier;
pub use serde_json_path::JsonPath;
