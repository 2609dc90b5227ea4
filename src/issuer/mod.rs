pub mod verifiable_credential_builder;

pub use verifiable_credential_builder::VerifiableCredentialBuilder;
