pub mod codec;
pub mod credential;
pub mod credential_format;
pub mod evaluator;
pub mod filter;
pub mod input_descriptor;
pub mod jwt;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod status;
