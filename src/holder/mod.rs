pub mod verifiable_presentation_builder;

pub use verifiable_presentation_builder::{
    VerifiablePresentationBuilder, VerifiablePresentationBuilderOptions,
};
