use serde::{Deserialize, Serialize};

use crate::core::{
    codec::DecodingError, credential_format::ClaimFormatDesignation,
    evaluator::ConstraintFailure, presentation_submission::PathError,
};

/// Machine-checkable classification of a rejected submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    MalformedInput,
    UnknownDefinition,
    DecodingError,
    MissingDescriptorMapEntry,
    UnexpectedDescriptorMapEntry,
    FormatMismatch,
    PathResolutionError,
    SchemaMismatch,
    Expired,
    StatusDisallowed,
    StatusRequired,
    StatusUnavailable,
    MissingRequiredField,
    FilterMismatch,
    HolderBindingMismatch,
    SubjectIsIssuerMismatch,
}

impl ConstraintFailure {
    pub fn code(&self) -> FailureCode {
        match self {
            Self::SchemaMismatch { .. } => FailureCode::SchemaMismatch,
            Self::Expired(_) => FailureCode::Expired,
            Self::StatusDisallowed(_) => FailureCode::StatusDisallowed,
            Self::StatusRequired { .. } => FailureCode::StatusRequired,
            Self::StatusUnavailable(_) => FailureCode::StatusUnavailable,
            Self::MissingRequiredField(_) => FailureCode::MissingRequiredField,
            Self::FilterMismatch { .. } => FailureCode::FilterMismatch,
            Self::HolderBindingMismatch { .. } => FailureCode::HolderBindingMismatch,
            Self::SubjectIsIssuerMismatch { .. } => FailureCode::SubjectIsIssuerMismatch,
        }
    }
}

/// The cause of a rejected submission.
#[derive(Debug, thiserror::Error)]
pub enum FailureReason {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("unknown presentation definition `{0}`")]
    UnknownDefinition(String),
    #[error(transparent)]
    Decoding(#[from] DecodingError),
    #[error("no descriptor map entry for input descriptor `{0}`")]
    MissingDescriptorMapEntry(String),
    #[error("descriptor map entry `{0}` names no input descriptor of the definition")]
    UnexpectedDescriptorMapEntry(String),
    #[error("input descriptor `{descriptor_id}` does not accept format `{format}`")]
    FormatMismatch {
        descriptor_id: String,
        format: ClaimFormatDesignation,
    },
    #[error("`{format}` tokens signed with `{alg}` are not accepted")]
    AlgorithmMismatch {
        descriptor_id: Option<String>,
        format: ClaimFormatDesignation,
        alg: String,
    },
    #[error("input descriptor `{descriptor_id}`: {source}")]
    PathResolution {
        descriptor_id: String,
        source: PathError,
    },
    #[error("input descriptor `{descriptor_id}`: {source}")]
    Constraint {
        descriptor_id: String,
        source: ConstraintFailure,
    },
}

impl FailureReason {
    pub fn code(&self) -> FailureCode {
        match self {
            Self::MalformedInput(_) => FailureCode::MalformedInput,
            Self::UnknownDefinition(_) => FailureCode::UnknownDefinition,
            Self::Decoding(_) => FailureCode::DecodingError,
            Self::MissingDescriptorMapEntry(_) => FailureCode::MissingDescriptorMapEntry,
            Self::UnexpectedDescriptorMapEntry(_) => FailureCode::UnexpectedDescriptorMapEntry,
            Self::FormatMismatch { .. } | Self::AlgorithmMismatch { .. } => {
                FailureCode::FormatMismatch
            }
            Self::PathResolution { .. } => FailureCode::PathResolutionError,
            Self::Constraint { source, .. } => source.code(),
        }
    }

    /// The input descriptor the failure is tagged with, if it concerns one.
    pub fn descriptor_id(&self) -> Option<&str> {
        match self {
            Self::MissingDescriptorMapEntry(descriptor_id)
            | Self::UnexpectedDescriptorMapEntry(descriptor_id)
            | Self::FormatMismatch { descriptor_id, .. }
            | Self::PathResolution { descriptor_id, .. }
            | Self::Constraint { descriptor_id, .. } => Some(descriptor_id),
            Self::AlgorithmMismatch { descriptor_id, .. } => descriptor_id.as_deref(),
            Self::MalformedInput(_) | Self::UnknownDefinition(_) | Self::Decoding(_) => None,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => {
                "Input doesn't have the required format for a presentation submission"
            }
            Self::UnknownDefinition(_) => {
                "This verifier doesn't accept submissions for the presentation definition"
            }
            Self::Decoding(_) => "Input wasn't a valid Verifiable Presentation",
            _ => "Submission does not satisfy the presentation definition",
        }
    }
}

/// A rejected submission: a human-readable message plus the typed reason.
#[derive(Debug, thiserror::Error)]
#[error("{message}: {reason}")]
pub struct ValidationError {
    message: String,
    #[source]
    reason: FailureReason,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            message: message.into(),
            reason,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn reason(&self) -> &FailureReason {
        &self.reason
    }

    pub fn code(&self) -> FailureCode {
        self.reason.code()
    }

    pub fn descriptor_id(&self) -> Option<&str> {
        self.reason.descriptor_id()
    }

    /// A serializable summary of the failure, for callers to report.
    pub fn failure_detail(&self) -> FailureDetail {
        FailureDetail {
            code: self.code(),
            descriptor_id: self.descriptor_id().map(ToOwned::to_owned),
            details: self.reason.to_string(),
        }
    }
}

impl From<FailureReason> for ValidationError {
    fn from(reason: FailureReason) -> Self {
        Self::new(reason.message(), reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub code: FailureCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor_id: Option<String>,
    pub details: String,
}
