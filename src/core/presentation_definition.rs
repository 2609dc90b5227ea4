use super::credential_format::*;
use super::filter::FilterError;
use super::input_descriptor::*;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("presentation definition `{0}` has no input descriptors")]
    NoInputDescriptors(String),
    #[error("input descriptor id `{0}` is declared more than once")]
    DuplicateInputDescriptor(String),
    #[error("input descriptor `{0}` requires limited disclosure but declares no fields")]
    LimitDisclosureWithoutFields(String),
    #[error("input descriptor `{0}` declares a predicate without a filter")]
    PredicateWithoutFilter(String),
    #[error("input descriptor `{descriptor_id}` has an invalid filter: {source}")]
    InvalidFilter {
        descriptor_id: String,
        source: FilterError,
    },
    #[error("input descriptor `{descriptor_id}` binds the holder to unknown field `{field_id}`")]
    UnknownFieldId {
        descriptor_id: String,
        field_id: String,
    },
}

/// A presentation definition is a JSON object that describes the information a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// > Presentation Definitions are objects that articulate what proofs a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires.
/// > These help the [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) to decide how or whether to interact with a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// Every input descriptor of the definition must be satisfied; `submission_requirements`
/// are not evaluated.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    format: ClaimFormatMap,
}

impl PresentationDefinition {
    /// The Presentation Definition MUST contain an id property. The value of this property MUST be a string.
    /// The string SHOULD provide a unique ID for the desired context.
    ///
    /// The Presentation Definition MUST contain an input_descriptors property. Its value MUST be an array of Input Descriptor Objects,
    /// the composition of which are found [InputDescriptor] type.
    pub fn new(id: impl Into<String>, input_descriptor: InputDescriptor) -> Self {
        Self {
            id: id.into(),
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    /// Return the id of the presentation definition.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a new input descriptor to the presentation definition.
    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    /// Return the input descriptors of the presentation definition, in the
    /// order they are evaluated.
    pub fn input_descriptors(&self) -> &[InputDescriptor] {
        &self.input_descriptors
    }

    /// Return the input descriptors as a map of their ids.
    pub fn input_descriptors_map(&self) -> HashMap<&str, &InputDescriptor> {
        self.input_descriptors
            .iter()
            .map(|input_descriptor| (input_descriptor.id(), input_descriptor))
            .collect()
    }

    /// Set the name of the presentation definition.
    ///
    /// The [PresentationDefinition] MAY contain a name property. If present, its value SHOULD be a
    /// human-friendly string intended to constitute a distinctive designation of the Presentation Definition.
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the purpose of the presentation definition.
    ///
    /// The [PresentationDefinition] MAY contain a purpose property. If present, its value MUST be a string that
    /// describes the purpose for which the Presentation Definition's inputs are being used for.
    pub fn set_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    /// Attach a [ClaimFormatMap] to the presentation definition.
    ///
    /// The Presentation Definition MAY include a format property. If present,
    /// the value MUST be an object with one or more properties matching the registered Claim Format Designations
    /// (e.g., jwt, jwt_vc, jwt_vp, etc.).
    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = format;
        self
    }

    /// Add a new format to the presentation definition.
    pub fn add_format(mut self, format: ClaimFormatDesignation, value: ClaimFormatPayload) -> Self {
        self.format.insert(format, value);
        self
    }

    /// Return the formats accepted for every input descriptor that does not
    /// declare its own.
    pub fn format(&self) -> &ClaimFormatMap {
        &self.format
    }

    /// Check the presentation definition and each of its input descriptors
    /// are well formed.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.input_descriptors.is_empty() {
            return Err(DefinitionError::NoInputDescriptors(self.id.clone()));
        }

        let mut seen = HashSet::new();
        for input_descriptor in self.input_descriptors.iter() {
            if !seen.insert(input_descriptor.id()) {
                return Err(DefinitionError::DuplicateInputDescriptor(
                    input_descriptor.id().to_owned(),
                ));
            }
            input_descriptor.validate()?;
        }

        Ok(())
    }

    /// Return the formats an input descriptor accepts: its own, else the
    /// definition's. An empty map accepts every credential format.
    pub fn accepted_formats<'a>(
        &'a self,
        input_descriptor: &'a InputDescriptor,
    ) -> &'a ClaimFormatMap {
        if input_descriptor.format().is_empty() {
            &self.format
        } else {
            input_descriptor.format()
        }
    }
}
