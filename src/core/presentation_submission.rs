use std::collections::HashMap;

use super::credential_format::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath;

/// A DescriptorMapId is a unique identifier for a DescriptorMap.
pub type DescriptorMapId = String;

/// Presentation Submissions are objects embedded within target
/// [Claim](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:claim) negotiation
/// formats that express how the inputs presented as proofs to a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) are
/// provided in accordance with the requirements specified in a [PresentationDefinition](crate::core::presentation_definition::PresentationDefinition).
///
/// Embedded Presentation Submission objects MUST be located within target data format as
/// the value of a `presentation_submission` property.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    definition_id: String,
    descriptor_map: Vec<DescriptorMap>,
}

impl PresentationSubmission {
    /// The presentation submission object MUST contain a `definition_id` property.
    /// The value of this property MUST be the id value of a valid presentation definition.
    ///
    /// The object MUST include a `descriptor_map` property. The value of this property MUST be an array of
    /// Input [DescriptorMap] Objects.
    ///
    /// The submission is given a random UUID as its id.
    pub fn new(definition_id: impl Into<String>, descriptor_map: Vec<DescriptorMap>) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            definition_id: definition_id.into(),
            descriptor_map,
        }
    }

    /// Replace the generated id of the presentation submission.
    pub fn set_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Return the id of the presentation submission, if the holder set one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Return the definition id of the presentation submission.
    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    /// Return the descriptor map of the presentation submission.
    pub fn descriptor_map(&self) -> &[DescriptorMap] {
        &self.descriptor_map
    }

    /// Returns the descriptor map as a mapping of descriptor map id to descriptor map.
    ///
    /// The descriptor map id is expected to match the id of the input descriptor.
    /// This mapping is helpful for checking if an input descriptor has an associated descriptor map,
    /// using this mapping from the presentation submission.
    pub fn descriptor_map_by_id(&self) -> HashMap<&str, &DescriptorMap> {
        self.descriptor_map
            .iter()
            .map(|descriptor_map| (descriptor_map.id.as_str(), descriptor_map))
            .collect()
    }

    /// Return the first descriptor map id used more than once, if any.
    pub fn duplicate_descriptor_id(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.descriptor_map
            .iter()
            .map(|descriptor_map| descriptor_map.id.as_str())
            .find(|id| !seen.insert(*id))
    }
}

impl From<PresentationSubmission> for Json {
    fn from(value: PresentationSubmission) -> Self {
        serde_json::to_value(value)
            // SAFETY: by definition, a presentation submission has a valid
            //         JSON representation.
            .unwrap()
    }
}

/// Descriptor Maps are objects used to describe the information a
/// [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder) provides
/// to a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier).
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: DescriptorMapId,
    pub format: ClaimFormatDesignation,
    pub path: JsonPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<DescriptorMap>>,
}

impl DescriptorMap {
    /// Create a new instance of the descriptor map.
    ///
    /// The descriptor map object MUST include an `id` property. The value of this property MUST be a string that matches the `id` property of the [InputDescriptor](crate::core::input_descriptor::InputDescriptor) in the [PresentationDefinition](crate::core::presentation_definition::PresentationDefinition) that this [PresentationSubmission] is related to.
    ///
    /// The descriptor map object MUST include a `format` property. The value of this property MUST be a string that matches one of the [Claim Format Designation](ClaimFormatDesignation).
    ///
    /// The descriptor map object MUST include a `path` property. The value of this property MUST be a [JSONPath](https://goessner.net/articles/JsonPath/) string expression.
    pub fn new(
        id: impl Into<DescriptorMapId>,
        format: impl Into<ClaimFormatDesignation>,
        path: JsonPath,
    ) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            path,
            path_nested: None,
        }
    }

    /// Return the id of the descriptor map.
    pub fn id(&self) -> &DescriptorMapId {
        &self.id
    }

    /// Return the format of the descriptor map.
    pub fn format(&self) -> &ClaimFormatDesignation {
        &self.format
    }

    /// Return the path of the descriptor map.
    pub fn path(&self) -> &JsonPath {
        &self.path
    }

    /// Set the nested path of the descriptor map.
    ///
    /// The format of a path_nested object mirrors that of a [DescriptorMap] property. The nesting may be any number of levels deep.
    /// The `id` property MUST be the same for each level of nesting.
    ///
    /// > The path property inside each `path_nested` property provides a relative path within a given nested value.
    ///
    /// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#processing-of-submission-entries](https://identity.foundation/presentation-exchange/spec/v2.0.0/#processing-of-submission-entries)
    pub fn set_path_nested(mut self, mut path_nested: DescriptorMap) -> Self {
        // Ensure the nested path has the same id as the parent.
        path_nested.id.clone_from(&self.id);

        self.path_nested = Some(Box::new(path_nested));

        self
    }

    /// Locate the value this entry points at within `value`, following
    /// `path_nested`.
    ///
    /// Every path must select exactly one value.
    pub fn resolve<'s, 'v>(&'s self, value: &'v Json) -> Result<Resolved<'s, 'v>, PathError> {
        let nodes = self.path.query(value);
        let node = nodes.exactly_one().map_err(|_| PathError::Cardinality {
            path: self.path.to_string(),
            found: nodes.len(),
        })?;

        let Some(nested) = &self.path_nested else {
            return Ok(Resolved {
                entry: self,
                value: node,
                container: value,
            });
        };

        if !self.format.is_presentation() {
            return Err(PathError::NestingUnsupported(self.format.clone()));
        }
        if nested.id != self.id {
            return Err(PathError::NestedIdMismatch {
                parent: self.id.clone(),
                nested: nested.id.clone(),
            });
        }

        nested.resolve(node)
    }
}

/// The value a [DescriptorMap] points at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<'s, 'v> {
    /// The innermost entry, which describes `value`.
    pub entry: &'s DescriptorMap,
    pub value: &'v Json,
    /// The document the innermost path was evaluated against: the submitted
    /// presentation, or the nested presentation holding `value`.
    pub container: &'v Json,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path `{path}` selects {found} values, expected exactly one")]
    Cardinality { path: String, found: usize },
    #[error("`{0}` is not a presentation format, so it cannot carry a `path_nested`")]
    NestingUnsupported(ClaimFormatDesignation),
    #[error("nested descriptor id `{nested}` differs from its parent `{parent}`")]
    NestedIdMismatch { parent: String, nested: String },
    #[error("path `{path}` does not select a credential: {reason}")]
    NotACredential { path: String, reason: String },
}
