use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json_path::JsonPath;

use super::{
    credential_format::*, filter::Filter, presentation_definition::DefinitionError,
    status::StatusState,
};
use crate::utils::{last_segment, one_or_many, NonEmptyVec};

/// A GroupId represents a unique identifier for a group of Input Descriptors.
///
/// Groups are carried as data only; submission requirements are not evaluated.
pub type GroupId = String;

/// The predicate Feature introduces properties enabling Verifier to request that Holder apply a predicate and return the result.
///
/// The value of predicate **MUST** be one of the following strings: `required` or `preferred`.
///
/// See: [https://identity.foundation/presentation-exchange/#predicate-feature](https://identity.foundation/presentation-exchange/#predicate-feature)
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    /// The field must be present and satisfy its filter.
    Required,
    /// The field is evaluated, and a miss is only reported.
    Preferred,
}

/// The `required` / `preferred` directive shared by `limit_disclosure`,
/// `subject_is_issuer`, `is_holder` and `same_subject`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Required,
    Preferred,
}

/// Limited disclosure directive.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#limited-disclosure-submissions](https://identity.foundation/presentation-exchange/spec/v2.0.0/#limited-disclosure-submissions)
pub type ConstraintsLimitDisclosure = Preference;

/// A schema a credential may conform to.
///
/// A schema matches a credential type equal to its `uri`, or equal to the
/// last path or fragment segment of the `uri`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Schema {
    uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<bool>,
}

impl Schema {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            required: None,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    pub fn matches_type(&self, credential_type: &str) -> bool {
        self.uri == credential_type || last_segment(&self.uri) == credential_type
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum SchemaRepr {
            Uri(String),
            Object { uri: String, required: Option<bool> },
        }

        Ok(match SchemaRepr::deserialize(deserializer)? {
            SchemaRepr::Uri(uri) => Self::new(uri),
            SchemaRepr::Object { uri, required } => Self { uri, required },
        })
    }
}

/// Input Descriptors are objects used to describe the information a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a
/// [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// All Input Descriptors MUST be satisfied.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InputDescriptor {
    id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    schema: Vec<Schema>,
    #[serde(default)]
    constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    format: ClaimFormatMap,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    group: Vec<GroupId>,
}

impl InputDescriptor {
    /// Create a new instance of the input descriptor with the given id and constraints.
    ///
    /// The value of the id property MUST be a string that does not conflict with
    /// the id of another Input Descriptor Object in the same Presentation Definition.
    pub fn new(id: impl Into<String>, constraints: Constraints) -> Self {
        Self {
            id: id.into(),
            constraints,
            ..Default::default()
        }
    }

    /// Return the id of the input descriptor.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Return the constraints of the input descriptor.
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Accept credentials of the given schema.
    pub fn add_schema(mut self, schema: Schema) -> Self {
        self.schema.push(schema);
        self
    }

    /// Return the accepted schemas. Empty when any credential type is accepted.
    pub fn schema(&self) -> &[Schema] {
        &self.schema
    }

    /// Whether a credential with the given types conforms to one of the
    /// accepted schemas.
    pub fn accepts_types(&self, types: &[String]) -> bool {
        self.schema.is_empty()
            || self
                .schema
                .iter()
                .any(|schema| types.iter().any(|t| schema.matches_type(t)))
    }

    /// Set the name of the input descriptor.
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the purpose of the input descriptor.
    ///
    /// If present, the purpose MUST be a string that describes the purpose for which the
    /// [Claim](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:claim)'s
    /// data is being requested.
    pub fn set_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    /// Set the format of the input descriptor.
    ///
    /// This format property is identical in value signature to the top-level format object,
    /// but can be used to specifically constrain submission of a single input to a subset of formats.
    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> &ClaimFormatMap {
        &self.format
    }

    /// Return the format designations of the input descriptor as a hash set.
    pub fn format_designations(&self) -> HashSet<&ClaimFormatDesignation> {
        self.format.keys().collect()
    }

    pub fn set_group(mut self, group: Vec<GroupId>) -> Self {
        self.group = group;
        self
    }

    pub fn groups(&self) -> &[GroupId] {
        &self.group
    }

    /// Check the input descriptor is well formed.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let descriptor_id = || self.id.clone();

        if let Some(ConstraintsLimitDisclosure::Required) = self.constraints.limit_disclosure {
            if self.constraints.fields.is_empty() {
                return Err(DefinitionError::LimitDisclosureWithoutFields(
                    descriptor_id(),
                ));
            }
        }

        for field in self.constraints.fields.iter() {
            if field.predicate.is_some() && field.filter.is_none() {
                return Err(DefinitionError::PredicateWithoutFilter(descriptor_id()));
            }

            if let Some(filter) = &field.filter {
                filter
                    .validator()
                    .map(drop)
                    .map_err(|source| DefinitionError::InvalidFilter {
                        descriptor_id: descriptor_id(),
                        source,
                    })?;
            }
        }

        let field_ids: HashSet<&str> = self
            .constraints
            .fields
            .iter()
            .filter_map(ConstraintsField::id)
            .collect();
        for binding in self
            .constraints
            .is_holder
            .iter()
            .chain(&self.constraints.same_subject)
        {
            if let Some(field_id) = binding
                .field_id
                .iter()
                .find(|field_id| !field_ids.contains(field_id.as_str()))
            {
                return Err(DefinitionError::UnknownFieldId {
                    descriptor_id: descriptor_id(),
                    field_id: field_id.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<ConstraintsField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_disclosure: Option<ConstraintsLimitDisclosure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    statuses: Option<Statuses>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject_is_issuer: Option<Preference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    is_holder: Vec<HolderSubjectConstraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    same_subject: Vec<HolderSubjectConstraint>,
}

impl Constraints {
    /// Returns an empty Constraints object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new field constraint to the constraints list.
    pub fn add_constraint(mut self, field: ConstraintsField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[ConstraintsField] {
        &self.fields
    }

    pub fn set_limit_disclosure(mut self, limit_disclosure: ConstraintsLimitDisclosure) -> Self {
        self.limit_disclosure = Some(limit_disclosure);
        self
    }

    pub fn limit_disclosure(&self) -> Option<&ConstraintsLimitDisclosure> {
        self.limit_disclosure.as_ref()
    }

    /// Set the status directives.
    ///
    /// See: [https://identity.foundation/presentation-exchange/#credential-status-constraint-feature](https://identity.foundation/presentation-exchange/#credential-status-constraint-feature)
    pub fn set_statuses(mut self, statuses: Statuses) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn statuses(&self) -> Option<&Statuses> {
        self.statuses.as_ref()
    }

    pub fn set_subject_is_issuer(mut self, subject_is_issuer: Preference) -> Self {
        self.subject_is_issuer = Some(subject_is_issuer);
        self
    }

    pub fn subject_is_issuer(&self) -> Option<&Preference> {
        self.subject_is_issuer.as_ref()
    }

    /// Require the subject of the credential to be the holder of the
    /// presentation.
    ///
    /// See: [https://identity.foundation/presentation-exchange/#holder-and-subject-binding](https://identity.foundation/presentation-exchange/#holder-and-subject-binding)
    pub fn add_is_holder(mut self, constraint: HolderSubjectConstraint) -> Self {
        self.is_holder.push(constraint);
        self
    }

    pub fn is_holder(&self) -> &[HolderSubjectConstraint] {
        &self.is_holder
    }

    pub fn add_same_subject(mut self, constraint: HolderSubjectConstraint) -> Self {
        self.same_subject.push(constraint);
        self
    }

    pub fn same_subject(&self) -> &[HolderSubjectConstraint] {
        &self.same_subject
    }

    /// Whether any field constraint must be satisfied.
    pub fn is_required(&self) -> bool {
        self.fields.iter().any(|field| field.is_required())
    }
}

/// A directive on one lifecycle state of a credential.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusDirective {
    /// The credential must be in this state.
    Required,
    Allowed,
    /// The credential must not be in this state.
    Disallowed,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusConstraint {
    pub directive: StatusDirective,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statuses {
    #[serde(skip_serializing_if = "Option::is_none")]
    active: Option<StatusConstraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suspended: Option<StatusConstraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revoked: Option<StatusConstraint>,
}

impl Statuses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, state: StatusState, directive: StatusDirective) -> Self {
        let constraint = Some(StatusConstraint { directive });
        match state {
            StatusState::Active => self.active = constraint,
            StatusState::Suspended => self.suspended = constraint,
            StatusState::Revoked => self.revoked = constraint,
        }
        self
    }

    /// Return the directive declared for `state`, if any.
    pub fn directive(&self, state: StatusState) -> Option<StatusDirective> {
        match state {
            StatusState::Active => self.active,
            StatusState::Suspended => self.suspended,
            StatusState::Revoked => self.revoked,
        }
        .map(|constraint| constraint.directive)
    }

    /// Return the states declared `required`.
    pub fn required_states(&self) -> Vec<StatusState> {
        StatusState::ALL
            .into_iter()
            .filter(|state| self.directive(*state) == Some(StatusDirective::Required))
            .collect()
    }

    /// Whether no directive is declared at all.
    pub fn is_empty(&self) -> bool {
        StatusState::ALL
            .into_iter()
            .all(|state| self.directive(state).is_none())
    }
}

/// A holder binding constraint, applied to the fields named by `field_id`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HolderSubjectConstraint {
    #[serde(default)]
    pub field_id: Vec<String>,
    pub directive: Preference,
}

impl HolderSubjectConstraint {
    pub fn new(field_id: Vec<String>, directive: Preference) -> Self {
        Self {
            field_id,
            directive,
        }
    }
}

/// A field constraint: one or more JSONPath expressions locating a value, and
/// an optional filter the value must satisfy.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConstraintsField {
    path: NonEmptyVec<JsonPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    predicate: Option<Predicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
}

pub type ConstraintsFields = Vec<ConstraintsField>;

impl From<NonEmptyVec<JsonPath>> for ConstraintsField {
    fn from(path: NonEmptyVec<JsonPath>) -> Self {
        Self {
            path,
            id: None,
            purpose: None,
            name: None,
            predicate: None,
            filter: None,
            optional: None,
        }
    }
}

impl ConstraintsField {
    /// Create a new field constraint with a single path.
    pub fn new(path: JsonPath) -> ConstraintsField {
        NonEmptyVec::new(path).into()
    }

    /// Add a path tried after the existing ones.
    pub fn add_path(mut self, path: JsonPath) -> Self {
        self.path.push(path);
        self
    }

    /// The paths of the field, in the order they are tried.
    pub fn path(&self) -> &NonEmptyVec<JsonPath> {
        &self.path
    }

    pub fn set_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn set_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Whether a miss on this field fails the input descriptor.
    ///
    /// A `predicate` takes precedence over the `optional` flag.
    pub fn is_required(&self) -> bool {
        match self.predicate {
            Some(Predicate::Required) => true,
            Some(Predicate::Preferred) => false,
            None => !self.is_optional(),
        }
    }

    /// A label for the field in error messages: its id, or its first path.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self.path[0].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn descriptor(value: serde_json::Value) -> InputDescriptor {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_full_descriptor() {
        let descriptor = descriptor(json!({
            "id": "kycaml_input",
            "name": "Proof of KYC",
            "purpose": "Please provide a valid credential from a KYC/AML issuer",
            "schema": [{
                "uri": "https://verite.id/definitions/schemas/0.0.1/KYCAMLAttestation",
                "required": true
            }],
            "group": "A",
            "constraints": {
                "statuses": {
                    "active": { "directive": "required" }
                },
                "is_holder": [{
                    "field_id": ["subjectId"],
                    "directive": "required"
                }],
                "fields": [
                    {
                        "id": "subjectId",
                        "path": ["$.credentialSubject.id"]
                    },
                    {
                        "path": [
                            "$.credentialSubject.KYCAMLAttestation.process",
                            "$.vc.credentialSubject.KYCAMLAttestation.process"
                        ],
                        "purpose": "The KYC/AML Attestation requires the field: 'process'.",
                        "predicate": "required",
                        "filter": { "type": "string" }
                    }
                ]
            }
        }));

        assert_eq!(descriptor.id(), "kycaml_input");
        assert_eq!(descriptor.groups(), ["A"]);
        assert!(descriptor.schema()[0].is_required());
        assert!(descriptor.accepts_types(&["VerifiableCredential".into(), "KYCAMLAttestation".into()]));
        assert!(!descriptor.accepts_types(&["VerifiableCredential".into()]));

        let constraints = descriptor.constraints();
        assert_eq!(constraints.fields().len(), 2);
        assert_eq!(constraints.fields()[1].path().len(), 2);
        assert_eq!(
            constraints
                .statuses()
                .and_then(|statuses| statuses.directive(StatusState::Active)),
            Some(StatusDirective::Required)
        );
        assert_eq!(constraints.is_holder()[0].directive, Preference::Required);
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn schema_as_plain_uri() {
        let descriptor = descriptor(json!({
            "id": "degree",
            "schema": ["https://example.com/schemas#UniversityDegree"]
        }));

        assert!(descriptor.accepts_types(&["UniversityDegree".into()]));
        assert!(!descriptor.schema()[0].is_required());
    }

    #[test]
    fn empty_schema_list_accepts_any_type() {
        let descriptor = descriptor(json!({ "id": "anything", "schema": [] }));

        assert!(descriptor.schema().is_empty());
        assert!(descriptor.accepts_types(&["VerifiableCredential".into()]));
        assert!(descriptor.accepts_types(&[
            "VerifiableCredential".into(),
            "EmploymentCredential".into()
        ]));
        assert!(descriptor.accepts_types(&[]));
    }

    #[test]
    fn invalid_json_path_is_rejected() {
        let result = serde_json::from_value::<InputDescriptor>(json!({
            "id": "broken",
            "constraints": { "fields": [{ "path": ["$.credentialSubject["] }] }
        }));

        assert!(result.is_err());
    }

    #[test]
    fn field_requirement() {
        let path = JsonPath::parse("$.credentialSubject.id").unwrap();

        assert!(ConstraintsField::new(path.clone()).is_required());
        assert!(!ConstraintsField::new(path.clone())
            .set_optional(true)
            .is_required());
        assert!(ConstraintsField::new(path.clone())
            .set_optional(true)
            .set_predicate(Predicate::Required)
            .is_required());
        assert!(!ConstraintsField::new(path)
            .set_predicate(Predicate::Preferred)
            .is_required());
    }

    #[test]
    fn validation_rejects_ill_formed_descriptors() {
        let path = || JsonPath::parse("$.credentialSubject.id").unwrap();

        let limited = InputDescriptor::new(
            "limited",
            Constraints::new().set_limit_disclosure(ConstraintsLimitDisclosure::Required),
        );
        assert!(matches!(
            limited.validate(),
            Err(DefinitionError::LimitDisclosureWithoutFields(_))
        ));

        let predicate = InputDescriptor::new(
            "predicate",
            Constraints::new()
                .add_constraint(ConstraintsField::new(path()).set_predicate(Predicate::Required)),
        );
        assert!(matches!(
            predicate.validate(),
            Err(DefinitionError::PredicateWithoutFilter(_))
        ));

        let pattern = InputDescriptor::new(
            "pattern",
            Constraints::new().add_constraint(
                ConstraintsField::new(path())
                    .set_filter(Filter::new(json!({ "pattern": "[" }))),
            ),
        );
        assert!(matches!(
            pattern.validate(),
            Err(DefinitionError::InvalidFilter { .. })
        ));

        let binding = InputDescriptor::new(
            "binding",
            Constraints::new()
                .add_constraint(ConstraintsField::new(path()).set_id("subject"))
                .add_is_holder(HolderSubjectConstraint::new(
                    vec!["unknown".into()],
                    Preference::Required,
                )),
        );
        assert!(matches!(
            binding.validate(),
            Err(DefinitionError::UnknownFieldId { .. })
        ));
    }

    #[test]
    fn statuses() {
        let statuses = Statuses::new()
            .set(StatusState::Active, StatusDirective::Required)
            .set(StatusState::Revoked, StatusDirective::Disallowed);

        assert_eq!(statuses.required_states(), [StatusState::Active]);
        assert_eq!(
            statuses.directive(StatusState::Revoked),
            Some(StatusDirective::Disallowed)
        );
        assert_eq!(statuses.directive(StatusState::Suspended), None);
        assert!(!statuses.is_empty());
        assert!(Statuses::new().is_empty());
    }
}
