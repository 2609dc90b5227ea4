use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value as Json};

use super::error::{FailureReason, ValidationError};
use crate::core::{
    credential::{Credential, JwtProof, Presentation},
    credential_format::{ClaimFormatDesignation, ClaimFormatMap},
    evaluator::{self, EvaluationContext},
    input_descriptor::InputDescriptor,
    presentation_definition::PresentationDefinition,
    presentation_submission::{DescriptorMap, PathError, PresentationSubmission},
    status::StatusResolver,
};

static PRESENTATION_FORMATS: [ClaimFormatDesignation; 2] =
    [ClaimFormatDesignation::JwtVp, ClaimFormatDesignation::JwtVpJson];

/// A credential that satisfied an input descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    descriptor_id: String,
    credential: Credential,
}

impl Binding {
    pub fn descriptor_id(&self) -> &str {
        &self.descriptor_id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn into_credential(self) -> Credential {
        self.credential
    }
}

/// A submission that satisfied its presentation definition.
///
/// Bindings are in the order of the definition's input descriptors.
#[derive(Debug, Clone)]
pub struct ProcessedSubmission {
    definition_id: String,
    submission: PresentationSubmission,
    presentation: Presentation,
    bindings: Vec<Binding>,
}

impl ProcessedSubmission {
    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    pub fn submission(&self) -> &PresentationSubmission {
        &self.submission
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Return the credential bound to the input descriptor `descriptor_id`.
    pub fn credential_for(&self, descriptor_id: &str) -> Option<&Credential> {
        self.bindings
            .iter()
            .find(|binding| binding.descriptor_id == descriptor_id)
            .map(Binding::credential)
    }
}

/// Matches a decoded presentation against a definition, following the
/// submission's descriptor map.
pub(crate) struct Matcher<'a> {
    pub status_resolver: &'a (dyn StatusResolver + Send + Sync),
    pub now: DateTime<Utc>,
}

impl Matcher<'_> {
    /// The first failing input descriptor aborts the whole submission.
    pub async fn process(
        &self,
        submission: PresentationSubmission,
        presentation: Presentation,
        definition: &PresentationDefinition,
    ) -> Result<ProcessedSubmission, ValidationError> {
        if submission.definition_id() != definition.id() {
            return Err(FailureReason::UnknownDefinition(
                submission.definition_id().to_owned(),
            )
            .into());
        }

        let input_descriptors = definition.input_descriptors_map();
        if let Some(unexpected) = submission
            .descriptor_map()
            .iter()
            .find(|entry| !input_descriptors.contains_key(entry.id().as_str()))
        {
            return Err(
                FailureReason::UnexpectedDescriptorMapEntry(unexpected.id().clone()).into(),
            );
        }

        check_presentation_alg(definition.format(), presentation.proof(), None)?;

        let document = presentation.to_json();

        let entries = submission.descriptor_map_by_id();
        let mut bindings = Vec::with_capacity(definition.input_descriptors().len());
        for input_descriptor in definition.input_descriptors() {
            let Some(entry) = entries.get(input_descriptor.id()) else {
                return Err(FailureReason::MissingDescriptorMapEntry(
                    input_descriptor.id().to_owned(),
                )
                .into());
            };

            let Located { credential, holder } =
                locate_credential(definition, input_descriptor, entry, &document)?;

            // Holder binding is checked against the presentation that
            // directly carries the credential.
            let context = EvaluationContext {
                holder: holder.as_deref().unwrap_or(presentation.holder()),
                now: self.now,
                status_resolver: self.status_resolver,
            };

            let evaluation = evaluator::evaluate(input_descriptor, &credential, &context).await;
            if let Err(failure) = evaluation {
                tracing::warn!(
                    "input descriptor {} not satisfied: {failure}",
                    input_descriptor.id()
                );
                return Err(FailureReason::Constraint {
                    descriptor_id: input_descriptor.id().to_owned(),
                    source: failure,
                }
                .into());
            }

            tracing::debug!("input descriptor {} satisfied", input_descriptor.id());
            bindings.push(Binding {
                descriptor_id: input_descriptor.id().to_owned(),
                credential,
            });
        }

        Ok(ProcessedSubmission {
            definition_id: definition.id().to_owned(),
            submission,
            presentation,
            bindings,
        })
    }
}

struct Located {
    credential: Credential,
    /// Holder of the nested presentation the credential was found in.
    holder: Option<String>,
}

fn locate_credential(
    definition: &PresentationDefinition,
    input_descriptor: &InputDescriptor,
    entry: &DescriptorMap,
    document: &Json,
) -> Result<Located, FailureReason> {
    let descriptor_id = input_descriptor.id().to_owned();

    let mut terminal = entry;
    while let Some(nested) = &terminal.path_nested {
        terminal = nested.as_ref();
    }

    let accepted = definition.accepted_formats(input_descriptor);
    if !terminal.format().is_credential()
        || !(accepted.is_empty() || accepted.contains_key(terminal.format()))
    {
        return Err(FailureReason::FormatMismatch {
            descriptor_id,
            format: terminal.format().clone(),
        });
    }

    let path_resolution = |source| FailureReason::PathResolution {
        descriptor_id: descriptor_id.clone(),
        source,
    };

    // Paths may be written against the JWT payload of the presentation.
    let payload;
    let root = if entry.path().query(document).is_empty() {
        payload = json!({ "vp": document });
        &payload
    } else {
        document
    };

    let resolved = entry.resolve(root).map_err(path_resolution)?;

    let credential = Credential::deserialize(resolved.value).map_err(|e| {
        path_resolution(PathError::NotACredential {
            path: terminal.path().to_string(),
            reason: e.to_string(),
        })
    })?;

    if let (Some(alg), Some(payload)) = (
        credential.proof().and_then(JwtProof::alg),
        accepted.get(terminal.format()),
    ) {
        if !payload.accepts_alg(&alg) {
            return Err(FailureReason::AlgorithmMismatch {
                descriptor_id: Some(descriptor_id),
                format: terminal.format().clone(),
                alg,
            });
        }
    }

    let container = if std::ptr::eq(resolved.container, root) {
        None
    } else {
        Presentation::deserialize(resolved.container).ok()
    };
    if let Some(container) = &container {
        check_presentation_alg(
            definition.format(),
            container.proof(),
            Some(input_descriptor.id()),
        )?;
    }

    Ok(Located {
        credential,
        holder: container.map(|container| container.holder),
    })
}

/// A presentation token must be signed with an algorithm accepted by one of
/// the definition's presentation formats, when any are declared.
fn check_presentation_alg(
    formats: &ClaimFormatMap,
    proof: Option<&JwtProof>,
    descriptor_id: Option<&str>,
) -> Result<(), FailureReason> {
    let Some(alg) = proof.and_then(JwtProof::alg) else {
        return Ok(());
    };

    let mut declared = PRESENTATION_FORMATS
        .iter()
        .filter_map(|format| formats.get(format).map(|payload| (format, payload)))
        .peekable();
    let Some((format, _)) = declared.peek().copied() else {
        return Ok(());
    };

    if declared.any(|(_, payload)| payload.accepts_alg(&alg)) {
        Ok(())
    } else {
        Err(FailureReason::AlgorithmMismatch {
            descriptor_id: descriptor_id.map(ToOwned::to_owned),
            format: format.clone(),
            alg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::{
        credential_format::{ClaimFormatDesignation, ClaimFormatPayload},
        evaluator::ConstraintFailure,
        filter::{Filter, FilterError},
        input_descriptor::{
            Constraints, ConstraintsField, HolderSubjectConstraint, Preference, Schema,
        },
        status::MemoryStatusResolver,
    };
    use crate::verifier::error::FailureCode;
    use base64::prelude::*;
    use serde_json_path::JsonPath;

    const HOLDER: &str = "did:example:holder";

    fn credential(kind: &str, approved: bool) -> Json {
        json!({
            "type": ["VerifiableCredential", kind],
            "issuer": "did:example:issuer",
            "credentialSubject": {
                "id": HOLDER,
                kind: { "approved": approved }
            }
        })
    }

    fn presentation(credentials: Vec<Json>) -> Presentation {
        serde_json::from_value(json!({
            "type": ["VerifiablePresentation"],
            "holder": HOLDER,
            "verifiableCredential": credentials
        }))
        .unwrap()
    }

    fn descriptor(id: &str, kind: &str) -> InputDescriptor {
        let approved = ConstraintsField::new(
            JsonPath::parse(&format!("$.credentialSubject.{kind}.approved")).unwrap(),
        )
        .set_filter(Filter::new(json!({ "const": true })));
        InputDescriptor::new(id, Constraints::new().add_constraint(approved))
            .add_schema(Schema::new(format!("https://example.com/schemas/{kind}")))
    }

    /// An unsigned token whose header names `alg`.
    fn token_signed_with(alg: &str) -> String {
        let header = BASE64_URL_SAFE_NO_PAD.encode(json!({ "alg": alg }).to_string());
        format!("{header}.e30.c2ln")
    }

    fn jwt_proof(alg: &str) -> Json {
        json!({ "type": "JwtProof2020", "jwt": token_signed_with(alg) })
    }

    fn definition() -> PresentationDefinition {
        PresentationDefinition::new("PD", descriptor("kyc", "KYCAMLAttestation"))
            .add_input_descriptors(descriptor("credit", "CreditScoreAttestation"))
    }

    fn entry(id: &str, path: &str) -> DescriptorMap {
        DescriptorMap::new(id, "jwt_vc", JsonPath::parse(path).unwrap())
    }

    fn submission(entries: Vec<DescriptorMap>) -> PresentationSubmission {
        PresentationSubmission::new("PD", entries)
    }

    async fn run(
        submission: PresentationSubmission,
        presentation: Presentation,
        definition: &PresentationDefinition,
    ) -> Result<ProcessedSubmission, ValidationError> {
        let resolver = MemoryStatusResolver::new();
        Matcher {
            status_resolver: &resolver,
            now: Utc::now(),
        }
        .process(submission, presentation, definition)
        .await
    }

    fn both_credentials() -> Presentation {
        presentation(vec![
            credential("CreditScoreAttestation", true),
            credential("KYCAMLAttestation", true),
        ])
    }

    #[tokio::test]
    async fn bindings_follow_definition_order() {
        let submission = submission(vec![
            entry("credit", "$.verifiableCredential[0]"),
            entry("kyc", "$.verifiableCredential[1]"),
        ]);

        let processed = run(submission, both_credentials(), &definition())
            .await
            .unwrap();

        let ids: Vec<_> = processed
            .bindings()
            .iter()
            .map(Binding::descriptor_id)
            .collect();
        assert_eq!(ids, ["kyc", "credit"]);
        assert!(processed
            .credential_for("credit")
            .unwrap()
            .has_type("CreditScoreAttestation"));
    }

    #[tokio::test]
    async fn payload_paths_resolve() {
        let submission = submission(vec![
            entry("credit", "$.vp.verifiableCredential[0]"),
            entry("kyc", "$.vp.verifiableCredential[1]"),
        ]);

        assert!(run(submission, both_credentials(), &definition())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn missing_and_unexpected_entries() {
        let missing = submission(vec![entry("kyc", "$.verifiableCredential[1]")]);
        let error = run(missing, both_credentials(), &definition())
            .await
            .unwrap_err();
        assert_eq!(error.code(), FailureCode::MissingDescriptorMapEntry);
        assert_eq!(error.descriptor_id(), Some("credit"));

        let unexpected = submission(vec![
            entry("kyc", "$.verifiableCredential[1]"),
            entry("credit", "$.verifiableCredential[0]"),
            entry("employment", "$.verifiableCredential[0]"),
        ]);
        let error = run(unexpected, both_credentials(), &definition())
            .await
            .unwrap_err();
        assert_eq!(error.code(), FailureCode::UnexpectedDescriptorMapEntry);
    }

    #[tokio::test]
    async fn other_definition() {
        let submission = PresentationSubmission::new("other", vec![]);

        let error = run(submission, both_credentials(), &definition())
            .await
            .unwrap_err();
        assert_eq!(error.code(), FailureCode::UnknownDefinition);
    }

    #[tokio::test]
    async fn ambiguous_path() {
        let submission = submission(vec![
            entry("kyc", "$.verifiableCredential[*]"),
            entry("credit", "$.verifiableCredential[0]"),
        ]);

        let error = run(submission, both_credentials(), &definition())
            .await
            .unwrap_err();
        assert_eq!(error.code(), FailureCode::PathResolutionError);
        assert_eq!(error.descriptor_id(), Some("kyc"));
    }

    #[tokio::test]
    async fn path_must_select_a_credential() {
        let submission = submission(vec![
            entry("kyc", "$.holder"),
            entry("credit", "$.verifiableCredential[0]"),
        ]);

        assert!(matches!(
            run(submission, both_credentials(), &definition())
                .await
                .unwrap_err()
                .reason(),
            FailureReason::PathResolution {
                source: PathError::NotACredential { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn formats() {
        let definition = definition().add_format(
            ClaimFormatDesignation::JwtVcJson,
            ClaimFormatPayload::Alg(vec!["ES256".into()]),
        );
        let submission = submission(vec![
            entry("kyc", "$.verifiableCredential[1]"),
            entry("credit", "$.verifiableCredential[0]"),
        ]);

        let error = run(submission, both_credentials(), &definition)
            .await
            .unwrap_err();
        assert_eq!(error.code(), FailureCode::FormatMismatch);

        let presentation_format = self::submission(vec![DescriptorMap::new(
            "kyc",
            "jwt_vp",
            JsonPath::parse("$").unwrap(),
        )]);
        let error = run(presentation_format, both_credentials(), &self::definition())
            .await
            .unwrap_err();
        assert_eq!(error.code(), FailureCode::FormatMismatch);
    }

    #[tokio::test]
    async fn constraint_failures_are_tagged() {
        let presentation = presentation(vec![
            credential("CreditScoreAttestation", true),
            credential("KYCAMLAttestation", false),
        ]);
        let submission = submission(vec![
            entry("kyc", "$.verifiableCredential[1]"),
            entry("credit", "$.verifiableCredential[0]"),
        ]);

        let error = run(submission, presentation, &definition())
            .await
            .unwrap_err();

        assert_eq!(error.descriptor_id(), Some("kyc"));
        assert!(matches!(
            error.reason(),
            FailureReason::Constraint {
                source: ConstraintFailure::FilterMismatch {
                    reason: FilterError::Mismatch(_),
                    ..
                },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn credential_algorithms() {
        let definition = definition().add_format(
            ClaimFormatDesignation::JwtVc,
            ClaimFormatPayload::Alg(vec!["EdDSA".into()]),
        );
        let mut es256 = credential("KYCAMLAttestation", true);
        es256["proof"] = jwt_proof("ES256");
        let mut eddsa = credential("CreditScoreAttestation", true);
        eddsa["proof"] = jwt_proof("EdDSA");
        let submission = submission(vec![
            entry("kyc", "$.verifiableCredential[1]"),
            entry("credit", "$.verifiableCredential[0]"),
        ]);

        let error = run(
            submission.clone(),
            presentation(vec![eddsa.clone(), es256]),
            &definition,
        )
        .await
        .unwrap_err();
        assert_eq!(error.code(), FailureCode::FormatMismatch);
        assert!(matches!(
            error.reason(),
            FailureReason::AlgorithmMismatch { descriptor_id: Some(id), alg, .. }
                if id == "kyc" && alg == "ES256"
        ));

        let mut kyc = credential("KYCAMLAttestation", true);
        kyc["proof"] = jwt_proof("EdDSA");
        assert!(run(submission, presentation(vec![eddsa, kyc]), &definition)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn presentation_algorithms() {
        let mut presentation = both_credentials();
        presentation.proof = serde_json::from_value(jwt_proof("ES256")).unwrap();
        let submission = submission(vec![
            entry("kyc", "$.verifiableCredential[1]"),
            entry("credit", "$.verifiableCredential[0]"),
        ]);

        let eddsa_only = definition().add_format(
            ClaimFormatDesignation::JwtVp,
            ClaimFormatPayload::Alg(vec!["EdDSA".into()]),
        );
        let error = run(submission.clone(), presentation.clone(), &eddsa_only)
            .await
            .unwrap_err();
        assert_eq!(error.code(), FailureCode::FormatMismatch);
        assert_eq!(error.descriptor_id(), None);

        let either = eddsa_only.add_format(
            ClaimFormatDesignation::JwtVpJson,
            ClaimFormatPayload::Alg(vec!["ES256".into()]),
        );
        assert!(run(submission, presentation, &either).await.is_ok());
    }

    #[tokio::test]
    async fn nested_credentials_bind_to_their_presentation() {
        let subject = ConstraintsField::new(JsonPath::parse("$.credentialSubject.id").unwrap())
            .set_id("subject");
        let bound = InputDescriptor::new(
            "kyc",
            Constraints::new()
                .add_constraint(subject)
                .add_is_holder(HolderSubjectConstraint::new(
                    vec!["subject".into()],
                    Preference::Required,
                )),
        );
        let definition = PresentationDefinition::new("PD", bound);

        // A presentation by someone else, carrying a credential about HOLDER.
        let nested = json!({
            "type": ["VerifiablePresentation"],
            "holder": "did:example:mallory",
            "verifiableCredential": [credential("KYCAMLAttestation", true)]
        });
        let outer = presentation(vec![nested]);
        let nested_entry = DescriptorMap::new(
            "kyc",
            "jwt_vp",
            JsonPath::parse("$.verifiableCredential[0]").unwrap(),
        )
        .set_path_nested(entry("kyc", "$.verifiableCredential[0]"));

        let error = run(submission(vec![nested_entry]), outer, &definition)
            .await
            .unwrap_err();
        assert!(matches!(
            error.reason(),
            FailureReason::Constraint {
                source: ConstraintFailure::HolderBindingMismatch { holder, .. },
                ..
            } if holder == "did:example:mallory"
        ));

        let direct = presentation(vec![credential("KYCAMLAttestation", true)]);
        assert!(run(
            submission(vec![entry("kyc", "$.verifiableCredential[0]")]),
            direct,
            &definition
        )
        .await
        .is_ok());
    }
}
