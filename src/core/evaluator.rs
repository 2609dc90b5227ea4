use chrono::{DateTime, Utc};
use serde_json::{json, Value as Json};

use super::{
    credential::Credential,
    filter::FilterError,
    input_descriptor::{
        Constraints, ConstraintsField, InputDescriptor, Preference, StatusDirective,
    },
    status::{StatusResolver, StatusState},
};

/// What a credential is evaluated against besides its input descriptor.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// The holder of the presentation the credential was submitted in.
    pub holder: &'a str,
    pub now: DateTime<Utc>,
    pub status_resolver: &'a (dyn StatusResolver + Send + Sync),
}

/// Why a credential does not satisfy an input descriptor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConstraintFailure {
    #[error("credential types {found:?} match none of the accepted schemas {expected:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("credential expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("credential status `{0}` is disallowed")]
    StatusDisallowed(StatusState),
    #[error("credential status `{required}` is required, but the credential is `{state}`")]
    StatusRequired {
        required: StatusState,
        state: StatusState,
    },
    #[error("credential status could not be resolved: {0}")]
    StatusUnavailable(String),
    #[error("no path of field `{0}` selects a value")]
    MissingRequiredField(String),
    #[error("field `{field}` does not satisfy its filter: {reason}")]
    FilterMismatch { field: String, reason: FilterError },
    #[error("credential subject `{subject}` is not the presentation holder `{holder}`")]
    HolderBindingMismatch { subject: String, holder: String },
    #[error("credential subject `{subject}` is not its issuer `{issuer}`")]
    SubjectIsIssuerMismatch { subject: String, issuer: String },
}

/// Evaluate the constraints of `descriptor` against `credential`.
///
/// Checks run in order: schema, expiration, status, fields, then holder
/// binding. The first failing check is returned.
pub async fn evaluate(
    descriptor: &InputDescriptor,
    credential: &Credential,
    context: &EvaluationContext<'_>,
) -> Result<(), ConstraintFailure> {
    check_schema(descriptor, credential)?;
    check_expiration(credential, context.now)?;

    let constraints = descriptor.constraints();
    check_status(constraints, credential, context.status_resolver).await?;
    check_fields(descriptor.id(), constraints.fields(), credential)?;
    check_holder_binding(constraints, credential, context.holder)
}

fn check_schema(
    descriptor: &InputDescriptor,
    credential: &Credential,
) -> Result<(), ConstraintFailure> {
    if descriptor.accepts_types(credential.types()) {
        return Ok(());
    }

    Err(ConstraintFailure::SchemaMismatch {
        expected: descriptor
            .schema()
            .iter()
            .map(|schema| schema.uri().to_owned())
            .collect(),
        found: credential.types().to_vec(),
    })
}

fn check_expiration(
    credential: &Credential,
    now: DateTime<Utc>,
) -> Result<(), ConstraintFailure> {
    match credential.expiration_date() {
        Some(expiration_date) if credential.is_expired_at(now) => {
            Err(ConstraintFailure::Expired(*expiration_date))
        }
        _ => Ok(()),
    }
}

async fn check_status(
    constraints: &Constraints,
    credential: &Credential,
    resolver: &(dyn StatusResolver + Send + Sync),
) -> Result<(), ConstraintFailure> {
    let Some(statuses) = constraints.statuses().filter(|statuses| !statuses.is_empty()) else {
        return Ok(());
    };

    let state = match credential.credential_status() {
        None => StatusState::Active,
        Some(status) => resolver
            .resolve(status)
            .await
            .map_err(|e| ConstraintFailure::StatusUnavailable(format!("{e:#}")))?,
    };

    if statuses.directive(state) == Some(StatusDirective::Disallowed) {
        return Err(ConstraintFailure::StatusDisallowed(state));
    }

    let required = statuses.required_states();
    if let Some(first) = required.first() {
        if !required.contains(&state) {
            return Err(ConstraintFailure::StatusRequired {
                required: *first,
                state,
            });
        }
    }

    Ok(())
}

fn check_fields(
    descriptor_id: &str,
    fields: &[ConstraintsField],
    credential: &Credential,
) -> Result<(), ConstraintFailure> {
    if fields.is_empty() {
        return Ok(());
    }

    let document = credential.to_json();
    // Paths may also be written against the JWT payload of the credential.
    let payload = json!({
        "iss": credential.issuer(),
        "sub": credential.subject(),
        "jti": credential.id(),
        "vc": &document,
    });

    for field in fields {
        match check_field(field, &document, &payload) {
            Ok(()) => {}
            Err(failure) if field.is_required() => {
                tracing::debug!("input descriptor {descriptor_id}: {failure}");
                return Err(failure);
            }
            Err(failure) => {
                tracing::debug!(
                    "input descriptor {descriptor_id}: ignoring non-required field: {failure}"
                );
            }
        }
    }

    Ok(())
}

/// The first path selecting anything decides the field.
fn check_field(
    field: &ConstraintsField,
    document: &Json,
    payload: &Json,
) -> Result<(), ConstraintFailure> {
    let selected = field.path().iter().find_map(|path| {
        let nodes = path.query(document);
        let nodes = if nodes.is_empty() { path.query(payload) } else { nodes };
        (!nodes.is_empty()).then(|| nodes.all())
    });

    let Some(values) = selected else {
        return Err(ConstraintFailure::MissingRequiredField(field.label()));
    };

    let Some(filter) = field.filter() else {
        return Ok(());
    };
    let validator = filter
        .validator()
        .map_err(|reason| ConstraintFailure::FilterMismatch {
            field: field.label(),
            reason,
        })?;

    let mut first_error = None;
    for value in values {
        match validator.validate(value) {
            Ok(()) => return Ok(()),
            Err(reason) => {
                first_error.get_or_insert(reason);
            }
        }
    }

    match first_error {
        Some(reason) => Err(ConstraintFailure::FilterMismatch {
            field: field.label(),
            reason,
        }),
        None => Ok(()),
    }
}

fn check_holder_binding(
    constraints: &Constraints,
    credential: &Credential,
    holder: &str,
) -> Result<(), ConstraintFailure> {
    let holder_binding_required = constraints
        .is_holder()
        .iter()
        .chain(constraints.same_subject())
        .any(|binding| binding.directive == Preference::Required);

    if holder_binding_required && credential.subject() != holder {
        return Err(ConstraintFailure::HolderBindingMismatch {
            subject: credential.subject().to_owned(),
            holder: holder.to_owned(),
        });
    }

    if constraints.subject_is_issuer() == Some(&Preference::Required)
        && credential.subject() != credential.issuer()
    {
        return Err(ConstraintFailure::SubjectIsIssuerMismatch {
            subject: credential.subject().to_owned(),
            issuer: credential.issuer().to_owned(),
        });
    }

    Ok(())
}
