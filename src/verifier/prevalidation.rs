use serde::Deserialize;
use serde_json::Value as Json;

use super::error::FailureReason;
use crate::core::{
    credential::{Jwt, Presentation},
    presentation_submission::PresentationSubmission,
};

const PRESENTATION_SUBMISSION: &str = "presentation_submission";
const PRESENTATION: &str = "presentation";

/// A raw submission whose shape has been checked, before anything is decoded.
#[derive(Debug, Clone)]
pub struct PreValidated {
    pub submission: PresentationSubmission,
    pub presentation: Jwt<Presentation>,
}

/// Check that `raw` is an object carrying a well-formed presentation
/// submission and a presentation token.
pub fn prevalidate(raw: &Json) -> Result<PreValidated, FailureReason> {
    let Some(object) = raw.as_object() else {
        return Err(FailureReason::MalformedInput(
            "input is not a JSON object".into(),
        ));
    };

    let missing: Vec<_> = [PRESENTATION_SUBMISSION, PRESENTATION]
        .into_iter()
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(FailureReason::MalformedInput(format!(
            "missing {}",
            missing.join(", ")
        )));
    }

    let submission = PresentationSubmission::deserialize(&object[PRESENTATION_SUBMISSION])
        .map_err(|e| FailureReason::MalformedInput(format!("{PRESENTATION_SUBMISSION}: {e}")))?;

    if let Some(id) = submission.duplicate_descriptor_id() {
        return Err(FailureReason::MalformedInput(format!(
            "descriptor map id `{id}` is used more than once"
        )));
    }

    let Some(token) = object[PRESENTATION].as_str() else {
        return Err(FailureReason::MalformedInput(format!(
            "{PRESENTATION} is not a token string"
        )));
    };

    Ok(PreValidated {
        submission,
        presentation: Jwt::new(token),
    })
}
