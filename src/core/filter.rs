use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Range keywords that may also carry a string bound, compared as a number or
/// as a date. Standard JSON Schema only accepts numeric bounds.
const RANGE_KEYWORDS: [(&str, fn(Ordering) -> bool); 4] = [
    ("minimum", Ordering::is_ge),
    ("maximum", Ordering::is_le),
    ("exclusiveMinimum", Ordering::is_gt),
    ("exclusiveMaximum", Ordering::is_lt),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid filter: {0}")]
    Invalid(String),
    #[error("{}", .0.join("; "))]
    Mismatch(Vec<String>),
    #[error("`{value}` violates {keyword} `{bound}`")]
    Range {
        keyword: &'static str,
        value: String,
        bound: String,
    },
    #[error("`{value}` cannot be compared with `{bound}`")]
    Incomparable { value: String, bound: String },
}

/// Filter is a JSON Schema descriptor used to evaluate the value returned by
/// a field's JsonPath expression.
///
/// Top-level range keywords (`minimum`, `maximum`, `exclusiveMinimum`,
/// `exclusiveMaximum`) may be strings, in which case the value is compared
/// numerically when both sides parse as numbers, and as dates otherwise.
///
/// For more information, see the field constraints filter property:
///
/// - [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
///
/// - [https://json-schema.org/understanding-json-schema](https://json-schema.org/understanding-json-schema)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Filter(Value);

impl Filter {
    pub fn new(schema: Value) -> Self {
        Self(schema)
    }

    /// Return the raw filter.
    pub fn schema(&self) -> &Value {
        &self.0
    }

    /// Compile the filter.
    ///
    /// # Errors
    ///
    /// If the filter is not a valid JSON Schema, this will return an error.
    pub fn validator(&self) -> Result<FilterValidator, FilterError> {
        let (schema, bounds) = match &self.0 {
            Value::Object(keywords) => split_string_bounds(keywords),
            schema => (schema.clone(), Vec::new()),
        };

        let schema =
            JSONSchema::compile(&schema).map_err(|e| FilterError::Invalid(e.to_string()))?;

        Ok(FilterValidator { schema, bounds })
    }

    /// Validate a single value. Compiles the filter on every call; use
    /// [Filter::validator] to check several values.
    pub fn validate(&self, value: &Value) -> Result<(), FilterError> {
        self.validator()?.validate(value)
    }
}

impl From<Value> for Filter {
    fn from(schema: Value) -> Self {
        Self::new(schema)
    }
}

/// A compiled [Filter].
pub struct FilterValidator {
    schema: JSONSchema,
    bounds: Vec<StringBound>,
}

#[derive(Debug)]
struct StringBound {
    keyword: &'static str,
    bound: String,
    satisfied: fn(Ordering) -> bool,
}

impl FilterValidator {
    pub fn validate(&self, value: &Value) -> Result<(), FilterError> {
        if let Err(errors) = self.schema.validate(value) {
            let errors: Vec<String> = errors
                .map(|error| {
                    tracing::debug!("Field did not pass filter validation: {error}");
                    error.to_string()
                })
                .collect();
            return Err(FilterError::Mismatch(errors));
        }

        for StringBound {
            keyword,
            bound,
            satisfied,
        } in &self.bounds
        {
            let ordering = compare(value, bound).ok_or_else(|| FilterError::Incomparable {
                value: display(value),
                bound: bound.clone(),
            })?;
            if !satisfied(ordering) {
                return Err(FilterError::Range {
                    keyword: *keyword,
                    value: display(value),
                    bound: bound.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Move string-valued range keywords out of the schema handed to `jsonschema`.
fn split_string_bounds(keywords: &Map<String, Value>) -> (Value, Vec<StringBound>) {
    let mut schema = keywords.clone();
    let mut bounds = Vec::new();

    for (keyword, satisfied) in RANGE_KEYWORDS {
        if let Some(Value::String(_)) = schema.get(keyword) {
            if let Some(Value::String(bound)) = schema.remove(keyword) {
                bounds.push(StringBound {
                    keyword,
                    bound,
                    satisfied,
                });
            }
        }
    }

    (Value::Object(schema), bounds)
}

fn compare(value: &Value, bound: &str) -> Option<Ordering> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .zip(bound.parse::<f64>().ok())
            .and_then(|(number, bound)| number.partial_cmp(&bound)),
        Value::String(s) => match (s.parse::<f64>(), bound.parse::<f64>()) {
            (Ok(number), Ok(bound)) => number.partial_cmp(&bound),
            _ => parse_date(s)
                .zip(parse_date(bound))
                .map(|(date, bound)| date.cmp(&bound)),
        },
        _ => None,
    }
}

/// An RFC 3339 date-time, or a full date taken as midnight UTC.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|date| date.and_utc())
        })
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        value => value.to_string(),
    }
}
