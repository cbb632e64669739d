use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::schema::strict_schema;
use crate::responses::TextFormat;

/// Strict `json_schema` text format derived from a Rust type
pub fn json_schema_format<T: JsonSchema>(name: &str) -> TextFormat {
    TextFormat::JsonSchema {
        name: name.to_string(),
        schema: schema_of::<T>(),
        strict: true,
    }
}

/// Strict JSON schema of a Rust type
pub fn schema_of<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    strict_schema(serde_json::to_value(schema).unwrap_or_default())
}

/// Reply of a request constrained by an output schema
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredReply<T> {
    Parsed(T),
    /// the model declined, either through provider refusal content or a
    /// payload flagged with `"refusal": true`
    Refusal(String),
}

impl<T: DeserializeOwned> StructuredReply<T> {
    /// Decode the output text of a structured request
    ///
    /// A refusal is never reported as a parse failure.
    pub fn decode(text: &str, refusal: Option<String>) -> Result<Self, serde_json::Error> {
        if let Some(refusal) = refusal {
            return Ok(StructuredReply::Refusal(refusal));
        }

        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if let Some(reason) = refusal_flag(&value) {
            return Ok(StructuredReply::Refusal(reason));
        }
        serde_json::from_value(value).map(StructuredReply::Parsed)
    }
}

impl<T> StructuredReply<T> {
    pub fn parsed(self) -> Option<T> {
        match self {
            StructuredReply::Parsed(value) => Some(value),
            StructuredReply::Refusal(_) => None,
        }
    }

    pub fn is_refusal(&self) -> bool {
        matches!(self, StructuredReply::Refusal(_))
    }
}

/// Reason carried by a payload flagged with `"refusal": true`
///
/// The reason is read from `refusal_reason` when present.
pub fn refusal_flag(value: &Value) -> Option<String> {
    if value.get("refusal").and_then(Value::as_bool) != Some(true) {
        return None;
    }

    Some(
        value
            .get("refusal_reason")
            .and_then(Value::as_str)
            .filter(|reason| !reason.is_empty())
            .unwrap_or("refused")
            .to_string(),
    )
}
