//! Mapping types and helpers

use crate::error::ItemError;
use crate::types::{JsonObject, JsonValue};
use crate::window::{format_datetime, parse_upstream_datetime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row headed for a staging table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    /// Conflict key of the upsert
    pub natural_key: String,
    /// Mapped columns
    pub fields: JsonObject,
}

impl StagingRecord {
    /// Create a record from a key and a JSON object.
    ///
    /// Non-object values are stored under a single `value` field.
    pub fn new(natural_key: impl Into<String>, fields: JsonValue) -> Self {
        let fields = match fields {
            JsonValue::Object(map) => map,
            other => {
                let mut map = JsonObject::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            natural_key: natural_key.into(),
            fields,
        }
    }

    /// Field by name
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }
}

/// Maps one upstream payload to staging records
pub trait RecordMapper: Send + Sync {
    /// Map the payload fetched for `reference_id`
    fn map(&self, reference_id: &str, payload: &JsonValue)
        -> Result<Vec<StagingRecord>, ItemError>;
}

/// Plain function mapper
pub type MapFn = fn(&str, &JsonValue) -> Result<Vec<StagingRecord>, ItemError>;

impl<F> RecordMapper for F
where
    F: Fn(&str, &JsonValue) -> Result<Vec<StagingRecord>, ItemError> + Send + Sync,
{
    fn map(
        &self,
        reference_id: &str,
        payload: &JsonValue,
    ) -> Result<Vec<StagingRecord>, ItemError> {
        self(reference_id, payload)
    }
}

/// Upstream identifier, numeric for most entities, text for a few
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpstreamId {
    /// Numeric id
    Number(i64),
    /// Alphanumeric id
    Text(String),
}

impl UpstreamId {
    /// Id as a JSON value, preserving its original type
    pub fn to_json(&self) -> JsonValue {
        match self {
            UpstreamId::Number(n) => JsonValue::from(*n),
            UpstreamId::Text(s) => JsonValue::from(s.as_str()),
        }
    }

    /// Whether the id carries no information (`0` or blank)
    pub fn is_blank(&self) -> bool {
        match self {
            UpstreamId::Number(n) => *n == 0,
            UpstreamId::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for UpstreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamId::Number(n) => write!(f, "{n}"),
            UpstreamId::Text(s) => f.write_str(s),
        }
    }
}

/// Nested `{ "id": ... }` reference
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct IdRef {
    #[serde(default)]
    pub id: Option<UpstreamId>,
}

/// Id of an optional nested reference
pub(crate) fn ref_id(reference: &Option<IdRef>) -> JsonValue {
    reference
        .as_ref()
        .and_then(|r| r.id.as_ref())
        .filter(|id| !id.is_blank())
        .map_or(JsonValue::Null, UpstreamId::to_json)
}

/// Decode a payload into its typed shape
pub(crate) fn decode<T: DeserializeOwned>(payload: &JsonValue) -> Result<T, ItemError> {
    if !payload.is_object() {
        return Err(ItemError::malformed(format!(
            "expected an object, got {}",
            json_kind(payload)
        )));
    }
    Ok(T::deserialize(payload)?)
}

/// Natural key from a required id
pub(crate) fn require_id(id: &Option<UpstreamId>) -> Result<&UpstreamId, ItemError> {
    id.as_ref()
        .filter(|id| !id.is_blank())
        .ok_or_else(|| ItemError::mapping("payload has no id"))
}

/// Upstream date rendered in the staging format, null when blank
pub(crate) fn date_value(raw: &Option<String>) -> JsonValue {
    raw.as_deref()
        .and_then(parse_upstream_datetime)
        .map_or(JsonValue::Null, |dt| JsonValue::from(format_datetime(dt)))
}

pub(crate) fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
