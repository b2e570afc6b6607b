use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const PRIMARY_PROPERTY_VALUE: &str = "primaryPropertyValue";
pub const REFERENCED_USER_PROFILE_ID: &str = "referencedUserProfileId";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

pub const FIXED_FIELDS: [&str; 4] = [
    PRIMARY_PROPERTY_VALUE,
    REFERENCED_USER_PROFILE_ID,
    CREATED_AT,
    UPDATED_AT,
];

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// one custom-object record as returned by the records listing endpoint.
// values are kept as raw JSON because the upstream does not promise types
// for any of them; unknown top-level keys survive in `extra`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub primary_property_value: Value,
    #[serde(default)]
    pub referenced_user_profile_id: Value,
    #[serde(default)]
    pub created_at: Value,
    #[serde(default)]
    pub updated_at: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub property_values: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    /// Raw value behind a catalog field name, `None` when the record has no such value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        let value = match field {
            PRIMARY_PROPERTY_VALUE => &self.primary_property_value,
            REFERENCED_USER_PROFILE_ID => &self.referenced_user_profile_id,
            CREATED_AT => &self.created_at,
            UPDATED_AT => &self.updated_at,
            _ => return self.property_values.get(field),
        };
        if value.is_null() {
            None
        } else {
            Some(value)
        }
    }

    /// Display form of a field: empty for missing/null, strings verbatim,
    /// scalars via their JSON text, structured values as compact JSON.
    pub fn field_value(&self, field: &str) -> String {
        self.get(field).map(stringify_value).unwrap_or_default()
    }
}

pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

// body of a single records listing response
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub records: Vec<Record>,
    #[serde(default)]
    pub next_continuation_token: Option<String>,
}

impl RecordPage {
    /// The token to send for the following page, if the upstream reported one.
    pub fn next_token(&self) -> Option<&str> {
        self.next_continuation_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

pub fn is_temporal_field(field: &str) -> bool {
    field == CREATED_AT || field == UPDATED_AT
}

/// Ordered column names: the fixed fields first, then every property key in
/// first-seen order across the fetched set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldCatalog {
    fields: Vec<String>,
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self {
            fields: FIXED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl FieldCatalog {
    pub fn from_records(records: &[Record]) -> Self {
        let mut fields: Vec<String> = FIXED_FIELDS.iter().map(|f| f.to_string()).collect();
        let mut seen: HashSet<String> = fields.iter().cloned().collect();
        for record in records {
            for key in record.property_values.keys() {
                if seen.insert(key.clone()) {
                    fields.push(key.clone());
                }
            }
        }
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn first(&self) -> &str {
        self.fields
            .first()
            .map(|s| s.as_str())
            .unwrap_or(PRIMARY_PROPERTY_VALUE)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
