//! Entity descriptor and the value types that cross the DAO boundary.
//!
//! The DAO never inspects entity structure beyond its table, its primary key
//! field, and serde. Rows come back from the store as [`Record`] maps and are
//! turned into caller-owned snapshots by [`detach`]; field inputs go in as
//! [`FieldMap`] maps of [`FieldValue`]s.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::{DaoError, DaoResult};

/// Capability descriptor for a record type managed by a DAO.
///
/// Implementations are plain serde-able structs; no base class, no live store
/// association. The associated `Key` is the primary-key value type.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl Entity for User {
///     type Key = i64;
///     const TABLE: &'static str = "users";
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Primary-key value type.
    type Key: Into<FieldValue> + Clone + Send + Sync + 'static;

    /// Table backing this entity.
    const TABLE: &'static str;

    /// Primary key column name. Override if the key is not named `id`.
    fn key_field() -> &'static str {
        "id"
    }
}

/// A bindable scalar value for fields, filters, and keys.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(JsonValue),
}

impl FieldValue {
    /// Render this value as JSON (used when synthesizing records).
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Bool(v) => JsonValue::Bool(*v),
            FieldValue::Int(v) => JsonValue::Number((*v).into()),
            FieldValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Text(v) => JsonValue::String(v.clone()),
            FieldValue::Json(v) => v.clone(),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<uuid::Uuid> for FieldValue {
    fn from(v: uuid::Uuid) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for FieldValue {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        FieldValue::Text(v.to_rfc3339())
    }
}

impl From<JsonValue> for FieldValue {
    fn from(v: JsonValue) -> Self {
        FieldValue::Json(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// Ordered field name to value mapping for creates, updates, and filters.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A raw row as decoded from the store, keyed by column name.
pub type Record = serde_json::Map<String, JsonValue>;

/// Turn a raw record into a detached entity snapshot.
///
/// This is the detachment boundary: the returned value is an owned copy with
/// no association to the unit of work that produced it. Two snapshots of the
/// same logical row are independent; mutating one affects neither the store
/// nor the other.
pub fn detach<E: Entity>(record: Record) -> DaoResult<E> {
    serde_json::from_value(JsonValue::Object(record)).map_err(|e| {
        DaoError::decode(format!(
            "failed to detach row into {}: {}",
            std::any::type_name::<E>(),
            e
        ))
    })
}
