//! Entity trait defining the core abstraction for all persisted types

use crate::core::error::Result;
use crate::core::field::{FieldValue, json_path};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Base trait for every type a repository manages.
///
/// An entity is a plain serde-serializable value. Its serialized JSON object
/// is the row form sessions store and query; `entity_name` ties the Rust type
/// to its registration in the [`ModelCatalog`](crate::core::model::ModelCatalog).
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Debug, Serialize, Deserialize)]
/// struct Person {
///     id: i64,
///     name: String,
///     age: i64,
///     #[serde(default)]
///     orders: Vec<Order>,
/// }
///
/// impl Entity for Person {
///     fn entity_name() -> &'static str {
///         "person"
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The name this type is registered under in the model catalog
    fn entity_name() -> &'static str;

    /// Get the value of a field by (dot-separated) path
    ///
    /// The default implementation serializes the entity and walks the path.
    /// Override it with a direct `match` for hot paths.
    fn field_value(&self, path: &str) -> Option<FieldValue> {
        let row = serde_json::to_value(self).ok()?;
        json_path(&row, path).map(FieldValue::from_json)
    }
}

/// Serialize an entity into its row form
pub fn to_row<T: Entity>(entity: &T) -> Result<Value> {
    Ok(serde_json::to_value(entity)?)
}

/// Rebuild an entity from its row form
pub fn from_row<T: Entity>(row: Value) -> Result<T> {
    Ok(serde_json::from_value(row)?)
}

/// Return a copy of `entity` with a top-level field replaced
///
/// Used by sessions to write generated keys back into the tracked instance.
pub fn with_field<T: Entity>(entity: &T, field: &str, value: &FieldValue) -> Result<T> {
    let mut row = to_row(entity)?;
    if let Some(obj) = row.as_object_mut() {
        obj.insert(field.to_string(), value.to_json());
    }
    from_row(row)
}
