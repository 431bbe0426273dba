//! Change tracking shared by the session backends

use crate::core::entity::{Entity, to_row};
use crate::core::error::{Result, StorageError};
use crate::core::field::{FieldValue, json_path};
use crate::core::model::EntityModel;
use crate::core::session::EntityState;
use indexmap::IndexMap;
use serde_json::Value;

/// One pending change
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tracked {
    pub entity_type: String,
    /// Key in [`FieldValue::key_string`] form
    pub key: String,
    pub state: EntityState,
    /// Row to write, navigations removed
    pub row: Value,
}

/// Pending changes in first-tracked order
///
/// State machine per (entity type, key):
/// - add: `Added`, or `Modified` when re-adding a row pending deletion
/// - modify: `Added` stays `Added`, anything else becomes `Modified`
/// - remove: `Added` is dropped, anything else becomes `Deleted`
#[derive(Debug, Default)]
pub(crate) struct ChangeTracker {
    entries: IndexMap<(String, String), Tracked>,
}

impl ChangeTracker {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn changes(&self) -> impl Iterator<Item = &Tracked> {
        self.entries.values()
    }

    pub fn snapshot(&self) -> Vec<Tracked> {
        self.entries.values().cloned().collect()
    }

    pub fn state(&self, entity_type: &str, key: &str) -> Option<EntityState> {
        self.entries
            .get(&(entity_type.to_string(), key.to_string()))
            .map(|t| t.state)
    }

    pub fn track_added(&mut self, entity_type: &str, key: String, row: Value) {
        let state = match self.state(entity_type, &key) {
            Some(EntityState::Deleted) => EntityState::Modified,
            _ => EntityState::Added,
        };
        self.put(entity_type, key, state, row);
    }

    pub fn track_modified(&mut self, entity_type: &str, key: String, row: Value) {
        let state = match self.state(entity_type, &key) {
            Some(EntityState::Added) => EntityState::Added,
            _ => EntityState::Modified,
        };
        self.put(entity_type, key, state, row);
    }

    pub fn track_removed(&mut self, entity_type: &str, key: String, row: Value) {
        let slot = (entity_type.to_string(), key);
        if let Some(EntityState::Added) = self.entries.get(&slot).map(|t| t.state) {
            self.entries.shift_remove(&slot);
            return;
        }
        self.put(entity_type, slot.1, EntityState::Deleted, row);
    }

    /// Highest integer key among pending rows of a type
    pub fn max_integer_key(&self, model: &EntityModel) -> i64 {
        self.entries
            .values()
            .filter(|t| t.entity_type == model.name)
            .filter_map(|t| json_path(&t.row, &model.key.field).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
    }

    /// Forget the given changes, keeping anything tracked since
    pub fn forget(&mut self, committed: &[Tracked]) {
        for change in committed {
            let slot = (change.entity_type.clone(), change.key.clone());
            if self.entries.get(&slot) == Some(change) {
                self.entries.shift_remove(&slot);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn put(&mut self, entity_type: &str, key: String, state: EntityState, row: Value) {
        self.entries.insert(
            (entity_type.to_string(), key.clone()),
            Tracked {
                entity_type: entity_type.to_string(),
                key,
                state,
                row,
            },
        );
    }
}

/// Row form of an entity with navigation properties removed
pub(crate) fn stored_row<T: Entity>(model: &EntityModel, entity: &T) -> Result<Value> {
    let mut row = to_row(entity)?;
    if let Some(obj) = row.as_object_mut() {
        for navigation in &model.navigations {
            obj.remove(&navigation.name);
        }
    }
    Ok(row)
}

/// Key value of a row; a missing or null key is an integrity error
pub(crate) fn row_key(model: &EntityModel, row: &Value) -> Result<FieldValue> {
    let key = json_path(row, &model.key.field)
        .map(FieldValue::from_json)
        .unwrap_or(FieldValue::Null);
    if key.is_null() {
        return Err(StorageError::IntegrityError {
            message: format!(
                "entity of type '{}' has no value for key '{}'",
                model.name, model.key.field
            ),
        }
        .into());
    }
    Ok(key)
}
