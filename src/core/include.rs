//! Eager-load paths and related-row attachment

use crate::core::field::{FieldValue, json_path};
use crate::core::model::Navigation;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// A dot-separated chain of navigations to load with the root entity
///
/// `"orders"` loads the entity's orders, `"orders.lines"` also loads the
/// lines of each order. Segments are resolved against the model catalog at
/// execution time.
pub struct IncludePath<T> {
    path: String,
    _entity: PhantomData<fn(&T)>,
}

impl<T> IncludePath<T> {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            _entity: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Navigation names along the path
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('.').filter(|s| !s.is_empty()).collect()
    }
}

impl<T> Clone for IncludePath<T> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<T> PartialEq for IncludePath<T> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl<T> fmt::Debug for IncludePath<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IncludePath").field(&self.path).finish()
    }
}

impl<T> From<&str> for IncludePath<T> {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl<T> From<String> for IncludePath<T> {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

/// Distinct, non-null `local_field` values of the parent rows
pub fn parent_keys(parents: &[Value], navigation: &Navigation) -> Vec<FieldValue> {
    let mut seen = HashMap::new();
    for parent in parents {
        let key = json_path(parent, &navigation.local_field)
            .map(FieldValue::from_json)
            .unwrap_or(FieldValue::Null);
        if !key.is_null() {
            seen.entry(key.key_string()).or_insert(key);
        }
    }
    let mut keys: Vec<FieldValue> = seen.into_values().collect();
    keys.sort_by(|a, b| a.sort_cmp(b));
    keys
}

/// Attach related rows to their parents under the navigation name
///
/// Collection navigations receive an array (possibly empty); reference
/// navigations receive the first matching row or `null`. Related rows keep
/// the order they were fetched in.
pub fn attach_related(parents: &mut [Value], navigation: &Navigation, related: Vec<Value>) {
    let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
    for row in related {
        let key = json_path(&row, &navigation.foreign_field)
            .map(FieldValue::from_json)
            .unwrap_or(FieldValue::Null);
        if key.is_null() {
            continue;
        }
        groups.entry(key.key_string()).or_default().push(row);
    }

    for parent in parents.iter_mut() {
        let key = json_path(parent, &navigation.local_field)
            .map(FieldValue::from_json)
            .unwrap_or(FieldValue::Null);
        let matched = if key.is_null() {
            Vec::new()
        } else {
            groups.get(&key.key_string()).cloned().unwrap_or_default()
        };

        let value = if navigation.many {
            Value::Array(matched)
        } else {
            matched.into_iter().next().unwrap_or(Value::Null)
        };

        if let Some(obj) = parent.as_object_mut() {
            obj.insert(navigation.name.clone(), value);
        }
    }
}
