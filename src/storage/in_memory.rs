//! In-memory session for testing and development
//!
//! Rows are kept as JSON objects per entity type, in insertion order. Pending
//! changes live in a change tracker until `save_changes` applies them all to
//! a staged copy of the store and swaps it in, so a failing change leaves
//! both the store and the tracker exactly as they were.

use crate::core::entity::{Entity, from_row, with_field};
use crate::core::error::{RepositoryError, Result, StorageError};
use crate::core::field::{FieldValue, json_path};
use crate::core::include::{attach_related, parent_keys};
use crate::core::model::{EntityModel, KeyGeneration, ModelCatalog};
use crate::core::ordering::OrderingDirection;
use crate::core::query::QueryPlan;
use crate::core::session::{EntityState, Session};
use crate::storage::tracker::{ChangeTracker, Tracked, row_key, stored_row};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BACKEND: &str = "in_memory";

/// Committed rows of one entity type, keyed by key string
type Table = IndexMap<String, Value>;

#[derive(Debug, Clone, Default)]
struct Store {
    tables: HashMap<String, Table>,
}

impl Store {
    fn table(&self, entity_type: &str) -> Option<&Table> {
        self.tables.get(entity_type)
    }

    fn contains(&self, entity_type: &str, key: &str) -> bool {
        self.table(entity_type).is_some_and(|t| t.contains_key(key))
    }

    fn max_integer_key(&self, model: &EntityModel) -> i64 {
        self.table(&model.name)
            .into_iter()
            .flat_map(|t| t.values())
            .filter_map(|row| json_path(row, &model.key.field).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
    }
}

/// Change-tracking session over an in-process row store
///
/// Cloning shares the committed store but not the change tracker, so each
/// clone is its own unit of work over the same data.
///
/// # Example
///
/// ```rust,ignore
/// let session = Arc::new(InMemorySession::new(catalog));
/// let people = Repository::<Person, _>::builder(session.clone())
///     .conventions()
///     .build();
///
/// people.add(Person::new("Ann", 30))?;
/// people.save_changes()?;
/// ```
pub struct InMemorySession {
    catalog: Arc<ModelCatalog>,
    store: Arc<RwLock<Store>>,
    sequences: Arc<Mutex<HashMap<String, i64>>>,
    tracker: Mutex<ChangeTracker>,
}

impl InMemorySession {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            store: Arc::new(RwLock::new(Store::default())),
            sequences: Arc::new(Mutex::new(HashMap::new())),
            tracker: Mutex::new(ChangeTracker::default()),
        }
    }

    /// Number of pending changes
    pub fn pending_changes(&self) -> Result<usize> {
        Ok(self.lock_tracker()?.len())
    }

    /// Number of committed rows of an entity type
    pub fn row_count(&self, entity_type: &str) -> Result<usize> {
        Ok(self.read_store()?.table(entity_type).map_or(0, |t| t.len()))
    }

    fn read_store(&self) -> Result<std::sync::RwLockReadGuard<'_, Store>> {
        self.store.read().map_err(|e| lock_error("read", e))
    }

    fn write_store(&self) -> Result<std::sync::RwLockWriteGuard<'_, Store>> {
        self.store.write().map_err(|e| lock_error("write", e))
    }

    fn lock_tracker(&self) -> Result<std::sync::MutexGuard<'_, ChangeTracker>> {
        self.tracker.lock().map_err(|e| lock_error("tracker", e))
    }

    fn next_identity(&self, model: &EntityModel, tracker: &ChangeTracker) -> Result<i64> {
        let committed = self.read_store()?.max_integer_key(model);
        let pending = tracker.max_integer_key(model);

        let mut sequences = self.sequences.lock().map_err(|e| lock_error("sequence", e))?;
        let last = sequences.entry(model.name.clone()).or_insert(0);
        *last = (*last).max(committed).max(pending) + 1;
        Ok(*last)
    }

    fn generate_key(
        &self,
        model: &EntityModel,
        tracker: &ChangeTracker,
    ) -> Result<Option<FieldValue>> {
        match model.key.generation {
            KeyGeneration::None => Ok(None),
            KeyGeneration::Identity => {
                Ok(Some(FieldValue::Integer(self.next_identity(model, tracker)?)))
            }
            KeyGeneration::Uuid => Ok(Some(FieldValue::Uuid(Uuid::new_v4()))),
        }
    }

    fn execute<T: Entity>(&self, query: &QueryPlan<T>) -> Result<Vec<Value>> {
        let model = self.catalog.model_of::<T>()?;
        let store = self.read_store()?;

        let mut rows: Vec<Value> = match store.table(&model.name) {
            Some(table) => match query.filter_expr() {
                Some(expr) => table
                    .values()
                    .filter(|row| {
                        expr.evaluate(&|field: &str| json_path(row, field).map(FieldValue::from_json))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect(),
                None => table.values().cloned().collect(),
            },
            None => Vec::new(),
        };

        if !query.sort_keys().is_empty() {
            rows.sort_by(|a, b| {
                for key in query.sort_keys() {
                    let left = sort_value(a, &key.field);
                    let right = sort_value(b, &key.field);
                    let ordering = match key.direction {
                        OrderingDirection::Ascending => left.sort_cmp(&right),
                        OrderingDirection::Descending => right.sort_cmp(&left),
                    };
                    if ordering.is_ne() {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let mut rows: Vec<Value> = rows
            .into_iter()
            .skip(query.offset())
            .take(query.limit().unwrap_or(usize::MAX))
            .collect();

        for path in query.includes() {
            let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
            load_path(&store, &self.catalog, model, &mut rows, &segments)?;
        }

        Ok(rows)
    }
}

impl Clone for InMemorySession {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            store: self.store.clone(),
            sequences: self.sequences.clone(),
            tracker: Mutex::new(ChangeTracker::default()),
        }
    }
}

fn lock_error(lock: &str, err: impl std::fmt::Display) -> RepositoryError {
    StorageError::Unavailable {
        backend: BACKEND.to_string(),
        message: format!("Failed to acquire {} lock: {}", lock, err),
    }
    .into()
}

fn sort_value(row: &Value, field: &str) -> FieldValue {
    json_path(row, field)
        .map(FieldValue::from_json)
        .unwrap_or(FieldValue::Null)
}

/// Load `segments` onto `rows`, deepest navigation first
fn load_path(
    store: &Store,
    catalog: &ModelCatalog,
    model: &EntityModel,
    rows: &mut [Value],
    segments: &[&str],
) -> Result<()> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(());
    };

    let navigation = model.find_navigation(first)?;
    let target = catalog.find(&navigation.target)?;

    let wanted: HashSet<String> = parent_keys(rows, navigation)
        .iter()
        .map(FieldValue::key_string)
        .collect();

    let mut related: Vec<Value> = store
        .table(&target.name)
        .into_iter()
        .flat_map(|t| t.values())
        .filter(|row| {
            let key = sort_value(row, &navigation.foreign_field);
            !key.is_null() && wanted.contains(&key.key_string())
        })
        .cloned()
        .collect();

    load_path(store, catalog, target, &mut related, rest)?;
    attach_related(rows, navigation, related);
    Ok(())
}

fn apply(staged: &mut Store, change: &Tracked) -> Result<()> {
    let table = staged.tables.entry(change.entity_type.clone()).or_default();
    match change.state {
        EntityState::Added => {
            if table.contains_key(&change.key) {
                return Err(StorageError::IntegrityError {
                    message: format!(
                        "duplicate key {} for entity type '{}'",
                        change.key, change.entity_type
                    ),
                }
                .into());
            }
            table.insert(change.key.clone(), change.row.clone());
        }
        EntityState::Modified => match table.get_mut(&change.key) {
            Some(row) => *row = change.row.clone(),
            None => {
                return Err(StorageError::IntegrityError {
                    message: format!(
                        "cannot update missing {} with key {}",
                        change.entity_type, change.key
                    ),
                }
                .into());
            }
        },
        EntityState::Deleted => {
            if table.shift_remove(&change.key).is_none() {
                return Err(StorageError::IntegrityError {
                    message: format!(
                        "cannot delete missing {} with key {}",
                        change.entity_type, change.key
                    ),
                }
                .into());
            }
        }
        EntityState::Detached | EntityState::Unchanged => {}
    }
    Ok(())
}

#[async_trait]
impl Session for InMemorySession {
    type Query<T: Entity> = QueryPlan<T>;

    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    fn set<T: Entity>(&self) -> QueryPlan<T> {
        QueryPlan::new()
    }

    fn to_list<T: Entity>(&self, query: QueryPlan<T>) -> Result<Vec<T>> {
        self.execute(&query)?.into_iter().map(from_row).collect()
    }

    async fn to_list_async<T: Entity>(
        &self,
        query: QueryPlan<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        if cancel.is_cancelled() {
            return Err(StorageError::cancelled("to_list").into());
        }
        self.to_list(query)
    }

    fn add<T: Entity>(&self, entity: T) -> Result<T> {
        let model = self.catalog.model_of::<T>()?;
        let mut tracker = self.lock_tracker()?;

        let current = entity
            .field_value(&model.key.field)
            .unwrap_or(FieldValue::Null);
        let entity = if current.is_unset_key() {
            match self.generate_key(model, &tracker)? {
                Some(generated) => {
                    debug!(entity = %model.name, key = %generated, "Generated key");
                    with_field(&entity, &model.key.field, &generated)?
                }
                None => entity,
            }
        } else {
            entity
        };

        let row = stored_row(model, &entity)?;
        let key = row_key(model, &row)?.key_string();
        tracker.track_added(&model.name, key, row);

        Ok(entity)
    }

    async fn add_async<T: Entity>(&self, entity: T, cancel: &CancellationToken) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(StorageError::cancelled("add").into());
        }
        self.add(entity)
    }

    fn mark_modified<T: Entity>(&self, entity: &T) -> Result<()> {
        let model = self.catalog.model_of::<T>()?;
        let row = stored_row(model, entity)?;
        let key = row_key(model, &row)?.key_string();
        self.lock_tracker()?.track_modified(&model.name, key, row);
        Ok(())
    }

    fn mark_removed<T: Entity>(&self, entity: &T) -> Result<()> {
        let model = self.catalog.model_of::<T>()?;
        let row = stored_row(model, entity)?;
        let key = row_key(model, &row)?.key_string();
        self.lock_tracker()?.track_removed(&model.name, key, row);
        Ok(())
    }

    fn save_changes(&self) -> Result<usize> {
        let mut tracker = self.lock_tracker()?;
        if tracker.is_empty() {
            return Ok(0);
        }

        let mut store = self.write_store()?;
        let mut staged = store.clone();
        for change in tracker.changes() {
            if let Err(err) = apply(&mut staged, change) {
                warn!(backend = BACKEND, error = %err, "Rejected commit");
                return Err(err);
            }
        }

        *store = staged;
        let changes = tracker.len();
        tracker.clear();
        info!(backend = BACKEND, changes, "Committed changes");
        Ok(changes)
    }

    async fn save_changes_async(&self, cancel: &CancellationToken) -> Result<usize> {
        if cancel.is_cancelled() {
            return Err(StorageError::cancelled("save_changes").into());
        }
        self.save_changes()
    }

    fn entity_state<T: Entity>(&self, entity: &T) -> Result<EntityState> {
        let model = self.catalog.model_of::<T>()?;
        let key = match entity.field_value(&model.key.field) {
            Some(value) if !value.is_null() => value.key_string(),
            _ => return Ok(EntityState::Detached),
        };

        if let Some(state) = self.lock_tracker()?.state(&model.name, &key) {
            return Ok(state);
        }

        if self.read_store()?.contains(&model.name, &key) {
            Ok(EntityState::Unchanged)
        } else {
            Ok(EntityState::Detached)
        }
    }
}
