//! PostgreSQL session using sqlx.
//!
//! Query plans are rendered to SQL by [`SqlRenderer`] and rows travel as
//! JSON: reads select `row_to_json(t)`, writes go through
//! `jsonb_populate_record`, so entity columns never need per-type mapping
//! code.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! specrepo = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! # Schema
//!
//! Tables are expected to exist (see [`EntityModel::table_name`]). Identity
//! keys must be backed by a serial/identity column so that
//! `pg_get_serial_sequence` can find their sequence.

use crate::core::entity::{Entity, from_row, with_field};
use crate::core::error::{Result, StorageError};
use crate::core::field::FieldValue;
use crate::core::include::{attach_related, parent_keys};
use crate::core::model::{EntityModel, KeyGeneration, ModelCatalog};
use crate::core::predicate::Expr;
use crate::core::query::QueryPlan;
use crate::core::session::{EntityState, Session};
use crate::storage::sql::{Dialect, SqlRenderer, SqlStatement};
use crate::storage::tracker::{ChangeTracker, Tracked, row_key, stored_row};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BACKEND: &str = "postgres";

/// Bind a [`FieldValue`] onto a sqlx query by variant
macro_rules! bind_field_value {
    ($query:expr, $value:expr) => {
        match $value {
            FieldValue::String(s) => $query.bind(s.clone()),
            FieldValue::Integer(i) => $query.bind(*i),
            FieldValue::Float(x) => $query.bind(*x),
            FieldValue::Boolean(b) => $query.bind(*b),
            FieldValue::Uuid(u) => $query.bind(*u),
            FieldValue::DateTime(dt) => $query.bind(*dt),
            FieldValue::Null => $query.bind(None::<String>),
        }
    };
}

/// Change-tracking session backed by a PostgreSQL pool
///
/// # Example
///
/// ```rust,ignore
/// let session = Arc::new(PostgresSession::connect("postgres://localhost/shop", catalog).await?);
/// let people = Repository::<Person, _>::builder(session).conventions().build();
/// let adults = people
///     .list_async(&Specification::new().where_(Predicate::field("age").ge(18)), &cancel)
///     .await?;
/// ```
pub struct PostgresSession {
    pool: PgPool,
    catalog: Arc<ModelCatalog>,
    renderer: SqlRenderer,
    tracker: Mutex<ChangeTracker>,
}

impl PostgresSession {
    /// Create a session over an existing pool
    pub fn new(pool: PgPool, catalog: ModelCatalog) -> Self {
        Self {
            pool,
            catalog: Arc::new(catalog),
            renderer: SqlRenderer::new(Dialect::Postgres),
            tracker: Mutex::new(ChangeTracker::default()),
        }
    }

    /// Connect a new pool to `url`
    pub async fn connect(url: &str, catalog: ModelCatalog) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                backend: BACKEND.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::new(pool, catalog))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Number of pending changes
    pub fn pending_changes(&self) -> Result<usize> {
        Ok(self.lock_tracker()?.len())
    }

    fn lock_tracker(&self) -> Result<std::sync::MutexGuard<'_, ChangeTracker>> {
        self.tracker.lock().map_err(|e| {
            StorageError::Unavailable {
                backend: BACKEND.to_string(),
                message: format!("Failed to acquire tracker lock: {}", e),
            }
            .into()
        })
    }

    /// Drive a future to completion from synchronous code
    ///
    /// Only possible from inside a multi-thread tokio runtime.
    fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        let handle = Handle::try_current().map_err(|e| StorageError::Unavailable {
            backend: BACKEND.to_string(),
            message: format!("synchronous calls need a tokio runtime: {}", e),
        })?;
        if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
            return Err(StorageError::Unavailable {
                backend: BACKEND.to_string(),
                message: "synchronous calls need a multi-thread tokio runtime".to_string(),
            }
            .into());
        }
        Ok(tokio::task::block_in_place(|| handle.block_on(future)))
    }

    async fn cancellable<F, R>(operation: &str, cancel: &CancellationToken, future: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::cancelled(operation).into()),
            result = future => result,
        }
    }

    async fn fetch_json(&self, statement: SqlStatement) -> Result<Vec<Value>> {
        debug!(backend = BACKEND, sql = %statement.sql, params = statement.params.len(), "Executing query");
        let mut query = sqlx::query_scalar::<_, Value>(&statement.sql);
        for param in &statement.params {
            query = bind_field_value!(query, param);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn fetch_rows<T: Entity>(&self, plan: &QueryPlan<T>) -> Result<Vec<Value>> {
        let model = self.catalog.model_of::<T>()?;
        let statement = self.renderer.render_select(model, "row_to_json(t)", plan)?;
        let mut rows = self.fetch_json(statement).await?;

        for path in plan.includes() {
            let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
            self.load_path(model, &mut rows, &segments).await?;
        }
        Ok(rows)
    }

    /// Load `segments` onto `rows`, deepest navigation first
    fn load_path<'a>(
        &'a self,
        model: &'a EntityModel,
        rows: &'a mut Vec<Value>,
        segments: &'a [&'a str],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some((first, rest)) = segments.split_first() else {
                return Ok(());
            };

            let navigation = model.find_navigation(first)?;
            let target = self.catalog.find(&navigation.target)?;
            let keys = parent_keys(rows, navigation);

            let mut related = if keys.is_empty() {
                Vec::new()
            } else {
                let filter = Expr::In {
                    field: navigation.foreign_field.clone(),
                    values: keys,
                };
                let statement = self.renderer.render_parts(
                    target,
                    "row_to_json(t)",
                    Some(&filter),
                    &[],
                    0,
                    None,
                )?;
                self.fetch_json(statement).await?
            };

            self.load_path(target, &mut related, rest).await?;
            attach_related(rows, navigation, related);
            Ok(())
        })
    }

    async fn next_identity(&self, model: &EntityModel) -> Result<i64> {
        let next = sqlx::query_scalar::<_, i64>("SELECT nextval(pg_get_serial_sequence($1, $2))")
            .bind(model.table_name())
            .bind(&model.key.field)
            .fetch_one(&self.pool)
            .await?;
        Ok(next)
    }

    async fn prepare_added<T: Entity>(&self, entity: T) -> Result<T> {
        let model = self.catalog.model_of::<T>()?;
        let current = entity
            .field_value(&model.key.field)
            .unwrap_or(FieldValue::Null);
        if !current.is_unset_key() {
            return Ok(entity);
        }

        let generated = match model.key.generation {
            KeyGeneration::None => return Ok(entity),
            KeyGeneration::Identity => FieldValue::Integer(self.next_identity(model).await?),
            KeyGeneration::Uuid => FieldValue::Uuid(Uuid::new_v4()),
        };
        debug!(entity = %model.name, key = %generated, "Generated key");
        with_field(&entity, &model.key.field, &generated)
    }

    fn track_added<T: Entity>(&self, entity: &T) -> Result<()> {
        let model = self.catalog.model_of::<T>()?;
        let row = stored_row(model, entity)?;
        let key = row_key(model, &row)?.key_string();
        self.lock_tracker()?.track_added(&model.name, key, row);
        Ok(())
    }

    /// Typed key value of a tracked change
    fn typed_key(model: &EntityModel, change: &Tracked) -> Result<FieldValue> {
        let key = row_key(model, &change.row)?;
        Ok(key.coerce(model.key.kind)?)
    }

    async fn commit(&self, changes: &[Tracked]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for change in changes {
            let model = self.catalog.find(&change.entity_type)?;
            let table = self.renderer.quote(model.table_name())?;
            let key_column = self.renderer.quote(&model.key.field)?;
            let key = Self::typed_key(model, change)?;

            let affected = match change.state {
                EntityState::Added | EntityState::Modified => {
                    let columns = self.column_list(&change.row)?;
                    let sql = if change.state == EntityState::Added {
                        format!(
                            "INSERT INTO {table} ({columns}) \
                             SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1::jsonb)"
                        )
                    } else {
                        format!(
                            "UPDATE {table} SET ({columns}) = \
                             (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1::jsonb)) \
                             WHERE {key_column} = $2"
                        )
                    };
                    let mut query = sqlx::query(&sql).bind(change.row.clone());
                    if change.state == EntityState::Modified {
                        query = bind_field_value!(query, &key);
                    }
                    query.execute(&mut *tx).await?.rows_affected()
                }
                EntityState::Deleted => {
                    let sql = format!("DELETE FROM {table} WHERE {key_column} = $1");
                    let query = bind_field_value!(sqlx::query(&sql), &key);
                    query.execute(&mut *tx).await?.rows_affected()
                }
                EntityState::Detached | EntityState::Unchanged => continue,
            };

            if affected == 0 {
                return Err(StorageError::IntegrityError {
                    message: format!(
                        "no {} row with key {} to {}",
                        change.entity_type,
                        key,
                        if change.state == EntityState::Deleted { "delete" } else { "update" }
                    ),
                }
                .into());
            }
        }

        tx.commit().await.map_err(|e| StorageError::TransactionError {
            message: e.to_string(),
        })?;
        Ok(changes.len())
    }

    fn column_list(&self, row: &Value) -> Result<String> {
        let Some(obj) = row.as_object() else {
            return Err(StorageError::Serialization {
                message: "entity row is not a JSON object".to_string(),
            }
            .into());
        };
        let columns = obj
            .keys()
            .map(|column| self.renderer.quote(column))
            .collect::<Result<Vec<_>>>()?;
        Ok(columns.join(", "))
    }

    async fn save_tracked(&self) -> Result<usize> {
        let changes = self.lock_tracker()?.snapshot();
        if changes.is_empty() {
            return Ok(0);
        }

        match self.commit(&changes).await {
            Ok(count) => {
                self.lock_tracker()?.forget(&changes);
                info!(backend = BACKEND, changes = count, "Committed changes");
                Ok(count)
            }
            Err(err) => {
                warn!(backend = BACKEND, error = %err, "Rejected commit");
                Err(err)
            }
        }
    }

    async fn row_exists(&self, model: &EntityModel, key: &FieldValue) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
            self.renderer.quote(model.table_name())?,
            self.renderer.quote(&model.key.field)?
        );
        let query = bind_field_value!(sqlx::query_scalar::<_, bool>(&sql), key);
        Ok(query.fetch_one(&self.pool).await?)
    }
}

#[async_trait]
impl Session for PostgresSession {
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
        let rows = self.block_on(self.fetch_rows(&query))??;
        rows.into_iter().map(from_row).collect()
    }

    async fn to_list_async<T: Entity>(
        &self,
        query: QueryPlan<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let rows = Self::cancellable("to_list", cancel, self.fetch_rows(&query)).await?;
        rows.into_iter().map(from_row).collect()
    }

    fn add<T: Entity>(&self, entity: T) -> Result<T> {
        let entity = self.block_on(self.prepare_added(entity))??;
        self.track_added(&entity)?;
        Ok(entity)
    }

    async fn add_async<T: Entity>(&self, entity: T, cancel: &CancellationToken) -> Result<T> {
        let entity = Self::cancellable("add", cancel, self.prepare_added(entity)).await?;
        self.track_added(&entity)?;
        Ok(entity)
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
        self.block_on(self.save_tracked())?
    }

    async fn save_changes_async(&self, cancel: &CancellationToken) -> Result<usize> {
        Self::cancellable("save_changes", cancel, self.save_tracked()).await
    }

    fn entity_state<T: Entity>(&self, entity: &T) -> Result<EntityState> {
        let model = self.catalog.model_of::<T>()?;
        let key = match entity.field_value(&model.key.field) {
            Some(value) if !value.is_null() => value,
            _ => return Ok(EntityState::Detached),
        };

        if let Some(state) = self.lock_tracker()?.state(&model.name, &key.key_string()) {
            return Ok(state);
        }

        let key = key.coerce(model.key.kind)?;
        if self.block_on(self.row_exists(model, &key))?? {
            Ok(EntityState::Unchanged)
        } else {
            Ok(EntityState::Detached)
        }
    }
}
