//! Persistence session contract
//!
//! A [`Session`] is the unit of work a repository delegates to: it hands out
//! composable queries per entity type, tracks added/modified/removed
//! entities, and commits them in one step. It owns the model catalog that
//! describes every registered entity.
//!
//! A session is single-writer. Repositories sharing a session share its
//! change tracker; nothing here adds locking on top of what the backend
//! already does.

use crate::core::entity::Entity;
use crate::core::error::Result;
use crate::core::model::ModelCatalog;
use crate::core::query::QueryBuilder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Tracking state of an entity inside a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Neither tracked nor stored
    Detached,
    /// Stored, no pending change
    Unchanged,
    /// Pending insert
    Added,
    /// Pending update
    Modified,
    /// Pending delete
    Deleted,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityState::Detached => "detached",
            EntityState::Unchanged => "unchanged",
            EntityState::Added => "added",
            EntityState::Modified => "modified",
            EntityState::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Deferred query handle for one entity type
    type Query<T: Entity>: QueryBuilder<T> + Send + 'static;

    /// Short backend name used in logs and errors
    fn backend(&self) -> &'static str;

    fn catalog(&self) -> &ModelCatalog;

    /// The full set of `T`, unfiltered
    fn set<T: Entity>(&self) -> Self::Query<T>;

    /// Execute a query and materialize its rows
    fn to_list<T: Entity>(&self, query: Self::Query<T>) -> Result<Vec<T>>;

    async fn to_list_async<T: Entity>(
        &self,
        query: Self::Query<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>>;

    /// Start tracking a new entity
    ///
    /// Returns the tracked instance, with a generated key filled in when the
    /// catalog declares key generation and the key is unset.
    fn add<T: Entity>(&self, entity: T) -> Result<T>;

    async fn add_async<T: Entity>(&self, entity: T, cancel: &CancellationToken) -> Result<T>;

    /// Flag an entity as modified
    fn mark_modified<T: Entity>(&self, entity: &T) -> Result<()>;

    /// Flag an entity for deletion
    fn mark_removed<T: Entity>(&self, entity: &T) -> Result<()>;

    /// Commit every pending change as one unit; returns the affected count
    fn save_changes(&self) -> Result<usize>;

    async fn save_changes_async(&self, cancel: &CancellationToken) -> Result<usize>;

    fn entity_state<T: Entity>(&self, entity: &T) -> Result<EntityState>;
}
