//! Repository service trait

use crate::core::entity::Entity;
use crate::core::error::Result;
use crate::core::field::FieldValue;
use crate::core::predicate::Predicate;
use crate::core::session::EntityState;
use crate::core::specification::Specification;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Uniform CRUD and query operations for one entity type
///
/// Implementations delegate to a persistence session. Writes are only
/// tracked until [`save_changes`](Self::save_changes) commits them; reads
/// see committed state.
#[async_trait]
pub trait EntityRepository<T: Entity>: Send + Sync {
    /// Every entity of the configured dataset
    fn list_all(&self) -> Result<Vec<T>>;

    async fn list_all_async(&self, cancel: &CancellationToken) -> Result<Vec<T>>;

    /// Entities selected and shaped by a specification
    fn list(&self, specification: &Specification<T>) -> Result<Vec<T>>;

    async fn list_async(
        &self,
        specification: &Specification<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>>;

    /// The single entity whose key equals `id`, if any
    ///
    /// `id` is coerced to the key's declared kind first. More than one match
    /// is a cardinality error.
    fn get_by_id(&self, id: FieldValue) -> Result<Option<T>>;

    async fn get_by_id_async(&self, id: FieldValue, cancel: &CancellationToken)
    -> Result<Option<T>>;

    /// Entities matching a predicate, in natural order
    fn find(&self, predicate: &Predicate<T>) -> Result<Vec<T>>;

    async fn find_async(
        &self,
        predicate: &Predicate<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>>;

    /// Track a new entity and return the tracked instance
    fn add(&self, entity: T) -> Result<T>;

    async fn add_async(&self, entity: T, cancel: &CancellationToken) -> Result<T>;

    /// Flag an entity as modified and return it
    fn update(&self, entity: T) -> Result<T>;

    async fn update_async(&self, entity: T, cancel: &CancellationToken) -> Result<T>;

    /// Flag an entity for deletion
    fn delete(&self, entity: &T) -> Result<()>;

    async fn delete_async(&self, entity: &T, cancel: &CancellationToken) -> Result<()>;

    /// Commit pending changes; blocks until they are durable
    fn save_changes(&self) -> Result<usize>;

    async fn save_changes_async(&self, cancel: &CancellationToken) -> Result<usize>;

    /// Current tracking state of an entity
    fn entity_state(&self, entity: &T) -> Result<EntityState>;
}
