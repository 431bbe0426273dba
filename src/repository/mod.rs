//! Generic repository over a persistence session
//!
//! [`Repository<T, S>`] adapts a [`Session`] to the uniform
//! [`EntityRepository<T>`] operations. It keeps no state of its own besides
//! two pieces of configuration: the dataset accessor used by `list_all` and
//! the key field used by `get_by_id`. Both are set through
//! [`RepositoryBuilder`].

pub mod builder;

pub use builder::RepositoryBuilder;

use crate::core::entity::Entity;
use crate::core::error::{ConfigError, RepositoryError, Result, StorageError};
use crate::core::field::FieldValue;
use crate::core::predicate::Predicate;
use crate::core::query::{QueryBuilder, apply_specification};
use crate::core::service::EntityRepository;
use crate::core::session::{EntityState, Session};
use crate::core::specification::Specification;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Produces the query `list_all` materializes
pub type DatasetAccessor<T, S> =
    Arc<dyn Fn(&S) -> Result<<S as Session>::Query<T>> + Send + Sync>;

/// Repository for entities of type `T` over a session of type `S`
///
/// The session is shared, not owned: every repository built on the same
/// `Arc<S>` takes part in the same unit of work.
///
/// # Example
///
/// ```rust,ignore
/// let people = Repository::<Person, _>::builder(session.clone())
///     .conventions()
///     .build();
///
/// let ann = people.add(Person::new("Ann", 30))?;
/// people.save_changes()?;
/// assert_eq!(people.get_by_id(ann.id.into())?, Some(ann));
/// ```
pub struct Repository<T: Entity, S: Session> {
    session: Arc<S>,
    dataset: Option<DatasetAccessor<T, S>>,
    key: Option<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, S: Session> Repository<T, S> {
    /// A repository without dataset accessor or key selector
    ///
    /// `list_all` and `get_by_id` fail with a configuration error until
    /// those are provided; use [`builder`](Self::builder) to set them.
    pub fn new(session: Arc<S>) -> Self {
        Self {
            session,
            dataset: None,
            key: None,
            _entity: PhantomData,
        }
    }

    pub fn builder(session: Arc<S>) -> RepositoryBuilder<T, S> {
        RepositoryBuilder::new(session)
    }

    pub(crate) fn from_parts(
        session: Arc<S>,
        dataset: Option<DatasetAccessor<T, S>>,
        key: Option<String>,
    ) -> Self {
        Self {
            session,
            dataset,
            key,
            _entity: PhantomData,
        }
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Field compared against the id in `get_by_id`
    pub fn key_field(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn dataset_query(&self) -> Result<S::Query<T>> {
        let dataset = self.dataset.as_ref().ok_or_else(|| ConfigError::DatasetNotConfigured {
            entity_type: T::entity_name().to_string(),
        })?;
        dataset(self.session.as_ref())
    }

    fn list_query(&self, specification: &Specification<T>) -> S::Query<T> {
        apply_specification(self.session.set::<T>(), Some(specification))
    }

    /// Query selecting the entities whose key equals `id`
    ///
    /// At most two rows are fetched: enough to tell "one" from "many".
    fn key_query(&self, id: FieldValue) -> Result<(S::Query<T>, FieldValue)> {
        let field = self.key.as_deref().ok_or_else(|| ConfigError::KeyNotDefined {
            entity_type: T::entity_name().to_string(),
        })?;
        let model = self.session.catalog().model_of::<T>()?;
        let key = id.coerce(model.key.kind)?;

        let query = self
            .session
            .set::<T>()
            .filter(&Predicate::field(field).eq(key.clone()))
            .take(2);
        Ok((query, key))
    }

    fn single(mut matches: Vec<T>, key: FieldValue) -> Result<Option<T>> {
        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            count => {
                warn!(entity = T::entity_name(), key = %key, matches = count, "Key lookup is ambiguous");
                Err(RepositoryError::Cardinality {
                    entity_type: T::entity_name().to_string(),
                    key,
                    matches: count,
                })
            }
        }
    }
}

impl<T: Entity, S: Session> Clone for Repository<T, S> {
    fn clone(&self) -> Self {
        Self::from_parts(self.session.clone(), self.dataset.clone(), self.key.clone())
    }
}

#[async_trait]
impl<T: Entity, S: Session> EntityRepository<T> for Repository<T, S> {
    fn list_all(&self) -> Result<Vec<T>> {
        let items = self.session.to_list(self.dataset_query()?)?;
        debug!(entity = T::entity_name(), op = "list_all", count = items.len(), "Listed entities");
        Ok(items)
    }

    async fn list_all_async(&self, cancel: &CancellationToken) -> Result<Vec<T>> {
        let query = self.dataset_query()?;
        let items = self.session.to_list_async(query, cancel).await?;
        debug!(entity = T::entity_name(), op = "list_all", count = items.len(), "Listed entities");
        Ok(items)
    }

    fn list(&self, specification: &Specification<T>) -> Result<Vec<T>> {
        let items = self.session.to_list(self.list_query(specification))?;
        debug!(entity = T::entity_name(), op = "list", count = items.len(), "Listed entities");
        Ok(items)
    }

    async fn list_async(
        &self,
        specification: &Specification<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let query = self.list_query(specification);
        let items = self.session.to_list_async(query, cancel).await?;
        debug!(entity = T::entity_name(), op = "list", count = items.len(), "Listed entities");
        Ok(items)
    }

    fn get_by_id(&self, id: FieldValue) -> Result<Option<T>> {
        let (query, key) = self.key_query(id)?;
        debug!(entity = T::entity_name(), op = "get_by_id", key = %key);
        Self::single(self.session.to_list(query)?, key)
    }

    async fn get_by_id_async(
        &self,
        id: FieldValue,
        cancel: &CancellationToken,
    ) -> Result<Option<T>> {
        let (query, key) = self.key_query(id)?;
        debug!(entity = T::entity_name(), op = "get_by_id", key = %key);
        let matches = self.session.to_list_async(query, cancel).await?;
        Self::single(matches, key)
    }

    fn find(&self, predicate: &Predicate<T>) -> Result<Vec<T>> {
        let items = self.session.to_list(self.session.set::<T>().filter(predicate))?;
        debug!(entity = T::entity_name(), op = "find", count = items.len(), "Found entities");
        Ok(items)
    }

    async fn find_async(
        &self,
        predicate: &Predicate<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let query = self.session.set::<T>().filter(predicate);
        let items = self.session.to_list_async(query, cancel).await?;
        debug!(entity = T::entity_name(), op = "find", count = items.len(), "Found entities");
        Ok(items)
    }

    fn add(&self, entity: T) -> Result<T> {
        debug!(entity = T::entity_name(), op = "add");
        self.session.add(entity)
    }

    async fn add_async(&self, entity: T, cancel: &CancellationToken) -> Result<T> {
        debug!(entity = T::entity_name(), op = "add");
        self.session.add_async(entity, cancel).await
    }

    fn update(&self, entity: T) -> Result<T> {
        debug!(entity = T::entity_name(), op = "update");
        self.session.mark_modified(&entity)?;
        Ok(entity)
    }

    async fn update_async(&self, entity: T, cancel: &CancellationToken) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(StorageError::cancelled("update").into());
        }
        self.update(entity)
    }

    fn delete(&self, entity: &T) -> Result<()> {
        debug!(entity = T::entity_name(), op = "delete");
        self.session.mark_removed(entity)
    }

    async fn delete_async(&self, entity: &T, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StorageError::cancelled("delete").into());
        }
        self.delete(entity)
    }

    fn save_changes(&self) -> Result<usize> {
        let changes = self.session.save_changes()?;
        debug!(entity = T::entity_name(), op = "save_changes", changes);
        Ok(changes)
    }

    async fn save_changes_async(&self, cancel: &CancellationToken) -> Result<usize> {
        let changes = self.session.save_changes_async(cancel).await?;
        debug!(entity = T::entity_name(), op = "save_changes", changes);
        Ok(changes)
    }

    fn entity_state(&self, entity: &T) -> Result<EntityState> {
        self.session.entity_state(entity)
    }
}
