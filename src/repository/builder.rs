//! RepositoryBuilder for configuring dataset and key accessors

use super::{DatasetAccessor, Repository};
use crate::core::entity::Entity;
use crate::core::error::Result;
use crate::core::session::Session;
use std::sync::Arc;

/// Builder for [`Repository`]
///
/// # Example
///
/// ```rust,ignore
/// // Explicit configuration
/// let adults = Repository::<Person, _>::builder(session.clone())
///     .dataset(|s| Ok(s.set::<Person>().filter(&Predicate::field("age").ge(18))))
///     .key("id")
///     .build();
///
/// // Full set + catalog key
/// let people = Repository::<Person, _>::builder(session).conventions().build();
/// ```
pub struct RepositoryBuilder<T: Entity, S: Session> {
    session: Arc<S>,
    dataset: Option<DatasetAccessor<T, S>>,
    key: Option<String>,
}

impl<T: Entity, S: Session> RepositoryBuilder<T, S> {
    pub fn new(session: Arc<S>) -> Self {
        Self {
            session,
            dataset: None,
            key: None,
        }
    }

    /// Set the query `list_all` materializes
    pub fn dataset<F>(mut self, accessor: F) -> Self
    where
        F: Fn(&S) -> Result<S::Query<T>> + Send + Sync + 'static,
    {
        self.dataset = Some(Arc::new(accessor));
        self
    }

    /// Use the full, unfiltered set of `T` as dataset
    pub fn default_dataset(self) -> Self {
        self.dataset(|session: &S| Ok(session.set::<T>()))
    }

    /// Set the field `get_by_id` compares against
    pub fn key(mut self, field: impl Into<String>) -> Self {
        self.key = Some(field.into());
        self
    }

    /// Full set as dataset and the catalog's key field as key
    ///
    /// Leaves the key unset when `T` is not registered; `get_by_id` then
    /// reports the missing key.
    pub fn conventions(self) -> Self {
        let key = self
            .session
            .catalog()
            .model_of::<T>()
            .ok()
            .map(|model| model.key.field.clone());
        let builder = self.default_dataset();
        match key {
            Some(field) => builder.key(field),
            None => builder,
        }
    }

    pub fn build(self) -> Repository<T, S> {
        Repository::from_parts(self.session, self.dataset, self.key)
    }
}
