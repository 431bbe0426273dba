//! # specrepo
//!
//! A generic repository and specification layer over a persistence session.
//!
//! Calling code describes the *shape* of a query (filter predicate, eager-load
//! paths, ordering, pagination) as a [`Specification`](core::Specification)
//! value, and runs it through a [`Repository`](repository::Repository) that
//! offers the same CRUD and query operations for every entity type.
//!
//! ## Features
//!
//! - **Composable predicates**: typed `AND`/`OR`/`NOT` trees that backends
//!   can evaluate in memory or render to SQL
//! - **Specifications as data**: build once, execute any number of times
//! - **Fixed translation order**: filter, eager-load, order, skip, take
//! - **Unit of work**: change-tracking sessions with atomic `save_changes`
//! - **Sync and async**: every operation in both forms, async ones cancellable
//! - **Model catalog**: keys, key generation and navigations declared in code
//!   or YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use specrepo::prelude::*;
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct Person {
//!     id: i64,
//!     name: String,
//!     age: i64,
//! }
//!
//! impl Entity for Person {
//!     fn entity_name() -> &'static str {
//!         "person"
//!     }
//! }
//!
//! let catalog = ModelCatalog::new().with(
//!     EntityModel::new("person").key("id", ValueKind::Integer, KeyGeneration::Identity),
//! );
//! let session = Arc::new(InMemorySession::new(catalog));
//! let people = Repository::<Person, _>::builder(session).conventions().build();
//!
//! people.add(Person { id: 0, name: "Ann".into(), age: 34 })?;
//! people.save_changes()?;
//!
//! let adults = Specification::new()
//!     .where_(Predicate::field("age").ge(21))
//!     .order_by("name")
//!     .take(10);
//! let found = people.list(&adults)?;
//! ```

pub mod config;
pub mod core;
pub mod repository;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        entity::Entity,
        error::{CoercionError, ConfigError, RepositoryError, Result, StorageError},
        field::{FieldValue, ValueKind},
        include::IncludePath,
        model::{EntityModel, KeyDefinition, KeyGeneration, ModelCatalog, Navigation},
        ordering::{OrderingDirection, OrderingExpression},
        predicate::{Predicate, and, or},
        query::{QueryBuilder, QueryPlan, apply_specification},
        service::EntityRepository,
        session::{EntityState, Session},
        specification::Specification,
    };

    // === Repository ===
    pub use crate::repository::{Repository, RepositoryBuilder};

    // === Storage ===
    #[cfg(feature = "in-memory")]
    pub use crate::storage::InMemorySession;
    #[cfg(feature = "postgres")]
    pub use crate::storage::PostgresSession;
    pub use crate::storage::{Dialect, SqlRenderer};

    // === Config ===
    pub use crate::config::ModelConfig;

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
    pub use tokio_util::sync::CancellationToken;
    pub use uuid::Uuid;
}
