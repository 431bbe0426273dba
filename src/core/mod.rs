//! Core module containing the contracts and data types of the repository layer

pub mod entity;
pub mod error;
pub mod field;
pub mod include;
pub mod model;
pub mod ordering;
pub mod predicate;
pub mod query;
pub mod service;
pub mod session;
pub mod specification;

pub use entity::Entity;
pub use error::{ConfigError, CoercionError, RepositoryError, Result, StorageError};
pub use field::{FieldValue, ValueKind};
pub use include::IncludePath;
pub use model::{EntityModel, KeyDefinition, KeyGeneration, ModelCatalog, Navigation};
pub use ordering::{OrderingDirection, OrderingExpression};
pub use predicate::{CompareOp, Expr, FieldRef, Predicate};
pub use query::{QueryBuilder, QueryPlan, SortKey, apply_specification};
pub use service::EntityRepository;
pub use session::{EntityState, Session};
pub use specification::Specification;
