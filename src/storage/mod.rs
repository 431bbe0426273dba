//! Session implementations for different backends

#[cfg(feature = "in-memory")]
pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sql;
pub(crate) mod tracker;

#[cfg(feature = "in-memory")]
pub use in_memory::InMemorySession;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSession;
pub use sql::{Dialect, SqlRenderer, SqlStatement};
