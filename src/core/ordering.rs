//! Ordering expressions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Sort direction of an [`OrderingExpression`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderingDirection {
    pub fn is_ascending(self) -> bool {
        self == OrderingDirection::Ascending
    }
}

/// A (key selector, direction) pair over entities of type `T`
///
/// The key selector is a field path of `T`. Position inside a
/// specification's ordering list decides sort priority.
pub struct OrderingExpression<T> {
    key: String,
    direction: OrderingDirection,
    _entity: PhantomData<fn(&T)>,
}

impl<T> OrderingExpression<T> {
    pub fn new(key: impl Into<String>, direction: OrderingDirection) -> Self {
        Self {
            key: key.into(),
            direction,
            _entity: PhantomData,
        }
    }

    pub fn ascending(key: impl Into<String>) -> Self {
        Self::new(key, OrderingDirection::Ascending)
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self::new(key, OrderingDirection::Descending)
    }

    /// The field path used as sort key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn direction(&self) -> OrderingDirection {
        self.direction
    }
}

impl<T> Clone for OrderingExpression<T> {
    fn clone(&self) -> Self {
        Self::new(self.key.clone(), self.direction)
    }
}

impl<T> PartialEq for OrderingExpression<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.direction == other.direction
    }
}

impl<T> fmt::Debug for OrderingExpression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderingExpression")
            .field("key", &self.key)
            .field("direction", &self.direction)
            .finish()
    }
}
