//! Specification: a reusable description of a query's shape
//!
//! A [`Specification`] bundles an optional filter predicate, eager-load
//! paths, an ordered list of sort keys and an optional `skip`/`take` window.
//! It is plain data: building one has no side effect and the same value can
//! be executed any number of times.
//!
//! # Example
//!
//! ```rust,ignore
//! let adults = Specification::<Person>::new()
//!     .where_(Predicate::field("age").ge(18))
//!     .include("orders")
//!     .order_by("name")
//!     .then_by_descending("age")
//!     .page(2, 20);
//!
//! let people = repository.list(&adults)?;
//! ```

use crate::core::include::IncludePath;
use crate::core::ordering::{OrderingDirection, OrderingExpression};
use crate::core::predicate::Predicate;
use std::fmt;

pub struct Specification<T> {
    criteria: Option<Predicate<T>>,
    includes: Vec<IncludePath<T>>,
    ordering_expressions: Vec<OrderingExpression<T>>,
    take: Option<usize>,
    skip: Option<usize>,
}

impl<T> Specification<T> {
    /// An empty specification: matches everything, natural order, no window
    pub fn new() -> Self {
        Self {
            criteria: None,
            includes: Vec::new(),
            ordering_expressions: Vec::new(),
            take: None,
            skip: None,
        }
    }

    /// Set the criteria, or AND it into the existing one
    pub fn where_(mut self, predicate: Predicate<T>) -> Self {
        self.criteria = Some(match self.criteria.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// OR a predicate into the criteria
    ///
    /// Without existing criteria this is the same as [`where_`](Self::where_).
    pub fn or_where(mut self, predicate: Predicate<T>) -> Self {
        self.criteria = Some(match self.criteria.take() {
            Some(existing) => existing.or(predicate),
            None => predicate,
        });
        self
    }

    /// Append an eager-load path; duplicates are kept
    pub fn include(mut self, path: impl Into<IncludePath<T>>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Append an ordering expression
    pub fn ordered(mut self, expression: OrderingExpression<T>) -> Self {
        self.ordering_expressions.push(expression);
        self
    }

    pub fn order_by(self, key: impl Into<String>) -> Self {
        self.ordered(OrderingExpression::new(key, OrderingDirection::Ascending))
    }

    pub fn order_by_descending(self, key: impl Into<String>) -> Self {
        self.ordered(OrderingExpression::new(key, OrderingDirection::Descending))
    }

    /// Alias of [`order_by`](Self::order_by) reading better after the first key
    pub fn then_by(self, key: impl Into<String>) -> Self {
        self.order_by(key)
    }

    pub fn then_by_descending(self, key: impl Into<String>) -> Self {
        self.order_by_descending(key)
    }

    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip = Some(count);
        self
    }

    /// Select a 1-based page of `per_page` items
    pub fn page(self, page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let page = page.max(1);
        self.skip((page - 1) * per_page).take(per_page)
    }

    pub fn criteria(&self) -> Option<&Predicate<T>> {
        self.criteria.as_ref()
    }

    pub fn includes(&self) -> &[IncludePath<T>] {
        &self.includes
    }

    pub fn ordering_expressions(&self) -> &[OrderingExpression<T>] {
        &self.ordering_expressions
    }

    pub fn take_count(&self) -> Option<usize> {
        self.take
    }

    pub fn skip_count(&self) -> Option<usize> {
        self.skip
    }

    /// True when applying the specification leaves a query unchanged
    pub fn is_empty(&self) -> bool {
        self.criteria.is_none()
            && self.includes.is_empty()
            && self.ordering_expressions.is_empty()
            && self.take.is_none()
            && self.skip.is_none()
    }
}

impl<T> Default for Specification<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            includes: self.includes.clone(),
            ordering_expressions: self.ordering_expressions.clone(),
            take: self.take,
            skip: self.skip,
        }
    }
}

impl<T> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("criteria", &self.criteria)
            .field("includes", &self.includes)
            .field("ordering_expressions", &self.ordering_expressions)
            .field("take", &self.take)
            .field("skip", &self.skip)
            .finish()
    }
}

impl<T> From<Predicate<T>> for Specification<T> {
    fn from(predicate: Predicate<T>) -> Self {
        Self::new().where_(predicate)
    }
}
