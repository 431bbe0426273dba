//! Query composition and specification translation
//!
//! [`QueryBuilder`] is the composable query surface a session hands out for
//! an entity type. [`apply_specification`] folds a [`Specification`] into
//! such a query in a fixed order; nothing runs until the session
//! materializes the result.

use crate::core::include::IncludePath;
use crate::core::ordering::OrderingDirection;
use crate::core::predicate::{Expr, Predicate};
use crate::core::specification::Specification;
use std::fmt;
use std::marker::PhantomData;

/// Composable, deferred query over entities of type `T`
///
/// Every method consumes the query and returns the refined one. Calls
/// compose sequentially: `skip(5).take(10)` selects rows `[5, 15)` while
/// `take(10).skip(5)` selects `[5, 10)`.
pub trait QueryBuilder<T>: Sized {
    /// Restrict to rows matching the predicate; repeated filters are ANDed
    fn filter(self, predicate: &Predicate<T>) -> Self;

    /// Eager-load a navigation path
    fn include(self, path: &IncludePath<T>) -> Self;

    /// Replace the sort order with a single key
    fn order_by(self, key: &str, direction: OrderingDirection) -> Self;

    /// Append a tie-breaking sort key
    fn then_by(self, key: &str, direction: OrderingDirection) -> Self;

    /// Bypass the first `count` rows
    fn skip(self, count: usize) -> Self;

    /// Keep at most `count` rows
    fn take(self, count: usize) -> Self;
}

/// Apply a specification to a query
///
/// Translation order is fixed: criteria, every include in declaration
/// order, the first ordering as the primary key and every later one as a
/// tie-breaker, then `skip`, then `take`. With `None` the query is returned
/// unchanged.
pub fn apply_specification<T, Q>(query: Q, specification: Option<&Specification<T>>) -> Q
where
    Q: QueryBuilder<T>,
{
    let Some(specification) = specification else {
        return query;
    };

    let mut query = query;

    if let Some(criteria) = specification.criteria() {
        query = query.filter(criteria);
    }

    for path in specification.includes() {
        query = query.include(path);
    }

    for (position, ordering) in specification.ordering_expressions().iter().enumerate() {
        query = if position == 0 {
            query.order_by(ordering.key(), ordering.direction())
        } else {
            query.then_by(ordering.key(), ordering.direction())
        };
    }

    if let Some(count) = specification.skip_count() {
        query = query.skip(count);
    }

    if let Some(count) = specification.take_count() {
        query = query.take(count);
    }

    query
}

/// A single sort key of a [`QueryPlan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: OrderingDirection,
}

/// Recorded query shape, executed by a session
///
/// Both bundled sessions use this as their query handle: the in-memory
/// session interprets it over stored rows, the PostgreSQL session renders it
/// to SQL.
pub struct QueryPlan<T> {
    filter: Option<Expr>,
    includes: Vec<String>,
    sort: Vec<SortKey>,
    offset: usize,
    limit: Option<usize>,
    _entity: PhantomData<fn(&T)>,
}

impl<T> QueryPlan<T> {
    /// A plan returning every row in natural order
    pub fn new() -> Self {
        Self {
            filter: None,
            includes: Vec::new(),
            sort: Vec::new(),
            offset: 0,
            limit: None,
            _entity: PhantomData,
        }
    }

    pub fn filter_expr(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// AND an untyped expression into the filter
    pub fn with_filter_expr(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Expr::And(Box::new(existing), Box::new(expr)),
            None => expr,
        });
        self
    }
}

impl<T> Default for QueryPlan<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for QueryPlan<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            includes: self.includes.clone(),
            sort: self.sort.clone(),
            offset: self.offset,
            limit: self.limit,
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for QueryPlan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlan")
            .field("filter", &self.filter.as_ref().map(|e| e.to_string()))
            .field("includes", &self.includes)
            .field("sort", &self.sort)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T> QueryBuilder<T> for QueryPlan<T> {
    fn filter(self, predicate: &Predicate<T>) -> Self {
        self.with_filter_expr(predicate.expr().clone())
    }

    fn include(mut self, path: &IncludePath<T>) -> Self {
        self.includes.push(path.as_str().to_string());
        self
    }

    fn order_by(mut self, key: &str, direction: OrderingDirection) -> Self {
        self.sort = vec![SortKey {
            field: key.to_string(),
            direction,
        }];
        self
    }

    fn then_by(mut self, key: &str, direction: OrderingDirection) -> Self {
        self.sort.push(SortKey {
            field: key.to_string(),
            direction,
        });
        self
    }

    fn skip(mut self, count: usize) -> Self {
        self.offset = self.offset.saturating_add(count);
        self.limit = self.limit.map(|limit| limit.saturating_sub(count));
        self
    }

    fn take(mut self, count: usize) -> Self {
        self.limit = Some(match self.limit {
            Some(limit) => limit.min(count),
            None => count,
        });
        self
    }
}
