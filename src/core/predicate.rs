//! Predicate expressions and their combinators
//!
//! A [`Predicate<T>`] is a boolean expression over one entity of type `T`,
//! kept as a tree ([`Expr`]) rather than a closure so that every session
//! backend can walk it: the in-memory session evaluates it, the SQL renderer
//! turns it into a `WHERE` clause.
//!
//! The type parameter is the single free variable of the expression. Leaves
//! name fields of `T`, so two predicates over the same `T` always share their
//! parameter and can be combined without rewriting either side.
//!
//! ```rust,ignore
//! let adults = Predicate::<Person>::field("age").ge(21);
//! let named_a = Predicate::<Person>::field("name").like("A%");
//! let both = adults.clone() & named_a;          // and(adults, named_a)
//! let either = or(adults, Predicate::field("vip").eq(true));
//! ```

use crate::core::entity::Entity;
use crate::core::field::FieldValue;
use moka::sync::Cache;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::OnceLock;

/// Comparison operators for [`Expr::Compare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }

    /// SQL spelling of the operator
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Untyped predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `field <op> value`
    Compare {
        field: String,
        op: CompareOp,
        value: FieldValue,
    },
    /// `field IN (values...)`
    In {
        field: String,
        values: Vec<FieldValue>,
    },
    /// `field LIKE pattern` (`%` any run, `_` one char, `\` escapes)
    Like { field: String, pattern: String },
    /// `field IS NULL` (a missing field counts as null)
    IsNull { field: String },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Evaluate with three-valued logic
    ///
    /// `None` means *unknown*: a comparison involved a missing, null or
    /// incomparable value. `And`/`Or`/`Not` follow Kleene logic so results
    /// agree with SQL engines.
    pub fn evaluate<F>(&self, lookup: &F) -> Option<bool>
    where
        F: Fn(&str) -> Option<FieldValue>,
    {
        match self {
            Expr::Compare { field, op, value } => {
                let actual = lookup(field).unwrap_or(FieldValue::Null);
                if value.is_null() {
                    return match op {
                        CompareOp::Eq => Some(actual.is_null()),
                        CompareOp::Ne => Some(!actual.is_null()),
                        _ => None,
                    };
                }
                actual.compare(value).map(|ordering| op.matches(ordering))
            }
            Expr::In { field, values } => {
                let actual = lookup(field).unwrap_or(FieldValue::Null);
                if actual.is_null() {
                    return None;
                }
                let mut unknown = false;
                for candidate in values {
                    match actual.compare(candidate) {
                        Some(Ordering::Equal) => return Some(true),
                        Some(_) => {}
                        None => unknown = true,
                    }
                }
                if unknown { None } else { Some(false) }
            }
            Expr::Like { field, pattern } => match lookup(field)? {
                FieldValue::String(text) => Some(like_matches(pattern, &text)),
                _ => None,
            },
            Expr::IsNull { field } => Some(lookup(field).is_none_or(|v| v.is_null())),
            Expr::And(left, right) => match (left.evaluate(lookup), right.evaluate(lookup)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Expr::Or(left, right) => match (left.evaluate(lookup), right.evaluate(lookup)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Expr::Not(inner) => inner.evaluate(lookup).map(|b| !b),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Compare { field, op, value } => write!(f, "{} {} {}", field, op.as_sql(), value),
            Expr::In { field, values } => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} IN ({})", field, items.join(", "))
            }
            Expr::Like { field, pattern } => write!(f, "{} LIKE {:?}", field, pattern),
            Expr::IsNull { field } => write!(f, "{} IS NULL", field),
            Expr::And(l, r) => write!(f, "({} AND {})", l, r),
            Expr::Or(l, r) => write!(f, "({} OR {})", l, r),
            Expr::Not(e) => write!(f, "NOT {}", e),
        }
    }
}

/// A boolean expression over one entity of type `T`
pub struct Predicate<T> {
    expr: Expr,
    _entity: PhantomData<fn(&T) -> bool>,
}

impl<T> Predicate<T> {
    /// Wrap an untyped expression
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            expr,
            _entity: PhantomData,
        }
    }

    /// Start a leaf on the given field path
    pub fn field(name: impl Into<String>) -> FieldRef<T> {
        FieldRef {
            name: name.into(),
            _entity: PhantomData,
        }
    }

    /// The underlying tree
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Conjunction; neither side is evaluated
    pub fn and(self, other: Predicate<T>) -> Predicate<T> {
        Predicate::from_expr(Expr::And(Box::new(self.expr), Box::new(other.expr)))
    }

    /// Disjunction; neither side is evaluated
    pub fn or(self, other: Predicate<T>) -> Predicate<T> {
        Predicate::from_expr(Expr::Or(Box::new(self.expr), Box::new(other.expr)))
    }

    /// Negation
    pub fn negate(self) -> Predicate<T> {
        Predicate::from_expr(Expr::Not(Box::new(self.expr)))
    }

    /// Evaluate against an arbitrary field source; unknown counts as false
    pub fn evaluate_with<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<FieldValue>,
    {
        self.expr.evaluate(&lookup).unwrap_or(false)
    }
}

impl<T: Entity> Predicate<T> {
    /// Evaluate against an entity instance
    pub fn evaluate(&self, entity: &T) -> bool {
        self.evaluate_with(|field| entity.field_value(field))
    }
}

/// Combine two predicates with logical AND
pub fn and<T>(left: Predicate<T>, right: Predicate<T>) -> Predicate<T> {
    left.and(right)
}

/// Combine two predicates with logical OR
pub fn or<T>(left: Predicate<T>, right: Predicate<T>) -> Predicate<T> {
    left.or(right)
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Predicate::from_expr(self.expr.clone())
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.expr).finish()
    }
}

impl<T> fmt::Display for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expr.fmt(f)
    }
}

impl<T> PartialEq for Predicate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl<T> BitAnd for Predicate<T> {
    type Output = Predicate<T>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl<T> BitOr for Predicate<T> {
    type Output = Predicate<T>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl<T> Not for Predicate<T> {
    type Output = Predicate<T>;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

/// A field of `T`, used to build comparison leaves
pub struct FieldRef<T> {
    name: String,
    _entity: PhantomData<fn(&T) -> bool>,
}

impl<T> FieldRef<T> {
    fn compare(self, op: CompareOp, value: impl Into<FieldValue>) -> Predicate<T> {
        Predicate::from_expr(Expr::Compare {
            field: self.name,
            op,
            value: value.into(),
        })
    }

    pub fn eq(self, value: impl Into<FieldValue>) -> Predicate<T> {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<FieldValue>) -> Predicate<T> {
        self.compare(CompareOp::Ne, value)
    }

    pub fn gt(self, value: impl Into<FieldValue>) -> Predicate<T> {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<FieldValue>) -> Predicate<T> {
        self.compare(CompareOp::Ge, value)
    }

    pub fn lt(self, value: impl Into<FieldValue>) -> Predicate<T> {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<FieldValue>) -> Predicate<T> {
        self.compare(CompareOp::Le, value)
    }

    pub fn is_in<V, I>(self, values: I) -> Predicate<T>
    where
        V: Into<FieldValue>,
        I: IntoIterator<Item = V>,
    {
        Predicate::from_expr(Expr::In {
            field: self.name,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn like(self, pattern: impl Into<String>) -> Predicate<T> {
        Predicate::from_expr(Expr::Like {
            field: self.name,
            pattern: pattern.into(),
        })
    }

    pub fn is_null(self) -> Predicate<T> {
        Predicate::from_expr(Expr::IsNull { field: self.name })
    }

    pub fn is_not_null(self) -> Predicate<T> {
        self.is_null().negate()
    }
}

// ---------------------------------------------------------------------------
// LIKE matching
// ---------------------------------------------------------------------------

fn like_regex(pattern: &str) -> String {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Upper bound on compiled LIKE patterns kept across evaluations
const LIKE_CACHE_CAPACITY: u64 = 1024;

fn like_cache() -> &'static Cache<String, Regex> {
    static CACHE: OnceLock<Cache<String, Regex>> = OnceLock::new();
    CACHE.get_or_init(|| Cache::new(LIKE_CACHE_CAPACITY))
}

fn like_matches(pattern: &str, text: &str) -> bool {
    let cache = like_cache();
    if let Some(regex) = cache.get(pattern) {
        return regex.is_match(text);
    }

    // Escaped input always yields a valid regex
    let Ok(regex) = Regex::new(&like_regex(pattern)) else {
        return false;
    };
    let matched = regex.is_match(text);
    cache.insert(pattern.to_string(), regex);
    matched
}
