//! Shared fixtures for the repository contract suite
//!
//! Backend test files pull this in with:
//!
//! ```rust,ignore
//! #[macro_use]
//! mod repository_harness;
//! ```
//!
//! and instantiate the suite with a factory expression returning
//! `Arc<impl Session>`:
//!
//! ```rust,ignore
//! repository_tests!(Arc::new(InMemorySession::new(catalog())));
//! ```

#![allow(dead_code)]

pub mod repository_tests;

use serde::{Deserialize, Serialize};
use specrepo::prelude::*;

// ---------------------------------------------------------------------------
// Test entities
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i64,
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl Entity for Person {
    fn entity_name() -> &'static str {
        "person"
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub person_id: i64,
    pub total: i64,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    #[serde(default)]
    pub person: Option<Box<Person>>,
}

impl Entity for Order {
    fn entity_name() -> &'static str {
        "order"
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: i64,
    pub product: String,
    pub quantity: i64,
}

impl Entity for OrderLine {
    fn entity_name() -> &'static str {
        "order_line"
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub at: DateTime<Utc>,
}

impl Entity for Event {
    fn entity_name() -> &'static str {
        "event"
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Catalog for the test entities
pub fn catalog() -> ModelCatalog {
    ModelCatalog::new()
        .with(
            EntityModel::of::<Person>()
                .table("people")
                .key("id", ValueKind::Integer, KeyGeneration::Identity)
                .navigation(Navigation::has_many("orders", "order", "person_id")),
        )
        .with(
            EntityModel::of::<Order>()
                .table("orders")
                .key("id", ValueKind::Integer, KeyGeneration::Identity)
                .navigation(Navigation::has_many("lines", "order_line", "order_id"))
                .navigation(Navigation::belongs_to("person", "person", "person_id")),
        )
        .with(
            EntityModel::of::<OrderLine>()
                .table("order_lines")
                .key("id", ValueKind::Uuid, KeyGeneration::Uuid),
        )
        .with(
            EntityModel::of::<Event>()
                .table("events")
                .key("id", ValueKind::Integer, KeyGeneration::Identity),
        )
}

pub fn person(name: &str, age: i64) -> Person {
    Person {
        id: 0,
        name: name.to_string(),
        age,
        orders: Vec::new(),
    }
}

pub fn order(person_id: i64, total: i64) -> Order {
    Order {
        id: 0,
        person_id,
        total,
        lines: Vec::new(),
        person: None,
    }
}

pub fn line(order_id: i64, product: &str, quantity: i64) -> OrderLine {
    OrderLine {
        id: Uuid::nil(),
        order_id,
        product: product.to_string(),
        quantity,
    }
}

pub fn event(name: &str, at: &str) -> Event {
    Event {
        id: 0,
        name: name.to_string(),
        at: timestamp(at),
    }
}

pub fn timestamp(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

pub fn people<S: Session>(session: &Arc<S>) -> Repository<Person, S> {
    Repository::builder(session.clone()).conventions().build()
}

pub fn orders<S: Session>(session: &Arc<S>) -> Repository<Order, S> {
    Repository::builder(session.clone()).conventions().build()
}

pub fn order_lines<S: Session>(session: &Arc<S>) -> Repository<OrderLine, S> {
    Repository::builder(session.clone()).conventions().build()
}

pub fn events<S: Session>(session: &Arc<S>) -> Repository<Event, S> {
    Repository::builder(session.clone()).conventions().build()
}

pub fn event_names(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.name.as_str()).collect()
}

/// Add and commit people, returning them with their generated keys
pub fn seed_people<S: Session>(repo: &Repository<Person, S>, rows: &[(&str, i64)]) -> Vec<Person> {
    let added: Vec<Person> = rows
        .iter()
        .map(|(name, age)| repo.add(person(name, *age)).expect("add person"))
        .collect();
    repo.save_changes().expect("save people");
    added
}

pub fn names(people: &[Person]) -> Vec<&str> {
    people.iter().map(|p| p.name.as_str()).collect()
}

pub fn sorted_names(people: &[Person]) -> Vec<&str> {
    let mut names = names(people);
    names.sort_unstable();
    names
}

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
