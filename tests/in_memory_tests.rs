//! Integration tests for InMemorySession using the repository harness.
//!
//! Invokes `repository_tests!` to validate that the in-memory session fully
//! conforms to the repository contract.

#[macro_use]
mod repository_harness;

use repository_harness::*;
use specrepo::core::EntityRepository;
use specrepo::storage::InMemorySession;
use std::sync::Arc;

repository_tests!(Arc::new(InMemorySession::new(catalog())));

#[test]
fn test_sync_calls_without_runtime() {
    let session = Arc::new(InMemorySession::new(catalog()));
    let repo = people(&session);

    seed_people(&repo, &[("Ann", 20), ("Bob", 30)]);

    assert_eq!(session.row_count("person").unwrap(), 2);
    assert_eq!(session.pending_changes().unwrap(), 0);
}

#[test]
fn test_clones_share_store_not_changes() {
    let session = Arc::new(InMemorySession::new(catalog()));
    let other = Arc::new(session.as_ref().clone());

    people(&session).add(person("Ann", 20)).unwrap();
    assert_eq!(session.pending_changes().unwrap(), 1);
    assert_eq!(other.pending_changes().unwrap(), 0);

    people(&session).save_changes().unwrap();
    assert_eq!(people(&other).list_all().unwrap().len(), 1);
}

#[test]
fn test_identity_continues_after_explicit_keys() {
    let session = Arc::new(InMemorySession::new(catalog()));
    let repo = people(&session);

    let mut fixed = person("Fixed", 50);
    fixed.id = 10;
    repo.add(fixed).unwrap();
    repo.save_changes().unwrap();

    let next = repo.add(person("Next", 20)).unwrap();
    assert_eq!(next.id, 11);
}
