//! Repository contract tests, run against every session backend

/// Generate the repository contract suite.
///
/// `$factory` must evaluate to a fresh `Arc<impl Session>` over an empty
/// store registered with [`catalog()`](super::catalog). It may contain
/// `.await`.
#[macro_export]
macro_rules! repository_tests {
    ($factory:expr) => {
        mod repository_contract_tests {
            use super::*;
            use specrepo::prelude::*;

            // === Query composition ===

            #[tokio::test(flavor = "multi_thread")]
            async fn test_list_all_returns_committed_entities() {
                init_tracing();
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 20), ("Bob", 30)]);

                let all = repo.list_all().unwrap();
                assert_eq!(sorted_names(&all), vec!["Ann", "Bob"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_list_all_uses_configured_dataset() {
                let session = $factory;
                seed_people(&people(&session), &[("Ann", 17), ("Bob", 30), ("Cid", 45)]);

                let adults = Repository::<Person, _>::builder(session.clone())
                    .dataset(|s| Ok(s.set::<Person>().filter(&Predicate::field("age").ge(18))))
                    .build();

                let found = adults.list_all().unwrap();
                assert_eq!(sorted_names(&found), vec!["Bob", "Cid"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_list_criteria_only() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 20), ("Bob", 30), ("Cid", 25)]);

                let spec = Specification::new().where_(Predicate::field("age").ge(21));
                let found = repo.list(&spec).unwrap();
                assert_eq!(sorted_names(&found), vec!["Bob", "Cid"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_empty_specification_lists_everything() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 20), ("Bob", 30), ("Cid", 25)]);

                let found = repo.list(&Specification::new()).unwrap();
                assert_eq!(found.len(), 3);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_and_or_criteria() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 20), ("Bob", 30), ("Cid", 25), ("Dan", 40)]);

                let both = Specification::new().where_(and(
                    Predicate::field("age").gt(21),
                    Predicate::field("age").lt(35),
                ));
                assert_eq!(sorted_names(&repo.list(&both).unwrap()), vec!["Bob", "Cid"]);

                let either = Specification::new().where_(or(
                    Predicate::field("name").eq("Ann"),
                    Predicate::field("age").ge(40),
                ));
                assert_eq!(sorted_names(&repo.list(&either).unwrap()), vec!["Ann", "Dan"]);

                let neither = Specification::new().where_(
                    Predicate::field("name")
                        .eq("Ann")
                        .or(Predicate::field("age").ge(40))
                        .negate(),
                );
                assert_eq!(sorted_names(&repo.list(&neither).unwrap()), vec!["Bob", "Cid"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_repeated_where_narrows() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 20), ("Bob", 30), ("Cid", 25)]);

                let spec = Specification::new()
                    .where_(Predicate::field("age").ge(21))
                    .where_(Predicate::field("name").like("B%"));
                assert_eq!(names(&repo.list(&spec).unwrap()), vec!["Bob"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_in_and_like_predicates() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 20), ("Anna", 30), ("Bob", 25)]);

                let spec = Specification::new()
                    .where_(Predicate::field("age").is_in([20, 25]))
                    .order_by("name");
                assert_eq!(names(&repo.list(&spec).unwrap()), vec!["Ann", "Bob"]);

                let like = repo.find(&Predicate::field("name").like("Ann_")).unwrap();
                assert_eq!(names(&like), vec!["Anna"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_two_key_ordering() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 30), ("Bob", 25), ("Cid", 30), ("Dan", 25)]);

                let spec = Specification::new().order_by("age").then_by_descending("name");
                let found = repo.list(&spec).unwrap();
                assert_eq!(names(&found), vec!["Dan", "Bob", "Cid", "Ann"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_descending_primary_key_ordering() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 30), ("Bob", 25), ("Cid", 40)]);

                let spec = Specification::new().order_by_descending("age");
                assert_eq!(names(&repo.list(&spec).unwrap()), vec!["Cid", "Ann", "Bob"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_timestamp_ordering_with_mixed_precision() {
                let session = $factory;
                let repo = events(&session);
                repo.add(event("half", "2024-01-01T12:00:00.500Z")).unwrap();
                repo.add(event("whole", "2024-01-01T12:00:00Z")).unwrap();
                repo.add(event("next", "2024-01-01T12:00:01Z")).unwrap();
                repo.add(event("early", "2024-01-01T11:59:59.999Z")).unwrap();
                repo.save_changes().unwrap();

                let ascending = repo.list(&Specification::new().order_by("at")).unwrap();
                assert_eq!(event_names(&ascending), vec!["early", "whole", "half", "next"]);

                let descending = repo
                    .list(&Specification::new().order_by_descending("at"))
                    .unwrap();
                assert_eq!(event_names(&descending), vec!["next", "half", "whole", "early"]);

                let after = Specification::new()
                    .where_(Predicate::field("at").gt(timestamp("2024-01-01T12:00:00Z")))
                    .order_by("at");
                assert_eq!(event_names(&repo.list(&after).unwrap()), vec!["half", "next"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_skip_take_window() {
                let session = $factory;
                let repo = people(&session);
                seed_people(
                    &repo,
                    &[("A", 21), ("B", 22), ("C", 23), ("D", 24), ("E", 25)],
                );

                let spec = Specification::new().order_by("age").skip(1).take(2);
                assert_eq!(names(&repo.list(&spec).unwrap()), vec!["B", "C"]);

                // min(N, M - K)
                let tail = Specification::new().order_by("age").skip(4).take(3);
                assert_eq!(names(&repo.list(&tail).unwrap()), vec!["E"]);

                let past_end = Specification::new().order_by("age").skip(10).take(3);
                assert!(repo.list(&past_end).unwrap().is_empty());

                let zero = Specification::new().order_by("age").take(0);
                assert!(repo.list(&zero).unwrap().is_empty());
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_page_window() {
                let session = $factory;
                let repo = people(&session);
                seed_people(
                    &repo,
                    &[("A", 21), ("B", 22), ("C", 23), ("D", 24), ("E", 25)],
                );

                let spec = Specification::new().order_by("age").page(2, 2);
                assert_eq!(names(&repo.list(&spec).unwrap()), vec!["C", "D"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_filter_order_take_end_to_end() {
                let session = $factory;
                let repo = people(&session);
                for (id, age) in [(1, 20), (2, 30), (3, 25)] {
                    repo.add(Person {
                        id,
                        name: format!("p{}", id),
                        age,
                        orders: Vec::new(),
                    })
                    .unwrap();
                }
                repo.save_changes().unwrap();

                let spec = Specification::new()
                    .where_(Predicate::field("age").ge(21))
                    .order_by("age")
                    .take(1)
                    .skip(0);
                let found = repo.list(&spec).unwrap();

                assert_eq!(found.len(), 1);
                assert_eq!(found[0].id, 3);
                assert_eq!(found[0].age, 25);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_specification_is_reusable() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 20), ("Bob", 30)]);

                let spec = Specification::new().where_(Predicate::field("age").ge(21));
                let first = repo.list(&spec).unwrap();

                seed_people(&repo, &[("Cid", 40)]);
                let second = repo.list(&spec).unwrap();

                assert_eq!(names(&first), vec!["Bob"]);
                assert_eq!(sorted_names(&second), vec!["Bob", "Cid"]);
            }

            // === Key lookup ===

            #[tokio::test(flavor = "multi_thread")]
            async fn test_get_by_id() {
                let session = $factory;
                let repo = people(&session);
                let seeded = seed_people(&repo, &[("Ann", 20), ("Bob", 30)]);

                let found = repo.get_by_id(seeded[1].id.into()).unwrap();
                assert_eq!(found, Some(seeded[1].clone()));
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_get_by_id_not_found() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 20)]);

                assert_eq!(repo.get_by_id(999_999.into()).unwrap(), None);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_get_by_id_coerces_key() {
                let session = $factory;
                let repo = people(&session);
                let seeded = seed_people(&repo, &[("Ann", 20)]);

                let found = repo.get_by_id(seeded[0].id.to_string().into()).unwrap();
                assert_eq!(found.map(|p| p.name), Some("Ann".to_string()));

                let err = repo.get_by_id("ann".into()).unwrap_err();
                assert!(matches!(err, RepositoryError::Coercion(_)));
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_get_by_id_ambiguous_key() {
                let session = $factory;
                seed_people(&people(&session), &[("Ann", 30), ("Bob", 30), ("Cid", 40)]);

                let by_age = Repository::<Person, _>::builder(session.clone())
                    .default_dataset()
                    .key("age")
                    .build();

                let found = by_age.get_by_id(40.into()).unwrap();
                assert_eq!(found.map(|p| p.name), Some("Cid".to_string()));

                let err = by_age.get_by_id(30.into()).unwrap_err();
                assert_eq!(err.error_code(), "AMBIGUOUS_KEY");
                assert!(matches!(err, RepositoryError::Cardinality { matches: 2, .. }));
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_uuid_key_lookup() {
                let session = $factory;
                let lines = order_lines(&session);
                let added = lines.add(line(1, "tea", 2)).unwrap();
                assert!(!added.id.is_nil());
                lines.save_changes().unwrap();

                let found = lines.get_by_id(added.id.to_string().into()).unwrap();
                assert_eq!(found, Some(added));
            }

            // === Unit of work ===

            #[tokio::test(flavor = "multi_thread")]
            async fn test_add_then_get() {
                let session = $factory;
                let repo = people(&session);

                let ann = repo.add(person("Ann", 20)).unwrap();
                assert_ne!(ann.id, 0);
                assert_eq!(repo.save_changes().unwrap(), 1);

                assert_eq!(repo.get_by_id(ann.id.into()).unwrap(), Some(ann));
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_generated_keys_are_distinct() {
                let session = $factory;
                let repo = people(&session);

                let ann = repo.add(person("Ann", 20)).unwrap();
                let bob = repo.add(person("Bob", 30)).unwrap();
                assert_ne!(ann.id, bob.id);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_unsaved_changes_are_invisible() {
                let session = $factory;
                let repo = people(&session);

                repo.add(person("Ann", 20)).unwrap();
                assert!(repo.list_all().unwrap().is_empty());

                repo.save_changes().unwrap();
                assert_eq!(repo.list_all().unwrap().len(), 1);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_update_then_get() {
                let session = $factory;
                let repo = people(&session);
                let mut ann = seed_people(&repo, &[("Ann", 20)]).remove(0);

                ann.age = 21;
                let updated = repo.update(ann.clone()).unwrap();
                assert_eq!(updated, ann);
                assert_eq!(repo.save_changes().unwrap(), 1);

                let found = repo.get_by_id(ann.id.into()).unwrap().unwrap();
                assert_eq!(found.age, 21);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_delete_then_get() {
                let session = $factory;
                let repo = people(&session);
                let seeded = seed_people(&repo, &[("Ann", 20), ("Bob", 30)]);

                repo.delete(&seeded[0]).unwrap();
                assert_eq!(repo.save_changes().unwrap(), 1);

                assert_eq!(repo.get_by_id(seeded[0].id.into()).unwrap(), None);
                assert_eq!(names(&repo.list_all().unwrap()), vec!["Bob"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_save_without_changes() {
                let session = $factory;
                let repo = people(&session);
                assert_eq!(repo.save_changes().unwrap(), 0);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_repositories_share_unit_of_work() {
                let session = $factory;
                let people_repo = people(&session);
                let orders_repo = orders(&session);

                let ann = people_repo.add(person("Ann", 20)).unwrap();
                orders_repo.add(order(ann.id, 100)).unwrap();

                // One commit covers both repositories.
                assert_eq!(orders_repo.save_changes().unwrap(), 2);
                assert_eq!(people_repo.list_all().unwrap().len(), 1);
                assert_eq!(orders_repo.list_all().unwrap().len(), 1);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_failed_commit_is_atomic() {
                let session = $factory;
                let repo = people(&session);
                let ann = seed_people(&repo, &[("Ann", 20)]).remove(0);

                let bob = repo.add(person("Bob", 30)).unwrap();
                let mut ghost = person("Ghost", 99);
                ghost.id = ann.id + 1_000;
                repo.update(ghost).unwrap();

                let err = repo.save_changes().unwrap_err();
                assert_eq!(err.error_code(), "STORAGE_INTEGRITY_ERROR");

                assert_eq!(names(&repo.list_all().unwrap()), vec!["Ann"]);
                assert_eq!(repo.entity_state(&bob).unwrap(), EntityState::Added);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_duplicate_key_is_rejected() {
                let session = $factory;
                let repo = people(&session);
                let ann = seed_people(&repo, &[("Ann", 20)]).remove(0);

                let mut twin = person("Twin", 20);
                twin.id = ann.id;
                repo.add(twin).unwrap();

                let err = repo.save_changes().unwrap_err();
                assert!(matches!(
                    err,
                    RepositoryError::Storage(StorageError::IntegrityError { .. })
                ));
                assert_eq!(names(&repo.list_all().unwrap()), vec!["Ann"]);
            }

            // === Entity state ===

            #[tokio::test(flavor = "multi_thread")]
            async fn test_entity_state_transitions() {
                let session = $factory;
                let repo = people(&session);

                let ann = repo.add(person("Ann", 20)).unwrap();
                assert_eq!(repo.entity_state(&ann).unwrap(), EntityState::Added);

                repo.save_changes().unwrap();
                assert_eq!(repo.entity_state(&ann).unwrap(), EntityState::Unchanged);

                repo.update(ann.clone()).unwrap();
                assert_eq!(repo.entity_state(&ann).unwrap(), EntityState::Modified);
                repo.save_changes().unwrap();

                repo.delete(&ann).unwrap();
                assert_eq!(repo.entity_state(&ann).unwrap(), EntityState::Deleted);

                repo.save_changes().unwrap();
                assert_eq!(repo.entity_state(&ann).unwrap(), EntityState::Detached);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_deleting_added_entity_cancels_insert() {
                let session = $factory;
                let repo = people(&session);

                let ann = repo.add(person("Ann", 20)).unwrap();
                repo.delete(&ann).unwrap();

                assert_eq!(repo.entity_state(&ann).unwrap(), EntityState::Detached);
                assert_eq!(repo.save_changes().unwrap(), 0);
                assert!(repo.list_all().unwrap().is_empty());
            }

            // === Eager loading ===

            #[tokio::test(flavor = "multi_thread")]
            async fn test_include_collection() {
                let session = $factory;
                let people_repo = people(&session);
                let orders_repo = orders(&session);

                let seeded = seed_people(&people_repo, &[("Ann", 20), ("Bob", 30)]);
                orders_repo.add(order(seeded[0].id, 10)).unwrap();
                orders_repo.add(order(seeded[0].id, 20)).unwrap();
                orders_repo.save_changes().unwrap();

                let plain = people_repo.list(&Specification::new().order_by("name")).unwrap();
                assert!(plain.iter().all(|p| p.orders.is_empty()));

                let spec = Specification::new().include("orders").order_by("name");
                let loaded = people_repo.list(&spec).unwrap();

                let mut totals: Vec<i64> = loaded[0].orders.iter().map(|o| o.total).collect();
                totals.sort_unstable();
                assert_eq!(totals, vec![10, 20]);
                assert!(loaded[1].orders.is_empty());
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_include_nested_path() {
                let session = $factory;
                let ann = seed_people(&people(&session), &[("Ann", 20)]).remove(0);

                let orders_repo = orders(&session);
                let first = orders_repo.add(order(ann.id, 10)).unwrap();
                orders_repo.save_changes().unwrap();

                let lines = order_lines(&session);
                lines.add(line(first.id, "tea", 1)).unwrap();
                lines.add(line(first.id, "milk", 2)).unwrap();
                lines.save_changes().unwrap();

                let spec = Specification::new().include("orders.lines");
                let loaded = people(&session).list(&spec).unwrap();

                assert_eq!(loaded[0].orders.len(), 1);
                let mut products: Vec<&str> = loaded[0].orders[0]
                    .lines
                    .iter()
                    .map(|l| l.product.as_str())
                    .collect();
                products.sort_unstable();
                assert_eq!(products, vec!["milk", "tea"]);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_include_reference() {
                let session = $factory;
                let ann = seed_people(&people(&session), &[("Ann", 20)]).remove(0);

                let orders_repo = orders(&session);
                orders_repo.add(order(ann.id, 10)).unwrap();
                orders_repo.save_changes().unwrap();

                let loaded = orders_repo
                    .list(&Specification::new().include("person"))
                    .unwrap();
                let owner = loaded[0].person.as_ref().expect("person loaded");
                assert_eq!(owner.name, "Ann");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_include_unknown_navigation() {
                let session = $factory;
                let repo = people(&session);
                seed_people(&repo, &[("Ann", 20)]);

                let err = repo
                    .list(&Specification::new().include("pets"))
                    .unwrap_err();
                assert!(matches!(
                    err,
                    RepositoryError::Config(ConfigError::UnknownNavigation { .. })
                ));
            }

            // === Async and cancellation ===

            #[tokio::test(flavor = "multi_thread")]
            async fn test_async_round_trip() {
                let session = $factory;
                let repo = people(&session);
                let cancel = CancellationToken::new();

                let ann = tokio_test::assert_ok!(repo.add_async(person("Ann", 20), &cancel).await);
                let bob = repo.add_async(person("Bob", 30), &cancel).await.unwrap();
                assert_eq!(repo.save_changes_async(&cancel).await.unwrap(), 2);

                let found = repo.get_by_id_async(ann.id.into(), &cancel).await.unwrap();
                assert_eq!(found, Some(ann.clone()));

                let spec = Specification::new().where_(Predicate::field("age").ge(21));
                let adults = repo.list_async(&spec, &cancel).await.unwrap();
                assert_eq!(names(&adults), vec!["Bob"]);

                let all = repo.list_all_async(&cancel).await.unwrap();
                assert_eq!(all.len(), 2);

                let found = repo
                    .find_async(&Predicate::field("name").eq("Ann"), &cancel)
                    .await
                    .unwrap();
                assert_eq!(found, vec![ann.clone()]);

                let mut older = bob.clone();
                older.age = 31;
                repo.update_async(older, &cancel).await.unwrap();
                repo.delete_async(&ann, &cancel).await.unwrap();
                assert_eq!(repo.save_changes_async(&cancel).await.unwrap(), 2);

                let remaining = repo.list_all_async(&cancel).await.unwrap();
                assert_eq!(remaining.len(), 1);
                assert_eq!(remaining[0].age, 31);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_cancelled_token() {
                let session = $factory;
                let repo = people(&session);
                let ann = seed_people(&repo, &[("Ann", 20)]).remove(0);

                let cancel = CancellationToken::new();
                cancel.cancel();

                let err = tokio_test::assert_err!(repo.list_all_async(&cancel).await);
                assert!(err.is_cancelled());
                assert_eq!(err.error_code(), "CANCELLED");

                assert!(repo.list_async(&Specification::new(), &cancel).await.unwrap_err().is_cancelled());
                assert!(repo.get_by_id_async(ann.id.into(), &cancel).await.unwrap_err().is_cancelled());
                assert!(repo.add_async(person("Bob", 30), &cancel).await.unwrap_err().is_cancelled());
                assert!(repo.update_async(ann.clone(), &cancel).await.unwrap_err().is_cancelled());
                assert!(repo.delete_async(&ann, &cancel).await.unwrap_err().is_cancelled());

                // Cancelled operations leave nothing pending.
                assert_eq!(repo.entity_state(&ann).unwrap(), EntityState::Unchanged);
                assert_eq!(repo.save_changes().unwrap(), 0);
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn test_cancelled_save_keeps_changes_pending() {
                let session = $factory;
                let repo = people(&session);
                let ann = repo.add(person("Ann", 20)).unwrap();

                let cancel = CancellationToken::new();
                cancel.cancel();
                assert!(repo.save_changes_async(&cancel).await.unwrap_err().is_cancelled());

                assert_eq!(repo.entity_state(&ann).unwrap(), EntityState::Added);
                assert_eq!(repo.save_changes().unwrap(), 1);
            }
        }
    };
}
