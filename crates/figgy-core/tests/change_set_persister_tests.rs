//! Change-Set Persister Tests
//!
//! ## Scenarios Covered
//!
//! 1. Phase ordering for create and update
//! 2. Post-commit handlers run inline outside a buffer, deferred inside
//! 3. A failing buffered block discards deferred work and rolls back
//! 4. after_update_commit only fires for updates
//! 5. after_rollback compensations
//! 6. Partial failure while flushing the delayed queue
//! 7. Redirecting through another adapter with `with` / `with_scope`

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{entries, memory_persister, new_log, persister_over, recorder, RecordingAround};
use figgy_core::adapter::{IndexingAdapter, MemoryAdapter, MetadataAdapter};
use figgy_core::queue::CallbackQueue;
use figgy_core::storage::MemoryStorage;
use figgy_core::{ChangeSet, FiggyError, HandlerRegistry, Phase, Resource};
use proptest::prelude::*;
use std::sync::Arc;

fn full_registry(log: &common::Log) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    let around_log = log.clone();
    registry
        .around_save(move || {
            Box::new(RecordingAround {
                log: around_log.clone(),
                name: "around".to_string(),
            })
        })
        .register_fn(Phase::BeforeSave, recorder(log, "before_save:1"))
        .register_fn(Phase::BeforeSave, recorder(log, "before_save:2"))
        .register_fn(Phase::AfterSave, recorder(log, "after_save:1"))
        .register_fn(Phase::AfterSave, recorder(log, "after_save:2"))
        .register_fn(Phase::AfterUpdateCommit, recorder(log, "after_update_commit"))
        .register_fn(Phase::AfterSaveCommit, recorder(log, "after_save_commit"))
        .register_fn(Phase::AfterCommit, recorder(log, "after_commit"))
        .register_fn(Phase::BeforeDelete, recorder(log, "before_delete"))
        .register_fn(Phase::AfterDeleteCommit, recorder(log, "after_delete_commit"));
    registry
}

fn indexing_setup(
    registry: HandlerRegistry,
) -> (MemoryAdapter, MemoryAdapter, figgy_core::ChangeSetPersister) {
    let primary = MemoryAdapter::new();
    let index = MemoryAdapter::search_index();
    let adapter = IndexingAdapter::new(Arc::new(primary.clone()), Arc::new(index.clone()));
    let persister = persister_over(Arc::new(adapter), registry);
    (primary, index, persister)
}

#[test]
fn test_phase_order_on_create() {
    // GIVEN a persister with handlers in every phase
    let log = new_log();
    let (_adapter, persister) = memory_persister(full_registry(&log));

    // WHEN a new resource is saved
    persister
        .save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)
        .unwrap();

    // THEN phases run in order and the update-only phase is skipped
    assert_eq!(
        entries(&log),
        vec![
            "around:before",
            "before_save:1",
            "before_save:2",
            "after_save:1",
            "after_save:2",
            "around:after",
            "after_save_commit",
            "after_commit",
        ]
    );
}

#[test]
fn test_phase_order_on_update() {
    // GIVEN a saved resource
    let log = new_log();
    let (_adapter, persister) = memory_persister(full_registry(&log));
    let saved = persister
        .save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)
        .unwrap();
    log.lock().unwrap().clear();

    // WHEN it is saved again
    let mut change_set = ChangeSet::new(saved);
    change_set.set("title", "Updated");
    persister.save(&mut change_set, false).unwrap();

    // THEN after_update_commit runs ahead of the other post-commit phases
    assert_eq!(
        entries(&log),
        vec![
            "around:before",
            "before_save:1",
            "before_save:2",
            "after_save:1",
            "after_save:2",
            "around:after",
            "after_update_commit",
            "after_save_commit",
            "after_commit",
        ]
    );
}

#[test]
fn test_update_only_phase_never_fires_on_create() {
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    registry.register_fn(Phase::AfterUpdateCommit, recorder(&log, "update"));
    let (_adapter, persister) = memory_persister(registry);

    let saved = persister
        .save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)
        .unwrap();
    assert!(entries(&log).is_empty());

    persister.save(&mut ChangeSet::new(saved), false).unwrap();
    assert_eq!(entries(&log), vec!["update"]);
}

#[test]
fn test_delete_phase_order() {
    let log = new_log();
    let (adapter, persister) = memory_persister(full_registry(&log));
    let saved = persister
        .save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)
        .unwrap();
    log.lock().unwrap().clear();

    let deleted = persister.delete(&mut ChangeSet::new(saved.clone())).unwrap();

    assert_eq!(deleted.id, saved.id);
    assert!(adapter.is_empty());
    assert_eq!(entries(&log), vec!["before_delete", "after_delete_commit"]);
}

#[test]
fn test_after_commit_runs_before_save_returns_outside_buffer() {
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    registry.register_fn(Phase::AfterCommit, recorder(&log, "after_commit"));
    let (_adapter, persister) = memory_persister(registry);

    persister
        .save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)
        .unwrap();

    assert_eq!(entries(&log), vec!["after_commit"]);
}

#[test]
fn test_after_commit_waits_for_buffered_block() {
    // GIVEN an after_commit handler
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    registry.register_fn(Phase::AfterCommit, recorder(&log, "after_commit"));
    let (_primary, _index, persister) = indexing_setup(registry);

    // WHEN saving inside buffer_into_index
    persister
        .buffer_into_index(|buffered| {
            assert!(buffered.is_transaction());
            buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
            // THEN nothing has fired while the block is still running
            assert!(entries(&log).is_empty());
            assert_eq!(buffered.pending_callbacks(), 1);
            Ok(())
        })
        .unwrap();

    // AND the handler fires once the block completes
    assert_eq!(entries(&log), vec!["after_commit"]);
}

#[test]
fn test_deferred_callbacks_keep_queue_order_across_operations() {
    let log = new_log();
    let (_primary, _index, persister) = indexing_setup(full_registry(&log));

    persister
        .buffer_into_index(|buffered| {
            let first =
                buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
            buffered.delete(&mut ChangeSet::new(first))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "around:before",
            "before_save:1",
            "before_save:2",
            "after_save:1",
            "after_save:2",
            "around:after",
            "before_delete",
            "after_save_commit",
            "after_commit",
            "after_delete_commit",
        ]
    );
}

#[test]
fn test_buffer_flushes_index_once() {
    let (primary, index, persister) = indexing_setup(HandlerRegistry::new());

    persister
        .buffer_into_index(|buffered| {
            buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
            buffered.save(&mut ChangeSet::new(Resource::new("FileSet")), false)?;
            assert_eq!(index.write_count(), 0);
            Ok(())
        })
        .unwrap();

    assert_eq!(primary.len(), 2);
    assert_eq!(index.len(), 2);
    assert_eq!(index.write_count(), 2);
}

#[test]
fn test_failed_block_discards_deferred_work_and_reraises() {
    // GIVEN post-commit handlers and an indexing backend
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn(Phase::AfterSaveCommit, recorder(&log, "after_save_commit"))
        .register_fn(Phase::AfterCommit, recorder(&log, "after_commit"));
    let (primary, index, persister) = indexing_setup(registry);
    let abort = FiggyError::InvalidInput {
        reason: "abort ingest".to_string(),
    };

    // WHEN the block fails after saving
    let result: figgy_core::Result<()> = persister.buffer_into_index(|buffered| {
        buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
        Err(abort.clone())
    });

    // THEN the original error comes back unchanged
    assert_eq!(result.unwrap_err(), abort);
    // AND no queued handler ran
    assert!(entries(&log).is_empty());
    // AND neither backend kept the write
    assert!(primary.is_empty());
    assert!(index.is_empty());
}

#[test]
fn test_after_rollback_runs_only_on_failure() {
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    let undo_log = log.clone();
    registry.register_fn(Phase::BeforeSave, move |ctx| {
        let undo_log = undo_log.clone();
        ctx.change_set_persister
            .after_rollback()
            .add(Box::new(move || {
                undo_log.lock().unwrap().push("undo".to_string());
                Ok(())
            }))
    });
    let (_primary, _index, persister) = indexing_setup(registry);

    persister
        .buffer_into_index(|buffered| {
            buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
            Ok(())
        })
        .unwrap();
    assert!(entries(&log).is_empty());

    let result: figgy_core::Result<()> = persister.buffer_into_index(|buffered| {
        buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
        buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
        Err(FiggyError::InvalidInput {
            reason: "abort".to_string(),
        })
    });
    assert!(result.is_err());
    assert_eq!(entries(&log), vec!["undo", "undo"]);
    assert!(persister.after_rollback().is_empty());
}

#[test]
fn test_failing_rollback_action_does_not_mask_error() {
    let mut registry = HandlerRegistry::new();
    registry.register_fn(Phase::BeforeSave, |ctx| {
        ctx.change_set_persister
            .after_rollback()
            .add(Box::new(|| Err(FiggyError::handler("undo", "cannot undo"))))
    });
    let (_primary, _index, persister) = indexing_setup(registry);

    let result: figgy_core::Result<()> = persister.buffer_into_index(|buffered| {
        buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
        Err(FiggyError::InvalidInput {
            reason: "abort".to_string(),
        })
    });

    assert!(matches!(result, Err(FiggyError::InvalidInput { .. })));
}

#[test]
fn test_inline_after_commit_failure_leaves_compensations_unrun() {
    // GIVEN a plain persister: before_save registers an undo, after_commit fails
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    let undo_log = log.clone();
    registry
        .register_fn(Phase::BeforeSave, move |ctx| {
            let undo_log = undo_log.clone();
            ctx.change_set_persister
                .after_rollback()
                .add(Box::new(move || {
                    undo_log.lock().unwrap().push("undo".to_string());
                    Ok(())
                }))
        })
        .register_fn(Phase::AfterCommit, |_ctx| {
            Err(FiggyError::handler("publish", "broker down"))
        });
    let (adapter, persister) = memory_persister(registry);

    // WHEN a save commits and its post-commit handler fails
    let result = persister.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false);

    // THEN the handler error reaches the caller
    assert!(matches!(result, Err(FiggyError::Handler { .. })));
    // AND the write stays while its compensation never runs
    assert_eq!(adapter.len(), 1);
    assert!(entries(&log).is_empty());
    assert!(persister.after_rollback().is_empty());
}

#[test]
fn test_delayed_queue_failure_propagates_after_commit() {
    // GIVEN a post-commit handler that fails after one that succeeds
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn(Phase::AfterCommit, recorder(&log, "notify"))
        .register_fn(Phase::AfterCommit, |_ctx| {
            Err(FiggyError::handler("publish", "broker down"))
        });
    let (primary, _index, persister) = indexing_setup(registry);

    // WHEN two resources are saved in one buffered block
    let result = persister.buffer_into_index(|buffered| {
        buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
        buffered.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
        Ok(())
    });

    // THEN the handler error reaches the caller
    assert!(matches!(result, Err(FiggyError::Handler { .. })));
    // AND callbacks before the failure stayed applied; later ones never ran
    assert_eq!(entries(&log), vec!["notify"]);
    // AND the committed writes are not undone
    assert_eq!(primary.len(), 2);
}

#[test]
fn test_before_save_error_aborts_remaining_phases() {
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn(Phase::BeforeSave, |_ctx| {
            Err(FiggyError::handler("mint", "no identifier"))
        })
        .register_fn(Phase::BeforeSave, recorder(&log, "before_save:2"))
        .register_fn(Phase::AfterSave, recorder(&log, "after_save"));
    let (adapter, persister) = memory_persister(registry);

    let result = persister.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false);

    assert!(matches!(result, Err(FiggyError::Handler { .. })));
    assert!(entries(&log).is_empty());
    assert!(adapter.is_empty());
}

#[test]
fn test_stale_object_surfaces_unchanged() {
    let (_adapter, persister) = memory_persister(HandlerRegistry::new());
    let saved = persister
        .save(
            &mut ChangeSet::new(Resource::new("ScannedResource").with_optimistic_locking()),
            false,
        )
        .unwrap();
    persister
        .save(&mut ChangeSet::new(saved.clone()), false)
        .unwrap();

    let result = persister.save(&mut ChangeSet::new(saved), false);

    assert!(matches!(
        result,
        Err(FiggyError::StaleObject {
            expected: Some(1),
            actual: Some(2),
            ..
        })
    ));
}

#[test]
fn test_external_resource_is_passed_through() {
    let (_adapter, persister) = memory_persister(HandlerRegistry::new());
    let mut external = Resource::new("ScannedResource").with_id("from-elsewhere");
    external.new_record = false;

    assert!(matches!(
        persister.save(&mut ChangeSet::new(external.clone()), false),
        Err(FiggyError::ObjectNotFound { .. })
    ));
    let saved = persister.save(&mut ChangeSet::new(external), true).unwrap();
    assert_eq!(saved.id.unwrap().as_str(), "from-elsewhere");
}

#[test]
fn test_save_all_saves_in_order() {
    let (adapter, persister) = memory_persister(HandlerRegistry::new());
    let mut change_sets: Vec<ChangeSet> = ["first", "second", "third"]
        .iter()
        .map(|title| ChangeSet::new(Resource::new("ScannedResource").with_attribute("title", *title)))
        .collect();

    let saved = persister.save_all(&mut change_sets).unwrap();

    assert_eq!(saved.len(), 3);
    let titles: Vec<_> = adapter
        .query_service()
        .find_all()
        .unwrap()
        .iter()
        .map(|r| r.attribute("title").cloned().unwrap())
        .collect();
    assert_eq!(titles, vec!["first", "second", "third"]);
}

#[test]
fn test_nested_buffer_reuses_transactional_instance() {
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    registry.register_fn(Phase::AfterCommit, recorder(&log, "after_commit"));
    let (_primary, index, persister) = indexing_setup(registry);

    persister
        .buffer_into_index(|outer| {
            outer.buffer_into_index(|inner| {
                inner.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)
            })?;
            assert!(entries(&log).is_empty());
            assert_eq!(index.write_count(), 0);
            Ok(())
        })
        .unwrap();

    assert_eq!(entries(&log), vec!["after_commit"]);
    assert_eq!(index.write_count(), 1);
}

#[test]
fn test_with_scope_redirects_and_defers() {
    // GIVEN a persister over one adapter and a second adapter to redirect to
    let log = new_log();
    let mut registry = HandlerRegistry::new();
    registry.register_fn(Phase::AfterCommit, recorder(&log, "after_commit"));
    let (original, persister) = memory_persister(registry);
    let other = MemoryAdapter::new();

    // WHEN saving through with_scope
    persister
        .with_scope(
            Arc::new(other.clone()),
            Arc::new(MemoryStorage::new()),
            |scoped| {
                scoped.save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)?;
                // THEN the handler waits for run_deferred
                assert!(entries(&log).is_empty());
                scoped.run_deferred()
            },
        )
        .unwrap();

    // AND the write went to the other adapter
    assert!(original.is_empty());
    assert_eq!(other.len(), 1);
    assert_eq!(entries(&log), vec!["after_commit"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_handlers_run_in_registration_order(before in 1usize..6, after in 1usize..6) {
        let log = new_log();
        let mut registry = HandlerRegistry::new();
        for i in 0..before {
            registry.register_fn(Phase::BeforeSave, recorder(&log, &format!("before:{i}")));
        }
        for i in 0..after {
            registry.register_fn(Phase::AfterSave, recorder(&log, &format!("after:{i}")));
        }
        let (_adapter, persister) = memory_persister(registry);

        persister
            .save(&mut ChangeSet::new(Resource::new("ScannedResource")), false)
            .unwrap();

        let expected: Vec<String> = (0..before)
            .map(|i| format!("before:{i}"))
            .chain((0..after).map(|i| format!("after:{i}")))
            .collect();
        prop_assert_eq!(entries(&log), expected);
    }
}
