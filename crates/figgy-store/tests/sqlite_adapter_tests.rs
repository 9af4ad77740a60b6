//! SQLite Metadata Adapter Tests
//!
//! ## Scenarios Covered
//!
//! 1. Save assigns ids and reads back identical resources
//! 2. Optimistic locking and the persisted-resource check
//! 3. Savepoint rollback discards writes
//! 4. Membership, parent and reference lookups
//! 5. Data survives reopening a file-backed database

#![allow(clippy::unwrap_used, clippy::expect_used)]

use figgy_core::adapter::{in_transaction, MetadataAdapter};
use figgy_core::{FiggyError, Resource};
use figgy_store::SqliteAdapter;
use serde_json::json;

fn adapter() -> SqliteAdapter {
    SqliteAdapter::open_in_memory().expect("in-memory sqlite")
}

#[test]
fn test_save_and_find_round_trip() {
    // GIVEN an empty database
    let adapter = adapter();

    // WHEN a new resource is saved
    let saved = adapter
        .persister()
        .save(
            Resource::new("ScannedResource")
                .with_attribute("title", "Map of Trenton")
                .with_attribute("page_count", 12),
            false,
        )
        .unwrap();

    // THEN it has an id and reads back unchanged
    assert!(saved.persisted());
    let loaded = adapter
        .query_service()
        .find_by(saved.id.as_ref().unwrap())
        .unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded.attribute("page_count"), Some(&json!(12)));
}

#[test]
fn test_update_keeps_created_at_and_position() {
    let adapter = adapter();
    let persister = adapter.persister();
    let first = persister.save(Resource::new("ScannedResource"), false).unwrap();
    let second = persister.save(Resource::new("ScannedResource"), false).unwrap();

    let mut changed = first.clone();
    changed.set("title", "Revised");
    let updated = persister.save(changed, false).unwrap();

    assert_eq!(updated.created_at, first.created_at);
    let all = adapter.query_service().find_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, first.id);
    assert_eq!(all[0].attribute("title"), Some(&json!("Revised")));
    assert_eq!(all[1].id, second.id);
}

#[test]
fn test_find_all_of_model_filters() {
    let adapter = adapter();
    let persister = adapter.persister();
    persister.save(Resource::new("ScannedResource"), false).unwrap();
    persister.save(Resource::new("FileSet"), false).unwrap();
    persister.save(Resource::new("FileSet"), false).unwrap();

    let file_sets = adapter.query_service().find_all_of_model("FileSet").unwrap();
    assert_eq!(file_sets.len(), 2);
    assert!(file_sets.iter().all(|r| r.model == "FileSet"));
}

#[test]
fn test_stale_lock_is_rejected_and_store_untouched() {
    // GIVEN a locked resource saved twice
    let adapter = adapter();
    let persister = adapter.persister();
    let v1 = persister
        .save(Resource::new("ScannedResource").with_optimistic_locking(), false)
        .unwrap();
    let v2 = persister.save(v1.clone(), false).unwrap();
    assert_eq!(v2.lock_version, Some(2));

    // WHEN the outdated copy is saved
    let mut stale = v1;
    stale.set("title", "lost update");
    let result = persister.save(stale, false);

    // THEN a stale object error comes back and the stored copy is unchanged
    assert!(matches!(
        result,
        Err(FiggyError::StaleObject {
            expected: Some(1),
            actual: Some(2),
            ..
        })
    ));
    let stored = adapter
        .query_service()
        .find_by(v2.id.as_ref().unwrap())
        .unwrap();
    assert_eq!(stored.lock_version, Some(2));
    assert_eq!(stored.attribute("title"), None);
}

#[test]
fn test_missing_persisted_resource_needs_external_flag() {
    let adapter = adapter();
    let mut foreign = Resource::new("ScannedResource").with_id("from-elsewhere");
    foreign.new_record = false;

    let result = adapter.persister().save(foreign.clone(), false);
    assert!(matches!(result, Err(FiggyError::ObjectNotFound { id }) if id == "from-elsewhere"));

    let saved = adapter.persister().save(foreign, true).unwrap();
    assert_eq!(saved.id.unwrap().as_str(), "from-elsewhere");
}

#[test]
fn test_delete_removes_row() {
    let adapter = adapter();
    let saved = adapter
        .persister()
        .save(Resource::new("FileSet"), false)
        .unwrap();

    adapter.persister().delete(saved.clone()).unwrap();

    let result = adapter.query_service().find_by(saved.id.as_ref().unwrap());
    assert!(matches!(result, Err(FiggyError::ObjectNotFound { .. })));
}

#[test]
fn test_failed_transaction_rolls_back_writes() {
    // GIVEN an open savepoint
    let adapter = adapter();
    let persister = adapter.persister();

    // WHEN the block writes and then fails
    let result: Result<(), FiggyError> = in_transaction(persister.connection(), true, || {
        persister.save(Resource::new("ScannedResource"), false)?;
        assert!(adapter.in_transaction());
        Err(FiggyError::handler("test", "boom"))
    });

    // THEN nothing was kept and the original error is returned
    assert!(matches!(result, Err(FiggyError::Handler { .. })));
    assert!(adapter.query_service().find_all().unwrap().is_empty());
    assert!(!adapter.in_transaction());
}

#[test]
fn test_save_all_is_atomic() {
    let adapter = adapter();
    let mut ghost = Resource::new("FileSet").with_id("ghost");
    ghost.new_record = false;

    let result = adapter
        .persister()
        .save_all(vec![Resource::new("FileSet"), ghost]);

    assert!(matches!(result, Err(FiggyError::ObjectNotFound { .. })));
    assert!(adapter.query_service().find_all().unwrap().is_empty());
}

#[test]
fn test_members_parents_and_references() {
    // GIVEN a parent with two members and a file set pointing at the parent
    let adapter = adapter();
    let persister = adapter.persister();
    let page_one = persister.save(Resource::new("FileSet"), false).unwrap();
    let page_two = persister.save(Resource::new("FileSet"), false).unwrap();
    let parent = persister
        .save(
            Resource::new("ScannedResource").with_member_ids(&[
                page_two.id.clone().unwrap(),
                page_one.id.clone().unwrap(),
            ]),
            false,
        )
        .unwrap();
    let derivative = persister
        .save(
            Resource::new("FileSet")
                .with_attribute("parent_id", parent.id.as_ref().unwrap().as_str()),
            false,
        )
        .unwrap();
    let queries = adapter.query_service();

    // THEN members come back in member_ids order
    let members = queries.find_members(&parent).unwrap();
    assert_eq!(
        members.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
        vec![page_two.id.clone(), page_one.id.clone()]
    );

    // AND parents and references resolve both ways
    let parents = queries.find_parents(&page_one).unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, parent.id);
    assert!(queries.find_parents(&parent).unwrap().is_empty());

    let referenced = queries.find_references_by(&derivative, "parent_id").unwrap();
    assert_eq!(referenced[0].id, parent.id);
    let inverse = queries
        .find_inverse_references_by(&parent, "parent_id")
        .unwrap();
    assert_eq!(inverse.len(), 1);
    assert_eq!(inverse[0].id, derivative.id);
}

#[test]
fn test_members_skip_missing_ids() {
    let adapter = adapter();
    let persister = adapter.persister();
    let kept = persister.save(Resource::new("FileSet"), false).unwrap();
    let parent = Resource::new("ScannedResource")
        .with_member_ids(&["gone".into(), kept.id.clone().unwrap()]);

    let members = adapter.query_service().find_members(&parent).unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, kept.id);
}

#[test]
fn test_reopen_file_database_keeps_resources() {
    // GIVEN a resource saved to a file-backed database
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("metadata.db");
    let saved = {
        let adapter = SqliteAdapter::open(&path).unwrap();
        adapter
            .persister()
            .save(Resource::new("ScannedResource"), false)
            .unwrap()
    };

    // WHEN the database is opened again
    let reopened = SqliteAdapter::open(&path).unwrap();

    // THEN the resource is still there
    let loaded = reopened
        .query_service()
        .find_by(saved.id.as_ref().unwrap())
        .unwrap();
    assert_eq!(loaded, saved);
}
