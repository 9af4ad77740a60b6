#![allow(clippy::unwrap_used, clippy::expect_used)]

use figgy_core::adapter::{InstrumentedAdapter, MemoryAdapter, MetadataAdapter};
use figgy_core::errors::FiggyError;
use figgy_core::logging_facility::test_capture::init_test_capture;
use figgy_core::storage::MemoryStorage;
use figgy_core::{log_op_end, log_op_error, log_op_start};
use figgy_core::{ChangeSet, ChangeSetPersister, HandlerRegistry, PersisterOptions, Resource};
use figgy_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};
use figgy_core_types::ResourceId;
use std::sync::Arc;

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name);

    capture.assert_event_exists(op_name, EVENT_START);
}

#[test]
fn test_log_op_end_records_duration() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let events = capture.events();
    let end_events: Vec<_> = events
        .iter()
        .filter(|e| e.op.as_deref() == Some(op_name) && e.event.as_deref() == Some(EVENT_END))
        .collect();
    assert_eq!(end_events.len(), 1, "Should have exactly one end event");
    assert_eq!(
        end_events[0].fields.get("duration_ms"),
        Some(&"42".to_string())
    );
}

#[test]
fn test_log_op_error_includes_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = FiggyError::ReadOnly {
        op: "save".to_string(),
    };
    log_op_error!(op_name, err, duration_ms = 10);

    let events = capture.events();
    let error_event = events
        .iter()
        .find(|e| e.op.as_deref() == Some(op_name) && e.event.as_deref() == Some(EVENT_END_ERROR))
        .expect("error event");
    assert_eq!(
        error_event.fields.get("err.code"),
        Some(&"ERR_READ_ONLY".to_string())
    );
}

#[test]
fn test_persister_save_logs_start_and_end() {
    // GIVEN a persister over an in-memory adapter
    let capture = init_test_capture();
    let persister = ChangeSetPersister::new(
        Arc::new(MemoryAdapter::new()),
        Arc::new(MemoryStorage::new()),
        Arc::new(HandlerRegistry::new()),
        PersisterOptions::default(),
    );
    let model = "LoggedSaveModel";

    // WHEN a resource is saved
    persister
        .save(&mut ChangeSet::new(Resource::new(model)), false)
        .unwrap();

    // THEN exactly one start event carries the model
    let starts = capture.count_events(|e| {
        e.op.as_deref() == Some("save")
            && e.event.as_deref() == Some(EVENT_START)
            && e.fields.get("model").map(String::as_str) == Some(model)
    });
    assert_eq!(starts, 1);
    capture.assert_event_exists("save", EVENT_END);
}

#[test]
fn test_persister_failure_logs_error_code() {
    let capture = init_test_capture();
    let persister = ChangeSetPersister::new(
        Arc::new(MemoryAdapter::new()),
        Arc::new(MemoryStorage::new()),
        Arc::new(HandlerRegistry::new()),
        PersisterOptions::default(),
    );
    let mut missing = Resource::new("LoggedMissingModel").with_id("logged-missing");
    missing.new_record = false;

    assert!(persister.save(&mut ChangeSet::new(missing), false).is_err());

    let errors = capture.count_events(|e| {
        e.op.as_deref() == Some("save")
            && e.event.as_deref() == Some(EVENT_END_ERROR)
            && e.fields.get("err.code").map(String::as_str) == Some("ERR_NOT_FOUND")
    });
    assert!(errors >= 1);
}

#[test]
fn test_instrumented_adapter_opens_tagged_spans() {
    // GIVEN an instrumented memory adapter
    let capture = init_test_capture();
    let backend = MemoryAdapter::new();
    let adapter = InstrumentedAdapter::new(Arc::new(backend.clone()));
    let model = "InstrumentedSpanModel";

    // WHEN saving and querying through it
    let saved = adapter
        .persister()
        .save(Resource::new(model), false)
        .unwrap();
    let id = saved.id.clone().unwrap();
    let found = adapter.query_service().find_by(&id).unwrap();
    adapter.query_service().find_all_of_model(model).unwrap();

    // THEN results are the backend's own
    assert_eq!(found, backend.query_service().find_by(&id).unwrap());

    // AND spans carry the resource tags
    assert_eq!(
        capture.count_spans(|s| {
            s.name == "metadata.save"
                && s.fields.get("resource.model").map(String::as_str) == Some(model)
                && s.fields.get("resource.id").map(String::as_str) == Some("")
        }),
        1
    );
    assert_eq!(
        capture.count_spans(|s| {
            s.name == "metadata.find_by_id"
                && s.fields.get("resource.id").map(String::as_str) == Some(id.as_str())
        }),
        1
    );
    assert_eq!(
        capture.count_spans(|s| {
            s.name == "metadata.find_all_of_model"
                && s.fields.get("resource.model").map(String::as_str) == Some(model)
        }),
        1
    );
}

#[test]
fn test_instrumented_adapter_passes_errors_through() {
    let adapter = InstrumentedAdapter::new(Arc::new(MemoryAdapter::new()));

    let result = adapter
        .query_service()
        .find_by(&ResourceId::from("instrumented-missing"));

    assert_eq!(
        result.unwrap_err(),
        FiggyError::ObjectNotFound {
            id: "instrumented-missing".to_string()
        }
    );
}
