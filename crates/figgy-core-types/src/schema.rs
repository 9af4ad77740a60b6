//! Canonical schema constants for structured logging and events
//!
//! These constants ensure consistency across all logging and error reporting.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Entity identifiers
pub const FIELD_RESOURCE_ID: &str = "resource_id";
pub const FIELD_MODEL: &str = "model";
pub const FIELD_FILE_ID: &str = "file_id";

// Pipeline context
pub const FIELD_PHASE: &str = "phase";
pub const FIELD_HANDLER_COUNT: &str = "handler_count";
pub const FIELD_QUEUE_LEN: &str = "queue_len";
pub const FIELD_ATTEMPT: &str = "attempt";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
