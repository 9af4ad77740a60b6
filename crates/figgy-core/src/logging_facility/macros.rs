//! Operation lifecycle macros
//!
//! Every persister entry point logs a start event, then exactly one of an
//! end or an error event carrying `duration_ms`. All three share the
//! `component`/`op`/`event` keys from `figgy_core_types::schema`.

#[doc(hidden)]
#[macro_export]
macro_rules! __log_op_event {
    ($level:expr, $op:expr, $event:expr $(, $($field:tt)*)?) => {
        tracing::event!(
            $level,
            component = module_path!(),
            op = $op,
            event = $event,
            $($($field)*)?
        )
    };
}

/// Log that an operation began
///
/// ```
/// # use figgy_core::log_op_start;
/// log_op_start!("buffer_into_index");
/// log_op_start!("plum.save", model = "ScannedResource");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        $crate::__log_op_event!(
            tracing::Level::INFO,
            $op,
            figgy_core_types::schema::EVENT_START
            $(, $($field)*)?
        )
    };
}

/// Log that an operation finished; `duration_ms` is required
///
/// ```
/// # use figgy_core::log_op_end;
/// log_op_end!("save_all", duration_ms = 12, count = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        $crate::__log_op_event!(
            tracing::Level::INFO,
            $op,
            figgy_core_types::schema::EVENT_END,
            duration_ms = $duration
            $(, $($field)*)?
        )
    };
}

/// Log that an operation failed
///
/// `$err` is consumed through `Into<ExError>` so the stable code and kind
/// land on the event; clone it if the caller still returns it.
///
/// ```
/// # use figgy_core::{log_op_error, errors::FiggyError};
/// let err = FiggyError::ReadOnly { op: "delete".to_string() };
/// log_op_error!("delete", err, duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        $crate::__log_op_event!(
            tracing::Level::ERROR,
            $op,
            figgy_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code()
            $(, $($field)*)?
        )
    }};
}
