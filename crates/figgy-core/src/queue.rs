//! Execution strategies for post-commit callbacks
//!
//! A persister outside any buffered transaction uses an [`InstantQueue`]:
//! callbacks run as soon as they are added. Inside `buffer_into_index` the
//! persister uses a [`DelayedQueue`] that holds callbacks until the outer
//! block commits, then runs them in insertion order.

use crate::errors::{FiggyError, Result};
use std::sync::Mutex;

/// A deferred unit of work
pub type Callback = Box<dyn FnOnce() -> Result<()> + Send>;

pub trait CallbackQueue: Send + Sync {
    fn add(&self, callback: Callback) -> Result<()>;

    /// Run whatever is pending
    fn run(&self) -> Result<()>;

    /// Drop pending callbacks without running them
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs callbacks immediately; `run` has nothing to do
#[derive(Debug, Default)]
pub struct InstantQueue;

impl CallbackQueue for InstantQueue {
    fn add(&self, callback: Callback) -> Result<()> {
        callback()
    }

    fn run(&self) -> Result<()> {
        Ok(())
    }

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }
}

/// Holds callbacks until `run`
///
/// `run` drains in insertion order. Callbacks added while the queue is
/// running (e.g. a callback that saves through the same persister) run in
/// the same pass after the ones already queued. If a callback fails, the
/// error is returned, callbacks that already ran stay applied, and the
/// remaining ones are dropped.
#[derive(Default)]
pub struct DelayedQueue {
    pending: Mutex<Vec<Callback>>,
}

impl DelayedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every pending callback, collecting failures instead of stopping
    ///
    /// Used for compensating work where one failed action must not prevent
    /// the others from running.
    pub fn run_all(&self) -> Vec<FiggyError> {
        let mut failures = Vec::new();
        loop {
            let batch = match self.take_pending() {
                Ok(batch) if !batch.is_empty() => batch,
                Ok(_) => return failures,
                Err(err) => {
                    failures.push(err);
                    return failures;
                }
            };
            failures.extend(batch.into_iter().filter_map(|callback| callback().err()));
        }
    }

    fn take_pending(&self) -> Result<Vec<Callback>> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .map_err(|_| FiggyError::Internal {
                message: "callback queue poisoned".to_string(),
            })
    }
}

impl CallbackQueue for DelayedQueue {
    fn add(&self, callback: Callback) -> Result<()> {
        self.pending
            .lock()
            .map(|mut pending| pending.push(callback))
            .map_err(|_| FiggyError::Internal {
                message: "callback queue poisoned".to_string(),
            })
    }

    fn run(&self) -> Result<()> {
        loop {
            let batch = self.take_pending()?;
            if batch.is_empty() {
                return Ok(());
            }
            tracing::debug!(queue_len = batch.len(), "running delayed callbacks");
            let mut batch = batch.into_iter();
            for callback in batch.by_ref() {
                if let Err(err) = callback() {
                    let dropped = batch.len() + self.take_pending()?.len();
                    if dropped > 0 {
                        tracing::warn!(dropped, "delayed callback failed; dropping the rest");
                    }
                    return Err(err);
                }
            }
        }
    }

    fn clear(&self) {
        self.pending.lock().map(|mut p| p.clear()).ok();
    }

    fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or_default()
    }
}
