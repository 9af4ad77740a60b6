//! Bounded first touch of a stored file
//!
//! A hung network mount makes the first `stat` or `read` block forever.
//! [`DelayCheckFile`] probes the file on a helper thread and gives up after
//! the timeout, so callers get a `Timeout` error instead of a stuck worker.
//! The probe runs once per wrapper; its outcome is reused.

use crate::errors::{io_error, Result};
use figgy_core::errors::FiggyError;
use figgy_core::storage::StoredFile;
use figgy_core_types::FileId;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

/// Probe returning the file size, run on the helper thread
pub type SizeProbe = Arc<dyn Fn(&StoredFile) -> Result<u64> + Send + Sync>;

pub struct DelayCheckFile {
    file: StoredFile,
    timeout: Duration,
    probe: SizeProbe,
    checked: OnceLock<Result<u64>>,
}

impl DelayCheckFile {
    pub fn new(file: StoredFile, timeout: Duration) -> Self {
        Self::with_probe(file, timeout, Arc::new(|file: &StoredFile| file.size()))
    }

    pub fn with_probe(file: StoredFile, timeout: Duration, probe: SizeProbe) -> Self {
        Self {
            file,
            timeout,
            probe,
            checked: OnceLock::new(),
        }
    }

    /// Id of the wrapped file; never touches storage
    pub fn id(&self) -> &FileId {
        self.file.id()
    }

    /// Size of the file, probing it first if that has not happened yet
    ///
    /// # Errors
    ///
    /// Returns `FiggyError::Timeout` if the probe outlasts the timeout, or
    /// the probe's own error.
    pub fn check(&self) -> Result<u64> {
        self.checked.get_or_init(|| self.probe_with_timeout()).clone()
    }

    /// # Errors
    ///
    /// See [`DelayCheckFile::check`]; read errors are returned as-is.
    pub fn read(&self) -> Result<Vec<u8>> {
        self.check()?;
        self.file.read()
    }

    /// # Errors
    ///
    /// See [`DelayCheckFile::check`].
    pub fn size(&self) -> Result<u64> {
        self.check()
    }

    /// # Errors
    ///
    /// See [`DelayCheckFile::check`].
    pub fn disk_path(&self) -> Result<Option<&Path>> {
        self.check()?;
        Ok(self.file.disk_path())
    }

    /// The checked file handle
    ///
    /// # Errors
    ///
    /// See [`DelayCheckFile::check`].
    pub fn into_inner(self) -> Result<StoredFile> {
        self.check()?;
        Ok(self.file)
    }

    fn probe_with_timeout(&self) -> Result<u64> {
        let (tx, rx) = mpsc::channel();
        let file = self.file.clone();
        let probe = self.probe.clone();

        thread::Builder::new()
            .name("figgy-delay-check".to_string())
            .spawn(move || {
                // The receiver is gone once the caller has timed out.
                let _ = tx.send(probe(&file));
            })
            .map_err(|e| io_error("delay_check", &e))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    file_id = %self.file.id(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "file probe timed out"
                );
                Err(FiggyError::Timeout {
                    op: "delay_check".to_string(),
                    after_ms: self.timeout.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(FiggyError::Internal {
                message: "delay check probe exited without a result".to_string(),
            }),
        }
    }
}
