//! Bucketed disk storage
//!
//! A file uploaded for resource `3f2a9c1e-...` lands at
//! `<base>/3f/2a/9c/3f2a9c1e-.../<filename>` and is identified as
//! `disk://<that absolute path>`. Writes go to a temp file next to the
//! target and are renamed into place.

use crate::errors::{io_error, Result};
use figgy_core::errors::FiggyError;
use figgy_core::storage::{StorageAdapter, StoredFile};
use figgy_core::Resource;
use figgy_core_types::{FileId, ResourceId};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const SCHEME: &str = "disk";

const COPY_BUFFER: usize = 64 * 1024;

/// Directory holding the files of `id` under `base`
pub fn bucket_path(base: &Path, id: &ResourceId) -> PathBuf {
    let compact: String = id.as_str().chars().filter(|c| *c != '-').collect();
    let mut path = base.to_path_buf();
    for bucket in compact.as_bytes().chunks(2).take(3) {
        path.push(&*String::from_utf8_lossy(bucket));
    }
    path.join(id.as_str())
}

#[derive(Debug, Clone)]
pub struct DiskAdapter {
    base_path: PathBuf,
}

impl DiskAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn file_id(path: &Path) -> FileId {
        FileId::new(format!("{}://{}", SCHEME, path.display()))
    }

    /// Copy `source` to `target` via a temp file, returning the SHA-256 hex digest
    fn write_atomically(source: &Path, target: &Path) -> Result<String> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error("create_bucket_dir", &e))?;
        }

        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = target.with_file_name(format!(".{}.tmp", file_name));

        let digest = match copy_with_digest(source, &temp_path) {
            Ok(digest) => digest,
            Err(err) => {
                let _ = fs::remove_file(&temp_path);
                return Err(err);
            }
        };

        fs::rename(&temp_path, target).map_err(|e| io_error("rename_upload_temp", &e))?;
        Ok(digest)
    }
}

fn copy_with_digest(source: &Path, temp_path: &Path) -> Result<String> {
    let mut input = File::open(source).map_err(|e| io_error("upload", &e))?;
    let mut output = File::create(temp_path).map_err(|e| io_error("upload", &e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER];

    loop {
        let read = input.read(&mut buffer).map_err(|e| io_error("upload", &e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        output
            .write_all(&buffer[..read])
            .map_err(|e| io_error("upload", &e))?;
    }
    output.sync_all().map_err(|e| io_error("upload", &e))?;

    Ok(hex::encode(hasher.finalize()))
}

impl StorageAdapter for DiskAdapter {
    fn upload(
        &self,
        file: &Path,
        original_filename: &str,
        resource: &Resource,
    ) -> Result<StoredFile> {
        let id = resource.id.as_ref().ok_or_else(|| FiggyError::InvalidInput {
            reason: "disk upload needs a saved resource".to_string(),
        })?;
        let file_name = Path::new(original_filename)
            .file_name()
            .ok_or_else(|| FiggyError::InvalidInput {
                reason: format!("{:?} is not a file name", original_filename),
            })?;

        let target = bucket_path(&self.base_path, id).join(file_name);
        let digest = Self::write_atomically(file, &target)?;
        tracing::debug!(path = %target.display(), digest = %digest, "file stored");

        Ok(StoredFile::on_disk(Self::file_id(&target), target).with_digest(digest))
    }

    fn find_by(&self, id: &FileId) -> Result<StoredFile> {
        let path = Path::new(id.location());
        if self.handles(id) && path.is_file() {
            Ok(StoredFile::on_disk(id.clone(), path))
        } else {
            Err(FiggyError::FileNotFound { id: id.clone() })
        }
    }

    fn delete(&self, id: &FileId) -> Result<()> {
        if !self.handles(id) {
            return Ok(());
        }
        match fs::remove_file(id.location()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete", &e)),
        }
    }

    fn handles(&self, id: &FileId) -> bool {
        id.scheme() == Some(SCHEME) && Path::new(id.location()).starts_with(&self.base_path)
    }

    fn supports(&self, _feature: &str) -> bool {
        false
    }

    fn base_path(&self) -> Option<&Path> {
        Some(&self.base_path)
    }
}
