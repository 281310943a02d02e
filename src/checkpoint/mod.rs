//! Single-value checkpoint of the last observed portal status.
//!
//! The checkpoint is the sole contents of one plain-text file. Writes go to a
//! uniquely named sibling temp file which is fsynced and renamed over the
//! target, so a reader sees either the old value or the new one.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Opaque status token scraped from the portal. Only equality is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusValue(String);

impl StatusValue {
    /// Surrounding whitespace is not part of the value.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StatusValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StatusValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint at {0}")]
    NotFound(PathBuf),
    #[error("checkpoint I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CheckpointError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored value, or `NotFound` on first run.
    pub fn read(&self) -> Result<StatusValue, CheckpointError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(StatusValue::new(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CheckpointError::NotFound(self.path.clone()))
            }
            Err(e) => Err(CheckpointError::io(&self.path, e)),
        }
    }

    /// Like [`read`](Self::read) but maps a missing file to `None`.
    pub fn read_optional(&self) -> Result<Option<StatusValue>, CheckpointError> {
        match self.read() {
            Ok(value) => Ok(Some(value)),
            Err(CheckpointError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn write(&self, value: &StatusValue) -> Result<(), CheckpointError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| CheckpointError::io(&parent, e))?;

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("checkpoint");
        let temp_path = parent.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let result = (|| {
            let mut file = OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&temp_path)?;
            file.write_all(value.as_str().as_bytes())?;
            file.sync_all()?;
            drop(file);
            fs::rename(&temp_path, &self.path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(CheckpointError::io(&self.path, e));
        }

        if let Err(e) = crate::config::schema::sync_directory(&parent) {
            tracing::debug!("Checkpoint directory fsync skipped: {e}");
        }
        Ok(())
    }

    /// Remove the checkpoint so the next cycle behaves like a first run.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::io(&self.path, e)),
        }
    }
}
