use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::CheckpointError;

/// Single-value store for the time of the last successful sync.
///
/// The file holds one RFC 3339 line. A missing file means nothing has been synced yet.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Option<DateTime<Utc>>, CheckpointError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = ?self.path, "no checkpoint found, fetching all highlights");
                return Ok(None);
            }
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
            Err(e) => {
                tracing::warn!(path = ?self.path, value = raw, error = %e, "unreadable checkpoint, fetching all highlights");
                Ok(None)
            }
        }
    }

    pub fn write(&self, ts: DateTime<Utc>) -> Result<(), CheckpointError> {
        let err = |source| CheckpointError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(err)?;
        }

        let tmp = self.tmp_path();
        if let Err(e) = Self::replace(&tmp, &self.path, ts) {
            let _ = fs::remove_file(&tmp);
            return Err(err(e));
        }
        tracing::info!(path = ?self.path, checkpoint = %ts.to_rfc3339(), "saved checkpoint");
        Ok(())
    }

    fn replace(tmp: &Path, path: &Path, ts: DateTime<Utc>) -> std::io::Result<()> {
        let mut file = fs::File::create(tmp)?;
        writeln!(file, "{}", ts.to_rfc3339())?;
        file.sync_all()?;
        drop(file);
        fs::rename(tmp, path)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
