use std::error::Error;

pub mod anki;
pub mod card;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod readwise;
pub mod sync;
pub mod telemetry;

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CheckpointError, SyncError};

    #[test]
    fn test_unpack_error_walks_sources() {
        let err = SyncError::Checkpoint(CheckpointError::Write {
            path: ".last_run".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        assert_eq!(
            unpack_error(&err),
            "checkpoint store failed: failed to write checkpoint \".last_run\": denied"
        );
    }
}
