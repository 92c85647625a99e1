//! Cross-process file lock for the document store
//!
//! The lock is a sidecar file taken with a create-exclusive open; whoever
//! creates it owns the critical section. Contending processes retry on a
//! fixed backoff. Dropping the guard removes the file.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::store::StoreError;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Held lock; released on drop
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock file can be created
    pub async fn acquire(path: &Path) -> Result<Self, StoreError> {
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(err) => return Err(StoreError::Io(err.to_string())),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
