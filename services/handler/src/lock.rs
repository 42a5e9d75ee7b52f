//! Process lock file.
//!
//! The lock file's existence is the mutex: two handlers must never manage
//! the same working directory. A held lock at startup fails fast; stale
//! locks are an operator concern.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default lock file name, relative to the working directory.
pub const LOCK_FILE: &str = "droplets.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock already held at {path:?}; is another handler running?")]
    Held { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// An acquired process lock. Released explicitly on clean shutdown;
/// dropped as a backstop.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    released: bool,
}

impl ProcessLock {
    /// Acquire the lock, failing if it is already held.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                use std::io::Write;
                let _ = write!(file, "{}", std::process::id());
                Ok(Self {
                    path,
                    released: false,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(LockError::Held { path })
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock by removing the file.
    pub fn release(mut self) -> Result<(), LockError> {
        if !self.released {
            fs::remove_file(&self.path)?;
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}
