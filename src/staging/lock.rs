use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DeliveryError, DeliveryResult};
use crate::state_machine::guards::{HardStageAbsentGuard, StateGuard};

/// Mutual exclusion for one delivery attempt.
///
/// A held lock means a delivery was claimed, whether it is still running or
/// already finished. Acquiring never waits: it succeeds once or fails.
pub trait DeliveryLock: Send + Sync {
    /// Claim the delivery attempt
    fn acquire(&self) -> DeliveryResult<()>;

    fn is_held(&self) -> bool;

    /// Human readable location of the lock, for logs and prompts
    fn describe(&self) -> String;
}

/// Lock backed by the existence of the hard-stage directory.
///
/// The guard check and the creation are separate steps. Two processes that
/// start at the same moment can both pass the check; only one `create_dir`
/// wins, the loser fails with `AlreadyExists`. Nothing is ever released: the
/// external transfer removes the directory when it is done.
#[derive(Debug, Clone)]
pub struct DirectoryLock {
    path: PathBuf,
}

impl DirectoryLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeliveryLock for DirectoryLock {
    fn acquire(&self) -> DeliveryResult<()> {
        HardStageAbsentGuard.check(self.path.as_path())?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&self.path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => DeliveryError::PreconditionViolation(format!(
                "Hard stage already present at {}",
                self.path.display()
            )),
            _ => DeliveryError::from(e),
        })?;

        info!(path = %self.path.display(), "🔒 Hard stage created, delivery claimed");
        Ok(())
    }

    fn is_held(&self) -> bool {
        HardStageAbsentGuard.check(self.path.as_path()).is_err()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
