use crate::cache::SourceError;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};

pub const LOCK_FILE: &str = "lock";

/// Exclusive lock over a whole cache root, shared across processes.
///
/// Acquisition blocks until every other holder has released. The lock is
/// released when the guard is dropped.
pub struct CacheLock {
    path: PathBuf,
    #[cfg(unix)]
    _guard: Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl CacheLock {
    pub async fn acquire(root: &Path) -> Result<Self, SourceError> {
        let path = root.join(LOCK_FILE);
        let lock_path = path.clone();
        debug!("Waiting for cache lock {}", path.display());

        let lock = tokio::task::spawn_blocking(move || Self::acquire_blocking(lock_path))
            .await
            .map_err(|e| SourceError::Lock {
                path: path.display().to_string(),
                reason: e.to_string(),
            })??;

        debug!("Acquired cache lock {}", lock.path.display());
        Ok(lock)
    }

    fn acquire_blocking(path: PathBuf) -> Result<Self, SourceError> {
        let lock_error = |reason: String| SourceError::Lock {
            path: path.display().to_string(),
            reason,
        };

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(&path).map_err(|e| lock_error(e.to_string()))?;

        #[cfg(unix)]
        {
            let guard = Flock::lock(file, FlockArg::LockExclusive)
                .map_err(|(_, errno)| lock_error(errno.to_string()))?;
            Ok(Self {
                path,
                _guard: guard,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self { path, _file: file })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for CacheLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLock").field("path", &self.path).finish()
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        debug!("Released cache lock {}", self.path.display());
    }
}
