//! Advisory cross-process locks on small sidecar files

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::Duration;

const MAX_RETRIES: usize = 40;
const RETRY_SLEEP: Duration = Duration::from_millis(50);

/// Exclusive lock held until dropped
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl LockGuard {
    /// Take the lock, retrying for about two seconds before giving up
    ///
    /// Retries sleep the calling thread. Callers on the hook's current-thread
    /// runtime stall nothing else, since each invocation runs one task; a
    /// multi-task caller should move this onto a blocking thread.
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        Self::acquire_with(path, MAX_RETRIES, RETRY_SLEEP)
    }

    fn acquire_with(path: &Path, retries: usize, pause: Duration) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let contended = fs2::lock_contended_error().kind();
        for _ in 0..retries {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(Self { file }),
                Err(e) if e.kind() == contended => std::thread::sleep(pause),
                Err(e) => return Err(e),
            }
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            format!("could not acquire lock on {}", path.display()),
        ))
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
