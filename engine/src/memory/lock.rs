//! Cross-process writer lock
//!
//! A `{memory}.lock` file created with `create_new` marks the single active
//! writer. It holds the writer's pid and a per-guard token, and is removed
//! when the guard drops, unless another writer has since broken and retaken it.

use sdk::errors::EngineError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Held while a writer owns the memory file
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
    token: String,
}

impl WriterLock {
    /// Lock file path for a memory file
    pub fn path_for(memory_path: &Path) -> PathBuf {
        let mut name = memory_path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the lock, polling until `wait` elapses.
    ///
    /// A lock file older than `stale_after` is assumed to belong to a crashed
    /// writer and is removed.
    pub fn acquire(path: &Path, stale_after: Duration, wait: Duration) -> Result<Self, EngineError> {
        let deadline = Instant::now() + wait;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let token = format!("{} {}", std::process::id(), Uuid::new_v4());
                    if let Err(e) = writeln!(file, "{}", token) {
                        let _ = fs::remove_file(path);
                        return Err(EngineError::Io(e));
                    }
                    debug!(lock = %path.display(), "Writer lock acquired");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        token,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path, stale_after) {
                        warn!(lock = %path.display(), "Breaking stale writer lock");
                        match fs::remove_file(path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(e) => return Err(EngineError::Io(e)),
                        }
                    }

                    if Instant::now() >= deadline {
                        return Err(EngineError::StoreLocked(path.display().to_string()));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(EngineError::Io(e)),
            }
        }
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim() == self.token => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(lock = %self.path.display(), error = %e, "Failed to release writer lock");
                }
            }
            Ok(_) => {
                warn!(lock = %self.path.display(), "Writer lock was taken over, leaving it in place");
            }
            Err(e) => {
                warn!(lock = %self.path.display(), error = %e, "Writer lock vanished before release");
            }
        }
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > stale_after)
        .unwrap_or(false)
}
