use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes writers of the same artifact within one process.
///
/// Workers in other processes are not covered; across processes the last
/// writer to finish wins.
#[derive(Debug, Default, Clone)]
pub struct PathLocks {
    held: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task in this process holds `location`.
    pub async fn acquire(&self, location: &Path) -> PathGuard {
        let mutex = Arc::clone(self.held.entry(location.to_path_buf()).or_default().value());
        let guard = mutex.lock_owned().await;
        PathGuard {
            location: location.to_path_buf(),
            held: Arc::clone(&self.held),
            _guard: guard,
        }
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

pub struct PathGuard {
    location: PathBuf,
    held: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        // The map and this guard own one reference each; anything more is a waiter.
        self.held
            .remove_if(&self.location, |_, mutex| Arc::strong_count(mutex) <= 2);
    }
}
