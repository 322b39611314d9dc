//! Poison-tolerant access to the index's in-process state.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, source, op, "read"))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, source, op, "write"))
}

fn recover<G>(poisoned: PoisonError<G>, source: &'static str, op: &'static str, mode: &str) -> G {
    warn!(
        target = "static_regen::cache::lock",
        source_module = source,
        op,
        mode,
        "recovered poisoned lock; state may predate a panicked writer"
    );
    poisoned.into_inner()
}
