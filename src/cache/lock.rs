//! Poison-tolerant lock access for cache state.
//!
//! Poisoned guards are recovered and the event logged.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read_guard<'a, T>(
    lock: &'a RwLock<T>,
    store: &str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, store, op, "read"))
}

pub(crate) fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    store: &str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, store, op, "write"))
}

fn recover<G>(poisoned: PoisonError<G>, store: &str, op: &'static str, access: &'static str) -> G {
    warn!(
        cache = store,
        op,
        access,
        result = "poisoned_recovered",
        "Recovered from poisoned cache lock"
    );
    poisoned.into_inner()
}
