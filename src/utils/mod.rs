pub mod logging;

use std::sync::{Mutex, MutexGuard};

/// Lock a std mutex, taking the data back out of a poisoned lock.
///
/// Session state must stay reachable from the shutdown hook even if some
/// other path panicked while holding it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
