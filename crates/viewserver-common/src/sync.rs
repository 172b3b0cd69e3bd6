use std::sync::Mutex;
use std::sync::MutexGuard;

use tracing::warn;

/// Locks `lock`, taking the inner value back if a previous holder panicked.
///
/// The registries guarded this way (forwarded ports, server info, listener
/// sets) stay structurally valid after a panic in a subscriber callback, so
/// recovering is preferable to poisoning every later device operation.
pub fn mutex_lock_or_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!("recovering from poisoned mutex");
        poisoned.into_inner()
    })
}
