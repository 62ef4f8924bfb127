use std::sync::{Mutex, MutexGuard};

/// Locks a model shared by inference calls.
///
/// A panic in the middle of a call poisons the lock and may leave per-call
/// state (the decoder's kv cache) half written. The guard is recovered, `reset`
/// clears that state, and the poison flag is cleared so later calls lock normally.
pub fn lock_model<T>(model: &Mutex<T>, reset: impl FnOnce(&mut T)) -> MutexGuard<'_, T> {
    match model.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Model lock poisoned by an earlier panic, resetting decoder state");
            let mut guard = poisoned.into_inner();
            reset(&mut guard);
            model.clear_poison();
            guard
        }
    }
}
