//! The session state machine: one mutex-guarded value, not ambient booleans,
//! admits at most one active session (backup or restore) per process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{CoreError, CoreResult};

#[derive(Clone, Default)]
pub struct SessionGuard(Arc<Mutex<bool>>);

impl SessionGuard {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(false)))
    }

    /// Acquires the singleton slot, failing immediately with
    /// [`CoreError::Busy`] if another session is already active.
    pub fn try_acquire(&self) -> CoreResult<ActiveSession> {
        let mut active = self.0.lock().expect("session guard mutex poisoned");
        if *active {
            return Err(CoreError::Busy);
        }
        *active = true;
        Ok(ActiveSession {
            guard: self.0.clone(),
            should_stop: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// RAII handle held for the duration of one session. Releases the
/// singleton slot on drop, so a panicking session never wedges the process.
pub struct ActiveSession {
    guard: Arc<Mutex<bool>>,
    should_stop: Arc<AtomicBool>,
}

impl ActiveSession {
    /// Cooperative cancellation: checked at every file boundary by the
    /// packer and restore loops.
    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::Relaxed)
    }

    /// A borrow-free predicate suitable for passing to functions that take
    /// `&dyn Fn() -> bool`.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.should_stop.clone()
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        *self.guard.lock().expect("session guard mutex poisoned") = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_busy() {
        let guard = SessionGuard::new();
        let _first = guard.try_acquire().unwrap();
        let err = guard.try_acquire().unwrap_err();
        assert!(matches!(err, CoreError::Busy));
    }

    #[test]
    fn slot_is_released_on_drop() {
        let guard = SessionGuard::new();
        {
            let _session = guard.try_acquire().unwrap();
        }
        assert!(guard.try_acquire().is_ok());
    }
}
