//! Single-slot admission gate
//!
//! The orchestrator owns one [`GlobalLock`]. A submission must obtain a
//! [`LockLease`] before a job record is created; the lease travels with the
//! background task and frees the slot when released or dropped, so a panicking
//! job cannot leave the slot held forever.

use std::sync::{Arc, Mutex, MutexGuard};

/// Single global job slot
#[derive(Debug, Clone, Default)]
pub struct GlobalLock {
    holder: Arc<Mutex<Option<String>>>,
}

impl GlobalLock {
    /// Create an unheld lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the slot for `holder` without waiting
    ///
    /// Returns `None` if the slot is already taken. Check-and-set happens under
    /// one mutex acquisition, so two racing callers can never both succeed.
    pub fn try_acquire(&self, holder: impl Into<String>) -> Option<LockLease> {
        let holder = holder.into();
        let mut slot = self.slot();
        if slot.is_some() {
            return None;
        }
        *slot = Some(holder.clone());
        tracing::debug!(holder = %holder, "Global lock acquired");

        Some(LockLease {
            lock: self.clone(),
            holder,
            released: false,
        })
    }

    /// Whether any job currently holds the slot
    pub fn is_held(&self) -> bool {
        self.slot().is_some()
    }

    /// Identity of the current holder
    pub fn holder(&self) -> Option<String> {
        self.slot().clone()
    }

    fn release_for(&self, holder: &str) -> bool {
        let mut slot = self.slot();
        if slot.as_deref() == Some(holder) {
            *slot = None;
            tracing::debug!(holder = %holder, "Global lock released");
            true
        } else {
            false
        }
    }

    // The guarded value is a plain Option, so a poisoned mutex still holds
    // consistent data and is safe to keep using.
    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.holder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Proof of holding the [`GlobalLock`]
#[derive(Debug)]
pub struct LockLease {
    lock: GlobalLock,
    holder: String,
    released: bool,
}

impl LockLease {
    /// Holder identity this lease was issued to
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Free the slot; calling it on an already released lease does nothing
    pub fn release(&mut self) {
        if !self.released {
            self.lock.release_for(&self.holder);
            self.released = true;
        }
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        self.release();
    }
}
