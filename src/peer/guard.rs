//! Deletion guard module
//!
//! Lock coordinating the destruction of a peer against threads still
//! reading it. The record only carries the handle; the peer table is the
//! sole party that locks it.

use std::fmt;
use std::sync::Arc;
use parking_lot::{Mutex, MutexGuard};

/// Shareable handle to a peer's deletion lock.
///
/// Cloning the handle shares the same lock. The lock itself is freed only
/// when the last handle goes away, so a thread blocked on it never observes
/// a destroyed lock.
#[derive(Clone, Default)]
pub struct DeletionGuard {
    lock: Arc<Mutex<()>>,
}

impl DeletionGuard {
    /// Allocate a fresh, unshared lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is held
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// Take the lock only if nobody holds it
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock.try_lock()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Whether both handles refer to the same lock
    pub fn same_lock(&self, other: &DeletionGuard) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }

    /// Number of live handles to this lock
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.lock)
    }
}

impl fmt::Debug for DeletionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeletionGuard")
            .field("locked", &self.is_locked())
            .field("handles", &self.handle_count())
            .finish()
    }
}
