//! Shared selection cursor.

use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonic counter shared by every concurrent selection call.
///
/// Wraps on overflow; callers only ever use the value modulo the instance
/// count, so wraparound yields another valid position.
#[derive(Debug, Default)]
pub struct Cursor(AtomicU32);

impl Cursor {
    pub fn new(start: u32) -> Self {
        Self(AtomicU32::new(start))
    }

    /// Increment and return the new value.
    pub fn advance(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Current value without advancing.
    pub fn load(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn store(&self, value: u32) {
        self.0.store(value, Ordering::Relaxed);
    }
}
