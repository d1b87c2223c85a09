//! Exponentially weighted moving average of response latency.
//!
//! The estimate is kept as the bit pattern of an `f64` inside an `AtomicU64`
//! so request handlers can feed samples without taking a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Smoothing factor applied to each new sample.
pub const DEFAULT_ALPHA: f64 = 0.7;

/// Seed estimate (nanoseconds) used before any traffic has been observed.
pub const INITIAL_ESTIMATE_NANOS: f64 = 1.0;

/// Latency estimator in nanoseconds.
#[derive(Debug)]
pub struct Ewma {
    bits: AtomicU64,
    alpha: f64,
}

impl Ewma {
    /// Create an estimator seeded with `initial` and smoothing factor `alpha`.
    pub fn new(initial: f64, alpha: f64) -> Self {
        Self {
            bits: AtomicU64::new(initial.to_bits()),
            alpha,
        }
    }

    /// Current estimate in nanoseconds.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Fold one observed latency into the estimate.
    ///
    /// `new = alpha * observed + (1 - alpha) * old`
    pub fn observe(&self, observed_nanos: f64) {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let old = f64::from_bits(current);
            let next = self.alpha * observed_nanos + (1.0 - self.alpha) * old;

            match self.bits.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Fold a measured duration into the estimate.
    pub fn observe_duration(&self, elapsed: Duration) {
        self.observe(elapsed.as_nanos() as f64);
    }

    #[cfg(test)]
    pub(crate) fn set(&self, nanos: f64) {
        self.bits.store(nanos.to_bits(), Ordering::Release);
    }
}

impl Default for Ewma {
    fn default() -> Self {
        Self::new(INITIAL_ESTIMATE_NANOS, DEFAULT_ALPHA)
    }
}
