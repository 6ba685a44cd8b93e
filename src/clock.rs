//! Monotonic uptime in milliseconds.
//!
//! Every timer in the crate (fragment idle gap, auth block, retry cadence,
//! status push) is expressed as plain `u64` milliseconds so the logic can be
//! driven by tests without sleeping. Only the binaries read a real clock.

use std::time::Instant;

/// Milliseconds elapsed since construction.
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    boot: Instant,
}

impl Uptime {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }

    /// Current uptime in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }
}

impl Default for Uptime {
    fn default() -> Self {
        Self::new()
    }
}
