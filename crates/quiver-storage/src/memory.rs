//! Memory tracking and limits for import-time buffers.
//!
//! The block-mode importer accounts every buffered edge against a
//! configurable ceiling and flushes its builders to cold blocks when an
//! allocation would cross it.

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tracing::warn;

/// Memory tracking errors.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory limit exceeded: requested {requested} bytes, available {available} bytes (limit: {limit} bytes)")]
    LimitExceeded {
        requested: usize,
        available: usize,
        limit: usize,
    },
}

/// Tracks memory usage with a configurable limit and warning threshold.
///
/// Thread-safe using atomic operations for concurrent access.
#[derive(Debug)]
pub struct MemoryTracker {
    /// Current allocated bytes
    current_bytes: AtomicUsize,
    /// Maximum allowed bytes (0 = unlimited)
    limit_bytes: usize,
    /// Warning threshold as a percentage (0.0 - 100.0)
    warn_threshold: f64,
    /// Whether a warning has been issued (to avoid spam)
    warning_issued: AtomicUsize,
}

impl MemoryTracker {
    /// Creates a new memory tracker.
    ///
    /// # Arguments
    /// * `limit_mb` - Memory limit in megabytes (0 = unlimited)
    /// * `warn_percent` - Warning threshold as percentage (0-100)
    pub fn new(limit_mb: usize, warn_percent: f64) -> Self {
        Self {
            current_bytes: AtomicUsize::new(0),
            limit_bytes: limit_mb * 1024 * 1024,
            warn_threshold: warn_percent.clamp(0.0, 100.0),
            warning_issued: AtomicUsize::new(0),
        }
    }

    /// Creates an unlimited memory tracker (no limit enforcement).
    pub fn unlimited() -> Self {
        Self {
            current_bytes: AtomicUsize::new(0),
            limit_bytes: 0,
            warn_threshold: 100.0,
            warning_issued: AtomicUsize::new(0),
        }
    }

    /// Attempts to allocate memory, checking against the limit.
    pub fn try_allocate(&self, bytes: usize) -> Result<(), MemoryError> {
        if self.limit_bytes == 0 {
            self.current_bytes.fetch_add(bytes, Ordering::Relaxed);
            return Ok(());
        }

        let current = self.current_bytes.load(Ordering::Relaxed);
        let new_total = current.saturating_add(bytes);

        if new_total > self.limit_bytes {
            return Err(MemoryError::LimitExceeded {
                requested: bytes,
                available: self.limit_bytes.saturating_sub(current),
                limit: self.limit_bytes,
            });
        }

        self.current_bytes.fetch_add(bytes, Ordering::Relaxed);

        let percent = new_total as f64 / self.limit_bytes as f64 * 100.0;
        if percent >= self.warn_threshold
            && self
                .warning_issued
                .compare_exchange(0, 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            warn!(
                used_bytes = new_total,
                limit_bytes = self.limit_bytes,
                "memory usage at {percent:.1}% of limit"
            );
        }
        Ok(())
    }

    /// Releases previously tracked bytes.
    pub fn deallocate(&self, bytes: usize) {
        let mut current = self.current_bytes.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(bytes);
            match self.current_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.warning_issued.store(0, Ordering::Relaxed);
    }

    /// Currently tracked bytes.
    pub fn current_bytes(&self) -> usize {
        self.current_bytes.load(Ordering::Relaxed)
    }

    /// The configured limit in bytes (0 = unlimited).
    pub fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }

    /// Usage as a percentage of the limit (0.0 when unlimited).
    pub fn usage_percent(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        self.current_bytes() as f64 / self.limit_bytes as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_always_allocates() {
        let tracker = MemoryTracker::unlimited();
        tracker.try_allocate(usize::MAX / 2).unwrap();
        assert_eq!(tracker.usage_percent(), 0.0);
    }

    #[test]
    fn test_limit_enforced() {
        let tracker = MemoryTracker::new(1, 90.0); // 1 MiB
        tracker.try_allocate(512 * 1024).unwrap();
        tracker.try_allocate(512 * 1024).unwrap();

        let err = tracker.try_allocate(1).unwrap_err();
        assert!(matches!(err, MemoryError::LimitExceeded { available: 0, .. }));
    }

    #[test]
    fn test_deallocate_frees_budget() {
        let tracker = MemoryTracker::new(1, 100.0);
        tracker.try_allocate(1024 * 1024).unwrap();
        assert!(tracker.try_allocate(1).is_err());

        tracker.deallocate(1024 * 1024);
        assert_eq!(tracker.current_bytes(), 0);
        tracker.try_allocate(1).unwrap();
    }

    #[test]
    fn test_deallocate_saturates() {
        let tracker = MemoryTracker::new(1, 100.0);
        tracker.try_allocate(100).unwrap();
        tracker.deallocate(1000);
        assert_eq!(tracker.current_bytes(), 0);
    }
}
