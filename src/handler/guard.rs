//! One-shot outcome guard.
//!
//! The worker racing the deadline and the attempt delivering a reply both
//! have to [`claim`](OutcomeGuard::claim) the guard before firing a terminal
//! hook. Only the first claim succeeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "already resolved" flag of one command.
#[derive(Debug, Clone, Default)]
pub struct OutcomeGuard {
    resolved: Arc<AtomicBool>,
}

impl OutcomeGuard {
    /// Create an unresolved guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to resolve the command. Returns `true` for the single winner.
    #[inline]
    pub fn claim(&self) -> bool {
        self.resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether some party already resolved the command.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}
