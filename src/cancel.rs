//! Cancellation tokens for refresh and index traversals.
//!
//! This module provides a simple cancellation token that can be used to
//! terminate long-running traversals early. Tokens are checked between node
//! visits, never mid-I/O-call, so a cancelled walk stops at the next node
//! boundary and reports partial completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation token for terminating long-running operations.
///
/// All clones share the same flag: cancelling any clone cancels them all.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cancellation token that is never cancelled.
    ///
    /// Useful for tests or operations that should not be interruptible.
    pub fn noop() -> Self {
        Self::default()
    }

    /// Requests cancellation. All clones of this token observe the request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns true if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
