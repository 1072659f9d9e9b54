//! # Recursion Guard
//!
//! Cost re-estimation walks the plan tree and expression traversal walks the
//! expression tree. Both are recursive and both can be driven arbitrarily deep
//! by a pathological statement. Every recursive entry point goes through
//! [`RecursionGuard::protect`], which counts the current depth and fails with
//! [`PlanError::RecursionLimitExceeded`] once the configured maximum is reached,
//! instead of overflowing the host stack.
//!
//! A guard is owned by one planning pass and is never shared across threads.

use crate::error::{PlanError, Result};
use std::cell::Cell;
use tracing::debug;

/// Default maximum depth when no configuration is supplied.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 512;

/// Depth counter for guarded recursion.
#[derive(Debug, Clone)]
pub struct RecursionGuard {
    depth: Cell<usize>,
    limit: usize,
}

impl RecursionGuard {
    pub fn new(limit: usize) -> Self {
        Self {
            depth: Cell::new(0),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Run `f` one level deeper, failing fast if the limit is reached.
    ///
    /// The depth is restored on every exit path, including when `f` fails or
    /// panics.
    pub fn protect<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let depth = self.depth.get();
        if depth >= self.limit {
            debug!("Recursion guard tripped: depth={}, limit={}", depth, self.limit);
            return Err(PlanError::RecursionLimitExceeded(self.limit));
        }
        self.depth.set(depth + 1);
        let _level = DepthLevel {
            depth: &self.depth,
            restore: depth,
        };
        f()
    }
}

/// Resets the depth counter when one guarded level is left.
struct DepthLevel<'a> {
    depth: &'a Cell<usize>,
    restore: usize,
}

impl Drop for DepthLevel<'_> {
    fn drop(&mut self) {
        self.depth.set(self.restore);
    }
}

impl Default for RecursionGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECURSION_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descend(guard: &RecursionGuard, remaining: usize) -> Result<usize> {
        if remaining == 0 {
            return Ok(guard.depth());
        }
        guard.protect(|| descend(guard, remaining - 1))
    }

    #[test]
    fn test_depth_within_limit() {
        let guard = RecursionGuard::new(8);
        assert_eq!(descend(&guard, 8).unwrap(), 8);
        assert_eq!(guard.depth(), 0);
    }

    #[test]
    fn test_depth_over_limit() {
        let guard = RecursionGuard::new(8);
        assert_eq!(
            descend(&guard, 9),
            Err(PlanError::RecursionLimitExceeded(8))
        );
        // The counter unwinds even though the innermost call failed.
        assert_eq!(guard.depth(), 0);
    }

    #[test]
    fn test_depth_restored_after_panic() {
        let guard = RecursionGuard::new(8);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            guard.protect(|| guard.protect::<(), _>(|| panic!("evaluation failed")))
        }));
        assert!(outcome.is_err());
        assert_eq!(guard.depth(), 0);
        assert_eq!(descend(&guard, 8).unwrap(), 8);
    }
}
