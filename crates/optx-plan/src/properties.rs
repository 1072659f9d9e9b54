//! # Output Ordering
//!
//! An operator's output ordering describes the order in which it emits rows. A
//! parent that requires a specific input order can elide a redundant sort when
//! the child's ordering already satisfies the requirement.
//!
//! ## Local vs Global
//!
//! A *local* ordering holds only within each partition or worker slice. A
//! *global* ordering holds across the whole output. A local ordering never
//! satisfies a requirement on its own; the parent needs a merge first.
//!
//! ## Satisfaction
//!
//! A requirement is satisfied when it is a prefix of (or equal to) the provided
//! ordering. If we require `ORDER BY a, b` and the child provides
//! `ORDER BY a, b, c`, the requirement holds. Directions must match exactly.

use crate::order::OrderKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ordering {
    pub keys: Vec<OrderKey>,
    pub is_local: bool,
}

impl Ordering {
    pub fn global(keys: Vec<OrderKey>) -> Self {
        Self {
            keys,
            is_local: false,
        }
    }

    pub fn local(keys: Vec<OrderKey>) -> Self {
        Self {
            keys,
            is_local: true,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check if `required` is satisfied by this ordering.
    ///
    /// An empty requirement is always satisfied.
    pub fn satisfies(&self, required: &[OrderKey]) -> bool {
        if required.is_empty() {
            return true;
        }
        !self.is_local
            && required.len() <= self.keys.len()
            && required.iter().zip(self.keys.iter()).all(|(r, p)| r == p)
    }
}
