//! Planner configuration and per-session context.
//!
//! Both are sourced once per planning session and passed by reference to every
//! entry point that reads them. Nothing in the planner mutates them.

use crate::cost::CostModelType;
use crate::recursion::{RecursionGuard, DEFAULT_MAX_RECURSION_DEPTH};
use crate::types::{CollationType, ScalarValue};
use serde::{Deserialize, Serialize};

/// Planner-wide switches and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Derive a single byte-comparable encoded key for sort operators.
    pub enable_encode_sort_key: bool,
    /// Maximum depth of guarded recursion (plan re-estimation, expression walks).
    pub max_recursion_depth: usize,
    /// Cost model variant used for sort costing.
    pub cost_model: CostModelType,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enable_encode_sort_key: true,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            cost_model: CostModelType::Normal,
        }
    }
}

impl PlannerConfig {
    /// A fresh recursion guard bounded by this configuration.
    pub fn recursion_guard(&self) -> RecursionGuard {
        RecursionGuard::new(self.max_recursion_depth)
    }
}

/// Type-resolution context of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Collation given to character results that do not inherit one.
    pub collation: CollationType,
    /// Values of execution parameters, indexed by parameter position.
    pub params: Vec<ScalarValue>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            collation: CollationType::Utf8mb4GeneralCi,
            params: Vec::new(),
        }
    }
}

impl SessionContext {
    pub fn with_params(params: Vec<ScalarValue>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn param(&self, index: usize) -> Option<&ScalarValue> {
        self.params.get(index)
    }
}
