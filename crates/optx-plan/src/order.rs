//! Sort directions and order keys.

use crate::expr::ExprId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of one sort column, including NULL placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    AscNullsFirst,
    AscNullsLast,
    DescNullsFirst,
    DescNullsLast,
}

impl Direction {
    /// Ascending with NULLs first, the default for synthetic keys.
    pub fn default_asc() -> Self {
        Direction::AscNullsFirst
    }

    /// Descending with NULLs last, the default for `DESC`.
    pub fn default_desc() -> Self {
        Direction::DescNullsLast
    }

    pub fn is_ascending(self) -> bool {
        matches!(self, Direction::AscNullsFirst | Direction::AscNullsLast)
    }

    pub fn nulls_first(self) -> bool {
        matches!(self, Direction::AscNullsFirst | Direction::DescNullsFirst)
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::default_asc()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::AscNullsFirst => write!(f, "ASC"),
            Direction::AscNullsLast => write!(f, "NULLS LAST ASC"),
            Direction::DescNullsFirst => write!(f, "NULLS FIRST DESC"),
            Direction::DescNullsLast => write!(f, "DESC"),
        }
    }
}

/// One sort column: an expression handle and its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub expr: ExprId,
    pub direction: Direction,
}

impl OrderKey {
    pub fn new(expr: ExprId, direction: Direction) -> Self {
        Self { expr, direction }
    }

    pub fn asc(expr: ExprId) -> Self {
        Self::new(expr, Direction::default_asc())
    }

    pub fn desc(expr: ExprId) -> Self {
        Self::new(expr, Direction::default_desc())
    }
}
