//! # optx-plan: Planning Primitives for Plan Operators
//!
//! This crate holds the data structures every plan operator of the optimizer
//! relies on to describe computable values, orderings and costs. It does not
//! search plans and it does not execute them.
//!
//! ## Module Overview
//!
//! - **`expr`**: The statement-scoped expression arena. Nodes are addressed by
//!   [`expr::ExprId`] handles, carry a closed [`expr::ExprKind`] and a result type,
//!   and are traversed through the [`expr::ExprVisitor`] contract.
//! - **`types`**: Result-type metadata (data type, collation, accuracy, flags).
//! - **`order`**: Sort directions and [`order::OrderKey`].
//! - **`properties`**: Output orderings exposed by operators and the
//!   requirement check used to elide redundant sorts.
//! - **`stats`**: Table metadata and the selectivity context used for width
//!   and distinct-value estimation.
//! - **`cost`**: The sort cost model trait and its default implementation.
//! - **`config`**: Per-session planner configuration.
//! - **`recursion`**: Depth guard for every recursive entry point.
//! - **`error`**: The error type shared by the planner crates.

pub mod config;
pub mod cost;
pub mod error;
pub mod expr;
pub mod order;
pub mod properties;
pub mod recursion;
pub mod stats;
pub mod types;

pub use error::{PlanError, Result};
