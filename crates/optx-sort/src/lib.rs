//! # optx-sort: The Sort Plan Operator
//!
//! Cost-based planning of the physical sort node: which sort strategy applies
//! (plain, prefix, partition, top-N, top-K, local merge), which synthetic keys
//! it needs (hash key, encoded sort key), what ordering it guarantees to its
//! parent, and what it costs.
//!
//! ## Module Overview
//!
//! - **`operator`**: The [`PlanOperator`] contract shared by plan nodes, the
//!   read-only [`PlanContext`] they are costed in, and the re-estimation
//!   parameters.
//! - **`sort`**: [`SortOperator`], its key derivation, ordering and estimation.
//! - **`encode`**: Encodability check, `ENCODE_SORTKEY` construction and the
//!   reference order-preserving byte encoder.
//! - **`bound`**: Evaluation of top-N and limit expressions into row counts.
//! - **`explain`**: Display name and plan annotation.
//!
//! ## Usage
//!
//! ```ignore
//! let mut sort = SortOperator::new(Box::new(child));
//! sort.set_sort_keys(&keys)?;
//! sort.set_part_cnt(1, &mut arena, &session, &guard)?;
//! sort.maybe_encode_sort_keys(&mut arena, &config, &session, &guard)?;
//! sort.compute_op_ordering()?;
//! sort.est_cost(&PlanContext::new(&arena, &config, &cost_model, stmt))?;
//! ```

pub mod bound;
pub mod encode;
pub mod explain;
pub mod operator;
pub mod sort;

pub use bound::{BoundResolver, DefaultBoundResolver};
pub use explain::ExplainType;
pub use operator::{CostEstimate, EstimateCostParams, PlanContext, PlanOperator, StatementContext};
pub use sort::SortOperator;
