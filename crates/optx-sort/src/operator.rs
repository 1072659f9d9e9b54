//! # Plan Operator Contract
//!
//! Every physical plan node exposes its estimated cardinality, width and cost,
//! together with the ordering of its output. Estimates are computed bottom-up by
//! [`PlanOperator::est_cost`] and can be recomputed speculatively by
//! [`PlanOperator::re_est_cost`] while the plan search explores alternatives.
//!
//! ## Cost Accumulation
//!
//! Costs are additive: an operator's `cost` is its own `op_cost` plus the
//! accumulated cost of its children.
//!
//! ## Speculative Re-estimation
//!
//! `re_est_cost` returns a fresh [`CostEstimate`]. The cached `card`/`cost` of an
//! operator are only replaced when [`EstimateCostParams::allow_override`] is set,
//! so a committed plan can be probed without being changed.

use optx_plan::config::{PlannerConfig, SessionContext};
use optx_plan::cost::{Cost, SortCostModel};
use optx_plan::expr::{ExprArena, ExprId};
use optx_plan::properties::Ordering;
use optx_plan::recursion::RecursionGuard;
use optx_plan::stats::{SelectivityContext, TableMetas};
use optx_plan::Result;
use std::fmt;

use crate::bound::{BoundResolver, DefaultBoundResolver};

/// Statement-level inputs of cost estimation.
#[derive(Debug, Clone, Copy)]
pub struct StatementContext<'a> {
    /// The user-visible select list of the statement.
    pub select_exprs: &'a [ExprId],
    pub session: &'a SessionContext,
    pub table_metas: &'a TableMetas,
    pub sel_ctx: &'a SelectivityContext,
}

/// Everything an operator reads while estimating its cost.
pub struct PlanContext<'a> {
    pub arena: &'a ExprArena,
    pub config: &'a PlannerConfig,
    pub cost_model: &'a dyn SortCostModel,
    pub bound_resolver: &'a dyn BoundResolver,
    /// `None` when the operator is costed outside of a statement.
    pub stmt: Option<StatementContext<'a>>,
    pub guard: RecursionGuard,
}

impl<'a> PlanContext<'a> {
    pub fn new(
        arena: &'a ExprArena,
        config: &'a PlannerConfig,
        cost_model: &'a dyn SortCostModel,
        stmt: StatementContext<'a>,
    ) -> Self {
        Self {
            arena,
            config,
            cost_model,
            bound_resolver: &DefaultBoundResolver,
            stmt: Some(stmt),
            guard: config.recursion_guard(),
        }
    }

    pub fn with_bound_resolver(mut self, resolver: &'a dyn BoundResolver) -> Self {
        self.bound_resolver = resolver;
        self
    }
}

impl fmt::Debug for PlanContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanContext")
            .field("config", self.config)
            .field("has_stmt", &self.stmt.is_some())
            .field("depth", &self.guard.depth())
            .finish()
    }
}

/// Parameters of one re-estimation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateCostParams {
    /// Rows the parent will pull, `None` when unconstrained.
    pub need_row_count: Option<f64>,
    /// Replace the operator's cached estimates with the new ones.
    pub allow_override: bool,
}

impl EstimateCostParams {
    pub fn new(need_row_count: Option<f64>, allow_override: bool) -> Self {
        Self {
            need_row_count,
            allow_override,
        }
    }
}

impl Default for EstimateCostParams {
    fn default() -> Self {
        Self::new(None, false)
    }
}

/// Result of a (re-)estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub card: f64,
    pub cost: Cost,
}

/// A physical plan node.
pub trait PlanOperator: fmt::Debug {
    fn name(&self) -> &str;

    /// Estimated output rows.
    fn card(&self) -> f64;

    /// Accumulated cost of this operator and its subtree.
    fn cost(&self) -> Cost;

    /// Cost of this operator alone.
    fn op_cost(&self) -> Cost;

    /// Estimated output row width in bytes.
    fn width(&self) -> f64;

    /// Degree of parallelism.
    fn parallel(&self) -> usize;

    /// Ordering of the operator's output.
    fn op_ordering(&self) -> &Ordering;

    /// Estimate and cache width, card and cost from the children's cached
    /// estimates.
    fn est_cost(&mut self, ctx: &PlanContext<'_>) -> Result<()>;

    /// Recompute card and cost through the subtree.
    fn re_est_cost(
        &mut self,
        ctx: &PlanContext<'_>,
        params: EstimateCostParams,
    ) -> Result<CostEstimate>;
}
