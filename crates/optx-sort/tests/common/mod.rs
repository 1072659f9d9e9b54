//! Shared fixtures for the sort operator integration tests.

#![allow(dead_code)]

use optx_plan::config::{PlannerConfig, SessionContext};
use optx_plan::cost::{Cost, DefaultSortCostModel};
use optx_plan::expr::{ColumnRef, ExprArena, ExprId};
use optx_plan::order::OrderKey;
use optx_plan::properties::Ordering;
use optx_plan::stats::{ColumnStatistics, SelectivityContext, Statistics, TableMetas};
use optx_plan::types::{CollationType, DataType, ResultType};
use optx_plan::Result;
use optx_sort::{CostEstimate, EstimateCostParams, PlanContext, PlanOperator, StatementContext};
use std::cell::RefCell;
use std::rc::Rc;

pub const TABLE_ID: u64 = 1;

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Stub child operator
// ---------------------------------------------------------------------------

/// Leaf operator with fixed estimates. `fresh_card`/`fresh_cost` are what a
/// re-estimation reports; every request is recorded in `calls`.
#[derive(Debug)]
pub struct StubChild {
    pub card: f64,
    pub cost: Cost,
    pub width: f64,
    pub fresh_card: f64,
    pub fresh_cost: Cost,
    pub ordering: Ordering,
    pub calls: Rc<RefCell<Vec<EstimateCostParams>>>,
}

impl StubChild {
    pub fn new(card: f64, cost: f64, width: f64) -> Self {
        Self {
            card,
            cost: Cost::new(cost),
            width,
            fresh_card: card,
            fresh_cost: Cost::new(cost),
            ordering: Ordering::default(),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_fresh(mut self, card: f64, cost: f64) -> Self {
        self.fresh_card = card;
        self.fresh_cost = Cost::new(cost);
        self
    }
}

impl PlanOperator for StubChild {
    fn name(&self) -> &str {
        "STUB"
    }
    fn card(&self) -> f64 {
        self.card
    }
    fn cost(&self) -> Cost {
        self.cost
    }
    fn op_cost(&self) -> Cost {
        self.cost
    }
    fn width(&self) -> f64 {
        self.width
    }
    fn parallel(&self) -> usize {
        1
    }
    fn op_ordering(&self) -> &Ordering {
        &self.ordering
    }
    fn est_cost(&mut self, _ctx: &PlanContext<'_>) -> Result<()> {
        Ok(())
    }
    fn re_est_cost(
        &mut self,
        _ctx: &PlanContext<'_>,
        params: EstimateCostParams,
    ) -> Result<CostEstimate> {
        self.calls.borrow_mut().push(params);
        if params.allow_override {
            self.card = self.fresh_card;
            self.cost = self.fresh_cost;
        }
        Ok(CostEstimate {
            card: self.fresh_card,
            cost: self.fresh_cost,
        })
    }
}

// ---------------------------------------------------------------------------
// Statement fixture
// ---------------------------------------------------------------------------

/// Owns everything a `PlanContext` borrows.
pub struct Fixture {
    pub arena: ExprArena,
    pub config: PlannerConfig,
    pub session: SessionContext,
    pub metas: TableMetas,
    pub sel_ctx: SelectivityContext,
    pub cost_model: DefaultSortCostModel,
    pub select_exprs: Vec<ExprId>,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        Self {
            arena: ExprArena::new(),
            config: PlannerConfig::default(),
            session: SessionContext::default(),
            metas: TableMetas::new().with_table(
                TABLE_ID,
                Statistics::new(10_000.0, 640_000.0)
                    .with_column("a", ColumnStatistics::new(100.0, 0.0))
                    .with_column("b", ColumnStatistics::new(50.0, 0.1)),
            ),
            sel_ctx: SelectivityContext::default(),
            cost_model: DefaultSortCostModel::default(),
            select_exprs: Vec::new(),
        }
    }

    pub fn int_col(&mut self, name: &str) -> ExprId {
        self.column(name, ResultType::new(DataType::BigInt))
    }

    pub fn str_col(&mut self, name: &str) -> ExprId {
        self.column(
            name,
            ResultType::string(DataType::Varchar, 32, CollationType::Utf8mb4Bin),
        )
    }

    pub fn column(&mut self, name: &str, result_type: ResultType) -> ExprId {
        let column_id = self.arena.len() as u64;
        self.arena
            .add_column(
                ColumnRef {
                    table_id: TABLE_ID,
                    column_id,
                    table_name: "t".into(),
                    column_name: name.into(),
                },
                result_type,
            )
            .unwrap()
    }

    pub fn asc(&mut self, name: &str) -> OrderKey {
        OrderKey::asc(self.int_col(name))
    }

    pub fn ctx(&self) -> PlanContext<'_> {
        PlanContext::new(
            &self.arena,
            &self.config,
            &self.cost_model,
            StatementContext {
                select_exprs: &self.select_exprs,
                session: &self.session,
                table_metas: &self.metas,
                sel_ctx: &self.sel_ctx,
            },
        )
    }
}
