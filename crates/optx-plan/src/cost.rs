//! # Sort Cost Model
//!
//! This module defines the cost abstraction and the default model used to price a
//! sort operator.
//!
//! ## Strategies
//!
//! A sort is priced as one of five strategies, chosen from the cost input in this
//! order of preference:
//!
//! 1. **Prefix sort** (`prefix_pos > 0`): the input is already ordered by the
//!    leading keys. Only runs of equal prefix values are sorted, on the
//!    remaining keys.
//! 2. **Top-N sort** (`topn` is set): a bounded heap of `N` rows is maintained;
//!    every input row costs `log2(N)` comparisons instead of `log2(rows)`.
//! 3. **Partition sort** (`part_cnt > 0`): rows are hashed on the partition
//!    keys and each partition is sorted independently.
//! 4. **Local merge sort**: the input arrives as already sorted runs that are
//!    merged.
//! 5. **Plain sort**: full `O(n log n)` comparison sort with materialization.
//!
//! ## Comparison Cost
//!
//! Each key is charged a per-comparison cost by its type class. Strings are the
//! most expensive, fixed-width integers the cheapest. The `Vector` model
//! variant discounts comparisons to reflect batch execution.
//!
//! ## Monotonicity
//!
//! Every strategy's formula is non-decreasing in the input row count. Counts
//! are taken through `log2(x + 1)` so that zero and one row never yield negative
//! or undefined costs.

use crate::error::{PlanError, Result};
use crate::expr::{ExprArena, ExprId};
use crate::order::OrderKey;
use crate::stats::{estimate_distinct, estimate_width_for_exprs, SelectivityContext, TableMetas};
use crate::types::TypeClass;
use serde::{Deserialize, Serialize};
use std::ops::Add;
use tracing::trace;

/// Cost is a single comparable value representing the estimated expense of a plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    /// The total cost. Lower is better. `f64::MAX` represents infinity.
    pub total: f64,
}

impl Cost {
    pub fn zero() -> Self {
        Self { total: 0.0 }
    }

    pub fn new(total: f64) -> Self {
        Self { total }
    }

    pub fn infinite() -> Self {
        Self { total: f64::MAX }
    }

    pub fn is_infinite(&self) -> bool {
        self.total == f64::MAX
    }
}

/// Epsilon-based equality to handle floating-point imprecision in cost comparisons.
impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        (self.total - other.total).abs() < f64::EPSILON
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.total.partial_cmp(&other.total)
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        if self.is_infinite() || rhs.is_infinite() {
            return Cost::infinite();
        }
        Cost::new(self.total + rhs.total)
    }
}

/// Cost model variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostModelType {
    #[default]
    Normal,
    Vector,
}

/// Input of one sort cost computation.
#[derive(Debug, Clone, Copy)]
pub struct SortCostInfo<'a> {
    pub arena: &'a ExprArena,
    /// Child rows per worker (child cardinality divided by parallelism).
    pub rows: f64,
    /// Estimated row width in bytes.
    pub width: f64,
    /// Number of leading keys the input is already ordered by.
    pub prefix_pos: usize,
    pub keys: &'a [OrderKey],
    pub is_local_merge: bool,
    pub table_metas: &'a TableMetas,
    pub sel_ctx: &'a SelectivityContext,
    /// Resolved top-N bound, `None` when no bound applies.
    pub topn: Option<f64>,
    pub part_cnt: usize,
}

impl SortCostInfo<'_> {
    fn validate(&self) -> Result<()> {
        let check = |what: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(PlanError::InvalidCostInput(format!("{} = {}", what, v)))
            }
        };
        check("rows", self.rows)?;
        check("width", self.width)?;
        if let Some(topn) = self.topn {
            check("topn", topn)?;
        }
        if self.prefix_pos > self.keys.len() || self.part_cnt > self.keys.len() {
            return Err(PlanError::InvalidCostInput(format!(
                "prefix_pos {} / part_cnt {} over {} keys",
                self.prefix_pos,
                self.part_cnt,
                self.keys.len()
            )));
        }
        Ok(())
    }

    fn key_exprs(keys: &[OrderKey]) -> Vec<ExprId> {
        keys.iter().map(|k| k.expr).collect()
    }
}

/// Trait for pluggable sort cost models.
pub trait SortCostModel {
    /// Local cost of the sort described by `info`, excluding the child's cost.
    fn cost_sort(&self, info: &SortCostInfo<'_>, model: CostModelType) -> Result<f64>;

    /// Output row width of `exprs`.
    fn estimate_width(
        &self,
        arena: &ExprArena,
        exprs: &[ExprId],
        metas: &TableMetas,
        sel_ctx: &SelectivityContext,
    ) -> Result<f64> {
        estimate_width_for_exprs(arena, exprs, metas, sel_ctx)
    }
}

/// Unit costs of the default sort cost model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortCostParams {
    /// Reading and emitting one row.
    pub cpu_per_row: f64,
    /// Copying one byte into the sort buffer.
    pub per_byte: f64,
    /// One comparison of an integer key.
    pub cmp_int: f64,
    /// One comparison of a float or decimal key.
    pub cmp_numeric: f64,
    /// One comparison of a date or time key.
    pub cmp_datetime: f64,
    /// One comparison of a character or binary key.
    pub cmp_string: f64,
    /// One comparison of any other key.
    pub cmp_other: f64,
    /// Hashing one row for partitioning.
    pub hash_per_row: f64,
    /// Starting a new run of a prefix sort.
    pub per_prefix_group: f64,
    /// Number of sorted runs merged by a local merge sort.
    pub local_merge_ways: f64,
    /// Comparison discount of the vectorized model.
    pub vector_cmp_factor: f64,
}

impl Default for SortCostParams {
    fn default() -> Self {
        Self {
            cpu_per_row: 0.05,
            per_byte: 0.0005,
            cmp_int: 0.01,
            cmp_numeric: 0.015,
            cmp_datetime: 0.012,
            cmp_string: 0.03,
            cmp_other: 0.05,
            hash_per_row: 0.02,
            per_prefix_group: 0.1,
            local_merge_ways: 16.0,
            vector_cmp_factor: 0.5,
        }
    }
}

/// Default sort cost model.
#[derive(Debug, Clone, Default)]
pub struct DefaultSortCostModel {
    pub params: SortCostParams,
}

impl DefaultSortCostModel {
    pub fn new(params: SortCostParams) -> Self {
        Self { params }
    }

    fn compare_cost(
        &self,
        arena: &ExprArena,
        keys: &[OrderKey],
        model: CostModelType,
    ) -> Result<f64> {
        let p = &self.params;
        let mut cost = 0.0;
        for key in keys {
            cost += match arena.node(key.expr)?.type_class() {
                TypeClass::Null | TypeClass::Int | TypeClass::UInt => p.cmp_int,
                TypeClass::Float | TypeClass::Decimal => p.cmp_numeric,
                TypeClass::DateTime => p.cmp_datetime,
                TypeClass::String => p.cmp_string,
                _ => p.cmp_other,
            };
        }
        if model == CostModelType::Vector {
            cost *= p.vector_cmp_factor;
        }
        Ok(cost)
    }
}

fn log2p1(x: f64) -> f64 {
    (x + 1.0).log2()
}

impl SortCostModel for DefaultSortCostModel {
    fn cost_sort(&self, info: &SortCostInfo<'_>, model: CostModelType) -> Result<f64> {
        info.validate()?;
        let p = &self.params;
        let rows = info.rows;
        if rows == 0.0 {
            return Ok(0.0);
        }
        let arena = info.arena;
        let base = rows * (p.cpu_per_row + info.width * p.per_byte);

        let (strategy, sort_cost) = if info.prefix_pos > 0 {
            let (prefix, suffix) = info.keys.split_at(info.prefix_pos);
            let groups = estimate_distinct(
                arena,
                &SortCostInfo::key_exprs(prefix),
                rows,
                info.table_metas,
                info.sel_ctx,
            )?
            .max(1.0);
            // Boundary detection compares the prefix once per row.
            let boundary = rows * self.compare_cost(arena, prefix, model)?;
            let runs = rows * log2p1(rows / groups) * self.compare_cost(arena, suffix, model)?;
            ("prefix", boundary + runs + groups * p.per_prefix_group)
        } else if let Some(topn) = info.topn {
            let heap = topn.min(rows);
            let cmp = rows * log2p1(heap) * self.compare_cost(arena, info.keys, model)?;
            ("top-n", cmp + heap * info.width * p.per_byte)
        } else if info.part_cnt > 0 {
            let groups = estimate_distinct(
                arena,
                &SortCostInfo::key_exprs(&info.keys[..info.part_cnt]),
                rows,
                info.table_metas,
                info.sel_ctx,
            )?
            .max(1.0);
            let hash = rows * p.hash_per_row;
            let cmp = rows * log2p1(rows / groups) * self.compare_cost(arena, info.keys, model)?;
            ("partition", hash + cmp + rows * info.width * p.per_byte)
        } else if info.is_local_merge {
            let ways = p.local_merge_ways.min(rows);
            let cmp = rows * log2p1(ways) * self.compare_cost(arena, info.keys, model)?;
            ("local-merge", cmp)
        } else {
            let cmp = rows * log2p1(rows) * self.compare_cost(arena, info.keys, model)?;
            ("plain", cmp + rows * info.width * p.per_byte)
        };

        let cost = base + sort_cost;
        trace!(
            "Sort cost ({}): rows={:.1}, width={:.1}, keys={}, cost={:.4}",
            strategy,
            rows,
            info.width,
            info.keys.len(),
            cost
        );
        Ok(cost)
    }
}
