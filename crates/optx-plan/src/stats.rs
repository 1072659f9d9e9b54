//! # Statistics for Sort Costing
//!
//! Table and column statistics consumed by the sort cost model. They are owned
//! by the surrounding optimizer session and only read here.
//!
//! ## Statistics Hierarchy
//!
//! - **Table-level**: row count and total size in bytes, stored per table id in
//!   [`TableMetas`].
//! - **Column-level**: number of distinct values (NDV), null fraction and
//!   average value size in bytes.
//!
//! ## Estimation Formulas
//!
//! - **Width**: sum over the expressions of the column's average size when
//!   statistics exist, otherwise the fixed width of the result type, otherwise
//!   its declared byte length, otherwise a default.
//! - **Distinct groups of a key prefix**: product of the keys' NDVs, capped by
//!   the input rows. This is the worst case where every combination exists.
//!   Keys without statistics count as `sqrt(rows)` distinct values.

use crate::error::Result;
use crate::expr::{ExprArena, ExprId, ExprKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

/// Width assumed for a value whose size cannot be derived.
pub const DEFAULT_VALUE_WIDTH: f64 = 16.0;

/// Upper bound on the width charged for one variable-length value.
pub const MAX_VALUE_WIDTH: f64 = 4096.0;

/// Statistics for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub total_size_bytes: f64,
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64, total_size_bytes: f64) -> Self {
        Self {
            row_count,
            total_size_bytes,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into(), stats);
        self
    }
}

/// Per-column statistics, typically gathered by ANALYZE TABLE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values (NDV).
    pub distinct_count: f64,
    /// Fraction of rows that are NULL [0.0, 1.0].
    pub null_fraction: f64,
    /// Average size of a single value in bytes.
    pub avg_row_size: f64,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
            avg_row_size: 8.0,
        }
    }

    pub fn with_avg_row_size(mut self, avg_row_size: f64) -> Self {
        self.avg_row_size = avg_row_size;
        self
    }
}

/// Read-only statistics of every table referenced by the statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMetas {
    pub tables: HashMap<u64, Statistics>,
}

impl TableMetas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table_id: u64, stats: Statistics) -> Self {
        self.tables.insert(table_id, stats);
        self
    }

    pub fn column(&self, table_id: u64, column_name: &str) -> Option<&ColumnStatistics> {
        self.tables
            .get(&table_id)
            .and_then(|t| t.column_stats.get(column_name))
    }
}

/// Selectivity state of the plan position being costed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SelectivityContext {
    /// Rows flowing at this point of the plan, when known. Column NDVs are
    /// capped by it.
    pub current_rows: Option<f64>,
}

/// Estimated output row width, in bytes, of the given expressions.
pub fn estimate_width_for_exprs(
    arena: &ExprArena,
    exprs: &[ExprId],
    metas: &TableMetas,
    _sel_ctx: &SelectivityContext,
) -> Result<f64> {
    let mut width = 0.0;
    for &id in exprs {
        let node = arena.node(id)?;
        let from_stats = match node.kind() {
            ExprKind::ColumnRef(column) => metas
                .column(column.table_id, &column.column_name)
                .map(|cs| cs.avg_row_size),
            _ => None,
        };
        let value_width = from_stats
            .or_else(|| node.data_type().fixed_width())
            .or_else(|| {
                let bytes = node.length_in_bytes();
                (bytes >= 0).then(|| (bytes as f64).min(MAX_VALUE_WIDTH))
            })
            .unwrap_or(DEFAULT_VALUE_WIDTH);
        trace!("Width of {}: {:.1}", id, value_width);
        width += value_width;
    }
    Ok(width)
}

/// Estimated number of distinct combinations of `keys` among `rows` rows.
pub fn estimate_distinct(
    arena: &ExprArena,
    keys: &[ExprId],
    rows: f64,
    metas: &TableMetas,
    sel_ctx: &SelectivityContext,
) -> Result<f64> {
    if rows <= 1.0 {
        return Ok(rows.max(0.0));
    }
    let cap = sel_ctx.current_rows.map_or(rows, |r| r.min(rows)).max(1.0);
    let mut ndv = 1.0_f64;
    for &id in keys {
        let key_ndv = match arena.node(id)?.kind() {
            ExprKind::ColumnRef(column) => metas
                .column(column.table_id, &column.column_name)
                .map(|cs| cs.distinct_count.max(1.0)),
            ExprKind::Const(_) => Some(1.0),
            _ => None,
        };
        ndv *= key_ndv.unwrap_or_else(|| rows.sqrt()).min(cap);
    }
    Ok(ndv.min(rows).max(1.0))
}
