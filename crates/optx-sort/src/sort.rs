//! # Sort Operator
//!
//! The physical sort node. It owns the logical sort order (the ordered
//! `sort_keys`) and the physical decisions layered on top of it:
//!
//! - **Prefix sort** (`prefix_pos > 0`): the child is already ordered by the
//!   first `prefix_pos` keys; only runs of equal prefix values are sorted.
//! - **Partition sort** (`part_cnt > 0`): rows are grouped by a synthetic
//!   `HASH(k1, .., k_part_cnt)` key and sorted locally per partition. The hash
//!   key leads the output ordering.
//! - **Top-N sort** (`topn_expr` set): at most N rows leave the sort.
//! - **Top-K sort** (`topk_limit_expr` set): approximate early termination
//!   driven by a limit/offset pair and the `minimum_row_count` and
//!   `topk_precision` tuning knobs.
//! - **Encoded sort key**: a single byte-comparable `ENCODE_SORTKEY` expression
//!   standing in for the keys after the prefix (or partition) position.
//!
//! ## Derived Keys
//!
//! The hash key exists exactly when `part_cnt > 0`. A partition count larger
//! than the key list hashes all keys. The encoded keys are the first `ecd_pos`
//! sort keys verbatim followed by one synthetic key over the rest, where
//! `ecd_pos` is `prefix_pos` for a prefix sort, else the partition key count,
//! else zero. Prefix sort wins when both are set. Moving the encode position
//! drops the encoded keys; `maybe_encode_sort_keys` derives them again.
//!
//! ## Estimation
//!
//! `est_cost` derives width, cost and cardinality from the child's cached
//! estimates. `re_est_cost` re-estimates the child first. A LIMIT above a sort
//! cannot be pushed through it, so the child is always asked for its
//! unconstrained estimate.

use optx_plan::config::{PlannerConfig, SessionContext};
use optx_plan::cost::{Cost, SortCostInfo};
use optx_plan::expr::{ExprArena, ExprId, ItemType};
use optx_plan::order::OrderKey;
use optx_plan::properties::Ordering;
use optx_plan::recursion::RecursionGuard;
use optx_plan::stats::SelectivityContext;
use optx_plan::{PlanError, Result};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use tracing::{debug, trace};

use crate::encode::{can_encode_sort_keys, create_encode_sortkey_expr};
use crate::operator::{CostEstimate, EstimateCostParams, PlanContext, PlanOperator, StatementContext};

/// Operator type name used for hashing and as the generic display name.
pub const SORT_OP_NAME: &str = "SORT";

#[derive(Debug)]
pub struct SortOperator {
    child: Option<Box<dyn PlanOperator>>,
    sort_keys: Vec<OrderKey>,
    encoded_keys: Vec<OrderKey>,
    hash_key: Option<OrderKey>,
    part_cnt: usize,
    prefix_pos: usize,
    topn_expr: Option<ExprId>,
    topk_limit_expr: Option<ExprId>,
    topk_offset_expr: Option<ExprId>,
    minimum_row_count: i64,
    topk_precision: i64,
    is_local_merge_sort: bool,
    is_fetch_with_ties: bool,
    is_final_sort: bool,
    parallel: usize,
    card: f64,
    cost: Cost,
    op_cost: Cost,
    width: f64,
    op_ordering: Ordering,
}

impl Default for SortOperator {
    fn default() -> Self {
        Self {
            child: None,
            sort_keys: Vec::new(),
            encoded_keys: Vec::new(),
            hash_key: None,
            part_cnt: 0,
            prefix_pos: 0,
            topn_expr: None,
            topk_limit_expr: None,
            topk_offset_expr: None,
            minimum_row_count: 0,
            topk_precision: 0,
            is_local_merge_sort: false,
            is_fetch_with_ties: false,
            is_final_sort: false,
            parallel: 1,
            card: 0.0,
            cost: Cost::zero(),
            op_cost: Cost::zero(),
            width: 0.0,
            op_ordering: Ordering::default(),
        }
    }
}

impl SortOperator {
    pub fn new(child: Box<dyn PlanOperator>) -> Self {
        Self {
            child: Some(child),
            ..Self::default()
        }
    }

    // ---- Accessors ----

    pub fn child(&self) -> Option<&dyn PlanOperator> {
        self.child.as_deref()
    }
    pub fn sort_keys(&self) -> &[OrderKey] {
        &self.sort_keys
    }
    pub fn encoded_keys(&self) -> &[OrderKey] {
        &self.encoded_keys
    }
    pub fn hash_key(&self) -> Option<&OrderKey> {
        self.hash_key.as_ref()
    }
    pub fn part_cnt(&self) -> usize {
        self.part_cnt
    }
    pub fn prefix_pos(&self) -> usize {
        self.prefix_pos
    }
    pub fn topn_expr(&self) -> Option<ExprId> {
        self.topn_expr
    }
    pub fn topk_limit_expr(&self) -> Option<ExprId> {
        self.topk_limit_expr
    }
    pub fn topk_offset_expr(&self) -> Option<ExprId> {
        self.topk_offset_expr
    }
    pub fn minimum_row_count(&self) -> i64 {
        self.minimum_row_count
    }
    pub fn topk_precision(&self) -> i64 {
        self.topk_precision
    }
    pub fn is_local_merge_sort(&self) -> bool {
        self.is_local_merge_sort
    }
    pub fn is_fetch_with_ties(&self) -> bool {
        self.is_fetch_with_ties
    }
    pub fn is_final_sort(&self) -> bool {
        self.is_final_sort
    }
    pub fn is_prefix_sort(&self) -> bool {
        self.prefix_pos > 0
    }
    pub fn is_part_sort(&self) -> bool {
        self.part_cnt > 0
    }

    /// Whether the encoded sort key is in use.
    pub fn enable_encode_sortkey_opt(&self) -> bool {
        !self.encoded_keys.is_empty()
    }

    /// Expressions of the sort keys, in order.
    pub fn sort_exprs(&self) -> Vec<ExprId> {
        self.sort_keys.iter().map(|k| k.expr).collect()
    }

    // ---- Configuration ----

    pub fn set_child(&mut self, child: Box<dyn PlanOperator>) {
        self.child = Some(child);
    }

    /// Replace the sort keys with a copy of `keys`.
    ///
    /// Everything derived from the previous key list is dropped: the encoded
    /// keys are cleared and the prefix position and partitioning are reset, so
    /// `set_prefix_pos` and `set_part_cnt` must follow when wanted.
    pub fn set_sort_keys(&mut self, keys: &[OrderKey]) -> Result<()> {
        let mut copy = Vec::new();
        copy.try_reserve_exact(keys.len())?;
        copy.extend_from_slice(keys);
        self.sort_keys = copy;
        self.encoded_keys.clear();
        if self.part_cnt > 0 || self.prefix_pos > 0 {
            debug!(
                "Sort keys replaced, dropping prefix {} and partition on {} key(s)",
                self.prefix_pos, self.part_cnt
            );
        }
        self.prefix_pos = 0;
        self.part_cnt = 0;
        self.hash_key = None;
        Ok(())
    }

    /// Set the number of leading keys the child is already ordered by.
    pub fn set_prefix_pos(&mut self, prefix_pos: usize) -> Result<()> {
        if prefix_pos > self.sort_keys.len() {
            return Err(PlanError::unexpected_state(format!(
                "prefix position {} over {} sort keys",
                prefix_pos,
                self.sort_keys.len()
            )));
        }
        let ecd_pos = self.encode_pos();
        self.prefix_pos = prefix_pos;
        self.drop_stale_encoded_keys(ecd_pos);
        Ok(())
    }

    /// Set the partition count and derive (or drop) the hash key.
    pub fn set_part_cnt(
        &mut self,
        part_cnt: usize,
        arena: &mut ExprArena,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<()> {
        if part_cnt > 0 && self.sort_keys.is_empty() {
            return Err(PlanError::unexpected_state(
                "partition sort without sort keys",
            ));
        }
        let ecd_pos = self.encode_pos();
        self.part_cnt = part_cnt;
        self.drop_stale_encoded_keys(ecd_pos);
        if part_cnt > 0 {
            self.derive_hash_key(arena, session, guard)
        } else {
            self.hash_key = None;
            Ok(())
        }
    }

    pub fn set_topn(&mut self, topn_expr: Option<ExprId>) {
        self.topn_expr = topn_expr;
    }

    pub fn set_topk(
        &mut self,
        limit: Option<ExprId>,
        offset: Option<ExprId>,
        minimum_row_count: i64,
        topk_precision: i64,
    ) {
        self.topk_limit_expr = limit;
        self.topk_offset_expr = offset;
        self.minimum_row_count = minimum_row_count;
        self.topk_precision = topk_precision;
    }

    pub fn set_local_merge_sort(&mut self, v: bool) {
        self.is_local_merge_sort = v;
    }

    pub fn set_fetch_with_ties(&mut self, v: bool) {
        self.is_fetch_with_ties = v;
    }

    pub fn set_final_sort(&mut self, v: bool) {
        self.is_final_sort = v;
    }

    pub fn set_parallel(&mut self, parallel: usize) {
        self.parallel = parallel;
    }

    // ---- Derived keys ----

    /// Number of keys the hash key covers.
    fn part_key_count(&self) -> usize {
        self.part_cnt.min(self.sort_keys.len())
    }

    /// Number of leading keys kept verbatim in front of the encoded key.
    fn encode_pos(&self) -> usize {
        if self.is_prefix_sort() {
            self.prefix_pos
        } else if self.is_part_sort() {
            self.part_key_count()
        } else {
            0
        }
    }

    /// Encoded keys are laid out for one encode position; once the position
    /// moves they no longer match and are dropped until derived again.
    fn drop_stale_encoded_keys(&mut self, previous_ecd_pos: usize) {
        if !self.encoded_keys.is_empty() && self.encode_pos() != previous_ecd_pos {
            debug!(
                "Encode position moved from {} to {}, dropping encoded keys",
                previous_ecd_pos,
                self.encode_pos()
            );
            self.encoded_keys.clear();
        }
    }

    /// Build `HASH(k1, .., k_n)` over the partition keys and store it as the
    /// ascending hash key.
    pub fn derive_hash_key(
        &mut self,
        arena: &mut ExprArena,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<()> {
        let n = self.part_key_count();
        if n == 0 {
            return Err(PlanError::unexpected_state(
                "hash key requested without partition keys",
            ));
        }
        let hash = arena.create(ItemType::FunSysHash)?;
        for key in &self.sort_keys[..n] {
            arena.add_param_expr(hash, key.expr)?;
        }
        arena.formalize(hash, session, guard)?;
        trace!("Derived hash sort key {} over {} key(s)", hash, n);
        self.hash_key = Some(OrderKey::asc(hash));
        Ok(())
    }

    /// Rebuild the encoded keys: `sort_keys[..ecd_pos]` verbatim, then one
    /// synthetic key encoding `sort_keys[ecd_pos..]`.
    ///
    /// When no key is left after `ecd_pos` there is nothing to encode and the
    /// encoded keys stay empty.
    pub fn derive_encoded_key(
        &mut self,
        arena: &mut ExprArena,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<()> {
        let ecd_pos = self.encode_pos();
        if ecd_pos > self.sort_keys.len() {
            return Err(PlanError::unexpected_state(format!(
                "encode position {} over {} sort keys",
                ecd_pos,
                self.sort_keys.len()
            )));
        }
        self.encoded_keys.clear();
        if ecd_pos == self.sort_keys.len() {
            return Ok(());
        }
        let synthetic = create_encode_sortkey_expr(arena, &self.sort_keys, ecd_pos, session, guard)?;
        let mut keys = Vec::new();
        keys.try_reserve_exact(ecd_pos + 1)?;
        keys.extend_from_slice(&self.sort_keys[..ecd_pos]);
        keys.push(synthetic);
        self.encoded_keys = keys;
        debug!(
            "Encoded sort keys: {} verbatim + {}",
            ecd_pos, synthetic.expr
        );
        Ok(())
    }

    /// Derive the encoded key when the toggle is on and every sort key is
    /// encodable. Returns whether encoded keys are in place afterwards.
    pub fn maybe_encode_sort_keys(
        &mut self,
        arena: &mut ExprArena,
        config: &PlannerConfig,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<bool> {
        if !self.encoded_keys.is_empty() {
            return Ok(true);
        }
        if config.enable_encode_sort_key && can_encode_sort_keys(arena, &self.sort_keys)? {
            self.derive_encoded_key(arena, session, guard)?;
        }
        Ok(self.enable_encode_sortkey_opt())
    }

    /// Set and return the output ordering: the hash key (when partitioned)
    /// followed by the sort keys, as a global ordering.
    pub fn compute_op_ordering(&mut self) -> Result<&Ordering> {
        let mut keys = Vec::new();
        keys.try_reserve_exact(self.sort_keys.len() + 1)?;
        if self.part_cnt > 0 {
            let hash = self
                .hash_key
                .ok_or_else(|| PlanError::unexpected_null("hash sort key"))?;
            keys.push(hash);
        }
        keys.extend_from_slice(&self.sort_keys);
        self.op_ordering = Ordering::global(keys);
        Ok(&self.op_ordering)
    }

    // ---- Expressions ----

    /// Every expression the operator evaluates: bounds, sort keys, encoded keys
    /// and the hash key. Derives the encoded key first when enabled.
    pub fn collect_op_exprs(
        &mut self,
        arena: &mut ExprArena,
        config: &PlannerConfig,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<Vec<ExprId>> {
        self.maybe_encode_sort_keys(arena, config, session, guard)?;
        let mut exprs = Vec::new();
        exprs.try_reserve(3 + self.sort_keys.len() + self.encoded_keys.len() + 1)?;
        exprs.extend(
            [self.topn_expr, self.topk_limit_expr, self.topk_offset_expr]
                .into_iter()
                .flatten(),
        );
        exprs.extend(self.sort_keys.iter().map(|k| k.expr));
        exprs.extend(self.encoded_keys.iter().map(|k| k.expr));
        if self.part_cnt > 0 {
            let hash = self
                .hash_key
                .ok_or_else(|| PlanError::unexpected_null("hash sort key"))?;
            exprs.push(hash.expr);
        }
        Ok(exprs)
    }

    /// Substitute generated expressions in the sort, encoded and hash keys.
    pub fn replace_exprs(&mut self, pairs: &[(ExprId, ExprId)]) {
        let replace = |key: &mut OrderKey| {
            if let Some((_, to)) = pairs.iter().find(|(from, _)| *from == key.expr) {
                key.expr = *to;
            }
        };
        self.sort_keys.iter_mut().for_each(replace);
        self.encoded_keys.iter_mut().for_each(replace);
        if self.part_cnt > 0 {
            if let Some(hash) = self.hash_key.as_mut() {
                replace(hash);
            }
        }
    }

    /// Structural hash; sorts differing only in being top-N hash apart.
    pub fn plan_hash(&self, seed: u64) -> u64 {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        self.topn_expr.is_some().hash(&mut hasher);
        SORT_OP_NAME.hash(&mut hasher);
        hasher.finish()
    }

    // ---- Estimation ----

    fn child_ref(&self) -> Result<&dyn PlanOperator> {
        self.child
            .as_deref()
            .ok_or_else(|| PlanError::unexpected_null("sort child operator"))
    }

    fn stmt<'a>(ctx: &PlanContext<'a>) -> Result<StatementContext<'a>> {
        ctx.stmt
            .ok_or_else(|| PlanError::unexpected_null("statement context"))
    }

    /// Estimate and cache the output width.
    ///
    /// An intermediate sort passes the child's width through. The final sort
    /// measures the column, aggregate and window-function leaves of the select
    /// list.
    pub fn est_width(&mut self, ctx: &PlanContext<'_>) -> Result<f64> {
        let child = self.child_ref()?;
        let width = if !self.is_final_sort {
            let width = child.width();
            trace!("Width for non-final sort: {:.1}", width);
            width
        } else {
            let stmt = Self::stmt(ctx)?;
            let mut seen = HashSet::new();
            let candidates: Vec<ExprId> = stmt
                .select_exprs
                .iter()
                .copied()
                .filter(|e| seen.insert(*e))
                .collect();
            let leaves = ctx
                .arena
                .extract_col_aggr_winfunc_exprs(&candidates, &ctx.guard)?;
            let width =
                ctx.cost_model
                    .estimate_width(ctx.arena, &leaves, stmt.table_metas, stmt.sel_ctx)?;
            trace!(
                "Width for final sort over {} expr(s): {:.1}",
                leaves.len(),
                width
            );
            width
        };
        self.width = width;
        Ok(width)
    }

    /// Sort cost for `child_card` input rows and the resolved top-N bound.
    fn inner_est_cost(&self, ctx: &PlanContext<'_>, child_card: f64) -> Result<(Option<f64>, f64)> {
        let child = self.child_ref()?;
        let stmt = Self::stmt(ctx)?;
        if self.parallel < 1 {
            return Err(PlanError::unexpected_state(format!(
                "parallel degree {}",
                self.parallel
            )));
        }
        if self.prefix_pos > self.sort_keys.len() {
            return Err(PlanError::unexpected_state(format!(
                "prefix position {} over {} sort keys",
                self.prefix_pos,
                self.sort_keys.len()
            )));
        }
        let topn = match self.topn_expr {
            Some(expr) => ctx
                .bound_resolver
                .resolve(ctx.arena, expr, stmt.session, &ctx.guard)?
                .map(|n| (n as f64).min(child_card)),
            None => None,
        };
        let sel_ctx = SelectivityContext {
            current_rows: Some(child_card),
        };
        let info = SortCostInfo {
            arena: ctx.arena,
            rows: child_card / self.parallel as f64,
            width: child.width(),
            prefix_pos: self.prefix_pos,
            keys: &self.sort_keys,
            is_local_merge: self.is_local_merge_sort,
            table_metas: stmt.table_metas,
            sel_ctx: &sel_ctx,
            topn,
            part_cnt: self.part_key_count(),
        };
        let op_cost = ctx.cost_model.cost_sort(&info, ctx.config.cost_model)?;
        Ok((topn, op_cost))
    }
}

impl PlanOperator for SortOperator {
    fn name(&self) -> &str {
        self.display_name()
    }

    fn card(&self) -> f64 {
        self.card
    }

    fn cost(&self) -> Cost {
        self.cost
    }

    fn op_cost(&self) -> Cost {
        self.op_cost
    }

    fn width(&self) -> f64 {
        self.width
    }

    fn parallel(&self) -> usize {
        self.parallel
    }

    fn op_ordering(&self) -> &Ordering {
        &self.op_ordering
    }

    fn est_cost(&mut self, ctx: &PlanContext<'_>) -> Result<()> {
        self.est_width(ctx)?;
        let child = self.child_ref()?;
        let (child_card, child_cost) = (child.card(), child.cost());
        let (topn, sort_cost) = self.inner_est_cost(ctx, child_card)?;
        self.op_cost = Cost::new(sort_cost);
        self.cost = child_cost + self.op_cost;
        self.card = topn.unwrap_or(child_card);
        debug!(
            "Cost for sort operator: op_cost={:.4}, cost={:.4}, card={:.1}",
            sort_cost, self.cost.total, self.card
        );
        Ok(())
    }

    fn re_est_cost(
        &mut self,
        ctx: &PlanContext<'_>,
        params: EstimateCostParams,
    ) -> Result<CostEstimate> {
        // A limit above the sort is blocked by it.
        let child_params = EstimateCostParams {
            need_row_count: None,
            ..params
        };
        let child = self
            .child
            .as_deref_mut()
            .ok_or_else(|| PlanError::unexpected_null("sort child operator"))?;
        let fresh = ctx.guard.protect(|| child.re_est_cost(ctx, child_params))?;
        let (topn, sort_cost) = self.inner_est_cost(ctx, fresh.card)?;

        let mut card = fresh.card;
        if let Some(need) = params.need_row_count {
            if need >= 0.0 {
                card = card.min(need);
            }
        }
        if let Some(topn) = topn {
            card = card.min(topn);
        }
        let cost = fresh.cost + Cost::new(sort_cost);
        trace!(
            "Re-estimated sort: card={:.1}, cost={:.4}, override={}",
            card,
            cost.total,
            params.allow_override
        );
        if params.allow_override {
            self.op_cost = Cost::new(sort_cost);
            self.cost = cost;
            self.card = card;
        }
        Ok(CostEstimate { card, cost })
    }
}
