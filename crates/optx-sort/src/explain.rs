//! Display name and explain annotation of the sort operator.

use optx_plan::expr::{ExprArena, ExprId};
use optx_plan::order::OrderKey;
use optx_plan::recursion::RecursionGuard;
use optx_plan::Result;
use serde::{Deserialize, Serialize};

use crate::sort::{SortOperator, SORT_OP_NAME};

/// Level of detail of an explain request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExplainType {
    #[default]
    Basic,
    Extended,
    ExtendedNoAddr,
    PlanRegress,
}

impl ExplainType {
    pub fn is_extended(self) -> bool {
        matches!(
            self,
            ExplainType::Extended | ExplainType::ExtendedNoAddr | ExplainType::PlanRegress
        )
    }
}

impl SortOperator {
    /// Strategy-specific operator name.
    pub fn display_name(&self) -> &'static str {
        if self.topn_expr().is_some() {
            "TOP-N SORT"
        } else if self.topk_limit_expr().is_none() && self.prefix_pos() == 0 && self.part_cnt() > 0
        {
            "PARTITION SORT"
        } else {
            SORT_OP_NAME
        }
    }

    /// Render the operator's annotation, e.g.
    /// `sort_keys([HASH(t.a), ASC], [t.a, ASC]), prefix_pos(1), local merge sort`.
    pub fn print_plan_annotation(
        &self,
        arena: &ExprArena,
        explain: ExplainType,
        guard: &RecursionGuard,
    ) -> Result<String> {
        let mut keys: Vec<OrderKey> = Vec::new();
        keys.try_reserve(self.sort_keys().len() + 1)?;
        keys.extend(self.hash_key().copied());
        keys.extend_from_slice(self.sort_keys());

        let mut items = Vec::with_capacity(keys.len());
        for key in &keys {
            items.push(format!("[{}, {}]", arena.render(key.expr, guard)?, key.direction));
        }
        let mut parts = vec![format!("sort_keys({})", items.join(", "))];

        if let Some(topn) = self.topn_expr() {
            parts.push(format!("topn({})", arena.render(topn, guard)?));
        }
        if let Some(limit) = self.topk_limit_expr() {
            parts.push(format!(
                "minimum_row_count:{} top_precision:{}",
                self.minimum_row_count(),
                self.topk_precision()
            ));
            parts.push(format!("limit({})", render_opt(arena, Some(limit), guard)?));
            parts.push(format!(
                "offset({})",
                render_opt(arena, self.topk_offset_expr(), guard)?
            ));
        }
        if self.prefix_pos() > 0 {
            parts.push(format!("prefix_pos({})", self.prefix_pos()));
        }
        if self.is_local_merge_sort() {
            parts.push("local merge sort".to_string());
        }
        if explain.is_extended() && self.enable_encode_sortkey_opt() {
            parts.push("encoded".to_string());
        }
        if self.is_fetch_with_ties() {
            parts.push("with_ties(true)".to_string());
        }
        Ok(parts.join(", "))
    }
}

fn render_opt(arena: &ExprArena, expr: Option<ExprId>, guard: &RecursionGuard) -> Result<String> {
    match expr {
        Some(expr) => arena.render(expr, guard),
        None => Ok("nil".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optx_plan::config::SessionContext;
    use optx_plan::expr::ColumnRef;
    use optx_plan::types::{DataType, ResultType, ScalarValue};

    fn column(arena: &mut ExprArena, name: &str) -> ExprId {
        arena
            .add_column(
                ColumnRef {
                    table_id: 1,
                    column_id: 0,
                    table_name: "t".into(),
                    column_name: name.into(),
                },
                ResultType::new(DataType::BigInt),
            )
            .unwrap()
    }

    #[test]
    fn test_display_name() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a");
        let ten = arena.add_const(ScalarValue::Int64(10)).unwrap();
        let (session, guard) = (SessionContext::default(), RecursionGuard::default());
        let mut sort = SortOperator::default();
        sort.set_sort_keys(&[OrderKey::asc(a)]).unwrap();
        assert_eq!(sort.display_name(), "SORT");

        sort.set_part_cnt(1, &mut arena, &session, &guard).unwrap();
        assert_eq!(sort.display_name(), "PARTITION SORT");

        sort.set_prefix_pos(1).unwrap();
        assert_eq!(sort.display_name(), "SORT");

        sort.set_prefix_pos(0).unwrap();
        sort.set_topk(Some(ten), None, 100, 10);
        assert_eq!(sort.display_name(), "SORT");

        sort.set_topn(Some(ten));
        assert_eq!(sort.display_name(), "TOP-N SORT");
    }

    #[test]
    fn test_annotation_order() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a");
        let b = column(&mut arena, "b");
        let ten = arena.add_const(ScalarValue::Int64(10)).unwrap();
        let (session, guard) = (SessionContext::default(), RecursionGuard::default());
        let mut sort = SortOperator::default();
        sort.set_sort_keys(&[OrderKey::asc(a), OrderKey::desc(b)])
            .unwrap();
        sort.set_part_cnt(1, &mut arena, &session, &guard).unwrap();
        sort.set_prefix_pos(1).unwrap();
        sort.set_topk(Some(ten), None, 100, 10);
        sort.set_local_merge_sort(true);
        sort.set_fetch_with_ties(true);
        sort.derive_encoded_key(&mut arena, &session, &guard)
            .unwrap();

        let basic = sort
            .print_plan_annotation(&arena, ExplainType::Basic, &guard)
            .unwrap();
        assert_eq!(
            basic,
            "sort_keys([HASH(t.a), ASC], [t.a, ASC], [t.b, DESC]), \
             minimum_row_count:100 top_precision:10, limit(10), offset(nil), \
             prefix_pos(1), local merge sort, with_ties(true)"
        );
        let extended = sort
            .print_plan_annotation(&arena, ExplainType::Extended, &guard)
            .unwrap();
        assert!(extended.contains("local merge sort, encoded, with_ties(true)"));
    }
}
