//! SQL-like rendering of expressions for plan explain output.

use super::{ExprArena, ExprId, ExprKind, ItemType};
use crate::error::{PlanError, Result};
use crate::recursion::RecursionGuard;

impl ExprArena {
    /// Render `id` as text, e.g. `HASH(t.a, t.b)` or `(t.a + 1)`.
    pub fn render(&self, id: ExprId, guard: &RecursionGuard) -> Result<String> {
        guard.protect(|| {
            let node = self.node(id)?;
            let item_type = node.item_type();
            let text = match node.kind() {
                ExprKind::Invalid => {
                    return Err(PlanError::not_supported(
                        "rendering an unclassified expression",
                    ))
                }
                ExprKind::Const(value) => value.to_string(),
                ExprKind::ExecParam { index } => format!(":{}", index),
                ExprKind::QueryRef { subquery_id } => format!("subquery({})", subquery_id),
                ExprKind::ColumnRef(column) => column.to_string(),
                ExprKind::PseudoColumn { name }
                | ExprKind::Var { name }
                | ExprKind::OpPseudoColumn { name }
                | ExprKind::AliasRef { name, .. } => name.clone(),
                ExprKind::SetOp { index } => format!("{}([{}])", item_type.name(), index),
                ExprKind::Operator { args } => self.render_operator(item_type, args, guard)?,
                ExprKind::CaseOperator { args } => {
                    let mut out = String::from("CASE");
                    let mut chunks = args.chunks_exact(2);
                    for pair in chunks.by_ref() {
                        out.push_str(&format!(
                            " WHEN {} THEN {}",
                            self.render(pair[0], guard)?,
                            self.render(pair[1], guard)?
                        ));
                    }
                    if let [otherwise] = chunks.remainder() {
                        out.push_str(&format!(" ELSE {}", self.render(*otherwise, guard)?));
                    }
                    out.push_str(" END");
                    out
                }
                ExprKind::Aggregate { args, distinct } => {
                    let inner = self.render_list(args, guard)?;
                    let inner = if inner.is_empty() && item_type == ItemType::FunCount {
                        "*".to_string()
                    } else {
                        inner
                    };
                    if *distinct {
                        format!("{}(DISTINCT {})", item_type.name(), inner)
                    } else {
                        format!("{}({})", item_type.name(), inner)
                    }
                }
                ExprKind::SysFunc { args } => {
                    format!("{}({})", item_type.name(), self.render_list(args, guard)?)
                }
                ExprKind::Udf { name, args } => {
                    format!("{}({})", name, self.render_list(args, guard)?)
                }
                ExprKind::Window {
                    args,
                    partition_by,
                    order_by,
                } => {
                    let mut over = Vec::new();
                    if !partition_by.is_empty() {
                        over.push(format!(
                            "PARTITION BY {}",
                            self.render_list(partition_by, guard)?
                        ));
                    }
                    if !order_by.is_empty() {
                        over.push(format!("ORDER BY {}", self.render_list(order_by, guard)?));
                    }
                    format!(
                        "{}({}) OVER({})",
                        item_type.name(),
                        self.render_list(args, guard)?,
                        over.join(" ")
                    )
                }
            };
            Ok(text)
        })
    }

    fn render_list(&self, ids: &[ExprId], guard: &RecursionGuard) -> Result<String> {
        let parts = ids
            .iter()
            .map(|&id| self.render(id, guard))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(", "))
    }

    fn render_operator(
        &self,
        item_type: ItemType,
        args: &[ExprId],
        guard: &RecursionGuard,
    ) -> Result<String> {
        match (item_type, args) {
            (ItemType::OpIsNull, [arg]) => Ok(format!("({} IS NULL)", self.render(*arg, guard)?)),
            (_, [arg]) => Ok(format!("{}({})", item_type.name(), self.render(*arg, guard)?)),
            (_, [lhs, rhs]) if item_type.is_binary_operator() => Ok(format!(
                "({} {} {})",
                self.render(*lhs, guard)?,
                item_type.name(),
                self.render(*rhs, guard)?
            )),
            _ => Ok(format!(
                "{}({})",
                item_type.name(),
                self.render_list(args, guard)?
            )),
        }
    }
}
