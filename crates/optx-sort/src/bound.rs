//! Row-count bounds of top-N and limit expressions.
//!
//! A bound is an integer constant, an execution parameter, or `+`, `-`, `*` of
//! bounds. A NULL anywhere in the expression disables the bound. A negative
//! result is clamped to zero.

use optx_plan::config::SessionContext;
use optx_plan::expr::{ExprArena, ExprId, ExprKind, ItemType};
use optx_plan::recursion::RecursionGuard;
use optx_plan::types::ScalarValue;
use optx_plan::{PlanError, Result};

/// Evaluates bound expressions against the session's parameters.
pub trait BoundResolver {
    /// Raw value of `expr`; `None` when it evaluates to NULL.
    fn evaluate(
        &self,
        arena: &ExprArena,
        expr: ExprId,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<Option<i64>>;

    /// Value of `expr` as a row count.
    fn resolve(
        &self,
        arena: &ExprArena,
        expr: ExprId,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<Option<i64>> {
        Ok(self.evaluate(arena, expr, session, guard)?.map(|v| v.max(0)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBoundResolver;

fn scalar_to_bound(value: &ScalarValue) -> Result<Option<i64>> {
    match value {
        ScalarValue::Null => Ok(None),
        ScalarValue::Int64(v) => Ok(Some(*v)),
        ScalarValue::UInt64(v) => Ok(Some(i64::try_from(*v).unwrap_or(i64::MAX))),
        ScalarValue::Bool(v) => Ok(Some(i64::from(*v))),
        // Saturating, NaN maps to zero.
        ScalarValue::Float64(v) => Ok(Some(v.0.trunc() as i64)),
        other => Err(PlanError::TypeResolution(format!(
            "{} is not a row count",
            other
        ))),
    }
}

impl BoundResolver for DefaultBoundResolver {
    fn evaluate(
        &self,
        arena: &ExprArena,
        expr: ExprId,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<Option<i64>> {
        guard.protect(|| {
            let node = arena.node(expr)?;
            match node.kind() {
                ExprKind::Const(value) => scalar_to_bound(value),
                ExprKind::ExecParam { index } => {
                    let value = session.param(*index).ok_or_else(|| {
                        PlanError::unexpected_null(format!("execution parameter {}", index))
                    })?;
                    scalar_to_bound(value)
                }
                ExprKind::Operator { args } => {
                    let [lhs, rhs] = args.as_slice() else {
                        return Err(PlanError::not_supported(format!(
                            "{} with {} arguments as a bound",
                            node.item_type().name(),
                            args.len()
                        )));
                    };
                    let lhs = self.evaluate(arena, *lhs, session, guard)?;
                    let rhs = self.evaluate(arena, *rhs, session, guard)?;
                    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
                        return Ok(None);
                    };
                    match node.item_type() {
                        ItemType::OpAdd => Ok(Some(lhs.saturating_add(rhs))),
                        ItemType::OpMinus => Ok(Some(lhs.saturating_sub(rhs))),
                        ItemType::OpMul => Ok(Some(lhs.saturating_mul(rhs))),
                        other => Err(PlanError::not_supported(format!(
                            "{} as a bound",
                            other.name()
                        ))),
                    }
                }
                _ => Err(PlanError::not_supported(format!(
                    "{:?} expression as a bound",
                    node.item_type()
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optx_plan::types::{DataType, ResultType};

    #[test]
    fn test_constants_and_params() {
        let mut arena = ExprArena::new();
        let ten = arena.add_const(ScalarValue::Int64(10)).unwrap();
        let null = arena.add_const(ScalarValue::Null).unwrap();
        let param = arena
            .add_exec_param(0, ResultType::new(DataType::BigInt))
            .unwrap();
        let session = SessionContext::with_params(vec![ScalarValue::Int64(5)]);
        let guard = RecursionGuard::default();
        let r = DefaultBoundResolver;

        assert_eq!(r.resolve(&arena, ten, &session, &guard).unwrap(), Some(10));
        assert_eq!(r.resolve(&arena, null, &session, &guard).unwrap(), None);
        assert_eq!(r.resolve(&arena, param, &session, &guard).unwrap(), Some(5));

        let missing = arena
            .add_exec_param(3, ResultType::new(DataType::BigInt))
            .unwrap();
        assert!(matches!(
            r.resolve(&arena, missing, &session, &guard),
            Err(PlanError::UnexpectedNull(_))
        ));
    }

    #[test]
    fn test_arithmetic_bounds() {
        let mut arena = ExprArena::new();
        let ten = arena.add_const(ScalarValue::Int64(10)).unwrap();
        let three = arena.add_const(ScalarValue::Int64(3)).unwrap();
        let null = arena.add_const(ScalarValue::Null).unwrap();
        // LIMIT 10 OFFSET 3 pulls 13 rows.
        let sum = arena.add_call(ItemType::OpAdd, &[ten, three]).unwrap();
        let neg = arena.add_call(ItemType::OpMinus, &[three, ten]).unwrap();
        let with_null = arena.add_call(ItemType::OpMul, &[ten, null]).unwrap();
        let session = SessionContext::default();
        let guard = RecursionGuard::default();
        let r = DefaultBoundResolver;

        assert_eq!(r.resolve(&arena, sum, &session, &guard).unwrap(), Some(13));
        assert_eq!(r.evaluate(&arena, neg, &session, &guard).unwrap(), Some(-7));
        assert_eq!(r.resolve(&arena, neg, &session, &guard).unwrap(), Some(0));
        assert_eq!(r.resolve(&arena, with_null, &session, &guard).unwrap(), None);

        let text = arena.add_const(ScalarValue::Utf8("x".into())).unwrap();
        assert!(r.resolve(&arena, text, &session, &guard).is_err());
    }
}
