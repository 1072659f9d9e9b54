//! Result-type deduction.
//!
//! `formalize` resolves a freshly built expression tree bottom-up. Children
//! that are already resolved (columns, constants, previously formalized
//! subtrees) are taken as they are; every unresolved node gets its type deduced
//! from its item type and its children, then becomes immutable.

use super::{ExprArena, ExprClass, ExprId, ExprKind, ItemType};
use crate::config::SessionContext;
use crate::error::{PlanError, Result};
use crate::recursion::RecursionGuard;
use crate::types::{
    CollationLevel, CollationType, DataType, ResultType, TypeClass, NOT_NULL_FLAG, UNSIGNED_FLAG,
};
use tracing::trace;

impl ExprArena {
    /// Deduce and freeze the result type of `id` and its unresolved subtree.
    ///
    /// Formalizing an already resolved root is an `UnexpectedState` error.
    pub fn formalize(
        &mut self,
        id: ExprId,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<()> {
        if self.node(id)?.is_formalized() {
            return Err(PlanError::unexpected_state(format!(
                "expression {} is already formalized",
                id
            )));
        }
        self.formalize_tree(id, session, guard)
    }

    fn formalize_tree(
        &mut self,
        id: ExprId,
        session: &SessionContext,
        guard: &RecursionGuard,
    ) -> Result<()> {
        guard.protect(|| {
            for child in self.children(id)? {
                if !self.node(child)?.is_formalized() {
                    self.formalize_tree(child, session, guard)?;
                }
            }
            let result_type = self.deduce(id, session)?;
            trace!("Formalized {} as {:?}", id, result_type.data_type);
            self.node_mut(id)?.mark_resolved(result_type);
            Ok(())
        })
    }

    fn arg_types(&self, id: ExprId) -> Result<Vec<ResultType>> {
        self.children(id)?
            .into_iter()
            .map(|child| self.node(child).map(|n| n.result_type().clone()))
            .collect()
    }

    fn deduce(&self, id: ExprId, session: &SessionContext) -> Result<ResultType> {
        let node = self.node(id)?;
        let item_type = node.item_type();
        let args = self.arg_types(id)?;

        match node.expr_class() {
            ExprClass::Invalid => Err(PlanError::not_supported(
                "formalizing an unclassified expression",
            )),
            ExprClass::AliasRef => match node.kind() {
                ExprKind::AliasRef { target, .. } => {
                    let target = self.node(*target)?;
                    if !target.is_formalized() {
                        return Err(PlanError::TypeResolution(format!(
                            "alias {} refers to an unresolved expression",
                            id
                        )));
                    }
                    Ok(target.result_type().clone())
                }
                _ => Err(PlanError::unexpected_state("alias kind mismatch")),
            },
            ExprClass::Operator if item_type.is_predicate() => {
                let mut rt = ResultType::new(DataType::TinyInt);
                rt.collation_level = CollationLevel::Numeric;
                Ok(rt)
            }
            ExprClass::Operator => arithmetic_type(item_type, &args),
            ExprClass::CaseOperator => {
                // [w1, t1, ..., else]: the first THEN branch, or the lone ELSE.
                let branch = args.get(1).or_else(|| args.first()).ok_or_else(|| {
                    PlanError::TypeResolution("CASE without branches".into())
                })?;
                let mut rt = branch.clone();
                rt.flags &= !NOT_NULL_FLAG;
                Ok(rt)
            }
            ExprClass::Aggregate => aggregate_type(item_type, &args),
            ExprClass::Window => {
                let mut rt = ResultType::new(DataType::BigInt);
                rt.flags = NOT_NULL_FLAG;
                Ok(rt)
            }
            ExprClass::SysFunc => sys_func_type(item_type, &args, session),
            // Leaves and opaque calls must carry a type from their producer.
            _ => {
                if node.data_type() == DataType::Max {
                    return Err(PlanError::TypeResolution(format!(
                        "no result type for {:?} expression {}",
                        item_type, id
                    )));
                }
                Ok(node.result_type().clone())
            }
        }
    }
}

fn require_args(item_type: ItemType, args: &[ResultType], min: usize) -> Result<()> {
    if args.len() < min {
        return Err(PlanError::TypeResolution(format!(
            "{} expects at least {} argument(s), got {}",
            item_type.name(),
            min,
            args.len()
        )));
    }
    Ok(())
}

fn arithmetic_type(item_type: ItemType, args: &[ResultType]) -> Result<ResultType> {
    require_args(item_type, args, 1)?;
    let mut widest = TypeClass::Int;
    for arg in args {
        let class = arg.type_class();
        if class == TypeClass::Null {
            continue;
        }
        if !arg.data_type.is_numeric() {
            return Err(PlanError::TypeResolution(format!(
                "{} over non-numeric {:?}",
                item_type.name(),
                arg.data_type
            )));
        }
        widest = wider(widest, class);
    }
    let data_type = match widest {
        TypeClass::Float => DataType::Double,
        TypeClass::Decimal => DataType::Decimal,
        _ if item_type == ItemType::OpDiv => DataType::Decimal,
        TypeClass::UInt if item_type != ItemType::OpNeg => DataType::UnsignedBigInt,
        _ => DataType::BigInt,
    };
    let mut rt = ResultType::new(data_type);
    rt.collation_level = CollationLevel::Numeric;
    if data_type == DataType::UnsignedBigInt {
        rt.flags |= UNSIGNED_FLAG;
    }
    Ok(rt)
}

fn wider(a: TypeClass, b: TypeClass) -> TypeClass {
    fn rank(c: TypeClass) -> u8 {
        match c {
            TypeClass::Int => 0,
            TypeClass::UInt => 1,
            TypeClass::Decimal => 2,
            _ => 3,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

fn aggregate_type(item_type: ItemType, args: &[ResultType]) -> Result<ResultType> {
    match item_type {
        ItemType::FunCount => {
            let mut rt = ResultType::new(DataType::BigInt);
            rt.flags = NOT_NULL_FLAG;
            Ok(rt)
        }
        ItemType::FunMin | ItemType::FunMax => {
            require_args(item_type, args, 1)?;
            let mut rt = args[0].clone();
            rt.flags &= !NOT_NULL_FLAG;
            Ok(rt)
        }
        ItemType::FunSum | ItemType::FunAvg => {
            require_args(item_type, args, 1)?;
            let data_type = match args[0].type_class() {
                TypeClass::Float => DataType::Double,
                TypeClass::Int | TypeClass::UInt | TypeClass::Decimal | TypeClass::Null => {
                    DataType::Decimal
                }
                _ => {
                    return Err(PlanError::TypeResolution(format!(
                        "{} over non-numeric {:?}",
                        item_type.name(),
                        args[0].data_type
                    )))
                }
            };
            Ok(ResultType::new(data_type))
        }
        _ => Err(PlanError::unexpected_state(format!(
            "{:?} is not an aggregate",
            item_type
        ))),
    }
}

fn sys_func_type(
    item_type: ItemType,
    args: &[ResultType],
    session: &SessionContext,
) -> Result<ResultType> {
    match item_type {
        ItemType::FunSysHash => {
            require_args(item_type, args, 1)?;
            let mut rt = ResultType::new(DataType::UnsignedBigInt);
            rt.flags = NOT_NULL_FLAG | UNSIGNED_FLAG;
            rt.collation_level = CollationLevel::Numeric;
            Ok(rt)
        }
        ItemType::FunSysEncodeSortKey => {
            require_args(item_type, args, 1)?;
            // Arguments alternate key and direction code. One null marker per
            // key plus the key's own bytes.
            let length = args
                .iter()
                .step_by(2)
                .map(|arg| {
                    let bytes = arg.length_in_bytes();
                    if bytes >= 0 {
                        bytes.saturating_add(1)
                    } else {
                        arg.data_type.fixed_width().unwrap_or(8.0) as i64 + 1
                    }
                })
                .fold(0i64, i64::saturating_add);
            let mut rt = ResultType::string(DataType::Varbinary, length, CollationType::Binary);
            rt.accuracy.length_semantics = crate::types::LengthSemantics::Byte;
            rt.flags = NOT_NULL_FLAG;
            Ok(rt)
        }
        ItemType::FunSysUpper | ItemType::FunSysLower | ItemType::FunSysSubstr => {
            require_args(item_type, args, 1)?;
            let length = args[0].accuracy.length;
            let mut rt = ResultType::string(DataType::Varchar, length, session.collation);
            rt.collation_level = CollationLevel::Implicit;
            Ok(rt)
        }
        ItemType::FunSysToDate => Ok(ResultType::new(DataType::Date)),
        ItemType::FunSysToTimestamp | ItemType::FunSysToTimestampTz => {
            Ok(ResultType::new(DataType::Timestamp))
        }
        ItemType::FunSysCalcPartitionId
        | ItemType::FunSysCalcTabletId
        | ItemType::FunSysCalcPartitionTabletId => {
            let mut rt = ResultType::new(DataType::BigInt);
            rt.flags = NOT_NULL_FLAG;
            Ok(rt)
        }
        _ => Err(PlanError::unexpected_state(format!(
            "{:?} is not a system function",
            item_type
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnRef;
    use crate::types::{ScalarValue, BINARY_FLAG};

    fn column(arena: &mut ExprArena, name: &str, rt: ResultType) -> ExprId {
        arena
            .add_column(
                ColumnRef {
                    table_id: 1,
                    column_id: 0,
                    table_name: "t".into(),
                    column_name: name.into(),
                },
                rt,
            )
            .unwrap()
    }

    #[test]
    fn test_hash_over_columns() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a", ResultType::new(DataType::BigInt));
        let s = column(
            &mut arena,
            "s",
            ResultType::string(DataType::Varchar, 8, CollationType::Utf8mb4GeneralCi),
        );
        let hash = arena.add_call(ItemType::FunSysHash, &[a, s]).unwrap();
        arena
            .formalize(hash, &SessionContext::default(), &RecursionGuard::default())
            .unwrap();
        let node = arena.node(hash).unwrap();
        assert!(node.is_formalized());
        assert_eq!(node.data_type(), DataType::UnsignedBigInt);
        assert_ne!(node.result_flag() & NOT_NULL_FLAG, 0);
    }

    #[test]
    fn test_formalize_twice_fails() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a", ResultType::new(DataType::Int));
        let neg = arena.add_call(ItemType::OpNeg, &[a]).unwrap();
        let session = SessionContext::default();
        let guard = RecursionGuard::default();
        arena.formalize(neg, &session, &guard).unwrap();
        assert!(matches!(
            arena.formalize(neg, &session, &guard),
            Err(PlanError::UnexpectedState(_))
        ));
        assert!(matches!(
            arena.node_mut(neg).unwrap().set_data_type(DataType::Double),
            Err(PlanError::UnexpectedState(_))
        ));
    }

    #[test]
    fn test_nested_subtree_is_resolved() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a", ResultType::new(DataType::Int));
        let half = arena.add_const(ScalarValue::Float64(0.5.into())).unwrap();
        let mul = arena.add_call(ItemType::OpMul, &[a, half]).unwrap();
        let gt = arena.add_call(ItemType::OpGt, &[mul, a]).unwrap();
        arena
            .formalize(gt, &SessionContext::default(), &RecursionGuard::default())
            .unwrap();
        assert_eq!(arena.node(mul).unwrap().data_type(), DataType::Double);
        assert_eq!(arena.node(gt).unwrap().data_type(), DataType::TinyInt);
    }

    #[test]
    fn test_arithmetic_rejects_strings() {
        let mut arena = ExprArena::new();
        let s = arena.add_const(ScalarValue::Utf8("x".into())).unwrap();
        let one = arena.add_const(ScalarValue::Int64(1)).unwrap();
        let add = arena.add_call(ItemType::OpAdd, &[s, one]).unwrap();
        assert!(matches!(
            arena.formalize(add, &SessionContext::default(), &RecursionGuard::default()),
            Err(PlanError::TypeResolution(_))
        ));
    }

    #[test]
    fn test_encode_sortkey_is_binary() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a", ResultType::new(DataType::BigInt));
        let enc = arena
            .add_call(ItemType::FunSysEncodeSortKey, &[a])
            .unwrap();
        arena
            .formalize(enc, &SessionContext::default(), &RecursionGuard::default())
            .unwrap();
        let node = arena.node(enc).unwrap();
        assert_eq!(node.data_type(), DataType::Varbinary);
        assert_ne!(node.result_flag() & BINARY_FLAG, 0);
        assert_eq!(node.length_in_bytes(), 9);
    }

    #[test]
    fn test_encode_sortkey_length_skips_direction_codes() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a", ResultType::new(DataType::BigInt));
        let s = column(
            &mut arena,
            "s",
            ResultType::string(DataType::Varchar, 8, CollationType::Utf8mb4GeneralCi),
        );
        let asc = arena.add_const(ScalarValue::Int64(0)).unwrap();
        let desc = arena.add_const(ScalarValue::Int64(2)).unwrap();
        let enc = arena
            .add_call(ItemType::FunSysEncodeSortKey, &[a, asc, s, desc])
            .unwrap();
        arena
            .formalize(enc, &SessionContext::default(), &RecursionGuard::default())
            .unwrap();
        // BIGINT: 8 + 1, VARCHAR(8) utf8mb4: 32 + 1.
        assert_eq!(arena.node(enc).unwrap().length_in_bytes(), 42);
    }

    #[test]
    fn test_string_function_uses_session_collation() {
        let mut arena = ExprArena::new();
        let s = column(
            &mut arena,
            "s",
            ResultType::string(DataType::Varchar, 16, CollationType::Utf8mb4GeneralCi),
        );
        let upper = arena.add_call(ItemType::FunSysUpper, &[s]).unwrap();
        let session = SessionContext {
            collation: CollationType::Utf8mb4Bin,
            ..SessionContext::default()
        };
        arena
            .formalize(upper, &session, &RecursionGuard::default())
            .unwrap();
        let node = arena.node(upper).unwrap();
        assert_eq!(node.collation_type(), CollationType::Utf8mb4Bin);
        assert_eq!(node.length_in_bytes(), 64);
    }

    #[test]
    fn test_untyped_leaf_fails() {
        let mut arena = ExprArena::new();
        let var = arena.create(ItemType::Var).unwrap();
        assert!(matches!(
            arena.formalize(var, &SessionContext::default(), &RecursionGuard::default()),
            Err(PlanError::TypeResolution(_))
        ));
    }
}
