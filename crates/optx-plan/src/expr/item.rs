use super::ExprClass;
use serde::{Deserialize, Serialize};

/// Fine-grained discriminator of an expression: which operator or function
/// a node computes. The coarse [`ExprClass`] is a pure function of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Invalid,

    // Terminals.
    Const,
    Question,
    RefColumn,
    RefQuery,
    RefAlias,
    Var,
    PseudoColumn,
    OpPseudoColumn,

    // Set operations.
    SetUnion,
    SetIntersect,
    SetExcept,

    // Operators.
    OpAdd,
    OpMinus,
    OpMul,
    OpDiv,
    OpNeg,
    OpEq,
    OpNe,
    OpLt,
    OpLe,
    OpGt,
    OpGe,
    OpAnd,
    OpOr,
    OpNot,
    OpIsNull,
    OpCase,

    // Aggregates.
    FunCount,
    FunSum,
    FunAvg,
    FunMin,
    FunMax,

    // Window functions.
    WinRowNumber,
    WinRank,
    WinDenseRank,

    // System functions.
    FunSysHash,
    FunSysEncodeSortKey,
    FunSysUpper,
    FunSysLower,
    FunSysSubstr,
    FunSysToDate,
    FunSysToTimestamp,
    FunSysToTimestampTz,
    FunSysCalcPartitionId,
    FunSysCalcTabletId,
    FunSysCalcPartitionTabletId,

    Udf,
}

impl ItemType {
    pub fn expr_class(self) -> ExprClass {
        use ItemType::*;
        match self {
            Invalid => ExprClass::Invalid,
            Const => ExprClass::Const,
            Question => ExprClass::ExecParam,
            RefColumn => ExprClass::ColumnRef,
            RefQuery => ExprClass::QueryRef,
            RefAlias => ExprClass::AliasRef,
            Var => ExprClass::Var,
            PseudoColumn => ExprClass::PseudoColumn,
            OpPseudoColumn => ExprClass::OpPseudoColumn,
            SetUnion | SetIntersect | SetExcept => ExprClass::SetOp,
            OpAdd | OpMinus | OpMul | OpDiv | OpNeg | OpEq | OpNe | OpLt | OpLe | OpGt | OpGe
            | OpAnd | OpOr | OpNot | OpIsNull => ExprClass::Operator,
            OpCase => ExprClass::CaseOperator,
            FunCount | FunSum | FunAvg | FunMin | FunMax => ExprClass::Aggregate,
            WinRowNumber | WinRank | WinDenseRank => ExprClass::Window,
            FunSysHash | FunSysEncodeSortKey | FunSysUpper | FunSysLower | FunSysSubstr
            | FunSysToDate | FunSysToTimestamp | FunSysToTimestampTz | FunSysCalcPartitionId
            | FunSysCalcTabletId | FunSysCalcPartitionTabletId => ExprClass::SysFunc,
            Udf => ExprClass::Udf,
        }
    }

    /// Display name of operators and functions.
    pub fn name(self) -> &'static str {
        use ItemType::*;
        match self {
            Invalid => "INVALID",
            Const => "CONST",
            Question => "?",
            RefColumn => "COLUMN",
            RefQuery => "SUBQUERY",
            RefAlias => "ALIAS",
            Var => "VAR",
            PseudoColumn => "PSEUDO_COLUMN",
            OpPseudoColumn => "OP_PSEUDO_COLUMN",
            SetUnion => "UNION",
            SetIntersect => "INTERSECT",
            SetExcept => "EXCEPT",
            OpAdd => "+",
            OpMinus => "-",
            OpMul => "*",
            OpDiv => "/",
            OpNeg => "-",
            OpEq => "=",
            OpNe => "!=",
            OpLt => "<",
            OpLe => "<=",
            OpGt => ">",
            OpGe => ">=",
            OpAnd => "AND",
            OpOr => "OR",
            OpNot => "NOT",
            OpIsNull => "IS NULL",
            OpCase => "CASE",
            FunCount => "COUNT",
            FunSum => "SUM",
            FunAvg => "AVG",
            FunMin => "MIN",
            FunMax => "MAX",
            WinRowNumber => "ROW_NUMBER",
            WinRank => "RANK",
            WinDenseRank => "DENSE_RANK",
            FunSysHash => "HASH",
            FunSysEncodeSortKey => "ENCODE_SORTKEY",
            FunSysUpper => "UPPER",
            FunSysLower => "LOWER",
            FunSysSubstr => "SUBSTR",
            FunSysToDate => "TO_DATE",
            FunSysToTimestamp => "TO_TIMESTAMP",
            FunSysToTimestampTz => "TO_TIMESTAMP_TZ",
            FunSysCalcPartitionId => "CALC_PARTITION_ID",
            FunSysCalcTabletId => "CALC_TABLET_ID",
            FunSysCalcPartitionTabletId => "CALC_PARTITION_TABLET_ID",
            Udf => "UDF",
        }
    }

    pub fn is_binary_operator(self) -> bool {
        use ItemType::*;
        matches!(
            self,
            OpAdd | OpMinus | OpMul | OpDiv | OpEq | OpNe | OpLt | OpLe | OpGt | OpGe | OpAnd | OpOr
        )
    }

    pub fn is_arithmetic(self) -> bool {
        use ItemType::*;
        matches!(self, OpAdd | OpMinus | OpMul | OpDiv | OpNeg)
    }

    pub fn is_predicate(self) -> bool {
        use ItemType::*;
        matches!(
            self,
            OpEq | OpNe | OpLt | OpLe | OpGt | OpGe | OpAnd | OpOr | OpNot | OpIsNull
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operator_is_classified_once() {
        let ops = [
            ItemType::OpAdd,
            ItemType::OpEq,
            ItemType::OpNot,
            ItemType::OpIsNull,
        ];
        for op in ops {
            assert_eq!(op.expr_class(), ExprClass::Operator);
            assert!(op.is_arithmetic() || op.is_predicate());
        }
        assert_eq!(ItemType::OpCase.expr_class(), ExprClass::CaseOperator);
        assert_eq!(ItemType::FunSysHash.expr_class(), ExprClass::SysFunc);
        assert_eq!(ItemType::Question.expr_class(), ExprClass::ExecParam);
    }
}
