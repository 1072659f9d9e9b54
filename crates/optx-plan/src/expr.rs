//! # Expression Arena
//!
//! Expressions are the computable scalar values referenced by plan operators:
//! sort keys, bound expressions, projected columns, synthetic hash and encode
//! keys. One statement owns one [`ExprArena`]; every node lives in it and is
//! addressed by a stable [`ExprId`] handle. Operators hold handles, never
//! references, and the arena is dropped as a whole at the end of planning.
//!
//! ## Closed Expression Kinds
//!
//! [`ExprKind`] is a closed sum type over the expression classes. Each variant
//! carries only its own payload, and the child list of a node is produced by a
//! single exhaustive match in [`ExprKind::children`]. Only the `Invalid` kind
//! (a node whose item type was never classified) reports traversal as not
//! supported.
//!
//! The classification predicates (`is_const`, `is_column_ref`, `is_terminal`,
//! ...) are pure functions of the node's [`ExprClass`] and [`ItemType`]. A node
//! is rejected at construction if its kind and item type disagree, and every
//! terminal class is childless by construction.
//!
//! ## Formalization
//!
//! A node's [`ResultType`] is mutable while the node is being built. Formalizing
//! (see `formalize.rs`) deduces the final type and flips the node to resolved;
//! from then on every result-type mutator fails with `UnexpectedState`.

mod formalize;
mod item;
mod render;
mod visit;

pub use item::ItemType;
pub use visit::{ExprVisitor, VisitRecursion};

use crate::error::{PlanError, Result};
use crate::types::{
    Accuracy, CollationLevel, CollationType, DataType, LengthSemantics, ResultType, ScalarValue,
    TypeClass,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a node in an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to a base-table column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table_id: u64,
    pub column_id: u64,
    pub table_name: String,
    pub column_name: String,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_name, self.column_name)
    }
}

/// Coarse expression class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprClass {
    Invalid,
    Const,
    QueryRef,
    ColumnRef,
    Operator,
    CaseOperator,
    Aggregate,
    SysFunc,
    Window,
    PseudoColumn,
    AliasRef,
    Udf,
    Var,
    OpPseudoColumn,
    SetOp,
    ExecParam,
}

impl ExprClass {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExprClass::Var
                | ExprClass::OpPseudoColumn
                | ExprClass::Const
                | ExprClass::ExecParam
                | ExprClass::QueryRef
                | ExprClass::ColumnRef
                | ExprClass::AliasRef
        )
    }
}

/// Per-class payload of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprKind {
    Invalid,
    Const(ScalarValue),
    /// Positional parameter bound at execution.
    ExecParam {
        index: usize,
    },
    QueryRef {
        subquery_id: u64,
    },
    ColumnRef(ColumnRef),
    Operator {
        args: Vec<ExprId>,
    },
    /// `CASE WHEN w1 THEN t1 ... ELSE e END`, stored as `[w1, t1, ..., e]`.
    CaseOperator {
        args: Vec<ExprId>,
    },
    Aggregate {
        args: Vec<ExprId>,
        distinct: bool,
    },
    SysFunc {
        args: Vec<ExprId>,
    },
    Window {
        args: Vec<ExprId>,
        partition_by: Vec<ExprId>,
        order_by: Vec<ExprId>,
    },
    PseudoColumn {
        name: String,
    },
    /// Reference to a select-item by alias. The target is not a child.
    AliasRef {
        name: String,
        target: ExprId,
    },
    Udf {
        name: String,
        args: Vec<ExprId>,
    },
    Var {
        name: String,
    },
    OpPseudoColumn {
        name: String,
    },
    SetOp {
        index: usize,
    },
}

impl ExprKind {
    pub fn class(&self) -> ExprClass {
        match self {
            ExprKind::Invalid => ExprClass::Invalid,
            ExprKind::Const(_) => ExprClass::Const,
            ExprKind::ExecParam { .. } => ExprClass::ExecParam,
            ExprKind::QueryRef { .. } => ExprClass::QueryRef,
            ExprKind::ColumnRef(_) => ExprClass::ColumnRef,
            ExprKind::Operator { .. } => ExprClass::Operator,
            ExprKind::CaseOperator { .. } => ExprClass::CaseOperator,
            ExprKind::Aggregate { .. } => ExprClass::Aggregate,
            ExprKind::SysFunc { .. } => ExprClass::SysFunc,
            ExprKind::Window { .. } => ExprClass::Window,
            ExprKind::PseudoColumn { .. } => ExprClass::PseudoColumn,
            ExprKind::AliasRef { .. } => ExprClass::AliasRef,
            ExprKind::Udf { .. } => ExprClass::Udf,
            ExprKind::Var { .. } => ExprClass::Var,
            ExprKind::OpPseudoColumn { .. } => ExprClass::OpPseudoColumn,
            ExprKind::SetOp { .. } => ExprClass::SetOp,
        }
    }

    /// Empty payload for a freshly created node of the given item type.
    pub fn empty_for(item_type: ItemType) -> Self {
        match item_type.expr_class() {
            ExprClass::Invalid => ExprKind::Invalid,
            ExprClass::Const => ExprKind::Const(ScalarValue::Null),
            ExprClass::ExecParam => ExprKind::ExecParam { index: 0 },
            ExprClass::QueryRef => ExprKind::QueryRef { subquery_id: 0 },
            ExprClass::ColumnRef => ExprKind::ColumnRef(ColumnRef {
                table_id: 0,
                column_id: 0,
                table_name: String::new(),
                column_name: String::new(),
            }),
            ExprClass::Operator => ExprKind::Operator { args: Vec::new() },
            ExprClass::CaseOperator => ExprKind::CaseOperator { args: Vec::new() },
            ExprClass::Aggregate => ExprKind::Aggregate {
                args: Vec::new(),
                distinct: false,
            },
            ExprClass::SysFunc => ExprKind::SysFunc { args: Vec::new() },
            ExprClass::Window => ExprKind::Window {
                args: Vec::new(),
                partition_by: Vec::new(),
                order_by: Vec::new(),
            },
            ExprClass::PseudoColumn => ExprKind::PseudoColumn {
                name: String::new(),
            },
            ExprClass::AliasRef => ExprKind::AliasRef {
                name: String::new(),
                target: ExprId(0),
            },
            ExprClass::Udf => ExprKind::Udf {
                name: String::new(),
                args: Vec::new(),
            },
            ExprClass::Var => ExprKind::Var {
                name: String::new(),
            },
            ExprClass::OpPseudoColumn => ExprKind::OpPseudoColumn {
                name: String::new(),
            },
            ExprClass::SetOp => ExprKind::SetOp { index: 0 },
        }
    }

    /// Child handles in evaluation order.
    pub fn children(&self) -> Result<Vec<ExprId>> {
        let children = match self {
            ExprKind::Invalid => {
                return Err(PlanError::not_supported(
                    "children of an unclassified expression",
                ))
            }
            ExprKind::Const(_)
            | ExprKind::ExecParam { .. }
            | ExprKind::QueryRef { .. }
            | ExprKind::ColumnRef(_)
            | ExprKind::PseudoColumn { .. }
            | ExprKind::AliasRef { .. }
            | ExprKind::Var { .. }
            | ExprKind::OpPseudoColumn { .. }
            | ExprKind::SetOp { .. } => Vec::new(),
            ExprKind::Operator { args }
            | ExprKind::CaseOperator { args }
            | ExprKind::Aggregate { args, .. }
            | ExprKind::SysFunc { args }
            | ExprKind::Udf { args, .. } => args.clone(),
            ExprKind::Window {
                args,
                partition_by,
                order_by,
            } => args
                .iter()
                .chain(partition_by)
                .chain(order_by)
                .copied()
                .collect(),
        };
        Ok(children)
    }

    pub fn child_count(&self) -> usize {
        match self {
            ExprKind::Operator { args }
            | ExprKind::CaseOperator { args }
            | ExprKind::Aggregate { args, .. }
            | ExprKind::SysFunc { args }
            | ExprKind::Udf { args, .. } => args.len(),
            ExprKind::Window {
                args,
                partition_by,
                order_by,
            } => args.len() + partition_by.len() + order_by.len(),
            _ => 0,
        }
    }

    fn args_mut(&mut self) -> Option<&mut Vec<ExprId>> {
        match self {
            ExprKind::Operator { args }
            | ExprKind::CaseOperator { args }
            | ExprKind::Aggregate { args, .. }
            | ExprKind::SysFunc { args }
            | ExprKind::Udf { args, .. }
            | ExprKind::Window { args, .. } => Some(args),
            _ => None,
        }
    }
}

/// Whether a node's result type has been deduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeState {
    Unresolved,
    Resolved,
}

/// One expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprNode {
    item_type: ItemType,
    kind: ExprKind,
    result_type: ResultType,
    state: TypeState,
}

impl ExprNode {
    /// Build an unresolved node. The kind must belong to the item type's class.
    pub fn new(item_type: ItemType, kind: ExprKind) -> Result<Self> {
        if item_type.expr_class() != kind.class() {
            return Err(PlanError::unexpected_state(format!(
                "item type {:?} does not belong to class {:?}",
                item_type,
                kind.class()
            )));
        }
        Ok(Self {
            item_type,
            kind,
            result_type: ResultType::default(),
            state: TypeState::Unresolved,
        })
    }

    /// Build a node whose type is already known (resolver output).
    pub fn resolved(item_type: ItemType, kind: ExprKind, result_type: ResultType) -> Result<Self> {
        let mut node = Self::new(item_type, kind)?;
        node.result_type = result_type;
        node.state = TypeState::Resolved;
        Ok(node)
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn expr_class(&self) -> ExprClass {
        self.kind.class()
    }

    pub fn type_state(&self) -> TypeState {
        self.state
    }

    pub fn is_formalized(&self) -> bool {
        self.state == TypeState::Resolved
    }

    pub fn child_count(&self) -> usize {
        self.kind.child_count()
    }

    pub fn children(&self) -> Result<Vec<ExprId>> {
        self.kind.children()
    }

    // Classification.

    pub fn is_const(&self) -> bool {
        self.expr_class() == ExprClass::Const
    }
    pub fn is_exec_param(&self) -> bool {
        self.expr_class() == ExprClass::ExecParam
    }
    pub fn is_const_or_param(&self) -> bool {
        self.is_const() || self.is_exec_param()
    }
    pub fn is_var(&self) -> bool {
        self.expr_class() == ExprClass::Var
    }
    pub fn is_op_pseudo_column(&self) -> bool {
        self.expr_class() == ExprClass::OpPseudoColumn
    }
    pub fn is_query_ref(&self) -> bool {
        self.expr_class() == ExprClass::QueryRef
    }
    pub fn is_column_ref(&self) -> bool {
        self.expr_class() == ExprClass::ColumnRef
    }
    pub fn is_op(&self) -> bool {
        self.expr_class() == ExprClass::Operator
    }
    pub fn is_set_op(&self) -> bool {
        self.expr_class() == ExprClass::SetOp
    }
    pub fn is_case_op(&self) -> bool {
        self.expr_class() == ExprClass::CaseOperator
    }
    pub fn is_aggregate(&self) -> bool {
        self.expr_class() == ExprClass::Aggregate
    }
    pub fn is_sys_func(&self) -> bool {
        self.expr_class() == ExprClass::SysFunc
    }
    pub fn is_udf(&self) -> bool {
        self.expr_class() == ExprClass::Udf
    }
    pub fn is_window_func(&self) -> bool {
        self.expr_class() == ExprClass::Window
    }
    pub fn is_pseudo_column(&self) -> bool {
        self.expr_class() == ExprClass::PseudoColumn
    }
    pub fn is_alias_ref(&self) -> bool {
        self.expr_class() == ExprClass::AliasRef
    }

    /// Union of variable, operator pseudo-column, constant or parameter,
    /// subquery reference, column reference and alias reference.
    pub fn is_terminal(&self) -> bool {
        self.expr_class().is_terminal()
    }

    pub fn is_to_time_function(&self) -> bool {
        matches!(
            self.item_type,
            ItemType::FunSysToDate | ItemType::FunSysToTimestamp | ItemType::FunSysToTimestampTz
        )
    }

    pub fn is_calc_partition_function(&self) -> bool {
        matches!(
            self.item_type,
            ItemType::FunSysCalcPartitionId
                | ItemType::FunSysCalcTabletId
                | ItemType::FunSysCalcPartitionTabletId
        )
    }

    // Result-type accessors.

    pub fn result_type(&self) -> &ResultType {
        &self.result_type
    }
    pub fn data_type(&self) -> DataType {
        self.result_type.data_type
    }
    pub fn type_class(&self) -> TypeClass {
        self.result_type.type_class()
    }
    pub fn collation_level(&self) -> CollationLevel {
        self.result_type.collation_level
    }
    pub fn collation_type(&self) -> CollationType {
        self.result_type.collation_type
    }
    pub fn accuracy(&self) -> &Accuracy {
        &self.result_type.accuracy
    }
    pub fn udt_id(&self) -> u64 {
        self.result_type.udt_id
    }
    pub fn param(&self) -> Option<&ScalarValue> {
        self.result_type.param.as_ref()
    }

    /// Result flags, with binary collations implying the binary flag.
    pub fn result_flag(&self) -> u32 {
        self.result_type.result_flag()
    }

    pub fn length_in_bytes(&self) -> i64 {
        self.result_type.length_in_bytes()
    }

    // Result-type mutators. All of them fail once the node is formalized.

    fn result_type_mut(&mut self) -> Result<&mut ResultType> {
        if self.is_formalized() {
            return Err(PlanError::unexpected_state(format!(
                "result type of formalized {:?} expression is fixed",
                self.item_type
            )));
        }
        Ok(&mut self.result_type)
    }

    pub fn set_result_type(&mut self, result_type: ResultType) -> Result<()> {
        *self.result_type_mut()? = result_type;
        Ok(())
    }
    pub fn set_data_type(&mut self, data_type: DataType) -> Result<()> {
        self.result_type_mut()?.data_type = data_type;
        Ok(())
    }
    pub fn set_collation_level(&mut self, level: CollationLevel) -> Result<()> {
        self.result_type_mut()?.collation_level = level;
        Ok(())
    }
    pub fn set_collation_type(&mut self, collation: CollationType) -> Result<()> {
        self.result_type_mut()?.collation_type = collation;
        Ok(())
    }
    pub fn set_accuracy(&mut self, accuracy: Accuracy) -> Result<()> {
        self.result_type_mut()?.accuracy = accuracy;
        Ok(())
    }
    pub fn set_result_flag(&mut self, flags: u32) -> Result<()> {
        self.result_type_mut()?.flags = flags;
        Ok(())
    }
    pub fn set_precision(&mut self, precision: i16) -> Result<()> {
        self.result_type_mut()?.accuracy.precision = precision;
        Ok(())
    }
    pub fn set_scale(&mut self, scale: i16) -> Result<()> {
        self.result_type_mut()?.accuracy.scale = scale;
        Ok(())
    }
    pub fn set_length(&mut self, length: i64) -> Result<()> {
        self.result_type_mut()?.accuracy.length = length;
        Ok(())
    }
    pub fn set_length_semantics(&mut self, semantics: LengthSemantics) -> Result<()> {
        self.result_type_mut()?.accuracy.length_semantics = semantics;
        Ok(())
    }
    pub fn set_udt_id(&mut self, udt_id: u64) -> Result<()> {
        self.result_type_mut()?.udt_id = udt_id;
        Ok(())
    }
    pub fn set_param(&mut self, value: ScalarValue) -> Result<()> {
        self.result_type_mut()?.param = Some(value);
        Ok(())
    }

    fn mark_resolved(&mut self, result_type: ResultType) {
        self.result_type = result_type;
        self.state = TypeState::Resolved;
    }
}

/// Statement-scoped owner of every expression node.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Move a node into the arena and return its handle.
    pub fn add(&mut self, node: ExprNode) -> Result<ExprId> {
        let id = u32::try_from(self.nodes.len())
            .map(ExprId)
            .map_err(|_| PlanError::AllocationFailure("expression arena is full".into()))?;
        self.nodes.try_reserve(1)?;
        self.nodes.push(node);
        Ok(id)
    }

    /// Expression factory: an unresolved node of `item_type` with no payload.
    pub fn create(&mut self, item_type: ItemType) -> Result<ExprId> {
        self.add(ExprNode::new(item_type, ExprKind::empty_for(item_type))?)
    }

    /// A resolved constant typed after its value.
    pub fn add_const(&mut self, value: ScalarValue) -> Result<ExprId> {
        let mut result_type = ResultType::new(value.data_type());
        if value.data_type().is_string() {
            result_type.collation_level = CollationLevel::Coercible;
            result_type.collation_type = CollationType::Utf8mb4GeneralCi;
        }
        result_type.param = Some(value.clone());
        self.add(ExprNode::resolved(
            ItemType::Const,
            ExprKind::Const(value),
            result_type,
        )?)
    }

    /// A resolved column reference.
    pub fn add_column(&mut self, column: ColumnRef, result_type: ResultType) -> Result<ExprId> {
        self.add(ExprNode::resolved(
            ItemType::RefColumn,
            ExprKind::ColumnRef(column),
            result_type,
        )?)
    }

    /// A resolved execution parameter at position `index`.
    pub fn add_exec_param(&mut self, index: usize, result_type: ResultType) -> Result<ExprId> {
        self.add(ExprNode::resolved(
            ItemType::Question,
            ExprKind::ExecParam { index },
            result_type,
        )?)
    }

    /// An unresolved operator, function or aggregate over `args`.
    pub fn add_call(&mut self, item_type: ItemType, args: &[ExprId]) -> Result<ExprId> {
        let id = self.create(item_type)?;
        for &arg in args {
            self.add_param_expr(id, arg)?;
        }
        Ok(id)
    }

    pub fn node(&self, id: ExprId) -> Result<&ExprNode> {
        self.nodes
            .get(id.0 as usize)
            .ok_or_else(|| PlanError::unexpected_null(format!("expression {}", id)))
    }

    pub fn node_mut(&mut self, id: ExprId) -> Result<&mut ExprNode> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or_else(|| PlanError::unexpected_null(format!("expression {}", id)))
    }

    pub fn child_count(&self, id: ExprId) -> Result<usize> {
        Ok(self.node(id)?.child_count())
    }

    pub fn children(&self, id: ExprId) -> Result<Vec<ExprId>> {
        self.node(id)?.children()
    }

    /// Append an argument to a call-like node that is still being built.
    pub fn add_param_expr(&mut self, parent: ExprId, arg: ExprId) -> Result<()> {
        self.node(arg)?;
        let node = self.node_mut(parent)?;
        if node.is_formalized() {
            return Err(PlanError::unexpected_state(format!(
                "cannot add arguments to formalized expression {}",
                parent
            )));
        }
        let item_type = node.item_type;
        let args = node.kind.args_mut().ok_or_else(|| {
            PlanError::not_supported(format!("{:?} expressions take no arguments", item_type))
        })?;
        args.try_reserve(1)?;
        args.push(arg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BINARY_FLAG;

    fn column(arena: &mut ExprArena, name: &str) -> ExprId {
        arena
            .add_column(
                ColumnRef {
                    table_id: 1,
                    column_id: 1,
                    table_name: "t".into(),
                    column_name: name.into(),
                },
                ResultType::new(DataType::BigInt),
            )
            .unwrap()
    }

    #[test]
    fn test_kind_must_match_item_type() {
        let err = ExprNode::new(ItemType::OpAdd, ExprKind::Var { name: "x".into() });
        assert!(matches!(err, Err(PlanError::UnexpectedState(_))));
    }

    #[test]
    fn test_terminals_are_childless() {
        let mut arena = ExprArena::new();
        let c = column(&mut arena, "a");
        let k = arena.add_const(ScalarValue::Int64(1)).unwrap();
        for id in [c, k] {
            let node = arena.node(id).unwrap();
            assert!(node.is_terminal());
            assert_eq!(node.child_count(), 0);
            assert!(node.children().unwrap().is_empty());
        }
        assert!(arena.node(k).unwrap().is_const_or_param());
    }

    #[test]
    fn test_invalid_expression_traversal_not_supported() {
        let mut arena = ExprArena::new();
        let id = arena.create(ItemType::Invalid).unwrap();
        assert_eq!(arena.child_count(id).unwrap(), 0);
        assert!(matches!(
            arena.children(id),
            Err(PlanError::NotSupported(_))
        ));
    }

    #[test]
    fn test_add_param_expr() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a");
        let b = column(&mut arena, "b");
        let hash = arena.add_call(ItemType::FunSysHash, &[a, b]).unwrap();
        assert_eq!(arena.children(hash).unwrap(), vec![a, b]);

        // Columns take no arguments.
        assert!(matches!(
            arena.add_param_expr(a, b),
            Err(PlanError::NotSupported(_))
        ));
        // Unknown handles are reported, not indexed.
        assert!(matches!(
            arena.add_param_expr(hash, ExprId(99)),
            Err(PlanError::UnexpectedNull(_))
        ));
    }

    #[test]
    fn test_result_type_fixed_after_resolution() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a");
        let node = arena.node_mut(a).unwrap();
        assert!(matches!(
            node.set_scale(2),
            Err(PlanError::UnexpectedState(_))
        ));

        let id = arena.create(ItemType::FunSysUpper).unwrap();
        let node = arena.node_mut(id).unwrap();
        node.set_collation_type(CollationType::Binary).unwrap();
        assert_ne!(node.result_flag() & BINARY_FLAG, 0);
    }

    #[test]
    fn test_classification_predicates() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a");
        let to_date = arena.add_call(ItemType::FunSysToDate, &[a]).unwrap();
        let calc = arena.create(ItemType::FunSysCalcTabletId).unwrap();
        let count = arena.add_call(ItemType::FunCount, &[a]).unwrap();

        let node = arena.node(to_date).unwrap();
        assert!(node.is_sys_func() && node.is_to_time_function());
        assert!(!node.is_terminal());
        assert!(arena.node(calc).unwrap().is_calc_partition_function());
        assert!(arena.node(count).unwrap().is_aggregate());
        assert!(arena.node(a).unwrap().is_column_ref());
    }
}
