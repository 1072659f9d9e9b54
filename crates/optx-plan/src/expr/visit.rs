//! Guarded expression-tree traversal.
//!
//! Visitors see each node once per walk, either before its children
//! (pre-order) or after them (post-order). Every level of the walk goes through
//! the caller's [`RecursionGuard`], so a pathologically deep tree fails with
//! `RecursionLimitExceeded` instead of exhausting the stack.

use super::{ExprArena, ExprId, ExprNode};
use crate::error::{PlanError, Result};
use crate::recursion::RecursionGuard;
use std::collections::HashSet;

/// Controls how a walk continues after a node was visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitRecursion {
    /// Visit the children, then the siblings.
    Continue,
    /// Do not descend below this node. Only meaningful in pre-order.
    Skip,
    /// End the whole walk.
    Stop,
}

pub trait ExprVisitor {
    fn visit(&mut self, id: ExprId, node: &ExprNode) -> Result<VisitRecursion>;
}

impl ExprArena {
    /// Visit `id` and its descendants, parents first.
    pub fn preorder_accept<V: ExprVisitor>(
        &self,
        id: ExprId,
        visitor: &mut V,
        guard: &RecursionGuard,
    ) -> Result<VisitRecursion> {
        guard.protect(|| {
            let node = self.node(id)?;
            match visitor.visit(id, node)? {
                VisitRecursion::Continue => {}
                VisitRecursion::Skip => return Ok(VisitRecursion::Continue),
                VisitRecursion::Stop => return Ok(VisitRecursion::Stop),
            }
            for child in node.children()? {
                if self.preorder_accept(child, visitor, guard)? == VisitRecursion::Stop {
                    return Ok(VisitRecursion::Stop);
                }
            }
            Ok(VisitRecursion::Continue)
        })
    }

    /// Visit the descendants of `id`, then `id` itself.
    pub fn postorder_accept<V: ExprVisitor>(
        &self,
        id: ExprId,
        visitor: &mut V,
        guard: &RecursionGuard,
    ) -> Result<VisitRecursion> {
        guard.protect(|| {
            let node = self.node(id)?;
            for child in node.children()? {
                if self.postorder_accept(child, visitor, guard)? == VisitRecursion::Stop {
                    return Ok(VisitRecursion::Stop);
                }
            }
            match visitor.visit(id, node)? {
                VisitRecursion::Stop => Ok(VisitRecursion::Stop),
                _ => Ok(VisitRecursion::Continue),
            }
        })
    }

    /// Visit only `id`, without descending.
    pub fn accept<V: ExprVisitor>(&self, id: ExprId, visitor: &mut V) -> Result<VisitRecursion> {
        let node = self.node(id)?;
        if node.expr_class() == super::ExprClass::Invalid {
            return Err(PlanError::not_supported(format!(
                "visiting unclassified expression {}",
                id
            )));
        }
        visitor.visit(id, node)
    }

    /// Distinct column, aggregate and window-function leaves reachable from
    /// `roots`, in first-seen order. The walk does not descend below a match.
    pub fn extract_col_aggr_winfunc_exprs(
        &self,
        roots: &[ExprId],
        guard: &RecursionGuard,
    ) -> Result<Vec<ExprId>> {
        let mut collector = LeafCollector::default();
        for &root in roots {
            self.preorder_accept(root, &mut collector, guard)?;
        }
        Ok(collector.found)
    }
}

#[derive(Default)]
struct LeafCollector {
    found: Vec<ExprId>,
    seen: HashSet<ExprId>,
}

impl ExprVisitor for LeafCollector {
    fn visit(&mut self, id: ExprId, node: &ExprNode) -> Result<VisitRecursion> {
        if node.is_column_ref() || node.is_aggregate() || node.is_window_func() {
            if self.seen.insert(id) {
                self.found.try_reserve(1)?;
                self.found.push(id);
            }
            return Ok(VisitRecursion::Skip);
        }
        Ok(VisitRecursion::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ColumnRef, ItemType};
    use crate::types::{DataType, ResultType, ScalarValue};

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

    struct Recorder(Vec<ExprId>);

    impl ExprVisitor for Recorder {
        fn visit(&mut self, id: ExprId, _node: &ExprNode) -> Result<VisitRecursion> {
            self.0.push(id);
            Ok(VisitRecursion::Continue)
        }
    }

    struct StopAt(ExprId, usize);

    impl ExprVisitor for StopAt {
        fn visit(&mut self, id: ExprId, _node: &ExprNode) -> Result<VisitRecursion> {
            self.1 += 1;
            if id == self.0 {
                Ok(VisitRecursion::Stop)
            } else {
                Ok(VisitRecursion::Continue)
            }
        }
    }

    #[test]
    fn test_pre_and_post_order() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a");
        let b = column(&mut arena, "b");
        let add = arena.add_call(ItemType::OpAdd, &[a, b]).unwrap();
        let guard = RecursionGuard::default();

        let mut pre = Recorder(Vec::new());
        arena.preorder_accept(add, &mut pre, &guard).unwrap();
        assert_eq!(pre.0, vec![add, a, b]);

        let mut post = Recorder(Vec::new());
        arena.postorder_accept(add, &mut post, &guard).unwrap();
        assert_eq!(post.0, vec![a, b, add]);

        let mut single = Recorder(Vec::new());
        arena.accept(add, &mut single).unwrap();
        assert_eq!(single.0, vec![add]);
    }

    #[test]
    fn test_stop_ends_walk() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a");
        let b = column(&mut arena, "b");
        let add = arena.add_call(ItemType::OpAdd, &[a, b]).unwrap();
        let mut visitor = StopAt(a, 0);
        let outcome = arena
            .preorder_accept(add, &mut visitor, &RecursionGuard::default())
            .unwrap();
        assert_eq!(outcome, VisitRecursion::Stop);
        assert_eq!(visitor.1, 2);
    }

    #[test]
    fn test_deep_tree_trips_guard() {
        let mut arena = ExprArena::new();
        let mut id = arena.add_const(ScalarValue::Int64(1)).unwrap();
        for _ in 0..20 {
            id = arena.add_call(ItemType::OpNeg, &[id]).unwrap();
        }
        let mut visitor = Recorder(Vec::new());
        let guard = RecursionGuard::new(10);
        assert_eq!(
            arena.preorder_accept(id, &mut visitor, &guard),
            Err(PlanError::RecursionLimitExceeded(10))
        );
        assert_eq!(guard.depth(), 0);
    }

    #[test]
    fn test_accept_invalid_not_supported() {
        let mut arena = ExprArena::new();
        let id = arena.create(ItemType::Invalid).unwrap();
        let mut visitor = Recorder(Vec::new());
        assert!(matches!(
            arena.accept(id, &mut visitor),
            Err(PlanError::NotSupported(_))
        ));
    }

    #[test]
    fn test_extract_leaves_deduplicates() {
        let mut arena = ExprArena::new();
        let a = column(&mut arena, "a");
        let b = column(&mut arena, "b");
        let sum = arena.add_call(ItemType::FunSum, &[b]).unwrap();
        let one = arena.add_const(ScalarValue::Int64(1)).unwrap();
        let plus = arena.add_call(ItemType::OpAdd, &[a, one]).unwrap();
        let mul = arena.add_call(ItemType::OpMul, &[a, sum]).unwrap();

        let leaves = arena
            .extract_col_aggr_winfunc_exprs(&[plus, mul, a], &RecursionGuard::default())
            .unwrap();
        // `b` sits under the aggregate and is not reported on its own.
        assert_eq!(leaves, vec![a, sum]);
    }
}
