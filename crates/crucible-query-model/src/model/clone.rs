//! Deep cloning of query models.
//!
//! Clauses clone head to tail. Each query-source clone is registered in the
//! [`QuerySourceMapping`] before its expressions are adjusted, so later
//! clauses (and a join's own inner key) see the redirected back-reference.
//! References to sources outside the cloned model are left as they are.

use crate::expr::visitor::{rewrite, ExprVisitor};
use crate::expr::{Expr, ExprRef, QuerySourceRef, SubQueryExpr};
use crate::model::{ModelId, QuerySource, SourceId};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

/// Original query source id to the back-reference of its clone
#[derive(Debug, Clone, Default)]
pub struct QuerySourceMapping {
    map: HashMap<SourceId, QuerySourceRef>,
}

impl QuerySourceMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: SourceId, replacement: QuerySourceRef) {
        self.map.insert(original, replacement);
    }

    pub fn get(&self, original: SourceId) -> Option<&QuerySourceRef> {
        self.map.get(&original)
    }

    pub fn contains(&self, original: SourceId) -> bool {
        self.map.contains_key(&original)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// State threaded through one clone operation
#[derive(Debug, Default)]
pub struct CloneContext {
    mapping: QuerySourceMapping,
    models: Vec<ModelId>,
}

impl CloneContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Original-to-clone lookup for holders of the original model
    pub fn mapping(&self) -> &QuerySourceMapping {
        &self.mapping
    }

    pub fn into_mapping(self) -> QuerySourceMapping {
        self.mapping
    }

    /// Record that `clone` replaces `original`
    pub fn register(&mut self, original: &dyn QuerySource, clone: &dyn QuerySource) {
        self.mapping.insert(original.id(), clone.source_ref());
    }

    /// Redirect mapped back-references and clone nested models
    pub fn adjust_expression(&mut self, expr: &ExprRef) -> ExprRef {
        rewrite(&mut ReferenceReplacer { ctx: self }, expr)
    }

    /// Model whose clauses are currently being cloned
    pub(crate) fn current_model(&self) -> Option<ModelId> {
        self.models.last().copied()
    }

    pub(crate) fn enter_model(&mut self, id: ModelId) {
        self.models.push(id);
    }

    pub(crate) fn leave_model(&mut self) {
        self.models.pop();
    }
}

struct ReferenceReplacer<'a> {
    ctx: &'a mut CloneContext,
}

impl ExprVisitor for ReferenceReplacer<'_> {
    type Error = Infallible;

    fn visit_query_source_ref(
        &mut self,
        expr: &ExprRef,
        reference: &QuerySourceRef,
    ) -> Result<ExprRef, Infallible> {
        Ok(match self.ctx.mapping.get(reference.id) {
            Some(replacement) => Arc::new(Expr::QuerySource(replacement.clone())),
            None => expr.clone(),
        })
    }

    fn visit_sub_query(
        &mut self,
        _expr: &ExprRef,
        sub_query: &SubQueryExpr,
    ) -> Result<ExprRef, Infallible> {
        let model = sub_query.model.clone_with(self.ctx);
        Ok(Expr::sub_query(Arc::new(model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, ItemType};
    use crate::model::MainFromClause;

    #[test]
    fn test_mapped_reference_is_redirected() {
        let original = MainFromClause::new("x", ItemType::Int, Expr::parameter("xs"));
        let clone = MainFromClause::new("x", ItemType::Int, Expr::parameter("xs"));
        let mut ctx = CloneContext::new();
        ctx.register(&original, &clone);

        let expr = Expr::binary(BinaryOp::Add, original.reference(), Expr::constant(1i64));
        let adjusted = ctx.adjust_expression(&expr);
        match adjusted.as_ref() {
            Expr::Binary(b) => match b.left.as_ref() {
                Expr::QuerySource(r) => assert_eq!(r.id, clone.id),
                other => panic!("expected reference, got {}", other),
            },
            other => panic!("expected binary, got {}", other),
        }
    }

    #[test]
    fn test_unmapped_reference_passes_through() {
        let outer = MainFromClause::new("c", ItemType::Unknown, Expr::parameter("cs"));
        let expr = Expr::member(outer.reference(), "Orders");
        let mut ctx = CloneContext::new();
        let adjusted = ctx.adjust_expression(&expr);
        assert!(Arc::ptr_eq(&expr, &adjusted));
        assert!(ctx.mapping().is_empty());
    }
}
