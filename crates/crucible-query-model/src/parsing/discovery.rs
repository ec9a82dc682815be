//! Nested pipeline discovery.
//!
//! Any combinator call left inside a resolved expression heads a chain of
//! its own. It is parsed into an independent model, replaced in place by a
//! sub-query leaf and recorded on the context so its parent can be set once
//! the enclosing model exists.

use crate::error::{ParseError, ParseResult};
use crate::expr::visitor::ExprVisitor;
use crate::expr::{CallExpr, Expr, ExprRef};
use crate::parsing::context::ClauseGenerationContext;
use std::sync::Arc;
use tracing::debug;

struct SubPipelineDiscovery<'c, 'a> {
    ctx: &'c ClauseGenerationContext<'a>,
}

impl ExprVisitor for SubPipelineDiscovery<'_, '_> {
    type Error = ParseError;

    fn visit_call(&mut self, expr: &ExprRef, call: &CallExpr) -> ParseResult<ExprRef> {
        if !self
            .ctx
            .session()
            .registry()
            .is_combinator_owner(&call.method.owner)
        {
            return self.visit_children(expr);
        }

        let model = self
            .ctx
            .session()
            .parse_chain(expr, self.ctx.depth() + 1)?;
        let model = Arc::new(model);
        debug!(
            model = %model.id(),
            depth = self.ctx.depth() + 1,
            "discovered nested pipeline"
        );
        self.ctx.register_discovered(model.clone());
        Ok(Expr::sub_query(model))
    }
}

/// Replace every nested combinator chain in `expr` with a sub-query
pub fn discover_sub_pipelines(ctx: &ClauseGenerationContext<'_>, expr: &ExprRef) -> ParseResult<ExprRef> {
    SubPipelineDiscovery { ctx }.visit(expr)
}
