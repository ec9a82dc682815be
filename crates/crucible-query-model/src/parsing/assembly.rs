//! Query model assembly while nodes apply.

use crate::error::{ParseError, ParseResult};
use crate::expr::{Expr, ExprRef};
use crate::model::{MainFromClause, QueryModel, QueryModelBuilder, QuerySource, SelectClause};
use crate::parsing::context::ClauseGenerationContext;
use crate::parsing::node::{not_streaming, NodeId};
use std::sync::Arc;
use tracing::debug;

/// Builder plus the bookkeeping needed to pick the terminal projection.
///
/// `projection_node` is the last node whose output the model streams; the
/// select clause is its resolved output unless a result operator supplied
/// its own selector.
#[derive(Debug)]
pub struct ModelAssembly {
    builder: QueryModelBuilder,
    projection_node: NodeId,
    override_selector: Option<ExprRef>,
}

impl ModelAssembly {
    pub fn new(head: NodeId) -> Self {
        Self {
            builder: QueryModelBuilder::new(),
            projection_node: head,
            override_selector: None,
        }
    }

    pub fn builder(&self) -> &QueryModelBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut QueryModelBuilder {
        &mut self.builder
    }

    /// The model now streams the output of `node`
    pub fn streamed_by(&mut self, node: NodeId) {
        self.projection_node = node;
        self.override_selector = None;
    }

    /// Use `selector` as the terminal projection
    pub fn project(&mut self, selector: ExprRef) {
        self.override_selector = Some(selector);
    }

    /// `preferred`, or a generated name if the model already uses it
    pub fn unique_name(&self, preferred: &str, ctx: &ClauseGenerationContext<'_>) -> String {
        if preferred.is_empty() || self.builder.is_name_claimed(preferred) {
            ctx.session().generate_identifier()
        } else {
            preferred.to_string()
        }
    }

    fn terminal_selector(&self, ctx: &ClauseGenerationContext<'_>) -> ParseResult<ExprRef> {
        match &self.override_selector {
            Some(selector) => Ok(selector.clone()),
            None => ctx.resolve_identity(self.projection_node),
        }
    }

    /// Called before a clause is added. If result operators were already
    /// appended, everything so far is closed into a nested model that
    /// becomes the head of a fresh one, and `boundary` (the node the clause
    /// reads from) is redirected to that head. A scalar or single-element
    /// boundary has nothing to wrap and is rejected.
    pub fn prepare_clause(&mut self, boundary: NodeId, ctx: &ClauseGenerationContext<'_>) -> ParseResult<()> {
        if !self.builder.has_result_operators() {
            return Ok(());
        }
        let boundary_node = ctx.node(boundary)?;
        if !boundary_node.streams() {
            return Err(not_streaming(boundary_node.info()));
        }
        if !ctx.options().wrap_after_result_operators {
            return Err(ParseError::NotSupportedOperation(format!(
                "clause after result operator at {}",
                ctx.node(boundary)?.info().method_name()
            )));
        }

        let selector = self.terminal_selector(ctx)?;
        let mut finished = std::mem::take(&mut self.builder);
        finished.set_select_clause(SelectClause::new(selector))?;
        let inner = finished.build()?;
        ctx.adopt_discovered(inner.id())?;

        let item_type = inner.result_type().element_type().cloned().unwrap_or_default();
        let inner = Arc::new(inner);
        let name = self.unique_name(&ctx.node(boundary)?.info().associated_identifier, ctx);
        let head = MainFromClause::new(name, item_type, Expr::sub_query(inner.clone()));

        debug!(
            inner = %inner.id(),
            outer = %self.builder.model_id(),
            head = %head.item_name,
            "wrapping query model after result operators"
        );
        ctx.redirect_clause_mapping(boundary, head.source_ref());
        self.builder.add_main_from(head)?;
        ctx.register_discovered(inner);
        self.streamed_by(boundary);
        Ok(())
    }

    /// Set the terminal projection if no node did, build, and attach
    /// discovered models to the result
    pub fn finish(mut self, ctx: &ClauseGenerationContext<'_>) -> ParseResult<QueryModel> {
        if !self.builder.has_select_clause() {
            let selector = self.terminal_selector(ctx)?;
            self.builder.set_select_clause(SelectClause::new(selector))?;
        }
        let model = self.builder.build()?;
        ctx.adopt_discovered(model.id())?;
        Ok(model)
    }
}
