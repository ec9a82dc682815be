use crate::error::ParseResult;
use crate::expr::{replace_parameter, Expr, ExprRef, ItemType, Parameter, QuerySourceRef};
use crate::model::{BodyClause, GroupJoinClause, JoinClause, QuerySource, SourceId};
use crate::parsing::assembly::ModelAssembly;
use crate::parsing::context::ClauseGenerationContext;
use crate::parsing::node::{expect_lambda, required, NodeId, NodeKind, ParseInfo, PipelineNode};
use std::sync::Arc;

/// Operands shared by `Join` and `GroupJoin`
#[derive(Debug)]
struct JoinArguments {
    inner_sequence: ExprRef,
    outer_key_selector: ExprRef,
    inner_key_selector: ExprRef,
    result_selector: ExprRef,
}

impl JoinArguments {
    fn parse(info: &ParseInfo, args: &[Option<ExprRef>]) -> ParseResult<Self> {
        let arguments = Self {
            inner_sequence: required(info, args, 0)?,
            outer_key_selector: required(info, args, 1)?,
            inner_key_selector: required(info, args, 2)?,
            result_selector: required(info, args, 3)?,
        };
        expect_lambda(info, &arguments.outer_key_selector, 1)?;
        expect_lambda(info, &arguments.inner_key_selector, 1)?;
        expect_lambda(info, &arguments.result_selector, 2)?;
        Ok(arguments)
    }

    /// Build the join clause. The inner item is named after the inner key
    /// selector's parameter; that selector resolves against the join itself.
    fn join_clause(
        &self,
        info: &ParseInfo,
        assembly: &ModelAssembly,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<JoinClause> {
        let source = info.require_source()?;
        let inner_param = expect_lambda(info, &self.inner_key_selector, 1)?.params[0].clone();
        let inner_sequence = ctx.process_argument(&self.inner_sequence)?;
        let item_type = if inner_param.ty.is_known() {
            inner_param.ty.clone()
        } else {
            inner_sequence
                .ty()
                .element_type()
                .cloned()
                .unwrap_or(ItemType::Unknown)
        };
        let reference = QuerySourceRef {
            id: SourceId::next(),
            name: assembly.unique_name(&inner_param.name, ctx),
            item_type,
        };

        let outer_key_selector =
            ctx.resolve_lambda(info.id, Some(source), &self.outer_key_selector, &[])?;
        let inner_key_selector = ctx.resolve_lambda(
            info.id,
            None,
            &self.inner_key_selector,
            &[Arc::new(Expr::QuerySource(reference.clone()))],
        )?;

        Ok(JoinClause {
            id: reference.id,
            item_name: reference.name,
            item_type: reference.item_type,
            inner_sequence,
            outer_key_selector,
            inner_key_selector,
        })
    }

    /// Result selector applied to the outer item and `produced`
    fn resolve_output(
        &self,
        node: NodeId,
        source: NodeId,
        input: &Parameter,
        expr: &ExprRef,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<ExprRef> {
        let produced = ctx.require_clause_reference(node)?;
        let output = ctx.resolve_lambda(node, Some(source), &self.result_selector, &[produced])?;
        Ok(replace_parameter(expr, input, &output))
    }
}

/// `Join(inner, outerKey, innerKey, resultSelector)`
#[derive(Debug)]
pub struct JoinNode {
    info: ParseInfo,
    arguments: JoinArguments,
}

impl JoinNode {
    pub fn construct(info: ParseInfo, args: Vec<Option<ExprRef>>) -> ParseResult<Box<dyn PipelineNode>> {
        let arguments = JoinArguments::parse(&info, &args)?;
        Ok(Box::new(Self { info, arguments }))
    }
}

impl PipelineNode for JoinNode {
    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Clause
    }

    fn resolve(
        &self,
        input: &Parameter,
        expr: &ExprRef,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<ExprRef> {
        self.arguments
            .resolve_output(self.id(), self.info.require_source()?, input, expr, ctx)
    }

    fn apply(&self, assembly: &mut ModelAssembly, ctx: &ClauseGenerationContext<'_>) -> ParseResult<()> {
        let clause = self.arguments.join_clause(&self.info, assembly, ctx)?;
        ctx.add_clause_mapping(self.id(), clause.source_ref())?;
        assembly.builder_mut().add_body_clause(BodyClause::Join(clause))
    }
}

/// `GroupJoin(inner, outerKey, innerKey, resultSelector)`: the result
/// selector's second parameter names the per-outer-item group of matches.
#[derive(Debug)]
pub struct GroupJoinNode {
    info: ParseInfo,
    arguments: JoinArguments,
}

impl GroupJoinNode {
    pub fn construct(info: ParseInfo, args: Vec<Option<ExprRef>>) -> ParseResult<Box<dyn PipelineNode>> {
        let arguments = JoinArguments::parse(&info, &args)?;
        Ok(Box::new(Self { info, arguments }))
    }
}

impl PipelineNode for GroupJoinNode {
    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Clause
    }

    fn resolve(
        &self,
        input: &Parameter,
        expr: &ExprRef,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<ExprRef> {
        self.arguments
            .resolve_output(self.id(), self.info.require_source()?, input, expr, ctx)
    }

    fn apply(&self, assembly: &mut ModelAssembly, ctx: &ClauseGenerationContext<'_>) -> ParseResult<()> {
        let join_clause = self.arguments.join_clause(&self.info, assembly, ctx)?;
        let into = expect_lambda(&self.info, &self.arguments.result_selector, 2)?.params[1].clone();

        let mut item_name = assembly.unique_name(&into.name, ctx);
        if item_name == join_clause.item_name {
            item_name = ctx.session().generate_identifier();
        }
        let item_type = if into.ty.is_known() {
            into.ty
        } else {
            ItemType::sequence(join_clause.item_type.clone())
        };

        let clause = GroupJoinClause {
            id: SourceId::next(),
            item_name,
            item_type,
            join_clause,
        };
        ctx.add_clause_mapping(self.id(), clause.source_ref())?;
        assembly
            .builder_mut()
            .add_body_clause(BodyClause::GroupJoin(clause))
    }
}
