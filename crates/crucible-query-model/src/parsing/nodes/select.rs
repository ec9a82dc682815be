use crate::error::ParseResult;
use crate::expr::{replace_parameter, ExprRef, ItemType, Parameter};
use crate::model::{AdditionalFromClause, BodyClause, QuerySource, SourceId};
use crate::parsing::assembly::ModelAssembly;
use crate::parsing::context::ClauseGenerationContext;
use crate::parsing::node::{expect_lambda, required, NodeKind, ParseInfo, PipelineNode};

/// `Select(selector)`. Contributes no clause of its own: its resolved
/// selector becomes the terminal projection unless a later step streams
/// something else.
#[derive(Debug)]
pub struct SelectNode {
    info: ParseInfo,
    selector: ExprRef,
}

impl SelectNode {
    pub fn construct(info: ParseInfo, args: Vec<Option<ExprRef>>) -> ParseResult<Box<dyn PipelineNode>> {
        let selector = required(&info, &args, 0)?;
        expect_lambda(&info, &selector, 1)?;
        Ok(Box::new(Self { info, selector }))
    }

    fn resolved_selector(&self, ctx: &ClauseGenerationContext<'_>) -> ParseResult<ExprRef> {
        let source = self.info.require_source()?;
        ctx.resolve_lambda(self.id(), Some(source), &self.selector, &[])
    }
}

impl PipelineNode for SelectNode {
    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Projection
    }

    fn resolve(
        &self,
        input: &Parameter,
        expr: &ExprRef,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<ExprRef> {
        let selector = self.resolved_selector(ctx)?;
        Ok(replace_parameter(expr, input, &selector))
    }

    fn apply(&self, _assembly: &mut ModelAssembly, ctx: &ClauseGenerationContext<'_>) -> ParseResult<()> {
        // surfaces nested pipelines in chain order
        self.resolved_selector(ctx).map(|_| ())
    }
}

/// `SelectMany(collectionSelector[, resultSelector])`: an additional from
/// clause, optionally followed by a projection over both range variables.
#[derive(Debug)]
pub struct SelectManyNode {
    info: ParseInfo,
    collection_selector: ExprRef,
    result_selector: Option<ExprRef>,
}

impl SelectManyNode {
    pub fn construct(info: ParseInfo, args: Vec<Option<ExprRef>>) -> ParseResult<Box<dyn PipelineNode>> {
        let collection_selector = required(&info, &args, 0)?;
        expect_lambda(&info, &collection_selector, 1)?;
        let result_selector = args.get(1).cloned().flatten();
        if let Some(selector) = &result_selector {
            expect_lambda(&info, selector, 2)?;
        }
        Ok(Box::new(Self {
            info,
            collection_selector,
            result_selector,
        }))
    }

    /// The result selector's second parameter names the flattened element
    fn element_parameter(&self) -> Option<&Parameter> {
        self.result_selector
            .as_ref()
            .and_then(|selector| selector.as_lambda())
            .and_then(|lambda| lambda.params.get(1))
    }
}

impl PipelineNode for SelectManyNode {
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
        let reference = ctx.require_clause_reference(self.id())?;
        let output = match &self.result_selector {
            Some(selector) => ctx.resolve_lambda(
                self.id(),
                Some(self.info.require_source()?),
                selector,
                &[reference],
            )?,
            None => reference,
        };
        Ok(replace_parameter(expr, input, &output))
    }

    fn apply(&self, assembly: &mut ModelAssembly, ctx: &ClauseGenerationContext<'_>) -> ParseResult<()> {
        let source = self.info.require_source()?;
        let from_expression =
            ctx.resolve_lambda(self.id(), Some(source), &self.collection_selector, &[])?;

        let element = self.element_parameter();
        let preferred = element
            .map(|p| p.name.as_str())
            .unwrap_or(&self.info.associated_identifier);
        let name = assembly.unique_name(preferred, ctx);
        let item_type = match element {
            Some(p) if p.ty.is_known() => p.ty.clone(),
            _ => from_expression
                .ty()
                .element_type()
                .cloned()
                .unwrap_or(ItemType::Unknown),
        };

        let clause = AdditionalFromClause::with_id(SourceId::next(), name, item_type, from_expression);
        ctx.add_clause_mapping(self.id(), clause.source_ref())?;
        assembly
            .builder_mut()
            .add_body_clause(BodyClause::AdditionalFrom(clause))
    }
}
