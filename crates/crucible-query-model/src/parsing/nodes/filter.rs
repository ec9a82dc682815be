use crate::error::ParseResult;
use crate::expr::{ExprRef, Parameter};
use crate::model::{BodyClause, WhereClause};
use crate::parsing::assembly::ModelAssembly;
use crate::parsing::context::ClauseGenerationContext;
use crate::parsing::node::{expect_lambda, required, NodeKind, ParseInfo, PipelineNode};

/// `Where(predicate)`
#[derive(Debug)]
pub struct WhereNode {
    info: ParseInfo,
    predicate: ExprRef,
}

impl WhereNode {
    pub fn construct(info: ParseInfo, args: Vec<Option<ExprRef>>) -> ParseResult<Box<dyn PipelineNode>> {
        let predicate = required(&info, &args, 0)?;
        expect_lambda(&info, &predicate, 1)?;
        Ok(Box::new(Self { info, predicate }))
    }
}

impl PipelineNode for WhereNode {
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
        ctx.resolve_in(self.info.require_source()?, input, expr)
    }

    fn apply(&self, assembly: &mut ModelAssembly, ctx: &ClauseGenerationContext<'_>) -> ParseResult<()> {
        let source = self.info.require_source()?;
        let predicate = ctx.resolve_lambda(self.id(), Some(source), &self.predicate, &[])?;
        assembly
            .builder_mut()
            .add_body_clause(BodyClause::Where(WhereClause { predicate }))
    }
}
