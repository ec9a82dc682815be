use crate::error::ParseResult;
use crate::expr::{replace_parameter, ExprRef, Parameter};
use crate::model::QuerySource;
use crate::parsing::assembly::ModelAssembly;
use crate::parsing::context::ClauseGenerationContext;
use crate::parsing::node::{expect_lambda, required, NodeKind, ParseInfo, PipelineNode};
use crate::result_operators::{GroupResultOperator, ResultOperator};

/// `GroupBy(keySelector[, elementSelector])`, modelled as a group result
/// operator. Steps after it read the groups through a wrapped model.
#[derive(Debug)]
pub struct GroupByNode {
    info: ParseInfo,
    key_selector: ExprRef,
    element_selector: Option<ExprRef>,
}

impl GroupByNode {
    pub fn construct(info: ParseInfo, args: Vec<Option<ExprRef>>) -> ParseResult<Box<dyn PipelineNode>> {
        let key_selector = required(&info, &args, 0)?;
        expect_lambda(&info, &key_selector, 1)?;
        let element_selector = args.get(1).cloned().flatten();
        if let Some(selector) = &element_selector {
            expect_lambda(&info, selector, 1)?;
        }
        Ok(Box::new(Self {
            info,
            key_selector,
            element_selector,
        }))
    }
}

impl PipelineNode for GroupByNode {
    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        NodeKind::ResultOperator
    }

    fn resolve(
        &self,
        input: &Parameter,
        expr: &ExprRef,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<ExprRef> {
        let reference = ctx.require_clause_reference(self.id())?;
        Ok(replace_parameter(expr, input, &reference))
    }

    fn apply(&self, assembly: &mut ModelAssembly, ctx: &ClauseGenerationContext<'_>) -> ParseResult<()> {
        let source = self.info.require_source()?;
        let key_selector = ctx.resolve_lambda(self.id(), Some(source), &self.key_selector, &[])?;
        let element_selector = match &self.element_selector {
            Some(selector) => ctx.resolve_lambda(self.id(), Some(source), selector, &[])?,
            None => ctx.resolve_identity(source)?,
        };

        let name = assembly.unique_name(&self.info.associated_identifier, ctx);
        let group = GroupResultOperator::new(name, key_selector, element_selector);
        ctx.add_clause_mapping(self.id(), group.source_ref())?;
        assembly
            .builder_mut()
            .add_result_operator(ResultOperator::Group(group))
    }
}
