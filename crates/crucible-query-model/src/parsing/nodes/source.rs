use crate::error::ParseResult;
use crate::expr::{replace_parameter, ExprRef, ItemType, Parameter};
use crate::model::{MainFromClause, QuerySource};
use crate::parsing::assembly::ModelAssembly;
use crate::parsing::context::ClauseGenerationContext;
use crate::parsing::node::{NodeKind, ParseInfo, PipelineNode};

/// Chain head: any expression that is not a combinator call.
/// Becomes the main from clause.
#[derive(Debug)]
pub struct MainSourceNode {
    info: ParseInfo,
    item_type: ItemType,
}

impl MainSourceNode {
    pub fn new(info: ParseInfo, item_type: ItemType) -> Self {
        Self { info, item_type }
    }
}

impl PipelineNode for MainSourceNode {
    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Source
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
        let name = assembly.unique_name(&self.info.associated_identifier, ctx);
        let from_expression = ctx.process_argument(&self.info.call)?;
        let clause = MainFromClause::new(name, self.item_type.clone(), from_expression);
        ctx.add_clause_mapping(self.id(), clause.source_ref())?;
        assembly.builder_mut().add_main_from(clause)
    }
}
