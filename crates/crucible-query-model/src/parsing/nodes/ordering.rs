use crate::error::{ParseError, ParseResult};
use crate::expr::{ExprRef, Parameter};
use crate::model::{BodyClause, OrderByClause, Ordering, OrderingDirection};
use crate::parsing::assembly::ModelAssembly;
use crate::parsing::context::ClauseGenerationContext;
use crate::parsing::node::{expect_lambda, required, NodeKind, ParseInfo, PipelineNode};

/// `OrderBy`/`ThenBy` and their descending forms. `OrderBy` opens a new
/// sort clause; `ThenBy` appends to the last one.
#[derive(Debug)]
pub struct OrderingNode {
    info: ParseInfo,
    key_selector: ExprRef,
    direction: OrderingDirection,
    then_by: bool,
}

impl OrderingNode {
    fn create(
        info: ParseInfo,
        args: Vec<Option<ExprRef>>,
        direction: OrderingDirection,
        then_by: bool,
    ) -> ParseResult<Box<dyn PipelineNode>> {
        let key_selector = required(&info, &args, 0)?;
        expect_lambda(&info, &key_selector, 1)?;
        Ok(Box::new(Self {
            info,
            key_selector,
            direction,
            then_by,
        }))
    }

    pub fn order_by(info: ParseInfo, args: Vec<Option<ExprRef>>) -> ParseResult<Box<dyn PipelineNode>> {
        Self::create(info, args, OrderingDirection::Asc, false)
    }

    pub fn order_by_descending(
        info: ParseInfo,
        args: Vec<Option<ExprRef>>,
    ) -> ParseResult<Box<dyn PipelineNode>> {
        Self::create(info, args, OrderingDirection::Desc, false)
    }

    pub fn then_by(info: ParseInfo, args: Vec<Option<ExprRef>>) -> ParseResult<Box<dyn PipelineNode>> {
        Self::create(info, args, OrderingDirection::Asc, true)
    }

    pub fn then_by_descending(
        info: ParseInfo,
        args: Vec<Option<ExprRef>>,
    ) -> ParseResult<Box<dyn PipelineNode>> {
        Self::create(info, args, OrderingDirection::Desc, true)
    }
}

impl PipelineNode for OrderingNode {
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
        let key = ctx.resolve_lambda(self.id(), Some(source), &self.key_selector, &[])?;
        let ordering = Ordering::new(key, self.direction);

        if !self.then_by {
            return assembly
                .builder_mut()
                .add_body_clause(BodyClause::OrderBy(OrderByClause {
                    orderings: vec![ordering],
                }));
        }
        match assembly.builder_mut().last_order_by_mut() {
            Some(order_by) => {
                order_by.orderings.push(ordering);
                Ok(())
            }
            None => Err(ParseError::NotSupportedOperation(format!(
                "{} without a preceding OrderBy",
                self.info.method_name()
            ))),
        }
    }
}
