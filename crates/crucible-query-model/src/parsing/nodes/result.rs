//! Nodes that append a result operator.
//!
//! Operators taking an inline predicate or selector are normalized first:
//! `Count(p)` becomes `Where(p)` followed by `Count()`, `Sum(s)` becomes a
//! projection on `s` followed by `Sum()`.

use crate::error::{ParseError, ParseResult};
use crate::expr::{Expr, ExprRef, Parameter};
use crate::model::{BodyClause, WhereClause};
use crate::parsing::assembly::ModelAssembly;
use crate::parsing::context::ClauseGenerationContext;
use crate::parsing::node::{expect_lambda, not_streaming, required, NodeKind, ParseInfo, PipelineNode};
use crate::result_operators::ResultOperator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperatorKind {
    Count,
    LongCount,
    Any,
    All,
    First { or_default: bool },
    Last { or_default: bool },
    Single { or_default: bool },
    Min,
    Max,
    Sum,
    Average,
    Take,
    Skip,
    Distinct,
    Reverse,
    Cast,
    OfType,
    DefaultIfEmpty,
    Contains,
    Except,
    Intersect,
    Union,
    Concat,
    Aggregate,
    AggregateFromSeed,
}

impl OperatorKind {
    /// Whether the operator still produces a sequence later steps can read
    fn streams(self) -> bool {
        matches!(
            self,
            OperatorKind::Take
                | OperatorKind::Skip
                | OperatorKind::Distinct
                | OperatorKind::Reverse
                | OperatorKind::Cast
                | OperatorKind::OfType
                | OperatorKind::DefaultIfEmpty
                | OperatorKind::Except
                | OperatorKind::Intersect
                | OperatorKind::Union
                | OperatorKind::Concat
        )
    }
}

#[derive(Debug)]
pub struct ResultOperatorNode {
    info: ParseInfo,
    kind: OperatorKind,
    args: Vec<Option<ExprRef>>,
}

macro_rules! operator_constructors {
    ($($fn_name:ident => $kind:expr),* $(,)?) => {
        impl ResultOperatorNode {
            $(
                pub fn $fn_name(
                    info: ParseInfo,
                    args: Vec<Option<ExprRef>>,
                ) -> ParseResult<Box<dyn PipelineNode>> {
                    Self::create(info, $kind, args)
                }
            )*
        }
    };
}

operator_constructors! {
    count => OperatorKind::Count,
    long_count => OperatorKind::LongCount,
    any => OperatorKind::Any,
    all => OperatorKind::All,
    first => OperatorKind::First { or_default: false },
    first_or_default => OperatorKind::First { or_default: true },
    last => OperatorKind::Last { or_default: false },
    last_or_default => OperatorKind::Last { or_default: true },
    single => OperatorKind::Single { or_default: false },
    single_or_default => OperatorKind::Single { or_default: true },
    min => OperatorKind::Min,
    max => OperatorKind::Max,
    sum => OperatorKind::Sum,
    average => OperatorKind::Average,
    take => OperatorKind::Take,
    skip => OperatorKind::Skip,
    distinct => OperatorKind::Distinct,
    reverse => OperatorKind::Reverse,
    cast => OperatorKind::Cast,
    of_type => OperatorKind::OfType,
    default_if_empty => OperatorKind::DefaultIfEmpty,
    contains => OperatorKind::Contains,
    except => OperatorKind::Except,
    intersect => OperatorKind::Intersect,
    union => OperatorKind::Union,
    concat => OperatorKind::Concat,
    aggregate => OperatorKind::Aggregate,
    aggregate_from_seed => OperatorKind::AggregateFromSeed,
}

impl ResultOperatorNode {
    fn create(
        info: ParseInfo,
        kind: OperatorKind,
        args: Vec<Option<ExprRef>>,
    ) -> ParseResult<Box<dyn PipelineNode>> {
        match kind {
            OperatorKind::Count
            | OperatorKind::LongCount
            | OperatorKind::Any
            | OperatorKind::First { .. }
            | OperatorKind::Last { .. }
            | OperatorKind::Single { .. }
            | OperatorKind::Min
            | OperatorKind::Max
            | OperatorKind::Sum
            | OperatorKind::Average => {
                if let Some(Some(lambda)) = args.first() {
                    expect_lambda(&info, lambda, 1)?;
                }
            }
            OperatorKind::All => {
                expect_lambda(&info, &required(&info, &args, 0)?, 1)?;
            }
            OperatorKind::Aggregate => {
                expect_lambda(&info, &required(&info, &args, 0)?, 2)?;
            }
            OperatorKind::AggregateFromSeed => {
                required(&info, &args, 0)?;
                expect_lambda(&info, &required(&info, &args, 1)?, 2)?;
                if let Some(Some(selector)) = args.get(2) {
                    expect_lambda(&info, selector, 1)?;
                }
            }
            _ => {}
        }
        Ok(Box::new(Self { info, kind, args }))
    }

    fn arg(&self, index: usize) -> Option<&ExprRef> {
        self.args.get(index).and_then(Option::as_ref)
    }

    fn required_arg(&self, index: usize) -> ParseResult<ExprRef> {
        required(&self.info, &self.args, index)
    }

    /// Synthesize the filter an inline predicate stands for
    fn add_filter(
        &self,
        predicate: &ExprRef,
        assembly: &mut ModelAssembly,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<()> {
        let source = self.info.require_source()?;
        assembly.prepare_clause(source, ctx)?;
        let predicate = ctx.resolve_lambda(self.id(), Some(source), predicate, &[])?;
        assembly
            .builder_mut()
            .add_body_clause(BodyClause::Where(WhereClause { predicate }))
    }

    /// Synthesize the projection an inline selector stands for
    fn add_projection(
        &self,
        selector: &ExprRef,
        assembly: &mut ModelAssembly,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<()> {
        let source = self.info.require_source()?;
        assembly.prepare_clause(source, ctx)?;
        let selector = ctx.resolve_lambda(self.id(), Some(source), selector, &[])?;
        assembly.project(selector);
        Ok(())
    }

    /// `(acc, item) => body` with the item resolved through the source,
    /// leaving `acc => body'`
    fn accumulator(&self, func: &ExprRef, ctx: &ClauseGenerationContext<'_>) -> ParseResult<ExprRef> {
        let source = self.info.require_source()?;
        ctx.resolve_cached(self.id(), func, Some(source), || {
            let lambda = expect_lambda(&self.info, func, 2)?;
            let body = ctx.resolve_in(source, &lambda.params[1], &lambda.body)?;
            Ok(Expr::lambda(vec![lambda.params[0].clone()], body))
        })
    }

    fn build_operator(
        &self,
        assembly: &mut ModelAssembly,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<ResultOperator> {
        let operand = |index: usize| -> ParseResult<ExprRef> {
            ctx.process_argument(&self.required_arg(index)?)
        };

        Ok(match self.kind {
            OperatorKind::Count
            | OperatorKind::LongCount
            | OperatorKind::Any
            | OperatorKind::First { .. }
            | OperatorKind::Last { .. }
            | OperatorKind::Single { .. } => {
                if let Some(predicate) = self.arg(0) {
                    self.add_filter(predicate, assembly, ctx)?;
                }
                match self.kind {
                    OperatorKind::Count => ResultOperator::Count,
                    OperatorKind::LongCount => ResultOperator::LongCount,
                    OperatorKind::Any => ResultOperator::Any,
                    OperatorKind::First { or_default } => ResultOperator::First {
                        return_default_when_empty: or_default,
                    },
                    OperatorKind::Last { or_default } => ResultOperator::Last {
                        return_default_when_empty: or_default,
                    },
                    _ => ResultOperator::Single {
                        return_default_when_empty: matches!(
                            self.kind,
                            OperatorKind::Single { or_default: true }
                        ),
                    },
                }
            }
            OperatorKind::Min | OperatorKind::Max | OperatorKind::Sum | OperatorKind::Average => {
                if let Some(selector) = self.arg(0) {
                    self.add_projection(selector, assembly, ctx)?;
                }
                match self.kind {
                    OperatorKind::Min => ResultOperator::Min,
                    OperatorKind::Max => ResultOperator::Max,
                    OperatorKind::Sum => ResultOperator::Sum,
                    _ => ResultOperator::Average,
                }
            }
            OperatorKind::All => {
                let source = self.info.require_source()?;
                ResultOperator::All {
                    predicate: ctx.resolve_lambda(self.id(), Some(source), &self.required_arg(0)?, &[])?,
                }
            }
            OperatorKind::Take => ResultOperator::Take { count: operand(0)? },
            OperatorKind::Skip => ResultOperator::Skip { count: operand(0)? },
            OperatorKind::Contains => ResultOperator::Contains { item: operand(0)? },
            OperatorKind::Except => ResultOperator::Except { source2: operand(0)? },
            OperatorKind::Intersect => ResultOperator::Intersect { source2: operand(0)? },
            OperatorKind::Union => ResultOperator::Union { source2: operand(0)? },
            OperatorKind::Concat => ResultOperator::Concat { source2: operand(0)? },
            OperatorKind::Distinct => ResultOperator::Distinct,
            OperatorKind::Reverse => ResultOperator::Reverse,
            OperatorKind::Cast | OperatorKind::OfType => {
                let item_type = self.info.type_args.first().cloned().ok_or_else(|| {
                    ParseError::ArgumentShape(format!(
                        "{} requires a target item type",
                        self.info.method_name()
                    ))
                })?;
                if self.kind == OperatorKind::Cast {
                    ResultOperator::Cast { item_type }
                } else {
                    ResultOperator::OfType { item_type }
                }
            }
            OperatorKind::DefaultIfEmpty => ResultOperator::DefaultIfEmpty {
                default_value: self
                    .arg(0)
                    .map(|value| ctx.process_argument(value))
                    .transpose()?,
            },
            OperatorKind::Aggregate => ResultOperator::Aggregate {
                func: self.accumulator(&self.required_arg(0)?, ctx)?,
            },
            OperatorKind::AggregateFromSeed => ResultOperator::AggregateFromSeed {
                seed: operand(0)?,
                func: self.accumulator(&self.required_arg(1)?, ctx)?,
                result_selector: self
                    .arg(2)
                    .map(|selector| ctx.process_argument(selector))
                    .transpose()?,
            },
        })
    }
}

impl PipelineNode for ResultOperatorNode {
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
        if !self.streams() {
            return Err(not_streaming(&self.info));
        }
        ctx.resolve_in(self.info.require_source()?, input, expr)
    }

    fn apply(&self, assembly: &mut ModelAssembly, ctx: &ClauseGenerationContext<'_>) -> ParseResult<()> {
        let source = ctx.node(self.info.require_source()?)?;
        if !source.streams() {
            return Err(not_streaming(source.info()));
        }
        let operator = self.build_operator(assembly, ctx)?;
        assembly.builder_mut().add_result_operator(operator)
    }

    fn streams(&self) -> bool {
        self.kind.streams()
    }
}
