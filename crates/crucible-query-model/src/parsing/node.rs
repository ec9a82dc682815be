//! The pipeline node abstraction.

use crate::error::{ParseError, ParseResult};
use crate::expr::{Expr, ExprRef, ItemType, LambdaExpr, Parameter};
use crate::parsing::assembly::ModelAssembly;
use crate::parsing::context::ClauseGenerationContext;
use std::fmt;

/// Index of a node in the chain being parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Call-site metadata every node is constructed with
#[derive(Debug, Clone)]
pub struct ParseInfo {
    pub id: NodeId,
    /// Previous step; `None` only for the head
    pub source: Option<NodeId>,
    /// Name the next step binds this node's output to
    pub associated_identifier: String,
    /// The combinator call (or head expression) this node was built from
    pub call: ExprRef,
    pub type_args: Vec<ItemType>,
}

impl ParseInfo {
    /// Combinator name, or the head expression text
    pub fn method_name(&self) -> String {
        match self.call.as_call() {
            Some(call) => call.method.name.clone(),
            None => self.call.to_string(),
        }
    }

    pub fn require_source(&self) -> ParseResult<NodeId> {
        self.source.ok_or_else(|| {
            ParseError::ArgumentShape(format!("{} has no source step", self.method_name()))
        })
    }
}

/// How a node participates in model assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Chain head, becomes the main from clause
    Source,
    /// Adds a body clause
    Clause,
    /// Sets the terminal projection
    Projection,
    /// Appends a result operator
    ResultOperator,
}

/// One recognized combinator call in a chain.
///
/// `resolve` rewrites an expression written against "whatever this node
/// streams" (the `input` parameter) into one written purely against
/// already-materialized clauses. `apply` contributes the node's clause or
/// operator to the model under construction.
pub trait PipelineNode: fmt::Debug {
    fn info(&self) -> &ParseInfo;

    fn kind(&self) -> NodeKind;

    fn resolve(
        &self,
        input: &Parameter,
        expr: &ExprRef,
        ctx: &ClauseGenerationContext<'_>,
    ) -> ParseResult<ExprRef>;

    fn apply(&self, assembly: &mut ModelAssembly, ctx: &ClauseGenerationContext<'_>) -> ParseResult<()>;

    /// Whether later steps can read a sequence from this node
    fn streams(&self) -> bool {
        true
    }

    fn id(&self) -> NodeId {
        self.info().id
    }
}

/// Required constructor argument at `index`
pub(crate) fn required(info: &ParseInfo, args: &[Option<ExprRef>], index: usize) -> ParseResult<ExprRef> {
    args.get(index).cloned().flatten().ok_or_else(|| {
        ParseError::ArgumentShape(format!(
            "{} is missing argument {}",
            info.method_name(),
            index + 1
        ))
    })
}

/// Check that `expr` is a lambda taking exactly `params` parameters
pub(crate) fn expect_lambda<'e>(
    info: &ParseInfo,
    expr: &'e ExprRef,
    params: usize,
) -> ParseResult<&'e LambdaExpr> {
    match expr.as_ref() {
        Expr::Lambda(lambda) if lambda.params.len() == params => Ok(lambda),
        Expr::Lambda(lambda) => Err(ParseError::ArgumentShape(format!(
            "{} expects a lambda with {} parameter(s), got {}",
            info.method_name(),
            params,
            lambda.params.len()
        ))),
        other => Err(ParseError::ArgumentShape(format!(
            "{} expects a lambda, got '{}'",
            info.method_name(),
            other
        ))),
    }
}

/// Error for resolving through a node that produces no stream
pub(crate) fn not_streaming(info: &ParseInfo) -> ParseError {
    ParseError::NotSupportedOperation(format!(
        "{} does not stream items and cannot be resolved",
        info.method_name()
    ))
}
