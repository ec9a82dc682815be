//! Top-level pipeline parser.

use crate::config::ParserOptions;
use crate::error::{ParseError, ParseResult};
use crate::expr::{CallExpr, Expr, ExprRef, ItemType, Parameter};
use crate::model::QueryModel;
use crate::parsing::assembly::ModelAssembly;
use crate::parsing::context::{ClauseGenerationContext, ParseSession};
use crate::parsing::node::{NodeId, NodeKind, ParseInfo, PipelineNode};
use crate::parsing::nodes::MainSourceNode;
use crate::parsing::registry::NodeTypeRegistry;
use crate::syntax::{PipelineSyntax, SourceCatalog};
use std::sync::Arc;
use tracing::{debug, trace};

/// Turns pipeline expressions into query models.
///
/// The parser itself is immutable and can be shared; every `parse` call
/// owns its own node chain, context and resolution cache.
#[derive(Debug, Clone)]
pub struct QueryParser {
    registry: Arc<NodeTypeRegistry>,
    options: ParserOptions,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryParser {
    /// Parser with the built-in combinators and default options
    pub fn new() -> Self {
        Self::with_registry(Arc::new(NodeTypeRegistry::with_defaults()))
    }

    pub fn with_registry(registry: Arc<NodeTypeRegistry>) -> Self {
        Self {
            registry,
            options: ParserOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parse a pipeline expression into a query model
    pub fn parse(&self, expr: &ExprRef) -> ParseResult<QueryModel> {
        debug!(pipeline = %expr, "parsing pipeline");
        let session = ParseSession::new(&self.registry, &self.options);
        let model = session.parse_chain(expr, 0)?;
        debug!(
            model = %model.id(),
            clauses = model.body_clauses.len(),
            operators = model.result_operators.len(),
            "parsed query model"
        );
        Ok(model)
    }

    /// Parse the textual method-chain syntax, resolving free identifiers
    /// against `catalog`
    pub fn parse_text(&self, input: &str, catalog: &SourceCatalog) -> ParseResult<QueryModel> {
        let expr = PipelineSyntax::new(&self.registry).parse(input, catalog)?;
        self.parse(&expr)
    }
}

/// Build the node chain for `expr`, then apply it source-first
pub(crate) fn parse_chain(
    session: &ParseSession<'_>,
    expr: &ExprRef,
    depth: usize,
) -> ParseResult<QueryModel> {
    let mut nodes: Vec<Box<dyn PipelineNode>> = Vec::new();
    build_node(session, expr, None, &ItemType::Unknown, &mut nodes)?;

    let ctx = ClauseGenerationContext::new(session, &nodes, depth);
    let mut assembly = ModelAssembly::new(NodeId(0));
    for node in &nodes {
        match node.kind() {
            NodeKind::Source => {
                node.apply(&mut assembly, &ctx)?;
                assembly.streamed_by(node.id());
            }
            NodeKind::Clause | NodeKind::Projection => {
                assembly.prepare_clause(node.info().require_source()?, &ctx)?;
                node.apply(&mut assembly, &ctx)?;
                assembly.streamed_by(node.id());
            }
            NodeKind::ResultOperator => node.apply(&mut assembly, &ctx)?,
        }
    }
    assembly.finish(&ctx)
}

/// Lambda parameter through which `call` reads its source
fn source_parameter(call: &CallExpr) -> Option<&Parameter> {
    let lambda = call.args.iter().skip(1).find_map(|arg| arg.as_lambda())?;
    if call.method.name == "Aggregate" {
        // (accumulator, item)
        lambda.params.last()
    } else {
        lambda.params.first()
    }
}

/// Recursively create the node for `expr` and its sources; returns its id.
/// `identifier` is the name the consuming step binds this output to.
fn build_node(
    session: &ParseSession<'_>,
    expr: &ExprRef,
    identifier: Option<&str>,
    type_hint: &ItemType,
    nodes: &mut Vec<Box<dyn PipelineNode>>,
) -> ParseResult<NodeId> {
    let call = match expr.as_ref() {
        Expr::Call(call) if session.registry().is_combinator_owner(&call.method.owner) => call,
        _ => {
            let id = NodeId(nodes.len());
            let associated_identifier = identifier
                .map(str::to_string)
                .unwrap_or_else(|| session.generate_identifier());
            let item_type = expr
                .ty()
                .element_type()
                .cloned()
                .unwrap_or_else(|| type_hint.clone());
            trace!(node = %id, identifier = %associated_identifier, "created main source node");
            nodes.push(Box::new(MainSourceNode::new(
                ParseInfo {
                    id,
                    source: None,
                    associated_identifier,
                    call: expr.clone(),
                    type_args: Vec::new(),
                },
                item_type,
            )));
            return Ok(id);
        }
    };

    let node_type = session.registry().get_node_type(expr)?;
    let (source_expr, args) = call
        .args
        .split_first()
        .map(|(source, args)| (source, args.to_vec()))
        .ok_or_else(|| ParseError::ArgumentShape(format!("'{}' has no source step", expr)))?;
    let hint = source_parameter(call);
    let source = build_node(
        session,
        source_expr,
        hint.map(|p| p.name.as_str()),
        hint.map(|p| &p.ty).unwrap_or(&ItemType::Unknown),
        nodes,
    )?;

    let id = NodeId(nodes.len());
    let associated_identifier = identifier
        .map(str::to_string)
        .unwrap_or_else(|| session.generate_identifier());
    trace!(
        node = %id,
        combinator = node_type.name,
        identifier = %associated_identifier,
        "created pipeline node"
    );
    let info = ParseInfo {
        id,
        source: Some(source),
        associated_identifier,
        call: expr.clone(),
        type_args: call.type_args.clone(),
    };
    let node = session.registry().create(&node_type, info, args)?;
    nodes.push(node);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Pipeline, Value};
    use crate::model::BodyClause;

    fn numbers() -> Pipeline {
        Pipeline::list(ItemType::Int, Value::ints(0..10))
    }

    #[test]
    fn test_head_only_chain_is_plain_select() {
        let model = QueryParser::new().parse(&numbers().build()).unwrap();
        assert!(model.body_clauses.is_empty());
        assert!(model.result_operators.is_empty());
        assert_eq!(model.main_from_clause.item_name, "<generated>_0");
        assert_eq!(model.main_from_clause.item_type, ItemType::Int);
    }

    #[test]
    fn test_head_named_by_consumer_parameter() {
        let expr = numbers()
            .call(
                "Where",
                vec![Expr::lambda1("n", |n| {
                    Expr::binary(BinaryOp::LessThan, n, Expr::constant(3i64))
                })],
            )
            .build();
        let model = QueryParser::new().parse(&expr).unwrap();
        assert_eq!(model.main_from_clause.item_name, "n");
        assert_eq!(model.to_string(), "from n in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] where ([n] < 3) select [n]");
    }

    #[test]
    fn test_non_combinator_owner_heads_chain() {
        let head = Expr::call(
            crate::expr::Method::new("Object", "Lookup"),
            Vec::new(),
            vec![Expr::parameter("db")],
        );
        let expr = Pipeline::from_expr(head).call("Count", vec![]).build();
        let model = QueryParser::new().parse(&expr).unwrap();
        assert_eq!(model.main_from_clause.from_expression.to_string(), "db.Lookup()");
    }

    #[test]
    fn test_unsupported_combinator_names_call() {
        let expr = numbers().call("Zip", vec![Expr::parameter("ys")]).build();
        match QueryParser::new().parse(&expr) {
            Err(ParseError::UnsupportedCombinator { call }) => {
                assert_eq!(call, "[0, 1, 2, 3, 4, 5, 6, 7, 8, 9].Zip(ys)")
            }
            other => panic!("expected unsupported combinator, got {:?}", other.map(|m| m.to_string())),
        }
    }

    #[test]
    fn test_then_by_without_order_by_is_rejected() {
        let expr = numbers()
            .call("ThenBy", vec![Expr::lambda1("x", |x| x)])
            .build();
        assert!(matches!(
            QueryParser::new().parse(&expr),
            Err(ParseError::NotSupportedOperation(_))
        ));
    }

    #[test]
    fn test_wrapping_can_be_disabled() {
        let expr = numbers()
            .call("Take", vec![Expr::constant(3i64)])
            .call("Where", vec![Expr::lambda1("x", |x| {
                Expr::binary(BinaryOp::GreaterThan, x, Expr::constant(1i64))
            })])
            .build();
        let options = ParserOptions {
            wrap_after_result_operators: false,
            ..ParserOptions::default()
        };
        let err = QueryParser::new().with_options(options).parse(&expr).unwrap_err();
        assert!(matches!(err, ParseError::NotSupportedOperation(_)));
    }

    #[test]
    fn test_order_then_by_extends_clause() {
        let expr = Pipeline::list(ItemType::record("Person"), Value::list([]))
            .call("OrderBy", vec![Expr::lambda1("p", |p| Expr::member(p, "Last"))])
            .call("ThenByDescending", vec![Expr::lambda1("p", |p| Expr::member(p, "First"))])
            .build();
        let model = QueryParser::new().parse(&expr).unwrap();
        assert_eq!(model.body_clauses.len(), 1);
        match &model.body_clauses[0] {
            BodyClause::OrderBy(order_by) => {
                assert_eq!(order_by.to_string(), "orderby [p].Last asc, [p].First desc")
            }
            other => panic!("expected orderby, got {}", other),
        }
    }
}
