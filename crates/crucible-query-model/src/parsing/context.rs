//! Per-parse state and the resolver.
//!
//! A [`ParseSession`] lives for one top-level `parse` call and is shared by
//! every nested chain discovered along the way. Each chain gets its own
//! [`ClauseGenerationContext`]: the node arena, the node-to-clause map, the
//! resolution cache and the models discovered while resolving.

use crate::config::ParserOptions;
use crate::error::{ParseError, ParseResult};
use crate::expr::{
    identity, replace_parameter, replace_parameters, Expr, ExprRef, Parameter, QuerySourceRef,
};
use crate::model::{ModelId, QueryModel};
use crate::parsing::discovery::discover_sub_pipelines;
use crate::parsing::node::{NodeId, NodeKind, PipelineNode};
use crate::parsing::parser::parse_chain;
use crate::parsing::registry::NodeTypeRegistry;
use crate::parsing::transparent::remove_transparent_identifiers;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the placeholder parameter used to ask a node for its own output
const IDENTITY_PARAMETER: &str = "<identity>";

/// State shared by one top-level parse and all chains nested in it
pub struct ParseSession<'a> {
    registry: &'a NodeTypeRegistry,
    options: &'a ParserOptions,
    generated: Cell<usize>,
}

impl<'a> ParseSession<'a> {
    pub fn new(registry: &'a NodeTypeRegistry, options: &'a ParserOptions) -> Self {
        Self {
            registry,
            options,
            generated: Cell::new(0),
        }
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        self.registry
    }

    pub fn options(&self) -> &ParserOptions {
        self.options
    }

    /// Fresh item name for a step no lambda parameter names
    pub fn generate_identifier(&self) -> String {
        let n = self.generated.get();
        self.generated.set(n + 1);
        format!("{}{}", self.options.generated_identifier_prefix, n)
    }

    /// Parse one chain into a model; `depth` counts enclosing chains
    pub fn parse_chain(&self, expr: &ExprRef, depth: usize) -> ParseResult<QueryModel> {
        if depth > self.options.max_nesting_depth {
            return Err(ParseError::NotSupportedOperation(format!(
                "nested pipelines deeper than {} levels",
                self.options.max_nesting_depth
            )));
        }
        parse_chain(self, expr, depth)
    }
}

/// Per-chain state threaded through resolution and clause assembly
pub struct ClauseGenerationContext<'a> {
    session: &'a ParseSession<'a>,
    nodes: &'a [Box<dyn PipelineNode>],
    depth: usize,
    clause_map: RefCell<HashMap<NodeId, QuerySourceRef>>,
    /// Keyed by requester, expression pointer and the node the expression
    /// reads through. The key expression is kept alive next to the result
    /// so the pointer cannot be reused.
    cache: RefCell<HashMap<(NodeId, usize, Option<NodeId>), (ExprRef, ExprRef)>>,
    discovered: RefCell<Vec<Arc<QueryModel>>>,
}

impl<'a> ClauseGenerationContext<'a> {
    pub fn new(
        session: &'a ParseSession<'a>,
        nodes: &'a [Box<dyn PipelineNode>],
        depth: usize,
    ) -> Self {
        Self {
            session,
            nodes,
            depth,
            clause_map: RefCell::new(HashMap::new()),
            cache: RefCell::new(HashMap::new()),
            discovered: RefCell::new(Vec::new()),
        }
    }

    pub fn session(&self) -> &ParseSession<'a> {
        self.session
    }

    pub fn options(&self) -> &ParserOptions {
        self.session.options()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn node(&self, id: NodeId) -> ParseResult<&dyn PipelineNode> {
        self.nodes
            .get(id.0)
            .map(|node| node.as_ref())
            .ok_or_else(|| ParseError::NotSupportedOperation(format!("unknown pipeline {}", id)))
    }

    /// Record the query source a node materialized as
    pub fn add_clause_mapping(&self, node: NodeId, reference: QuerySourceRef) -> ParseResult<()> {
        let mut map = self.clause_map.borrow_mut();
        if map.contains_key(&node) {
            return Err(ParseError::DuplicateClauseMapping(node.0));
        }
        map.insert(node, reference);
        Ok(())
    }

    /// Point a node at the head of a model that replaced everything up to it
    pub(crate) fn redirect_clause_mapping(&self, node: NodeId, reference: QuerySourceRef) {
        self.clause_map.borrow_mut().insert(node, reference);
    }

    pub fn clause_mapping(&self, node: NodeId) -> Option<QuerySourceRef> {
        self.clause_map.borrow().get(&node).cloned()
    }

    /// Back-reference for a node that must already have been applied
    pub fn require_clause_reference(&self, node: NodeId) -> ParseResult<ExprRef> {
        self.clause_mapping(node)
            .map(|reference| Arc::new(Expr::QuerySource(reference)))
            .ok_or_else(|| {
                ParseError::NotSupportedOperation(format!(
                    "{} is referenced before its clause exists",
                    node
                ))
            })
    }

    /// Substitute `input` in `expr` with the output of `node`
    pub fn resolve_in(&self, node: NodeId, input: &Parameter, expr: &ExprRef) -> ParseResult<ExprRef> {
        let node = self.node(node)?;
        if matches!(node.kind(), NodeKind::Source | NodeKind::ResultOperator) {
            if let Some(reference) = self.clause_mapping(node.id()) {
                return Ok(replace_parameter(
                    expr,
                    input,
                    &Arc::new(Expr::QuerySource(reference)),
                ));
            }
        }
        node.resolve(input, expr, self)
    }

    /// Memoized resolution. `compute` runs at most once per requester, key
    /// and source; its output is cleaned of carrier accesses and nested
    /// chains.
    pub fn resolve_cached(
        &self,
        requester: NodeId,
        key: &ExprRef,
        through: Option<NodeId>,
        compute: impl FnOnce() -> ParseResult<ExprRef>,
    ) -> ParseResult<ExprRef> {
        let cache_key = (requester, identity(key), through);
        let cached = self
            .cache
            .borrow()
            .get(&cache_key)
            .map(|(_, resolved)| resolved.clone());
        if let Some(resolved) = cached {
            return Ok(resolved);
        }

        let resolved = compute()?;
        let resolved = remove_transparent_identifiers(&resolved);
        let resolved = discover_sub_pipelines(self, &resolved)?;
        self.cache
            .borrow_mut()
            .insert(cache_key, (key.clone(), resolved.clone()));
        Ok(resolved)
    }

    /// Resolve a lambda's body. With a source, the first parameter stands
    /// for the source's output and `bound` replaces the rest; without one,
    /// `bound` replaces every parameter.
    pub fn resolve_lambda(
        &self,
        requester: NodeId,
        source: Option<NodeId>,
        lambda: &ExprRef,
        bound: &[ExprRef],
    ) -> ParseResult<ExprRef> {
        self.resolve_cached(requester, lambda, source, || {
            let function = match lambda.as_ref() {
                Expr::Lambda(function) => function,
                other => {
                    return Err(ParseError::ArgumentShape(format!(
                        "expected a lambda, got '{}'",
                        other
                    )))
                }
            };
            let (streamed, rest) = match source {
                Some(source) => match function.params.split_first() {
                    Some((first, rest)) => (Some((source, first)), rest),
                    None => {
                        return Err(ParseError::ArgumentShape(format!(
                            "'{}' takes no parameter for its input",
                            lambda
                        )))
                    }
                },
                None => (None, function.params.as_slice()),
            };
            if rest.len() != bound.len() {
                return Err(ParseError::ArgumentShape(format!(
                    "'{}' takes {} parameter(s), expected {}",
                    lambda,
                    function.params.len(),
                    bound.len() + usize::from(streamed.is_some())
                )));
            }

            let mut body = function.body.clone();
            if let Some((source, param)) = streamed {
                body = self.resolve_in(source, param, &body)?;
            }
            let replacements: Vec<(&Parameter, &ExprRef)> = rest.iter().zip(bound).collect();
            if !replacements.is_empty() {
                body = replace_parameters(&body, &replacements);
            }
            Ok(body)
        })
    }

    /// Output of `node` expressed through materialized clauses
    pub fn resolve_identity(&self, node: NodeId) -> ParseResult<ExprRef> {
        let placeholder = Parameter::new(IDENTITY_PARAMETER);
        self.resolve_in(node, &placeholder, &placeholder.expr())
    }

    /// Prepare a non-lambda operand: nested chains become sub-queries
    pub fn process_argument(&self, expr: &ExprRef) -> ParseResult<ExprRef> {
        discover_sub_pipelines(self, expr)
    }

    pub(crate) fn register_discovered(&self, model: Arc<QueryModel>) {
        self.discovered.borrow_mut().push(model);
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.borrow().len()
    }

    /// Attach every model discovered so far to `parent`
    pub(crate) fn adopt_discovered(&self, parent: ModelId) -> ParseResult<()> {
        let discovered: Vec<Arc<QueryModel>> = self.discovered.borrow_mut().drain(..).collect();
        for model in discovered {
            model.set_parent(parent)?;
        }
        Ok(())
    }
}
