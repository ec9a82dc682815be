//! Combinator signature registry and node factory.
//!
//! A [`NodeTypeRegistry`] maps a normalized call signature (owner, method
//! name, argument count after the source) to the [`NodeType`] that
//! interprets it. Generic item types never take part in the key.

use crate::error::{ParseError, ParseResult};
use crate::expr::{Expr, ExprRef, QUERY_OWNER, SEQUENCE_OWNER};
use crate::parsing::node::{ParseInfo, PipelineNode};
use crate::parsing::nodes;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::trace;

/// The single constructor of a node type. Receives the call metadata and
/// exactly `parameter_count` arguments, missing trailing ones as `None`.
pub type NodeConstructor =
    fn(ParseInfo, Vec<Option<ExprRef>>) -> ParseResult<Box<dyn PipelineNode>>;

/// A node implementation the registry can dispatch to
#[derive(Clone, Copy)]
pub struct NodeType {
    pub name: &'static str,
    /// Constructor arguments after the call metadata
    pub parameter_count: usize,
    pub construct: NodeConstructor,
}

impl NodeType {
    pub const fn new(name: &'static str, parameter_count: usize, construct: NodeConstructor) -> Self {
        Self {
            name,
            parameter_count,
            construct,
        }
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("name", &self.name)
            .field("parameter_count", &self.parameter_count)
            .finish()
    }
}

/// Normalized call-site key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub owner: String,
    pub name: String,
    /// Arguments after the source step
    pub argument_count: usize,
}

impl MethodSignature {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, argument_count: usize) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            argument_count,
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.owner, self.name, self.argument_count)
    }
}

/// Signature to node type map
#[derive(Debug, Default)]
pub struct NodeTypeRegistry {
    types: HashMap<MethodSignature, NodeType>,
    owners: HashSet<String>,
}

impl NodeTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in combinator under the `Query` and
    /// `Sequence` owners
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for owner in [QUERY_OWNER, SEQUENCE_OWNER] {
            nodes::register_defaults(&mut registry, owner);
        }
        registry
    }

    /// Map `signature` to `node_type`, replacing an earlier mapping
    pub fn register(&mut self, signature: MethodSignature, node_type: NodeType) {
        trace!(%signature, node = node_type.name, "registering combinator");
        self.owners.insert(signature.owner.clone());
        self.types.insert(signature, node_type);
    }

    /// Whether calls on `owner` are combinators rather than plain methods
    pub fn is_combinator_owner(&self, owner: &str) -> bool {
        self.owners.contains(owner)
    }

    pub fn contains(&self, signature: &MethodSignature) -> bool {
        self.types.contains_key(signature)
    }

    /// Whether `name` is registered under `owner` at any argument count
    pub fn has_combinator(&self, owner: &str, name: &str) -> bool {
        self.types
            .keys()
            .any(|signature| signature.owner == owner && signature.name == name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Node type for a combinator call expression
    pub fn get_node_type(&self, expr: &ExprRef) -> ParseResult<NodeType> {
        let unsupported = || ParseError::UnsupportedCombinator {
            call: expr.to_string(),
        };
        let call = match expr.as_ref() {
            Expr::Call(call) if !call.args.is_empty() => call,
            _ => return Err(unsupported()),
        };
        let signature = MethodSignature::new(
            call.method.owner.as_str(),
            call.method.name.as_str(),
            call.args.len() - 1,
        );
        self.types.get(&signature).copied().ok_or_else(unsupported)
    }

    /// Build a node, padding missing trailing arguments with `None`
    pub fn create(
        &self,
        node_type: &NodeType,
        info: ParseInfo,
        args: Vec<ExprRef>,
    ) -> ParseResult<Box<dyn PipelineNode>> {
        if args.len() > node_type.parameter_count {
            return Err(ParseError::ArgumentShape(format!(
                "{} accepts at most {} argument(s), got {}",
                node_type.name,
                node_type.parameter_count,
                args.len()
            )));
        }
        let mut padded: Vec<Option<ExprRef>> = args.into_iter().map(Some).collect();
        padded.resize(node_type.parameter_count, None);
        (node_type.construct)(info, padded)
    }
}

/// Builder for ergonomic registry construction
pub struct NodeTypeRegistryBuilder {
    registry: NodeTypeRegistry,
}

impl Default for NodeTypeRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTypeRegistryBuilder {
    pub fn new() -> Self {
        Self {
            registry: NodeTypeRegistry::new(),
        }
    }

    /// Add the built-in combinators for `owner`
    pub fn with_defaults_for(mut self, owner: &str) -> Self {
        nodes::register_defaults(&mut self.registry, owner);
        self
    }

    /// Add the built-in combinators for both default owners
    pub fn with_defaults(self) -> Self {
        self.with_defaults_for(QUERY_OWNER)
            .with_defaults_for(SEQUENCE_OWNER)
    }

    /// Map one extra signature
    pub fn with_node_type(mut self, signature: MethodSignature, node_type: NodeType) -> Self {
        self.registry.register(signature, node_type);
        self
    }

    /// Build the registry
    pub fn build(self) -> NodeTypeRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ItemType, Pipeline};
    use crate::parsing::node::{NodeId, NodeKind};
    use test_case::test_case;

    fn info(call: ExprRef) -> ParseInfo {
        ParseInfo {
            id: NodeId(1),
            source: Some(NodeId(0)),
            associated_identifier: "x".into(),
            call,
            type_args: Vec::new(),
        }
    }

    fn numbers() -> Pipeline {
        Pipeline::table("numbers", ItemType::Int)
    }

    #[test_case("Where", 1 ; "filter")]
    #[test_case("Select", 1 ; "projection")]
    #[test_case("SelectMany", 2 ; "flatten with result selector")]
    #[test_case("Join", 4 ; "join")]
    #[test_case("GroupBy", 2 ; "group with element selector")]
    #[test_case("Count", 0 ; "count")]
    #[test_case("Count", 1 ; "count with predicate")]
    #[test_case("Aggregate", 3 ; "seeded aggregate with result selector")]
    fn test_default_signatures(name: &str, argument_count: usize) {
        let registry = NodeTypeRegistry::with_defaults();
        for owner in [QUERY_OWNER, SEQUENCE_OWNER] {
            assert!(registry.contains(&MethodSignature::new(owner, name, argument_count)));
        }
    }

    #[test]
    fn test_unregistered_call_is_unsupported() {
        let registry = NodeTypeRegistry::with_defaults();
        let call = numbers().call("Zip", vec![Expr::parameter("others")]).build();
        let err = registry.get_node_type(&call).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnsupportedCombinator {
                call: "numbers.Zip(others)".into()
            }
        );
    }

    #[test]
    fn test_wrong_arity_is_unsupported() {
        let registry = NodeTypeRegistry::with_defaults();
        let call = numbers().call("Distinct", vec![Expr::constant(1i64)]).build();
        assert!(matches!(
            registry.get_node_type(&call),
            Err(ParseError::UnsupportedCombinator { .. })
        ));
    }

    #[test]
    fn test_type_args_do_not_affect_lookup() {
        let registry = NodeTypeRegistry::with_defaults();
        let call = numbers()
            .call_typed("Cast", vec![ItemType::Float], vec![])
            .build();
        assert_eq!(registry.get_node_type(&call).unwrap().name, "Cast");
    }

    #[test]
    fn test_create_pads_missing_arguments() {
        let registry = NodeTypeRegistry::with_defaults();
        let call = numbers().call("DefaultIfEmpty", vec![]).build();
        let node_type = registry.get_node_type(&call).unwrap();
        let node = registry.create(&node_type, info(call), Vec::new()).unwrap();
        assert_eq!(node.kind(), NodeKind::ResultOperator);
    }

    #[test]
    fn test_create_rejects_extra_arguments() {
        let registry = NodeTypeRegistry::with_defaults();
        let call = numbers().call("Distinct", vec![]).build();
        let node_type = registry.get_node_type(&call).unwrap();
        let err = registry
            .create(&node_type, info(call), vec![Expr::constant(1i64)])
            .unwrap_err();
        assert!(matches!(err, ParseError::ArgumentShape(_)));
    }

    #[test]
    fn test_builder_adds_custom_signature() {
        let where_type = NodeTypeRegistry::with_defaults()
            .get_node_type(&numbers().call("Where", vec![Expr::constant(true)]).build())
            .unwrap();
        let registry = NodeTypeRegistryBuilder::new()
            .with_node_type(MethodSignature::new("Graph", "Filter", 1), where_type)
            .build();
        assert_eq!(registry.len(), 1);
        assert!(registry.is_combinator_owner("Graph"));
        assert!(!registry.is_combinator_owner(QUERY_OWNER));
    }
}
