//! Built-in pipeline node families.

mod filter;
mod group_by;
mod join;
mod ordering;
mod result;
mod select;
mod source;

pub use filter::WhereNode;
pub use group_by::GroupByNode;
pub use join::{GroupJoinNode, JoinNode};
pub use ordering::OrderingNode;
pub use result::ResultOperatorNode;
pub use select::{SelectManyNode, SelectNode};
pub use source::MainSourceNode;

use crate::parsing::registry::{MethodSignature, NodeConstructor, NodeType, NodeTypeRegistry};

/// Register every built-in combinator under `owner`
pub(crate) fn register_defaults(registry: &mut NodeTypeRegistry, owner: &str) {
    let mut add = Registrar { registry, owner };
    add.node("Where", &[1], 1, WhereNode::construct);
    add.node("Select", &[1], 1, SelectNode::construct);
    add.node("SelectMany", &[1, 2], 2, SelectManyNode::construct);
    add.node("OrderBy", &[1], 1, OrderingNode::order_by);
    add.node("OrderByDescending", &[1], 1, OrderingNode::order_by_descending);
    add.node("ThenBy", &[1], 1, OrderingNode::then_by);
    add.node("ThenByDescending", &[1], 1, OrderingNode::then_by_descending);
    add.node("Join", &[4], 4, JoinNode::construct);
    add.node("GroupJoin", &[4], 4, GroupJoinNode::construct);
    add.node("GroupBy", &[1, 2], 2, GroupByNode::construct);
    add.node("Take", &[1], 1, ResultOperatorNode::take);
    add.node("Skip", &[1], 1, ResultOperatorNode::skip);
    add.node("Distinct", &[0], 0, ResultOperatorNode::distinct);
    add.node("Reverse", &[0], 0, ResultOperatorNode::reverse);
    add.node("Cast", &[0], 0, ResultOperatorNode::cast);
    add.node("OfType", &[0], 0, ResultOperatorNode::of_type);
    add.node("DefaultIfEmpty", &[0, 1], 1, ResultOperatorNode::default_if_empty);
    add.node("Contains", &[1], 1, ResultOperatorNode::contains);
    add.node("Except", &[1], 1, ResultOperatorNode::except);
    add.node("Intersect", &[1], 1, ResultOperatorNode::intersect);
    add.node("Union", &[1], 1, ResultOperatorNode::union);
    add.node("Concat", &[1], 1, ResultOperatorNode::concat);
    add.node("Count", &[0, 1], 1, ResultOperatorNode::count);
    add.node("LongCount", &[0, 1], 1, ResultOperatorNode::long_count);
    add.node("Any", &[0, 1], 1, ResultOperatorNode::any);
    add.node("All", &[1], 1, ResultOperatorNode::all);
    add.node("First", &[0, 1], 1, ResultOperatorNode::first);
    add.node("FirstOrDefault", &[0, 1], 1, ResultOperatorNode::first_or_default);
    add.node("Last", &[0, 1], 1, ResultOperatorNode::last);
    add.node("LastOrDefault", &[0, 1], 1, ResultOperatorNode::last_or_default);
    add.node("Single", &[0, 1], 1, ResultOperatorNode::single);
    add.node("SingleOrDefault", &[0, 1], 1, ResultOperatorNode::single_or_default);
    add.node("Min", &[0, 1], 1, ResultOperatorNode::min);
    add.node("Max", &[0, 1], 1, ResultOperatorNode::max);
    add.node("Sum", &[0, 1], 1, ResultOperatorNode::sum);
    add.node("Average", &[0, 1], 1, ResultOperatorNode::average);
    add.node("Aggregate", &[1], 1, ResultOperatorNode::aggregate);
    add.node("Aggregate", &[2, 3], 3, ResultOperatorNode::aggregate_from_seed);
}

struct Registrar<'r> {
    registry: &'r mut NodeTypeRegistry,
    owner: &'r str,
}

impl Registrar<'_> {
    /// Map `name` at each accepted argument count to one node type
    fn node(
        &mut self,
        name: &'static str,
        argument_counts: &[usize],
        parameter_count: usize,
        construct: NodeConstructor,
    ) {
        let node_type = NodeType::new(name, parameter_count, construct);
        for &count in argument_counts {
            self.registry
                .register(MethodSignature::new(self.owner, name, count), node_type);
        }
    }
}
