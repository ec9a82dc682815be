//! Result operators: post-processing steps applied after the clause chain.
//!
//! Each operator declares how it shapes its input ([`ExecutionStrategy`]),
//! what it produces ([`ResultOperator::output_type`]) and how it runs over
//! in-memory data (see `execute`).

mod execute;
mod streamed;

pub use streamed::{StreamedData, StreamedSequence};

use crate::expr::{Expr, ExprRef, ItemType};
use crate::model::ExprRewriter;
use crate::model::visitor::QueryModelVisitor;
use crate::model::{CloneContext, QueryModel, QuerySource, SourceId};
use std::fmt;

/// How an operator reshapes the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Sequence in, sequence out
    Collection,
    /// Sequence in, one element out
    Single { return_default_when_empty: bool },
    /// Sequence in, one computed value out
    Scalar,
}

/// `GroupBy` as an operator. Its output is a named query source that later
/// steps can reference once the model is wrapped.
#[derive(Debug, Clone)]
pub struct GroupResultOperator {
    pub id: SourceId,
    pub item_name: String,
    /// `grouping<key, element>`
    pub item_type: ItemType,
    pub key_selector: ExprRef,
    pub element_selector: ExprRef,
}

impl GroupResultOperator {
    pub fn new(item_name: impl Into<String>, key_selector: ExprRef, element_selector: ExprRef) -> Self {
        let item_type = ItemType::grouping(key_selector.ty(), element_selector.ty());
        Self::with_id(SourceId::next(), item_name, item_type, key_selector, element_selector)
    }

    pub fn with_id(
        id: SourceId,
        item_name: impl Into<String>,
        item_type: ItemType,
        key_selector: ExprRef,
        element_selector: ExprRef,
    ) -> Self {
        Self {
            id,
            item_name: item_name.into(),
            item_type,
            key_selector,
            element_selector,
        }
    }
}

impl QuerySource for GroupResultOperator {
    fn id(&self) -> SourceId {
        self.id
    }

    fn item_name(&self) -> &str {
        &self.item_name
    }

    fn item_type(&self) -> &ItemType {
        &self.item_type
    }
}

/// Operand expressions are fully resolved: selectors and predicates refer to
/// clause outputs through back-references, and `func` lambdas keep only
/// their accumulator parameter.
#[derive(Debug, Clone)]
pub enum ResultOperator {
    Aggregate {
        func: ExprRef,
    },
    AggregateFromSeed {
        seed: ExprRef,
        func: ExprRef,
        result_selector: Option<ExprRef>,
    },
    All {
        predicate: ExprRef,
    },
    Any,
    Average,
    Cast {
        item_type: ItemType,
    },
    Concat {
        source2: ExprRef,
    },
    Contains {
        item: ExprRef,
    },
    Count,
    DefaultIfEmpty {
        default_value: Option<ExprRef>,
    },
    Distinct,
    Except {
        source2: ExprRef,
    },
    First {
        return_default_when_empty: bool,
    },
    Group(GroupResultOperator),
    Intersect {
        source2: ExprRef,
    },
    Last {
        return_default_when_empty: bool,
    },
    LongCount,
    Max,
    Min,
    OfType {
        item_type: ItemType,
    },
    Reverse,
    Single {
        return_default_when_empty: bool,
    },
    Skip {
        count: ExprRef,
    },
    Sum,
    Take {
        count: ExprRef,
    },
    Union {
        source2: ExprRef,
    },
}

impl ResultOperator {
    pub fn name(&self) -> &'static str {
        match self {
            ResultOperator::Aggregate { .. } | ResultOperator::AggregateFromSeed { .. } => "Aggregate",
            ResultOperator::All { .. } => "All",
            ResultOperator::Any => "Any",
            ResultOperator::Average => "Average",
            ResultOperator::Cast { .. } => "Cast",
            ResultOperator::Concat { .. } => "Concat",
            ResultOperator::Contains { .. } => "Contains",
            ResultOperator::Count => "Count",
            ResultOperator::DefaultIfEmpty { .. } => "DefaultIfEmpty",
            ResultOperator::Distinct => "Distinct",
            ResultOperator::Except { .. } => "Except",
            ResultOperator::First { .. } => "First",
            ResultOperator::Group(_) => "Group",
            ResultOperator::Intersect { .. } => "Intersect",
            ResultOperator::Last { .. } => "Last",
            ResultOperator::LongCount => "LongCount",
            ResultOperator::Max => "Max",
            ResultOperator::Min => "Min",
            ResultOperator::OfType { .. } => "OfType",
            ResultOperator::Reverse => "Reverse",
            ResultOperator::Single { .. } => "Single",
            ResultOperator::Skip { .. } => "Skip",
            ResultOperator::Sum => "Sum",
            ResultOperator::Take { .. } => "Take",
            ResultOperator::Union { .. } => "Union",
        }
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        match self {
            ResultOperator::First {
                return_default_when_empty,
            }
            | ResultOperator::Last {
                return_default_when_empty,
            }
            | ResultOperator::Single {
                return_default_when_empty,
            } => ExecutionStrategy::Single {
                return_default_when_empty: *return_default_when_empty,
            },
            ResultOperator::Min | ResultOperator::Max => ExecutionStrategy::Single {
                return_default_when_empty: false,
            },
            ResultOperator::Aggregate { .. }
            | ResultOperator::AggregateFromSeed { .. }
            | ResultOperator::All { .. }
            | ResultOperator::Any
            | ResultOperator::Average
            | ResultOperator::Contains { .. }
            | ResultOperator::Count
            | ResultOperator::LongCount
            | ResultOperator::Sum => ExecutionStrategy::Scalar,
            ResultOperator::Cast { .. }
            | ResultOperator::Concat { .. }
            | ResultOperator::DefaultIfEmpty { .. }
            | ResultOperator::Distinct
            | ResultOperator::Except { .. }
            | ResultOperator::Group(_)
            | ResultOperator::Intersect { .. }
            | ResultOperator::OfType { .. }
            | ResultOperator::Reverse
            | ResultOperator::Skip { .. }
            | ResultOperator::Take { .. }
            | ResultOperator::Union { .. } => ExecutionStrategy::Collection,
        }
    }

    /// Result shape given the shape of the operator's input
    pub fn output_type(&self, input: &ItemType) -> ItemType {
        let element = input.element_type().cloned().unwrap_or_default();
        match self {
            ResultOperator::Cast { item_type } | ResultOperator::OfType { item_type } => {
                ItemType::sequence(item_type.clone())
            }
            ResultOperator::Group(group) => ItemType::sequence(group.item_type.clone()),
            ResultOperator::Count | ResultOperator::LongCount => ItemType::Int,
            ResultOperator::Any | ResultOperator::All { .. } | ResultOperator::Contains { .. } => {
                ItemType::Bool
            }
            ResultOperator::Average => ItemType::Float,
            ResultOperator::Sum if !element.is_known() => ItemType::Int,
            ResultOperator::Aggregate { func } => match func.ty() {
                ItemType::Unknown => element,
                ty => ty,
            },
            ResultOperator::AggregateFromSeed {
                seed,
                func,
                result_selector,
            } => match result_selector {
                Some(selector) => selector.ty(),
                None => match func.ty() {
                    ItemType::Unknown => seed.ty(),
                    ty => ty,
                },
            },
            _ => match self.strategy() {
                ExecutionStrategy::Collection => input.clone(),
                ExecutionStrategy::Single { .. } | ExecutionStrategy::Scalar => element,
            },
        }
    }

    /// The operator as a named output, if it is one
    pub fn as_query_source(&self) -> Option<&dyn QuerySource> {
        match self {
            ResultOperator::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Owned operand expressions, in declaration order
    pub fn expressions(&self) -> Vec<&ExprRef> {
        match self {
            ResultOperator::Aggregate { func } => vec![func],
            ResultOperator::AggregateFromSeed {
                seed,
                func,
                result_selector,
            } => {
                let mut exprs = vec![seed, func];
                exprs.extend(result_selector.iter());
                exprs
            }
            ResultOperator::All { predicate } => vec![predicate],
            ResultOperator::Concat { source2 }
            | ResultOperator::Except { source2 }
            | ResultOperator::Intersect { source2 }
            | ResultOperator::Union { source2 } => vec![source2],
            ResultOperator::Contains { item } => vec![item],
            ResultOperator::DefaultIfEmpty { default_value } => default_value.iter().collect(),
            ResultOperator::Group(group) => vec![&group.key_selector, &group.element_selector],
            ResultOperator::Skip { count } | ResultOperator::Take { count } => vec![count],
            _ => Vec::new(),
        }
    }

    pub fn accept<V: QueryModelVisitor + ?Sized>(
        &self,
        visitor: &mut V,
        model: &QueryModel,
        index: usize,
    ) -> Result<(), V::Error> {
        visitor.visit_result_operator(self, model, index)
    }

    /// Rewrite every owned expression with `f`, keeping untouched ones shared
    pub fn transform_expressions(&mut self, f: &mut ExprRewriter<'_>) {
        match self {
            ResultOperator::Aggregate { func } => *func = f(func),
            ResultOperator::AggregateFromSeed {
                seed,
                func,
                result_selector,
            } => {
                *seed = f(seed);
                *func = f(func);
                if let Some(selector) = result_selector {
                    *selector = f(selector);
                }
            }
            ResultOperator::All { predicate } => *predicate = f(predicate),
            ResultOperator::Concat { source2 }
            | ResultOperator::Except { source2 }
            | ResultOperator::Intersect { source2 }
            | ResultOperator::Union { source2 } => *source2 = f(source2),
            ResultOperator::Contains { item } => *item = f(item),
            ResultOperator::DefaultIfEmpty { default_value } => {
                if let Some(value) = default_value {
                    *value = f(value);
                }
            }
            ResultOperator::Group(group) => {
                group.key_selector = f(&group.key_selector);
                group.element_selector = f(&group.element_selector);
            }
            ResultOperator::Skip { count } | ResultOperator::Take { count } => *count = f(count),
            _ => {}
        }
    }

    /// Clone for a cloned model. A group operator gets a fresh id, registered
    /// in `ctx` before its selectors are adjusted.
    pub fn clone_with(&self, ctx: &mut CloneContext) -> ResultOperator {
        let mut clone = self.clone();
        if let (ResultOperator::Group(original), ResultOperator::Group(group)) = (self, &mut clone) {
            group.id = SourceId::next();
            ctx.register(original, &*group);
        }
        clone.transform_expressions(&mut |e| ctx.adjust_expression(e));
        clone
    }
}

fn write_or_default(f: &mut fmt::Formatter<'_>, name: &str, or_default: bool) -> fmt::Result {
    if or_default {
        write!(f, "{}OrDefault()", name)
    } else {
        write!(f, "{}()", name)
    }
}

impl fmt::Display for ResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultOperator::Aggregate { func } => write!(f, "Aggregate({})", func),
            ResultOperator::AggregateFromSeed {
                seed,
                func,
                result_selector,
            } => {
                write!(f, "Aggregate({}, {}", seed, func)?;
                if let Some(selector) = result_selector {
                    write!(f, ", {}", selector)?;
                }
                write!(f, ")")
            }
            ResultOperator::All { predicate } => write!(f, "All({})", predicate),
            ResultOperator::Cast { item_type } | ResultOperator::OfType { item_type } => {
                write!(f, "{}<{}>()", self.name(), item_type)
            }
            ResultOperator::Concat { source2 }
            | ResultOperator::Except { source2 }
            | ResultOperator::Intersect { source2 }
            | ResultOperator::Union { source2 } => write!(f, "{}({})", self.name(), source2),
            ResultOperator::Contains { item } => write!(f, "Contains({})", item),
            ResultOperator::DefaultIfEmpty {
                default_value: Some(value),
            } => write!(f, "DefaultIfEmpty({})", value),
            ResultOperator::First {
                return_default_when_empty,
            }
            | ResultOperator::Last {
                return_default_when_empty,
            }
            | ResultOperator::Single {
                return_default_when_empty,
            } => write_or_default(f, self.name(), *return_default_when_empty),
            ResultOperator::Group(group) => {
                write!(f, "Group({}, {})", group.key_selector, group.element_selector)
            }
            ResultOperator::Skip { count } | ResultOperator::Take { count } => {
                write!(f, "{}({})", self.name(), count)
            }
            _ => write!(f, "{}()", self.name()),
        }
    }
}

impl ResultOperator {
    /// Convenience for `Take` with a constant count
    pub fn take(count: i64) -> Self {
        ResultOperator::Take {
            count: Expr::constant(count),
        }
    }

    /// Convenience for `Skip` with a constant count
    pub fn skip(count: i64) -> Self {
        ResultOperator::Skip {
            count: Expr::constant(count),
        }
    }
}
