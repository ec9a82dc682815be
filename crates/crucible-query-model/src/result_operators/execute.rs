//! In-memory semantics of the result operators.

use crate::error::{ExecutionError, ExecutionResult};
use crate::expr::evaluate::{binary_values, evaluate, invoke_lambda, Bindings};
use crate::expr::{BinaryOp, Expr, ExprRef, ItemType, Value};
use crate::model::QuerySource;
use crate::result_operators::{GroupResultOperator, ResultOperator, StreamedData, StreamedSequence};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::trace;

impl ResultOperator {
    /// Apply this operator to `input`. `bindings` carries the values of any
    /// outer query sources the operands refer to.
    pub fn execute_in_memory(
        &self,
        input: StreamedData,
        bindings: &Bindings,
    ) -> ExecutionResult<StreamedData> {
        let sequence = input.into_sequence(self.name())?;
        trace!(operator = self.name(), items = sequence.items.len(), "executing result operator");

        let StreamedSequence {
            items,
            item_expression,
        } = sequence;

        let collection = |items: Vec<Value>| -> ExecutionResult<StreamedData> {
            Ok(StreamedData::Sequence(StreamedSequence::new(
                items,
                item_expression.clone(),
            )))
        };
        let value = |value: Value| -> ExecutionResult<StreamedData> { Ok(StreamedData::Value(value)) };

        match self {
            ResultOperator::Take { count } => {
                let n = count_operand(count, bindings)?;
                collection(items.into_iter().take(n).collect())
            }
            ResultOperator::Skip { count } => {
                let n = count_operand(count, bindings)?;
                collection(items.into_iter().skip(n).collect())
            }
            ResultOperator::Distinct => collection(distinct(items)),
            ResultOperator::Reverse => collection(items.into_iter().rev().collect()),
            ResultOperator::Cast { item_type } => collection(
                items
                    .into_iter()
                    .map(|item| cast(item, item_type))
                    .collect::<ExecutionResult<_>>()?,
            ),
            ResultOperator::OfType { item_type } => {
                collection(items.into_iter().filter(|item| item_type.accepts(item)).collect())
            }
            ResultOperator::DefaultIfEmpty { default_value } => {
                if !items.is_empty() {
                    return collection(items);
                }
                let default = match default_value {
                    Some(expr) => evaluate(expr, bindings)?,
                    None => item_expression.ty().default_value(),
                };
                collection(vec![default])
            }
            ResultOperator::Concat { source2 } => {
                let mut items = items;
                items.extend(second_sequence(source2, bindings)?);
                collection(items)
            }
            ResultOperator::Union { source2 } => {
                let mut items = items;
                items.extend(second_sequence(source2, bindings)?);
                collection(distinct(items))
            }
            ResultOperator::Except { source2 } => {
                let other: HashSet<Value> = second_sequence(source2, bindings)?.into_iter().collect();
                collection(distinct(items).into_iter().filter(|i| !other.contains(i)).collect())
            }
            ResultOperator::Intersect { source2 } => {
                let other: HashSet<Value> = second_sequence(source2, bindings)?.into_iter().collect();
                collection(distinct(items).into_iter().filter(|i| other.contains(i)).collect())
            }
            ResultOperator::Group(group) => {
                let groups = partition(group, &items, &item_expression, bindings)?;
                Ok(StreamedData::Sequence(StreamedSequence::new(
                    groups,
                    group.reference(),
                )))
            }

            ResultOperator::First {
                return_default_when_empty,
            } => match items.into_iter().next() {
                Some(first) => value(first),
                None => empty_or_default(*return_default_when_empty, &item_expression),
            },
            ResultOperator::Last {
                return_default_when_empty,
            } => match items.into_iter().last() {
                Some(last) => value(last),
                None => empty_or_default(*return_default_when_empty, &item_expression),
            },
            ResultOperator::Single {
                return_default_when_empty,
            } => {
                let mut iter = items.into_iter();
                match (iter.next(), iter.next()) {
                    (Some(only), None) => value(only),
                    (Some(_), Some(_)) => Err(ExecutionError::SequenceHasMultipleElements),
                    (None, _) => empty_or_default(*return_default_when_empty, &item_expression),
                }
            }
            ResultOperator::Min => value(extreme("Min", items, Ordering::Less)?),
            ResultOperator::Max => value(extreme("Max", items, Ordering::Greater)?),

            ResultOperator::Count | ResultOperator::LongCount => value(Value::Int(items.len() as i64)),
            ResultOperator::Any => value(Value::Bool(!items.is_empty())),
            ResultOperator::All { predicate } => {
                for item in &items {
                    let scope = bindings.with_item(&item_expression, item);
                    match evaluate(predicate, &scope)? {
                        Value::Bool(true) => {}
                        Value::Bool(false) => return value(Value::Bool(false)),
                        other => {
                            return Err(ExecutionError::TypeMismatch(format!(
                                "All predicate returned {}",
                                other.type_name()
                            )))
                        }
                    }
                }
                value(Value::Bool(true))
            }
            ResultOperator::Contains { item } => {
                let needle = evaluate(item, bindings)?;
                value(Value::Bool(items.iter().any(|i| i.loosely_equals(&needle))))
            }
            ResultOperator::Sum => value(sum(&items, &item_expression)?),
            ResultOperator::Average => value(average(&items)?),
            ResultOperator::Aggregate { func } => {
                let mut iter = items.into_iter();
                let mut acc = iter.next().ok_or(ExecutionError::SequenceEmpty)?;
                for item in iter {
                    acc = apply_func(func, acc, &item, &item_expression, bindings)?;
                }
                value(acc)
            }
            ResultOperator::AggregateFromSeed {
                seed,
                func,
                result_selector,
            } => {
                let mut acc = evaluate(seed, bindings)?;
                for item in &items {
                    acc = apply_func(func, acc, item, &item_expression, bindings)?;
                }
                match result_selector {
                    Some(selector) => value(call_lambda(selector, &[acc], bindings)?),
                    None => value(acc),
                }
            }
        }
    }
}

fn count_operand(count: &ExprRef, bindings: &Bindings) -> ExecutionResult<usize> {
    let value = evaluate(count, bindings)?;
    let n = value.as_i64().ok_or_else(|| {
        ExecutionError::TypeMismatch(format!("count must be an int, got {}", value.type_name()))
    })?;
    Ok(n.max(0) as usize)
}

/// Order-preserving de-duplication
fn distinct(items: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn second_sequence(source: &ExprRef, bindings: &Bindings) -> ExecutionResult<Vec<Value>> {
    match evaluate(source, bindings)? {
        Value::List(items) => Ok(items),
        Value::Group { elements, .. } => Ok(elements),
        other => Err(ExecutionError::TypeMismatch(format!(
            "expected a sequence operand, got {}",
            other.type_name()
        ))),
    }
}

fn cast(item: Value, item_type: &ItemType) -> ExecutionResult<Value> {
    match (item_type, item) {
        (ItemType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (_, Value::Null) => Ok(Value::Null),
        (ty, item) if ty.accepts(&item) => Ok(item),
        (ty, item) => Err(ExecutionError::TypeMismatch(format!(
            "cannot cast {} to {}",
            item.type_name(),
            ty
        ))),
    }
}

fn empty_or_default(
    return_default_when_empty: bool,
    item_expression: &ExprRef,
) -> ExecutionResult<StreamedData> {
    if return_default_when_empty {
        Ok(StreamedData::Value(item_expression.ty().default_value()))
    } else {
        Err(ExecutionError::SequenceEmpty)
    }
}

/// Partition preserving first-seen key order and element order
fn partition(
    group: &GroupResultOperator,
    items: &[Value],
    item_expression: &ExprRef,
    bindings: &Bindings,
) -> ExecutionResult<Vec<Value>> {
    let mut index: HashMap<Value, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for item in items {
        let scope = bindings.with_item(item_expression, item);
        let key = evaluate(&group.key_selector, &scope)?;
        let element = evaluate(&group.element_selector, &scope)?;
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(element),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![element]));
            }
        }
    }
    Ok(groups
        .into_iter()
        .map(|(key, elements)| Value::Group {
            key: Box::new(key),
            elements,
        })
        .collect())
}

fn ensure_orderable(operator: &'static str, item: &Value) -> ExecutionResult<()> {
    match item {
        Value::Int(_) | Value::Float(_) | Value::String(_) | Value::Null => Ok(()),
        other => Err(ExecutionError::TypeNotSupported {
            operator,
            item_type: other.type_name().to_string(),
        }),
    }
}

fn extreme(operator: &'static str, items: Vec<Value>, wanted: Ordering) -> ExecutionResult<Value> {
    let mut iter = items.into_iter();
    let mut best = iter.next().ok_or(ExecutionError::SequenceEmpty)?;
    ensure_orderable(operator, &best)?;
    for item in iter {
        ensure_orderable(operator, &item)?;
        let ordering = item
            .compare(&best)
            .ok_or_else(|| ExecutionError::TypeNotSupported {
                operator,
                item_type: format!("{} mixed with {}", item.type_name(), best.type_name()),
            })?;
        if ordering == wanted {
            best = item;
        }
    }
    Ok(best)
}

fn ensure_numeric(operator: &'static str, item: &Value) -> ExecutionResult<()> {
    match item {
        Value::Int(_) | Value::Float(_) => Ok(()),
        other => Err(ExecutionError::TypeNotSupported {
            operator,
            item_type: other.type_name().to_string(),
        }),
    }
}

fn sum(items: &[Value], item_expression: &ExprRef) -> ExecutionResult<Value> {
    let zero = match item_expression.ty() {
        ItemType::Float => Value::Float(0.0),
        _ => Value::Int(0),
    };
    items.iter().try_fold(zero, |acc, item| {
        ensure_numeric("Sum", item)?;
        binary_values(BinaryOp::Add, &acc, item)
    })
}

fn average(items: &[Value]) -> ExecutionResult<Value> {
    if items.is_empty() {
        return Err(ExecutionError::SequenceEmpty);
    }
    let mut total = 0.0;
    for item in items {
        ensure_numeric("Average", item)?;
        total += item.as_f64().unwrap_or_default();
    }
    Ok(Value::Float(total / items.len() as f64))
}

fn call_lambda(lambda: &ExprRef, args: &[Value], bindings: &Bindings) -> ExecutionResult<Value> {
    match lambda.as_ref() {
        Expr::Lambda(lambda) => invoke_lambda(lambda, args, bindings),
        other => Err(ExecutionError::ArgumentShape(format!(
            "expected a lambda, got {}",
            other
        ))),
    }
}

/// One accumulation step: the item is bound through back-references, the
/// accumulator through the lambda's single parameter
fn apply_func(
    func: &ExprRef,
    acc: Value,
    item: &Value,
    item_expression: &ExprRef,
    bindings: &Bindings,
) -> ExecutionResult<Value> {
    let scope = bindings.with_item(item_expression, item);
    call_lambda(func, &[acc], &scope)
}
