//! Data flowing between result operators during in-memory execution.

use crate::error::{ExecutionError, ExecutionResult};
use crate::expr::{ExprRef, Value};

/// A sequence of elements plus the expression that produced each element.
///
/// `item_expression` lets later operators reverse-resolve back-references
/// in their own selectors against each element.
#[derive(Debug, Clone)]
pub struct StreamedSequence {
    pub items: Vec<Value>,
    pub item_expression: ExprRef,
}

impl StreamedSequence {
    pub fn new(items: Vec<Value>, item_expression: ExprRef) -> Self {
        Self {
            items,
            item_expression,
        }
    }
}

/// Output of a query step: still a sequence, or already reduced to a value
#[derive(Debug, Clone)]
pub enum StreamedData {
    Sequence(StreamedSequence),
    Value(Value),
}

impl StreamedData {
    /// Collapse into a plain value; sequences become lists
    pub fn into_value(self) -> Value {
        match self {
            StreamedData::Sequence(sequence) => Value::List(sequence.items),
            StreamedData::Value(value) => value,
        }
    }

    pub fn into_sequence(self, operator: &str) -> ExecutionResult<StreamedSequence> {
        match self {
            StreamedData::Sequence(sequence) => Ok(sequence),
            StreamedData::Value(value) => Err(ExecutionError::TypeMismatch(format!(
                "{} expects a sequence but received a single {}",
                operator,
                value.type_name()
            ))),
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, StreamedData::Sequence(_))
    }
}
