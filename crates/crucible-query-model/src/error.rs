//! Error types for pipeline parsing, model manipulation and in-memory execution.

use thiserror::Error;

/// Errors raised while turning a pipeline expression into a query model.
///
/// All of these are hard failures: the parser never returns a partial model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// A combinator call site matched no registered signature
    #[error("Could not parse expression '{call}': this overload of the combinator is not supported")]
    UnsupportedCombinator { call: String },

    /// A capability was requested from a node that lacks it
    #[error("Operation not supported: {0}")]
    NotSupportedOperation(String),

    /// Two query sources in the same model share an item name
    #[error("Duplicate query source name '{0}' in query model")]
    DuplicateName(String),

    /// A second head or terminal clause was added to a builder
    #[error("Query model already has a {0} clause")]
    DuplicateClauseRole(&'static str),

    /// The builder was finished before head and terminal clauses existed
    #[error("Query model is missing its {0} clause")]
    MissingRequiredClause(&'static str),

    /// Wrong lambda parameter count or constructor argument mismatch
    #[error("Argument shape error: {0}")]
    ArgumentShape(String),

    /// A pipeline node was mapped to a clause twice
    #[error("Pipeline node #{0} is already mapped to a clause")]
    DuplicateClauseMapping(usize),

    /// Textual pipeline syntax could not be parsed
    #[error("Syntax error:\n{errors}")]
    Syntax { errors: String },

    /// Parser options could not be loaded
    #[error("Invalid parser options: {0}")]
    Options(String),

    /// Structural model operation failed
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result type for parse operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised by structural operations on an already-built query model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// The parent query of a nested model can only be set once
    #[error("Parent query of model #{0} is already set")]
    ParentAlreadySet(u64),
}

/// Errors raised while executing a query model or result operator in memory.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// First/Last/Single/Aggregate over an empty sequence
    #[error("Sequence contains no elements")]
    SequenceEmpty,

    /// Single over a sequence with more than one element
    #[error("Sequence contains more than one element")]
    SequenceHasMultipleElements,

    /// Numeric reduction over an element type it cannot handle
    #[error("{operator} does not support elements of type {item_type}")]
    TypeNotSupported {
        operator: &'static str,
        item_type: String,
    },

    /// Lambda invoked with the wrong number of arguments
    #[error("Argument shape error: {0}")]
    ArgumentShape(String),

    /// Expression or value kind the in-memory evaluator cannot handle
    #[error("Not supported in memory: {0}")]
    NotSupported(String),

    /// Back-reference or parameter without a value in scope
    #[error("Unbound reference: {0}")]
    UnboundReference(String),

    /// Operand had the wrong value type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Integer division or modulo by zero
    #[error("Division by zero")]
    DivisionByZero,
}

/// Result type for in-memory execution
pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_combinator_names_call_text() {
        let err = ParseError::UnsupportedCombinator {
            call: "numbers.Zip(others)".to_string(),
        };
        assert!(err.to_string().contains("numbers.Zip(others)"));
    }

    #[test]
    fn test_model_error_converts_into_parse_error() {
        let err: ParseError = ModelError::ParentAlreadySet(7).into();
        assert!(matches!(err, ParseError::Model(ModelError::ParentAlreadySet(7))));
    }
}
