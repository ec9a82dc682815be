//! Parser configuration.
//!
//! Options can be built in code or loaded from TOML:
//!
//! ```toml
//! generated_identifier_prefix = "_gen"
//! wrap_after_result_operators = false
//! max_nesting_depth = 8
//! ```

use crate::error::{ParseError, ParseResult};
use serde::{Deserialize, Serialize};

/// Default prefix for identifiers the parser has to invent
pub const DEFAULT_GENERATED_PREFIX: &str = "<generated>_";

/// Knobs for [`QueryParser`](crate::parsing::QueryParser).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Prefix for item names when no lambda parameter names a step's output
    pub generated_identifier_prefix: String,
    /// Close the model into a nested query when a clause follows a result
    /// operator. When false that shape is rejected instead.
    pub wrap_after_result_operators: bool,
    /// Maximum depth of nested pipelines discovered inside parameters
    pub max_nesting_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            generated_identifier_prefix: DEFAULT_GENERATED_PREFIX.to_string(),
            wrap_after_result_operators: true,
            max_nesting_depth: 32,
        }
    }
}

impl ParserOptions {
    /// Parse options from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> ParseResult<Self> {
        let options: Self =
            toml::from_str(input).map_err(|e| ParseError::Options(e.to_string()))?;
        if options.generated_identifier_prefix.is_empty() {
            return Err(ParseError::Options(
                "generated_identifier_prefix must not be empty".to_string(),
            ));
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ParserOptions::default();
        assert_eq!(options.generated_identifier_prefix, "<generated>_");
        assert!(options.wrap_after_result_operators);
        assert_eq!(options.max_nesting_depth, 32);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options = ParserOptions::from_toml_str("max_nesting_depth = 4").unwrap();
        assert_eq!(options.max_nesting_depth, 4);
        assert!(options.wrap_after_result_operators);
    }

    #[test]
    fn test_full_toml() {
        let options = ParserOptions::from_toml_str(
            r#"
            generated_identifier_prefix = "_gen"
            wrap_after_result_operators = false
            max_nesting_depth = 2
            "#,
        )
        .unwrap();
        assert_eq!(options.generated_identifier_prefix, "_gen");
        assert!(!options.wrap_after_result_operators);
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let result = ParserOptions::from_toml_str(r#"generated_identifier_prefix = """#);
        assert!(matches!(result, Err(ParseError::Options(_))));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let result = ParserOptions::from_toml_str("max_nesting_depth = \"deep\"");
        assert!(matches!(result, Err(ParseError::Options(_))));
    }
}
