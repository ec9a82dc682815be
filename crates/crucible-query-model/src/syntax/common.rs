//! Shared parser primitives for the pipeline syntax.

use crate::expr::{BinaryOp, ItemType};
use chumsky::extra;
use chumsky::prelude::*;

/// Parser state shared by every grammar rule: rich errors, no context
pub type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Parser for identifiers: a letter or underscore, then alphanumerics
pub fn ident<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_alphanumeric() || *c == '_')
                .repeated(),
        )
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("identifier")
}

/// Parser for single-quoted string literals: 'value'
pub fn single_quoted_string<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('\'')
        .ignore_then(
            none_of("'")
                .repeated()
                .to_slice()
                .map(|s: &str| s.to_string()),
        )
        .then_ignore(just('\''))
        .labelled("single-quoted string")
}

/// Parser for double-quoted string literals: "value"
pub fn double_quoted_string<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('"')
        .ignore_then(
            none_of("\"")
                .repeated()
                .to_slice()
                .map(|s: &str| s.to_string()),
        )
        .then_ignore(just('"'))
        .labelled("double-quoted string")
}

/// Parser for string literals (single or double quoted)
pub fn string_literal<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    single_quoted_string()
        .or(double_quoted_string())
        .labelled("string literal")
}

/// Numeric literal: `42` or `4.5`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

/// Parser for integer and decimal literals
pub fn number<'src>() -> impl Parser<'src, &'src str, Number, Extra<'src>> + Clone {
    text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .try_map(|s: &str, span| {
            if s.contains('.') {
                s.parse::<f64>()
                    .map(Number::Float)
                    .map_err(|_| Rich::custom(span, "invalid decimal literal"))
            } else {
                s.parse::<i64>()
                    .map(Number::Int)
                    .map_err(|_| Rich::custom(span, "integer overflow"))
            }
        })
        .labelled("number")
}

/// Keyword parser; does not match a longer identifier
pub fn kw<'src>(keyword: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    text::keyword::<&str, _, Extra<'src>>(keyword).ignored()
}

/// Padded punctuation
pub fn sym<'src>(symbol: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    just(symbol).padded().ignored()
}

/// Padded binary operator token
pub fn op<'src>(
    symbol: &'static str,
    op: BinaryOp,
) -> impl Parser<'src, &'src str, BinaryOp, Extra<'src>> + Clone {
    just(symbol).padded().to(op)
}

/// Generic type argument: `int`, `string`, or a record name
pub fn item_type<'src>() -> impl Parser<'src, &'src str, ItemType, Extra<'src>> + Clone {
    ident()
        .map(|name| match name.as_str() {
            "int" | "Int" | "long" | "Int64" => ItemType::Int,
            "float" | "Float" | "double" | "Double" => ItemType::Float,
            "string" | "String" => ItemType::String,
            "bool" | "Bool" | "Boolean" => ItemType::Bool,
            _ => ItemType::Record(name),
        })
        .labelled("type name")
}

/// 1-based line and column of a byte offset
pub fn position(input: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(input.len());
    let line = input[..offset].matches('\n').count() + 1;
    let col = offset - input[..offset].rfind('\n').map_or(0, |i| i + 1);
    (line, col + 1)
}

/// One line per error: `Line L, column C: reason (found x)`
pub fn format_errors(errs: &[Rich<'_, char>], input: &str) -> String {
    errs.iter()
        .map(|e| {
            let (line, col) = position(input, e.span().start);

            let found = e
                .found()
                .map_or("end of input".to_string(), |c| format!("'{}'", c));

            format!(
                "Line {}, column {}: {} (found {})",
                line,
                col,
                e.reason(),
                found
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
