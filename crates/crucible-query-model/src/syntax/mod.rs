//! Textual pipeline front end.
//!
//! Parses C#-style method chains into pipeline expressions:
//!
//! ```
//! use crucible_query_model::expr::{ItemType, Value};
//! use crucible_query_model::parsing::NodeTypeRegistry;
//! use crucible_query_model::syntax::{PipelineSyntax, SourceCatalog};
//!
//! let registry = NodeTypeRegistry::with_defaults();
//! let catalog = SourceCatalog::new().with_list("numbers", ItemType::Int, Value::ints(0..10));
//! let expr = PipelineSyntax::new(&registry)
//!     .parse("numbers.Where(x => x > 5).Count()", &catalog)
//!     .unwrap();
//! assert_eq!(expr.to_string(), "[0, 1, 2, 3, 4, 5, 6, 7, 8, 9].Where(x => (x > 5)).Count()");
//! ```
//!
//! Free identifiers must name a lambda parameter in scope or a catalog
//! source. Method names registered as combinators are emitted under the
//! `Query` owner so the parser picks them up; everything else is a plain
//! `Object` method.

mod common;
mod grammar;

pub use common::Number;
pub use grammar::Syntax;

use crate::error::{ParseError, ParseResult};
use crate::expr::{
    Expr, ExprRef, ItemType, Method, Parameter, Value, OBJECT_OWNER, QUERY_OWNER,
};
use crate::parsing::NodeTypeRegistry;
use chumsky::prelude::*;
use common::{format_errors, position};
use std::collections::HashMap;
use tracing::trace;

/// Named sources a textual pipeline may start from
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: HashMap<String, ExprRef>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory list of `item_type` elements
    pub fn with_list(self, name: impl Into<String>, item_type: ItemType, items: Value) -> Self {
        self.with_expr(
            name,
            Expr::typed_constant(items, ItemType::sequence(item_type)),
        )
    }

    /// External source the in-memory executor cannot enumerate
    pub fn with_table(self, name: impl Into<String>, item_type: ItemType) -> Self {
        let name = name.into();
        self.with_expr(
            name.clone(),
            Expr::typed_constant(Value::Table(name), ItemType::sequence(item_type)),
        )
    }

    /// List loaded from a JSON array; non-arrays become a one-element list
    pub fn with_json(
        self,
        name: impl Into<String>,
        item_type: ItemType,
        json: &serde_json::Value,
    ) -> Self {
        let items = match Value::from_json(json) {
            list @ Value::List(_) => list,
            single => Value::List(vec![single]),
        };
        self.with_list(name, item_type, items)
    }

    /// Any expression, typically another pipeline
    pub fn with_expr(mut self, name: impl Into<String>, expr: ExprRef) -> Self {
        self.sources.insert(name.into(), expr);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ExprRef> {
        self.sources.get(name)
    }
}

/// Parser for the textual method-chain syntax
#[derive(Debug, Clone, Copy)]
pub struct PipelineSyntax<'r> {
    registry: &'r NodeTypeRegistry,
}

impl<'r> PipelineSyntax<'r> {
    pub fn new(registry: &'r NodeTypeRegistry) -> Self {
        Self { registry }
    }

    /// Parse `input` into an expression tree
    pub fn parse(&self, input: &str, catalog: &SourceCatalog) -> ParseResult<ExprRef> {
        let syntax = grammar::pipeline()
            .parse(input)
            .into_result()
            .map_err(|errs| ParseError::Syntax {
                errors: format_errors(&errs, input),
            })?;
        trace!(input, "parsed pipeline syntax");

        Lowering {
            registry: self.registry,
            catalog,
            input,
            scopes: Vec::new(),
        }
        .lower(&syntax)
    }
}

/// Turns a syntax tree into an expression, binding names as it goes
struct Lowering<'a> {
    registry: &'a NodeTypeRegistry,
    catalog: &'a SourceCatalog,
    input: &'a str,
    scopes: Vec<Vec<Parameter>>,
}

impl Lowering<'_> {
    fn lower(&mut self, syntax: &Syntax) -> ParseResult<ExprRef> {
        Ok(match syntax {
            Syntax::Number(Number::Int(i)) => Expr::constant(*i),
            Syntax::Number(Number::Float(f)) => Expr::constant(*f),
            Syntax::Str(s) => Expr::constant(s.as_str()),
            Syntax::Bool(b) => Expr::constant(*b),
            Syntax::Null => Expr::constant(Value::Null),
            Syntax::Ident(name, span) => self.lookup(name, span.start)?,
            Syntax::List(items) => {
                let items = self.lower_all(items)?;
                let element_type = items.first().map(|item| item.ty()).unwrap_or_default();
                Expr::list(element_type, items)
            }
            Syntax::New(members) => {
                let mut lowered = Vec::with_capacity(members.len());
                for (name, value) in members {
                    let name = match name {
                        Some(name) => name.clone(),
                        None => inferred_member_name(value).ok_or_else(|| {
                            self.error(None, "cannot infer a member name; use `name = value`")
                        })?,
                    };
                    lowered.push((name, self.lower(value)?));
                }
                let fields = lowered
                    .iter()
                    .map(|(name, expr)| (name.clone(), expr.ty()))
                    .collect();
                Expr::new_object(ItemType::Anonymous(fields), lowered)
            }
            Syntax::Lambda(names, body) => {
                let params: Vec<Parameter> = names.iter().map(Parameter::new).collect();
                self.scopes.push(params.clone());
                let body = self.lower(body);
                self.scopes.pop();
                Expr::lambda(params, body?)
            }
            Syntax::Member(target, name) => Expr::member(self.lower(target)?, name.as_str()),
            Syntax::Call {
                target,
                name,
                type_args,
                args,
            } => {
                let receiver = self.lower(target)?;
                let owner = self.owner_for(name, &receiver);
                let mut all_args = Vec::with_capacity(args.len() + 1);
                all_args.push(receiver);
                all_args.extend(self.lower_all(args)?);
                Expr::call(Method::new(owner, name.as_str()), type_args.clone(), all_args)
            }
            Syntax::Unary(op, operand) => Expr::unary(*op, self.lower(operand)?),
            Syntax::Binary(op, left, right) => {
                Expr::binary(*op, self.lower(left)?, self.lower(right)?)
            }
            Syntax::Conditional(test, if_true, if_false) => Expr::conditional(
                self.lower(test)?,
                self.lower(if_true)?,
                self.lower(if_false)?,
            ),
        })
    }

    fn lower_all(&mut self, items: &[Syntax]) -> ParseResult<Vec<ExprRef>> {
        items.iter().map(|item| self.lower(item)).collect()
    }

    /// Innermost lambda parameter first, then the catalog
    fn lookup(&self, name: &str, offset: usize) -> ParseResult<ExprRef> {
        let param = self
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|param| param.name == name);
        if let Some(param) = param {
            return Ok(param.expr());
        }
        self.catalog
            .get(name)
            .cloned()
            .ok_or_else(|| self.error(Some(offset), &format!("unknown identifier '{}'", name)))
    }

    /// `Contains` is both a combinator and a string helper; the receiver
    /// decides which one is meant
    fn owner_for(&self, name: &str, receiver: &ExprRef) -> &'static str {
        if !self.registry.has_combinator(QUERY_OWNER, name) {
            return OBJECT_OWNER;
        }
        if name != "Contains" {
            return QUERY_OWNER;
        }
        let sequence_like = matches!(
            receiver.ty(),
            ItemType::Sequence(_) | ItemType::Grouping { .. }
        ) || matches!(receiver.as_ref(), Expr::Call(call) if call.method.owner == QUERY_OWNER);
        if sequence_like {
            QUERY_OWNER
        } else {
            OBJECT_OWNER
        }
    }

    fn error(&self, offset: Option<usize>, message: &str) -> ParseError {
        let errors = match offset {
            Some(offset) => {
                let (line, col) = position(self.input, offset);
                format!("Line {}, column {}: {}", line, col, message)
            }
            None => message.to_string(),
        };
        ParseError::Syntax { errors }
    }
}

/// `new { p.Name }` names its member `Name`; `new { x }` names it `x`
fn inferred_member_name(syntax: &Syntax) -> Option<String> {
    match syntax {
        Syntax::Ident(name, _) | Syntax::Member(_, name) => Some(name.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SourceCatalog {
        SourceCatalog::new()
            .with_list("numbers", ItemType::Int, Value::ints(0..10))
            .with_table("people", ItemType::record("Person"))
    }

    fn parse(input: &str) -> ParseResult<ExprRef> {
        let registry = NodeTypeRegistry::with_defaults();
        PipelineSyntax::new(&registry).parse(input, &catalog())
    }

    #[test]
    fn test_combinators_use_query_owner() {
        let expr = parse("people.Where(p => p.Age > 30).Select(p => p.Name.ToUpper())").unwrap();
        let select = expr.as_call().unwrap();
        assert_eq!(select.method.owner, QUERY_OWNER);
        let selector = select.args[1].as_lambda().unwrap();
        assert_eq!(selector.body.as_call().unwrap().method.owner, OBJECT_OWNER);
    }

    #[test]
    fn test_contains_owner_depends_on_receiver() {
        let expr = parse("numbers.Contains(3)").unwrap();
        assert_eq!(expr.as_call().unwrap().method.owner, QUERY_OWNER);

        let expr = parse("people.Where(p => p.Name.Contains('a'))").unwrap();
        let predicate = expr.as_call().unwrap().args[1].as_lambda().unwrap();
        assert_eq!(predicate.body.as_call().unwrap().method.owner, OBJECT_OWNER);
    }

    #[test]
    fn test_lambda_parameters_shadow_catalog() {
        let expr = parse("numbers.Select(numbers => numbers + 1)").unwrap();
        let selector = expr.as_call().unwrap().args[1].as_lambda().unwrap();
        assert_eq!(selector.body.to_string(), "(numbers + 1)");
    }

    #[test]
    fn test_unknown_identifier_reports_position() {
        let err = parse("numbers.Where(x => y > 1)").unwrap_err();
        match err {
            ParseError::Syntax { errors } => {
                assert_eq!(errors, "Line 1, column 20: unknown identifier 'y'");
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_input_is_syntax_error() {
        let err = parse("numbers.Where(x => )").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(err.to_string().contains("Line 1, column"));
    }

    #[test]
    fn test_new_object_infers_member_names() {
        let expr = parse("people.Select(p => new { p.Name, Twice = p.Age * 2 })").unwrap();
        let selector = expr.as_call().unwrap().args[1].as_lambda().unwrap();
        assert_eq!(
            selector.body.to_string(),
            "new { Name = p.Name, Twice = (p.Age * 2) }"
        );
    }

    #[test]
    fn test_type_arguments_are_kept() {
        let expr = parse("people.Cast<Person>()").unwrap();
        assert_eq!(
            expr.as_call().unwrap().type_args,
            vec![ItemType::record("Person")]
        );
    }

    #[test]
    fn test_json_source() {
        let json = serde_json::json!([{"name": "Ada"}, {"name": "Lin"}]);
        let catalog = SourceCatalog::new().with_json("rows", ItemType::record("Row"), &json);
        let source = catalog.get("rows").unwrap();
        assert_eq!(source.ty(), ItemType::sequence(ItemType::record("Row")));
    }
}
