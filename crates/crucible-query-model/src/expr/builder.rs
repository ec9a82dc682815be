//! Fluent construction of pipeline expressions.
//!
//! Stands in for a host's expression-capture front end when building trees
//! by hand:
//!
//! ```
//! use crucible_query_model::expr::{BinaryOp, Expr, ItemType, Pipeline, Value};
//!
//! let pipeline = Pipeline::list(ItemType::Int, Value::ints(0..10))
//!     .call("Where", vec![Expr::lambda1("x", |x| {
//!         Expr::binary(BinaryOp::GreaterThan, x, Expr::constant(5i64))
//!     })])
//!     .call("Count", vec![])
//!     .build();
//! assert_eq!(pipeline.to_string(), "[0, 1, 2, 3, 4, 5, 6, 7, 8, 9].Where(x => (x > 5)).Count()");
//! ```

use crate::expr::{Expr, ExprRef, ItemType, Method, Value, QUERY_OWNER};

/// Builds a combinator chain one call at a time, source first.
#[derive(Debug, Clone)]
pub struct Pipeline {
    expr: ExprRef,
    owner: String,
}

impl Pipeline {
    /// Start from an arbitrary source expression
    pub fn from_expr(expr: ExprRef) -> Self {
        Self {
            expr,
            owner: QUERY_OWNER.to_string(),
        }
    }

    /// Start from an in-memory list constant
    pub fn list(item_type: ItemType, items: Value) -> Self {
        Self::from_expr(Expr::typed_constant(items, ItemType::sequence(item_type)))
    }

    /// Start from a named external source
    pub fn table(name: impl Into<String>, item_type: ItemType) -> Self {
        Self::from_expr(Expr::typed_constant(
            Value::Table(name.into()),
            ItemType::sequence(item_type),
        ))
    }

    /// Use a different combinator owner for the following calls
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Append a combinator call; the current chain becomes its source
    pub fn call(self, name: &str, args: Vec<ExprRef>) -> Self {
        self.call_typed(name, Vec::new(), args)
    }

    /// Append a combinator call with explicit generic item types
    pub fn call_typed(self, name: &str, type_args: Vec<ItemType>, args: Vec<ExprRef>) -> Self {
        let mut all_args = Vec::with_capacity(args.len() + 1);
        all_args.push(self.expr);
        all_args.extend(args);
        let expr = Expr::call(Method::new(self.owner.as_str(), name), type_args, all_args);
        Self {
            expr,
            owner: self.owner,
        }
    }

    pub fn build(self) -> ExprRef {
        self.expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::SEQUENCE_OWNER;

    #[test]
    fn test_source_is_first_argument() {
        let expr = Pipeline::table("numbers", ItemType::Int)
            .call("Take", vec![Expr::constant(5i64)])
            .build();
        let call = expr.as_call().unwrap();
        assert_eq!(call.method, Method::new(QUERY_OWNER, "Take"));
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.args[0].to_string(), "numbers");
    }

    #[test]
    fn test_owner_switch() {
        let expr = Pipeline::table("numbers", ItemType::Int)
            .owner(SEQUENCE_OWNER)
            .call("Distinct", vec![])
            .build();
        assert_eq!(expr.as_call().unwrap().method.owner, SEQUENCE_OWNER);
    }
}
