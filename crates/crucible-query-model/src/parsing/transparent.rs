//! Transparent-identifier removal.
//!
//! Joins and multi-source chains thread several range variables through one
//! lambda parameter by packing them into an anonymous carrier. Once a
//! parameter has been substituted with the carrier construction, a member
//! access on it can read the packed value directly:
//!
//! `new { x = [x], y = [y] }.y.Name` becomes `[y].Name`

use crate::expr::visitor::{rewrite, walk_children, ExprVisitor};
use crate::expr::{Expr, ExprRef, MemberExpr};
use std::convert::Infallible;

struct TransparentIdentifierRemover;

impl ExprVisitor for TransparentIdentifierRemover {
    type Error = Infallible;

    fn visit_member(&mut self, expr: &ExprRef, _member: &MemberExpr) -> Result<ExprRef, Infallible> {
        // inner accesses first so chained carriers collapse outward
        let visited = walk_children(self, expr)?;
        Ok(match visited.as_ref() {
            Expr::Member(member) => match member.target.as_ref() {
                Expr::New(carrier) if carrier.ty.is_transparent_carrier() => carrier
                    .member(&member.member)
                    .cloned()
                    .unwrap_or_else(|| visited.clone()),
                _ => visited.clone(),
            },
            _ => visited.clone(),
        })
    }
}

/// Collapse every member access into an anonymous carrier construction
pub fn remove_transparent_identifiers(expr: &ExprRef) -> ExprRef {
    rewrite(&mut TransparentIdentifierRemover, expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, ItemType, Parameter};
    use std::sync::Arc;

    fn carrier() -> ExprRef {
        Expr::anonymous(vec![
            ("x", Parameter::typed("a", ItemType::Int).expr()),
            ("y", Parameter::typed("b", ItemType::record("Order")).expr()),
        ])
    }

    #[test]
    fn test_member_of_carrier_collapses() {
        let expr = Expr::member(Expr::member(carrier(), "y"), "Total");
        let cleaned = remove_transparent_identifiers(&expr);
        assert_eq!(cleaned.to_string(), "b.Total");
    }

    #[test]
    fn test_nested_carriers_collapse() {
        let outer = Expr::anonymous(vec![("t", carrier()), ("z", Expr::parameter("c"))]);
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::member(Expr::member(outer.clone(), "t"), "x"),
            Expr::member(outer, "z"),
        );
        let cleaned = remove_transparent_identifiers(&expr);
        assert_eq!(cleaned.to_string(), "(a + c)");
    }

    #[test]
    fn test_named_record_is_kept() {
        let record = Expr::new_object(
            ItemType::record("Pair"),
            vec![("x".to_string(), Expr::parameter("a"))],
        );
        let expr = Expr::member(record, "x");
        let cleaned = remove_transparent_identifiers(&expr);
        assert!(Arc::ptr_eq(&expr, &cleaned));
    }

    #[test]
    fn test_untouched_tree_is_shared() {
        let expr = Expr::member(Expr::parameter("a"), "Name");
        assert!(Arc::ptr_eq(&expr, &remove_transparent_identifiers(&expr)));
    }
}
