//! Recursive rewriting visitor for expression trees.
//!
//! Dispatch is by node kind. Composite nodes are rebuilt only when one of
//! their children changed; otherwise the original `Arc` is returned, so
//! `Arc::ptr_eq` tells a caller whether a subtree was touched. The two
//! parser-introduced leaves (back-references and sub-queries) pass through
//! unchanged unless a visitor overrides their hooks.

use crate::expr::{
    BinaryExpr, CallExpr, ConditionalExpr, Expr, ExprRef, LambdaExpr, ListExpr, MemberExpr,
    NewExpr, Parameter, QuerySourceRef, SubQueryExpr, UnaryExpr,
};
use std::convert::Infallible;
use std::sync::Arc;

pub trait ExprVisitor {
    type Error;

    fn visit(&mut self, expr: &ExprRef) -> Result<ExprRef, Self::Error> {
        match expr.as_ref() {
            Expr::Parameter(p) => self.visit_parameter(expr, p),
            Expr::QuerySource(r) => self.visit_query_source_ref(expr, r),
            Expr::SubQuery(s) => self.visit_sub_query(expr, s),
            Expr::Member(m) => self.visit_member(expr, m),
            Expr::Lambda(l) => self.visit_lambda(expr, l),
            Expr::Call(c) => self.visit_call(expr, c),
            _ => self.visit_children(expr),
        }
    }

    fn visit_parameter(&mut self, expr: &ExprRef, _param: &Parameter) -> Result<ExprRef, Self::Error> {
        Ok(expr.clone())
    }

    fn visit_query_source_ref(
        &mut self,
        expr: &ExprRef,
        _reference: &QuerySourceRef,
    ) -> Result<ExprRef, Self::Error> {
        Ok(expr.clone())
    }

    fn visit_sub_query(
        &mut self,
        expr: &ExprRef,
        _sub_query: &SubQueryExpr,
    ) -> Result<ExprRef, Self::Error> {
        Ok(expr.clone())
    }

    fn visit_member(&mut self, expr: &ExprRef, _member: &MemberExpr) -> Result<ExprRef, Self::Error> {
        self.visit_children(expr)
    }

    fn visit_lambda(&mut self, expr: &ExprRef, _lambda: &LambdaExpr) -> Result<ExprRef, Self::Error> {
        self.visit_children(expr)
    }

    fn visit_call(&mut self, expr: &ExprRef, _call: &CallExpr) -> Result<ExprRef, Self::Error> {
        self.visit_children(expr)
    }

    fn visit_children(&mut self, expr: &ExprRef) -> Result<ExprRef, Self::Error> {
        walk_children(self, expr)
    }
}

/// Visit every child of `expr` and rebuild it only if something changed.
pub fn walk_children<V: ExprVisitor + ?Sized>(
    visitor: &mut V,
    expr: &ExprRef,
) -> Result<ExprRef, V::Error> {
    let rebuilt = match expr.as_ref() {
        Expr::Constant(_) | Expr::Parameter(_) | Expr::QuerySource(_) | Expr::SubQuery(_) => None,
        Expr::Unary(u) => {
            let operand = visitor.visit(&u.operand)?;
            changed(&u.operand, &operand).then(|| {
                Expr::Unary(UnaryExpr {
                    op: u.op,
                    operand,
                    ty: u.ty.clone(),
                })
            })
        }
        Expr::Binary(b) => {
            let left = visitor.visit(&b.left)?;
            let right = visitor.visit(&b.right)?;
            (changed(&b.left, &left) || changed(&b.right, &right)).then(|| {
                Expr::Binary(BinaryExpr {
                    op: b.op,
                    left,
                    right,
                })
            })
        }
        Expr::Conditional(c) => {
            let test = visitor.visit(&c.test)?;
            let if_true = visitor.visit(&c.if_true)?;
            let if_false = visitor.visit(&c.if_false)?;
            (changed(&c.test, &test) || changed(&c.if_true, &if_true) || changed(&c.if_false, &if_false))
                .then(|| {
                    Expr::Conditional(ConditionalExpr {
                        test,
                        if_true,
                        if_false,
                    })
                })
        }
        Expr::Member(m) => {
            let target = visitor.visit(&m.target)?;
            changed(&m.target, &target).then(|| {
                Expr::Member(MemberExpr {
                    target,
                    member: m.member.clone(),
                    ty: m.ty.clone(),
                })
            })
        }
        Expr::New(n) => {
            let exprs: Vec<ExprRef> = n.members.iter().map(|(_, e)| e.clone()).collect();
            visit_list(visitor, &exprs)?.map(|visited| {
                Expr::New(NewExpr {
                    ty: n.ty.clone(),
                    members: n
                        .members
                        .iter()
                        .map(|(name, _)| name.clone())
                        .zip(visited)
                        .collect(),
                })
            })
        }
        Expr::List(l) => visit_list(visitor, &l.items)?.map(|items| {
            Expr::List(ListExpr {
                element_type: l.element_type.clone(),
                items,
            })
        }),
        Expr::Lambda(l) => {
            let body = visitor.visit(&l.body)?;
            changed(&l.body, &body).then(|| {
                Expr::Lambda(LambdaExpr {
                    params: l.params.clone(),
                    body,
                })
            })
        }
        Expr::Call(c) => visit_list(visitor, &c.args)?.map(|args| {
            Expr::Call(CallExpr {
                method: c.method.clone(),
                type_args: c.type_args.clone(),
                args,
                ty: c.ty.clone(),
            })
        }),
    };

    Ok(match rebuilt {
        Some(expr) => Arc::new(expr),
        None => expr.clone(),
    })
}

/// Visit a list of expressions; `Some` only if at least one element changed
pub fn visit_list<V: ExprVisitor + ?Sized>(
    visitor: &mut V,
    items: &[ExprRef],
) -> Result<Option<Vec<ExprRef>>, V::Error> {
    let mut visited = Vec::with_capacity(items.len());
    let mut any_changed = false;
    for item in items {
        let new_item = visitor.visit(item)?;
        any_changed |= changed(item, &new_item);
        visited.push(new_item);
    }
    Ok(any_changed.then_some(visited))
}

fn changed(before: &ExprRef, after: &ExprRef) -> bool {
    !Arc::ptr_eq(before, after)
}

/// Run a visitor that cannot fail
pub fn rewrite<V: ExprVisitor<Error = Infallible> + ?Sized>(visitor: &mut V, expr: &ExprRef) -> ExprRef {
    match visitor.visit(expr) {
        Ok(expr) => expr,
        Err(never) => match never {},
    }
}

/// Substitutes parameters by name, stopping at lambdas that shadow them.
struct ParameterReplacer<'a> {
    replacements: Vec<(&'a str, &'a ExprRef)>,
}

impl ExprVisitor for ParameterReplacer<'_> {
    type Error = Infallible;

    fn visit_parameter(&mut self, expr: &ExprRef, param: &Parameter) -> Result<ExprRef, Infallible> {
        Ok(self
            .replacements
            .iter()
            .find(|(name, _)| *name == param.name)
            .map(|(_, replacement)| (*replacement).clone())
            .unwrap_or_else(|| expr.clone()))
    }

    fn visit_lambda(&mut self, expr: &ExprRef, lambda: &LambdaExpr) -> Result<ExprRef, Infallible> {
        let shadowed = |name: &str| lambda.params.iter().any(|p| p.name == name);
        if !self.replacements.iter().any(|(name, _)| shadowed(name)) {
            return self.visit_children(expr);
        }
        let mut inner = ParameterReplacer {
            replacements: self
                .replacements
                .iter()
                .copied()
                .filter(|(name, _)| !shadowed(name))
                .collect(),
        };
        if inner.replacements.is_empty() {
            return Ok(expr.clone());
        }
        Ok(rewrite(&mut inner, expr))
    }
}

/// Replace every free occurrence of `param` in `expr` with `replacement`.
pub fn replace_parameter(expr: &ExprRef, param: &Parameter, replacement: &ExprRef) -> ExprRef {
    replace_parameters(expr, &[(param, replacement)])
}

/// Replace several parameters in one pass.
pub fn replace_parameters(expr: &ExprRef, replacements: &[(&Parameter, &ExprRef)]) -> ExprRef {
    let mut replacer = ParameterReplacer {
        replacements: replacements
            .iter()
            .map(|(param, replacement)| (param.name.as_str(), *replacement))
            .collect(),
    };
    rewrite(&mut replacer, expr)
}
