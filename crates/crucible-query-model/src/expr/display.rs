//! Compact textual rendering of expressions.
//!
//! Back-references render as `[name]`, nested models inside braces.

use crate::expr::{Expr, ItemType, LambdaExpr, UnaryOp};
use std::fmt;

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(c) => write!(f, "{}", c.value),
            Expr::Parameter(p) => write!(f, "{}", p.name),
            Expr::Unary(u) => match u.op {
                UnaryOp::Not => write!(f, "!{}", u.operand),
                UnaryOp::Negate => write!(f, "-{}", u.operand),
                UnaryOp::Convert => write!(f, "Convert({}, {})", u.operand, u.ty),
            },
            Expr::Binary(b) => write!(f, "({} {} {})", b.left, b.op.symbol(), b.right),
            Expr::Conditional(c) => write!(f, "({} ? {} : {})", c.test, c.if_true, c.if_false),
            Expr::Member(m) => write!(f, "{}.{}", m.target, m.member),
            Expr::New(n) => {
                match &n.ty {
                    ItemType::Record(name) => write!(f, "new {} {{", name)?,
                    _ => write!(f, "new {{")?,
                }
                for (i, (name, expr)) in n.members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {} = {}", name, expr)?;
                }
                write!(f, " }}")
            }
            Expr::List(l) => {
                write!(f, "[")?;
                write_joined(f, l.items.iter())?;
                write!(f, "]")
            }
            Expr::Lambda(l) => write_lambda(f, l),
            Expr::Call(c) => {
                let (receiver, rest) = match c.args.split_first() {
                    Some((first, rest)) => (Some(first), rest),
                    None => (None, &c.args[..]),
                };
                if let Some(receiver) = receiver {
                    write!(f, "{}.", receiver)?;
                }
                write!(f, "{}", c.method.name)?;
                if !c.type_args.is_empty() {
                    write!(f, "<")?;
                    write_joined(f, c.type_args.iter())?;
                    write!(f, ">")?;
                }
                write!(f, "(")?;
                write_joined(f, rest.iter())?;
                write!(f, ")")
            }
            Expr::QuerySource(r) => write!(f, "[{}]", r.name),
            Expr::SubQuery(s) => write!(f, "{{{}}}", s.model),
        }
    }
}

fn write_lambda(f: &mut fmt::Formatter<'_>, lambda: &LambdaExpr) -> fmt::Result {
    if lambda.params.len() == 1 {
        write!(f, "{} => {}", lambda.params[0].name, lambda.body)
    } else {
        write!(f, "(")?;
        for (i, param) in lambda.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param.name)?;
        }
        write!(f, ") => {}", lambda.body)
    }
}

fn write_joined<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
