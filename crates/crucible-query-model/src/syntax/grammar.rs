//! Grammar for C#-flavoured method chains.
//!
//! ```text
//! numbers.Where(x => x > 5).OrderBy(x => -x).Select(x => new { x, Double = x * 2 })
//! people.Cast<Person>().Count(p => p.Name.StartsWith("A") && !p.Retired)
//! ```
//!
//! Precedence, loosest first: `?:`, `??`, `||`, `&&`, `== !=`,
//! `< <= > >=`, `+ -`, `* / %`, prefix `! -`, then member access and calls.
//! Every precedence level stays boxed: the unboxed parser type overflows the
//! stack in debug builds on short inputs.

use crate::expr::{BinaryOp, ItemType, UnaryOp};
use crate::syntax::common::{ident, item_type, kw, number, op, string_literal, sym, Extra, Number};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

/// Untyped syntax tree, lowered to [`Expr`](crate::expr::Expr) once scopes
/// and catalog names are known.
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    Number(Number),
    Str(String),
    Bool(bool),
    Null,
    Ident(String, SimpleSpan),
    List(Vec<Syntax>),
    /// `new { a = e, b }`; unnamed members are `None`
    New(Vec<(Option<String>, Syntax)>),
    Lambda(Vec<String>, Box<Syntax>),
    Member(Box<Syntax>, String),
    Call {
        target: Box<Syntax>,
        name: String,
        type_args: Vec<ItemType>,
        args: Vec<Syntax>,
    },
    Unary(UnaryOp, Box<Syntax>),
    Binary(BinaryOp, Box<Syntax>, Box<Syntax>),
    Conditional(Box<Syntax>, Box<Syntax>, Box<Syntax>),
}

#[derive(Debug, Clone)]
enum Postfix {
    Member(String),
    Call {
        name: String,
        type_args: Vec<ItemType>,
        args: Vec<Syntax>,
    },
}

fn binary(left: Syntax, (op, right): (BinaryOp, Syntax)) -> Syntax {
    Syntax::Binary(op, Box::new(left), Box::new(right))
}

/// Whole input: one expression surrounded by optional whitespace
pub fn pipeline<'src>() -> impl Parser<'src, &'src str, Syntax, Extra<'src>> {
    expression().padded().then_ignore(end())
}

/// Expression parser
pub fn expression<'src>() -> impl Parser<'src, &'src str, Syntax, Extra<'src>> + Clone {
    recursive(|expr| {
        let arguments = expr
            .clone()
            .separated_by(sym(","))
            .collect::<Vec<_>>()
            .delimited_by(sym("("), sym(")"))
            .labelled("argument list");

        let literal = choice((
            number().map(Syntax::Number),
            string_literal().map(Syntax::Str),
            kw("true").to(Syntax::Bool(true)),
            kw("false").to(Syntax::Bool(false)),
            kw("null").to(Syntax::Null),
        ))
        .padded();

        let lambda_params = choice((
            ident()
                .padded()
                .separated_by(sym(","))
                .collect::<Vec<_>>()
                .delimited_by(sym("("), sym(")")),
            ident().padded().map(|name| vec![name]),
        ));
        let lambda = lambda_params
            .then_ignore(sym("=>"))
            .then(expr.clone())
            .map(|(params, body)| Syntax::Lambda(params, Box::new(body)))
            .labelled("lambda")
            .boxed();

        let member_init = ident()
            .padded()
            .then_ignore(just('=').padded().then(just('=').not()))
            .or_not()
            .then(expr.clone());
        let new_object = kw("new")
            .padded()
            .ignore_then(
                member_init
                    .separated_by(sym(","))
                    .allow_trailing()
                    .collect::<Vec<_>>()
                    .delimited_by(sym("{"), sym("}")),
            )
            .map(Syntax::New)
            .labelled("object construction")
            .boxed();

        let list = expr
            .clone()
            .separated_by(sym(","))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(sym("["), sym("]"))
            .map(Syntax::List)
            .labelled("list")
            .boxed();

        let identifier = ident()
            .map_with(|name, e| Syntax::Ident(name, e.span()))
            .padded();

        let atom = choice((
            lambda,
            literal,
            new_object,
            list,
            expr.clone().delimited_by(sym("("), sym(")")),
            identifier,
        ))
        .boxed();

        let type_args = item_type()
            .padded()
            .separated_by(sym(","))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(sym("<"), sym(">"));
        let postfix = sym(".")
            .ignore_then(ident())
            .then(type_args.or_not().then(arguments).or_not())
            .map(|(name, call)| match call {
                Some((type_args, args)) => Postfix::Call {
                    name,
                    type_args: type_args.unwrap_or_default(),
                    args,
                },
                None => Postfix::Member(name),
            });
        let access = atom.foldl(postfix.repeated(), |target, postfix| match postfix {
            Postfix::Member(name) => Syntax::Member(Box::new(target), name),
            Postfix::Call {
                name,
                type_args,
                args,
            } => Syntax::Call {
                target: Box::new(target),
                name,
                type_args,
                args,
            },
        })
        .boxed();

        let prefix = choice((
            just('!').padded().to(UnaryOp::Not),
            just('-').padded().to(UnaryOp::Negate),
        ));
        let unary = prefix
            .repeated()
            .foldr(access, |op, operand| Syntax::Unary(op, Box::new(operand)))
            .boxed();

        let product = unary.clone().foldl(
            choice((
                op("*", BinaryOp::Multiply),
                op("/", BinaryOp::Divide),
                op("%", BinaryOp::Modulo),
            ))
            .then(unary)
            .repeated(),
            binary,
        )
        .boxed();
        let sum = product.clone().foldl(
            choice((op("+", BinaryOp::Add), op("-", BinaryOp::Subtract)))
                .then(product)
                .repeated(),
            binary,
        )
        .boxed();
        let relational = sum.clone().foldl(
            choice((
                op("<=", BinaryOp::LessThanOrEqual),
                op(">=", BinaryOp::GreaterThanOrEqual),
                op("<", BinaryOp::LessThan),
                op(">", BinaryOp::GreaterThan),
            ))
            .then(sum)
            .repeated(),
            binary,
        )
        .boxed();
        let equality = relational.clone().foldl(
            choice((op("==", BinaryOp::Equal), op("!=", BinaryOp::NotEqual)))
                .then(relational)
                .repeated(),
            binary,
        )
        .boxed();
        let and = equality
            .clone()
            .foldl(op("&&", BinaryOp::AndAlso).then(equality).repeated(), binary)
            .boxed();
        let or = and
            .clone()
            .foldl(op("||", BinaryOp::OrElse).then(and).repeated(), binary)
            .boxed();
        let coalesce = or
            .clone()
            .foldl(op("??", BinaryOp::Coalesce).then(or).repeated(), binary)
            .boxed();

        coalesce
            .then(
                sym("?")
                    .ignore_then(expr.clone())
                    .then_ignore(sym(":"))
                    .then(expr)
                    .or_not(),
            )
            .map(|(test, branches)| match branches {
                Some((if_true, if_false)) => {
                    Syntax::Conditional(Box::new(test), Box::new(if_true), Box::new(if_false))
                }
                None => test,
            })
            .boxed()
    })
}
