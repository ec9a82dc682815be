//! Pipeline expression trees.
//!
//! An [`Expr`] is the immutable input the parser consumes: constants, lambda
//! parameters, operators, member access, construction, lambdas and method
//! calls. Two leaf kinds only appear in parser output:
//!
//! - [`Expr::QuerySource`] - a back-reference naming a clause's output
//! - [`Expr::SubQuery`] - a nested pipeline already turned into a model
//!
//! Nodes are shared through [`ExprRef`] (`Arc<Expr>`), so pointer equality
//! is a valid "unchanged" test after a rewrite.

mod builder;
mod display;
pub mod evaluate;
mod types;
mod value;
pub mod visitor;

pub use builder::Pipeline;
pub use types::ItemType;
pub use value::Value;
pub use visitor::{replace_parameter, replace_parameters, ExprVisitor};

use crate::model::{QueryModel, SourceId};
use std::sync::Arc;

/// Shared handle to an expression node
pub type ExprRef = Arc<Expr>;

/// Owner used by the default registry for query combinators
pub const QUERY_OWNER: &str = "Query";

/// Owner used by the default registry for in-memory sequence combinators
pub const SEQUENCE_OWNER: &str = "Sequence";

/// Owner for plain instance methods (string helpers and the like)
pub const OBJECT_OWNER: &str = "Object";

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Constant),
    Parameter(Parameter),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Conditional(ConditionalExpr),
    Member(MemberExpr),
    New(NewExpr),
    List(ListExpr),
    Lambda(LambdaExpr),
    Call(CallExpr),
    QuerySource(QuerySourceRef),
    SubQuery(SubQueryExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: Value,
    pub ty: ItemType,
}

/// A bound lambda parameter. Parameters are matched by name, with inner
/// lambdas shadowing outer ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub ty: ItemType,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ItemType::Unknown,
        }
    }

    pub fn typed(name: impl Into<String>, ty: ItemType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Expression node reading this parameter
    pub fn expr(&self) -> ExprRef {
        Arc::new(Expr::Parameter(self.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    /// Conversion to the node's type
    Convert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: ExprRef,
    pub ty: ItemType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
    Coalesce,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::Coalesce => "??",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: ExprRef,
    pub right: ExprRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpr {
    pub test: ExprRef,
    pub if_true: ExprRef,
    pub if_false: ExprRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpr {
    pub target: ExprRef,
    pub member: String,
    pub ty: ItemType,
}

/// Object construction. With an [`ItemType::Anonymous`] type this is also the
/// shape of the pairing carriers joins and multi-source chains produce.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpr {
    pub ty: ItemType,
    pub members: Vec<(String, ExprRef)>,
}

impl NewExpr {
    pub fn member(&self, name: &str) -> Option<&ExprRef> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, expr)| expr)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListExpr {
    pub element_type: ItemType,
    pub items: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaExpr {
    pub params: Vec<Parameter>,
    pub body: ExprRef,
}

/// Identity of a called method: declaring owner plus name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    pub owner: String,
    pub name: String,
}

impl Method {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

/// Method invocation. For combinators `args[0]` is always the previous step.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub method: Method,
    pub type_args: Vec<ItemType>,
    pub args: Vec<ExprRef>,
    pub ty: ItemType,
}

/// Back-reference to the output of a clause or query-source operator.
///
/// Equality is by [`SourceId`]; the name and type are carried for display
/// and typing only.
#[derive(Debug, Clone)]
pub struct QuerySourceRef {
    pub id: SourceId,
    pub name: String,
    pub item_type: ItemType,
}

impl PartialEq for QuerySourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// A nested pipeline that was discovered inside another step's parameters.
#[derive(Debug, Clone)]
pub struct SubQueryExpr {
    pub model: Arc<QueryModel>,
}

impl PartialEq for SubQueryExpr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.model, &other.model)
    }
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> ExprRef {
        let value = value.into();
        let ty = value.item_type();
        Arc::new(Expr::Constant(Constant { value, ty }))
    }

    pub fn typed_constant(value: Value, ty: ItemType) -> ExprRef {
        Arc::new(Expr::Constant(Constant { value, ty }))
    }

    pub fn parameter(name: impl Into<String>) -> ExprRef {
        Parameter::new(name).expr()
    }

    pub fn unary(op: UnaryOp, operand: ExprRef) -> ExprRef {
        let ty = match op {
            UnaryOp::Not => ItemType::Bool,
            UnaryOp::Negate | UnaryOp::Convert => operand.ty(),
        };
        Arc::new(Expr::Unary(UnaryExpr { op, operand, ty }))
    }

    pub fn convert(operand: ExprRef, ty: ItemType) -> ExprRef {
        Arc::new(Expr::Unary(UnaryExpr {
            op: UnaryOp::Convert,
            operand,
            ty,
        }))
    }

    pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef) -> ExprRef {
        Arc::new(Expr::Binary(BinaryExpr { op, left, right }))
    }

    pub fn conditional(test: ExprRef, if_true: ExprRef, if_false: ExprRef) -> ExprRef {
        Arc::new(Expr::Conditional(ConditionalExpr {
            test,
            if_true,
            if_false,
        }))
    }

    pub fn member(target: ExprRef, member: impl Into<String>) -> ExprRef {
        Self::typed_member(target, member, ItemType::Unknown)
    }

    pub fn typed_member(target: ExprRef, member: impl Into<String>, ty: ItemType) -> ExprRef {
        Arc::new(Expr::Member(MemberExpr {
            target,
            member: member.into(),
            ty,
        }))
    }

    pub fn new_object(ty: ItemType, members: Vec<(String, ExprRef)>) -> ExprRef {
        Arc::new(Expr::New(NewExpr { ty, members }))
    }

    /// Anonymous carrier whose field types are taken from the member exprs
    pub fn anonymous(members: Vec<(&str, ExprRef)>) -> ExprRef {
        let fields = members
            .iter()
            .map(|(name, expr)| (name.to_string(), expr.ty()))
            .collect();
        let members = members
            .into_iter()
            .map(|(name, expr)| (name.to_string(), expr))
            .collect();
        Self::new_object(ItemType::Anonymous(fields), members)
    }

    pub fn list(element_type: ItemType, items: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::List(ListExpr {
            element_type,
            items,
        }))
    }

    pub fn lambda(params: Vec<Parameter>, body: ExprRef) -> ExprRef {
        Arc::new(Expr::Lambda(LambdaExpr { params, body }))
    }

    /// Single-parameter lambda built from a closure over the parameter node
    pub fn lambda1(name: &str, body: impl FnOnce(ExprRef) -> ExprRef) -> ExprRef {
        let param = Parameter::new(name);
        let body = body(param.expr());
        Self::lambda(vec![param], body)
    }

    /// Two-parameter lambda built from a closure over the parameter nodes
    pub fn lambda2(
        first: &str,
        second: &str,
        body: impl FnOnce(ExprRef, ExprRef) -> ExprRef,
    ) -> ExprRef {
        let a = Parameter::new(first);
        let b = Parameter::new(second);
        let body = body(a.expr(), b.expr());
        Self::lambda(vec![a, b], body)
    }

    pub fn call(method: Method, type_args: Vec<ItemType>, args: Vec<ExprRef>) -> ExprRef {
        Self::typed_call(method, type_args, args, ItemType::Unknown)
    }

    pub fn typed_call(
        method: Method,
        type_args: Vec<ItemType>,
        args: Vec<ExprRef>,
        ty: ItemType,
    ) -> ExprRef {
        Arc::new(Expr::Call(CallExpr {
            method,
            type_args,
            args,
            ty,
        }))
    }

    pub fn query_source(id: SourceId, name: impl Into<String>, item_type: ItemType) -> ExprRef {
        Arc::new(Expr::QuerySource(QuerySourceRef {
            id,
            name: name.into(),
            item_type,
        }))
    }

    pub fn sub_query(model: Arc<QueryModel>) -> ExprRef {
        Arc::new(Expr::SubQuery(SubQueryExpr { model }))
    }

    pub fn as_lambda(&self) -> Option<&LambdaExpr> {
        match self {
            Expr::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&CallExpr> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Static type as recorded on the tree. No inference beyond what the
    /// leaves and call signatures already carry.
    pub fn ty(&self) -> ItemType {
        match self {
            Expr::Constant(c) => c.ty.clone(),
            Expr::Parameter(p) => p.ty.clone(),
            Expr::Unary(u) => u.ty.clone(),
            Expr::Binary(b) => {
                if b.op.is_comparison() || matches!(b.op, BinaryOp::AndAlso | BinaryOp::OrElse) {
                    ItemType::Bool
                } else {
                    match (b.left.ty(), b.right.ty()) {
                        (ItemType::Int, ItemType::Float) | (ItemType::Float, ItemType::Int) => {
                            ItemType::Float
                        }
                        (left, _) => left,
                    }
                }
            }
            Expr::Conditional(c) => c.if_true.ty(),
            Expr::Member(m) => m.ty.clone(),
            Expr::New(n) => n.ty.clone(),
            Expr::List(l) => ItemType::sequence(l.element_type.clone()),
            Expr::Lambda(l) => l.body.ty(),
            Expr::Call(c) => c.ty.clone(),
            Expr::QuerySource(r) => r.item_type.clone(),
            Expr::SubQuery(s) => s.model.result_type(),
        }
    }
}

/// Pointer identity of an expression node, used for memoization keys
pub(crate) fn identity(expr: &ExprRef) -> usize {
    Arc::as_ptr(expr) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_types() {
        let x = Parameter::typed("x", ItemType::Int).expr();
        let cmp = Expr::binary(BinaryOp::GreaterThan, x.clone(), Expr::constant(5i64));
        assert_eq!(cmp.ty(), ItemType::Bool);

        let sum = Expr::binary(BinaryOp::Add, x, Expr::constant(1.5));
        assert_eq!(sum.ty(), ItemType::Float);
    }

    #[test]
    fn test_anonymous_carrier_type() {
        let a = Parameter::typed("a", ItemType::Int).expr();
        let b = Parameter::typed("b", ItemType::String).expr();
        let carrier = Expr::anonymous(vec![("a", a), ("b", b)]);
        assert!(carrier.ty().is_transparent_carrier());
    }

    #[test]
    fn test_lambda1_binds_parameter() {
        let lambda = Expr::lambda1("x", |x| Expr::member(x, "Name"));
        let lambda = lambda.as_lambda().unwrap();
        assert_eq!(lambda.params[0].name, "x");
        assert_eq!(lambda.body.to_string(), "x.Name");
    }
}
