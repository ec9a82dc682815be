//! In-memory expression evaluation.
//!
//! Resolved expressions refer to clause outputs through back-references, so
//! evaluating a selector for one streamed element means binding each
//! back-reference to the part of the element that the streamed item
//! expression put it in ([`bind_item`]).

use crate::error::{ExecutionError, ExecutionResult};
use crate::execution::InMemoryExecutor;
use crate::expr::{BinaryOp, CallExpr, Expr, ExprRef, ItemType, LambdaExpr, UnaryOp, Value};
use crate::model::SourceId;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Values in scope while evaluating an expression
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    sources: HashMap<SourceId, Value>,
    params: Vec<(String, Value)>,
    patterns: Vec<(ExprRef, Value)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_source(&mut self, id: SourceId, value: Value) {
        self.sources.insert(id, value);
    }

    pub fn source(&self, id: SourceId) -> Option<&Value> {
        self.sources.get(&id)
    }

    /// Bind a lambda parameter; later bindings shadow earlier ones
    pub fn bind_param(&mut self, name: impl Into<String>, value: Value) {
        self.params.push((name.into(), value));
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
    }

    /// Short-circuit evaluation of a whole subtree to a known value
    pub fn bind_pattern(&mut self, expr: ExprRef, value: Value) {
        self.patterns.push((expr, value));
    }

    fn pattern(&self, expr: &ExprRef) -> Option<&Value> {
        self.patterns
            .iter()
            .rev()
            .find(|(pattern, _)| Arc::ptr_eq(pattern, expr) || pattern.as_ref() == expr.as_ref())
            .map(|(_, value)| value)
    }

    /// Copy of these bindings with one streamed element bound
    pub fn with_item(&self, item_expression: &ExprRef, value: &Value) -> Bindings {
        let mut bindings = self.clone();
        bind_item(item_expression, value, &mut bindings);
        bindings
    }
}

/// Reverse-resolve `value` through `item_expression`: back-references are
/// bound to the value (or the matching record field of a construction), and
/// the expression itself is bound as a pattern.
pub fn bind_item(item_expression: &ExprRef, value: &Value, bindings: &mut Bindings) {
    match item_expression.as_ref() {
        Expr::QuerySource(reference) => bindings.bind_source(reference.id, value.clone()),
        Expr::New(construction) => {
            if let Value::Record(fields) = value {
                for (name, member) in &construction.members {
                    if let Some(field) = fields.get(name) {
                        bind_item(member, field, bindings);
                    }
                }
            }
            bindings.bind_pattern(item_expression.clone(), value.clone());
        }
        Expr::Constant(_) => {}
        _ => bindings.bind_pattern(item_expression.clone(), value.clone()),
    }
}

/// Call a lambda with positional arguments
pub fn invoke_lambda(
    lambda: &LambdaExpr,
    args: &[Value],
    bindings: &Bindings,
) -> ExecutionResult<Value> {
    if lambda.params.len() != args.len() {
        return Err(ExecutionError::ArgumentShape(format!(
            "lambda takes {} parameter(s) but {} argument(s) were supplied",
            lambda.params.len(),
            args.len()
        )));
    }
    let mut scope = bindings.clone();
    for (param, arg) in lambda.params.iter().zip(args) {
        scope.bind_param(param.name.clone(), arg.clone());
    }
    evaluate(&lambda.body, &scope)
}

pub fn evaluate(expr: &ExprRef, bindings: &Bindings) -> ExecutionResult<Value> {
    if let Some(value) = bindings.pattern(expr) {
        return Ok(value.clone());
    }

    match expr.as_ref() {
        Expr::Constant(c) => Ok(c.value.clone()),
        Expr::Parameter(p) => bindings
            .param(&p.name)
            .cloned()
            .ok_or_else(|| ExecutionError::UnboundReference(p.name.clone())),
        Expr::QuerySource(r) => bindings
            .source(r.id)
            .cloned()
            .ok_or_else(|| ExecutionError::UnboundReference(format!("[{}]", r.name))),
        Expr::Unary(u) => {
            let operand = evaluate(&u.operand, bindings)?;
            match u.op {
                UnaryOp::Not => match operand {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(mismatch("!", &other)),
                },
                UnaryOp::Negate => match operand {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(mismatch("-", &other)),
                },
                UnaryOp::Convert => convert(operand, &u.ty),
            }
        }
        Expr::Binary(b) => evaluate_binary(b.op, &b.left, &b.right, bindings),
        Expr::Conditional(c) => match evaluate(&c.test, bindings)? {
            Value::Bool(true) => evaluate(&c.if_true, bindings),
            Value::Bool(false) => evaluate(&c.if_false, bindings),
            other => Err(mismatch("?:", &other)),
        },
        Expr::Member(m) => {
            let target = evaluate(&m.target, bindings)?;
            member(&target, &m.member)
        }
        Expr::New(n) => {
            let mut fields = BTreeMap::new();
            for (name, member) in &n.members {
                fields.insert(name.clone(), evaluate(member, bindings)?);
            }
            Ok(Value::Record(fields))
        }
        Expr::List(l) => l
            .items
            .iter()
            .map(|item| evaluate(item, bindings))
            .collect::<ExecutionResult<Vec<_>>>()
            .map(Value::List),
        Expr::Lambda(_) => Err(ExecutionError::NotSupported(format!(
            "lambda used as a value: {}",
            expr
        ))),
        Expr::Call(call) => evaluate_call(expr, call, bindings),
        Expr::SubQuery(s) => InMemoryExecutor::with_bindings(bindings.clone())
            .execute(&s.model)
            .map(|data| data.into_value()),
    }
}

fn mismatch(op: &str, value: &Value) -> ExecutionError {
    ExecutionError::TypeMismatch(format!("operator {} cannot take a {}", op, value.type_name()))
}

fn convert(value: Value, ty: &ItemType) -> ExecutionResult<Value> {
    Ok(match (ty, value) {
        (ItemType::Float, Value::Int(i)) => Value::Float(i as f64),
        (ItemType::Int, Value::Float(f)) => Value::Int(f.trunc() as i64),
        (ItemType::String, Value::String(s)) => Value::String(s),
        (ItemType::String, other) => Value::String(other.to_string()),
        (_, other) => other,
    })
}

fn evaluate_binary(
    op: BinaryOp,
    left: &ExprRef,
    right: &ExprRef,
    bindings: &Bindings,
) -> ExecutionResult<Value> {
    match op {
        BinaryOp::AndAlso | BinaryOp::OrElse => {
            let l = evaluate(left, bindings)?;
            let l = l.as_bool().ok_or_else(|| mismatch(op.symbol(), &l))?;
            if l == (op == BinaryOp::OrElse) {
                return Ok(Value::Bool(l));
            }
            let r = evaluate(right, bindings)?;
            r.as_bool()
                .map(Value::Bool)
                .ok_or_else(|| mismatch(op.symbol(), &r))
        }
        BinaryOp::Coalesce => match evaluate(left, bindings)? {
            Value::Null => evaluate(right, bindings),
            value => Ok(value),
        },
        _ => {
            let l = evaluate(left, bindings)?;
            let r = evaluate(right, bindings)?;
            binary_values(op, &l, &r)
        }
    }
}

/// Apply a strict binary operator to two already-evaluated operands
pub fn binary_values(op: BinaryOp, l: &Value, r: &Value) -> ExecutionResult<Value> {
    match op {
        BinaryOp::Equal => Ok(Value::Bool(l.loosely_equals(r))),
        BinaryOp::NotEqual => Ok(Value::Bool(!l.loosely_equals(r))),
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => {
            let ordering = l.compare(r).ok_or_else(|| {
                ExecutionError::TypeMismatch(format!(
                    "cannot compare {} with {}",
                    l.type_name(),
                    r.type_name()
                ))
            })?;
            Ok(Value::Bool(match op {
                BinaryOp::LessThan => ordering == Ordering::Less,
                BinaryOp::LessThanOrEqual => ordering != Ordering::Greater,
                BinaryOp::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        _ => arithmetic(op, l, r),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> ExecutionResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
                    return Err(ExecutionError::DivisionByZero)
                }
                BinaryOp::Divide => a.checked_div(b),
                BinaryOp::Modulo => a.checked_rem(b),
                _ => return Err(mismatch(op.symbol(), l)),
            };
            result.map(Value::Int).ok_or_else(|| {
                ExecutionError::TypeMismatch(format!("integer overflow in {}", op.symbol()))
            })
        }
        (Value::String(a), b) if op == BinaryOp::Add => Ok(Value::String(format!("{}{}", a, plain(b)))),
        (a, Value::String(b)) if op == BinaryOp::Add => Ok(Value::String(format!("{}{}", plain(a), b))),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Float(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Subtract => x - y,
                BinaryOp::Multiply => x * y,
                BinaryOp::Divide => x / y,
                BinaryOp::Modulo => x % y,
                _ => return Err(mismatch(op.symbol(), a)),
            })),
            _ => Err(ExecutionError::TypeMismatch(format!(
                "operator {} cannot combine {} and {}",
                op.symbol(),
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

/// String form without quotes, for concatenation
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn member(target: &Value, name: &str) -> ExecutionResult<Value> {
    match (target, name) {
        (Value::Record(fields), _) => fields.get(name).cloned().ok_or_else(|| {
            ExecutionError::UnboundReference(format!("record has no member '{}'", name))
        }),
        (Value::Group { key, .. }, "Key") => Ok(key.as_ref().clone()),
        (Value::Group { elements, .. }, "Count") => Ok(Value::Int(elements.len() as i64)),
        (Value::List(items), "Count" | "Length") => Ok(Value::Int(items.len() as i64)),
        (Value::String(s), "Length") => Ok(Value::Int(s.chars().count() as i64)),
        (Value::Null, _) => Err(ExecutionError::UnboundReference(format!(
            "member '{}' accessed on null",
            name
        ))),
        (other, _) => Err(ExecutionError::NotSupported(format!(
            "member '{}' on {}",
            name,
            other.type_name()
        ))),
    }
}

fn evaluate_call(expr: &ExprRef, call: &CallExpr, bindings: &Bindings) -> ExecutionResult<Value> {
    let args = call
        .args
        .iter()
        .map(|arg| evaluate(arg, bindings))
        .collect::<ExecutionResult<Vec<_>>>()?;

    match (call.method.name.as_str(), args.as_slice()) {
        ("StartsWith", [Value::String(s), Value::String(p)]) => Ok(Value::Bool(s.starts_with(p.as_str()))),
        ("EndsWith", [Value::String(s), Value::String(p)]) => Ok(Value::Bool(s.ends_with(p.as_str()))),
        ("Contains", [Value::String(s), Value::String(p)]) => Ok(Value::Bool(s.contains(p.as_str()))),
        ("Contains", [Value::List(items), item]) => {
            Ok(Value::Bool(items.iter().any(|candidate| candidate.loosely_equals(item))))
        }
        ("ToUpper", [Value::String(s)]) => Ok(Value::String(s.to_uppercase())),
        ("ToLower", [Value::String(s)]) => Ok(Value::String(s.to_lowercase())),
        ("Length", [Value::String(s)]) => Ok(Value::Int(s.chars().count() as i64)),
        _ => Err(ExecutionError::NotSupported(format!("call {}", expr))),
    }
}
