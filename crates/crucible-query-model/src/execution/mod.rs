//! In-memory execution of query models.
//!
//! [`InMemoryExecutor`] walks a model with the [`QueryModelVisitor`]
//! interface, keeping one set of [`Bindings`] per row of the clause stream.
//! Only heads that evaluate to in-memory lists can run; named external
//! tables are rejected.

use crate::error::{ExecutionError, ExecutionResult};
use crate::expr::evaluate::{evaluate, Bindings};
use crate::expr::{ExprRef, Value};
use crate::model::{
    AdditionalFromClause, GroupJoinClause, JoinClause, MainFromClause, OrderByClause,
    OrderingDirection, QueryModel, QueryModelVisitor, SelectClause, WhereClause,
};
use crate::result_operators::{ResultOperator, StreamedData, StreamedSequence};
use std::cmp::Ordering;
use tracing::debug;

/// Runs a query model over in-memory data
#[derive(Debug, Default)]
pub struct InMemoryExecutor {
    outer: Bindings,
    rows: Vec<Bindings>,
    output: Option<StreamedData>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor for a nested model; `outer` holds the enclosing row
    pub fn with_bindings(outer: Bindings) -> Self {
        Self {
            outer,
            ..Self::default()
        }
    }

    pub fn execute(mut self, model: &QueryModel) -> ExecutionResult<StreamedData> {
        debug!(model = %model.id(), "executing query model in memory");
        model.accept(&mut self)?;
        self.output.ok_or_else(|| {
            ExecutionError::NotSupported("query model produced no output".to_string())
        })
    }
}

fn elements(value: Value) -> ExecutionResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        Value::Group { elements, .. } => Ok(elements),
        Value::Table(name) => Err(ExecutionError::NotSupported(format!(
            "external source '{}' cannot be enumerated in memory",
            name
        ))),
        other => Err(ExecutionError::TypeMismatch(format!(
            "query source must be a sequence, got {}",
            other.type_name()
        ))),
    }
}

fn predicate_holds(predicate: &ExprRef, row: &Bindings) -> ExecutionResult<bool> {
    match evaluate(predicate, row)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExecutionError::TypeMismatch(format!(
            "predicate returned {}",
            other.type_name()
        ))),
    }
}

impl InMemoryExecutor {
    /// Inner elements of `join` matching the outer key of `row`
    fn matches(&self, join: &JoinClause, row: &Bindings) -> ExecutionResult<Vec<Value>> {
        let outer_key = evaluate(&join.outer_key_selector, row)?;
        let inner = elements(evaluate(&join.inner_sequence, row)?)?;
        let mut matched = Vec::new();
        for element in inner {
            let mut scope = row.clone();
            scope.bind_source(join.id, element.clone());
            let inner_key = evaluate(&join.inner_key_selector, &scope)?;
            if inner_key.loosely_equals(&outer_key) {
                matched.push(element);
            }
        }
        Ok(matched)
    }
}

impl QueryModelVisitor for InMemoryExecutor {
    type Error = ExecutionError;

    fn visit_main_from_clause(
        &mut self,
        clause: &MainFromClause,
        _model: &QueryModel,
    ) -> ExecutionResult<()> {
        let source = evaluate(&clause.from_expression, &self.outer)?;
        self.rows = elements(source)?
            .into_iter()
            .map(|element| {
                let mut row = self.outer.clone();
                row.bind_source(clause.id, element);
                row
            })
            .collect();
        Ok(())
    }

    fn visit_additional_from_clause(
        &mut self,
        clause: &AdditionalFromClause,
        _model: &QueryModel,
        _index: usize,
    ) -> ExecutionResult<()> {
        let mut rows = Vec::new();
        for row in &self.rows {
            for element in elements(evaluate(&clause.from_expression, row)?)? {
                let mut next = row.clone();
                next.bind_source(clause.id, element);
                rows.push(next);
            }
        }
        self.rows = rows;
        Ok(())
    }

    fn visit_where_clause(
        &mut self,
        clause: &WhereClause,
        _model: &QueryModel,
        _index: usize,
    ) -> ExecutionResult<()> {
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            if predicate_holds(&clause.predicate, &row)? {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(())
    }

    fn visit_order_by_clause(
        &mut self,
        clause: &OrderByClause,
        _model: &QueryModel,
        _index: usize,
    ) -> ExecutionResult<()> {
        let mut keyed = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            let keys = clause
                .orderings
                .iter()
                .map(|ordering| evaluate(&ordering.expression, &row))
                .collect::<ExecutionResult<Vec<_>>>()?;
            keyed.push((keys, row));
        }

        // stable; incomparable keys keep their relative order
        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), ordering) in a.iter().zip(b).zip(&clause.orderings) {
                let cmp = x.compare(y).unwrap_or(Ordering::Equal);
                let cmp = match ordering.direction {
                    OrderingDirection::Asc => cmp,
                    OrderingDirection::Desc => cmp.reverse(),
                };
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });
        self.rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(())
    }

    fn visit_join_clause(
        &mut self,
        clause: &JoinClause,
        _model: &QueryModel,
        _index: usize,
    ) -> ExecutionResult<()> {
        let mut rows = Vec::new();
        for row in &self.rows {
            for element in self.matches(clause, row)? {
                let mut next = row.clone();
                next.bind_source(clause.id, element);
                rows.push(next);
            }
        }
        self.rows = rows;
        Ok(())
    }

    fn visit_group_join_clause(
        &mut self,
        clause: &GroupJoinClause,
        _model: &QueryModel,
        _index: usize,
    ) -> ExecutionResult<()> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let matched = self.matches(&clause.join_clause, row)?;
            let mut next = row.clone();
            next.bind_source(clause.id, Value::List(matched));
            rows.push(next);
        }
        self.rows = rows;
        Ok(())
    }

    fn visit_select_clause(
        &mut self,
        clause: &SelectClause,
        _model: &QueryModel,
    ) -> ExecutionResult<()> {
        let items = self
            .rows
            .iter()
            .map(|row| evaluate(&clause.selector, row))
            .collect::<ExecutionResult<Vec<_>>>()?;
        self.output = Some(StreamedData::Sequence(StreamedSequence::new(
            items,
            clause.selector.clone(),
        )));
        Ok(())
    }

    fn visit_result_operator(
        &mut self,
        operator: &ResultOperator,
        _model: &QueryModel,
        _index: usize,
    ) -> ExecutionResult<()> {
        let input = self.output.take().ok_or_else(|| {
            ExecutionError::NotSupported(format!("{} has no input", operator.name()))
        })?;
        self.output = Some(operator.execute_in_memory(input, &self.outer)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Expr, ItemType};
    use crate::model::{BodyClause, Ordering as SortOrdering, QuerySource};

    fn model_over(values: Value) -> QueryModel {
        let from = MainFromClause::new(
            "x",
            ItemType::Int,
            Expr::typed_constant(values, ItemType::sequence(ItemType::Int)),
        );
        let select = SelectClause::new(from.reference());
        QueryModel::new(from, select)
    }

    #[test]
    fn test_where_and_select() {
        let mut model = model_over(Value::ints(0..10));
        let x = model.main_from_clause.reference();
        model
            .add_body_clause(BodyClause::Where(WhereClause {
                predicate: Expr::binary(BinaryOp::GreaterThan, x.clone(), Expr::constant(6i64)),
            }))
            .unwrap();
        model.select_clause = SelectClause::new(Expr::binary(BinaryOp::Multiply, x, Expr::constant(10i64)));
        let result = model.execute_in_memory().unwrap();
        assert_eq!(result.into_value(), Value::ints([70, 80, 90]));
    }

    #[test]
    fn test_order_by_descending_is_stable() {
        let mut model = model_over(Value::ints([3, 1, 2]));
        let x = model.main_from_clause.reference();
        model
            .add_body_clause(BodyClause::OrderBy(OrderByClause {
                orderings: vec![SortOrdering::new(x, OrderingDirection::Desc)],
            }))
            .unwrap();
        assert_eq!(
            model.execute_in_memory().unwrap().into_value(),
            Value::ints([3, 2, 1])
        );
    }

    #[test]
    fn test_table_source_is_rejected() {
        let model = model_over(Value::Table("numbers".into()));
        assert!(matches!(
            model.execute_in_memory(),
            Err(ExecutionError::NotSupported(_))
        ));
    }

    #[test]
    fn test_operators_run_in_declared_order() {
        let mut model = model_over(Value::ints(0..10));
        model.add_result_operator(ResultOperator::skip(5)).unwrap();
        model.add_result_operator(ResultOperator::take(2)).unwrap();
        assert_eq!(
            model.execute_in_memory().unwrap().into_value(),
            Value::ints([5, 6])
        );
    }
}
