//! Double-dispatch visitor over query models.
//!
//! Every hook has a no-op default; [`walk_query_model`] drives the traversal
//! in model order: head, body clauses, terminal projection, result operators.

use crate::model::{
    AdditionalFromClause, GroupJoinClause, JoinClause, MainFromClause, OrderByClause, Ordering,
    QueryModel, SelectClause, WhereClause,
};
use crate::result_operators::ResultOperator;

pub trait QueryModelVisitor {
    type Error;

    fn visit_query_model(&mut self, model: &QueryModel) -> Result<(), Self::Error> {
        walk_query_model(self, model)
    }

    fn visit_main_from_clause(
        &mut self,
        _clause: &MainFromClause,
        _model: &QueryModel,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_additional_from_clause(
        &mut self,
        _clause: &AdditionalFromClause,
        _model: &QueryModel,
        _index: usize,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_where_clause(
        &mut self,
        _clause: &WhereClause,
        _model: &QueryModel,
        _index: usize,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_order_by_clause(
        &mut self,
        clause: &OrderByClause,
        model: &QueryModel,
        _index: usize,
    ) -> Result<(), Self::Error> {
        for (ordering_index, ordering) in clause.orderings.iter().enumerate() {
            self.visit_ordering(ordering, model, clause, ordering_index)?;
        }
        Ok(())
    }

    fn visit_ordering(
        &mut self,
        _ordering: &Ordering,
        _model: &QueryModel,
        _clause: &OrderByClause,
        _index: usize,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_join_clause(
        &mut self,
        _clause: &JoinClause,
        _model: &QueryModel,
        _index: usize,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_group_join_clause(
        &mut self,
        _clause: &GroupJoinClause,
        _model: &QueryModel,
        _index: usize,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_select_clause(
        &mut self,
        _clause: &SelectClause,
        _model: &QueryModel,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_result_operator(
        &mut self,
        _operator: &ResultOperator,
        _model: &QueryModel,
        _index: usize,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Default traversal used by [`QueryModelVisitor::visit_query_model`]
pub fn walk_query_model<V: QueryModelVisitor + ?Sized>(
    visitor: &mut V,
    model: &QueryModel,
) -> Result<(), V::Error> {
    model.main_from_clause.accept(visitor, model)?;
    for (index, clause) in model.body_clauses.iter().enumerate() {
        clause.accept(visitor, model, index)?;
    }
    model.select_clause.accept(visitor, model)?;
    for (index, operator) in model.result_operators.iter().enumerate() {
        operator.accept(visitor, model, index)?;
    }
    Ok(())
}
