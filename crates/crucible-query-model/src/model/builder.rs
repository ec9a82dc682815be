//! Incremental query model construction.

use crate::error::{ParseError, ParseResult};
use crate::model::{
    BodyClause, MainFromClause, ModelId, OrderByClause, QueryModel, QuerySource, SelectClause,
};
use crate::result_operators::ResultOperator;
use std::collections::HashSet;

/// Accumulates clauses in encounter order and checks structural invariants.
///
/// At most one head and one terminal clause; every query-source name unique.
#[derive(Debug)]
pub struct QueryModelBuilder {
    id: ModelId,
    main_from_clause: Option<MainFromClause>,
    body_clauses: Vec<BodyClause>,
    select_clause: Option<SelectClause>,
    result_operators: Vec<ResultOperator>,
    names: HashSet<String>,
}

impl Default for QueryModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryModelBuilder {
    pub fn new() -> Self {
        Self {
            id: ModelId::next(),
            main_from_clause: None,
            body_clauses: Vec::new(),
            select_clause: None,
            result_operators: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Id the built model will carry
    pub fn model_id(&self) -> ModelId {
        self.id
    }

    pub fn add_main_from(&mut self, clause: MainFromClause) -> ParseResult<()> {
        if self.main_from_clause.is_some() {
            return Err(ParseError::DuplicateClauseRole("head"));
        }
        self.claim_name(clause.item_name())?;
        self.main_from_clause = Some(clause);
        Ok(())
    }

    pub fn add_body_clause(&mut self, clause: BodyClause) -> ParseResult<()> {
        if let BodyClause::GroupJoin(group_join) = &clause {
            self.claim_name(&group_join.join_clause.item_name)?;
        }
        if let Some(source) = clause.as_query_source() {
            let name = source.item_name().to_string();
            self.claim_name(&name)?;
        }
        self.body_clauses.push(clause);
        Ok(())
    }

    pub fn set_select_clause(&mut self, clause: SelectClause) -> ParseResult<()> {
        if self.select_clause.is_some() {
            return Err(ParseError::DuplicateClauseRole("terminal"));
        }
        self.select_clause = Some(clause);
        Ok(())
    }

    pub fn add_result_operator(&mut self, operator: ResultOperator) -> ParseResult<()> {
        if let Some(source) = operator.as_query_source() {
            let name = source.item_name().to_string();
            self.claim_name(&name)?;
        }
        self.result_operators.push(operator);
        Ok(())
    }

    fn claim_name(&mut self, name: &str) -> ParseResult<()> {
        if !self.names.insert(name.to_string()) {
            return Err(ParseError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Whether a query source already uses `name`
    pub fn is_name_claimed(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn has_main_from(&self) -> bool {
        self.main_from_clause.is_some()
    }

    pub fn has_select_clause(&self) -> bool {
        self.select_clause.is_some()
    }

    pub fn has_result_operators(&self) -> bool {
        !self.result_operators.is_empty()
    }

    /// Last sort clause, the target of `ThenBy`
    pub fn last_order_by_mut(&mut self) -> Option<&mut OrderByClause> {
        self.body_clauses.iter_mut().rev().find_map(|clause| match clause {
            BodyClause::OrderBy(order_by) => Some(order_by),
            _ => None,
        })
    }

    pub fn build(self) -> ParseResult<QueryModel> {
        let main_from_clause = self
            .main_from_clause
            .ok_or(ParseError::MissingRequiredClause("head"))?;
        let select_clause = self
            .select_clause
            .ok_or(ParseError::MissingRequiredClause("terminal"))?;
        Ok(QueryModel::with_id(
            self.id,
            main_from_clause,
            self.body_clauses,
            select_clause,
            self.result_operators,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, ItemType};
    use crate::model::{JoinClause, SourceId};

    fn head(name: &str) -> MainFromClause {
        MainFromClause::new(name, ItemType::Int, Expr::parameter("xs"))
    }

    #[test]
    fn test_build_requires_head_and_terminal() {
        let builder = QueryModelBuilder::new();
        assert_eq!(
            builder.build().unwrap_err(),
            ParseError::MissingRequiredClause("head")
        );

        let mut builder = QueryModelBuilder::new();
        builder.add_main_from(head("x")).unwrap();
        assert_eq!(
            builder.build().unwrap_err(),
            ParseError::MissingRequiredClause("terminal")
        );
    }

    #[test]
    fn test_second_head_rejected() {
        let mut builder = QueryModelBuilder::new();
        builder.add_main_from(head("x")).unwrap();
        assert_eq!(
            builder.add_main_from(head("y")).unwrap_err(),
            ParseError::DuplicateClauseRole("head")
        );
    }

    #[test]
    fn test_second_terminal_rejected() {
        let mut builder = QueryModelBuilder::new();
        builder
            .set_select_clause(SelectClause::new(Expr::constant(1i64)))
            .unwrap();
        assert_eq!(
            builder
                .set_select_clause(SelectClause::new(Expr::constant(2i64)))
                .unwrap_err(),
            ParseError::DuplicateClauseRole("terminal")
        );
    }

    #[test]
    fn test_duplicate_join_name_rejected() {
        let mut builder = QueryModelBuilder::new();
        builder.add_main_from(head("x")).unwrap();
        let join = JoinClause {
            id: SourceId::next(),
            item_name: "x".into(),
            item_type: ItemType::Int,
            inner_sequence: Expr::parameter("ys"),
            outer_key_selector: Expr::constant(1i64),
            inner_key_selector: Expr::constant(1i64),
        };
        assert_eq!(
            builder.add_body_clause(BodyClause::Join(join)).unwrap_err(),
            ParseError::DuplicateName("x".into())
        );
    }

    #[test]
    fn test_built_model_keeps_builder_id() {
        let mut builder = QueryModelBuilder::new();
        let id = builder.model_id();
        let from = head("x");
        let selector = from.reference();
        builder.add_main_from(from).unwrap();
        builder.set_select_clause(SelectClause::new(selector)).unwrap();
        assert_eq!(builder.build().unwrap().id(), id);
    }
}
