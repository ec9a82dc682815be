//! The query model and its structural operations.

use crate::error::{ExecutionResult, ModelError, ParseError, ParseResult};
use crate::execution::InMemoryExecutor;
use crate::expr::{ExprRef, ItemType};
use crate::model::ExprRewriter;
use crate::model::visitor::QueryModelVisitor;
use crate::model::{
    BodyClause, Clause, CloneContext, MainFromClause, ModelId, QuerySource, SelectClause, SourceId,
};
use crate::result_operators::{ResultOperator, StreamedData};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Head clause, ordered body clauses, terminal projection and ordered result
/// operators.
///
/// Every query source inside one model has a unique item name. A model
/// embedded in another step's parameters records its parent exactly once.
#[derive(Debug)]
pub struct QueryModel {
    id: ModelId,
    pub main_from_clause: MainFromClause,
    pub body_clauses: Vec<BodyClause>,
    pub select_clause: SelectClause,
    pub result_operators: Vec<ResultOperator>,
    /// Declared result type, when a consumer overrides the computed one
    pub result_type_override: Option<ItemType>,
    parent: OnceCell<ModelId>,
}

impl QueryModel {
    pub fn new(main_from_clause: MainFromClause, select_clause: SelectClause) -> Self {
        Self::with_id(ModelId::next(), main_from_clause, Vec::new(), select_clause, Vec::new())
    }

    pub(crate) fn with_id(
        id: ModelId,
        main_from_clause: MainFromClause,
        body_clauses: Vec<BodyClause>,
        select_clause: SelectClause,
        result_operators: Vec<ResultOperator>,
    ) -> Self {
        Self {
            id,
            main_from_clause,
            body_clauses,
            select_clause,
            result_operators,
            result_type_override: None,
            parent: OnceCell::new(),
        }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Enclosing model, once this model has been attached to one
    pub fn parent(&self) -> Option<ModelId> {
        self.parent.get().copied()
    }

    pub fn set_parent(&self, parent: ModelId) -> Result<(), ModelError> {
        self.parent
            .set(parent)
            .map_err(|_| ModelError::ParentAlreadySet(self.id.as_u64()))
    }

    /// Append a body clause, rejecting a query-source name already in use.
    /// A group join claims both its own name and its inner join's.
    pub fn add_body_clause(&mut self, clause: BodyClause) -> ParseResult<()> {
        if let BodyClause::GroupJoin(group_join) = &clause {
            self.ensure_unique_name(&group_join.join_clause.item_name)?;
            if group_join.join_clause.item_name == group_join.item_name {
                return Err(ParseError::DuplicateName(group_join.item_name.clone()));
            }
        }
        if let Some(source) = clause.as_query_source() {
            self.ensure_unique_name(source.item_name())?;
        }
        self.body_clauses.push(clause);
        Ok(())
    }

    pub fn add_result_operator(&mut self, operator: ResultOperator) -> ParseResult<()> {
        if let Some(source) = operator.as_query_source() {
            self.ensure_unique_name(source.item_name())?;
        }
        self.result_operators.push(operator);
        Ok(())
    }

    fn ensure_unique_name(&self, name: &str) -> ParseResult<()> {
        if self.used_names().contains(name) {
            return Err(ParseError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Item names of every query source, plus the inner items of group joins
    fn used_names(&self) -> HashSet<&str> {
        let mut names: HashSet<&str> = self.query_sources().iter().map(|s| s.item_name()).collect();
        names.extend(self.body_clauses.iter().filter_map(|clause| match clause {
            BodyClause::GroupJoin(group_join) => Some(group_join.join_clause.item_name.as_str()),
            _ => None,
        }));
        names
    }

    /// Every named output in the model, head first
    pub fn query_sources(&self) -> Vec<&dyn QuerySource> {
        let mut sources: Vec<&dyn QuerySource> = vec![&self.main_from_clause];
        sources.extend(self.body_clauses.iter().filter_map(BodyClause::as_query_source));
        sources.extend(
            self.result_operators
                .iter()
                .filter_map(ResultOperator::as_query_source),
        );
        sources
    }

    /// Query sources of this model and every nested model reachable from its
    /// expressions
    pub fn all_query_sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.query_sources().iter().map(|s| s.id()).collect();
        for nested in self.nested_models() {
            ids.extend(nested.all_query_sources());
        }
        ids
    }

    pub fn find_query_source(&self, id: SourceId) -> Option<&dyn QuerySource> {
        self.query_sources().into_iter().find(|s| s.id() == id)
    }

    /// Clause preceding body clause `index`; `index == body_clauses.len()`
    /// asks for the clause before the terminal projection
    pub fn previous_clause(&self, index: usize) -> Option<Clause<'_>> {
        match index {
            0 => Some(Clause::MainFrom(&self.main_from_clause)),
            i if i <= self.body_clauses.len() => Some(Clause::Body(&self.body_clauses[i - 1])),
            _ => None,
        }
    }

    /// `prefix` followed by the first counter value not used as a query
    /// source name in this model
    pub fn get_new_name(&self, prefix: &str) -> String {
        let used = self.used_names();
        (0..)
            .map(|i| format!("{}{}", prefix, i))
            .find(|name| !used.contains(name.as_str()))
            .unwrap_or_else(|| prefix.to_string())
    }

    /// Item type produced by the terminal projection
    pub fn output_item_type(&self) -> ItemType {
        self.select_clause.output_item_type()
    }

    /// Shape of the whole query after every result operator
    pub fn result_type(&self) -> ItemType {
        if let Some(ty) = &self.result_type_override {
            return ty.clone();
        }
        self.result_operators
            .iter()
            .fold(ItemType::sequence(self.output_item_type()), |ty, op| {
                op.output_type(&ty)
            })
    }

    pub fn accept<V: QueryModelVisitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        visitor.visit_query_model(self)
    }

    /// Deep clone with fresh ids; the mapping is discarded
    pub fn clone_model(&self) -> QueryModel {
        self.clone_with(&mut CloneContext::new())
    }

    /// Deep clone into a disjoint graph. Back-references into this model are
    /// redirected to the clone; `ctx` keeps the original-to-clone mapping.
    pub fn clone_with(&self, ctx: &mut CloneContext) -> QueryModel {
        let id = ModelId::next();
        let parent = ctx.current_model();
        ctx.enter_model(id);

        let main_from_clause = self.main_from_clause.clone_with(ctx);
        let body_clauses = self
            .body_clauses
            .iter()
            .map(|clause| clause.clone_with(ctx))
            .collect();
        let select_clause = self.select_clause.clone_with(ctx);
        let result_operators = self
            .result_operators
            .iter()
            .map(|op| op.clone_with(ctx))
            .collect();
        ctx.leave_model();

        let mut clone = QueryModel::with_id(
            id,
            main_from_clause,
            body_clauses,
            select_clause,
            result_operators,
        );
        clone.result_type_override = self.result_type_override.clone();
        if let Some(parent) = parent {
            clone.parent = OnceCell::with_value(parent);
        }
        debug!(original = %self.id, clone = %id, "cloned query model");
        clone
    }

    /// Apply `f` to every expression owned by the model's clauses and
    /// operators, in traversal order
    pub fn transform_expressions(&mut self, f: &mut ExprRewriter<'_>) {
        self.main_from_clause.transform_expressions(f);
        for clause in &mut self.body_clauses {
            clause.transform_expressions(f);
        }
        self.select_clause.transform_expressions(f);
        for op in &mut self.result_operators {
            op.transform_expressions(f);
        }
    }

    /// Models embedded directly in this model's expressions
    pub fn nested_models(&self) -> Vec<&QueryModel> {
        let mut exprs: Vec<&ExprRef> = vec![&self.main_from_clause.from_expression];
        for clause in &self.body_clauses {
            match clause {
                BodyClause::AdditionalFrom(c) => exprs.push(&c.from_expression),
                BodyClause::Where(c) => exprs.push(&c.predicate),
                BodyClause::OrderBy(c) => exprs.extend(c.orderings.iter().map(|o| &o.expression)),
                BodyClause::Join(c) => {
                    exprs.extend([&c.inner_sequence, &c.outer_key_selector, &c.inner_key_selector])
                }
                BodyClause::GroupJoin(c) => exprs.extend([
                    &c.join_clause.inner_sequence,
                    &c.join_clause.outer_key_selector,
                    &c.join_clause.inner_key_selector,
                ]),
            }
        }
        exprs.push(&self.select_clause.selector);
        for op in &self.result_operators {
            exprs.extend(op.expressions());
        }

        let mut models = Vec::new();
        for expr in exprs {
            collect_sub_queries(expr, &mut models);
        }
        models
    }

    /// Run the model against in-memory sources
    pub fn execute_in_memory(&self) -> ExecutionResult<StreamedData> {
        InMemoryExecutor::new().execute(self)
    }
}

fn collect_sub_queries<'a>(expr: &'a ExprRef, out: &mut Vec<&'a QueryModel>) {
    use crate::expr::Expr;
    match expr.as_ref() {
        Expr::SubQuery(s) => out.push(&s.model),
        Expr::Constant(_) | Expr::Parameter(_) | Expr::QuerySource(_) => {}
        Expr::Unary(u) => collect_sub_queries(&u.operand, out),
        Expr::Binary(b) => {
            collect_sub_queries(&b.left, out);
            collect_sub_queries(&b.right, out);
        }
        Expr::Conditional(c) => {
            collect_sub_queries(&c.test, out);
            collect_sub_queries(&c.if_true, out);
            collect_sub_queries(&c.if_false, out);
        }
        Expr::Member(m) => collect_sub_queries(&m.target, out),
        Expr::New(n) => n.members.iter().for_each(|(_, e)| collect_sub_queries(e, out)),
        Expr::List(l) => l.items.iter().for_each(|e| collect_sub_queries(e, out)),
        Expr::Lambda(l) => collect_sub_queries(&l.body, out),
        Expr::Call(c) => c.args.iter().for_each(|e| collect_sub_queries(e, out)),
    }
}

impl fmt::Display for QueryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.main_from_clause)?;
        for clause in &self.body_clauses {
            write!(f, " {}", clause)?;
        }
        write!(f, " {}", self.select_clause)?;
        for op in &self.result_operators {
            write!(f, " => {}", op)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Expr, Value};
    use crate::model::{AdditionalFromClause, GroupJoinClause, JoinClause, WhereClause};
    use std::sync::Arc;

    fn simple_model() -> QueryModel {
        let from = MainFromClause::new(
            "x",
            ItemType::Int,
            Expr::typed_constant(Value::ints(0..10), ItemType::sequence(ItemType::Int)),
        );
        let select = SelectClause::new(from.reference());
        QueryModel::new(from, select)
    }

    #[test]
    fn test_display() {
        let mut model = simple_model();
        let predicate = Expr::binary(
            BinaryOp::GreaterThan,
            model.main_from_clause.reference(),
            Expr::constant(5i64),
        );
        model
            .add_body_clause(BodyClause::Where(WhereClause { predicate }))
            .unwrap();
        model.add_result_operator(ResultOperator::Count).unwrap();
        assert_eq!(
            model.to_string(),
            "from x in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] where ([x] > 5) select [x] => Count()"
        );
    }

    #[test]
    fn test_duplicate_body_source_name_rejected() {
        let mut model = simple_model();
        let clause = BodyClause::AdditionalFrom(AdditionalFromClause::with_id(
            SourceId::next(),
            "x",
            ItemType::Int,
            Expr::parameter("ys"),
        ));
        let err = model.add_body_clause(clause).unwrap_err();
        assert_eq!(err, ParseError::DuplicateName("x".to_string()));
    }

    fn group_join(inner: &str, group: &str) -> BodyClause {
        BodyClause::GroupJoin(GroupJoinClause {
            id: SourceId::next(),
            item_name: group.to_string(),
            item_type: ItemType::sequence(ItemType::Int),
            join_clause: JoinClause {
                id: SourceId::next(),
                item_name: inner.to_string(),
                item_type: ItemType::Int,
                inner_sequence: Expr::parameter("ys"),
                outer_key_selector: Expr::constant(1i64),
                inner_key_selector: Expr::constant(1i64),
            },
        })
    }

    #[test]
    fn test_group_join_inner_name_must_be_unique() {
        let mut model = simple_model();
        let err = model.add_body_clause(group_join("x", "g")).unwrap_err();
        assert_eq!(err, ParseError::DuplicateName("x".to_string()));
        assert!(model.body_clauses.is_empty());

        let err = model.add_body_clause(group_join("y", "y")).unwrap_err();
        assert_eq!(err, ParseError::DuplicateName("y".to_string()));
    }

    #[test]
    fn test_group_join_inner_name_is_claimed() {
        let mut model = simple_model();
        model.add_body_clause(group_join("y", "g")).unwrap();

        let clause = BodyClause::AdditionalFrom(AdditionalFromClause::with_id(
            SourceId::next(),
            "y",
            ItemType::Int,
            Expr::parameter("zs"),
        ));
        assert_eq!(
            model.add_body_clause(clause).unwrap_err(),
            ParseError::DuplicateName("y".to_string())
        );
        assert_eq!(model.get_new_name("y"), "y0");
    }

    #[test]
    fn test_nested_clone_records_parent() {
        let inner = Arc::new(simple_model());
        let from = MainFromClause::new("n", ItemType::Int, Expr::sub_query(inner));
        let select = SelectClause::new(from.reference());
        let outer = QueryModel::new(from, select);

        let clone = outer.clone_model();

        let nested = clone.nested_models();
        assert_eq!(nested[0].parent(), Some(clone.id()));
        assert!(matches!(
            nested[0].set_parent(ModelId::next()),
            Err(ModelError::ParentAlreadySet(_))
        ));
    }

    #[test]
    fn test_parent_set_once() {
        let model = simple_model();
        let outer = ModelId::next();
        model.set_parent(outer).unwrap();
        assert_eq!(model.parent(), Some(outer));
        assert!(matches!(
            model.set_parent(ModelId::next()),
            Err(ModelError::ParentAlreadySet(_))
        ));
    }

    #[test]
    fn test_result_type_folds_operators() {
        let mut model = simple_model();
        assert_eq!(model.result_type(), ItemType::sequence(ItemType::Int));
        model.add_result_operator(ResultOperator::Count).unwrap();
        assert_eq!(model.result_type(), ItemType::Int);
    }

    #[test]
    fn test_previous_clause() {
        let mut model = simple_model();
        assert!(matches!(model.previous_clause(0), Some(Clause::MainFrom(_))));
        model
            .add_body_clause(BodyClause::Where(WhereClause {
                predicate: Expr::constant(true),
            }))
            .unwrap();
        assert!(matches!(model.previous_clause(1), Some(Clause::Body(_))));
        assert!(model.previous_clause(2).is_none());
    }

    #[test]
    fn test_get_new_name_skips_used() {
        let model = simple_model();
        assert_eq!(model.get_new_name("x"), "x0");
        assert_eq!(model.get_new_name("y"), "y0");
    }

    #[test]
    fn test_clone_redirects_references() {
        let model = simple_model();
        let mut ctx = CloneContext::new();
        let clone = model.clone_with(&mut ctx);

        assert_ne!(clone.id(), model.id());
        assert_ne!(clone.main_from_clause.id, model.main_from_clause.id);
        assert_eq!(
            ctx.mapping().get(model.main_from_clause.id).map(|r| r.id),
            Some(clone.main_from_clause.id)
        );
        match clone.select_clause.selector.as_ref() {
            Expr::QuerySource(r) => assert_eq!(r.id, clone.main_from_clause.id),
            other => panic!("expected reference, got {}", other),
        }
        // constant source is shared, not copied
        assert!(Arc::ptr_eq(
            &clone.main_from_clause.from_expression,
            &model.main_from_clause.from_expression
        ));
        assert_eq!(clone.to_string(), model.to_string());
    }
}
