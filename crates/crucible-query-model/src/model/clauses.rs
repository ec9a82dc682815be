//! Clause types held by a query model.

use crate::expr::{Expr, ExprRef, ItemType, QuerySourceRef};
use crate::model::visitor::QueryModelVisitor;
use crate::model::{CloneContext, QueryModel, SourceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Rewrite callback applied to every owned expression field
pub type ExprRewriter<'a> = dyn FnMut(&ExprRef) -> ExprRef + 'a;

/// A clause or operator whose output other steps can reference by name.
pub trait QuerySource {
    fn id(&self) -> SourceId;

    fn item_name(&self) -> &str;

    fn item_type(&self) -> &ItemType;

    fn source_ref(&self) -> QuerySourceRef {
        QuerySourceRef {
            id: self.id(),
            name: self.item_name().to_string(),
            item_type: self.item_type().clone(),
        }
    }

    /// Back-reference expression naming this source
    fn reference(&self) -> ExprRef {
        Arc::new(Expr::QuerySource(self.source_ref()))
    }
}

macro_rules! impl_query_source {
    ($ty:ty) => {
        impl QuerySource for $ty {
            fn id(&self) -> SourceId {
                self.id
            }

            fn item_name(&self) -> &str {
                &self.item_name
            }

            fn item_type(&self) -> &ItemType {
                &self.item_type
            }
        }
    };
}

/// Head clause: `from x in source`
#[derive(Debug, Clone)]
pub struct MainFromClause {
    pub id: SourceId,
    pub item_name: String,
    pub item_type: ItemType,
    pub from_expression: ExprRef,
}

impl_query_source!(MainFromClause);

impl MainFromClause {
    pub fn new(item_name: impl Into<String>, item_type: ItemType, from_expression: ExprRef) -> Self {
        Self::with_id(SourceId::next(), item_name, item_type, from_expression)
    }

    /// Use an id that was handed out before the clause existed
    pub fn with_id(
        id: SourceId,
        item_name: impl Into<String>,
        item_type: ItemType,
        from_expression: ExprRef,
    ) -> Self {
        Self {
            id,
            item_name: item_name.into(),
            item_type,
            from_expression,
        }
    }

    pub fn accept<V: QueryModelVisitor + ?Sized>(
        &self,
        visitor: &mut V,
        model: &QueryModel,
    ) -> Result<(), V::Error> {
        visitor.visit_main_from_clause(self, model)
    }

    pub fn clone_with(&self, ctx: &mut CloneContext) -> Self {
        let clone = Self::new(
            self.item_name.clone(),
            self.item_type.clone(),
            ctx.adjust_expression(&self.from_expression),
        );
        ctx.register(self, &clone);
        clone
    }

    pub fn transform_expressions(&mut self, f: &mut ExprRewriter<'_>) {
        self.from_expression = f(&self.from_expression);
    }
}

impl fmt::Display for MainFromClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {} in {}", self.item_name, self.from_expression)
    }
}

/// Extra source flattened into the stream: `from y in e`
#[derive(Debug, Clone)]
pub struct AdditionalFromClause {
    pub id: SourceId,
    pub item_name: String,
    pub item_type: ItemType,
    pub from_expression: ExprRef,
}

impl_query_source!(AdditionalFromClause);

impl AdditionalFromClause {
    pub fn with_id(
        id: SourceId,
        item_name: impl Into<String>,
        item_type: ItemType,
        from_expression: ExprRef,
    ) -> Self {
        Self {
            id,
            item_name: item_name.into(),
            item_type,
            from_expression,
        }
    }

    fn clone_with(&self, ctx: &mut CloneContext) -> Self {
        let clone = Self::with_id(
            SourceId::next(),
            self.item_name.clone(),
            self.item_type.clone(),
            ctx.adjust_expression(&self.from_expression),
        );
        ctx.register(self, &clone);
        clone
    }
}

impl fmt::Display for AdditionalFromClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {} in {}", self.item_name, self.from_expression)
    }
}

#[derive(Debug, Clone)]
pub struct WhereClause {
    pub predicate: ExprRef,
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "where {}", self.predicate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderingDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingDirection::Asc => write!(f, "asc"),
            OrderingDirection::Desc => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ordering {
    pub expression: ExprRef,
    pub direction: OrderingDirection,
}

impl Ordering {
    pub fn new(expression: ExprRef, direction: OrderingDirection) -> Self {
        Self {
            expression,
            direction,
        }
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expression, self.direction)
    }
}

/// Sort clause; `ThenBy` steps append to `orderings`
#[derive(Debug, Clone, Default)]
pub struct OrderByClause {
    pub orderings: Vec<Ordering>,
}

impl fmt::Display for OrderByClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "orderby ")?;
        for (i, ordering) in self.orderings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ordering)?;
        }
        Ok(())
    }
}

/// Inner equi-join: `join y in inner on outerKey equals innerKey`
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub id: SourceId,
    pub item_name: String,
    pub item_type: ItemType,
    pub inner_sequence: ExprRef,
    pub outer_key_selector: ExprRef,
    pub inner_key_selector: ExprRef,
}

impl_query_source!(JoinClause);

impl JoinClause {
    fn clone_with(&self, ctx: &mut CloneContext) -> Self {
        let mut clone = self.clone();
        clone.id = SourceId::next();
        // the inner key selector refers to the join itself
        ctx.register(self, &clone);
        clone.transform_expressions(&mut |e| ctx.adjust_expression(e));
        clone
    }

    fn transform_expressions(&mut self, f: &mut ExprRewriter<'_>) {
        self.inner_sequence = f(&self.inner_sequence);
        self.outer_key_selector = f(&self.outer_key_selector);
        self.inner_key_selector = f(&self.inner_key_selector);
    }
}

impl fmt::Display for JoinClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "join {} in {} on {} equals {}",
            self.item_name, self.inner_sequence, self.outer_key_selector, self.inner_key_selector
        )
    }
}

/// Join whose matches are collected per outer element: `join ... into g`
#[derive(Debug, Clone)]
pub struct GroupJoinClause {
    pub id: SourceId,
    pub item_name: String,
    pub item_type: ItemType,
    pub join_clause: JoinClause,
}

impl_query_source!(GroupJoinClause);

impl fmt::Display for GroupJoinClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} into {}", self.join_clause, self.item_name)
    }
}

/// Terminal projection
#[derive(Debug, Clone)]
pub struct SelectClause {
    pub selector: ExprRef,
}

impl SelectClause {
    pub fn new(selector: ExprRef) -> Self {
        Self { selector }
    }

    pub fn accept<V: QueryModelVisitor + ?Sized>(
        &self,
        visitor: &mut V,
        model: &QueryModel,
    ) -> Result<(), V::Error> {
        visitor.visit_select_clause(self, model)
    }

    pub fn clone_with(&self, ctx: &mut CloneContext) -> Self {
        Self::new(ctx.adjust_expression(&self.selector))
    }

    pub fn transform_expressions(&mut self, f: &mut ExprRewriter<'_>) {
        self.selector = f(&self.selector);
    }

    /// Item type the projection produces
    pub fn output_item_type(&self) -> ItemType {
        self.selector.ty()
    }
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select {}", self.selector)
    }
}

/// Any clause between the head and the terminal projection
#[derive(Debug, Clone)]
pub enum BodyClause {
    AdditionalFrom(AdditionalFromClause),
    Where(WhereClause),
    OrderBy(OrderByClause),
    Join(JoinClause),
    GroupJoin(GroupJoinClause),
}

impl BodyClause {
    pub fn accept<V: QueryModelVisitor + ?Sized>(
        &self,
        visitor: &mut V,
        model: &QueryModel,
        index: usize,
    ) -> Result<(), V::Error> {
        match self {
            BodyClause::AdditionalFrom(c) => visitor.visit_additional_from_clause(c, model, index),
            BodyClause::Where(c) => visitor.visit_where_clause(c, model, index),
            BodyClause::OrderBy(c) => visitor.visit_order_by_clause(c, model, index),
            BodyClause::Join(c) => visitor.visit_join_clause(c, model, index),
            BodyClause::GroupJoin(c) => visitor.visit_group_join_clause(c, model, index),
        }
    }

    /// Named output of this clause, if it introduces one
    pub fn as_query_source(&self) -> Option<&dyn QuerySource> {
        match self {
            BodyClause::AdditionalFrom(c) => Some(c),
            BodyClause::Join(c) => Some(c),
            BodyClause::GroupJoin(c) => Some(c),
            BodyClause::Where(_) | BodyClause::OrderBy(_) => None,
        }
    }

    /// Clone into a disjoint clause, registering new query sources in `ctx`
    pub fn clone_with(&self, ctx: &mut CloneContext) -> Self {
        match self {
            BodyClause::AdditionalFrom(c) => BodyClause::AdditionalFrom(c.clone_with(ctx)),
            BodyClause::Where(c) => BodyClause::Where(WhereClause {
                predicate: ctx.adjust_expression(&c.predicate),
            }),
            BodyClause::OrderBy(c) => BodyClause::OrderBy(OrderByClause {
                orderings: c
                    .orderings
                    .iter()
                    .map(|o| Ordering::new(ctx.adjust_expression(&o.expression), o.direction))
                    .collect(),
            }),
            BodyClause::Join(c) => BodyClause::Join(c.clone_with(ctx)),
            BodyClause::GroupJoin(c) => {
                let mut join_clause = c.join_clause.clone();
                join_clause.id = SourceId::next();
                let mut clone = GroupJoinClause {
                    id: SourceId::next(),
                    item_name: c.item_name.clone(),
                    item_type: c.item_type.clone(),
                    join_clause,
                };
                ctx.register(&c.join_clause, &clone.join_clause);
                ctx.register(c, &clone);
                clone
                    .join_clause
                    .transform_expressions(&mut |e| ctx.adjust_expression(e));
                BodyClause::GroupJoin(clone)
            }
        }
    }

    /// Apply `f` to every expression the clause owns. Back-references are
    /// leaves to `f`; other clauses are never reached through them.
    pub fn transform_expressions(&mut self, f: &mut ExprRewriter<'_>) {
        match self {
            BodyClause::AdditionalFrom(c) => c.from_expression = f(&c.from_expression),
            BodyClause::Where(c) => c.predicate = f(&c.predicate),
            BodyClause::OrderBy(c) => {
                for ordering in &mut c.orderings {
                    ordering.expression = f(&ordering.expression);
                }
            }
            BodyClause::Join(c) => c.transform_expressions(f),
            BodyClause::GroupJoin(c) => c.join_clause.transform_expressions(f),
        }
    }
}

impl fmt::Display for BodyClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyClause::AdditionalFrom(c) => fmt::Display::fmt(c, f),
            BodyClause::Where(c) => fmt::Display::fmt(c, f),
            BodyClause::OrderBy(c) => fmt::Display::fmt(c, f),
            BodyClause::Join(c) => fmt::Display::fmt(c, f),
            BodyClause::GroupJoin(c) => fmt::Display::fmt(c, f),
        }
    }
}

/// Borrowed view of any clause position in a model
#[derive(Debug, Clone, Copy)]
pub enum Clause<'a> {
    MainFrom(&'a MainFromClause),
    Body(&'a BodyClause),
    Select(&'a SelectClause),
}

impl fmt::Display for Clause<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::MainFrom(c) => fmt::Display::fmt(c, f),
            Clause::Body(c) => fmt::Display::fmt(c, f),
            Clause::Select(c) => fmt::Display::fmt(c, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Value};

    fn numbers() -> MainFromClause {
        MainFromClause::new(
            "x",
            ItemType::Int,
            Expr::typed_constant(Value::Table("numbers".into()), ItemType::sequence(ItemType::Int)),
        )
    }

    #[test]
    fn test_reference_names_source() {
        let from = numbers();
        let reference = from.reference();
        assert_eq!(reference.to_string(), "[x]");
        assert_eq!(reference.ty(), ItemType::Int);
    }

    #[test]
    fn test_transform_keeps_untouched_expressions() {
        let from = numbers();
        let predicate = Expr::binary(BinaryOp::GreaterThan, from.reference(), Expr::constant(5i64));
        let mut clause = BodyClause::Where(WhereClause {
            predicate: predicate.clone(),
        });
        clause.transform_expressions(&mut |e| e.clone());
        match &clause {
            BodyClause::Where(w) => assert!(Arc::ptr_eq(&w.predicate, &predicate)),
            other => panic!("expected where clause, got {}", other),
        }
    }

    #[test]
    fn test_join_display() {
        let from = numbers();
        let join = JoinClause {
            id: SourceId::next(),
            item_name: "y".into(),
            item_type: ItemType::Int,
            inner_sequence: Expr::parameter("others"),
            outer_key_selector: from.reference(),
            inner_key_selector: Expr::parameter("y"),
        };
        let group_join = GroupJoinClause {
            id: SourceId::next(),
            item_name: "g".into(),
            item_type: ItemType::sequence(ItemType::Int),
            join_clause: join,
        };
        assert_eq!(
            BodyClause::GroupJoin(group_join).to_string(),
            "join y in others on [x] equals y into g"
        );
    }

    #[test]
    fn test_only_source_clauses_are_query_sources() {
        let clause = BodyClause::OrderBy(OrderByClause::default());
        assert!(clause.as_query_source().is_none());
    }
}
