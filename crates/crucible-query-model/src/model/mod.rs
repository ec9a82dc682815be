//! Query model: the structured output of a pipeline parse.
//!
//! A model owns one head [`MainFromClause`], ordered [`BodyClause`]s, one
//! terminal [`SelectClause`] and ordered result operators. Clauses that
//! produce named output implement [`QuerySource`] and are referenced from
//! expressions through stable [`SourceId`] handles rather than pointers.

mod builder;
mod clauses;
mod clone;
mod query_model;
pub mod visitor;

pub use builder::QueryModelBuilder;
pub use clauses::{
    AdditionalFromClause, BodyClause, Clause, ExprRewriter, GroupJoinClause, JoinClause,
    MainFromClause, OrderByClause, Ordering, OrderingDirection, QuerySource, SelectClause,
    WhereClause,
};
pub use clone::{CloneContext, QuerySourceMapping};
pub use query_model::QueryModel;
pub use visitor::QueryModelVisitor;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a query source (clause or operator with named output)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable identity of a query model, used for parent links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

impl ModelId {
    pub fn next() -> Self {
        ModelId(NEXT_MODEL_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}
