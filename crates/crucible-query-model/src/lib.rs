//! # Crucible Query Model
//!
//! Turns combinator pipelines (`source.Where(..).Select(..).Count()`) into a
//! query model: a head source, body clauses, a projection and an ordered list
//! of result operators, with every step's parameters rewritten to refer to
//! the clauses that feed them.
//!
//! ## Module Organization
//!
//! - `expr`: pipeline expression trees, values, item types, rewriting visitor
//! - `model`: query model, clauses, builder, cloning and model visitor
//! - `result_operators`: result operators and their in-memory semantics
//! - `parsing`: node registry, pipeline nodes, resolver and the top-level parser
//! - `syntax`: textual method-chain front end
//! - `execution`: in-memory executor for parsed models
//! - `config`: parser options
//!
//! ## Quick Start
//!
//! ```
//! use crucible_query_model::execution::InMemoryExecutor;
//! use crucible_query_model::expr::{ItemType, Value};
//! use crucible_query_model::syntax::SourceCatalog;
//! use crucible_query_model::QueryParser;
//!
//! let catalog = SourceCatalog::new().with_list("numbers", ItemType::Int, Value::ints(0..10));
//! let model = QueryParser::new()
//!     .parse_text("numbers.Where(n => n > 5).Select(n => n * 2)", &catalog)
//!     .unwrap();
//! assert_eq!(model.to_string(), "from n in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] where ([n] > 5) select ([n] * 2)");
//!
//! let result = InMemoryExecutor::new().execute(&model).unwrap();
//! assert_eq!(result.into_value(), Value::ints([12, 14, 16, 18]));
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod expr;
pub mod model;
pub mod parsing;
pub mod result_operators;
pub mod syntax;

pub use config::ParserOptions;
pub use error::{ExecutionError, ExecutionResult, ModelError, ParseError, ParseResult};
pub use execution::InMemoryExecutor;
pub use expr::{Expr, ExprRef, ItemType, Pipeline, Value};
pub use model::{QueryModel, QueryModelBuilder};
pub use parsing::{NodeTypeRegistry, NodeTypeRegistryBuilder, QueryParser};
pub use result_operators::{ResultOperator, StreamedData};
pub use syntax::{PipelineSyntax, SourceCatalog};
