//! Pipeline parsing.
//!
//! A combinator chain is split into one [`PipelineNode`] per call, head
//! first. Nodes are then applied in source order against a
//! [`ModelAssembly`]; each node resolves the expressions of later steps back
//! onto the clauses that produced their input. Carrier objects introduced by
//! joins and multi-source chains are removed from every resolved expression,
//! and nested pipelines found in arguments become sub-query models.

mod assembly;
mod context;
mod discovery;
mod node;
pub mod nodes;
mod parser;
pub mod registry;
mod transparent;

pub use assembly::ModelAssembly;
pub use context::{ClauseGenerationContext, ParseSession};
pub use discovery::discover_sub_pipelines;
pub use node::{NodeId, NodeKind, ParseInfo, PipelineNode};
pub use parser::QueryParser;
pub use registry::{
    MethodSignature, NodeConstructor, NodeType, NodeTypeRegistry, NodeTypeRegistryBuilder,
};
pub use transparent::remove_transparent_identifiers;
