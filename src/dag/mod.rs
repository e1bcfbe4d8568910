// src/dag/mod.rs

//! Task dependency handling.
//!
//! - [`resolve`] produces the linear, de-duplicated execution order used by
//!   the scheduler for one invocation.
//! - [`graph`] is a tolerant adjacency view used for reporting.

pub mod graph;
pub mod resolve;

pub use graph::DependencyGraph;
pub use resolve::resolve_execution_order;
