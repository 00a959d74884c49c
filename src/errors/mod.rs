//! Error types for graph construction.

mod graph_error;

pub use graph_error::GraphError;
