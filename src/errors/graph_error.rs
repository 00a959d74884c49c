//! Graph-construction error types.

use thiserror::Error;

/// Errors that can occur while assembling an architecture graph.
///
/// All of these are construction-time failures: a malformed architecture
/// aborts the build immediately rather than producing a partially-wired
/// graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node name `{0}` is already attached")]
    DuplicateName(String),

    #[error("input `{0}` does not resolve to an attached node")]
    UnresolvedReference(String),

    #[error("invalid depth {0}: (depth - 4) must be divisible by 6")]
    InvalidDepth(usize),

    #[error("depth {0} is not in the supported depth table")]
    UnsupportedDepth(usize),

    #[error("block type `{0}` is not supported")]
    UnsupportedBlockType(String),

    #[error("channel mismatch: {0}")]
    ChannelMismatch(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
