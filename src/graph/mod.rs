//! Core graph model: nodes, operations, the append-only container, and
//! JSON export.

mod export;
mod node;
mod operation;
mod registry;

pub use export::GraphExport;
pub use node::{Node, NodeInput, SYSTEM_IN};
pub use operation::{
    ConvParams, DecayKind, Initializer, InnerProductParams, LossParams, Operation, PadMode,
    PoolKind, PoolParams, WeightDecay,
};
pub use registry::NetGraph;
