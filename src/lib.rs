//! Declarative construction of neural-network architecture graphs.
//!
//! This crate builds architectures as explicit DAGs of named operation
//! nodes. Generators for classic convolutional stacks and residual
//! networks assemble a [`NetGraph`] node by node; the finished graph is
//! exported as JSON and handed to an execution engine that does the
//! actual tensor work.
//!
//! Graphs are valid by construction: node names are unique, every input
//! reference must already be attached (so the node list is always a
//! topological order), and merge points are checked for channel
//! agreement as they are wired.
//!
//! # Example
//!
//! ```
//! use netgraph::models::{ResNetConfig, build_cifar_resnet};
//!
//! // Wide ResNet, depth 28, width multiplier 2, for 10 classes.
//! let config = ResNetConfig::new().with_depth(28).with_width(2);
//! let graph = build_cifar_resnet(&config).unwrap();
//! let json = graph.export_to_json().unwrap();
//! assert!(json.contains("\"type\": \"MERGE\""));
//! ```

pub mod errors;
pub mod graph;
pub mod models;

pub use errors::GraphError;
pub use graph::{NetGraph, Node, NodeInput, Operation, SYSTEM_IN};

/// Commonly used items, for glob import.
pub mod prelude {
    pub use crate::errors::GraphError;
    pub use crate::graph::{
        ConvParams, GraphExport, Initializer, InnerProductParams, LossParams, NetGraph, Node,
        NodeInput, Operation, PadMode, PoolKind, PoolParams, WeightDecay, SYSTEM_IN,
    };
    pub use crate::models::{
        build_alex_net, build_cifar_resnet, build_imagenet_resnet, build_le_net,
        build_mnist_tutorial_net, build_one_layer_net, build_vgg_net, BlockType, ResNetConfig,
        VggConfig,
    };
}
