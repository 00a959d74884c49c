//! Fixed-sequence architecture generators.
//!
//! These enumerate literal hyperparameters in attach order and carry no
//! topology logic. Wiring is implicit: each node reads from the one
//! attached before it, except the final loss which names its prediction
//! and label inputs explicitly.

use tracing::debug;

use crate::errors::GraphError;
use crate::graph::{
    ConvParams, Initializer, InnerProductParams, LossParams, NetGraph, Node, NodeInput, Operation,
    PoolParams, WeightDecay,
};

/// The classic AlexNet-style stack for 10-class inputs.
pub fn build_alex_net() -> Result<NetGraph, GraphError> {
    debug!("building alex net");
    let mut graph = NetGraph::new();

    graph.attach(Node::new(
        "conv1",
        Operation::Convolution(
            ConvParams::new([5, 5], [1, 1], 64)
                .with_init(Initializer::TruncatedNormal { stddev: 1e-4 })
                .with_weight_decay(WeightDecay::l2(0.0)),
        ),
    ))?;
    graph.attach(Node::new("relu1", Operation::Relu))?;
    graph.attach(Node::new(
        "pool1",
        Operation::Pooling(PoolParams::max([3, 3], [2, 2])),
    ))?;
    graph.attach(Node::new("norm1", Operation::Lrn))?;

    graph.attach(Node::new(
        "conv2",
        Operation::Convolution(
            ConvParams::new([5, 5], [1, 1], 64)
                .with_init(Initializer::TruncatedNormal { stddev: 1e-4 })
                .with_weight_decay(WeightDecay::l2(0.0))
                .with_initial_bias(0.1),
        ),
    ))?;
    graph.attach(Node::new("relu2", Operation::Relu))?;
    graph.attach(Node::new("norm2", Operation::Lrn))?;
    graph.attach(Node::new(
        "pool2",
        Operation::Pooling(PoolParams::max([3, 3], [2, 2])),
    ))?;

    graph.attach(Node::new(
        "ip1",
        Operation::InnerProduct(
            InnerProductParams::new(384)
                .with_init(Initializer::TruncatedNormal { stddev: 0.04 })
                .with_weight_decay(WeightDecay::l2(0.004))
                .with_initial_bias(0.1),
        ),
    ))?;
    graph.attach(Node::new("relu3", Operation::Relu))?;

    graph.attach(Node::new(
        "ip2",
        Operation::InnerProduct(
            InnerProductParams::new(192)
                .with_init(Initializer::TruncatedNormal { stddev: 0.04 })
                .with_weight_decay(WeightDecay::l2(0.004))
                .with_initial_bias(0.1),
        ),
    ))?;
    graph.attach(Node::new(
        "softmax_linear",
        Operation::InnerProduct(
            InnerProductParams::new(10)
                .with_init(Initializer::TruncatedNormal {
                    stddev: 1.0 / 192.0,
                })
                .with_weight_decay(WeightDecay::l2(0.0))
                .with_initial_bias(0.0),
        ),
    ))?;

    graph.attach(
        Node::new("loss", Operation::SoftmaxLoss(LossParams::new(10))).with_inputs(vec![
            NodeInput::output("softmax_linear"),
            NodeInput::system_in(1),
        ]),
    )?;

    Ok(graph)
}

/// The smallest useful network: one conv block and a classifier.
pub fn build_one_layer_net() -> Result<NetGraph, GraphError> {
    debug!("building one-layer net");
    let mut graph = NetGraph::new();

    graph.attach(Node::new(
        "conv1",
        Operation::Convolution(ConvParams::new([5, 5], [1, 1], 32)),
    ))?;
    graph.attach(Node::new("relu1", Operation::Relu))?;
    graph.attach(Node::new(
        "pool1",
        Operation::Pooling(PoolParams::max([5, 5], [5, 5])),
    ))?;

    graph.attach(Node::new(
        "ip1",
        Operation::InnerProduct(InnerProductParams::new(10)),
    ))?;
    graph.attach(
        Node::new("loss", Operation::SoftmaxLoss(LossParams::new(10)))
            .with_inputs(vec![NodeInput::output("ip1"), NodeInput::system_in(1)]),
    )?;

    Ok(graph)
}

/// A rough LeNet for 10-class inputs.
pub fn build_le_net() -> Result<NetGraph, GraphError> {
    debug!("building le net");
    let mut graph = NetGraph::new();

    graph.attach(Node::new(
        "conv1",
        Operation::Convolution(ConvParams::new([5, 5], [1, 1], 32)),
    ))?;
    graph.attach(Node::new("relu1", Operation::Relu))?;
    graph.attach(Node::new(
        "pool1",
        Operation::Pooling(PoolParams::max([2, 2], [2, 2])),
    ))?;

    graph.attach(Node::new(
        "conv2",
        Operation::Convolution(ConvParams::new([5, 5], [1, 1], 64)),
    ))?;
    graph.attach(Node::new("relu2", Operation::Relu))?;
    graph.attach(Node::new(
        "pool2",
        Operation::Pooling(PoolParams::max([5, 5], [2, 2])),
    ))?;

    graph.attach(Node::new(
        "ip1",
        Operation::InnerProduct(InnerProductParams::new(512)),
    ))?;
    graph.attach(Node::new("relu3", Operation::Relu))?;
    graph.attach(Node::new(
        "ip2",
        Operation::InnerProduct(InnerProductParams::new(10)),
    ))?;

    graph.attach(
        Node::new("loss", Operation::SoftmaxLoss(LossParams::new(10)))
            .with_inputs(vec![NodeInput::output("ip2"), NodeInput::system_in(1)]),
    )?;

    Ok(graph)
}

/// LeNet shape with the hyperparameters of the TensorFlow MNIST tutorial.
pub fn build_mnist_tutorial_net() -> Result<NetGraph, GraphError> {
    debug!("building mnist tutorial net");
    let mut graph = NetGraph::new();

    graph.attach(Node::new(
        "conv1",
        Operation::Convolution(
            ConvParams::new([5, 5], [1, 1], 32)
                .with_init(Initializer::TruncatedNormal { stddev: 0.1 })
                .with_weight_decay(WeightDecay::l2(5e-4))
                .with_initial_bias(0.0),
        ),
    ))?;
    graph.attach(Node::new("relu1", Operation::Relu))?;
    graph.attach(Node::new(
        "pool1",
        Operation::Pooling(PoolParams::max([2, 2], [2, 2])),
    ))?;

    graph.attach(Node::new(
        "conv2",
        Operation::Convolution(
            ConvParams::new([5, 5], [1, 1], 64)
                .with_init(Initializer::TruncatedNormal { stddev: 0.1 })
                .with_weight_decay(WeightDecay::l2(5e-4))
                .with_initial_bias(0.1),
        ),
    ))?;
    graph.attach(Node::new("relu2", Operation::Relu))?;
    graph.attach(Node::new(
        "pool2",
        Operation::Pooling(PoolParams::max([5, 5], [2, 2])),
    ))?;

    graph.attach(Node::new(
        "ip1",
        Operation::InnerProduct(
            InnerProductParams::new(512)
                .with_init(Initializer::TruncatedNormal { stddev: 0.1 })
                .with_weight_decay(WeightDecay::l2(5e-4))
                .with_initial_bias(0.1),
        ),
    ))?;
    graph.attach(Node::new("relu3", Operation::Relu))?;
    graph.attach(Node::new("dropout1", Operation::Dropout { keep_prob: 0.5 }))?;

    graph.attach(Node::new(
        "ip2",
        Operation::InnerProduct(
            InnerProductParams::new(10)
                .with_init(Initializer::TruncatedNormal { stddev: 0.1 })
                .with_weight_decay(WeightDecay::l2(5e-4))
                .with_initial_bias(0.1),
        ),
    ))?;

    graph.attach(
        Node::new("loss", Operation::SoftmaxLoss(LossParams::new(10)))
            .with_inputs(vec![NodeInput::output("ip2"), NodeInput::system_in(1)]),
    )?;

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Operation;

    #[test]
    fn test_alex_net_layer_order() {
        let graph = build_alex_net().unwrap();
        let names: Vec<&str> = graph.nodes().iter().map(|n| n.name()).collect();
        assert_eq!(
            names,
            [
                "conv1", "relu1", "pool1", "norm1", "conv2", "relu2", "norm2", "pool2", "ip1",
                "relu3", "ip2", "softmax_linear", "loss"
            ]
        );
    }

    #[test]
    fn test_alex_net_loss_wiring() {
        let graph = build_alex_net().unwrap();
        let loss = graph.lookup("loss").unwrap();
        assert_eq!(loss.inputs()[0], NodeInput::output("softmax_linear"));
        assert_eq!(loss.inputs()[1], NodeInput::system_in(1));
    }

    #[test]
    fn test_one_layer_net_shape() {
        let graph = build_one_layer_net().unwrap();
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.lookup("conv1").unwrap().out_channels(), Some(32));
        assert_eq!(graph.lookup("ip1").unwrap().out_channels(), Some(10));
    }

    #[test]
    fn test_le_net_channels() {
        let graph = build_le_net().unwrap();
        assert_eq!(graph.lookup("conv1").unwrap().out_channels(), Some(32));
        assert_eq!(graph.lookup("conv2").unwrap().out_channels(), Some(64));
        assert_eq!(graph.lookup("ip1").unwrap().out_channels(), Some(512));
    }

    #[test]
    fn test_mnist_tutorial_net_has_dropout_before_classifier() {
        let graph = build_mnist_tutorial_net().unwrap();
        let dropout = graph.lookup("dropout1").unwrap();
        assert!(matches!(
            dropout.op(),
            Operation::Dropout { keep_prob } if *keep_prob == 0.5
        ));
        let ip2 = graph.lookup("ip2").unwrap();
        assert_eq!(ip2.inputs()[0], NodeInput::output("dropout1"));
    }
}
