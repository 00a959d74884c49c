//! VGG-style generator: conv-bn-relu blocks with interleaved dropout and
//! pooling, named by a running top-layer counter.

use tracing::debug;

use crate::errors::GraphError;
use crate::graph::{
    ConvParams, Initializer, InnerProductParams, LossParams, NetGraph, Node, NodeInput, Operation,
    PadMode, PoolParams, WeightDecay,
};

/// Configuration of the VGG-style network.
#[derive(Debug, Clone)]
pub struct VggConfig {
    pub class_count: usize,
    pub padding: PadMode,
    /// Replacement for the default softmax loss. The override is wired to
    /// the classifier output and the label batch like the default.
    pub loss: Option<Operation>,
}

impl Default for VggConfig {
    fn default() -> Self {
        Self {
            class_count: 10,
            padding: PadMode::Same,
            loss: None,
        }
    }
}

impl VggConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class_count(mut self, class_count: usize) -> Self {
        self.class_count = class_count;
        self
    }

    pub fn with_padding(mut self, padding: PadMode) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_loss(mut self, loss: Operation) -> Self {
        self.loss = Some(loss);
        self
    }
}

struct VggBuilder {
    graph: NetGraph,
    padding: PadMode,
    // Counts applied convolution layers; used to name each layer.
    top_layer_no: usize,
}

impl VggBuilder {
    fn attach_conv_bn_relu(&mut self, out_channels: usize) -> Result<(), GraphError> {
        self.top_layer_no += 1;
        let no = self.top_layer_no;
        self.graph.attach(Node::new(
            format!("conv{no}"),
            Operation::Convolution(
                ConvParams::new([3, 3], [1, 1], out_channels)
                    .with_padding(self.padding)
                    .with_init(Initializer::TruncatedNormal { stddev: 1e-4 })
                    .with_weight_decay(WeightDecay::l2(5e-4)),
            ),
        ))?;
        self.graph
            .attach(Node::new(format!("bn{no}"), Operation::BatchNorm))?;
        self.graph
            .attach(Node::new(format!("relu{no}"), Operation::Relu))?;
        Ok(())
    }

    fn attach_dropout(&mut self, keep_prob: f64) -> Result<(), GraphError> {
        self.graph.attach(Node::new(
            format!("dropout{}", self.top_layer_no),
            Operation::Dropout { keep_prob },
        ))?;
        Ok(())
    }

    fn attach_pool(&mut self) -> Result<(), GraphError> {
        self.graph.attach(Node::new(
            format!("pool{}", self.top_layer_no),
            Operation::Pooling(PoolParams::max([2, 2], [2, 2]).with_padding(self.padding)),
        ))?;
        Ok(())
    }
}

/// Builds the VGG-style network described by `config`.
pub fn build_vgg_net(config: &VggConfig) -> Result<NetGraph, GraphError> {
    debug!(class_count = config.class_count, "building vgg net");
    let mut b = VggBuilder {
        graph: NetGraph::new(),
        padding: config.padding,
        top_layer_no: 0,
    };

    b.attach_conv_bn_relu(64)?;
    b.attach_dropout(0.7)?;
    b.attach_conv_bn_relu(64)?;
    b.attach_pool()?;

    b.attach_conv_bn_relu(128)?;
    b.attach_dropout(0.6)?;
    b.attach_conv_bn_relu(128)?;
    b.attach_pool()?;

    b.attach_conv_bn_relu(256)?;
    b.attach_dropout(0.6)?;
    b.attach_conv_bn_relu(256)?;
    b.attach_dropout(0.6)?;
    b.attach_conv_bn_relu(256)?;
    b.attach_pool()?;

    b.attach_conv_bn_relu(512)?;
    b.attach_dropout(0.6)?;
    b.attach_conv_bn_relu(512)?;
    b.attach_dropout(0.6)?;
    b.attach_conv_bn_relu(512)?;
    b.attach_pool()?;

    b.top_layer_no += 1;
    b.attach_dropout(0.5)?;
    b.graph.attach(Node::new(
        "ip1",
        Operation::InnerProduct(
            InnerProductParams::new(512)
                .with_init(Initializer::TruncatedNormal { stddev: 1e-4 }),
        ),
    ))?;
    b.graph
        .attach(Node::new(format!("bn{}", b.top_layer_no), Operation::BatchNorm))?;
    b.graph
        .attach(Node::new(format!("relu{}", b.top_layer_no), Operation::Relu))?;

    b.top_layer_no += 1;
    b.attach_dropout(0.5)?;
    b.graph.attach(Node::new(
        "ip2",
        Operation::InnerProduct(
            InnerProductParams::new(config.class_count)
                .with_init(Initializer::TruncatedNormal { stddev: 1e-4 }),
        ),
    ))?;
    b.graph
        .attach(Node::new(format!("bn{}", b.top_layer_no), Operation::BatchNorm))?;

    let loss_op = config
        .loss
        .clone()
        .unwrap_or(Operation::SoftmaxLoss(LossParams::new(config.class_count)));
    b.graph.attach(
        Node::new("loss", loss_op)
            .with_inputs(vec![NodeInput::output("ip2"), NodeInput::system_in(1)]),
    )?;

    Ok(b.graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vgg_counts_conv_layers_for_names() {
        let graph = build_vgg_net(&VggConfig::new()).unwrap();
        for no in 1..=10 {
            assert!(graph.lookup(&format!("conv{no}")).is_ok(), "conv{no}");
            assert!(graph.lookup(&format!("bn{no}")).is_ok(), "bn{no}");
            assert!(graph.lookup(&format!("relu{no}")).is_ok(), "relu{no}");
        }
        // Classifier head reuses the counter past the last convolution.
        assert!(graph.lookup("bn11").is_ok());
        assert!(graph.lookup("bn12").is_ok());
        assert!(graph.lookup("conv11").is_err());
    }

    #[test]
    fn test_vgg_pool_placement() {
        let graph = build_vgg_net(&VggConfig::new()).unwrap();
        for no in [2, 4, 7, 10] {
            assert!(graph.lookup(&format!("pool{no}")).is_ok(), "pool{no}");
        }
    }

    #[test]
    fn test_vgg_default_loss() {
        let graph = build_vgg_net(&VggConfig::new().with_class_count(100)).unwrap();
        let loss = graph.lookup("loss").unwrap();
        assert!(matches!(
            loss.op(),
            Operation::SoftmaxLoss(params) if params.class_count == 100
        ));
        assert_eq!(loss.inputs()[0], NodeInput::output("ip2"));
        assert_eq!(loss.inputs()[1], NodeInput::system_in(1));
    }

    #[test]
    fn test_vgg_loss_override() {
        let config = VggConfig::new()
            .with_loss(Operation::SoftmaxLoss(LossParams::new(10).with_multiplier(0.3)));
        let graph = build_vgg_net(&config).unwrap();
        let loss = graph.lookup("loss").unwrap();
        assert!(matches!(
            loss.op(),
            Operation::SoftmaxLoss(params) if params.multiplier == Some(0.3)
        ));
    }
}
