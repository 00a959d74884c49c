//! Residual-network topology generator.
//!
//! Builds pre-activation residual networks (basic and bottleneck blocks)
//! as explicit graphs: per-block BatchNorm/activation/convolution stages,
//! a shortcut branch (identity, 1x1 projection, or avg-pool plus channel
//! padding) and a closing merge. One block engine serves both the CIFAR
//! and Imagenet layouts, which differ only in their stage tables and
//! stem/tail layers.

use std::str::FromStr;

use tracing::debug;

use crate::errors::GraphError;
use crate::graph::{
    ConvParams, Initializer, InnerProductParams, LossParams, NetGraph, Node, NodeInput, Operation,
    PadMode, PoolParams, WeightDecay,
};

/// Residual-unit flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Two 3x3 convolution stages.
    Basic,
    /// 1x1 -> 3x3 -> 1x1 stages; the last stage inflates channels by 4x.
    Bottleneck,
}

impl FromStr for BlockType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "bottleneck" => Ok(Self::Bottleneck),
            other => Err(GraphError::UnsupportedBlockType(other.to_string())),
        }
    }
}

/// Configuration shared by the CIFAR and Imagenet builders.
#[derive(Debug, Clone)]
pub struct ResNetConfig {
    pub depth: usize,
    /// Channel multiplier producing wide residual networks.
    pub width: usize,
    pub class_count: usize,
    /// When set, a dropout node with keep probability `1 - dropout_prob`
    /// precedes every non-first convolution stage.
    pub dropout_prob: Option<f64>,
    /// Shortcut strategy on channel change: 1x1 projection convolution
    /// when true, parameter-free avg-pool plus channel padding when false.
    pub projection_shortcut: bool,
    /// Use group softmax instead of ReLU wherever the block input is wider
    /// than 16 channels.
    pub use_group_softmax: bool,
    pub group_size: usize,
    /// Weight of the fine-grained loss when a coarse-label loss is added
    /// alongside it (CIFAR only); the coarse loss gets the complement.
    pub hierarchical_loss: Option<f64>,
}

impl Default for ResNetConfig {
    fn default() -> Self {
        Self {
            depth: 28,
            width: 2,
            class_count: 10,
            dropout_prob: None,
            projection_shortcut: true,
            use_group_softmax: false,
            group_size: 4,
            hierarchical_loss: None,
        }
    }
}

impl ResNetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_class_count(mut self, class_count: usize) -> Self {
        self.class_count = class_count;
        self
    }

    pub fn with_dropout(mut self, dropout_prob: f64) -> Self {
        self.dropout_prob = Some(dropout_prob);
        self
    }

    pub fn with_projection_shortcut(mut self, projection: bool) -> Self {
        self.projection_shortcut = projection;
        self
    }

    pub fn with_group_softmax(mut self, enabled: bool) -> Self {
        self.use_group_softmax = enabled;
        self
    }

    pub fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size;
        self
    }

    pub fn with_hierarchical_loss(mut self, fine_ratio: f64) -> Self {
        self.hierarchical_loss = Some(fine_ratio);
        self
    }
}

/// One convolution stage of a residual block.
#[derive(Debug, Clone, Copy)]
struct ConvStage {
    ksize: [usize; 2],
    strides: [usize; 2],
}

/// Per-stage convolution parameters for one block. Only one stage carries
/// the block's stride: the first 3x3 for basic blocks, the middle 3x3 for
/// bottleneck blocks.
fn block_stages(block_type: BlockType, stride: usize) -> Vec<ConvStage> {
    match block_type {
        BlockType::Basic => vec![
            ConvStage {
                ksize: [3, 3],
                strides: [stride, stride],
            },
            ConvStage {
                ksize: [3, 3],
                strides: [1, 1],
            },
        ],
        BlockType::Bottleneck => vec![
            ConvStage {
                ksize: [1, 1],
                strides: [1, 1],
            },
            ConvStage {
                ksize: [3, 3],
                strides: [stride, stride],
            },
            ConvStage {
                ksize: [1, 1],
                strides: [1, 1],
            },
        ],
    }
}

/// The block engine. Owns the graph under construction and the running
/// block counter; everything else is threaded through as parameters,
/// including the wiring cursor (each attach method takes the current tail
/// name and returns the new one).
struct ResNetBuilder<'a> {
    graph: NetGraph,
    config: &'a ResNetConfig,
    block_no: usize,
}

impl<'a> ResNetBuilder<'a> {
    fn new(config: &'a ResNetConfig) -> Self {
        Self {
            graph: NetGraph::new(),
            config,
            block_no: 0,
        }
    }

    fn push(&mut self, node: Node) -> Result<String, GraphError> {
        let name = node.name().to_string();
        self.graph.attach(node)?;
        Ok(name)
    }

    /// Emits `count` residual blocks. The first may change channels from
    /// `n_input` to `n_output` and carries `stride`; the rest are
    /// stride-1, fixed-channel blocks.
    #[allow(clippy::too_many_arguments)]
    fn attach_stack(
        &mut self,
        tail: String,
        n_input: usize,
        n_output: usize,
        count: usize,
        stride: usize,
        act_before_residual: bool,
        block_type: BlockType,
        wd: WeightDecay,
    ) -> Result<String, GraphError> {
        let mut tail = self.attach_block(
            tail,
            n_input,
            n_output,
            stride,
            act_before_residual,
            &block_stages(block_type, stride),
            wd,
        )?;
        for _ in 1..count {
            tail = self.attach_block(
                tail,
                n_output,
                n_output,
                1,
                false,
                &block_stages(block_type, 1),
                wd,
            )?;
        }
        Ok(tail)
    }

    /// Emits one residual block and returns the name of its merge node.
    #[allow(clippy::too_many_arguments)]
    fn attach_block(
        &mut self,
        tail: String,
        n_input: usize,
        n_output: usize,
        stride: usize,
        act_before_residual: bool,
        stages: &[ConvStage],
        wd: WeightDecay,
    ) -> Result<String, GraphError> {
        self.block_no += 1;
        let blk = self.block_no;

        let mut branch_point = tail.clone();
        let mut cursor = tail;
        let mut realized_out = n_output;
        let mut is_bottleneck = false;

        for (i, stage) in stages.iter().enumerate() {
            cursor = self.push(
                Node::new(format!("bn_{blk}_{i}"), Operation::BatchNorm)
                    .with_inputs(vec![NodeInput::output(&cursor)]),
            )?;
            cursor = self.push(
                Node::new(format!("{}_{blk}_{i}", self.activation_prefix(n_input)),
                    self.activation(n_input),
                )
                .with_inputs(vec![NodeInput::output(&cursor)]),
            )?;

            if i == 0 && n_input != n_output && act_before_residual {
                // Both branches share this block's first BatchNorm and
                // activation; the shortcut reads from after them.
                branch_point = cursor.clone();
            }

            // The last 1x1 stage of a bottleneck block inflates the
            // channel count back by 4x; the width multiplier applies only
            // to the 3x3 stages, so it is divided back out here.
            let out_channels = if i == stages.len() - 1 && stage.ksize == [1, 1] {
                is_bottleneck = true;
                let inflated = n_output * 4;
                if inflated % self.config.width != 0 {
                    return Err(GraphError::ChannelMismatch(format!(
                        "bottleneck output {} is not divisible by width {}",
                        inflated, self.config.width
                    )));
                }
                inflated / self.config.width
            } else {
                n_output
            };
            realized_out = out_channels;

            if i != 0 {
                if let Some(prob) = self.config.dropout_prob {
                    cursor = self.push(
                        Node::new(
                            format!("dropout_{blk}_{i}"),
                            Operation::Dropout {
                                keep_prob: 1.0 - prob,
                            },
                        )
                        .with_inputs(vec![NodeInput::output(&cursor)]),
                    )?;
                }
            }
            cursor = self.push(
                Node::new(
                    format!("conv_{blk}_{i}"),
                    Operation::Convolution(
                        ConvParams::new(stage.ksize, stage.strides, out_channels)
                            .with_init(Initializer::Msra)
                            .with_weight_decay(wd),
                    ),
                )
                .with_inputs(vec![NodeInput::output(&cursor)]),
            )?;
        }

        let last_residual = cursor;

        let shortcut = if n_input == n_output {
            branch_point
        } else if self.config.projection_shortcut {
            self.push(
                Node::new(
                    format!("conv_{blk}_shortcut"),
                    Operation::Convolution(
                        ConvParams::new([1, 1], [stride, stride], realized_out)
                            .with_init(Initializer::Msra)
                            .with_weight_decay(wd),
                    ),
                )
                .with_inputs(vec![NodeInput::output(&branch_point)]),
            )?
        } else {
            let pool = self.push(
                Node::new(
                    format!("pool_{blk}_shortcut"),
                    Operation::Pooling(
                        PoolParams::avg([stride, stride], [stride, stride])
                            .with_padding(PadMode::Valid),
                    ),
                )
                .with_inputs(vec![NodeInput::output(&branch_point)]),
            )?;
            let in_channels = if is_bottleneck { n_input * 4 } else { n_input };
            self.push(
                Node::new(
                    format!("pad_{blk}_shortcut"),
                    Operation::Padding {
                        channel_pad: (realized_out - in_channels) / 2,
                    },
                )
                .with_inputs(vec![NodeInput::output(&pool)]),
            )?
        };

        self.push(
            Node::new(format!("merge_{blk}"), Operation::Merge).with_inputs(vec![
                NodeInput::output(&last_residual),
                NodeInput::output(&shortcut),
            ]),
        )
    }

    fn uses_group_softmax(&self, n_input: usize) -> bool {
        self.config.use_group_softmax && n_input > 16
    }

    fn activation_prefix(&self, n_input: usize) -> &'static str {
        if self.uses_group_softmax(n_input) {
            "gsmax"
        } else {
            "relu"
        }
    }

    fn activation(&self, n_input: usize) -> Operation {
        if self.uses_group_softmax(n_input) {
            Operation::GroupSoftmax {
                group_size: self.config.group_size * n_input / 160,
            }
        } else {
            Operation::Relu
        }
    }
}

/// Builds a CIFAR-style residual network: a 3x3 stem, three stacks of
/// basic blocks, and a global-pool classifier head.
///
/// `depth` must satisfy `(depth - 4) % 6 == 0`; each stack then holds
/// `(depth - 4) / 6` blocks.
pub fn build_cifar_resnet(config: &ResNetConfig) -> Result<NetGraph, GraphError> {
    if config.depth < 4 || (config.depth - 4) % 6 != 0 {
        return Err(GraphError::InvalidDepth(config.depth));
    }
    let count = (config.depth - 4) / 6;
    let k = config.width;
    let channels = [16, 16 * k, 32 * k, 64 * k];
    let strides = [1, 2, 2];
    let (act_before_residual, wd) = if config.projection_shortcut {
        ([true, true, true], WeightDecay::l2(5e-4))
    } else {
        ([true, false, false], WeightDecay::l2(2e-4))
    };
    debug!(
        depth = config.depth,
        width = config.width,
        blocks_per_stack = count,
        "building cifar residual network"
    );

    let mut b = ResNetBuilder::new(config);
    let mut tail = b.push(Node::new(
        "conv0",
        Operation::Convolution(
            ConvParams::new([3, 3], [1, 1], 16)
                .with_init(Initializer::Msra)
                .with_weight_decay(wd),
        ),
    ))?;
    for i in 0..3 {
        tail = b.attach_stack(
            tail,
            channels[i],
            channels[i + 1],
            count,
            strides[i],
            act_before_residual[i],
            BlockType::Basic,
            wd,
        )?;
    }

    tail = b.push(
        Node::new("bn_out", Operation::BatchNorm).with_inputs(vec![NodeInput::output(&tail)]),
    )?;
    tail = if config.use_group_softmax {
        b.push(
            Node::new(
                "gsmax_out",
                Operation::GroupSoftmax {
                    group_size: config.group_size * 640 / 160,
                },
            )
            .with_inputs(vec![NodeInput::output(&tail)]),
        )?
    } else {
        b.push(Node::new("relu_out", Operation::Relu).with_inputs(vec![NodeInput::output(&tail)]))?
    };
    tail = b.push(
        Node::new(
            "global_pool",
            Operation::Pooling(PoolParams::avg([8, 8], [1, 1]).with_padding(PadMode::Valid)),
        )
        .with_inputs(vec![NodeInput::output(&tail)]),
    )?;
    tail = b.push(
        Node::new("reshape", Operation::Reshape).with_inputs(vec![NodeInput::output(&tail)]),
    )?;
    let ip = b.push(
        Node::new(
            "ip",
            Operation::InnerProduct(
                InnerProductParams::new(config.class_count)
                    .with_weight_decay(wd)
                    .with_initial_bias(0.0),
            ),
        )
        .with_inputs(vec![NodeInput::output(&tail)]),
    )?;

    if let Some(fine_ratio) = config.hierarchical_loss {
        b.push(
            Node::new(
                "softmax",
                Operation::SoftmaxLoss(
                    LossParams::new(config.class_count).with_multiplier(fine_ratio),
                ),
            )
            .with_inputs(vec![NodeInput::output(&ip), NodeInput::system_in(1)]),
        )?;
        let coarse = b.push(
            Node::new("average_out", Operation::CollapseOut { group_size: 5 })
                .with_inputs(vec![NodeInput::output(&ip)]),
        )?;
        b.push(
            Node::new(
                "super_class_loss",
                Operation::SoftmaxLoss(
                    LossParams::new(config.class_count / 5).with_multiplier(1.0 - fine_ratio),
                ),
            )
            .with_inputs(vec![NodeInput::output(&coarse), NodeInput::system_in(2)]),
        )?;
    } else {
        b.push(
            Node::new(
                "softmax",
                Operation::SoftmaxLoss(LossParams::new(config.class_count)),
            )
            .with_inputs(vec![NodeInput::output(&ip), NodeInput::system_in(1)]),
        )?;
    }

    Ok(b.graph)
}

/// Block counts and flavor per supported Imagenet depth.
fn imagenet_plan(depth: usize) -> Result<([usize; 4], BlockType), GraphError> {
    let plan = match depth {
        18 => ([2, 2, 2, 2], BlockType::Basic),
        34 => ([3, 4, 6, 3], BlockType::Basic),
        50 => ([3, 4, 6, 3], BlockType::Bottleneck),
        101 => ([3, 4, 23, 3], BlockType::Bottleneck),
        152 => ([3, 8, 36, 3], BlockType::Bottleneck),
        200 => ([3, 24, 36, 3], BlockType::Bottleneck),
        other => return Err(GraphError::UnsupportedDepth(other)),
    };
    Ok(plan)
}

/// Builds an Imagenet-style residual network: a 7x7 stride-2 stem with
/// max pooling, four stacks sized by the depth table, and a global-pool
/// classifier head. The stem already normalizes and activates, so the
/// first stack does not share pre-activation with its shortcut.
pub fn build_imagenet_resnet(config: &ResNetConfig) -> Result<NetGraph, GraphError> {
    let (counts, block_type) = imagenet_plan(config.depth)?;
    let k = config.width;
    let channels = [64, 64 * k, 128 * k, 256 * k, 512 * k];
    let strides = [1, 2, 2, 2];
    let act_before_residual = [false, true, true, true];
    let wd = WeightDecay::l2(1e-4);
    debug!(
        depth = config.depth,
        width = config.width,
        block_type = ?block_type,
        "building imagenet residual network"
    );

    let mut b = ResNetBuilder::new(config);
    let mut tail = b.push(Node::new(
        "conv0",
        Operation::Convolution(
            ConvParams::new([7, 7], [2, 2], 64)
                .with_init(Initializer::Msra)
                .with_weight_decay(wd),
        ),
    ))?;
    tail = b.push(
        Node::new("bn0", Operation::BatchNorm).with_inputs(vec![NodeInput::output(&tail)]),
    )?;
    tail = b.push(Node::new("relu0", Operation::Relu).with_inputs(vec![NodeInput::output(&tail)]))?;
    tail = b.push(
        Node::new(
            "pool0",
            Operation::Pooling(PoolParams::max([3, 3], [2, 2])),
        )
        .with_inputs(vec![NodeInput::output(&tail)]),
    )?;

    for i in 0..4 {
        tail = b.attach_stack(
            tail,
            channels[i],
            channels[i + 1],
            counts[i],
            strides[i],
            act_before_residual[i],
            block_type,
            wd,
        )?;
    }

    tail = b.push(
        Node::new("relu_final", Operation::Relu).with_inputs(vec![NodeInput::output(&tail)]),
    )?;
    tail = b.push(
        Node::new(
            "global_pool",
            Operation::Pooling(PoolParams::avg([7, 7], [1, 1]).with_padding(PadMode::Valid)),
        )
        .with_inputs(vec![NodeInput::output(&tail)]),
    )?;
    tail = b.push(
        Node::new("reshape", Operation::Reshape).with_inputs(vec![NodeInput::output(&tail)]),
    )?;
    let ip = b.push(
        Node::new(
            "ip",
            Operation::InnerProduct(
                InnerProductParams::new(config.class_count)
                    .with_weight_decay(wd)
                    .with_initial_bias(0.0),
            ),
        )
        .with_inputs(vec![NodeInput::output(&tail)]),
    )?;
    b.push(
        Node::new(
            "softmax",
            Operation::SoftmaxLoss(LossParams::new(config.class_count)),
        )
        .with_inputs(vec![NodeInput::output(&ip), NodeInput::system_in(1)]),
    )?;

    Ok(b.graph)
}
