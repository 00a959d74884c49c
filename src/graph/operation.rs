//! Operations for the architecture graph.
//!
//! Uses a tagged enum with one typed parameter record per operator kind, so
//! every node's hyperparameters are validated at construction instead of
//! being carried around as untyped key-value bags.

use serde::Serialize;

/// Spatial padding mode for convolution and pooling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PadMode {
    #[serde(rename = "SAME")]
    Same,
    #[serde(rename = "VALID")]
    Valid,
}

/// Pooling flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolKind {
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "avg")]
    Avg,
}

/// Weight initializer choice. The actual sampling is performed by the
/// execution engine; the graph only records which distribution to use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "name")]
pub enum Initializer {
    #[serde(rename = "truncated_normal")]
    TruncatedNormal { stddev: f64 },
    #[serde(rename = "msra_init")]
    Msra,
    #[serde(rename = "default")]
    Default,
}

/// Weight-decay (regularization) policy applied to a weighted node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightDecay {
    pub kind: DecayKind,
    pub scale: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecayKind {
    #[serde(rename = "l2")]
    L2,
}

impl WeightDecay {
    /// L2 weight decay with the given scale.
    pub fn l2(scale: f64) -> Self {
        Self {
            kind: DecayKind::L2,
            scale,
        }
    }
}

/// Parameters of a convolution node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvParams {
    /// Kernel shape as `[height, width]`.
    pub ksize: [usize; 2],
    /// Spatial strides as `[height, width]`.
    pub strides: [usize; 2],
    pub padding: PadMode,
    pub out_channels: usize,
    pub init: Initializer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_decay: Option<WeightDecay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_bias: Option<f64>,
}

impl ConvParams {
    pub fn new(ksize: [usize; 2], strides: [usize; 2], out_channels: usize) -> Self {
        Self {
            ksize,
            strides,
            padding: PadMode::Same,
            out_channels,
            init: Initializer::Default,
            weight_decay: None,
            initial_bias: None,
        }
    }

    pub fn with_padding(mut self, padding: PadMode) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_init(mut self, init: Initializer) -> Self {
        self.init = init;
        self
    }

    pub fn with_weight_decay(mut self, wd: WeightDecay) -> Self {
        self.weight_decay = Some(wd);
        self
    }

    pub fn with_initial_bias(mut self, bias: f64) -> Self {
        self.initial_bias = Some(bias);
        self
    }
}

/// Parameters of a pooling node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolParams {
    pub ksize: [usize; 2],
    pub strides: [usize; 2],
    pub padding: PadMode,
    pub pool: PoolKind,
}

impl PoolParams {
    pub fn max(ksize: [usize; 2], strides: [usize; 2]) -> Self {
        Self {
            ksize,
            strides,
            padding: PadMode::Same,
            pool: PoolKind::Max,
        }
    }

    pub fn avg(ksize: [usize; 2], strides: [usize; 2]) -> Self {
        Self {
            ksize,
            strides,
            padding: PadMode::Same,
            pool: PoolKind::Avg,
        }
    }

    pub fn with_padding(mut self, padding: PadMode) -> Self {
        self.padding = padding;
        self
    }
}

/// Parameters of an inner-product (fully connected) node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InnerProductParams {
    pub out_channels: usize,
    pub init: Initializer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_decay: Option<WeightDecay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_bias: Option<f64>,
}

impl InnerProductParams {
    pub fn new(out_channels: usize) -> Self {
        Self {
            out_channels,
            init: Initializer::Default,
            weight_decay: None,
            initial_bias: None,
        }
    }

    pub fn with_init(mut self, init: Initializer) -> Self {
        self.init = init;
        self
    }

    pub fn with_weight_decay(mut self, wd: WeightDecay) -> Self {
        self.weight_decay = Some(wd);
        self
    }

    pub fn with_initial_bias(mut self, bias: f64) -> Self {
        self.initial_bias = Some(bias);
        self
    }
}

/// Parameters of a softmax cross-entropy loss node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossParams {
    pub class_count: usize,
    /// Weight of this loss when several losses are combined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
}

impl LossParams {
    pub fn new(class_count: usize) -> Self {
        Self {
            class_count,
            multiplier: None,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }
}

/// A computation operation performed by one graph node.
///
/// The graph only describes the operation; the numeric work is done by the
/// execution engine that consumes the exported node list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Operation {
    /// 2D convolution.
    #[serde(rename = "CONV")]
    Convolution(ConvParams),
    /// Spatial max/avg pooling.
    #[serde(rename = "POOL")]
    Pooling(PoolParams),
    /// Rectified linear activation.
    #[serde(rename = "RELU")]
    Relu,
    /// Softmax applied over channel groups, used as an activation.
    #[serde(rename = "GSMAX")]
    GroupSoftmax { group_size: usize },
    /// Local response normalization.
    #[serde(rename = "LRN")]
    Lrn,
    /// Batch normalization.
    #[serde(rename = "BATCH_NORM")]
    BatchNorm,
    /// Dropout with the given keep probability.
    #[serde(rename = "DROPOUT")]
    Dropout { keep_prob: f64 },
    /// Fully connected layer.
    #[serde(rename = "INNER_PRODUCT")]
    InnerProduct(InnerProductParams),
    /// Element-wise merge of two branches (closes a residual unit).
    #[serde(rename = "MERGE")]
    Merge,
    /// Flatten spatial dimensions ahead of a classifier.
    #[serde(rename = "RESHAPE")]
    Reshape,
    /// Zero-pad the channel dimension symmetrically by `channel_pad` per side.
    #[serde(rename = "PAD_CHANNELS")]
    Padding { channel_pad: usize },
    /// Average groups of `group_size` logits into one coarse logit each.
    #[serde(rename = "COLLAPSE_OUT")]
    CollapseOut { group_size: usize },
    /// Softmax cross-entropy loss against a label input.
    #[serde(rename = "SOFTMAX_LOSS")]
    SoftmaxLoss(LossParams),
}

impl Operation {
    /// Returns the output channel count this operation produces, given the
    /// (possibly unknown) channel count of its first input.
    ///
    /// Operators that neither set nor reshape channels are transparent and
    /// inherit the input count. Loss nodes terminate the graph and carry no
    /// channel count.
    pub fn out_channels(&self, input_channels: Option<usize>) -> Option<usize> {
        match self {
            Self::Convolution(p) => Some(p.out_channels),
            Self::InnerProduct(p) => Some(p.out_channels),
            Self::Padding { channel_pad } => input_channels.map(|c| c + 2 * channel_pad),
            Self::CollapseOut { group_size } => input_channels.map(|c| c / group_size),
            Self::SoftmaxLoss(_) => None,
            _ => input_channels,
        }
    }
}
