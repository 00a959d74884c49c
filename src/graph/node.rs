//! Node and input-reference types - the building blocks of the graph.

use serde::Serialize;

use super::operation::Operation;

/// Reserved name of the external data source. It supplies indexed tensors
/// (0: feature batch, 1: label batch, 2: optional coarse-label batch) and is
/// referenced by name but never attached as a node.
pub const SYSTEM_IN: &str = "system_in";

/// A reference to one output of another node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInput {
    /// Name of the source node (or [`SYSTEM_IN`]).
    pub node: String,
    /// Index of the source node's output.
    pub index: usize,
}

impl NodeInput {
    pub fn new(node: impl Into<String>, index: usize) -> Self {
        Self {
            node: node.into(),
            index,
        }
    }

    /// Reference to output 0 of the named node.
    pub fn output(node: impl Into<String>) -> Self {
        Self::new(node, 0)
    }

    /// Reference to the given output of the external data source.
    pub fn system_in(index: usize) -> Self {
        Self::new(SYSTEM_IN, index)
    }

    /// Whether this reference points at the external data source.
    pub fn is_system_in(&self) -> bool {
        self.node == SYSTEM_IN
    }
}

/// One named computation step in the architecture graph.
///
/// A node is immutable once attached. Leaving `inputs` empty requests
/// implicit wiring: the graph resolves it to output 0 of the most recently
/// attached node (or of `system_in` when the graph is still empty).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub(crate) name: String,
    #[serde(flatten)]
    pub(crate) op: Operation,
    pub(crate) inputs: Vec<NodeInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) out_channels: Option<usize>,
}

impl Node {
    /// Creates a node with implicit wiring (input resolved at attach time).
    pub fn new(name: impl Into<String>, op: Operation) -> Self {
        Self {
            name: name.into(),
            op,
            inputs: Vec::new(),
            out_channels: None,
        }
    }

    /// Replaces the input list with explicit references.
    pub fn with_inputs(mut self, inputs: Vec<NodeInput>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &Operation {
        &self.op
    }

    /// Resolved input references. Guaranteed non-empty after attach.
    pub fn inputs(&self) -> &[NodeInput] {
        &self.inputs
    }

    /// Output channel count inferred at attach time, when known.
    pub fn out_channels(&self) -> Option<usize> {
        self.out_channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::operation::LossParams;

    #[test]
    fn test_node_defaults_to_implicit_wiring() {
        let node = Node::new("relu1", Operation::Relu);
        assert_eq!(node.name(), "relu1");
        assert!(node.inputs().is_empty());
        assert!(node.out_channels().is_none());
    }

    #[test]
    fn test_explicit_inputs() {
        let node = Node::new("loss", Operation::SoftmaxLoss(LossParams::new(10))).with_inputs(
            vec![NodeInput::output("ip2"), NodeInput::system_in(1)],
        );
        assert_eq!(node.inputs().len(), 2);
        assert_eq!(node.inputs()[0], NodeInput::new("ip2", 0));
        assert!(node.inputs()[1].is_system_in());
    }

    #[test]
    fn test_node_serializes_flattened() {
        let node = Node::new("relu1", Operation::Relu)
            .with_inputs(vec![NodeInput::output("conv1")]);
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"name\":\"relu1\""));
        assert!(json.contains("\"type\":\"RELU\""));
        assert!(json.contains("\"node\":\"conv1\""));
    }
}
