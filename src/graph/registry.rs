//! NetGraph - the append-only container for architecture graphs.

use std::collections::HashMap;

use tracing::trace;

use crate::errors::GraphError;

use super::node::{Node, NodeInput, SYSTEM_IN};
use super::operation::Operation;

/// An ordered, append-only collection of named nodes forming a DAG.
///
/// Nodes are attached one at a time; each attach validates name uniqueness
/// and reference resolution, so forward references (and therefore cycles)
/// are impossible by construction. Once a build completes, the graph is
/// frozen and handed to the execution engine via [`NetGraph::to_export`].
#[derive(Debug, Clone, Default)]
pub struct NetGraph {
    nodes: Vec<Node>,
    name_index: HashMap<String, usize>,
}

impl NetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a node, making it the new cursor for implicit wiring.
    ///
    /// A node with an empty input list is wired to output 0 of the most
    /// recently attached node, or to `system_in` output 0 on an empty
    /// graph. Fails with [`GraphError::DuplicateName`] on a name collision,
    /// [`GraphError::UnresolvedReference`] if any input names a node that is
    /// not yet attached, and [`GraphError::ChannelMismatch`] if a merge
    /// node's inputs carry unequal channel counts.
    pub fn attach(&mut self, node: Node) -> Result<&Node, GraphError> {
        if node.name == SYSTEM_IN || self.name_index.contains_key(&node.name) {
            return Err(GraphError::DuplicateName(node.name));
        }

        let mut node = node;
        if node.inputs.is_empty() {
            node.inputs = vec![match self.nodes.last() {
                Some(prev) => NodeInput::output(&prev.name),
                None => NodeInput::system_in(0),
            }];
        }

        for input in &node.inputs {
            if !input.is_system_in() && !self.name_index.contains_key(&input.node) {
                return Err(GraphError::UnresolvedReference(input.node.clone()));
            }
        }

        node.out_channels = self.infer_out_channels(&node)?;
        trace!(name = %node.name, channels = ?node.out_channels, "attach");

        self.name_index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(self.nodes.last().expect("node was just pushed"))
    }

    /// Looks a node up by name.
    pub fn lookup(&self, name: &str) -> Result<&Node, GraphError> {
        self.name_index
            .get(name)
            .map(|&idx| &self.nodes[idx])
            .ok_or_else(|| GraphError::UnresolvedReference(name.to_string()))
    }

    /// The most recently attached node, if any.
    pub fn last(&self) -> Option<&Node> {
        self.nodes.last()
    }

    /// Nodes in attach order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Channel count flowing out of the given input reference.
    fn channels_of(&self, input: &NodeInput) -> Option<usize> {
        if input.is_system_in() {
            return None;
        }
        self.name_index
            .get(&input.node)
            .and_then(|&idx| self.nodes[idx].out_channels)
    }

    fn infer_out_channels(&self, node: &Node) -> Result<Option<usize>, GraphError> {
        if let Operation::Merge = node.op {
            // Both branches of a residual unit must agree on channel count
            // when both are known.
            let counts: Vec<Option<usize>> =
                node.inputs.iter().map(|i| self.channels_of(i)).collect();
            let mut known = counts.iter().flatten();
            if let Some(&first) = known.next() {
                for &other in known {
                    if other != first {
                        return Err(GraphError::ChannelMismatch(format!(
                            "merge `{}` joins branches with {} and {} channels",
                            node.name, first, other
                        )));
                    }
                }
                return Ok(Some(first));
            }
            return Ok(None);
        }

        let input_channels = node.inputs.first().and_then(|i| self.channels_of(i));
        Ok(node.op.out_channels(input_channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::operation::{ConvParams, LossParams, PoolParams};

    fn conv(name: &str, out_channels: usize) -> Node {
        Node::new(
            name,
            Operation::Convolution(ConvParams::new([3, 3], [1, 1], out_channels)),
        )
    }

    #[test]
    fn test_implicit_wiring_follows_cursor() {
        let mut graph = NetGraph::new();
        graph.attach(conv("conv1", 16)).unwrap();
        graph.attach(Node::new("relu1", Operation::Relu)).unwrap();

        assert_eq!(
            graph.lookup("conv1").unwrap().inputs(),
            &[NodeInput::system_in(0)]
        );
        assert_eq!(
            graph.lookup("relu1").unwrap().inputs(),
            &[NodeInput::output("conv1")]
        );
        assert_eq!(graph.last().unwrap().name(), "relu1");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut graph = NetGraph::new();
        graph.attach(conv("conv1", 16)).unwrap();
        let err = graph.attach(conv("conv1", 32)).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateName(name) if name == "conv1"));
    }

    #[test]
    fn test_system_in_is_reserved() {
        let mut graph = NetGraph::new();
        let err = graph.attach(conv(SYSTEM_IN, 16)).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateName(_)));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut graph = NetGraph::new();
        graph.attach(conv("conv1", 16)).unwrap();
        let err = graph
            .attach(Node::new("relu1", Operation::Relu).with_inputs(vec![NodeInput::output(
                "conv2",
            )]))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedReference(name) if name == "conv2"));
    }

    #[test]
    fn test_lookup_missing_node() {
        let graph = NetGraph::new();
        assert!(matches!(
            graph.lookup("nope"),
            Err(GraphError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_channels_flow_through_transparent_ops() {
        let mut graph = NetGraph::new();
        graph.attach(conv("conv1", 16)).unwrap();
        graph.attach(Node::new("bn1", Operation::BatchNorm)).unwrap();
        graph
            .attach(Node::new(
                "pool1",
                Operation::Pooling(PoolParams::avg([2, 2], [2, 2])),
            ))
            .unwrap();

        assert_eq!(graph.lookup("pool1").unwrap().out_channels(), Some(16));
    }

    #[test]
    fn test_merge_accepts_equal_channels() {
        let mut graph = NetGraph::new();
        graph.attach(conv("conv1", 16)).unwrap();
        graph
            .attach(conv("conv2", 32).with_inputs(vec![NodeInput::output("conv1")]))
            .unwrap();
        graph
            .attach(conv("conv_shortcut", 32).with_inputs(vec![NodeInput::output("conv1")]))
            .unwrap();
        let merged = graph
            .attach(Node::new("merge", Operation::Merge).with_inputs(vec![
                NodeInput::output("conv2"),
                NodeInput::output("conv_shortcut"),
            ]))
            .unwrap();
        assert_eq!(merged.out_channels(), Some(32));
    }

    #[test]
    fn test_merge_rejects_unequal_channels() {
        let mut graph = NetGraph::new();
        graph.attach(conv("conv1", 16)).unwrap();
        graph
            .attach(conv("conv2", 32).with_inputs(vec![NodeInput::output("conv1")]))
            .unwrap();
        let err = graph
            .attach(Node::new("merge", Operation::Merge).with_inputs(vec![
                NodeInput::output("conv2"),
                NodeInput::output("conv1"),
            ]))
            .unwrap_err();
        assert!(matches!(err, GraphError::ChannelMismatch(_)));
    }

    #[test]
    fn test_loss_reads_labels_from_system_in() {
        let mut graph = NetGraph::new();
        graph.attach(conv("conv1", 16)).unwrap();
        graph
            .attach(
                Node::new("loss", Operation::SoftmaxLoss(LossParams::new(10))).with_inputs(vec![
                    NodeInput::output("conv1"),
                    NodeInput::system_in(1),
                ]),
            )
            .unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.lookup("loss").unwrap().out_channels().is_none());
    }
}
