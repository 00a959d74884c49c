//! JSON export of a finished graph for the execution engine.

use serde::Serialize;

use crate::errors::GraphError;

use super::node::Node;
use super::registry::NetGraph;

/// Serializable snapshot of a graph: the node list in attach order.
///
/// The execution engine only needs the nodes; attach order doubles as a
/// valid topological order because forward references are rejected at
/// construction time.
#[derive(Debug, Clone, Serialize)]
pub struct GraphExport<'a> {
    pub nodes: &'a [Node],
}

impl NetGraph {
    /// Borrows the graph as an exportable snapshot.
    pub fn to_export(&self) -> GraphExport<'_> {
        GraphExport {
            nodes: self.nodes(),
        }
    }

    /// Serializes the graph to pretty-printed JSON.
    pub fn export_to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(&self.to_export())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::NodeInput;
    use crate::graph::operation::{ConvParams, LossParams, Operation};

    #[test]
    fn test_export_preserves_attach_order() {
        let mut graph = NetGraph::new();
        graph
            .attach(Node::new(
                "conv1",
                Operation::Convolution(ConvParams::new([3, 3], [1, 1], 16)),
            ))
            .unwrap();
        graph.attach(Node::new("relu1", Operation::Relu)).unwrap();
        graph
            .attach(
                Node::new("loss", Operation::SoftmaxLoss(LossParams::new(10))).with_inputs(vec![
                    NodeInput::output("relu1"),
                    NodeInput::system_in(1),
                ]),
            )
            .unwrap();

        let export = graph.to_export();
        let names: Vec<&str> = export.nodes.iter().map(|n| n.name()).collect();
        assert_eq!(names, ["conv1", "relu1", "loss"]);
    }

    #[test]
    fn test_json_contains_tags_and_wiring() {
        let mut graph = NetGraph::new();
        graph
            .attach(Node::new(
                "conv1",
                Operation::Convolution(ConvParams::new([3, 3], [1, 1], 16)),
            ))
            .unwrap();
        graph.attach(Node::new("relu1", Operation::Relu)).unwrap();

        let json = graph.export_to_json().unwrap();
        assert!(json.contains("\"type\": \"CONV\""));
        assert!(json.contains("\"type\": \"RELU\""));
        assert!(json.contains("\"node\": \"system_in\""));
        assert!(json.contains("\"node\": \"conv1\""));
    }
}
