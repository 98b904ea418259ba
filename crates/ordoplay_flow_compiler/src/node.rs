// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node instances in a composition.

use crate::node_class::NodeClass;
use crate::port::{ContextLayout, Port};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Tint applied to a node in the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TintColor {
    /// Yellow
    Yellow,
    /// Orange
    Orange,
    /// Magenta
    Magenta,
    /// Violet
    Violet,
    /// Cyan
    Cyan,
    /// Green
    Green,
}

impl TintColor {
    /// Name used in declarations
    pub fn name(self) -> &'static str {
        match self {
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Magenta => "magenta",
            Self::Violet => "violet",
            Self::Cyan => "cyan",
            Self::Green => "green",
        }
    }

    /// Parse a declaration name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "yellow" => Some(Self::Yellow),
            "orange" => Some(Self::Orange),
            "magenta" => Some(Self::Magenta),
            "violet" => Some(Self::Violet),
            "cyan" => Some(Self::Cyan),
            "green" => Some(Self::Green),
            _ => None,
        }
    }
}

/// A node instance in a composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Identifier in the composition, used in generated code and declarations
    pub identifier: String,
    /// Node class
    pub class: Arc<NodeClass>,
    /// Display title (can be customized)
    pub title: String,
    /// Position in the editor
    pub position: [f32; 2],
    /// Size in the editor
    pub size: [f32; 2],
    /// Optional tint
    pub tint: Option<TintColor>,
    /// Input ports, `refresh` first
    pub inputs: Vec<Port>,
    /// Output ports
    pub outputs: Vec<Port>,
}

impl Node {
    /// Instantiate a class
    pub fn new(class: Arc<NodeClass>, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let (inputs, outputs) = instantiate_ports(&class, &identifier);
        Self {
            id: NodeId::new(),
            title: class.title.clone(),
            size: default_size(&class),
            identifier,
            class,
            position: [0.0, 0.0],
            tint: None,
            inputs,
            outputs,
        }
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// Set the size
    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.size = [width, height];
        self
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the tint
    pub fn with_tint(mut self, tint: Option<TintColor>) -> Self {
        self.tint = tint;
        self
    }

    /// Get an input port by name
    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    /// Get an output port by name
    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name() == name)
    }

    /// Get all ports
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Layout of this node's port context
    pub fn context_layout(&self) -> ContextLayout {
        ContextLayout::new(self.identifier.clone(), self.ports())
    }

    /// Swap in another class, rebuilding the ports.
    ///
    /// A title still equal to the old class's default follows the new class.
    pub fn set_class(&mut self, class: Arc<NodeClass>) {
        if self.title == self.class.title {
            self.title = class.title.clone();
        }
        let (inputs, outputs) = instantiate_ports(&class, &self.identifier);
        self.inputs = inputs;
        self.outputs = outputs;
        self.size[1] = default_size(&class)[1];
        self.class = class;
    }
}

fn instantiate_ports(class: &NodeClass, identifier: &str) -> (Vec<Port>, Vec<Port>) {
    let inputs: Vec<Port> = class
        .inputs
        .iter()
        .enumerate()
        .map(|(i, p)| Port::new(Arc::clone(p), identifier, i))
        .collect();
    let offset = inputs.len();
    let outputs = class
        .outputs
        .iter()
        .enumerate()
        .map(|(i, p)| Port::new(Arc::clone(p), identifier, offset + i))
        .collect();
    (inputs, outputs)
}

fn default_size(class: &NodeClass) -> [f32; 2] {
    let rows = class.inputs.len().max(class.outputs.len()) as f32;
    [140.0, 24.0 + 18.0 * rows]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortClass;

    fn add_class() -> Arc<NodeClass> {
        Arc::new(
            NodeClass::new("math.add.Integer", "Add")
                .with_port(PortClass::input_data("a", "Integer"))
                .with_port(PortClass::input_data("b", "Integer"))
                .with_port(PortClass::output_data("sum", "Integer")),
        )
    }

    #[test]
    fn test_node_creation() {
        let node = Node::new(add_class(), "Add1").with_position(10.0, 20.0);
        assert_eq!(node.title, "Add");
        assert_eq!(node.inputs.len(), 3);
        assert_eq!(node.outputs.len(), 1);
        assert_eq!(node.position, [10.0, 20.0]);
        assert_eq!(node.output("sum").unwrap().index, 3);
        assert_eq!(node.input("b").unwrap().identifier, "Add1__b");
    }

    #[test]
    fn test_context_layout_orders_inputs_first() {
        let node = Node::new(add_class(), "Add1");
        let layout = node.context_layout();
        assert_eq!(layout.len(), 4);
        assert_eq!(layout.slot(0).unwrap().port, "refresh");
        assert!(!layout.slot(0).unwrap().has_data);
        assert_eq!(layout.slot(3).unwrap().port, "sum");
    }

    #[test]
    fn test_set_class_keeps_custom_title() {
        let mut node = Node::new(add_class(), "Add1").with_title("Total");
        let id = node.id;
        node.set_class(Arc::new(NodeClass::new("math.add.Real", "Add Real")));
        assert_eq!(node.id, id);
        assert_eq!(node.title, "Total");
        assert_eq!(node.inputs.len(), 1);
        assert!(node.outputs.is_empty());
    }

    #[test]
    fn test_tint_names() {
        for tint in [TintColor::Yellow, TintColor::Violet, TintColor::Green] {
            assert_eq!(TintColor::from_name(tint.name()), Some(tint));
        }
        assert_eq!(TintColor::from_name("blue"), None);
    }
}
