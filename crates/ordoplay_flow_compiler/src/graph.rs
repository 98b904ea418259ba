// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composition graph: nodes and the cables between them.

use crate::connection::{Connection, ConnectionId};
use crate::node::{Node, NodeId};
use crate::node_class::NodeClass;
use crate::port::Port;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// A composition: one snapshot of a node graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Composition {
    /// Composition name
    pub name: String,
    /// Nodes in the composition
    nodes: IndexMap<NodeId, Node>,
    /// Cables between nodes
    connections: IndexMap<ConnectionId, Connection>,
}

impl Composition {
    /// Create a new empty composition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
        }
    }

    /// Add a node. Identifiers must be unique within the composition.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, ConnectionError> {
        if self.node_by_identifier(&node.identifier).is_some() {
            return Err(ConnectionError::DuplicateIdentifier(node.identifier));
        }
        let id = node.id;
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Remove a node and its connections
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.connections.retain(|_, c| !c.involves_node(node_id));
        self.nodes.shift_remove(&node_id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Find a node by its graph identifier
    pub fn node_by_identifier(&self, identifier: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.identifier == identifier)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a cable from an output port to an input port
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_port: &str,
        to_node: NodeId,
        to_port: &str,
    ) -> Result<ConnectionId, ConnectionError> {
        let source_node = self
            .nodes
            .get(&from_node)
            .ok_or(ConnectionError::NodeNotFound(from_node))?;
        let target_node = self
            .nodes
            .get(&to_node)
            .ok_or(ConnectionError::NodeNotFound(to_node))?;

        let source_port = source_node
            .output(from_port)
            .ok_or_else(|| ConnectionError::port_not_found(source_node, from_port))?;
        let target_port = target_node
            .input(to_port)
            .ok_or_else(|| ConnectionError::port_not_found(target_node, to_port))?;

        if from_node == to_node {
            return Err(ConnectionError::SelfLoop);
        }

        let connection = Connection::new(from_node, from_port, to_node, to_port);
        if self.connections.values().any(|c| c.same_endpoints(&connection)) {
            return Err(ConnectionError::DuplicateConnection);
        }

        // An input takes data from at most one cable
        if source_port.class.data_compatible_with(&target_port.class) {
            let data_fed = self
                .connections_to(to_node, to_port)
                .any(|c| self.carries_data(c));
            if data_fed {
                return Err(ConnectionError::PortAlreadyConnected(
                    target_port.identifier.clone(),
                ));
            }
        }

        let id = connection.id;
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Remove a connection
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        self.connections.shift_remove(&connection_id)
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get connections into an input port
    pub fn connections_to<'a>(
        &'a self,
        node_id: NodeId,
        port: &'a str,
    ) -> impl Iterator<Item = &'a Connection> {
        self.connections
            .values()
            .filter(move |c| c.to_node == node_id && c.to_port == port)
    }

    /// Get connections involving a node
    pub fn connections_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.involves_node(node_id))
    }

    /// Every cable between the same two nodes as `connection`, itself included
    pub fn bundle<'a>(&'a self, connection: &Connection) -> impl Iterator<Item = &'a Connection> {
        let (from, to) = (connection.from_node, connection.to_node);
        self.connections.values().filter(move |c| c.runs_between(from, to))
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Resolve a connection's nodes and ports
    pub fn endpoints(&self, connection: &Connection) -> Option<Endpoints<'_>> {
        let from_node = self.nodes.get(&connection.from_node)?;
        let to_node = self.nodes.get(&connection.to_node)?;
        Some(Endpoints {
            from_port: from_node.output(&connection.from_port)?,
            to_port: to_node.input(&connection.to_port)?,
            from_node,
            to_node,
        })
    }

    /// Whether a cable carries data as well as events.
    ///
    /// True when both ports carry data of compatible types.
    pub fn carries_data(&self, connection: &Connection) -> bool {
        self.endpoints(connection).is_some_and(|e| {
            e.from_port.class.data_compatible_with(&e.to_port.class)
        })
    }

    /// Rebuild a node with another class.
    ///
    /// Every cable attached to the node is checked against the new ports.
    /// A cable is removed and returned when its port no longer exists, when it
    /// carried data before and no longer does, or when it starts carrying data
    /// into an input that another cable already feeds.
    pub fn replace_node_class(
        &mut self,
        node_id: NodeId,
        class: Arc<NodeClass>,
    ) -> Result<Vec<Connection>, ConnectionError> {
        let carried_data: HashSet<ConnectionId> = self
            .connections_for_node(node_id)
            .filter(|c| self.carries_data(c))
            .map(|c| c.id)
            .collect();

        self.nodes
            .get_mut(&node_id)
            .ok_or(ConnectionError::NodeNotFound(node_id))?
            .set_class(class);

        // Inputs fed by cables whose data status did not change
        let mut fed: HashSet<(NodeId, &str)> = self
            .connections
            .values()
            .filter(|c| !c.involves_node(node_id) || carried_data.contains(&c.id))
            .filter(|c| self.carries_data(c))
            .map(|c| (c.to_node, c.to_port.as_str()))
            .collect();

        let mut stale = Vec::new();
        for connection in self.connections_for_node(node_id) {
            let reason = if self.endpoints(connection).is_none() {
                "port no longer exists"
            } else if carried_data.contains(&connection.id) {
                if self.carries_data(connection) {
                    continue;
                }
                "cable no longer carries data"
            } else if self.carries_data(connection)
                && !fed.insert((connection.to_node, connection.to_port.as_str()))
            {
                "input already fed with data"
            } else {
                continue;
            };
            stale.push((connection.id, reason));
        }

        let mut dropped = Vec::with_capacity(stale.len());
        for (id, reason) in stale {
            if let Some(connection) = self.connections.shift_remove(&id) {
                tracing::warn!(
                    from = %connection.from_port,
                    to = %connection.to_port,
                    reason,
                    "Dropped cable after node class change"
                );
                dropped.push(connection);
            }
        }
        Ok(dropped)
    }

    /// Get nodes in topological order, upstream nodes first.
    ///
    /// Nodes with no ordering constraint between them keep insertion order.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let mut in_degree: HashMap<NodeId, usize> =
            self.nodes.keys().map(|id| (*id, 0)).collect();
        let mut downstream: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for connection in self.connections.values() {
            if let Some(degree) = in_degree.get_mut(&connection.to_node) {
                *degree += 1;
            }
            downstream
                .entry(connection.from_node)
                .or_default()
                .push(connection.to_node);
        }

        let mut ready: VecDeque<NodeId> = self
            .nodes
            .keys()
            .filter(|id| in_degree.get(id) == Some(&0))
            .copied()
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node_id) = ready.pop_front() {
            order.push(node_id);
            for next in downstream.get(&node_id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(*next);
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            Err(CycleError)
        }
    }
}

impl Default for Composition {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Resolved ends of a cable
#[derive(Debug, Clone, Copy)]
pub struct Endpoints<'a> {
    /// Source node
    pub from_node: &'a Node,
    /// Source output port
    pub from_port: &'a Port,
    /// Target node
    pub to_node: &'a Node,
    /// Target input port
    pub to_port: &'a Port,
}

/// Error when editing a composition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// No node with this identifier
    #[error("No node with identifier {0}")]
    UnknownIdentifier(String),

    /// Identifier already used by another node
    #[error("Duplicate node identifier: {0}")]
    DuplicateIdentifier(String),

    /// Port not found
    #[error("Node {node} has no port named {port}")]
    PortNotFound {
        /// Node identifier
        node: String,
        /// Port name
        port: String,
    },

    /// Input already fed with data by another cable
    #[error("Port already connected: {0}")]
    PortAlreadyConnected(String),

    /// Same ports already connected
    #[error("Cable already exists")]
    DuplicateConnection,

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,
}

impl ConnectionError {
    fn port_not_found(node: &Node, port: &str) -> Self {
        Self::PortNotFound {
            node: node.identifier.clone(),
            port: port.to_string(),
        }
    }
}

/// Error when the composition contains a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Composition contains a cycle")]
pub struct CycleError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortClass;

    fn hold() -> Arc<NodeClass> {
        Arc::new(
            NodeClass::new("flow.hold.Integer", "Hold")
                .with_port(PortClass::input_data("value", "Integer"))
                .with_port(PortClass::output_data("held", "Integer")),
        )
    }

    fn texter() -> Arc<NodeClass> {
        Arc::new(
            NodeClass::new("text.show", "Show")
                .with_port(PortClass::input_data("text", "Text"))
                .with_port(PortClass::output_event("done")),
        )
    }

    #[test]
    fn test_connect_and_carries_data() {
        let mut comp = Composition::new("test");
        let a = comp.add_node(Node::new(hold(), "A")).unwrap();
        let b = comp.add_node(Node::new(hold(), "B")).unwrap();
        let c = comp.add_node(Node::new(texter(), "C")).unwrap();

        let ab = comp.connect(a, "held", b, "value").unwrap();
        let bc = comp.connect(b, "held", c, "text").unwrap();
        assert!(comp.carries_data(comp.connection(ab).unwrap()));
        // Integer into Text is event-only
        assert!(!comp.carries_data(comp.connection(bc).unwrap()));
    }

    #[test]
    fn test_connect_errors() {
        let mut comp = Composition::new("test");
        let a = comp.add_node(Node::new(hold(), "A")).unwrap();
        let b = comp.add_node(Node::new(hold(), "B")).unwrap();
        let c = comp.add_node(Node::new(hold(), "C")).unwrap();

        assert!(matches!(
            comp.connect(a, "nope", b, "value"),
            Err(ConnectionError::PortNotFound { .. })
        ));
        assert_eq!(comp.connect(a, "held", a, "value"), Err(ConnectionError::SelfLoop));

        comp.connect(a, "held", b, "value").unwrap();
        assert_eq!(
            comp.connect(a, "held", b, "value"),
            Err(ConnectionError::DuplicateConnection)
        );
        assert_eq!(
            comp.connect(c, "held", b, "value"),
            Err(ConnectionError::PortAlreadyConnected("B__value".to_string()))
        );
        // Events may still fan into the refresh port
        comp.connect(c, "held", b, "refresh").unwrap();
    }

    #[test]
    fn test_duplicate_identifier() {
        let mut comp = Composition::new("test");
        comp.add_node(Node::new(hold(), "A")).unwrap();
        assert_eq!(
            comp.add_node(Node::new(hold(), "A")),
            Err(ConnectionError::DuplicateIdentifier("A".to_string()))
        );
    }

    #[test]
    fn test_bundle() {
        let mut comp = Composition::new("test");
        let a = comp.add_node(Node::new(hold(), "A")).unwrap();
        let b = comp.add_node(Node::new(hold(), "B")).unwrap();
        let c = comp.add_node(Node::new(hold(), "C")).unwrap();
        let first = comp.connect(a, "held", b, "value").unwrap();
        comp.connect(a, "held", b, "refresh").unwrap();
        comp.connect(a, "held", c, "value").unwrap();

        let cable = comp.connection(first).unwrap();
        assert_eq!(comp.bundle(cable).count(), 2);
    }

    #[test]
    fn test_replace_node_class_drops_stale_cables() {
        let mut comp = Composition::new("test");
        let a = comp.add_node(Node::new(hold(), "A")).unwrap();
        let b = comp.add_node(Node::new(hold(), "B")).unwrap();
        comp.connect(a, "held", b, "value").unwrap();
        comp.connect(a, "held", b, "refresh").unwrap();

        let dropped = comp
            .replace_node_class(b, Arc::new(NodeClass::new("empty", "Empty")))
            .unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].to_port, "value");
        assert_eq!(comp.connection_count(), 1);
    }

    #[test]
    fn test_replace_node_class_keeps_one_data_feed() {
        let class = |name: &str, ty: &str| {
            Arc::new(
                NodeClass::new(format!("flow.hold.{ty}"), name)
                    .with_port(PortClass::input_data("value", ty))
                    .with_port(PortClass::output_data("held", ty)),
            )
        };
        let mut comp = Composition::new("test");
        let a = comp.add_node(Node::new(hold(), "A")).unwrap();
        let t = comp.add_node(Node::new(class("Text", "Text"), "T")).unwrap();
        let b = comp.add_node(Node::new(hold(), "B")).unwrap();
        let int_into_b = comp.connect(a, "held", b, "value").unwrap();
        let text_into_b = comp.connect(t, "held", b, "value").unwrap();
        assert!(!comp.carries_data(comp.connection(text_into_b).unwrap()));

        // Both sources fit a generic input; the existing data feed wins
        let dropped = comp
            .replace_node_class(b, class("Hold", "Generic1"))
            .unwrap();
        let ids: Vec<ConnectionId> = dropped.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![text_into_b]);
        assert!(comp.carries_data(comp.connection(int_into_b).unwrap()));

        // An integer cable into a text input would silently lose its data
        let dropped = comp.replace_node_class(b, class("Hold", "Text")).unwrap();
        let ids: Vec<ConnectionId> = dropped.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![int_into_b]);
        assert_eq!(comp.connections_for_node(b).count(), 0);
    }

    #[test]
    fn test_topological_order() {
        let mut comp = Composition::new("test");
        let a = comp.add_node(Node::new(hold(), "A")).unwrap();
        let b = comp.add_node(Node::new(hold(), "B")).unwrap();
        let c = comp.add_node(Node::new(hold(), "C")).unwrap();
        comp.connect(b, "held", c, "value").unwrap();
        comp.connect(a, "held", b, "value").unwrap();

        let order = comp.topological_order().unwrap();
        let pos = |id| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));

        comp.connect(c, "held", a, "value").unwrap();
        assert_eq!(comp.topological_order(), Err(CycleError));
    }

    #[test]
    fn test_topological_order_of_long_chain() {
        let mut comp = Composition::new("chain");
        let mut previous = comp.add_node(Node::new(hold(), "N0")).unwrap();
        for i in 1..5_000 {
            let next = comp.add_node(Node::new(hold(), format!("N{i}"))).unwrap();
            comp.connect(previous, "held", next, "value").unwrap();
            previous = next;
        }

        let order = comp.topological_order().unwrap();
        assert_eq!(order.len(), 5_000);
        assert_eq!(order.last(), Some(&previous));
    }
}
