// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (cable) definitions for the composition graph.
//!
//! Connections address ports by name rather than by slot index, so a cable
//! survives a node being rebuilt with a re-specialized class as long as both
//! of its ports still exist.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A cable from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Source node ID
    pub from_node: NodeId,
    /// Source output port name
    pub from_port: String,
    /// Target node ID
    pub to_node: NodeId,
    /// Target input port name
    pub to_port: String,
}

impl Connection {
    /// Create a new connection
    pub fn new(
        from_node: NodeId,
        from_port: impl Into<String>,
        to_node: NodeId,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            from_node,
            from_port: from_port.into(),
            to_node,
            to_port: to_port.into(),
        }
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from_node == node_id || self.to_node == node_id
    }

    /// Whether this connection runs from `from` to `to`
    pub fn runs_between(&self, from: NodeId, to: NodeId) -> bool {
        self.from_node == from && self.to_node == to
    }

    /// Whether both connections join the same pair of ports
    pub fn same_endpoints(&self, other: &Connection) -> bool {
        self.from_node == other.from_node
            && self.from_port == other.from_port
            && self.to_node == other.to_node
            && self.to_port == other.to_port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_endpoints() {
        let a = NodeId::new();
        let b = NodeId::new();
        let c = NodeId::new();
        let cable = Connection::new(a, "list", b, "list");
        assert!(cable.involves_node(a));
        assert!(cable.involves_node(b));
        assert!(!cable.involves_node(c));
        assert!(cable.runs_between(a, b));
        assert!(!cable.runs_between(b, a));

        let twin = Connection::new(a, "list", b, "list");
        assert_ne!(cable.id, twin.id);
        assert!(cable.same_endpoints(&twin));
    }
}
