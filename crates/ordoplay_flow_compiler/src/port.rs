// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.
//!
//! A [`PortClass`] is the immutable template shared by every node of a class.
//! A [`Port`] instantiates it on one node and owns a slot in that node's port
//! context: an event flag, plus a data value for event+data ports.

use crate::generic;
use crate::ir::{FunctionBuilder, Operand, Reg, SlotAddr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the implicit first input of every node class
pub const REFRESH_PORT_NAME: &str = "refresh";

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

/// How an event arriving at an input port affects the node's output events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventBlocking {
    /// Events always pass through to the outputs
    #[default]
    None,
    /// Events never cause an output event by themselves
    Wall,
    /// Node logic decides whether an event passes
    Door,
}

impl EventBlocking {
    /// Whether an event into a port with this policy can reach the outputs
    pub fn may_pass(self) -> bool {
        match self {
            Self::None | Self::Door => true,
            Self::Wall => false,
        }
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Wall => "wall",
            Self::Door => "door",
        }
    }
}

/// What a port carries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// Events only
    Event,
    /// Events with an associated data value
    EventData {
        /// Semantic type name
        data_type: String,
    },
}

/// Port template shared by every node of a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortClass {
    /// Port name, unique per direction within the class
    pub name: String,
    /// Direction
    pub direction: PortDirection,
    /// Event-only or event+data
    pub kind: PortKind,
    /// Event-blocking policy (inputs only)
    pub blocking: EventBlocking,
}

impl PortClass {
    fn new(name: impl Into<String>, direction: PortDirection, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            direction,
            kind,
            blocking: EventBlocking::None,
        }
    }

    /// The implicit refresh input
    pub fn refresh() -> Self {
        Self::input_event(REFRESH_PORT_NAME)
    }

    /// Event-only input
    pub fn input_event(name: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Input, PortKind::Event)
    }

    /// Event+data input
    pub fn input_data(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::new(
            name,
            PortDirection::Input,
            PortKind::EventData {
                data_type: data_type.into(),
            },
        )
    }

    /// Event-only output
    pub fn output_event(name: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Output, PortKind::Event)
    }

    /// Event+data output
    pub fn output_data(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::new(
            name,
            PortDirection::Output,
            PortKind::EventData {
                data_type: data_type.into(),
            },
        )
    }

    /// Set the event-blocking policy
    pub fn with_blocking(mut self, blocking: EventBlocking) -> Self {
        self.blocking = blocking;
        self
    }

    /// Data type name, if the port carries data
    pub fn data_type(&self) -> Option<&str> {
        match &self.kind {
            PortKind::Event => None,
            PortKind::EventData { data_type } => Some(data_type),
        }
    }

    /// Whether the port carries data
    pub fn carries_data(&self) -> bool {
        matches!(self.kind, PortKind::EventData { .. })
    }

    /// Whether the port's data type is still a placeholder
    pub fn is_generic(&self) -> bool {
        self.data_type().is_some_and(generic::is_generic_type_name)
    }

    /// Whether data can flow between this port and `other`
    pub fn data_compatible_with(&self, other: &PortClass) -> bool {
        match (self.data_type(), other.data_type()) {
            (Some(a), Some(b)) => generic::types_compatible(a, b),
            _ => false,
        }
    }
}

/// A port on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    /// Shared template
    pub class: Arc<PortClass>,
    /// Index of the port's slot in the node's port context
    pub index: usize,
    /// Identifier used in generated code
    pub identifier: String,
}

impl Port {
    /// Instantiate a port class on the node with the given identifier
    pub fn new(class: Arc<PortClass>, node_identifier: &str, index: usize) -> Self {
        let identifier = port_identifier(node_identifier, &class.name);
        Self {
            class,
            index,
            identifier,
        }
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.class.name
    }
}

/// Identifier of a port in generated code
pub fn port_identifier(node_identifier: &str, port_name: &str) -> String {
    format!("{node_identifier}__{port_name}")
}

/// Layout of one slot in a port context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    /// Port name
    pub port: String,
    /// Whether the slot holds a data value
    pub has_data: bool,
}

/// Layout of a node's port context: inputs first, then outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLayout {
    node: String,
    slots: Vec<SlotLayout>,
}

impl ContextLayout {
    /// Build the layout for a node's ports, ordered by port index
    pub fn new<'a>(node: impl Into<String>, ports: impl IntoIterator<Item = &'a Port>) -> Self {
        let mut ports: Vec<&Port> = ports.into_iter().collect();
        ports.sort_by_key(|p| p.index);
        Self {
            node: node.into(),
            slots: ports
                .into_iter()
                .map(|p| SlotLayout {
                    port: p.class.name.clone(),
                    has_data: p.class.carries_data(),
                })
                .collect(),
        }
    }

    /// Identifier of the owning node
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the context has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot at an index
    pub fn slot(&self, index: usize) -> Option<&SlotLayout> {
        self.slots.get(index)
    }

    /// Address of the slot at an index
    pub fn address(&self, index: usize) -> SlotAddr {
        SlotAddr {
            context: self.node.clone(),
            index,
        }
    }
}

/// Port errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// Data access on an event-only port
    #[error("Port {port} carries no data")]
    InvalidPortKind {
        /// Port identifier
        port: String,
    },

    /// Port index outside the context, or slot without data
    #[error("Port {port} has no data slot in the context of {context}")]
    NotInLayout {
        /// Port identifier
        port: String,
        /// Context node identifier
        context: String,
    },
}

/// Load/store pair for a port's data slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAccessor {
    slot: SlotAddr,
}

impl SlotAccessor {
    /// Slot address
    pub fn addr(&self) -> &SlotAddr {
        &self.slot
    }

    /// Emit a load of the current value
    pub fn load(&self, b: &mut FunctionBuilder) -> Reg {
        b.load_data(&self.slot)
    }

    /// Emit a store of a new value
    pub fn store(&self, b: &mut FunctionBuilder, value: impl Into<Operand>) {
        b.store_data(&self.slot, value);
    }
}

/// Load/store pair for a port's event flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAccessor {
    slot: SlotAddr,
}

impl EventAccessor {
    /// Slot address
    pub fn addr(&self) -> &SlotAddr {
        &self.slot
    }

    /// Emit a load of the flag
    pub fn load(&self, b: &mut FunctionBuilder) -> Reg {
        b.load_event(&self.slot)
    }

    /// Emit a store of the flag
    pub fn store(&self, b: &mut FunctionBuilder, value: impl Into<Operand>) {
        b.store_event(&self.slot, value);
    }
}

/// Accessor for a port's data slot within `layout`
pub fn slot_accessor(port: &Port, layout: &ContextLayout) -> Result<SlotAccessor, PortError> {
    match &port.class.kind {
        PortKind::Event => Err(PortError::InvalidPortKind {
            port: port.identifier.clone(),
        }),
        PortKind::EventData { .. } => match layout.slot(port.index) {
            Some(slot) if slot.has_data => Ok(SlotAccessor {
                slot: layout.address(port.index),
            }),
            _ => Err(PortError::NotInLayout {
                port: port.identifier.clone(),
                context: layout.node().to_string(),
            }),
        },
    }
}

/// Accessor for a port's event flag within `layout`
pub fn event_accessor(port: &Port, layout: &ContextLayout) -> EventAccessor {
    EventAccessor {
        slot: layout.address(port.index),
    }
}

/// Whether an event arriving through ports with these classes can cause the
/// destination node to emit output events.
///
/// Pass the destination ports of every cable between the same two nodes. The
/// answer is `false` only when all of them are walls.
pub fn may_transmit<'a>(destinations: impl IntoIterator<Item = &'a PortClass>) -> bool {
    destinations.into_iter().any(|port| port.blocking.may_pass())
}
