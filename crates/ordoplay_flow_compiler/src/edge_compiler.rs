// SPDX-License-Identifier: MIT OR Apache-2.0
//! Code generation for event and data propagation.
//!
//! A cable delivers an event to its destination input and, when it carries
//! data, hands the source value to the destination slot. A node passes events
//! from its inputs to its outputs according to each input's blocking policy.

use crate::connection::Connection;
use crate::graph::Composition;
use crate::ir::{Function, FunctionBuilder, Operand};
use crate::node::Node;
use crate::ownership;
use crate::port::{event_accessor, slot_accessor, ContextLayout, EventBlocking, Port, PortError};

/// A cable resolved against its endpoints, ready for code emission
#[derive(Debug, Clone)]
pub struct CompiledEdge {
    /// Source output port
    pub from_port: Port,
    /// Port context of the source node
    pub from_layout: ContextLayout,
    /// Destination input port
    pub to_port: Port,
    /// Port context of the destination node
    pub to_layout: ContextLayout,
    /// Whether the cable carries data as well as events
    pub carries_data: bool,
}

impl CompiledEdge {
    /// Resolve a cable of a composition. `None` if an endpoint is missing.
    pub fn resolve(composition: &Composition, connection: &Connection) -> Option<Self> {
        let ends = composition.endpoints(connection)?;
        Some(Self {
            from_port: ends.from_port.clone(),
            from_layout: ends.from_node.context_layout(),
            to_port: ends.to_port.clone(),
            to_layout: ends.to_node.context_layout(),
            carries_data: ends.from_port.class.data_compatible_with(&ends.to_port.class),
        })
    }

    /// Symbol of the cable's transmission function
    pub fn function_name(&self) -> String {
        format!(
            "transmit.{}.{}",
            self.from_port.identifier, self.to_port.identifier
        )
    }
}

/// Emit the transmission of an event, and optionally a value, across a cable.
///
/// When the cable carries data and a value is given, the destination slot's
/// value is replaced with retain-before-release. A value offered to a
/// destination without data is dropped without being retained. The
/// destination event flag is always set.
pub fn emit_transmission(
    b: &mut FunctionBuilder,
    edge: &CompiledEdge,
    output_value: Option<Operand>,
) -> Result<(), PortError> {
    if let Some(value) = output_value {
        if edge.carries_data && edge.to_port.class.carries_data() {
            let slot = slot_accessor(&edge.to_port, &edge.to_layout)?;
            ownership::emit_replace(b, &slot, value);
        }
    }
    event_accessor(&edge.to_port, &edge.to_layout).store(b, true);
    Ok(())
}

/// Compile one cable into a function that reads the source output slot and
/// transmits it.
pub fn compile_edge_function(edge: &CompiledEdge) -> Result<Function, PortError> {
    let mut b = FunctionBuilder::new(edge.function_name());
    let value = if edge.carries_data {
        let source = slot_accessor(&edge.from_port, &edge.from_layout)?;
        Some(Operand::from(source.load(&mut b)))
    } else {
        None
    };
    emit_transmission(&mut b, edge, value)?;
    Ok(b.ret())
}

/// Emit the propagation of events through a node after its body ran.
///
/// Each output flag becomes: any `None` input hit, or (any `Door` input hit
/// and the flag the node body set). Wall inputs contribute nothing.
pub fn emit_node_transmission(b: &mut FunctionBuilder, node: &Node) {
    let layout = node.context_layout();
    let mut passing = Operand::Bool(false);
    let mut door: Option<Operand> = None;

    for port in &node.inputs {
        match port.class.blocking {
            EventBlocking::None => {
                let hit = event_accessor(port, &layout).load(b);
                passing = b.or(passing, hit).into();
            }
            EventBlocking::Door => {
                let hit = event_accessor(port, &layout).load(b);
                door = Some(match door {
                    Some(prev) => b.or(prev, hit).into(),
                    None => hit.into(),
                });
            }
            EventBlocking::Wall => {}
        }
    }

    for port in &node.outputs {
        let accessor = event_accessor(port, &layout);
        let value = match &door {
            Some(door) => {
                let current = accessor.load(b);
                let kept = b.and(door.clone(), current);
                b.or(passing.clone(), kept).into()
            }
            None => passing.clone(),
        };
        accessor.store(b, value);
    }
}
