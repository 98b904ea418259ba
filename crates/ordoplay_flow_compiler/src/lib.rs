// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow compiler core for `OrdoPlay` Flow.
//!
//! Compositions are graphs of nodes joined by cables. Every port carries
//! events; data ports also carry a reference-counted value. This crate:
//! - models ports, their event-blocking policies and the per-node port context
//! - compiles event and data propagation across cables into a small IR
//! - synthesizes node classes of generic families such as
//!   `list.make.<count>.<type>` on demand
//!
//! ## Architecture
//!
//! A [`CompilerSession`] resolves node classes by name (cache, then the leaf
//! [catalog], then each [family](families)), compiles cables and whole
//! compositions, and re-specializes generic nodes. Code is emitted through the
//! exclusive [`IrBackend`](ir::IrBackend); generated code can be checked with
//! the reference evaluator in [`ir::eval`].

pub mod catalog;
pub mod connection;
pub mod declaration;
pub mod edge_compiler;
pub mod families;
pub mod generic;
pub mod graph;
pub mod ir;
pub mod node;
pub mod node_class;
pub mod ownership;
pub mod port;
pub mod session;
pub mod specialization;
pub mod types;

pub use connection::{Connection, ConnectionId};
pub use declaration::{CompositionDecl, DeclarationError};
pub use families::{MakeListFamily, NodeClassFamily, SynthesisError};
pub use graph::{Composition, ConnectionError};
pub use node::{Node, NodeId, TintColor};
pub use node_class::{Implementation, NodeClass};
pub use port::{EventBlocking, Port, PortClass, PortDirection, PortKind};
pub use session::{CompileError, CompilerSession, CompositionError, ResolutionIssue, SpecializeError};
pub use specialization::{FamilySignature, NameError, ParamValue};
pub use types::{TypeDescriptor, TypeRegistry, ValueShape};
