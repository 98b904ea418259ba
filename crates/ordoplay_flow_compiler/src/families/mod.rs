// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parametric node class families.
//!
//! A family turns a member name into a node class on demand: a class with a
//! body when every type parameter is concrete, or a shell class with
//! placeholder ports and no body otherwise.

pub mod make_list;
pub mod specialized;

pub use make_list::MakeListFamily;
pub use specialized::SpecializedFamily;

use crate::ir::IrBackend;
use crate::node_class::{NodeClass, NodeClassRegistry};
use crate::specialization::{FamilySignature, NameError};
use crate::types::TypeRegistry;
use std::sync::Arc;

/// What a family needs to synthesize a class
#[derive(Debug, Clone, Copy)]
pub struct SynthesisContext<'a> {
    /// Compiled types
    pub types: &'a TypeRegistry,
    /// Emission backend
    pub backend: &'a IrBackend,
}

/// Synthesis errors. None of them is fatal to a session: each one means "this
/// family cannot provide the class".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// The name does not belong to the family
    #[error("{0} does not belong to this family")]
    NameNotInFamily(String),

    /// A type named by the class is not registered
    #[error("Type {0} could not be resolved")]
    UnresolvableType(String),

    /// The type is outside what the placeholder accepts
    #[error("{placeholder} cannot be bound to {concrete}")]
    IncompatibleType {
        /// Placeholder name
        placeholder: String,
        /// Requested type
        concrete: String,
    },

    /// A type unit does not export a helper the body calls
    #[error("Unit {unit} does not export {symbol}")]
    MissingBuildDependency {
        /// Unit name
        unit: String,
        /// Missing symbol
        symbol: String,
    },
}

impl From<NameError> for SynthesisError {
    fn from(err: NameError) -> Self {
        match err {
            NameError::NameNotInFamily { name, .. } => Self::NameNotInFamily(name),
            NameError::InvalidParameters { family } => Self::NameNotInFamily(family),
        }
    }
}

/// A family of node classes sharing a name prefix
pub trait NodeClassFamily: Send + Sync {
    /// Name signature of the family
    fn signature(&self) -> &FamilySignature;

    /// Produce the class with the given name
    fn synthesize(&self, name: &str, cx: &SynthesisContext<'_>) -> Result<NodeClass, SynthesisError>;

    /// Whether the name could belong to this family
    fn is_member(&self, name: &str) -> bool {
        self.signature().is_member(name)
    }
}

/// Families every session knows about: make-list first, then one
/// specialization family per generic class of the catalog
pub fn default_families(catalog: &NodeClassRegistry) -> Vec<Box<dyn NodeClassFamily>> {
    let mut families: Vec<Box<dyn NodeClassFamily>> = vec![Box::new(MakeListFamily::new())];
    for class in catalog.classes() {
        if let Some(family) = SpecializedFamily::from_template(Arc::clone(class)) {
            families.push(Box::new(family));
        }
    }
    families
}
