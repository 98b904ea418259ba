// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node classes: the templates nodes are instantiated from.

use crate::generic::{is_generic_type_name, GenericType};
use crate::ir::Module;
use crate::port::{PortClass, PortDirection};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a node class's body comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Implementation {
    /// Body compiled in this session
    Generated(Arc<Module>),
    /// Body provided by a precompiled unit
    Linked(String),
    /// No body: the class is still generic
    Shell,
}

/// A node class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeClass {
    /// Class name, e.g. `list.make.3.Integer`
    pub name: String,
    /// Default node title
    pub title: String,
    /// Description
    pub description: String,
    /// Version
    pub version: String,
    /// Input port classes; the first is always `refresh`
    pub inputs: Vec<Arc<PortClass>>,
    /// Output port classes
    pub outputs: Vec<Arc<PortClass>>,
    /// Placeholder name to bound type name, in placeholder order
    pub specialization: IndexMap<String, String>,
    /// Placeholders restricted to a set of types
    #[serde(default)]
    pub constraints: Vec<GenericType>,
    /// Units the body must be linked with
    pub dependencies: IndexSet<String>,
    /// Body
    pub implementation: Implementation,
}

impl NodeClass {
    /// Create a class with only the refresh input and no body
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            inputs: vec![Arc::new(PortClass::refresh())],
            outputs: Vec::new(),
            specialization: IndexMap::new(),
            constraints: Vec::new(),
            dependencies: IndexSet::new(),
            implementation: Implementation::Shell,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Append a port, routed by its direction
    pub fn with_port(mut self, port: PortClass) -> Self {
        match port.direction {
            PortDirection::Input => self.inputs.push(Arc::new(port)),
            PortDirection::Output => self.outputs.push(Arc::new(port)),
        }
        self
    }

    /// Bind a placeholder
    pub fn with_specialization(
        mut self,
        placeholder: impl Into<String>,
        bound: impl Into<String>,
    ) -> Self {
        self.specialization.insert(placeholder.into(), bound.into());
        self
    }

    /// Restrict what a placeholder may be bound to
    pub fn with_constraint(mut self, generic: GenericType) -> Self {
        self.constraints.retain(|g| g.name != generic.name);
        self.constraints.push(generic);
        self
    }

    /// Binding constraints of a placeholder; unrestricted unless declared
    pub fn generic_type(&self, placeholder: &str) -> GenericType {
        self.constraints
            .iter()
            .find(|g| g.name == placeholder)
            .cloned()
            .unwrap_or_else(|| GenericType::new(placeholder))
    }

    /// Add a link dependency
    pub fn with_dependency(mut self, unit: impl Into<String>) -> Self {
        self.dependencies.insert(unit.into());
        self
    }

    /// Set the implementation
    pub fn with_implementation(mut self, implementation: Implementation) -> Self {
        self.implementation = implementation;
        self
    }

    /// Input port class by name
    pub fn input(&self, name: &str) -> Option<&Arc<PortClass>> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Output port class by name
    pub fn output(&self, name: &str) -> Option<&Arc<PortClass>> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Whether the class has a body to call
    pub fn has_body(&self) -> bool {
        !matches!(self.implementation, Implementation::Shell)
    }

    /// Compiled module, for generated classes
    pub fn module(&self) -> Option<&Arc<Module>> {
        match &self.implementation {
            Implementation::Generated(module) => Some(module),
            Implementation::Linked(_) | Implementation::Shell => None,
        }
    }

    /// Whether every placeholder is bound to a concrete type
    pub fn is_fully_specialized(&self) -> bool {
        self.specialization
            .values()
            .all(|bound| !is_generic_type_name(bound))
    }
}

/// Registry of node classes, keyed by name
#[derive(Debug, Clone, Default)]
pub struct NodeClassRegistry {
    classes: IndexMap<String, Arc<NodeClass>>,
}

impl NodeClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class, replacing any class of the same name
    pub fn register(&mut self, class: NodeClass) -> Arc<NodeClass> {
        let class = Arc::new(class);
        self.classes.insert(class.name.clone(), Arc::clone(&class));
        class
    }

    /// Look up a class
    pub fn get(&self, name: &str) -> Option<Arc<NodeClass>> {
        self.classes.get(name).cloned()
    }

    /// All classes in registration order
    pub fn classes(&self) -> impl Iterator<Item = &Arc<NodeClass>> {
        self.classes.values()
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::REFRESH_PORT_NAME;

    #[test]
    fn test_new_class_has_refresh() {
        let class = NodeClass::new("math.add.Integer", "Add");
        assert_eq!(class.inputs.len(), 1);
        assert_eq!(class.inputs[0].name, REFRESH_PORT_NAME);
        assert!(!class.has_body());
    }

    #[test]
    fn test_ports_routed_by_direction() {
        let class = NodeClass::new("math.add.Integer", "Add")
            .with_port(PortClass::input_data("a", "Integer"))
            .with_port(PortClass::output_data("sum", "Integer"));
        assert!(class.input("a").is_some());
        assert!(class.output("sum").is_some());
        assert!(class.input("sum").is_none());
    }

    #[test]
    fn test_specialization_state() {
        let shell = NodeClass::new("x", "X").with_specialization("Generic1", "Generic1");
        assert!(!shell.is_fully_specialized());
        let concrete = NodeClass::new("x", "X").with_specialization("Generic1", "Integer");
        assert!(concrete.is_fully_specialized());
    }

    #[test]
    fn test_constraints() {
        let class = NodeClass::new("math.add.Generic1", "Add")
            .with_specialization("Generic1", "Generic1")
            .with_constraint(GenericType::new("Generic1").with_compatible(["Integer", "Real"]));
        assert!(class.generic_type("Generic1").accepts("Real"));
        assert!(!class.generic_type("Generic1").accepts("Text"));
        assert!(class.generic_type("Generic2").accepts("Text"));
    }

    #[test]
    fn test_registry() {
        let mut registry = NodeClassRegistry::new();
        registry.register(NodeClass::new("a", "A"));
        registry.register(NodeClass::new("a", "A2"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().title, "A2");
    }
}
