// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compiler session: node class resolution, caching, and compilation.
//!
//! A session owns everything a compilation needs: the type registry, a handle to
//! the shared emission backend, the leaf class catalog, the generic families,
//! and a cache of every class resolved so far. Sessions are `Send + Sync`;
//! lookups run concurrently and only code emission is serialized.

use crate::catalog::builtin_catalog;
use crate::connection::{Connection, ConnectionId};
use crate::declaration::CompositionDecl;
use crate::edge_compiler::{compile_edge_function, emit_node_transmission, CompiledEdge};
use crate::families::{default_families, NodeClassFamily, SynthesisContext};
use crate::generic::is_generic_type_name;
use crate::graph::{Composition, ConnectionError};
use crate::ir::{FunctionBuilder, IrBackend, Module};
use crate::node::{Node, NodeId};
use crate::node_class::{Implementation, NodeClass, NodeClassRegistry};
use crate::port::{self, PortClass, PortError};
use crate::specialization::{NameError, ParamValue};
use crate::types::{TypeDescriptor, TypeRegistry};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Compiler session
pub struct CompilerSession {
    types: TypeRegistry,
    backend: Arc<IrBackend>,
    catalog: NodeClassRegistry,
    families: Vec<Box<dyn NodeClassFamily>>,
    cache: RwLock<IndexMap<String, Arc<NodeClass>>>,
}

impl CompilerSession {
    /// Create a session with the built-in catalog and families
    pub fn new(types: TypeRegistry, backend: Arc<IrBackend>) -> Self {
        let catalog = builtin_catalog();
        Self {
            types,
            backend,
            families: default_families(&catalog),
            catalog,
            cache: RwLock::new(IndexMap::new()),
        }
    }

    /// Session with the built-in types and a private backend
    pub fn with_defaults() -> Self {
        Self::new(TypeRegistry::with_builtin_types(), Arc::new(IrBackend::new()))
    }

    /// Replace the catalog, and the specialization families built from its
    /// generic classes
    pub fn with_catalog(mut self, catalog: NodeClassRegistry) -> Self {
        self.families = default_families(&catalog);
        self.catalog = catalog;
        self.cache.get_mut().clear();
        self
    }

    /// Compiled types
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Emission backend
    pub fn backend(&self) -> &Arc<IrBackend> {
        &self.backend
    }

    /// Leaf class catalog
    pub fn catalog(&self) -> &NodeClassRegistry {
        &self.catalog
    }

    /// Register an item type and its list type.
    ///
    /// Cached classes linked against an earlier definition of either type are
    /// discarded and will be synthesized again on next use.
    pub fn register_type(&mut self, item: TypeDescriptor) -> Arc<TypeDescriptor> {
        let list = TypeDescriptor::list_of(&item);
        let units = [item.unit.clone(), list.unit.clone()];
        let item = self.types.register_with_list(item);
        let cache = self.cache.get_mut();
        let before = cache.len();
        cache.retain(|_, class| !units.iter().any(|u| class.dependencies.contains(u)));
        let discarded = before - cache.len();
        if discarded > 0 {
            debug!(type_name = %item.name, discarded, "Discarded classes built on a redefined type");
        }
        item
    }

    /// Resolve a node class by exact name.
    ///
    /// Tries the cache, then the catalog, then each family in order. Returns
    /// `None` when no strategy can provide the class.
    pub fn resolve_node_class(&self, name: &str) -> Option<Arc<NodeClass>> {
        if let Some(class) = self.cache.read().get(name) {
            debug!(class = name, "Node class cache hit");
            return Some(Arc::clone(class));
        }

        let resolved = match self.catalog.get(name) {
            Some(class) => class,
            None => self.synthesize(name)?,
        };

        // First writer wins, so racing threads share one class
        let mut cache = self.cache.write();
        Some(Arc::clone(cache.entry(name.to_string()).or_insert(resolved)))
    }

    fn synthesize(&self, name: &str) -> Option<Arc<NodeClass>> {
        let cx = SynthesisContext {
            types: &self.types,
            backend: &self.backend,
        };
        for family in &self.families {
            match family.synthesize(name, &cx) {
                Ok(class) => {
                    info!(
                        class = name,
                        shell = !class.has_body(),
                        "Synthesized node class"
                    );
                    return Some(Arc::new(class));
                }
                Err(err) => debug!(
                    class = name,
                    family = family.signature().prefix(),
                    %err,
                    "Family could not provide node class"
                ),
            }
        }
        debug!(class = name, "No strategy provided node class");
        None
    }

    /// Cached class, without resolving
    pub fn cached(&self, name: &str) -> Option<Arc<NodeClass>> {
        self.cache.read().get(name).cloned()
    }

    /// Number of cached classes
    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }

    /// Discard a cached class
    pub fn invalidate(&self, name: &str) -> Option<Arc<NodeClass>> {
        self.cache.write().shift_remove(name)
    }

    /// Put a class in the cache, discarding any class of the same name
    pub fn replace(&self, class: NodeClass) -> Arc<NodeClass> {
        let class = Arc::new(class);
        self.cache
            .write()
            .insert(class.name.clone(), Arc::clone(&class));
        class
    }

    /// Whether an event sent through a cable can make its destination node
    /// emit events.
    ///
    /// Every cable between the same two nodes is considered, so the answer is
    /// `false` only when all of their destination ports are walls.
    pub fn may_transmit(&self, composition: &Composition, connection_id: ConnectionId) -> bool {
        let Some(connection) = composition.connection(connection_id) else {
            return false;
        };
        let destinations: Vec<&PortClass> = composition
            .bundle(connection)
            .filter_map(|c| composition.endpoints(c))
            .map(|ends| &*ends.to_port.class)
            .collect();
        port::may_transmit(destinations)
    }

    /// Compile one cable into its own module.
    ///
    /// The backend is held from the first emitted instruction to the finished
    /// module, as in [`compile_composition`](Self::compile_composition).
    pub fn compile_edge(
        &self,
        composition: &Composition,
        connection_id: ConnectionId,
    ) -> Result<Module, CompileError> {
        let connection = composition
            .connection(connection_id)
            .ok_or(CompileError::ConnectionNotFound(connection_id))?;
        let edge = CompiledEdge::resolve(composition, connection)
            .ok_or(CompileError::DanglingConnection(connection_id))?;
        let may_transmit = self.may_transmit(composition, connection_id);

        let mut guard = self.backend.lock();
        let function = compile_edge_function(&edge)?;
        let mut module = guard.module(edge.function_name());
        module.define(function);
        module.set_details(serde_json::json!({
            "carriesData": edge.carries_data,
            "mayTransmit": may_transmit,
        }));
        Ok(module.finish())
    }

    /// Compile a whole composition.
    ///
    /// Emits one `fire.<node>` function per node, propagating events through
    /// the node, and one transmission function per cable.
    pub fn compile_composition(&self, composition: &Composition) -> Result<Module, CompileError> {
        if let Some(node) = composition.nodes().find(|n| !n.class.has_body()) {
            return Err(CompileError::NodeNotBuildable {
                node: node.identifier.clone(),
                class: node.class.name.clone(),
            });
        }

        let order: Vec<&Node> = match composition.topological_order() {
            Ok(ids) => ids.iter().filter_map(|id| composition.node(*id)).collect(),
            Err(_) => {
                debug!(composition = %composition.name, "Feedback loop, keeping declaration order");
                composition.nodes().collect()
            }
        };

        let mut guard = self.backend.lock();
        let mut functions = Vec::new();
        let mut dependencies = IndexSet::new();
        for node in &order {
            let mut b = FunctionBuilder::new(format!("fire.{}", node.identifier));
            emit_node_transmission(&mut b, node);
            functions.push(b.ret());

            dependencies.extend(node.class.dependencies.iter().cloned());
            if let Implementation::Generated(_) = node.class.implementation {
                dependencies.insert(node.class.name.clone());
            }
        }

        let mut cables = Vec::new();
        for connection in composition.connections() {
            let edge = CompiledEdge::resolve(composition, connection)
                .ok_or(CompileError::DanglingConnection(connection.id))?;
            functions.push(compile_edge_function(&edge)?);
            cables.push(serde_json::json!({
                "from": format!("{}:{}", edge.from_layout.node(), edge.from_port.name()),
                "to": format!("{}:{}", edge.to_layout.node(), edge.to_port.name()),
                "carriesData": edge.carries_data,
                "mayTransmit": self.may_transmit(composition, connection.id),
            }));
        }

        let nodes: Vec<&str> = order.iter().map(|n| n.identifier.as_str()).collect();
        let mut module = guard.module(composition.name.as_str());
        for function in functions {
            module.define(function);
        }
        for unit in dependencies {
            module.add_dependency(unit);
        }
        module.set_details(serde_json::json!({
            "composition": composition.name,
            "nodes": nodes,
            "cables": cables,
        }));
        Ok(module.finish())
    }

    /// Build a composition from declarations.
    ///
    /// Every node whose class cannot be resolved is reported, not just the
    /// first one.
    pub fn instantiate(&self, decl: &CompositionDecl) -> Result<Composition, CompositionError> {
        let mut composition = Composition::new(decl.name.clone());
        let mut issues = Vec::new();

        for node in &decl.nodes {
            let Some(class) = self.resolve_node_class(&node.class_name) else {
                warn!(node = %node.identifier, class = %node.class_name, "Unresolved node class");
                issues.push(ResolutionIssue {
                    node: node.identifier.clone(),
                    class_name: node.class_name.clone(),
                });
                continue;
            };
            composition.add_node(
                Node::new(class, node.identifier.clone())
                    .with_title(node.title.clone())
                    .with_position(node.position[0], node.position[1])
                    .with_size(node.size[0], node.size[1])
                    .with_tint(node.tint),
            )?;
        }
        if !issues.is_empty() {
            return Err(CompositionError::Unresolved(issues));
        }

        for edge in &decl.edges {
            let from = node_id(&composition, &edge.from_node)?;
            let to = node_id(&composition, &edge.to_node)?;
            composition.connect(from, &edge.from_port, to, &edge.to_port)?;
        }
        Ok(composition)
    }

    /// Bind one placeholder of a generic node to a concrete type.
    ///
    /// Returns the cables that no longer fit the node's ports.
    pub fn specialize_node(
        &self,
        composition: &mut Composition,
        node_id: NodeId,
        placeholder: &str,
        concrete: &str,
    ) -> Result<Vec<Connection>, SpecializeError> {
        let node = composition
            .node(node_id)
            .ok_or(SpecializeError::NodeNotFound(node_id))?;
        let accepted = node.class.generic_type(placeholder).accepts(concrete);
        if is_generic_type_name(concrete) || !accepted {
            return Err(SpecializeError::IncompatibleType {
                placeholder: placeholder.to_string(),
                concrete: concrete.to_string(),
            });
        }
        let (family, params) = self.family_params(composition, node_id)?;
        let name = family
            .signature()
            .substitute_type(&params, placeholder, concrete)?;
        self.rebind(composition, node_id, &name)
    }

    /// Revert the listed placeholders of a node; an empty list reverts all
    pub fn unspecialize_node(
        &self,
        composition: &mut Composition,
        node_id: NodeId,
        placeholders: &[&str],
    ) -> Result<Vec<Connection>, SpecializeError> {
        let (family, params) = self.family_params(composition, node_id)?;
        let signature = family.signature();
        let name = if placeholders.is_empty() {
            signature.revert_to_generic(&params)?
        } else {
            signature.unspecialize(&params, placeholders)?
        };
        self.rebind(composition, node_id, &name)
    }

    /// Add (`delta > 0`) or remove item inputs of a list node
    pub fn resize_list_node(
        &self,
        composition: &mut Composition,
        node_id: NodeId,
        delta: i64,
    ) -> Result<Vec<Connection>, SpecializeError> {
        let (family, params) = self.family_params(composition, node_id)?;
        let name = family.signature().resize_count(&params, delta)?;
        self.rebind(composition, node_id, &name)
    }

    fn family_params(
        &self,
        composition: &Composition,
        node_id: NodeId,
    ) -> Result<(&dyn NodeClassFamily, Vec<ParamValue>), SpecializeError> {
        let node = composition
            .node(node_id)
            .ok_or(SpecializeError::NodeNotFound(node_id))?;
        self.families
            .iter()
            .find_map(|family| {
                let params = family.signature().parse_name(&node.class.name).ok()?;
                Some((family.as_ref(), params))
            })
            .ok_or_else(|| SpecializeError::NotGeneric {
                node: node.identifier.clone(),
                class: node.class.name.clone(),
            })
    }

    fn rebind(
        &self,
        composition: &mut Composition,
        node_id: NodeId,
        name: &str,
    ) -> Result<Vec<Connection>, SpecializeError> {
        let class = self.resolve_node_class(name).ok_or_else(|| {
            let node = composition
                .node(node_id)
                .map(|n| n.identifier.clone())
                .unwrap_or_default();
            SpecializeError::Unresolvable {
                node,
                class: name.to_string(),
            }
        })?;
        Ok(composition.replace_node_class(node_id, class)?)
    }
}

impl fmt::Debug for CompilerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerSession")
            .field("types", &self.types.len())
            .field("catalog", &self.catalog.len())
            .field("families", &self.families.len())
            .field("cached", &self.cached_count())
            .finish()
    }
}

fn node_id(composition: &Composition, identifier: &str) -> Result<NodeId, ConnectionError> {
    composition
        .node_by_identifier(identifier)
        .map(|n| n.id)
        .ok_or_else(|| ConnectionError::UnknownIdentifier(identifier.to_string()))
}

/// Compilation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// No such cable
    #[error("Cable not found: {0:?}")]
    ConnectionNotFound(ConnectionId),

    /// Cable whose node or port is missing
    #[error("Cable {0:?} refers to a missing node or port")]
    DanglingConnection(ConnectionId),

    /// Node whose class has no body
    #[error("Node {node} cannot be built: {class} is still generic")]
    NodeNotBuildable {
        /// Node identifier
        node: String,
        /// Class name
        class: String,
    },

    /// Port access error
    #[error(transparent)]
    Port(#[from] PortError),
}

/// A node whose class could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionIssue {
    /// Node identifier
    pub node: String,
    /// Declared class name
    pub class_name: String,
}

impl fmt::Display for ResolutionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}: no node class named {}", self.node, self.class_name)
    }
}

fn describe_issues(issues: &[ResolutionIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors building a composition from declarations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    /// Some node classes could not be resolved
    #[error("Unresolved node classes: {}", describe_issues(.0))]
    Unresolved(Vec<ResolutionIssue>),

    /// Invalid node or cable
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Re-specialization errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecializeError {
    /// No such node
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Node class is not a member of any family
    #[error("Node {node} has class {class}, which is not generic")]
    NotGeneric {
        /// Node identifier
        node: String,
        /// Class name
        class: String,
    },

    /// Type not accepted by the placeholder
    #[error("{placeholder} cannot be bound to {concrete}")]
    IncompatibleType {
        /// Placeholder name
        placeholder: String,
        /// Requested type
        concrete: String,
    },

    /// Class name not valid for the family
    #[error(transparent)]
    Name(#[from] NameError),

    /// No strategy could provide the new class
    #[error("Node {node}: no node class named {class}")]
    Unresolvable {
        /// Node identifier
        node: String,
        /// Class name
        class: String,
    },

    /// Rebuilding the node failed
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::EventBlocking;
    use crate::types::ValueShape;

    #[test]
    fn test_resolution_order_and_cache() {
        let session = CompilerSession::with_defaults();
        let hold = session.resolve_node_class("flow.hold.Integer").unwrap();
        assert!(matches!(hold.implementation, Implementation::Linked(_)));

        let first = session.resolve_node_class("list.make.2.Integer").unwrap();
        let second = session.resolve_node_class("list.make.2.Integer").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.backend().modules_emitted(), 1);
        assert_eq!(session.cached_count(), 2);
    }

    #[test]
    fn test_unresolvable_is_none() {
        let session = CompilerSession::with_defaults();
        assert!(session.resolve_node_class("list.make.1.Nope").is_none());
        assert!(session.resolve_node_class("no.such.class").is_none());
        assert_eq!(session.cached_count(), 0);
    }

    #[test]
    fn test_invalidate_and_replace() {
        let session = CompilerSession::with_defaults();
        let first = session.resolve_node_class("list.make.1.Text").unwrap();
        assert!(session.invalidate("list.make.1.Text").is_some());
        let second = session.resolve_node_class("list.make.1.Text").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        let replaced = session.replace(NodeClass::new("list.make.1.Text", "Custom"));
        assert!(Arc::ptr_eq(&session.cached("list.make.1.Text").unwrap(), &replaced));
    }

    #[test]
    fn test_register_type_discards_dependents() {
        let mut session = CompilerSession::with_defaults();
        session.resolve_node_class("list.make.1.Integer").unwrap();
        session.resolve_node_class("list.make.1.Real").unwrap();
        session.register_type(TypeDescriptor::value("Integer", ValueShape::TwoWords));
        assert!(session.cached("list.make.1.Integer").is_none());
        assert!(session.cached("list.make.1.Real").is_some());

        let class = session.resolve_node_class("list.make.1.Integer").unwrap();
        let body = class.module().unwrap().event_function().unwrap();
        assert_eq!(body.params.len(), 2);
    }

    #[test]
    fn test_may_transmit_uses_bundle() {
        let session = CompilerSession::with_defaults();
        let mut comp = Composition::new("test");
        let add = session.resolve_node_class("math.add.Integer").unwrap();
        let hold = session.resolve_node_class("flow.hold.Integer").unwrap();
        let a = comp.add_node(Node::new(add, "Add1")).unwrap();
        let h = comp.add_node(Node::new(hold, "Hold1")).unwrap();

        let walled = comp.connect(a, "sum", h, "newValue").unwrap();
        assert!(!session.may_transmit(&comp, walled));

        comp.connect(a, "sum", h, "refresh").unwrap();
        assert!(session.may_transmit(&comp, walled));
        assert!(!session.may_transmit(&comp, ConnectionId::new()));
    }

    #[test]
    fn test_compile_edge_module() {
        let session = CompilerSession::with_defaults();
        let mut comp = Composition::new("test");
        let add = session.resolve_node_class("math.add.Integer").unwrap();
        let a = comp.add_node(Node::new(Arc::clone(&add), "Add1")).unwrap();
        let b = comp.add_node(Node::new(add, "Add2")).unwrap();
        let id = comp.connect(a, "sum", b, "a").unwrap();

        let module = session.compile_edge(&comp, id).unwrap();
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.details["carriesData"], true);
        assert_eq!(module.details["mayTransmit"], true);

        let missing = ConnectionId::new();
        assert_eq!(
            session.compile_edge(&comp, missing).unwrap_err(),
            CompileError::ConnectionNotFound(missing)
        );
    }

    #[test]
    fn test_compile_edge_waits_for_backend() {
        let session = CompilerSession::with_defaults();
        let mut comp = Composition::new("test");
        let add = session.resolve_node_class("math.add.Integer").unwrap();
        let a = comp.add_node(Node::new(Arc::clone(&add), "Add1")).unwrap();
        let b = comp.add_node(Node::new(add, "Add2")).unwrap();
        let id = comp.connect(a, "sum", b, "a").unwrap();
        let before = session.backend().functions_emitted();

        let guard = session.backend().lock();
        std::thread::scope(|scope| {
            let compiling = scope.spawn(|| session.compile_edge(&comp, id));
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert!(!compiling.is_finished());
            drop(guard);
            assert!(compiling.join().unwrap().is_ok());
        });
        assert_eq!(session.backend().functions_emitted(), before + 1);
    }

    #[test]
    fn test_compile_composition_requires_bodies() {
        let session = CompilerSession::with_defaults();
        let mut comp = Composition::new("test");
        let shell = session.resolve_node_class("list.make.2.Generic1").unwrap();
        comp.add_node(Node::new(shell, "MakeList1")).unwrap();
        assert_eq!(
            session.compile_composition(&comp).unwrap_err(),
            CompileError::NodeNotBuildable {
                node: "MakeList1".to_string(),
                class: "list.make.2.Generic1".to_string(),
            }
        );
    }

    #[test]
    fn test_specialize_and_resize() {
        let session = CompilerSession::with_defaults();
        let mut comp = Composition::new("test");
        let shell = session.resolve_node_class("list.make.2.Generic1").unwrap();
        let count = session.resolve_node_class("list.count.Integer").unwrap();
        let m = comp.add_node(Node::new(shell, "MakeList1")).unwrap();
        let c = comp.add_node(Node::new(count, "Count1")).unwrap();
        comp.connect(m, "list", c, "list").unwrap();

        let dropped = session.specialize_node(&mut comp, m, "Generic1", "Integer").unwrap();
        assert!(dropped.is_empty());
        assert_eq!(comp.node(m).unwrap().class.name, "list.make.2.Integer");
        assert!(comp.node(m).unwrap().class.has_body());

        session.resize_list_node(&mut comp, m, 1).unwrap();
        assert_eq!(comp.node(m).unwrap().inputs.len(), 4);

        session.unspecialize_node(&mut comp, m, &[]).unwrap();
        assert_eq!(comp.node(m).unwrap().class.name, "list.make.3.Generic1");
        assert_eq!(comp.connection_count(), 1);
    }

    #[test]
    fn test_specialize_errors() {
        let session = CompilerSession::with_defaults();
        let mut comp = Composition::new("test");
        let add = session.resolve_node_class("math.add.Integer").unwrap();
        let shell = session.resolve_node_class("list.make.1.Generic1").unwrap();
        let a = comp.add_node(Node::new(add, "Add1")).unwrap();
        let m = comp.add_node(Node::new(shell, "MakeList1")).unwrap();

        assert!(matches!(
            session.specialize_node(&mut comp, a, "Generic1", "Integer"),
            Err(SpecializeError::NotGeneric { .. })
        ));
        assert!(matches!(
            session.specialize_node(&mut comp, m, "Generic1", "Generic2"),
            Err(SpecializeError::IncompatibleType { .. })
        ));
        assert_eq!(
            session.specialize_node(&mut comp, m, "Generic1", "Nope"),
            Err(SpecializeError::Unresolvable {
                node: "MakeList1".to_string(),
                class: "list.make.1.Nope".to_string(),
            })
        );
    }

    #[test]
    fn test_door_blocking_in_catalog() {
        let session = CompilerSession::with_defaults();
        let allow = session.resolve_node_class("event.allowFirst").unwrap();
        assert_eq!(allow.input("event").unwrap().blocking, EventBlocking::Door);
    }
}
