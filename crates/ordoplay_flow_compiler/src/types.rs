// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compiled data types.
//!
//! The registry resolves a type name to the descriptor of its compiled unit.
//! Every item type is registered together with its list type, whose unit
//! exports the `ListCreate_<T>` and `ListAppendValue_<T>` helpers that generated
//! node bodies call.

use crate::generic::{is_list_type_name, item_type_name, list_type_name};
use crate::ir::eval::{native_list_append, native_list_create, NativeTable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How many machine words a value occupies when passed by value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueShape {
    /// One word (integers, reals, references)
    #[default]
    OneWord,
    /// Two words (small structs such as 2D points)
    TwoWords,
}

impl ValueShape {
    /// Number of words
    pub fn words(self) -> usize {
        match self {
            Self::OneWord => 1,
            Self::TwoWords => 2,
        }
    }

    /// Shape for a word count
    pub fn from_words(words: usize) -> Option<Self> {
        match words {
            1 => Some(Self::OneWord),
            2 => Some(Self::TwoWords),
            _ => None,
        }
    }
}

/// Descriptor of one compiled type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Type name
    pub name: String,
    /// Calling-convention shape
    pub shape: ValueShape,
    /// Whether values are reference counted
    pub managed: bool,
    /// Item type, for list types
    pub item_type: Option<String>,
    /// Name of the compiled unit defining the type
    pub unit: String,
    /// Symbols exported by the unit
    pub exports: Vec<String>,
}

impl TypeDescriptor {
    /// A plain value type
    pub fn value(name: impl Into<String>, shape: ValueShape) -> Self {
        let name = name.into();
        Self {
            unit: format!("type.{name}"),
            name,
            shape,
            managed: false,
            item_type: None,
            exports: Vec::new(),
        }
    }

    /// A reference-counted type
    pub fn managed(name: impl Into<String>) -> Self {
        Self {
            managed: true,
            ..Self::value(name, ValueShape::OneWord)
        }
    }

    /// The list type for an item type, exporting the list helpers
    pub fn list_of(item: &TypeDescriptor) -> Self {
        Self {
            item_type: Some(item.name.clone()),
            exports: vec![item.list_create_symbol(), item.list_append_symbol()],
            ..Self::managed(list_type_name(&item.name))
        }
    }

    /// Whether this is a list type
    pub fn is_list(&self) -> bool {
        self.item_type.is_some()
    }

    /// Whether the unit exports a symbol
    pub fn exports(&self, symbol: &str) -> bool {
        self.exports.iter().any(|s| s == symbol)
    }

    /// Symbol creating an empty list of this type
    pub fn list_create_symbol(&self) -> String {
        format!("ListCreate_{}", self.name)
    }

    /// Symbol appending one value of this type to a list
    pub fn list_append_symbol(&self) -> String {
        format!("ListAppendValue_{}", self.name)
    }
}

/// Registry of compiled types
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in types and their lists
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        registry.register_with_list(TypeDescriptor::value("Boolean", ValueShape::OneWord));
        registry.register_with_list(TypeDescriptor::value("Integer", ValueShape::OneWord));
        registry.register_with_list(TypeDescriptor::value("Real", ValueShape::OneWord));
        registry.register_with_list(TypeDescriptor::managed("Text"));
        registry.register_with_list(TypeDescriptor::value("Point2d", ValueShape::TwoWords));
        registry.register_with_list(TypeDescriptor::value("Color", ValueShape::TwoWords));
        registry
    }

    /// Register a type, replacing any previous descriptor of the same name
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.types
            .insert(descriptor.name.clone(), Arc::clone(&descriptor));
        descriptor
    }

    /// Register an item type together with its list type
    pub fn register_with_list(&mut self, item: TypeDescriptor) -> Arc<TypeDescriptor> {
        let list = TypeDescriptor::list_of(&item);
        let item = self.register(item);
        self.register(list);
        item
    }

    /// Look up a type
    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(name).cloned()
    }

    /// Whether a type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// The list type for an item type
    pub fn list_type_for(&self, item: &str) -> Option<Arc<TypeDescriptor>> {
        self.get(&list_type_name(item))
    }

    /// All descriptors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> {
        self.types.values()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Native implementations of every exported list helper, for the evaluator
    pub fn native_table(&self) -> NativeTable {
        let mut natives = NativeTable::new();
        for list in self.types.values().filter(|t| is_list_type_name(&t.name)) {
            let Some(item) = item_type_name(&list.name).and_then(|name| self.get(name)) else {
                continue;
            };
            let create = item.list_create_symbol();
            if list.exports(&create) {
                natives.insert(create, native_list_create);
            }
            let append = item.list_append_symbol();
            if list.exports(&append) {
                natives.insert(append, native_list_append);
            }
        }
        natives
    }
}
