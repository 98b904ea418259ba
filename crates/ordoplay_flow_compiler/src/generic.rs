// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generic type placeholders.
//!
//! A placeholder is named `Generic<N>`; a list of placeholders is
//! `List_Generic<N>`. Binding a placeholder replaces the innermost type name and
//! keeps any `List_` prefixes.

use serde::{Deserialize, Serialize};

/// Prefix of every placeholder type name
pub const GENERIC_TYPE_PREFIX: &str = "Generic";

/// Prefix of every list type name
pub const LIST_TYPE_PREFIX: &str = "List_";

/// Placeholder name for a number, e.g. `Generic1`
pub fn generic_type_name(n: u32) -> String {
    format!("{GENERIC_TYPE_PREFIX}{n}")
}

/// The number of a placeholder, if `name` is one (lists not included)
pub fn generic_suffix(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(GENERIC_TYPE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Whether a type name is a placeholder or a (nested) list of placeholders
pub fn is_generic_type_name(name: &str) -> bool {
    generic_suffix(innermost_type_name(name)).is_some()
}

/// List type name for an item type
pub fn list_type_name(item: &str) -> String {
    format!("{LIST_TYPE_PREFIX}{item}")
}

/// Whether a type name names a list
pub fn is_list_type_name(name: &str) -> bool {
    name.starts_with(LIST_TYPE_PREFIX)
}

/// Item type of a list type name
pub fn item_type_name(list: &str) -> Option<&str> {
    list.strip_prefix(LIST_TYPE_PREFIX)
}

/// The type name left after stripping every `List_` prefix
pub fn innermost_type_name(name: &str) -> &str {
    let mut inner = name;
    while let Some(rest) = inner.strip_prefix(LIST_TYPE_PREFIX) {
        inner = rest;
    }
    inner
}

/// Replace the innermost type of `name`, keeping its list nesting
pub fn replace_innermost(name: &str, replacement: &str) -> String {
    let depth = (name.len() - innermost_type_name(name).len()) / LIST_TYPE_PREFIX.len();
    let mut out = LIST_TYPE_PREFIX.repeat(depth);
    out.push_str(replacement);
    out
}

/// Whether data can flow between ports of these two types.
///
/// Types are compatible when equal, or when one side is still generic and
/// both sides have the same list nesting.
pub fn types_compatible(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let depth = |name: &str| name.len() - innermost_type_name(name).len();
    (is_generic_type_name(a) || is_generic_type_name(b)) && depth(a) == depth(b)
}

/// Sort placeholder names by number, so `Generic10` follows `Generic9`
pub fn sort_generic_type_names(names: &mut [String]) {
    names.sort_by_key(|name| {
        (
            generic_suffix(innermost_type_name(name)).unwrap_or(u32::MAX),
            name.clone(),
        )
    });
}

/// Which concrete types a placeholder may be bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compatibility {
    /// Any type
    AnyType,
    /// Any list type
    AnyListType,
    /// Only the listed types
    Whitelist(Vec<String>),
}

/// A placeholder and its binding constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericType {
    /// Placeholder name, possibly wrapped in `List_`
    pub name: String,
    /// Allowed concrete types; empty means unrestricted
    pub compatible: Vec<String>,
}

impl GenericType {
    /// An unrestricted placeholder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compatible: Vec::new(),
        }
    }

    /// Restrict to a whitelist
    pub fn with_compatible(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.compatible = types.into_iter().map(Into::into).collect();
        self
    }

    /// Binding constraints
    pub fn compatibility(&self) -> Compatibility {
        if !self.compatible.is_empty() {
            Compatibility::Whitelist(self.compatible.clone())
        } else if is_list_type_name(&self.name) {
            Compatibility::AnyListType
        } else {
            Compatibility::AnyType
        }
    }

    /// Whether the placeholder may be bound to `concrete`
    pub fn accepts(&self, concrete: &str) -> bool {
        match self.compatibility() {
            Compatibility::AnyType => true,
            Compatibility::AnyListType => is_list_type_name(concrete),
            Compatibility::Whitelist(types) => types.iter().any(|t| t == concrete),
        }
    }

    /// Human-readable description for port popovers
    pub fn description(&self) -> String {
        let n = generic_suffix(innermost_type_name(&self.name)).unwrap_or(0);
        match self.compatibility() {
            Compatibility::AnyType => format!("Generic #{n} (can connect to any type)"),
            Compatibility::AnyListType => format!("Generic #{n} (can connect to any list type)"),
            Compatibility::Whitelist(types) => {
                format!("Generic #{n} (can connect to {})", types.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_names() {
        assert_eq!(generic_type_name(1), "Generic1");
        assert!(is_generic_type_name("Generic1"));
        assert!(is_generic_type_name("List_Generic12"));
        assert!(!is_generic_type_name("Generic"));
        assert!(!is_generic_type_name("GenericX"));
        assert!(!is_generic_type_name("Integer"));
    }

    #[test]
    fn test_innermost() {
        assert_eq!(innermost_type_name("List_List_Real"), "Real");
        assert_eq!(replace_innermost("List_Generic1", "Integer"), "List_Integer");
        assert_eq!(replace_innermost("Generic1", "Text"), "Text");
        assert_eq!(item_type_name("List_Text"), Some("Text"));
    }

    #[test]
    fn test_types_compatible() {
        assert!(types_compatible("Integer", "Integer"));
        assert!(types_compatible("Generic1", "Integer"));
        assert!(types_compatible("List_Integer", "List_Generic1"));
        assert!(!types_compatible("List_Generic1", "Integer"));
        assert!(!types_compatible("Real", "Integer"));
    }

    #[test]
    fn test_sort_generic_names() {
        let mut names = vec![
            "Generic10".to_string(),
            "Generic2".to_string(),
            "List_Generic1".to_string(),
        ];
        sort_generic_type_names(&mut names);
        assert_eq!(names, ["List_Generic1", "Generic2", "Generic10"]);
    }

    #[test]
    fn test_compatibility() {
        let any = GenericType::new("Generic1");
        assert!(any.accepts("Text"));
        let list = GenericType::new("List_Generic1");
        assert_eq!(list.compatibility(), Compatibility::AnyListType);
        assert!(!list.accepts("Text"));
        let limited = GenericType::new("Generic2").with_compatible(["Integer", "Real"]);
        assert!(limited.accepts("Real"));
        assert!(!limited.accepts("Text"));
        assert_eq!(limited.description(), "Generic #2 (can connect to Integer, Real)");
    }
}
