// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node classes.
//!
//! Leaf classes are not compiled here: their bodies live in precompiled units,
//! so each one is registered with a linked implementation. Generic classes are
//! registered as shells named after their placeholders (`flow.hold.Generic1`);
//! their specializations are provided by
//! [`SpecializedFamily`](crate::families::SpecializedFamily).

use crate::generic::{generic_type_name, list_type_name, GenericType};
use crate::node_class::{Implementation, NodeClass, NodeClassRegistry};
use crate::port::{EventBlocking, PortClass};

fn leaf(name: &str, title: &str) -> NodeClass {
    NodeClass::new(name, title)
        .with_implementation(Implementation::Linked(format!("node.{name}")))
        .with_dependency(format!("node.{name}"))
}

fn generic(prefix: &str, title: &str) -> NodeClass {
    let placeholder = generic_type_name(1);
    NodeClass::new(format!("{prefix}.{placeholder}"), title)
        .with_specialization(placeholder.as_str(), placeholder.as_str())
}

/// Create the built-in node class catalog
pub fn builtin_catalog() -> NodeClassRegistry {
    let mut registry = NodeClassRegistry::new();
    let t = generic_type_name(1);

    // Events
    registry.register(
        leaf("event.fireOnStart", "Fire on Start")
            .with_description("Fires an event when the composition starts")
            .with_port(PortClass::output_event("started")),
    );

    registry.register(
        leaf("event.allowFirst", "Allow First Event")
            .with_description("Lets the first event through and blocks the rest")
            .with_port(PortClass::input_event("event").with_blocking(EventBlocking::Door))
            .with_port(PortClass::input_event("reset").with_blocking(EventBlocking::Wall))
            .with_port(PortClass::output_event("firstEvent")),
    );

    // Flow control
    registry.register(
        generic("flow.hold", "Hold Value")
            .with_description("Stores a value without passing events through")
            .with_port(
                PortClass::input_data("initialValue", &t).with_blocking(EventBlocking::Wall),
            )
            .with_port(PortClass::input_data("newValue", &t).with_blocking(EventBlocking::Wall))
            .with_port(PortClass::output_data("heldValue", &t)),
    );

    registry.register(
        generic("flow.allowChanges", "Allow Changes")
            .with_description("Passes a value only when it differs from the last one")
            .with_port(PortClass::input_data("value", &t).with_blocking(EventBlocking::Door))
            .with_port(PortClass::output_data("changedValue", &t)),
    );

    // Math
    registry.register(
        generic("math.add", "Add")
            .with_description("Adds two numbers")
            .with_constraint(GenericType::new(&t).with_compatible(["Integer", "Real"]))
            .with_port(PortClass::input_data("a", &t))
            .with_port(PortClass::input_data("b", &t))
            .with_port(PortClass::output_data("sum", &t)),
    );

    // Lists
    registry.register(
        generic("list.count", "Count Items")
            .with_description("Outputs the number of items in a list")
            .with_port(PortClass::input_data("list", list_type_name(&t)))
            .with_port(PortClass::output_data("itemCount", "Integer")),
    );

    // Text
    registry.register(
        leaf("text.display", "Display Console Window")
            .with_description("Writes text to a console window")
            .with_port(PortClass::input_data("writeLine", "Text"))
            .with_port(PortClass::output_data("typedLine", "Text")),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaves_are_linked_and_generics_are_shells() {
        let catalog = builtin_catalog();
        assert!(!catalog.is_empty());
        for class in catalog.classes() {
            assert_eq!(class.inputs[0].name, "refresh");
            assert_eq!(class.has_body(), class.is_fully_specialized(), "{}", class.name);
        }
    }

    #[test]
    fn test_hold_walls_its_values() {
        let hold = builtin_catalog().get("flow.hold.Generic1").unwrap();
        assert_eq!(hold.input("newValue").unwrap().blocking, EventBlocking::Wall);
        assert_eq!(hold.input("refresh").unwrap().blocking, EventBlocking::None);
        assert!(hold.input("newValue").unwrap().is_generic());
        assert!(!hold.has_body());
    }

    #[test]
    fn test_add_accepts_numbers_only() {
        let add = builtin_catalog().get("math.add.Generic1").unwrap();
        let generic = add.generic_type("Generic1");
        assert!(generic.accepts("Real"));
        assert!(!generic.accepts("Text"));
        assert_eq!(generic.description(), "Generic #1 (can connect to Integer, Real)");
    }
}
