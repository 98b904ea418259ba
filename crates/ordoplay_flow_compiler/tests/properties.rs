// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based tests for the specialization algebra, event blocking and
//! declaration text.

use ordoplay_flow_compiler::declaration::{CompositionDecl, EdgeDecl, NodeDecl};
use ordoplay_flow_compiler::port::may_transmit;
use ordoplay_flow_compiler::{EventBlocking, FamilySignature, ParamValue, PortClass, TintColor};
use proptest::prelude::*;

fn make_list() -> FamilySignature {
    FamilySignature::new("list.make").with_count().with_type("Generic1")
}

fn type_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,12}"
}

fn concrete_type_name() -> impl Strategy<Value = String> {
    "[A-FH-KM-Z][A-Za-z0-9]{0,12}"
}

fn item_type_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Generic1".to_string()),
        Just("List_Generic1".to_string()),
        type_name(),
    ]
}

fn blocking() -> impl Strategy<Value = EventBlocking> {
    prop_oneof![
        Just(EventBlocking::None),
        Just(EventBlocking::Wall),
        Just(EventBlocking::Door),
    ]
}

fn node_decl() -> impl Strategy<Value = NodeDecl> {
    (
        "N[A-Za-z0-9]{0,8}",
        type_name(),
        "[a-zA-Z0-9 |<>{}\"\\\\\n]{0,20}",
        prop::collection::vec("[a-z][a-zA-Z0-9]{0,6}", 0..4),
        prop::collection::vec("[a-z][a-zA-Z0-9]{0,6}", 0..3),
        (-1000i32..1000, -1000i32..1000),
        prop::option::of(prop_oneof![Just(TintColor::Yellow), Just(TintColor::Cyan)]),
    )
        .prop_map(|(identifier, class, title, inputs, outputs, (x, y), tint)| NodeDecl {
            identifier,
            class_name: format!("node.{class}"),
            title,
            inputs,
            outputs,
            position: [x as f32, y as f32],
            size: [140.0, 60.0],
            tint,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// A name built from parameters parses back to the same parameters.
    #[test]
    fn name_round_trip(count in 0u64..100_000, item in type_name()) {
        let sig = make_list();
        let values = vec![ParamValue::Count(count), ParamValue::Type(item)];
        let name = sig.build_name(&values).unwrap();
        prop_assert_eq!(sig.parse_name(&name).unwrap(), values);
    }

    /// Binding the same placeholder twice gives the same name as binding it once.
    #[test]
    fn substitution_is_idempotent(
        count in 0u64..64,
        item in item_type_name(),
        concrete in concrete_type_name(),
    ) {
        let sig = make_list();
        let values = vec![ParamValue::Count(count), ParamValue::Type(item.clone())];
        let once = sig.substitute_type(&values, "Generic1", &concrete).unwrap();
        let once_values = sig.parse_name(&once).unwrap();
        let twice = sig.substitute_type(&once_values, "Generic1", &concrete).unwrap();
        prop_assert_eq!(&once, &twice);

        // List nesting survives the binding
        let nesting = item.matches("List_").count();
        prop_assert_eq!(once.matches("List_").count(), nesting);
    }

    /// Reverting to generic keeps the item count and restores the placeholder.
    #[test]
    fn revert_keeps_counts(count in 0u64..64, item in type_name()) {
        let sig = make_list();
        let values = vec![ParamValue::Count(count), ParamValue::Type(item)];
        let reverted = sig.revert_to_generic(&values).unwrap();
        prop_assert_eq!(reverted, format!("list.make.{count}.Generic1"));
    }

    /// Resizing never produces a negative count.
    #[test]
    fn resize_saturates(count in 0u64..64, delta in -100i64..100) {
        let sig = make_list();
        let values = vec![ParamValue::Count(count), ParamValue::Type("Integer".to_string())];
        let resized = sig.resize_count(&values, delta).unwrap();
        let expected = count.saturating_add_signed(delta);
        prop_assert_eq!(resized, format!("list.make.{expected}.Integer"));
    }

    /// A bundle may transmit unless every destination is a wall.
    #[test]
    fn blocking_is_conservative(policies in prop::collection::vec(blocking(), 0..6)) {
        let ports: Vec<PortClass> = policies
            .iter()
            .enumerate()
            .map(|(i, b)| PortClass::input_event(format!("in{i}")).with_blocking(*b))
            .collect();
        let expected = policies.iter().any(|b| *b != EventBlocking::Wall);
        prop_assert_eq!(may_transmit(&ports), expected);
    }

    /// Declarations read back to what was written.
    #[test]
    fn declarations_round_trip(nodes in prop::collection::vec(node_decl(), 1..4)) {
        let edges = nodes
            .windows(2)
            .map(|pair| EdgeDecl {
                from_node: pair[0].identifier.clone(),
                from_port: "out".to_string(),
                to_node: pair[1].identifier.clone(),
                to_port: "in".to_string(),
            })
            .collect();
        let decl = CompositionDecl {
            name: "generated".to_string(),
            nodes,
            edges,
        };
        let parsed = CompositionDecl::parse("generated", &decl.to_text()).unwrap();
        prop_assert_eq!(parsed, decl);
    }
}
