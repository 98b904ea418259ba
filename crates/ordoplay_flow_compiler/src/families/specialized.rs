// SPDX-License-Identifier: MIT OR Apache-2.0
//! Specialized node classes: a generic class with its placeholders bound.
//!
//! A generic class named `<prefix>.<placeholder>...` (for example
//! `flow.hold.Generic1`) is the template of a family whose members bind each
//! placeholder, such as `flow.hold.Integer`. Members copy the template and
//! substitute the innermost type of every port that uses a placeholder, so a
//! `List_Generic1` port becomes `List_Integer`.

use super::{NodeClassFamily, SynthesisContext, SynthesisError};
use crate::generic::{
    innermost_type_name, is_generic_type_name, replace_innermost, sort_generic_type_names,
};
use crate::node_class::{Implementation, NodeClass};
use crate::port::{PortClass, PortKind};
use crate::specialization::FamilySignature;
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// Synthesizes the specializations of one generic class
#[derive(Debug, Clone)]
pub struct SpecializedFamily {
    signature: FamilySignature,
    template: Arc<NodeClass>,
}

impl SpecializedFamily {
    /// Family for a generic class.
    ///
    /// Returns `None` when the class binds no placeholder, or when its name
    /// does not end with its placeholders in order.
    pub fn from_template(template: Arc<NodeClass>) -> Option<Self> {
        if template.specialization.is_empty() || template.is_fully_specialized() {
            return None;
        }
        let mut placeholders: Vec<String> = template.specialization.keys().cloned().collect();
        sort_generic_type_names(&mut placeholders);

        let suffix = format!(".{}", placeholders.join("."));
        let prefix = template.name.strip_suffix(suffix.as_str())?;
        let signature = placeholders
            .iter()
            .fold(FamilySignature::new(prefix), |sig, p| sig.with_type(p.as_str()));
        Some(Self {
            signature,
            template,
        })
    }

    /// The generic class members are built from
    pub fn template(&self) -> &Arc<NodeClass> {
        &self.template
    }
}

fn bind_port(port: &Arc<PortClass>, bindings: &IndexMap<String, String>) -> Arc<PortClass> {
    let Some(data_type) = port.data_type() else {
        return Arc::clone(port);
    };
    match bindings.get(innermost_type_name(data_type)) {
        Some(bound) => Arc::new(PortClass {
            kind: PortKind::EventData {
                data_type: replace_innermost(data_type, bound),
            },
            ..PortClass::clone(port)
        }),
        None => Arc::clone(port),
    }
}

impl NodeClassFamily for SpecializedFamily {
    fn signature(&self) -> &FamilySignature {
        &self.signature
    }

    fn synthesize(&self, name: &str, cx: &SynthesisContext<'_>) -> Result<NodeClass, SynthesisError> {
        let params = self.signature.parse_name(name)?;
        let bindings = self.signature.specialization_map(&params);
        for (placeholder, bound) in &bindings {
            let accepted = is_generic_type_name(bound)
                || self.template.generic_type(placeholder).accepts(bound);
            if !accepted {
                return Err(SynthesisError::IncompatibleType {
                    placeholder: placeholder.clone(),
                    concrete: bound.clone(),
                });
            }
        }

        let mut class = NodeClass::clone(&self.template);
        class.name = name.to_string();
        class.inputs = class.inputs.iter().map(|p| bind_port(p, &bindings)).collect();
        class.outputs = class.outputs.iter().map(|p| bind_port(p, &bindings)).collect();
        class.specialization = bindings;
        class.dependencies = IndexSet::new();

        if !FamilySignature::is_fully_specialized(&params) {
            class.implementation = Implementation::Shell;
            return Ok(class);
        }

        let data_types: IndexSet<&str> = class
            .inputs
            .iter()
            .chain(&class.outputs)
            .filter_map(|p| p.data_type())
            .collect();
        let mut units = Vec::with_capacity(data_types.len());
        for data_type in data_types {
            let descriptor = cx
                .types
                .get(data_type)
                .ok_or_else(|| SynthesisError::UnresolvableType(data_type.to_string()))?;
            units.push(descriptor.unit.clone());
        }

        let unit = format!("node.{name}");
        class.dependencies.insert(unit.clone());
        class.dependencies.extend(units);
        class.implementation = Implementation::Linked(unit);
        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generic::GenericType;
    use crate::ir::IrBackend;
    use crate::port::EventBlocking;
    use crate::types::TypeRegistry;

    fn count_items() -> Arc<NodeClass> {
        Arc::new(
            NodeClass::new("list.count.Generic1", "Count Items")
                .with_specialization("Generic1", "Generic1")
                .with_port(
                    PortClass::input_data("list", "List_Generic1")
                        .with_blocking(EventBlocking::Door),
                )
                .with_port(PortClass::output_data("itemCount", "Integer")),
        )
    }

    fn synthesize(family: &SpecializedFamily, name: &str) -> Result<NodeClass, SynthesisError> {
        let types = TypeRegistry::with_builtin_types();
        let backend = IrBackend::new();
        let cx = SynthesisContext {
            types: &types,
            backend: &backend,
        };
        family.synthesize(name, &cx)
    }

    #[test]
    fn test_template_naming() {
        let family = SpecializedFamily::from_template(count_items()).unwrap();
        assert_eq!(family.signature().prefix(), "list.count");
        assert!(family.is_member("list.count.Real"));

        let misnamed = NodeClass::new("list.count", "X").with_specialization("Generic1", "Generic1");
        assert!(SpecializedFamily::from_template(Arc::new(misnamed)).is_none());
        let concrete =
            NodeClass::new("list.count.Integer", "X").with_specialization("Generic1", "Integer");
        assert!(SpecializedFamily::from_template(Arc::new(concrete)).is_none());
    }

    #[test]
    fn test_binding_keeps_list_nesting() {
        let family = SpecializedFamily::from_template(count_items()).unwrap();
        let class = synthesize(&family, "list.count.Text").unwrap();
        let list = class.input("list").unwrap();
        assert_eq!(list.data_type(), Some("List_Text"));
        assert_eq!(list.blocking, EventBlocking::Door);
        assert_eq!(class.output("itemCount").unwrap().data_type(), Some("Integer"));
        assert_eq!(class.specialization["Generic1"], "Text");
        assert_eq!(
            class.implementation,
            Implementation::Linked("node.list.count.Text".to_string())
        );
        let deps: Vec<&str> = class.dependencies.iter().map(String::as_str).collect();
        assert_eq!(deps, ["node.list.count.Text", "type.List_Text", "type.Integer"]);
    }

    #[test]
    fn test_generic_member_is_a_shell() {
        let family = SpecializedFamily::from_template(count_items()).unwrap();
        let class = synthesize(&family, "list.count.Generic2").unwrap();
        assert_eq!(class.input("list").unwrap().data_type(), Some("List_Generic2"));
        assert!(!class.has_body());
        assert!(class.dependencies.is_empty());
    }

    #[test]
    fn test_rejected_bindings() {
        let family = SpecializedFamily::from_template(count_items()).unwrap();
        assert_eq!(
            synthesize(&family, "list.count.Nope").unwrap_err(),
            SynthesisError::UnresolvableType("List_Nope".to_string())
        );

        let add = Arc::new(
            NodeClass::new("math.add.Generic1", "Add")
                .with_specialization("Generic1", "Generic1")
                .with_constraint(GenericType::new("Generic1").with_compatible(["Integer", "Real"]))
                .with_port(PortClass::input_data("a", "Generic1")),
        );
        let family = SpecializedFamily::from_template(add).unwrap();
        assert!(synthesize(&family, "math.add.Real").is_ok());
        assert_eq!(
            synthesize(&family, "math.add.Text").unwrap_err(),
            SynthesisError::IncompatibleType {
                placeholder: "Generic1".to_string(),
                concrete: "Text".to_string(),
            }
        );
    }
}
