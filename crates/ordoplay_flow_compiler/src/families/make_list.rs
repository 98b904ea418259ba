// SPDX-License-Identifier: MIT OR Apache-2.0
//! The make-list family: `list.make.<item-count>.<item-type>`.
//!
//! A member has one data input per item (`1` through `N`) and one output,
//! `list`, holding the items in input order.

use super::{NodeClassFamily, SynthesisContext, SynthesisError};
use crate::generic::{generic_type_name, is_generic_type_name, list_type_name};
use crate::ir::{FunctionBuilder, Module, Operand, Signature, EVENT_FUNCTION};
use crate::node_class::{Implementation, NodeClass};
use crate::port::PortClass;
use crate::specialization::{FamilySignature, ParamValue};
use crate::types::TypeDescriptor;
use std::sync::Arc;

/// Name prefix of the family
pub const MAKE_LIST_PREFIX: &str = "list.make";

/// Name of the output port
pub const LIST_PORT_NAME: &str = "list";

/// Largest item count the family will synthesize
pub const MAX_ITEM_COUNT: u64 = 1024;

const TITLE: &str = "Make List";
const DESCRIPTION: &str = "Creates a list from the given items.";
const VERSION: &str = "1.0.0";

/// Synthesizes `list.make.*` node classes
#[derive(Debug, Clone)]
pub struct MakeListFamily {
    signature: FamilySignature,
}

impl MakeListFamily {
    /// Create the family
    pub fn new() -> Self {
        Self {
            signature: FamilySignature::new(MAKE_LIST_PREFIX)
                .with_count()
                .with_type(generic_type_name(1)),
        }
    }

    /// Class name for an item count and item type
    pub fn class_name(item_count: u64, item_type: &str) -> String {
        format!("{MAKE_LIST_PREFIX}.{item_count}.{item_type}")
    }

    fn base_class(&self, name: &str, item_count: u64, item_type: &str) -> NodeClass {
        let mut class = NodeClass::new(name, TITLE)
            .with_description(DESCRIPTION)
            .with_version(VERSION);
        for i in 1..=item_count {
            class = class.with_port(PortClass::input_data(i.to_string(), item_type));
        }
        let placeholder = self.signature.placeholders().next().unwrap_or_default();
        class
            .with_port(PortClass::output_data(LIST_PORT_NAME, list_type_name(item_type)))
            .with_specialization(placeholder, item_type)
    }

    fn compile(
        &self,
        name: &str,
        item_count: u64,
        item: &TypeDescriptor,
        list: &TypeDescriptor,
        cx: &SynthesisContext<'_>,
    ) -> Result<Module, SynthesisError> {
        let create = item.list_create_symbol();
        let append = item.list_append_symbol();
        for symbol in [&create, &append] {
            if !list.exports(symbol) {
                return Err(SynthesisError::MissingBuildDependency {
                    unit: list.unit.clone(),
                    symbol: symbol.clone(),
                });
            }
        }

        let words = item.shape.words();
        let mut guard = cx.backend.lock();
        let mut module = guard.module(name);
        module.declare(
            create.as_str(),
            Signature {
                params: 0,
                returns_value: true,
            },
        );
        module.declare(
            append.as_str(),
            Signature {
                params: 1 + words,
                returns_value: false,
            },
        );

        let mut f = FunctionBuilder::new(EVENT_FUNCTION);
        let items: Vec<Vec<Operand>> = (1..=item_count)
            .map(|i| {
                let mut regs = vec![Operand::from(f.param(format!("item{i}")))];
                for word in 1..words {
                    regs.push(f.param(format!("item{i}.{word}")).into());
                }
                regs
            })
            .collect();

        let list_reg = f.call(create.as_str(), Vec::new());
        for item_words in items {
            let mut args = Vec::with_capacity(1 + item_words.len());
            args.push(Operand::from(list_reg));
            args.extend(item_words);
            f.call_void(append.as_str(), args);
        }
        f.store_output(LIST_PORT_NAME, list_reg);
        module.define(f.ret());

        module.set_details(serde_json::json!({
            "title": TITLE,
            "description": DESCRIPTION,
            "version": VERSION,
        }));
        module.add_dependency(item.unit.as_str());
        module.add_dependency(list.unit.as_str());
        Ok(module.finish())
    }
}

impl Default for MakeListFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeClassFamily for MakeListFamily {
    fn signature(&self) -> &FamilySignature {
        &self.signature
    }

    fn synthesize(&self, name: &str, cx: &SynthesisContext<'_>) -> Result<NodeClass, SynthesisError> {
        let params = self.signature.parse_name(name)?;
        let (item_count, item_type) = match params.as_slice() {
            [ParamValue::Count(n), ParamValue::Type(t)] if *n <= MAX_ITEM_COUNT => (*n, t.as_str()),
            _ => return Err(SynthesisError::NameNotInFamily(name.to_string())),
        };

        let class = self.base_class(name, item_count, item_type);
        if is_generic_type_name(item_type) {
            return Ok(class.with_implementation(Implementation::Shell));
        }

        let item = cx
            .types
            .get(item_type)
            .ok_or_else(|| SynthesisError::UnresolvableType(item_type.to_string()))?;
        let list = cx
            .types
            .list_type_for(item_type)
            .ok_or_else(|| SynthesisError::UnresolvableType(list_type_name(item_type)))?;

        let module = self.compile(name, item_count, &item, &list, cx)?;
        Ok(class
            .with_dependency(item.unit.as_str())
            .with_dependency(list.unit.as_str())
            .with_implementation(Implementation::Generated(Arc::new(module))))
    }
}
