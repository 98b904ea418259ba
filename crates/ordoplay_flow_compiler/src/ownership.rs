// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reference-counting code generation.
//!
//! Every code path that puts a value into a port slot goes through
//! [`emit_replace`]. The old value is released only after the new one has been
//! retained, so storing the value a slot already holds never frees it.

use crate::ir::{FunctionBuilder, Operand};
use crate::port::SlotAccessor;

/// Replace the value held by a slot.
///
/// Emits, in this order: load the old value, retain the new value, store the
/// new value, release the old value.
pub fn emit_replace(b: &mut FunctionBuilder, slot: &SlotAccessor, value: impl Into<Operand>) {
    let value = value.into();
    let old = slot.load(b);
    b.retain(value.clone());
    slot.store(b, value);
    b.release(old);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::eval::{Machine, Value};
    use crate::ir::Instr;
    use crate::port::{slot_accessor, ContextLayout, Port, PortClass};
    use std::sync::Arc;

    fn text_slot() -> (ContextLayout, SlotAccessor) {
        let port = Port::new(Arc::new(PortClass::input_data("text", "Text")), "Show", 0);
        let layout = ContextLayout::new("Show", [&port]);
        let accessor = slot_accessor(&port, &layout).unwrap();
        (layout, accessor)
    }

    #[test]
    fn test_replace_order() {
        let (_, slot) = text_slot();
        let mut b = FunctionBuilder::new("f");
        let v = b.param("v");
        emit_replace(&mut b, &slot, v);
        let body = b.ret().body;
        assert!(matches!(body[0], Instr::LoadData { .. }));
        assert!(matches!(body[1], Instr::Retain { .. }));
        assert!(matches!(body[2], Instr::StoreData { .. }));
        assert!(matches!(body[3], Instr::Release { .. }));
    }

    #[test]
    fn test_replace_with_same_value_keeps_it_alive() {
        let (layout, slot) = text_slot();
        let mut b = FunctionBuilder::new("f");
        let v = b.param("v");
        emit_replace(&mut b, &slot, v);
        let function = b.ret();

        let mut machine = Machine::default();
        machine.allocate_context(&layout);
        let text = machine.heap_mut().text("hi").unwrap();
        machine.run(&function, &[text.clone()]).unwrap();
        machine.run(&function, &[text.clone()]).unwrap();

        let r = text.heap_ref().unwrap();
        assert!(machine.heap().is_live(r));
        assert_eq!(machine.heap().refcount(r), Some(1));
        assert_eq!(machine.slot(slot.addr()).unwrap().data, Value::Ref(r));
    }
}
