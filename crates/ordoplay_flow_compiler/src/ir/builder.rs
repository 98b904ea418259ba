// SPDX-License-Identifier: MIT OR Apache-2.0
//! Function and module builders.

use super::backend::BackendState;
use super::{Function, Instr, Module, Operand, Param, Reg, Signature, SlotAddr};
use indexmap::{IndexMap, IndexSet};

/// Appends instructions to one function, handing out fresh registers
#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    params: Vec<Param>,
    body: Vec<Instr>,
    next_reg: u32,
}

impl FunctionBuilder {
    /// Start a new function
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            body: Vec::new(),
            next_reg: 0,
        }
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a parameter and return the register it is bound to
    pub fn param(&mut self, name: impl Into<String>) -> Reg {
        let reg = self.fresh();
        self.params.push(Param { name: name.into(), reg });
        reg
    }

    /// Allocate a register that no instruction has written yet
    pub fn fresh(&mut self) -> Reg {
        let reg = Reg(self.next_reg);
        self.next_reg += 1;
        reg
    }

    /// Instructions emitted so far
    pub fn instructions(&self) -> &[Instr] {
        &self.body
    }

    /// Load a slot's event flag
    pub fn load_event(&mut self, slot: &SlotAddr) -> Reg {
        let dst = self.fresh();
        self.body.push(Instr::LoadEvent { dst, slot: slot.clone() });
        dst
    }

    /// Store a slot's event flag
    pub fn store_event(&mut self, slot: &SlotAddr, value: impl Into<Operand>) {
        self.body.push(Instr::StoreEvent {
            slot: slot.clone(),
            value: value.into(),
        });
    }

    /// Load a slot's data value
    pub fn load_data(&mut self, slot: &SlotAddr) -> Reg {
        let dst = self.fresh();
        self.body.push(Instr::LoadData { dst, slot: slot.clone() });
        dst
    }

    /// Store a slot's data value
    pub fn store_data(&mut self, slot: &SlotAddr, value: impl Into<Operand>) {
        self.body.push(Instr::StoreData {
            slot: slot.clone(),
            value: value.into(),
        });
    }

    /// Retain a value
    pub fn retain(&mut self, value: impl Into<Operand>) {
        self.body.push(Instr::Retain { value: value.into() });
    }

    /// Release a value
    pub fn release(&mut self, value: impl Into<Operand>) {
        self.body.push(Instr::Release { value: value.into() });
    }

    /// Boolean or
    pub fn or(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Reg {
        let dst = self.fresh();
        self.body.push(Instr::Or {
            dst,
            lhs: lhs.into(),
            rhs: rhs.into(),
        });
        dst
    }

    /// Boolean and
    pub fn and(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Reg {
        let dst = self.fresh();
        self.body.push(Instr::And {
            dst,
            lhs: lhs.into(),
            rhs: rhs.into(),
        });
        dst
    }

    /// Boolean not
    pub fn not(&mut self, value: impl Into<Operand>) -> Reg {
        let dst = self.fresh();
        self.body.push(Instr::Not { dst, value: value.into() });
        dst
    }

    /// Call a function that returns a value
    pub fn call(&mut self, callee: impl Into<String>, args: Vec<Operand>) -> Reg {
        let dst = self.fresh();
        self.body.push(Instr::Call {
            dst: Some(dst),
            callee: callee.into(),
            args,
        });
        dst
    }

    /// Call a function for its side effects
    pub fn call_void(&mut self, callee: impl Into<String>, args: Vec<Operand>) {
        self.body.push(Instr::Call {
            dst: None,
            callee: callee.into(),
            args,
        });
    }

    /// Hand a value to the caller through a named output
    pub fn store_output(&mut self, name: impl Into<String>, value: impl Into<Operand>) {
        self.body.push(Instr::StoreOutput {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Terminate the function with a return and finish it
    pub fn ret(mut self) -> Function {
        self.body.push(Instr::Return);
        Function {
            name: self.name,
            params: self.params,
            body: self.body,
        }
    }
}

/// Assembles one module while the backend is held exclusively.
///
/// A `ModuleBuilder` can only be obtained from a [`BackendGuard`](super::BackendGuard)
/// and borrows it, so nothing can be emitted once the guard is dropped.
#[derive(Debug)]
pub struct ModuleBuilder<'g> {
    state: &'g mut BackendState,
    module: Module,
}

impl<'g> ModuleBuilder<'g> {
    pub(crate) fn new(state: &'g mut BackendState, name: impl Into<String>) -> Self {
        Self {
            state,
            module: Module {
                name: name.into(),
                functions: IndexMap::new(),
                declarations: IndexMap::new(),
                details: serde_json::Value::Null,
                dependencies: IndexSet::new(),
            },
        }
    }

    /// Declare an external function.
    ///
    /// Declaring the same symbol again returns the existing declaration, so
    /// linked helpers can be requested by every caller that needs them.
    pub fn declare(&mut self, name: impl Into<String>, signature: Signature) -> Signature {
        *self.module.declarations.entry(name.into()).or_insert(signature)
    }

    /// Add a finished function, replacing any previous definition of the same name
    pub fn define(&mut self, function: Function) {
        self.module.functions.insert(function.name.clone(), function);
    }

    /// Set the module details
    pub fn set_details(&mut self, details: serde_json::Value) {
        self.module.details = details;
    }

    /// Record a unit the module must be linked with
    pub fn add_dependency(&mut self, unit: impl Into<String>) {
        self.module.dependencies.insert(unit.into());
    }

    /// Finish the module
    pub fn finish(self) -> Module {
        self.state.modules_emitted += 1;
        self.state.functions_emitted += self.module.functions.len() as u64;
        tracing::trace!(
            module = %self.module.name,
            functions = self.module.functions.len(),
            "Emitted module"
        );
        self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrBackend;

    #[test]
    fn test_registers_are_fresh() {
        let mut b = FunctionBuilder::new("f");
        let p = b.param("x");
        let r = b.or(p, false);
        assert_ne!(p, r);
        let function = b.ret();
        assert_eq!(function.params.len(), 1);
        assert_eq!(function.body.last(), Some(&Instr::Return));
    }

    #[test]
    fn test_declare_is_idempotent() {
        let backend = IrBackend::new();
        let mut guard = backend.lock();
        let mut module = guard.module("m");
        let sig = Signature { params: 2, returns_value: false };
        module.declare("ListAppendValue_Integer", sig);
        let again = module.declare(
            "ListAppendValue_Integer",
            Signature { params: 2, returns_value: false },
        );
        assert_eq!(again, sig);
        let module = module.finish();
        assert_eq!(module.declarations.len(), 1);
    }
}
