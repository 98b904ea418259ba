// SPDX-License-Identifier: MIT OR Apache-2.0
//! Intermediate representation emitted by the flow compiler.
//!
//! Functions are straight-line sequences over virtual registers. Dedicated
//! instructions address the two halves of a port slot (the event flag and the
//! data value) so that generated code never needs to know how a port context
//! is laid out in memory. Reference counting is explicit: every retain and
//! release a compiled cable performs shows up as an instruction.

pub mod backend;
pub mod builder;
pub mod eval;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use backend::{BackendGuard, IrBackend};
pub use builder::{FunctionBuilder, ModuleBuilder};

/// Name of the function every compiled node class exposes as its body
pub const EVENT_FUNCTION: &str = "nodeEvent";

/// Virtual register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reg(pub u32);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Value held in a register
    Reg(Reg),
    /// Boolean constant
    Bool(bool),
    /// Integer constant
    Int(i64),
}

impl From<Reg> for Operand {
    fn from(reg: Reg) -> Self {
        Self::Reg(reg)
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => write!(f, "{reg}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
        }
    }
}

/// Address of one port slot inside a node's port context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotAddr {
    /// Identifier of the node owning the context
    pub context: String,
    /// Index of the port within the context
    pub index: usize,
}

impl fmt::Display for SlotAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}[{}]", self.context, self.index)
    }
}

/// A single IR instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    /// Read a slot's event flag
    LoadEvent {
        /// Destination register
        dst: Reg,
        /// Slot to read
        slot: SlotAddr,
    },
    /// Write a slot's event flag
    StoreEvent {
        /// Slot to write
        slot: SlotAddr,
        /// New flag value
        value: Operand,
    },
    /// Read a slot's data value, without touching its reference count
    LoadData {
        /// Destination register
        dst: Reg,
        /// Slot to read
        slot: SlotAddr,
    },
    /// Write a slot's data value, without touching any reference count
    StoreData {
        /// Slot to write
        slot: SlotAddr,
        /// New value
        value: Operand,
    },
    /// Increment a value's reference count
    Retain {
        /// Value to retain
        value: Operand,
    },
    /// Decrement a value's reference count, freeing it at zero
    Release {
        /// Value to release
        value: Operand,
    },
    /// Boolean or
    Or {
        /// Destination register
        dst: Reg,
        /// Left operand
        lhs: Operand,
        /// Right operand
        rhs: Operand,
    },
    /// Boolean and
    And {
        /// Destination register
        dst: Reg,
        /// Left operand
        lhs: Operand,
        /// Right operand
        rhs: Operand,
    },
    /// Boolean not
    Not {
        /// Destination register
        dst: Reg,
        /// Operand
        value: Operand,
    },
    /// Call a declared or defined function
    Call {
        /// Register receiving the result, if the callee returns a value
        dst: Option<Reg>,
        /// Callee symbol
        callee: String,
        /// Arguments in order
        args: Vec<Operand>,
    },
    /// Hand a value to the caller through a named output
    StoreOutput {
        /// Output port name
        name: String,
        /// Value to hand over
        value: Operand,
    },
    /// Return from the function
    Return,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadEvent { dst, slot } => write!(f, "{dst} = load.event {slot}"),
            Self::StoreEvent { slot, value } => write!(f, "store.event {slot}, {value}"),
            Self::LoadData { dst, slot } => write!(f, "{dst} = load.data {slot}"),
            Self::StoreData { slot, value } => write!(f, "store.data {slot}, {value}"),
            Self::Retain { value } => write!(f, "retain {value}"),
            Self::Release { value } => write!(f, "release {value}"),
            Self::Or { dst, lhs, rhs } => write!(f, "{dst} = or {lhs}, {rhs}"),
            Self::And { dst, lhs, rhs } => write!(f, "{dst} = and {lhs}, {rhs}"),
            Self::Not { dst, value } => write!(f, "{dst} = not {value}"),
            Self::Call { dst, callee, args } => {
                if let Some(dst) = dst {
                    write!(f, "{dst} = ")?;
                }
                write!(f, "call @{callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::StoreOutput { name, value } => write!(f, "output {name}, {value}"),
            Self::Return => write!(f, "ret"),
        }
    }
}

/// Named function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name, e.g. `item1` or `item1.1` for the second word of an item
    pub name: String,
    /// Register bound to the parameter on entry
    pub reg: Reg,
}

/// A compiled function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// Symbol name
    pub name: String,
    /// Parameters in call order
    pub params: Vec<Param>,
    /// Instructions
    pub body: Vec<Instr>,
}

impl Function {
    /// Count how many instructions satisfy a predicate
    pub fn count(&self, predicate: impl Fn(&Instr) -> bool) -> usize {
        self.body.iter().filter(|instr| predicate(instr)).count()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define @{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", param.reg, param.name)?;
        }
        writeln!(f, ") {{")?;
        for instr in &self.body {
            writeln!(f, "  {instr}")?;
        }
        writeln!(f, "}}")
    }
}

/// Signature of an external function a module links against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Number of machine-word parameters
    pub params: usize,
    /// Whether the function produces a value
    pub returns_value: bool,
}

/// A compiled module: one node class body, one cable, or a whole composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Functions defined by this module
    pub functions: IndexMap<String, Function>,
    /// External functions this module calls
    pub declarations: IndexMap<String, Signature>,
    /// Module details (title, description, version, ...)
    pub details: serde_json::Value,
    /// Units this module must be linked with
    pub dependencies: IndexSet<String>,
}

impl Module {
    /// Look up a defined function
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// The node body, if this module defines one
    pub fn event_function(&self) -> Option<&Function> {
        self.function(EVENT_FUNCTION)
    }

    /// Whether an external function is declared
    pub fn is_declared(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        if !self.details.is_null() {
            writeln!(f, "; details {}", self.details)?;
        }
        if !self.dependencies.is_empty() {
            let deps: Vec<&str> = self.dependencies.iter().map(String::as_str).collect();
            writeln!(f, "; depends on {}", deps.join(", "))?;
        }
        for (name, signature) in &self.declarations {
            let ret = if signature.returns_value { "value" } else { "void" };
            writeln!(f, "declare @{name}({}) -> {ret}", signature.params)?;
        }
        for function in self.functions.values() {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_rendering() {
        let slot = SlotAddr {
            context: "MakeList1".to_string(),
            index: 2,
        };
        let load = Instr::LoadData { dst: Reg(3), slot: slot.clone() };
        assert_eq!(load.to_string(), "%3 = load.data @MakeList1[2]");

        let store = Instr::StoreEvent { slot, value: true.into() };
        assert_eq!(store.to_string(), "store.event @MakeList1[2], true");

        let call = Instr::Call {
            dst: None,
            callee: "ListAppendValue_Integer".to_string(),
            args: vec![Reg(0).into(), Reg(1).into()],
        };
        assert_eq!(call.to_string(), "call @ListAppendValue_Integer(%0, %1)");
    }

    #[test]
    fn test_function_rendering() {
        let function = Function {
            name: "nodeEvent".to_string(),
            params: vec![Param { name: "item1".to_string(), reg: Reg(0) }],
            body: vec![Instr::Return],
        };
        assert_eq!(function.to_string(), "define @nodeEvent(%0 item1) {\n  ret\n}\n");
        assert_eq!(function.count(|i| matches!(i, Instr::Return)), 1);
    }
}
