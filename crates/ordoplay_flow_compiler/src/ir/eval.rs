// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reference evaluator for generated IR.
//!
//! The evaluator exists to check generated code: it executes functions against
//! per-node port contexts and a reference-counted [`ValueHeap`] that reports
//! use of a freed value as an error instead of corrupting memory.

use super::{Function, Instr, Operand, Reg, SlotAddr};
use crate::port::ContextLayout;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Handle to a heap-allocated value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRef(u32);

/// A runtime value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value
    #[default]
    Void,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Real number
    Real(f64),
    /// Reference-counted heap value
    Ref(ValueRef),
}

impl Value {
    /// The heap reference carried by this value, if any
    pub fn heap_ref(&self) -> Option<ValueRef> {
        match self {
            Self::Ref(r) => Some(*r),
            _ => None,
        }
    }
}

/// One list element: one or two machine words
pub type Item = Vec<Value>;

/// Object stored on the heap
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    /// Text
    Text(String),
    /// List of items
    List(Vec<Item>),
}

#[derive(Debug)]
struct Cell {
    object: HeapObject,
    refcount: u32,
}

/// Heap errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// The value was already freed
    #[error("Value {0:?} used after it was freed")]
    UseAfterFree(ValueRef),

    /// Released with a reference count of zero
    #[error("Value {0:?} released more often than it was retained")]
    OverRelease(ValueRef),

    /// Expected a list
    #[error("Value {0:?} is not a list")]
    NotAList(ValueRef),

    /// Every handle is in use
    #[error("Value heap is full")]
    Exhausted,
}

/// Reference-counted value heap.
///
/// New values start with a count of zero: whoever stores a value first takes
/// ownership by retaining it. A release that brings the count to zero frees the
/// value and releases every value it holds.
#[derive(Debug, Default)]
pub struct ValueHeap {
    cells: Vec<Option<Cell>>,
    freed: usize,
}

impl ValueHeap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object with a reference count of zero
    pub fn alloc(&mut self, object: HeapObject) -> Result<ValueRef, HeapError> {
        let r = next_ref(self.cells.len())?;
        self.cells.push(Some(Cell { object, refcount: 0 }));
        Ok(r)
    }

    /// Allocate a text value
    pub fn text(&mut self, text: impl Into<String>) -> Result<Value, HeapError> {
        self.alloc(HeapObject::Text(text.into())).map(Value::Ref)
    }

    /// Allocate an empty list
    pub fn list(&mut self) -> Result<Value, HeapError> {
        self.alloc(HeapObject::List(Vec::new())).map(Value::Ref)
    }

    fn cell(&self, r: ValueRef) -> Result<&Cell, HeapError> {
        self.cells
            .get(r.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(HeapError::UseAfterFree(r))
    }

    fn cell_mut(&mut self, r: ValueRef) -> Result<&mut Cell, HeapError> {
        self.cells
            .get_mut(r.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(HeapError::UseAfterFree(r))
    }

    /// Increment the count of a heap value. Scalars are ignored.
    pub fn retain(&mut self, value: &Value) -> Result<(), HeapError> {
        if let Some(r) = value.heap_ref() {
            self.cell_mut(r)?.refcount += 1;
        }
        Ok(())
    }

    /// Decrement the count of a heap value, freeing it at zero. Scalars are ignored.
    pub fn release(&mut self, value: &Value) -> Result<(), HeapError> {
        let Some(first) = value.heap_ref() else {
            return Ok(());
        };
        let mut pending = vec![first];
        while let Some(r) = pending.pop() {
            let cell = self.cell_mut(r)?;
            if cell.refcount == 0 {
                return Err(HeapError::OverRelease(r));
            }
            cell.refcount -= 1;
            if cell.refcount > 0 {
                continue;
            }
            if let Some(Cell { object, .. }) = self.cells[r.0 as usize].take() {
                self.freed += 1;
                if let HeapObject::List(items) = object {
                    pending.extend(items.iter().flatten().filter_map(Value::heap_ref));
                }
            }
        }
        Ok(())
    }

    /// Move a value out of its holder without touching its count.
    ///
    /// The holder is left empty; the caller now owns the reference the holder had.
    pub fn transfer(&mut self, holder: &mut Value) -> Result<Value, HeapError> {
        if let Some(r) = holder.heap_ref() {
            self.cell(r)?;
        }
        Ok(std::mem::take(holder))
    }

    /// Current count of a live value
    pub fn refcount(&self, r: ValueRef) -> Option<u32> {
        self.cell(r).ok().map(|cell| cell.refcount)
    }

    /// Whether the value has not been freed
    pub fn is_live(&self, r: ValueRef) -> bool {
        self.cell(r).is_ok()
    }

    /// Borrow a live object
    pub fn get(&self, r: ValueRef) -> Result<&HeapObject, HeapError> {
        self.cell(r).map(|cell| &cell.object)
    }

    /// Append an item to a list, retaining every heap value in it
    pub fn push_item(&mut self, list: ValueRef, item: Item) -> Result<(), HeapError> {
        for word in &item {
            self.retain(word)?;
        }
        match &mut self.cell_mut(list)?.object {
            HeapObject::List(items) => {
                items.push(item);
                Ok(())
            }
            HeapObject::Text(_) => Err(HeapError::NotAList(list)),
        }
    }

    /// Items of a list
    pub fn list_items(&self, list: ValueRef) -> Result<&[Item], HeapError> {
        match self.get(list)? {
            HeapObject::List(items) => Ok(items),
            HeapObject::Text(_) => Err(HeapError::NotAList(list)),
        }
    }

    /// Number of values freed so far
    pub fn freed_count(&self) -> usize {
        self.freed
    }
}

// Handles are never reused, so the cell count bounds the next handle
fn next_ref(cells: usize) -> Result<ValueRef, HeapError> {
    u32::try_from(cells).map(ValueRef).map_err(|_| HeapError::Exhausted)
}

/// Evaluation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Heap misuse
    #[error(transparent)]
    Heap(#[from] HeapError),

    /// Call to a function with no native implementation
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Slot access into a context that was never allocated
    #[error("Unknown port context: {0}")]
    UnknownContext(String),

    /// Slot index past the end of its context
    #[error("Slot {index} out of range in context {context}")]
    SlotOutOfRange {
        /// Context name
        context: String,
        /// Requested index
        index: usize,
    },

    /// Register read before any instruction wrote it
    #[error("Register {0} read before it was written")]
    UndefinedRegister(Reg),

    /// Wrong number of arguments
    #[error("Expected {expected} arguments, got {actual}")]
    ArgumentCount {
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// Operand of the wrong kind
    #[error("Type mismatch: expected {0}")]
    TypeMismatch(&'static str),
}

impl EvalError {
    /// Shorthand for the use-after-free case
    pub fn is_use_after_free(&self) -> bool {
        matches!(self, Self::Heap(HeapError::UseAfterFree(_)))
    }
}

/// Native implementation of a declared function
pub type NativeFn = fn(&mut ValueHeap, &[Value]) -> Result<Value, EvalError>;

/// Native implementations keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct NativeTable {
    functions: HashMap<String, NativeFn>,
}

impl NativeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native implementation
    pub fn insert(&mut self, symbol: impl Into<String>, function: NativeFn) {
        self.functions.insert(symbol.into(), function);
    }

    /// Look up a native implementation
    pub fn get(&self, symbol: &str) -> Option<NativeFn> {
        self.functions.get(symbol).copied()
    }

    /// Number of registered natives
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// State of one port slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlotState {
    /// Event flag
    pub event: bool,
    /// Data value, `Void` for event-only ports
    pub data: Value,
}

/// Values handed out through named outputs
pub type Outputs = IndexMap<String, Value>;

/// Executes IR functions
#[derive(Debug, Default)]
pub struct Machine {
    heap: ValueHeap,
    contexts: HashMap<String, Vec<SlotState>>,
    natives: NativeTable,
}

impl Machine {
    /// Create a machine with the given native functions
    pub fn new(natives: NativeTable) -> Self {
        Self {
            heap: ValueHeap::new(),
            contexts: HashMap::new(),
            natives,
        }
    }

    /// The value heap
    pub fn heap(&self) -> &ValueHeap {
        &self.heap
    }

    /// The value heap, mutably
    pub fn heap_mut(&mut self) -> &mut ValueHeap {
        &mut self.heap
    }

    /// Allocate a zeroed port context for a node
    pub fn allocate_context(&mut self, layout: &ContextLayout) {
        self.contexts
            .insert(layout.node().to_string(), vec![SlotState::default(); layout.len()]);
    }

    /// Read a slot
    pub fn slot(&self, addr: &SlotAddr) -> Result<&SlotState, EvalError> {
        let context = self
            .contexts
            .get(&addr.context)
            .ok_or_else(|| EvalError::UnknownContext(addr.context.clone()))?;
        context.get(addr.index).ok_or_else(|| EvalError::SlotOutOfRange {
            context: addr.context.clone(),
            index: addr.index,
        })
    }

    /// Write access to a slot
    pub fn slot_mut(&mut self, addr: &SlotAddr) -> Result<&mut SlotState, EvalError> {
        let context = self
            .contexts
            .get_mut(&addr.context)
            .ok_or_else(|| EvalError::UnknownContext(addr.context.clone()))?;
        context.get_mut(addr.index).ok_or_else(|| EvalError::SlotOutOfRange {
            context: addr.context.clone(),
            index: addr.index,
        })
    }

    /// Run a function and collect the values it stored to outputs
    pub fn run(&mut self, function: &Function, args: &[Value]) -> Result<Outputs, EvalError> {
        if args.len() != function.params.len() {
            return Err(EvalError::ArgumentCount {
                expected: function.params.len(),
                actual: args.len(),
            });
        }

        let mut regs: HashMap<Reg, Value> = function
            .params
            .iter()
            .map(|p| p.reg)
            .zip(args.iter().cloned())
            .collect();
        let mut outputs = Outputs::new();

        for instr in &function.body {
            match instr {
                Instr::LoadEvent { dst, slot } => {
                    let event = self.slot(slot)?.event;
                    regs.insert(*dst, Value::Bool(event));
                }
                Instr::StoreEvent { slot, value } => {
                    let event = as_bool(&operand(&regs, value)?)?;
                    self.slot_mut(slot)?.event = event;
                }
                Instr::LoadData { dst, slot } => {
                    let data = self.slot(slot)?.data.clone();
                    regs.insert(*dst, data);
                }
                Instr::StoreData { slot, value } => {
                    let data = operand(&regs, value)?;
                    self.slot_mut(slot)?.data = data;
                }
                Instr::Retain { value } => self.heap.retain(&operand(&regs, value)?)?,
                Instr::Release { value } => self.heap.release(&operand(&regs, value)?)?,
                Instr::Or { dst, lhs, rhs } => {
                    let v = as_bool(&operand(&regs, lhs)?)? || as_bool(&operand(&regs, rhs)?)?;
                    regs.insert(*dst, Value::Bool(v));
                }
                Instr::And { dst, lhs, rhs } => {
                    let v = as_bool(&operand(&regs, lhs)?)? && as_bool(&operand(&regs, rhs)?)?;
                    regs.insert(*dst, Value::Bool(v));
                }
                Instr::Not { dst, value } => {
                    let v = !as_bool(&operand(&regs, value)?)?;
                    regs.insert(*dst, Value::Bool(v));
                }
                Instr::Call { dst, callee, args } => {
                    let native = self
                        .natives
                        .get(callee)
                        .ok_or_else(|| EvalError::UnknownFunction(callee.clone()))?;
                    let values = args
                        .iter()
                        .map(|arg| operand(&regs, arg))
                        .collect::<Result<Vec<_>, _>>()?;
                    let result = native(&mut self.heap, &values)?;
                    if let Some(dst) = dst {
                        regs.insert(*dst, result);
                    }
                }
                Instr::StoreOutput { name, value } => {
                    outputs.insert(name.clone(), operand(&regs, value)?);
                }
                Instr::Return => break,
            }
        }

        Ok(outputs)
    }
}

fn operand(regs: &HashMap<Reg, Value>, operand: &Operand) -> Result<Value, EvalError> {
    match operand {
        Operand::Reg(reg) => regs.get(reg).cloned().ok_or(EvalError::UndefinedRegister(*reg)),
        Operand::Bool(v) => Ok(Value::Bool(*v)),
        Operand::Int(v) => Ok(Value::Int(*v)),
    }
}

fn as_bool(value: &Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(v) => Ok(*v),
        _ => Err(EvalError::TypeMismatch("boolean")),
    }
}

/// Native for `ListCreate_<T>`: a fresh, unowned, empty list
pub fn native_list_create(heap: &mut ValueHeap, _args: &[Value]) -> Result<Value, EvalError> {
    Ok(heap.list()?)
}

/// Native for `ListAppendValue_<T>`: the list followed by the item's words
pub fn native_list_append(heap: &mut ValueHeap, args: &[Value]) -> Result<Value, EvalError> {
    let Some((list, item)) = args.split_first() else {
        return Err(EvalError::ArgumentCount { expected: 2, actual: 0 });
    };
    let list = list.heap_ref().ok_or(EvalError::TypeMismatch("list"))?;
    heap.push_item(list, item.to_vec())?;
    Ok(Value::Void)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    #[test]
    fn test_new_values_start_unowned() {
        let mut heap = ValueHeap::new();
        let text = heap.text("hello").unwrap();
        let r = text.heap_ref().unwrap();
        assert_eq!(heap.refcount(r), Some(0));
        heap.retain(&text).unwrap();
        assert_eq!(heap.refcount(r), Some(1));
        heap.release(&text).unwrap();
        assert!(!heap.is_live(r));
        assert_eq!(heap.release(&text), Err(HeapError::UseAfterFree(r)));
    }

    #[test]
    fn test_release_frees_list_elements() {
        let mut heap = ValueHeap::new();
        let text = heap.text("a").unwrap();
        let list = heap.list().unwrap();
        let list_ref = list.heap_ref().unwrap();
        heap.push_item(list_ref, vec![text.clone()]).unwrap();
        heap.retain(&list).unwrap();
        heap.release(&list).unwrap();
        assert!(!heap.is_live(text.heap_ref().unwrap()));
        assert_eq!(heap.freed_count(), 2);
    }

    #[test]
    fn test_over_release_is_reported() {
        let mut heap = ValueHeap::new();
        let text = heap.text("a").unwrap();
        let r = text.heap_ref().unwrap();
        assert_eq!(heap.release(&text), Err(HeapError::OverRelease(r)));
    }

    #[test]
    fn test_transfer_keeps_count() {
        let mut heap = ValueHeap::new();
        let mut holder = heap.text("a").unwrap();
        heap.retain(&holder).unwrap();
        let moved = heap.transfer(&mut holder).unwrap();
        assert_eq!(holder, Value::Void);
        assert_eq!(heap.refcount(moved.heap_ref().unwrap()), Some(1));
    }

    #[test]
    fn test_handles_past_u32_are_refused() {
        assert_eq!(next_ref(7), Ok(ValueRef(7)));
        assert_eq!(next_ref(u32::MAX as usize), Ok(ValueRef(u32::MAX)));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(next_ref(u32::MAX as usize + 1), Err(HeapError::Exhausted));
    }

    #[test]
    fn test_run_boolean_logic() {
        let mut b = FunctionBuilder::new("f");
        let x = b.param("x");
        let y = b.not(x);
        let z = b.and(y, true);
        b.store_output("z", z);
        let function = b.ret();

        let mut machine = Machine::default();
        let outputs = machine.run(&function, &[Value::Bool(false)]).unwrap();
        assert_eq!(outputs.get("z"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_unknown_function() {
        let mut b = FunctionBuilder::new("f");
        b.call_void("missing", vec![]);
        let function = b.ret();
        let mut machine = Machine::default();
        assert!(matches!(
            machine.run(&function, &[]),
            Err(EvalError::UnknownFunction(_))
        ));
    }
}
