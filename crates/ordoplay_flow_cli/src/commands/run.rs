// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluate a generated node class body.

use anyhow::{anyhow, bail};
use clap::Args;
use ordoplay_flow_compiler::ir::eval::{HeapError, HeapObject, Machine, Value, ValueHeap};
use ordoplay_flow_compiler::{CompilerSession, Implementation};

/// Run the event function of a generated node class on the given arguments.
#[derive(Args)]
pub struct RunArgs {
    /// Node class name, e.g. `list.make.3.Integer`
    pub name: String,

    /// Arguments, one per machine word: `true`/`false`, integers, reals or text
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Run the run command.
pub fn run(args: RunArgs, session: &CompilerSession) -> anyhow::Result<()> {
    let class = session
        .resolve_node_class(&args.name)
        .ok_or_else(|| anyhow!("No node class named {}", args.name))?;
    let module = match &class.implementation {
        Implementation::Generated(module) => module,
        Implementation::Linked(unit) => {
            bail!("{} is implemented by {unit} and cannot be evaluated", class.name)
        }
        Implementation::Shell => bail!("{} is still generic and has no body", class.name),
    };
    let function = module
        .event_function()
        .ok_or_else(|| anyhow!("{} has no event function", class.name))?;

    let mut machine = Machine::new(session.types().native_table());
    let values: Vec<Value> = args
        .args
        .iter()
        .map(|arg| parse_value(machine.heap_mut(), arg))
        .collect::<Result<_, _>>()?;
    let outputs = machine.run(function, &values)?;

    for (name, value) in &outputs {
        println!("{name} = {}", format_value(machine.heap(), value));
    }
    Ok(())
}

/// Parse one argument, allocating text on the heap
pub fn parse_value(heap: &mut ValueHeap, arg: &str) -> Result<Value, HeapError> {
    if let Ok(b) = arg.parse::<bool>() {
        Ok(Value::Bool(b))
    } else if let Ok(i) = arg.parse::<i64>() {
        Ok(Value::Int(i))
    } else if let Ok(r) = arg.parse::<f64>() {
        Ok(Value::Real(r))
    } else {
        heap.text(arg)
    }
}

/// Render a value, following heap references
pub fn format_value(heap: &ValueHeap, value: &Value) -> String {
    match value {
        Value::Void => "()".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Ref(r) => match heap.get(*r) {
            Ok(HeapObject::Text(text)) => format!("{text:?}"),
            Ok(HeapObject::List(items)) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|item| match item.as_slice() {
                        [word] => format_value(heap, word),
                        words => {
                            let words: Vec<String> =
                                words.iter().map(|w| format_value(heap, w)).collect();
                            format!("({})", words.join(", "))
                        }
                    })
                    .collect();
                format!("[{}]", items.join(", "))
            }
            Err(e) => format!("<{e}>"),
        },
    }
}
