// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resolve a node class by name and print it.

use anyhow::anyhow;
use clap::Args;
use ordoplay_flow_compiler::{CompilerSession, EventBlocking, Implementation, NodeClass, PortClass};
use std::fmt::Write as _;

/// Resolve a node class and print its ports and generated code.
#[derive(Args)]
pub struct SynthesizeArgs {
    /// Node class name, e.g. `list.make.3.Integer`
    pub name: String,

    /// Print only the ports, not the generated code
    #[arg(long)]
    pub ports_only: bool,
}

/// Run the synthesize command.
pub fn run(args: SynthesizeArgs, session: &CompilerSession) -> anyhow::Result<()> {
    let class = session
        .resolve_node_class(&args.name)
        .ok_or_else(|| anyhow!("No node class named {}", args.name))?;

    print!("{}", describe_class(&class));
    if !args.ports_only {
        if let Some(module) = class.module() {
            println!();
            print!("{module}");
        }
    }
    Ok(())
}

fn describe_port(port: &PortClass) -> String {
    let mut line = format!("  {}", port.name);
    if let Some(data_type) = port.data_type() {
        let _ = write!(line, ": {data_type}");
    }
    if port.blocking != EventBlocking::None {
        let _ = write!(line, " [{}]", port.blocking.name());
    }
    line
}

/// Human-readable summary of a node class
pub fn describe_class(class: &NodeClass) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Class:       {}", class.name);
    let _ = writeln!(out, "Title:       {}", class.title);
    let _ = writeln!(out, "Version:     {}", class.version);
    let body = match &class.implementation {
        Implementation::Generated(_) => "generated".to_string(),
        Implementation::Linked(unit) => format!("linked ({unit})"),
        Implementation::Shell => "none (generic)".to_string(),
    };
    let _ = writeln!(out, "Body:        {body}");
    for (placeholder, bound) in &class.specialization {
        let _ = writeln!(out, "Binds:       {placeholder} = {bound}");
        if bound == placeholder {
            let _ = writeln!(out, "             {}", class.generic_type(placeholder).description());
        }
    }
    if !class.dependencies.is_empty() {
        let deps: Vec<&str> = class.dependencies.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Depends on:  {}", deps.join(", "));
    }
    let _ = writeln!(out, "Inputs:");
    for port in &class.inputs {
        let _ = writeln!(out, "{}", describe_port(port));
    }
    let _ = writeln!(out, "Outputs:");
    for port in &class.outputs {
        let _ = writeln!(out, "{}", describe_port(port));
    }
    out
}
