// SPDX-License-Identifier: MIT OR Apache-2.0
//! Re-specialize a generic node of a declaration file.
//!
//! Each command rebinds one node to a differently named class of its family
//! and prints (or writes back) the updated declarations.

use crate::build::load_composition;
use anyhow::{anyhow, Context};
use clap::Args;
use ordoplay_flow_compiler::{
    CompilerSession, Composition, CompositionDecl, Connection, NodeId, SpecializeError,
};
use std::path::{Path, PathBuf};

/// Which declaration file and node to rebind
#[derive(Args)]
pub struct Target {
    /// Declaration file
    pub file: PathBuf,

    /// Node identifier
    pub node: String,

    /// Overwrite the file instead of printing the result
    #[arg(short, long)]
    pub write: bool,
}

/// Bind a placeholder type of a node.
#[derive(Args)]
pub struct SpecializeArgs {
    #[command(flatten)]
    pub target: Target,

    /// Placeholder to bind, e.g. `Generic1`
    pub placeholder: String,

    /// Concrete type, e.g. `Integer`
    pub concrete: String,
}

/// Revert placeholder types of a node to generic.
#[derive(Args)]
pub struct UnspecializeArgs {
    #[command(flatten)]
    pub target: Target,

    /// Placeholders to revert; all when omitted
    pub placeholders: Vec<String>,
}

/// Add or remove item inputs of a list node.
#[derive(Args)]
pub struct ResizeArgs {
    #[command(flatten)]
    pub target: Target,

    /// Number of inputs to add, negative to remove
    #[arg(allow_negative_numbers = true)]
    pub delta: i64,
}

/// Run the specialize command.
pub fn specialize(args: SpecializeArgs, session: &CompilerSession) -> anyhow::Result<()> {
    rebind(&args.target, session, |composition, node| {
        session.specialize_node(composition, node, &args.placeholder, &args.concrete)
    })
}

/// Run the unspecialize command.
pub fn unspecialize(args: UnspecializeArgs, session: &CompilerSession) -> anyhow::Result<()> {
    let placeholders: Vec<&str> = args.placeholders.iter().map(String::as_str).collect();
    rebind(&args.target, session, |composition, node| {
        session.unspecialize_node(composition, node, &placeholders)
    })
}

/// Run the resize command.
pub fn resize(args: ResizeArgs, session: &CompilerSession) -> anyhow::Result<()> {
    rebind(&args.target, session, |composition, node| {
        session.resize_list_node(composition, node, args.delta)
    })
}

fn rebind(
    target: &Target,
    session: &CompilerSession,
    apply: impl FnOnce(&mut Composition, NodeId) -> Result<Vec<Connection>, SpecializeError>,
) -> anyhow::Result<()> {
    let mut composition = load_composition(session, &target.file)
        .with_context(|| format!("Failed to load {}", target.file.display()))?;
    let node = composition
        .node_by_identifier(&target.node)
        .map(|n| n.id)
        .ok_or_else(|| anyhow!("No node {} in {}", target.node, target.file.display()))?;

    let dropped = apply(&mut composition, node)?;
    if let Some(class) = composition.node(node).map(|n| n.class.name.clone()) {
        tracing::info!("Node {} is now {class}", target.node);
    }
    if !dropped.is_empty() {
        eprintln!("Dropped {} cable(s) that no longer fit", dropped.len());
    }

    let text = CompositionDecl::from_composition(&composition).to_text();
    write_or_print(&target.file, target.write, &text)
}

fn write_or_print(path: &Path, write: bool, text: &str) -> anyhow::Result<()> {
    if write {
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        print!("{text}");
    }
    Ok(())
}
