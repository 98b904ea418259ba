// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compile one declaration file.

use crate::build::compile_file;
use anyhow::Context;
use clap::Args;
use ordoplay_flow_compiler::CompilerSession;
use std::path::PathBuf;

/// Compile a `.flow` declaration file to IR text.
#[derive(Args)]
pub struct CompileArgs {
    /// Declaration file
    pub file: PathBuf,

    /// Write the IR here instead of standard output
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Run the compile command.
pub fn run(args: CompileArgs, session: &CompilerSession) -> anyhow::Result<()> {
    let module = compile_file(session, &args.file)
        .with_context(|| format!("Failed to compile {}", args.file.display()))?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, module.to_string())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(
                "Wrote {} ({} functions)",
                path.display(),
                module.functions.len()
            );
        }
        None => print!("{module}"),
    }
    Ok(())
}
