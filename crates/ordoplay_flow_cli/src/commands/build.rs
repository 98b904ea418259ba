// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compile every declaration file of a project.

use crate::build::{BuildOptions, BuildResult, BuildState, BuildSystem};
use crate::settings::FlowSettings;
use anyhow::bail;
use clap::Args;
use ordoplay_flow_compiler::CompilerSession;
use std::path::PathBuf;

/// Compile all `.flow` files under a directory.
#[derive(Args)]
pub struct BuildArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Output directory (default: `<dir>/build`)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Keep files already in the output directory
    #[arg(long)]
    pub no_clean: bool,

    /// Compile the remaining files after one fails
    #[arg(short, long)]
    pub keep_going: bool,
}

/// Run the build command.
pub fn run(args: BuildArgs, settings: &FlowSettings, session: &CompilerSession) -> anyhow::Result<()> {
    let options = BuildOptions {
        output_dir: args.output.unwrap_or_else(|| args.dir.join("build")),
        source_dir: args.dir,
        clean: !args.no_clean,
        keep_going: args.keep_going,
    };
    let state = BuildState::new();

    match BuildSystem::build(settings, session, &options, &state) {
        BuildResult::Success {
            output_dir,
            build_time_secs,
            files_compiled,
            classes_resolved,
            functions_emitted,
        } => {
            println!(
                "Compiled {files_compiled} files ({classes_resolved} node classes, \
                 {functions_emitted} functions) into {} in {build_time_secs:.2}s",
                output_dir.display()
            );
            Ok(())
        }
        BuildResult::Cancelled => bail!("Build cancelled"),
        BuildResult::Failed(message) => bail!("Build failed:\n{message}"),
    }
}
