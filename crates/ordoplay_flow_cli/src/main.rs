// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` Flow compiler driver.
//!
//! Compiles flow compositions declared in `.flow` files to IR, synthesizes
//! generic node classes on demand, and re-specializes generic nodes.
//!
//! Settings are read from `flow.ron` in the working directory (or the project
//! directory for `build`); see [`settings::FlowSettings`].

mod build;
mod commands;
mod settings;

use anyhow::Context;
use clap::{Parser, Subcommand};
use settings::FlowSettings;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_FILTER: &str = "ordoplay_flow_compiler=info";

#[derive(Parser)]
#[command(name = "ordoplay_flowc")]
#[command(author, version, about = "OrdoPlay Flow compiler", long_about = None)]
struct Cli {
    /// Settings file (default: `flow.ron` in the project directory)
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a node class and print its ports and code
    Synthesize(commands::synthesize::SynthesizeArgs),

    /// Compile a declaration file to IR
    Compile(commands::compile::CompileArgs),

    /// Compile every declaration file of a project
    Build(commands::build::BuildArgs),

    /// Evaluate a generated node class
    Run(commands::run::RunArgs),

    /// Bind a placeholder type of a generic node
    Specialize(commands::rename::SpecializeArgs),

    /// Revert placeholder types of a node to generic
    Unspecialize(commands::rename::UnspecializeArgs),

    /// Add or remove item inputs of a list node
    Resize(commands::rename::ResizeArgs),

    /// List registered types
    Types(commands::types::TypesArgs),
}

fn load_settings(cli: &Cli) -> anyhow::Result<FlowSettings> {
    if let Some(path) = &cli.settings {
        return FlowSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()));
    }
    let dir = match &cli.command {
        Commands::Build(args) => args.dir.as_path(),
        _ => Path::new("."),
    };
    FlowSettings::load_or_default(dir).context("Failed to load flow.ron")
}

fn init_logging(settings: &FlowSettings) -> anyhow::Result<()> {
    let directive = settings.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
    let env_filter = match std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV) {
        Ok(_) => tracing_subscriber::EnvFilter::from_default_env(),
        Err(_) => tracing_subscriber::EnvFilter::try_new(directive)
            .with_context(|| format!("Invalid log filter {directive:?}"))?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings)?;

    tracing::debug!("Starting OrdoPlay Flow compiler v{}", env!("CARGO_PKG_VERSION"));

    let session = settings.session()?;
    match cli.command {
        Commands::Synthesize(args) => commands::synthesize::run(args, &session),
        Commands::Compile(args) => commands::compile::run(args, &session),
        Commands::Build(args) => commands::build::run(args, &settings, &session),
        Commands::Run(args) => commands::run::run(args, &session),
        Commands::Specialize(args) => commands::rename::specialize(args, &session),
        Commands::Unspecialize(args) => commands::rename::unspecialize(args, &session),
        Commands::Resize(args) => commands::rename::resize(args, &session),
        Commands::Types(args) => commands::types::run(args, &session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resize_negative_delta() {
        let cli = Cli::try_parse_from(["ordoplay_flowc", "resize", "a.flow", "MakeList", "-1"]).unwrap();
        let Commands::Resize(args) = cli.command else {
            panic!("expected resize");
        };
        assert_eq!(args.delta, -1);
        assert_eq!(args.target.node, "MakeList");
    }

    #[test]
    fn test_build_reads_settings_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        FlowSettings {
            worker_threads: 2,
            ..FlowSettings::default()
        }
        .save(&dir.path().join(settings::SETTINGS_FILE_NAME))
        .unwrap();

        let dir_arg = dir.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["ordoplay_flowc", "build", dir_arg.as_str()]).unwrap();
        assert_eq!(load_settings(&cli).unwrap().worker_threads, 2);
    }
}
