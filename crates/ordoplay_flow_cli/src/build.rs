// SPDX-License-Identifier: MIT OR Apache-2.0
//! Build system for flow projects.
//!
//! Every `*.flow` declaration file under the source directory is compiled to
//! an IR text file in the output directory. Files are compiled on a pool of
//! worker threads that share one [`CompilerSession`], so node classes
//! synthesized for one file are reused by the others.

use crate::settings::FlowSettings;
use ordoplay_flow_compiler::ir::Module;
use ordoplay_flow_compiler::{
    CompileError, CompilerSession, Composition, CompositionDecl, CompositionError,
    DeclarationError,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Extension of declaration files
pub const FLOW_EXTENSION: &str = "flow";

/// Build progress reporting
#[derive(Debug, Clone)]
pub struct BuildProgress {
    /// Current step description
    pub step: String,
    /// Current progress (0-100)
    pub progress: u32,
    /// Files compiled so far
    pub files_done: u32,
    /// Whether build is complete
    pub complete: bool,
    /// Error message if any
    pub error: Option<String>,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self {
            step: "Preparing...".to_string(),
            progress: 0,
            files_done: 0,
            complete: false,
            error: None,
        }
    }
}

/// Build state shared between the driver and its workers
pub struct BuildState {
    progress: AtomicU32,
    files_done: AtomicU32,
    cancelled: AtomicBool,
    complete: AtomicBool,
    step: Mutex<String>,
    error: Mutex<Option<String>>,
}

impl BuildState {
    /// Fresh state
    pub fn new() -> Self {
        Self {
            progress: AtomicU32::new(0),
            files_done: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            complete: AtomicBool::new(false),
            step: Mutex::new("Initializing...".to_string()),
            error: Mutex::new(None),
        }
    }

    /// Describe the current step
    pub fn set_step(&self, step: impl Into<String>) {
        *self.step.lock() = step.into();
    }

    /// Set progress, clamped to 100
    pub fn set_progress(&self, progress: u32) {
        self.progress.store(progress.min(100), Ordering::Relaxed);
    }

    /// Record a failure; the first one is kept
    pub fn set_error(&self, error: impl Into<String>) {
        self.error.lock().get_or_insert_with(|| error.into());
    }

    /// Whether the build was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Ask the workers to stop after their current file
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Count one finished file out of `total`
    pub fn file_done(&self, total: usize) {
        let done = self.files_done.fetch_add(1, Ordering::Relaxed) + 1;
        let total = u32::try_from(total.max(1)).unwrap_or(u32::MAX);
        self.set_progress(5 + done.saturating_mul(90) / total);
    }

    /// Mark the build complete
    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Relaxed);
        self.progress.store(100, Ordering::Relaxed);
    }

    /// Snapshot of the progress
    pub fn get_progress(&self) -> BuildProgress {
        BuildProgress {
            step: self.step.lock().clone(),
            progress: self.progress.load(Ordering::Relaxed),
            files_done: self.files_done.load(Ordering::Relaxed),
            complete: self.complete.load(Ordering::Relaxed),
            error: self.error.lock().clone(),
        }
    }
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build result
#[derive(Debug)]
pub enum BuildResult {
    /// Every file compiled
    Success {
        /// Where the IR files were written
        output_dir: PathBuf,
        /// Wall-clock build time
        build_time_secs: f64,
        /// Number of files compiled
        files_compiled: usize,
        /// Node classes resolved while compiling
        classes_resolved: usize,
        /// IR functions emitted by the session's backend
        functions_emitted: u64,
    },
    /// Stopped by [`BuildState::cancel`]
    Cancelled,
    /// At least one file failed
    Failed(String),
}

/// Build options
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory searched for declaration files
    pub source_dir: PathBuf,
    /// Output directory
    pub output_dir: PathBuf,
    /// Whether to clean output directory first
    pub clean: bool,
    /// Compile the remaining files after one fails
    pub keep_going: bool,
}

/// Failure to compile one declaration file
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// The file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The declarations are malformed
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// The declarations do not form a valid composition
    #[error(transparent)]
    Composition(#[from] CompositionError),

    /// The composition could not be compiled
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Composition name for a declaration file
pub fn composition_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read and instantiate the composition declared in a file
pub fn load_composition(
    session: &CompilerSession,
    path: &Path,
) -> Result<Composition, FileError> {
    let text = std::fs::read_to_string(path)?;
    let decl = CompositionDecl::parse(composition_name(path), &text)?;
    Ok(session.instantiate(&decl)?)
}

/// Compile the composition declared in a file
pub fn compile_file(session: &CompilerSession, path: &Path) -> Result<Module, FileError> {
    let composition = load_composition(session, path)?;
    Ok(session.compile_composition(&composition)?)
}

/// Build system
pub struct BuildSystem;

impl BuildSystem {
    /// Compile every declaration file of a project
    pub fn build(
        settings: &FlowSettings,
        session: &CompilerSession,
        options: &BuildOptions,
        state: &BuildState,
    ) -> BuildResult {
        let start_time = std::time::Instant::now();

        tracing::info!("Starting build of {}", options.source_dir.display());
        state.set_step("Preparing build...");
        state.set_progress(0);

        if options.clean && options.output_dir.exists() {
            state.set_step("Cleaning output directory...");
            if let Err(e) = std::fs::remove_dir_all(&options.output_dir) {
                state.set_error(format!("Failed to clean output directory: {e}"));
                return BuildResult::Failed(format!("Failed to clean output directory: {e}"));
            }
        }

        if let Err(e) = std::fs::create_dir_all(&options.output_dir) {
            state.set_error(format!("Failed to create output directory: {e}"));
            return BuildResult::Failed(format!("Failed to create output directory: {e}"));
        }

        let files = Self::collect_sources(&options.source_dir);
        state.set_progress(5);
        if state.is_cancelled() {
            return BuildResult::Cancelled;
        }

        let workers = settings.effective_workers(files.len());
        state.set_step(format!(
            "Compiling {} files on {workers} workers...",
            files.len()
        ));
        let failures = Self::compile_all(settings, session, options, &files, workers, state);

        if !failures.is_empty() {
            let message = failures.join("\n");
            tracing::error!("Build failed: {} of {} files", failures.len(), files.len());
            return BuildResult::Failed(message);
        }
        if state.is_cancelled() {
            return BuildResult::Cancelled;
        }

        state.set_step("Build complete!");
        state.mark_complete();

        let build_time_secs = start_time.elapsed().as_secs_f64();
        tracing::info!("Build completed in {:.2}s", build_time_secs);

        BuildResult::Success {
            output_dir: options.output_dir.clone(),
            build_time_secs,
            files_compiled: files.len(),
            classes_resolved: session.cached_count(),
            functions_emitted: session.backend().functions_emitted(),
        }
    }

    /// Declaration files under a directory, in a stable order
    pub fn collect_sources(source_dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(source_dir)
            .into_iter()
            .filter_map(|e: Result<walkdir::DirEntry, walkdir::Error>| e.ok())
            .filter(|e: &walkdir::DirEntry| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| p.extension().is_some_and(|ext| ext == FLOW_EXTENSION))
            .collect();
        files.sort();
        files
    }

    /// Output path of a declaration file
    pub fn output_path(settings: &FlowSettings, options: &BuildOptions, source: &Path) -> PathBuf {
        let rel_path = source.strip_prefix(&options.source_dir).unwrap_or(source);
        options
            .output_dir
            .join(rel_path)
            .with_extension(&settings.output_extension)
    }

    fn compile_all(
        settings: &FlowSettings,
        session: &CompilerSession,
        options: &BuildOptions,
        files: &[PathBuf],
        workers: usize,
        state: &BuildState,
    ) -> Vec<String> {
        let next = AtomicUsize::new(0);
        let failures = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if state.is_cancelled() {
                        break;
                    }
                    let Some(source) = files.get(next.fetch_add(1, Ordering::Relaxed)) else {
                        break;
                    };
                    let dest = Self::output_path(settings, options, source);
                    if let Err(e) = Self::compile_one(session, source, &dest) {
                        let message = format!("{}: {e}", source.display());
                        tracing::warn!("{message}");
                        state.set_error(message.clone());
                        failures.lock().push(message);
                        if !options.keep_going {
                            state.cancel();
                        }
                    } else {
                        tracing::debug!("Compiled {}", source.display());
                    }
                    state.file_done(files.len());
                });
            }
        });

        let mut failures = failures.into_inner();
        failures.sort();
        failures
    }

    fn compile_one(session: &CompilerSession, source: &Path, dest: &Path) -> Result<(), FileError> {
        let module = compile_file(session, source)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, module.to_string())?;
        Ok(())
    }
}
