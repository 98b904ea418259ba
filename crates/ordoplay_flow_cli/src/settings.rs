// SPDX-License-Identifier: MIT OR Apache-2.0
//! Build settings stored in `flow.ron`.

use ordoplay_flow_compiler::{CompilerSession, TypeDescriptor, ValueShape};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file name
pub const SETTINGS_FILE_NAME: &str = "flow.ron";

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// A type compiled outside the built-in set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraType {
    /// Type name
    pub name: String,
    /// Machine words per value (1 or 2)
    #[serde(default = "default_words")]
    pub words: usize,
    /// Whether values are reference counted
    #[serde(default)]
    pub managed: bool,
}

fn default_words() -> usize {
    1
}

impl ExtraType {
    /// Descriptor to register with a session
    pub fn descriptor(&self) -> Result<TypeDescriptor, SettingsError> {
        if self.managed {
            return Ok(TypeDescriptor::managed(self.name.as_str()));
        }
        let shape = ValueShape::from_words(self.words).ok_or_else(|| SettingsError::InvalidWords {
            name: self.name.clone(),
            words: self.words,
        })?;
        Ok(TypeDescriptor::value(self.name.as_str(), shape))
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A type has an unsupported word count
    #[error("Type '{name}' has {words} words, expected 1 or 2")]
    InvalidWords {
        /// Type name
        name: String,
        /// Declared word count
        words: usize,
    },
}

/// Settings for a flow project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Settings format version
    pub version: u32,
    /// Types registered on top of the built-in ones
    #[serde(default)]
    pub types: Vec<ExtraType>,
    /// Build worker threads, 0 for one per CPU
    #[serde(default)]
    pub worker_threads: usize,
    /// Log filter directive, overridden by `RUST_LOG`
    #[serde(default)]
    pub log_filter: Option<String>,
    /// Extension of emitted IR files
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

fn default_output_extension() -> String {
    "ir".to_string()
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            types: Vec::new(),
            worker_threads: 0,
            log_filter: None,
            output_extension: default_output_extension(),
        }
    }
}

impl FlowSettings {
    /// Load settings from a file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: FlowSettings = ron::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Settings version {} is newer than supported version {}",
                    settings.version, SETTINGS_FORMAT_VERSION
                ),
            ));
        }

        Ok(settings)
    }

    /// Load `flow.ron` from a directory, falling back to defaults when absent
    pub fn load_or_default(dir: &Path) -> std::io::Result<Self> {
        let path = Self::settings_file_path(dir);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);

        let content = ron::ser::to_string_pretty(self, config).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(path, content)
    }

    /// Settings file path for a project directory
    pub fn settings_file_path(dir: &Path) -> PathBuf {
        dir.join(SETTINGS_FILE_NAME)
    }

    /// Worker count to use for a build of `jobs` files
    pub fn effective_workers(&self, jobs: usize) -> usize {
        let wanted = if self.worker_threads == 0 {
            std::thread::available_parallelism().map_or(1, usize::from)
        } else {
            self.worker_threads
        };
        wanted.min(jobs).max(1)
    }

    /// Session with the built-in types plus the configured ones
    pub fn session(&self) -> Result<CompilerSession, SettingsError> {
        let mut session = CompilerSession::with_defaults();
        for extra in &self.types {
            session.register_type(extra.descriptor()?);
        }
        Ok(session)
    }
}
