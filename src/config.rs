//! Loader configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::Result;
use crate::script::NameResolver;

/// How a loaded script is run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Register once, run by identifier
    #[default]
    Cached,
    /// Send the full source on every call
    Direct,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cached => write!(f, "cached"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// One script directory or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceDirs {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl SourceDirs {
    pub fn to_vec(&self) -> Vec<PathBuf> {
        match self {
            Self::One(dir) => vec![dir.clone()],
            Self::Many(dirs) => dirs.clone(),
        }
    }
}

impl Default for SourceDirs {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl From<PathBuf> for SourceDirs {
    fn from(dir: PathBuf) -> Self {
        Self::One(dir)
    }
}

impl From<Vec<PathBuf>> for SourceDirs {
    fn from(dirs: Vec<PathBuf>) -> Self {
        Self::Many(dirs)
    }
}

/// Options recognised by the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderOptions {
    /// Script directories, scanned recursively
    #[serde(default)]
    pub src: SourceDirs,
    /// Execution mode
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Legacy switch: `false` selects direct mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preload: Option<bool>,
    /// Recognised script extension, without the dot
    #[serde(default = "defaults::extension")]
    pub extension: String,
    /// Resolve names from the directory-relative path instead of the stem
    #[serde(default)]
    pub namespace: bool,
    /// Pause before re-waiting on a store whose connection failed
    #[serde(default = "defaults::connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
    /// Name resolution strategy
    #[serde(skip)]
    pub resolver: NameResolver,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            src: SourceDirs::default(),
            mode: ExecutionMode::default(),
            preload: None,
            extension: defaults::extension(),
            namespace: false,
            connect_retry_delay_ms: defaults::CONNECT_RETRY_DELAY_MS,
            resolver: NameResolver::default(),
        }
    }
}

impl LoaderOptions {
    /// Parse options from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse options from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Set the legacy preload switch.
    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = Some(preload);
        self
    }

    /// Configured directories, in order.
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.src.to_vec()
    }

    /// Mode after applying the legacy preload switch.
    pub fn effective_mode(&self) -> ExecutionMode {
        match self.preload {
            Some(false) => ExecutionMode::Direct,
            Some(true) => ExecutionMode::Cached,
            None => self.mode,
        }
    }

    /// Extension without a leading dot.
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}
