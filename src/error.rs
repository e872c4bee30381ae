//! Error types for the script loader.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::defaults::INVOCATION_ERROR_PREFIX;
use crate::store::RemoteError;

/// Loader error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A directory could not be listed or a script file could not be read
    #[error("Unable to read `{}`: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two scripts resolved to the same name; the later one was rejected
    #[error("Script naming conflict for `{name}`.")]
    Conflict { name: String, path: Option<PathBuf> },

    /// The store rejected a script while loading it
    #[error("Unable to load script: `{name}` - {source}")]
    Registration {
        name: String,
        #[source]
        source: RemoteError,
    },

    /// A loaded script failed while running
    #[error(transparent)]
    Invocation(#[from] ScriptError),

    /// No identifier is cached for the name (cached mode)
    #[error("Script name `{0}` not loaded.")]
    NotLoaded(String),

    /// No source is held for the name (direct mode)
    #[error("No code found for script `{0}`")]
    NoSource(String),

    /// The store failed to connect
    #[error("Store connection error: {0}")]
    Connection(#[source] RemoteError),

    /// A pass-through store command failed
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Invalid loader configuration
    #[error("Invalid loader configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A loader task died before reporting
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is a caller mistake rather than a runtime failure.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::NotLoaded(_) | Self::NoSource(_))
    }

    /// Script name the error is about, if any.
    pub fn script_name(&self) -> Option<&str> {
        match self {
            Self::Conflict { name, .. }
            | Self::Registration { name, .. }
            | Self::NotLoaded(name)
            | Self::NoSource(name) => Some(name),
            Self::Invocation(err) => Some(&err.name),
            _ => None,
        }
    }
}

/// Failure of a loaded script, carrying what is needed to debug it.
///
/// The message is the fixed prefix naming the script followed by the store's
/// own message.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ScriptError {
    /// Resolved script name
    pub name: String,
    /// Script source captured at load time
    pub code: Option<Arc<str>>,
    /// Cached identifier, when the script was invoked by identifier
    pub sha: Option<String>,
    /// Full diagnostic message
    pub message: String,
    /// Underlying store failure
    #[source]
    pub remote: RemoteError,
}

impl ScriptError {
    pub(crate) fn new(
        name: &str,
        code: Option<Arc<str>>,
        sha: Option<String>,
        remote: RemoteError,
    ) -> Self {
        let message = format!("{} `{}`. {}", INVOCATION_ERROR_PREFIX, name, remote);
        Self {
            name: name.to_string(),
            code,
            sha,
            message,
            remote,
        }
    }

    /// Script source as text.
    pub fn source_code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, Error>;
