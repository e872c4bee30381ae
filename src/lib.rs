//! Lua Loader - load script directories into a remote script cache and call
//! each script like a local function.

mod defaults;
pub mod config;
pub mod error;

pub mod loader;
pub mod script;
pub mod store;

pub use error::{Error, Result, ScriptError};

pub use config::{ExecutionMode, LoaderOptions, SourceDirs};

pub use loader::{
    Completion, GateState, LoadReport, LoaderBuilder, LoaderEvent, ScriptFn, ScriptLoader,
};

pub use script::{NameResolver, ScriptEntry, ScriptLoadState, ScriptRegistry};

pub use store::{MemoryStore, RemoteError, ScriptStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
