//! Boundary to the remote key-value store's scripting subsystem.
//!
//! The loader never talks to a server directly. Everything it needs from the
//! store goes through [`ScriptStore`]: wait for the connection, register a
//! script source, run a script by identifier or by source, and kill a running
//! script.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;

/// Failure reported by the remote store.
///
/// `Clone` so it can be fanned out to every event subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The identifier is unknown to the store (its script cache was flushed).
    #[error("NOSCRIPT {0}")]
    NoScript(String),

    /// The script failed to compile or raised at runtime.
    #[error("{0}")]
    Script(String),

    /// Connection or protocol failure.
    #[error("connection error: {0}")]
    Transport(String),

    /// `SCRIPT KILL` issued while no script was running.
    #[error("NOTBUSY {0}")]
    NotBusy(String),

    /// The store refused the command (e.g. scripting disabled).
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Scripting operations consumed from the remote store.
///
/// Implementations own the connection and serialize commands; the loader only
/// issues calls and awaits their completion.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Resolve once the store is connected and able to take commands.
    async fn wait_connected(&self) -> Result<(), RemoteError>;

    /// `SCRIPT LOAD`: register a source and return its identifier.
    async fn register_source(&self, source: &str) -> Result<String, RemoteError>;

    /// `EVALSHA`: run a registered script by identifier.
    async fn invoke_by_id(&self, id: &str, args: &[Value]) -> Result<Value, RemoteError>;

    /// `EVAL`: run a script by sending its full source.
    async fn invoke_by_source(&self, source: &str, args: &[Value]) -> Result<Value, RemoteError>;

    /// `SCRIPT KILL`.
    async fn kill_running_script(&self) -> Result<(), RemoteError>;
}
