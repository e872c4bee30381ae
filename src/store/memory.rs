//! In-process script store.
//!
//! Behaves like a scripting-enabled key-value server closely enough to drive
//! the loader without a network: identifiers are content digests, the script
//! cache can be flushed, and the connection can be held back or failed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use super::{RemoteError, ScriptStore};

/// Runs a script source against its arguments.
pub type Evaluator = Arc<dyn Fn(&str, &[Value]) -> Result<Value, RemoteError> + Send + Sync>;

/// Decides whether a source may be registered.
pub type Validator = Arc<dyn Fn(&str) -> Result<(), RemoteError> + Send + Sync>;

/// Connection state exposed to `wait_connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectionState {
    Pending,
    Connected,
    Failed(String),
}

/// In-memory [`ScriptStore`].
pub struct MemoryStore {
    scripts: RwLock<HashMap<String, String>>,
    connection: watch::Sender<ConnectionState>,
    evaluator: Evaluator,
    validator: Validator,
    registrations: AtomicU64,
    invocations: AtomicU64,
}

impl MemoryStore {
    /// Create a store that has not connected yet.
    pub fn new() -> Self {
        let (connection, _) = watch::channel(ConnectionState::Pending);
        Self {
            scripts: RwLock::new(HashMap::new()),
            connection,
            evaluator: Arc::new(default_evaluator),
            validator: Arc::new(default_validator),
            registrations: AtomicU64::new(0),
            invocations: AtomicU64::new(0),
        }
    }

    /// Create a store that is already connected.
    pub fn connected() -> Self {
        let store = Self::new();
        store.connect();
        store
    }

    /// Replace the script evaluator.
    pub fn with_evaluator<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Replace the registration validator.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> Result<(), RemoteError> + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    /// Mark the connection as established.
    pub fn connect(&self) {
        self.connection.send_replace(ConnectionState::Connected);
    }

    /// Make the pending (or next) `wait_connected` fail with a transport error.
    pub fn fail_connection(&self, message: impl Into<String>) {
        self.connection
            .send_replace(ConnectionState::Failed(message.into()));
    }

    /// Whether the connection is currently established.
    pub fn is_connected(&self) -> bool {
        *self.connection.borrow() == ConnectionState::Connected
    }

    /// `SCRIPT FLUSH`: forget every registered script.
    pub fn flush(&self) {
        self.scripts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Whether a script with this identifier is cached.
    pub fn contains(&self, id: &str) -> bool {
        self.scripts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Number of cached scripts.
    pub fn script_count(&self) -> usize {
        self.scripts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of `register_source` calls received.
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Number of `invoke_by_id` / `invoke_by_source` calls received.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Content identifier for a source: lowercase hex SHA-256.
    pub fn digest(source: &str) -> String {
        hex::encode(Sha256::digest(source.as_bytes()))
    }

    fn cache(&self, source: &str) -> String {
        let id = Self::digest(source);
        self.scripts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_insert_with(|| source.to_string());
        id
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptStore for MemoryStore {
    async fn wait_connected(&self) -> Result<(), RemoteError> {
        let mut rx = self.connection.subscribe();
        let state = rx
            .wait_for(|state| *state != ConnectionState::Pending)
            .await
            .map_err(|_| RemoteError::Transport("connection dropped".to_string()))?
            .clone();

        match state {
            ConnectionState::Failed(message) => {
                // One failure per report; the next wait blocks until connect().
                self.connection.send_if_modified(|state| {
                    if matches!(state, ConnectionState::Failed(_)) {
                        *state = ConnectionState::Pending;
                        true
                    } else {
                        false
                    }
                });
                Err(RemoteError::Transport(message))
            }
            _ => Ok(()),
        }
    }

    async fn register_source(&self, source: &str) -> Result<String, RemoteError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        (self.validator)(source)?;
        Ok(self.cache(source))
    }

    async fn invoke_by_id(&self, id: &str, args: &[Value]) -> Result<Value, RemoteError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let source = self
            .scripts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| {
                RemoteError::NoScript("No matching script. Please use EVAL.".to_string())
            })?;
        (self.evaluator)(&source, args)
    }

    async fn invoke_by_source(&self, source: &str, args: &[Value]) -> Result<Value, RemoteError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        (self.validator)(source)?;
        self.cache(source);
        (self.evaluator)(source, args)
    }

    async fn kill_running_script(&self) -> Result<(), RemoteError> {
        Err(RemoteError::NotBusy(
            "No scripts in execution right now.".to_string(),
        ))
    }
}

/// `return <json>` yields the literal, a call to `error(` raises, anything
/// else echoes its arguments.
fn default_evaluator(source: &str, args: &[Value]) -> Result<Value, RemoteError> {
    let body = source.trim();
    if let Some(line) = body.lines().find(|line| line.contains("error(")) {
        return Err(RemoteError::Script(format!(
            "ERR user_script:1: {}",
            line.trim()
        )));
    }
    if let Some(literal) = body.strip_prefix("return ") {
        if let Ok(value) = serde_json::from_str::<Value>(literal.trim()) {
            return Ok(value);
        }
    }
    Ok(Value::Array(args.to_vec()))
}

fn default_validator(source: &str) -> Result<(), RemoteError> {
    if source.trim().is_empty() {
        return Err(RemoteError::Script(
            "ERR Error compiling script: empty source".to_string(),
        ));
    }
    if source.contains("syntax error") {
        return Err(RemoteError::Script(
            "ERR Error compiling script (new function): user_script:1: syntax error".to_string(),
        ));
    }
    Ok(())
}
