//! Script registry for tracking discovered scripts and their state.
//!
//! Provides a state machine for script lifecycle:
//! DISCOVERED -> REGISTERING -> READY | FAILED

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Script load state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptLoadState {
    /// Source read, nothing sent to the store yet
    Discovered,
    /// Registration in flight
    Registering,
    /// Callable
    Ready,
    /// Registration failed; never retried automatically
    Failed,
}

impl std::fmt::Display for ScriptLoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovered => write!(f, "DISCOVERED"),
            Self::Registering => write!(f, "REGISTERING"),
            Self::Ready => write!(f, "READY"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Entry in the script registry.
#[derive(Debug, Clone)]
pub struct ScriptEntry {
    /// Resolved name
    pub name: String,
    /// File the source was read from, if any
    pub path: Option<PathBuf>,
    /// Full source text, immutable once read
    pub source: Arc<str>,
    /// Identifier returned by the store (cached mode only)
    pub sha: Option<String>,
    /// Current state
    pub state: ScriptLoadState,
    /// Error message if failed
    pub error: Option<String>,
}

impl ScriptEntry {
    pub fn new(name: impl Into<String>, source: impl Into<Arc<str>>, path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path,
            source: source.into(),
            sha: None,
            state: ScriptLoadState::Discovered,
            error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ScriptLoadState::Ready
    }
}

/// Name -> entry map owned by one loader.
///
/// At most one live entry per name. Claiming a name is an atomic
/// check-and-insert, so concurrent discoveries of the same name yield exactly
/// one winner.
#[derive(Default)]
pub struct ScriptRegistry {
    entries: RwLock<HashMap<String, ScriptEntry>>,
}

impl ScriptRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly discovered script.
    ///
    /// The first claim for a name wins; a later claim is a conflict and leaves
    /// the existing entry untouched, whatever state it is in.
    pub fn claim(&self, entry: ScriptEntry) -> Result<()> {
        self.insert(entry, false)
    }

    /// Like [`claim`](Self::claim), but a failed entry may be replaced.
    pub fn reclaim(&self, entry: ScriptEntry) -> Result<()> {
        self.insert(entry, true)
    }

    fn insert(&self, entry: ScriptEntry, replace_failed: bool) -> Result<()> {
        let mut entries = self.write();
        if let Some(existing) = entries.get(&entry.name) {
            if !(replace_failed && existing.state == ScriptLoadState::Failed) {
                return Err(Error::Conflict {
                    name: entry.name,
                    path: entry.path,
                });
            }
        }
        entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Mark a script as being registered with the store.
    pub fn mark_registering(&self, name: &str) {
        self.update(name, |entry| {
            entry.state = ScriptLoadState::Registering;
        });
    }

    /// Mark a script as callable, caching its identifier if any.
    pub fn mark_ready(&self, name: &str, sha: Option<String>) {
        self.update(name, |entry| {
            entry.sha = sha;
            entry.error = None;
            entry.state = ScriptLoadState::Ready;
        });
    }

    /// Mark a script as failed.
    pub fn mark_failed(&self, name: &str, error: String) {
        self.update(name, |entry| {
            entry.sha = None;
            entry.error = Some(error);
            entry.state = ScriptLoadState::Failed;
        });
    }

    /// Snapshot of an entry.
    pub fn get(&self, name: &str) -> Option<ScriptEntry> {
        self.read().get(name).cloned()
    }

    /// Cached identifier for a ready script.
    pub fn sha(&self, name: &str) -> Option<String> {
        self.read()
            .get(name)
            .filter(|entry| entry.is_ready())
            .and_then(|entry| entry.sha.clone())
    }

    /// Source of a ready script.
    pub fn source(&self, name: &str) -> Option<Arc<str>> {
        self.read()
            .get(name)
            .filter(|entry| entry.is_ready())
            .map(|entry| Arc::clone(&entry.source))
    }

    /// Current state of a script, if known.
    pub fn state(&self, name: &str) -> Option<ScriptLoadState> {
        self.read().get(name).map(|entry| entry.state)
    }

    /// Path a script was read from.
    pub fn path(&self, name: &str) -> Option<PathBuf> {
        self.read().get(name).and_then(|entry| entry.path.clone())
    }

    /// Sorted names of ready scripts.
    pub fn ready_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .values()
            .filter(|entry| entry.is_ready())
            .map(|entry| entry.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of ready scripts.
    pub fn ready_count(&self) -> usize {
        self.read().values().filter(|entry| entry.is_ready()).count()
    }

    /// Number of entries in any state.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn update(&self, name: &str, apply: impl FnOnce(&mut ScriptEntry)) {
        match self.write().get_mut(name) {
            Some(entry) => apply(entry),
            None => log::warn!("State update for unknown script '{}'", name),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ScriptEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ScriptEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
