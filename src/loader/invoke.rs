//! Callables for loaded scripts.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::ExecutionMode;
use crate::error::{Error, Result, ScriptError};
use crate::loader::events::EventBus;
use crate::script::ScriptEntry;
use crate::store::ScriptStore;

/// Completion callback for [`ScriptFn::call`].
pub type Completion = Box<dyn FnOnce(std::result::Result<Value, ScriptError>) + Send + 'static>;

#[derive(Debug, Clone)]
enum Target {
    Sha(String),
    Source,
}

/// A loaded script, callable like a local async function.
#[derive(Clone)]
pub struct ScriptFn {
    name: Arc<str>,
    code: Arc<str>,
    target: Target,
    store: Arc<dyn ScriptStore>,
    events: EventBus,
}

impl ScriptFn {
    /// Wrap a registry entry.
    ///
    /// Fails if the entry has nothing to run in the given mode: no identifier
    /// in cached mode, no source in direct mode.
    pub(crate) fn new(
        entry: &ScriptEntry,
        mode: ExecutionMode,
        store: Arc<dyn ScriptStore>,
        events: EventBus,
    ) -> Result<Self> {
        let target = match mode {
            ExecutionMode::Cached => match &entry.sha {
                Some(sha) if entry.is_ready() => Target::Sha(sha.clone()),
                _ => return Err(Error::NotLoaded(entry.name.clone())),
            },
            ExecutionMode::Direct => {
                if !entry.is_ready() || entry.source.is_empty() {
                    return Err(Error::NoSource(entry.name.clone()));
                }
                Target::Source
            }
        };

        Ok(Self {
            name: Arc::from(entry.name.as_str()),
            code: Arc::clone(&entry.source),
            target,
            store,
            events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier used for cached calls.
    pub fn sha(&self) -> Option<&str> {
        match &self.target {
            Target::Sha(sha) => Some(sha),
            Target::Source => None,
        }
    }

    /// Source captured at load time.
    pub fn source(&self) -> &str {
        &self.code
    }

    pub fn mode(&self) -> ExecutionMode {
        match self.target {
            Target::Sha(_) => ExecutionMode::Cached,
            Target::Source => ExecutionMode::Direct,
        }
    }

    /// Run the script and await its result.
    pub async fn invoke(&self, args: Vec<Value>) -> std::result::Result<Value, ScriptError> {
        let outcome = match &self.target {
            Target::Sha(sha) => self.store.invoke_by_id(sha, &args).await,
            Target::Source => self.store.invoke_by_source(&self.code, &args).await,
        };

        outcome.map_err(|remote| {
            ScriptError::new(
                &self.name,
                Some(Arc::clone(&self.code)),
                self.sha().map(String::from),
                remote,
            )
        })
    }

    /// Run the script in the background.
    ///
    /// The result goes to `completion`. Without a completion, a failure is
    /// published on the loader's error channel. Must be called from within a
    /// tokio runtime. Returns this callable; use [`ScriptLoader::call`] to
    /// chain on the loader instead.
    ///
    /// [`ScriptLoader::call`]: crate::loader::ScriptLoader::call
    pub fn call(&self, args: Vec<Value>, completion: Option<Completion>) -> &Self {
        let script = self.clone();
        tokio::spawn(async move {
            let result = script.invoke(args).await;
            match completion {
                Some(done) => done(result),
                None => {
                    if let Err(err) = result {
                        script.events.error(Error::Invocation(err));
                    }
                }
            }
        });
        self
    }
}

impl fmt::Debug for ScriptFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFn")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish()
    }
}
