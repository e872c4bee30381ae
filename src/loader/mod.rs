//! Script loader: discovery, registration and invocation of remote scripts.
//!
//! A [`ScriptLoader`] scans its directories, registers every script with the
//! store and hands out [`ScriptFn`] callables by resolved name. Readiness is
//! published once, when the store is connected and the initial load has
//! finished; per-script failures are published as error events and never stop
//! the rest of the load.

pub mod barrier;
pub mod events;
pub mod gate;
pub mod invoke;
pub mod scanner;

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::config::{ExecutionMode, LoaderOptions, SourceDirs};
use crate::error::{Error, Result};
use crate::script::{NameResolver, ScriptEntry, ScriptLoadState, ScriptRegistry};
use crate::store::ScriptStore;

pub use barrier::{BarrierUnit, LoadBarrier};
pub use events::{EventBus, LoaderEvent};
pub use gate::{GateState, ReadinessGate};
pub use invoke::{Completion, ScriptFn};
pub use scanner::{DirectoryScanner, ScanEvent, ScannedScript};

/// Outcome of one [`ScriptLoader::load_all`] pass.
#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    /// Scripts registered and callable
    pub loaded: usize,
    /// Scripts the store rejected
    pub failed: usize,
    /// Scripts rejected because their name was taken
    pub conflicts: usize,
    /// Unreadable directories or files
    pub discovery_errors: usize,
    /// Time taken for the pass
    pub duration: Duration,
}

impl LoadReport {
    /// Whether every discovered script loaded.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.conflicts == 0 && self.discovery_errors == 0
    }
}

enum Outcome {
    Loaded,
    Failed,
    Conflict,
}

struct LoaderInner {
    store: Arc<dyn ScriptStore>,
    options: LoaderOptions,
    mode: ExecutionMode,
    registry: ScriptRegistry,
    scanner: DirectoryScanner,
    gate: ReadinessGate,
    events: EventBus,
}

/// Loads scripts into a store and exposes them as callables.
///
/// Cheap to clone; clones share the same registry and event channel.
#[derive(Clone)]
pub struct ScriptLoader {
    inner: Arc<LoaderInner>,
}

impl ScriptLoader {
    /// Create a loader. Nothing happens until [`start`](Self::start).
    pub fn new(store: Arc<dyn ScriptStore>, options: LoaderOptions) -> Self {
        let mode = options.effective_mode();
        let scanner = DirectoryScanner::new(options.extension(), options.namespace);
        Self {
            inner: Arc::new(LoaderInner {
                store,
                mode,
                scanner,
                options,
                registry: ScriptRegistry::new(),
                gate: ReadinessGate::new(),
                events: EventBus::new(),
            }),
        }
    }

    /// Start configuring a loader.
    pub fn builder(store: Arc<dyn ScriptStore>) -> LoaderBuilder {
        LoaderBuilder::new(store)
    }

    /// Create a loader and start it.
    pub fn spawn(store: Arc<dyn ScriptStore>, options: LoaderOptions) -> Self {
        let loader = Self::new(store, options);
        loader.start();
        loader
    }

    /// Wait for the store and load the configured directories in the
    /// background. Returns `false` if already started.
    pub fn start(&self) -> bool {
        if !self.inner.gate.begin() {
            return false;
        }

        tokio::spawn(wait_for_store(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.store),
            Duration::from_millis(self.inner.options.connect_retry_delay_ms),
        ));

        let loader = self.clone();
        tokio::spawn(async move {
            let dirs = loader.inner.options.dirs();
            let report = loader.load_all(&dirs).await;
            log::info!(
                "Initial load finished: {} loaded, {} failed, {} conflicts in {:?}",
                report.loaded,
                report.failed,
                report.conflicts,
                report.duration
            );
            if loader.inner.gate.scripts_loaded() {
                loader.inner.fire_ready();
            }
        });

        true
    }

    /// Subscribe to `Ready` and `Error` events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_ready()
    }

    pub fn gate_state(&self) -> GateState {
        self.inner.gate.state()
    }

    /// Resolve once the loader is ready; immediately if it already is.
    pub async fn wait_ready(&self) {
        self.inner.gate.wait_ready().await
    }

    /// Scan `roots` recursively and load every script found.
    ///
    /// Completes once every directory and file has either loaded or been
    /// reported on the error channel.
    pub async fn load_all(&self, roots: &[PathBuf]) -> LoadReport {
        let start = Instant::now();
        log::debug!(
            "[load_all] loading: dirs=[{}]",
            roots
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let (barrier, root) = LoadBarrier::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.inner.scanner.scan(roots, &root, &tx);
        drop(tx);
        drop(root);

        let mut report = LoadReport::default();
        let mut tasks = JoinSet::new();

        while let Some(event) = rx.recv().await {
            match event {
                ScanEvent::Found { script, unit } => {
                    let loader = self.clone();
                    tasks.spawn(async move {
                        let _unit = unit;
                        loader.load_scanned(script).await
                    });
                }
                ScanEvent::Failed { error, unit } => {
                    report.discovery_errors += 1;
                    self.inner.events.error(error);
                    drop(unit);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Loaded) => report.loaded += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Conflict) => report.conflicts += 1,
                Err(err) => {
                    report.failed += 1;
                    self.inner.events.error(Error::Internal(err.to_string()));
                }
            }
        }

        barrier.wait().await;
        report.duration = start.elapsed();
        report
    }

    /// Load a single script under `name`.
    ///
    /// A name whose earlier load failed may be loaded again. Errors are
    /// returned to the caller and not published as events.
    pub async fn load_script(&self, name: &str, source: &str) -> Result<ScriptFn> {
        self.load_entry(ScriptEntry::new(name, source, None), true).await
    }

    /// Callable for a loaded script.
    ///
    /// Fails synchronously if `name` was never loaded: no identifier cached in
    /// cached mode, no source held in direct mode.
    pub fn wrap(&self, name: &str) -> Result<ScriptFn> {
        log::debug!("[wrap] wrapping: name=`{}`", name);
        match self.inner.registry.get(name) {
            Some(entry) => ScriptFn::new(
                &entry,
                self.inner.mode,
                Arc::clone(&self.inner.store),
                self.inner.events.clone(),
            ),
            None => Err(self.inner.not_loaded(name)),
        }
    }

    /// Callable for a loaded script, if any.
    pub fn get(&self, name: &str) -> Option<ScriptFn> {
        self.wrap(name).ok()
    }

    /// Run a script in the background; see [`ScriptFn::call`].
    pub fn call(
        &self,
        name: &str,
        args: Vec<Value>,
        completion: Option<Completion>,
    ) -> Result<&Self> {
        self.wrap(name)?.call(args, completion);
        Ok(self)
    }

    /// Run a script and await its result.
    pub async fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        Ok(self.wrap(name)?.invoke(args).await?)
    }

    /// `SCRIPT KILL` on the store.
    pub async fn script_kill(&self) -> Result<()> {
        Ok(self.inner.store.kill_running_script().await?)
    }

    /// Cached identifier of a script; `None` in direct mode.
    pub fn sha(&self, name: &str) -> Option<String> {
        self.inner.registry.sha(name)
    }

    /// Source captured when the script was loaded.
    pub fn source(&self, name: &str) -> Option<Arc<str>> {
        self.inner.registry.source(name)
    }

    pub fn status(&self, name: &str) -> Option<ScriptLoadState> {
        self.inner.registry.state(name)
    }

    /// Sorted names of callable scripts.
    pub fn names(&self) -> Vec<String> {
        self.inner.registry.ready_names()
    }

    /// Number of callable scripts.
    pub fn len(&self) -> usize {
        self.inner.registry.ready_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> ExecutionMode {
        self.inner.mode
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.inner.options
    }

    /// Name a file stem resolves to under this loader's strategy.
    pub fn resolve_name(&self, stem: &str) -> String {
        self.inner.options.resolver.resolve(stem)
    }

    async fn load_scanned(&self, script: ScannedScript) -> Outcome {
        let name = self.resolve_name(&script.stem);
        let entry = ScriptEntry::new(name, script.source, Some(script.path));
        match self.load_entry(entry, false).await {
            Ok(_) => Outcome::Loaded,
            Err(err) => {
                let outcome = match err {
                    Error::Conflict { .. } => Outcome::Conflict,
                    _ => Outcome::Failed,
                };
                self.inner.events.error(err);
                outcome
            }
        }
    }

    async fn load_entry(&self, entry: ScriptEntry, replace_failed: bool) -> Result<ScriptFn> {
        log::debug!("[load_script] loading: name=`{}`", entry.name);
        let name = entry.name.clone();
        let source = Arc::clone(&entry.source);
        if replace_failed {
            self.inner.registry.reclaim(entry)?;
        } else {
            self.inner.registry.claim(entry)?;
        }

        match self.inner.mode {
            ExecutionMode::Cached => {
                self.inner.registry.mark_registering(&name);
                match self.inner.store.register_source(&source).await {
                    Ok(sha) => self.inner.registry.mark_ready(&name, Some(sha)),
                    Err(remote) => {
                        self.inner.registry.mark_failed(&name, remote.to_string());
                        return Err(Error::Registration {
                            name,
                            source: remote,
                        });
                    }
                }
            }
            ExecutionMode::Direct => {
                // Nothing to send on invocation.
                if source.is_empty() {
                    self.inner
                        .registry
                        .mark_failed(&name, "empty source".to_string());
                    return Err(Error::NoSource(name));
                }
                self.inner.registry.mark_ready(&name, None);
            }
        }

        self.wrap(&name)
    }
}

impl LoaderInner {
    fn fire_ready(&self) {
        log::debug!("[init] ready");
        self.events.ready();
    }

    fn not_loaded(&self, name: &str) -> Error {
        match self.mode {
            ExecutionMode::Cached => Error::NotLoaded(name.to_string()),
            ExecutionMode::Direct => Error::NoSource(name.to_string()),
        }
    }
}

/// Wait for the store connection, publishing each failure and trying again.
///
/// Holds the loader weakly so an abandoned loader does not keep this task
/// alive past the current wait.
async fn wait_for_store(inner: Weak<LoaderInner>, store: Arc<dyn ScriptStore>, retry: Duration) {
    loop {
        let outcome = store.wait_connected().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };

        match outcome {
            Ok(()) => {
                log::debug!("[init] store connected");
                if inner.gate.store_connected() {
                    inner.fire_ready();
                }
                return;
            }
            Err(err) => inner.events.error(Error::Connection(err)),
        }

        drop(inner);
        tokio::time::sleep(retry).await;
    }
}

/// Builder for [`ScriptLoader`].
pub struct LoaderBuilder {
    store: Arc<dyn ScriptStore>,
    options: LoaderOptions,
}

impl LoaderBuilder {
    pub fn new(store: Arc<dyn ScriptStore>) -> Self {
        Self {
            store,
            options: LoaderOptions::default(),
        }
    }

    /// Replace all options.
    pub fn options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a script directory.
    pub fn src(mut self, dir: impl Into<PathBuf>) -> Self {
        let mut dirs = self.options.dirs();
        dirs.push(dir.into());
        self.options.src = SourceDirs::Many(dirs);
        self
    }

    /// Add several script directories, in order.
    pub fn dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for dir in dirs {
            self = self.src(dir);
        }
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.options.mode = mode;
        self.options.preload = None;
        self
    }

    /// Legacy switch: `false` selects direct mode.
    pub fn preload(mut self, preload: bool) -> Self {
        self.options.preload = Some(preload);
        self
    }

    pub fn resolver(mut self, resolver: NameResolver) -> Self {
        self.options.resolver = resolver;
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.options.extension = extension.into();
        self
    }

    pub fn namespace(mut self, namespace: bool) -> Self {
        self.options.namespace = namespace;
        self
    }

    pub fn connect_retry_delay(mut self, delay: Duration) -> Self {
        self.options.connect_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Build without starting.
    pub fn build(self) -> ScriptLoader {
        ScriptLoader::new(self.store, self.options)
    }

    /// Build and start.
    pub fn spawn(self) -> ScriptLoader {
        ScriptLoader::spawn(self.store, self.options)
    }
}
