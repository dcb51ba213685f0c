//! Lifecycle of the embedded Rhai runtime
//!
//! The runtime moves through `Uninitialized -> Initialized -> ShuttingDown ->
//! ShutDown` exactly once, and only one runtime may be live in the process at
//! a time. Script objects only hold a weak reference to the
//! live runtime, so a handle that outlives shutdown fails with
//! [`ScriptError::Lifecycle`] instead of touching a finalized engine.

use crate::config::ScriptConfig;
use crate::error::{ScriptError, ScriptResult};
use crate::scripting::factory::ScriptObjectFactory;
use crate::scripting::modules;
use rhai::module_resolvers::{FileModuleResolver, ModuleResolversCollection};
use rhai::{Engine, Position, Stmt, Variant, AST};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, trace, warn};

/// Registers native types or functions with a fresh engine
pub type Registration = fn(&mut Engine);

/// Receives the text of script `print` and `debug` calls
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

static RUNTIME_LIVE: AtomicBool = AtomicBool::new(false);

/// Monotonic lifecycle state of a [`ScriptRuntime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Initialized,
    ShuttingDown,
    ShutDown,
}

/// A compiled script module, loaded at most once per runtime
pub(crate) struct ScriptModule {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    /// The module's functions plus its top-level `import` statements
    ///
    /// Calls evaluate the imports first so functions can use them.
    pub(crate) ast: AST,
}

impl ScriptModule {
    /// Parameter counts of every script function called `name`
    pub(crate) fn arities(&self, name: &str) -> Vec<usize> {
        self.ast
            .iter_functions()
            .filter(|function| function.name == name)
            .map(|function| function.params.len())
            .collect()
    }
}

/// State shared by everything created while the runtime is live
pub(crate) struct RuntimeCore {
    pub(crate) engine: Engine,
    config: ScriptConfig,
    modules: RwLock<HashMap<String, Arc<ScriptModule>>>,
    pending_error: Mutex<Option<String>>,
}

impl RuntimeCore {
    fn pending(&self) -> MutexGuard<'_, Option<String>> {
        self.pending_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail if an earlier invocation error has not been cleared
    pub(crate) fn ensure_clear(&self) -> ScriptResult<()> {
        match self.pending().as_ref() {
            Some(message) => Err(ScriptError::ErrorPending(message.clone())),
            None => Ok(()),
        }
    }

    /// Record a sticky invocation error
    pub(crate) fn raise(&self, message: String) {
        let mut pending = self.pending();
        if pending.is_none() {
            *pending = Some(message);
        }
    }

    fn clear(&self) -> Option<String> {
        self.pending().take()
    }

    /// Import a module by dotted name, compiling and running it on first use
    ///
    /// The error is a human-readable reason; callers wrap it in the error kind
    /// that fits their operation.
    pub(crate) fn import(&self, name: &str) -> Result<Arc<ScriptModule>, String> {
        if let Some(module) = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            trace!(module = name, "Module already loaded");
            return Ok(module.clone());
        }

        let path = self.config.locate(name)?;
        debug!(module = name, path = ?path, "Loading script module");

        let mut ast = self.engine.compile_file(path.clone()).map_err(|e| {
            let position = e.position();
            format!(
                "{}:{}:{} - {}",
                path.display(),
                position.line().unwrap_or(0),
                position.position().unwrap_or(0),
                e
            )
        })?;
        ast.set_source(name);

        // Importing a module runs its top-level statements once
        self.engine
            .run_ast(&ast)
            .map_err(|e| format!("error while importing {}: {e}", path.display()))?;

        // Imported modules are cached by the resolvers, so replaying the
        // imports on every call does not run their top level again
        let imports: Vec<Stmt> = ast
            .statements()
            .iter()
            .filter(|statement| matches!(statement, Stmt::Import(..)))
            .cloned()
            .collect();
        trace!(module = name, imports = imports.len(), "Module imports kept for calls");
        let mut callable = AST::new(imports, ast.shared_lib().clone());
        callable.set_source(name);

        let module = Arc::new(ScriptModule {
            name: name.to_string(),
            path,
            ast: callable,
        });
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), module.clone());
        Ok(module)
    }
}

/// Owner of the embedded engine and its module search path
///
/// Only one runtime may be live per process. Dropping an initialized runtime
/// shuts it down.
pub struct ScriptRuntime {
    state: RuntimeState,
    core: Option<Arc<RuntimeCore>>,
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRuntime {
    pub fn new() -> Self {
        Self {
            state: RuntimeState::Uninitialized,
            core: None,
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == RuntimeState::Initialized
    }

    /// Start the engine with the configured search paths
    ///
    /// A no-op when already initialized. Fails after shutdown, or while
    /// another runtime is live in the process.
    pub fn initialize(
        &mut self,
        config: &ScriptConfig,
        registrations: &[Registration],
        output: Option<OutputSink>,
    ) -> ScriptResult<()> {
        match self.state {
            RuntimeState::Initialized => {
                trace!("Script runtime already initialized");
                return Ok(());
            }
            RuntimeState::ShuttingDown | RuntimeState::ShutDown => {
                return Err(ScriptError::Lifecycle(
                    "runtime has been shut down and cannot be re-initialized".to_string(),
                ));
            }
            RuntimeState::Uninitialized => {}
        }

        if config.extension.is_empty() {
            return Err(ScriptError::Config(
                "script extension must not be empty".to_string(),
            ));
        }
        for path in &config.search_paths {
            if !path.is_dir() {
                warn!(path = ?path, "Script search path does not exist");
            }
        }

        if RUNTIME_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ScriptError::Lifecycle(
                "another script runtime is already live in this process".to_string(),
            ));
        }

        let engine = build_engine(config, registrations, output);
        self.core = Some(Arc::new(RuntimeCore {
            engine,
            config: config.clone(),
            modules: RwLock::new(HashMap::new()),
            pending_error: Mutex::new(None),
        }));
        self.state = RuntimeState::Initialized;

        info!(
            search_paths = ?config.search_paths,
            registrations = registrations.len(),
            "Script runtime initialized"
        );
        Ok(())
    }

    /// Finalize the engine
    ///
    /// Callers should release every script object handle first. Handles that
    /// survive are counted and reported; using them afterwards fails with a
    /// lifecycle error. Repeated calls are no-ops.
    pub fn shutdown(&mut self) {
        match self.state {
            RuntimeState::ShutDown | RuntimeState::ShuttingDown => return,
            RuntimeState::Uninitialized => {
                self.state = RuntimeState::ShutDown;
                debug!("Script runtime shut down before initialization");
                return;
            }
            RuntimeState::Initialized => {}
        }

        self.state = RuntimeState::ShuttingDown;
        if let Some(core) = self.core.take() {
            let outstanding = Arc::weak_count(&core);
            if outstanding > 0 {
                warn!(
                    outstanding,
                    "Script objects still alive at runtime shutdown; they can no longer be invoked"
                );
            }
            let modules = core
                .modules
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len();
            debug!(modules, "Dropping script engine");
        }

        RUNTIME_LIVE.store(false, Ordering::Release);

        self.state = RuntimeState::ShutDown;
        info!("Script runtime shut down");
    }

    /// Factory for script objects backed by this runtime
    pub fn factory(&self) -> ScriptResult<ScriptObjectFactory<'_>> {
        Ok(ScriptObjectFactory::new(self.core()?))
    }

    /// Message of the uncleared invocation error, if any
    pub fn pending_error(&self) -> Option<String> {
        self.core
            .as_ref()
            .and_then(|core| core.pending().clone())
    }

    /// Clear the sticky error left by a failed invocation
    ///
    /// Must be called by whoever handles an invocation error before further
    /// script calls are made. Returns the cleared message.
    pub fn clear_error(&self) -> Option<String> {
        let cleared = self.core.as_ref().and_then(|core| core.clear());
        if let Some(message) = &cleared {
            debug!(error = %message, "Cleared script error state");
        }
        cleared
    }

    /// Names of the modules imported so far, sorted
    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .core
            .as_ref()
            .map(|core| {
                core.modules
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .map(|module| module.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Evaluate a standalone expression against the registered API
    pub fn eval<T: Variant + Clone>(&self, script: &str) -> ScriptResult<T> {
        let core = self.core()?;
        core.ensure_clear()?;
        core.engine
            .eval::<T>(script)
            .map_err(|e| ScriptError::Invocation {
                method: "<eval>".to_string(),
                reason: e.to_string(),
            })
    }

    pub(crate) fn core(&self) -> ScriptResult<&Arc<RuntimeCore>> {
        match (&self.state, &self.core) {
            (RuntimeState::Initialized, Some(core)) => Ok(core),
            (state, _) => Err(ScriptError::Lifecycle(format!(
                "runtime is {state:?}"
            ))),
        }
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        if self.state == RuntimeState::Initialized {
            debug!("Script runtime dropped while initialized; shutting down");
            self.shutdown();
        }
    }
}

/// Create an engine with limits, search path and the registered API
fn build_engine(
    config: &ScriptConfig,
    registrations: &[Registration],
    output: Option<OutputSink>,
) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(config.max_expr_depth, config.max_function_expr_depth);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_operations(config.max_operations);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);
    engine.set_max_map_size(config.max_map_size);
    engine.disable_symbol("eval");

    let mut resolvers = ModuleResolversCollection::new();
    for path in &config.search_paths {
        resolvers.push(FileModuleResolver::new_with_path_and_extension(
            path.clone(),
            config.extension.clone(),
        ));
    }
    engine.set_module_resolver(resolvers);

    match output {
        Some(sink) => {
            let debug_sink = sink.clone();
            engine.on_print(move |text| sink(text));
            engine.on_debug(move |text, _source, _position| {
                debug_sink(&format!("[debug] {text}"));
            });
        }
        None => {
            engine.on_print(|text| info!(target: "ecs_script::script", "{text}"));
            engine.on_debug(|text, source, position: Position| {
                debug!(
                    target: "ecs_script::script",
                    source = source.unwrap_or("<unknown>"),
                    line = position.line().unwrap_or(0),
                    "{text}"
                );
            });
        }
    }

    modules::register_all_modules(&mut engine);
    for register in registrations {
        register(&mut engine);
    }

    engine
}
