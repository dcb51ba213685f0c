//! System driving script objects bound to entities

use crate::config::ScriptConfig;
use crate::ecs::{Entity, EntityManager, Event, EventManager, SubscriptionId, System};
use crate::error::{ScriptError, ScriptResult};
use crate::scripting::binding::ScriptBinding;
use crate::scripting::component::{register_component, register_event, ScriptComponent, ScriptEvent};
use crate::scripting::object::WeakScriptObject;
use crate::scripting::proxy::{EventProxy, ProxyReceiver};
use crate::scripting::runtime::{OutputSink, Registration, RuntimeState, ScriptRuntime};
use rhai::Dynamic;
use std::any::type_name;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

struct ProxyRegistration {
    event: &'static str,
    handler: String,
    events: EventManager,
    subscription: SubscriptionId,
}

/// Owns the script runtime and calls into every bound script object
///
/// Each frame, `update` calls the optional `update(dt)` method of every
/// entity's script object in the order the bindings were created. Event
/// proxies added with [`ScriptSystem::add_event_proxy`] forward native events
/// to handler methods.
pub struct ScriptSystem {
    config: ScriptConfig,
    runtime: ScriptRuntime,
    registrations: Vec<Registration>,
    output: Option<OutputSink>,
    proxies: Vec<ProxyRegistration>,
    tracked: Vec<WeakScriptObject>,
    next_serial: u64,
}

impl ScriptSystem {
    pub fn new(config: ScriptConfig) -> Self {
        debug!(search_paths = ?config.search_paths, "Creating script system");
        Self {
            config,
            runtime: ScriptRuntime::new(),
            registrations: Vec::new(),
            output: None,
            proxies: Vec::new(),
            tracked: Vec::new(),
            next_serial: 0,
        }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn runtime(&self) -> &ScriptRuntime {
        &self.runtime
    }

    pub fn is_configured(&self) -> bool {
        self.runtime.is_initialized()
    }

    fn ensure_unconfigured(&self, what: &str) -> ScriptResult<()> {
        match self.runtime.state() {
            RuntimeState::Uninitialized => Ok(()),
            state => Err(ScriptError::Lifecycle(format!(
                "{what} must happen before configure (runtime is {state:?})"
            ))),
        }
    }

    /// Append a module search path
    pub fn add_path(&mut self, path: impl Into<PathBuf>) -> ScriptResult<()> {
        self.ensure_unconfigured("adding a search path")?;
        let path = path.into();
        debug!(path = ?path, "Added script search path");
        self.config.search_paths.push(path);
        Ok(())
    }

    /// Make `T` constructible and assignable from scripts
    pub fn expose_component<T: ScriptComponent>(&mut self) -> ScriptResult<()> {
        self.ensure_unconfigured("exposing a component")?;
        self.registrations.push(register_component::<T>);
        Ok(())
    }

    /// Make `E` readable from scripts, typically as a handler argument
    pub fn expose_event<E: ScriptEvent>(&mut self) -> ScriptResult<()> {
        self.ensure_unconfigured("exposing an event")?;
        self.registrations.push(register_event::<E>);
        Ok(())
    }

    /// Send script `print` and `debug` output to `sink` instead of the log
    pub fn log_to<F>(&mut self, sink: F) -> ScriptResult<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.ensure_unconfigured("installing an output sink")?;
        self.output = Some(Arc::new(sink));
        Ok(())
    }

    /// Forward every `E` emitted on `events` to script handlers
    ///
    /// May be called before or after configure. The subscription lasts until
    /// shutdown.
    pub fn add_event_proxy<E, P>(&mut self, events: &EventManager, proxy: P) -> ScriptResult<SubscriptionId>
    where
        E: Event,
        P: EventProxy<E>,
    {
        if matches!(
            self.runtime.state(),
            RuntimeState::ShuttingDown | RuntimeState::ShutDown
        ) {
            return Err(ScriptError::Lifecycle(
                "cannot add an event proxy after shutdown".to_string(),
            ));
        }

        let handler = proxy.handler().to_string();
        let subscription = events.subscribe::<E, _>(Arc::new(ProxyReceiver::new(proxy)));
        debug!(event = type_name::<E>(), handler = %handler, "Added event proxy");
        self.proxies.push(ProxyRegistration {
            event: type_name::<E>(),
            handler,
            events: events.clone(),
            subscription,
        });
        Ok(subscription)
    }

    /// Create `module.class` for `entity` and install it as the entity's binding
    ///
    /// Any previous binding on the entity is replaced. Nothing is installed
    /// when resolution or construction fails.
    pub fn assign(
        &mut self,
        entity: &Entity,
        module: &str,
        class: &str,
        args: Vec<Dynamic>,
    ) -> ScriptResult<ScriptBinding> {
        let object = self
            .runtime
            .factory()?
            .create(module, class, entity, args.clone())?;

        let binding = ScriptBinding::new(
            entity.clone(),
            module,
            class,
            args,
            object.clone(),
            self.next_serial,
        );
        entity.assign(binding.clone())?;
        self.next_serial += 1;

        self.tracked.retain(WeakScriptObject::is_alive);
        self.tracked.push(object.downgrade());

        debug!(
            entity = entity.bits(),
            module,
            class,
            serial = binding.serial(),
            "Assigned script binding"
        );
        Ok(binding)
    }

    /// Message of the uncleared invocation error, if any
    pub fn pending_error(&self) -> Option<String> {
        self.runtime.pending_error()
    }

    /// Acknowledge an invocation error so scripts can run again
    pub fn clear_error(&self) -> Option<String> {
        self.runtime.clear_error()
    }

    /// Script objects created by this system that are still alive
    pub fn live_objects(&self) -> usize {
        self.tracked.iter().filter(|object| object.is_alive()).count()
    }

    /// Unsubscribe proxies, release tracked handles and stop the runtime
    pub fn shutdown(&mut self) {
        if self.runtime.state() == RuntimeState::ShutDown && self.proxies.is_empty() {
            return;
        }

        for proxy in self.proxies.drain(..) {
            if proxy.events.unsubscribe(proxy.subscription) {
                debug!(
                    event = proxy.event,
                    handler = %proxy.handler,
                    "Unsubscribed event proxy"
                );
            }
        }

        let survivors = self.live_objects();
        if survivors > 0 {
            warn!(
                survivors,
                "Script objects still referenced at shutdown; release bindings before shutting down"
            );
        }
        self.tracked.clear();

        self.runtime.shutdown();
        info!("Script system shut down");
    }
}

impl System for ScriptSystem {
    fn configure(&mut self, _events: &EventManager) -> ScriptResult<()> {
        if self.runtime.is_initialized() {
            return Ok(());
        }
        self.runtime
            .initialize(&self.config, &self.registrations, self.output.clone())?;
        info!(
            registrations = self.registrations.len(),
            proxies = self.proxies.len(),
            "Script system configured"
        );
        Ok(())
    }

    fn update(&mut self, entities: &EntityManager, _events: &EventManager, dt: f64) -> ScriptResult<()> {
        if !self.runtime.is_initialized() {
            return Err(ScriptError::Lifecycle(format!(
                "script system updated while runtime is {:?}",
                self.runtime.state()
            )));
        }

        let mut bindings = entities.query_cloned::<ScriptBinding>();
        bindings.sort_by_key(|(_, binding)| binding.serial());
        trace!(count = bindings.len(), dt, "Updating script objects");

        for (entity, _) in bindings {
            // An earlier hook this frame may have replaced or removed the binding
            let Some(binding) = entity.component::<ScriptBinding>() else {
                continue;
            };
            binding
                .object()
                .call_method("update", vec![Dynamic::from(dt)])?;
        }
        Ok(())
    }
}

impl Drop for ScriptSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
