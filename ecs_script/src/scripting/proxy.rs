//! Routes native events to handler methods on script objects

use crate::ecs::{Entity, Event, Receiver};
use crate::error::ScriptResult;
use crate::scripting::binding::ScriptBinding;
use rhai::Dynamic;
use std::marker::PhantomData;
use tracing::trace;

/// Describes how one event type reaches scripts
pub trait EventProxy<E: Event>: Send + Sync + 'static {
    /// Method called on each implicated script object
    fn handler(&self) -> &str;

    /// Entities the event concerns, in dispatch order
    fn implicated(&self, event: &E) -> Vec<Entity>;

    /// Value passed to the handler
    ///
    /// Defaults to the event itself, which scripts can read once its type has
    /// been exposed.
    fn script_event(&self, event: &E) -> Dynamic {
        Dynamic::from(event.clone())
    }
}

/// Event proxy built from a closure selecting the implicated entities
pub struct FnEventProxy<E, F> {
    handler: String,
    selector: F,
    _event: PhantomData<fn(&E)>,
}

/// Create a proxy calling `handler` on every entity `selector` names
pub fn event_proxy<E, F>(handler: impl Into<String>, selector: F) -> FnEventProxy<E, F>
where
    E: Event,
    F: Fn(&E) -> Vec<Entity> + Send + Sync + 'static,
{
    FnEventProxy {
        handler: handler.into(),
        selector,
        _event: PhantomData,
    }
}

impl<E, F> EventProxy<E> for FnEventProxy<E, F>
where
    E: Event,
    F: Fn(&E) -> Vec<Entity> + Send + Sync + 'static,
{
    fn handler(&self) -> &str {
        &self.handler
    }

    fn implicated(&self, event: &E) -> Vec<Entity> {
        (self.selector)(event)
    }
}

/// Bus receiver that dispatches one event type through a proxy
pub(crate) struct ProxyReceiver<P> {
    proxy: P,
}

impl<P> ProxyReceiver<P> {
    pub(crate) fn new(proxy: P) -> Self {
        Self { proxy }
    }
}

impl<E, P> Receiver<E> for ProxyReceiver<P>
where
    E: Event,
    P: EventProxy<E>,
{
    fn receive(&self, event: &E) -> ScriptResult<()> {
        let mut implicated = self.proxy.implicated(event);
        let mut seen = Vec::with_capacity(implicated.len());
        implicated.retain(|entity| {
            if seen.contains(entity) {
                false
            } else {
                seen.push(entity.clone());
                true
            }
        });

        let handler = self.proxy.handler();
        trace!(
            event = std::any::type_name::<E>(),
            handler,
            implicated = implicated.len(),
            "Dispatching event to scripts"
        );

        let mut script_event = None;
        for entity in implicated {
            // Unbound or destroyed entities are skipped
            let Some(binding) = entity.component::<ScriptBinding>() else {
                continue;
            };
            let object = binding.object();
            if !object.has_method(handler)? {
                continue;
            }
            let value = script_event
                .get_or_insert_with(|| self.proxy.script_event(event))
                .clone();
            object.call_method(handler, vec![value])?;
        }
        Ok(())
    }
}
