//! Synchronous, type-keyed event bus
//!
//! Receivers are invoked at `emit` time, in subscription order, on the
//! emitting thread. The registry lock is released before any receiver runs,
//! so receivers may emit further events or change subscriptions.

use crate::error::ScriptResult;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Marker for types that can travel over the bus
pub trait Event: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Event for T {}

/// Something that wants to hear about every emission of `E`
pub trait Receiver<E: Event>: Send + Sync {
    fn receive(&self, event: &E) -> ScriptResult<()>;
}

impl<E, F> Receiver<E> for F
where
    E: Event,
    F: Fn(&E) -> ScriptResult<()> + Send + Sync,
{
    fn receive(&self, event: &E) -> ScriptResult<()> {
        self(event)
    }
}

/// Token returned by [`EventManager::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// Holds an `Arc<dyn Receiver<E>>` for the event type it is filed under
    receiver: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscriptions: HashMap<TypeId, Vec<Subscription>>,
}

/// Cloneable handle to one event bus
#[derive(Clone, Default)]
pub struct EventManager {
    inner: Arc<Mutex<Registry>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `receiver` for every future emission of `E`
    pub fn subscribe<E, R>(&self, receiver: Arc<R>) -> SubscriptionId
    where
        E: Event,
        R: Receiver<E> + 'static,
    {
        let receiver: Arc<dyn Receiver<E>> = receiver;
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .subscriptions
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscription {
                id,
                receiver: Box::new(receiver),
            });
        debug!(event = type_name::<E>(), id = id.0, "Subscribed receiver");
        id
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry();
        let mut removed = false;
        for subscriptions in registry.subscriptions.values_mut() {
            let before = subscriptions.len();
            subscriptions.retain(|subscription| subscription.id != id);
            removed |= subscriptions.len() != before;
        }
        if removed {
            debug!(id = id.0, "Unsubscribed receiver");
        }
        removed
    }

    /// Number of receivers currently subscribed to `E`
    pub fn receiver_count<E: Event>(&self) -> usize {
        self.registry()
            .subscriptions
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every receiver of `E` before returning
    ///
    /// The first receiver error aborts delivery to the remaining receivers
    /// and is returned to the caller.
    pub fn emit<E: Event>(&self, event: E) -> ScriptResult<()> {
        let receivers: Vec<Arc<dyn Receiver<E>>> = self
            .registry()
            .subscriptions
            .get(&TypeId::of::<E>())
            .map(|subscriptions| {
                subscriptions
                    .iter()
                    .filter_map(|subscription| {
                        subscription
                            .receiver
                            .downcast_ref::<Arc<dyn Receiver<E>>>()
                            .cloned()
                    })
                    .collect()
            })
            .unwrap_or_default();

        trace!(
            event = type_name::<E>(),
            receivers = receivers.len(),
            "Emitting event"
        );

        for receiver in receivers {
            receiver.receive(&event)?;
        }
        Ok(())
    }
}
