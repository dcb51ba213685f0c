//! Scripting bridge using Rhai
//!
//! Entities opt into scripting by carrying a [`ScriptBinding`], which owns a
//! shared handle to an object created from a script class. The
//! [`ScriptSystem`] calls each object's optional `update` hook once per frame
//! and [`EventProxy`] registrations route native events to handler methods.

pub mod binding;
pub mod component;
pub mod factory;
pub mod modules;
pub mod object;
pub mod proxy;
pub mod runtime;
pub mod system;

pub use binding::ScriptBinding;
pub use component::{
    register_component, register_event, ComponentWrapper, ScriptComponent, ScriptEvent,
    ScriptValue,
};
pub use factory::ScriptObjectFactory;
pub use object::{ScriptObject, WeakScriptObject};
pub use proxy::{event_proxy, EventProxy, FnEventProxy};
pub use runtime::{OutputSink, Registration, RuntimeState, ScriptRuntime};
pub use system::ScriptSystem;

// Re-export commonly used types
pub use rhai::{Dynamic, EvalAltResult};

#[cfg(test)]
mod tests;
