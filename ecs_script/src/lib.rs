//! Script bindings for an entity-component-event framework
//!
//! This crate lets entities carry behavior written in Rhai scripts, shares
//! native components with script code, and routes native events to handler
//! methods on script objects.

extern crate self as ecs_script;

pub mod config;
pub mod ecs;
pub mod error;
pub mod scripting;

pub use ecs_script_derive::{ScriptComponent, ScriptEvent};
pub use rhai;
pub use scripting::{ScriptComponent, ScriptEvent, ScriptValue};

// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ScriptConfig;

    pub use crate::ecs::{Entity, EntityManager, Event, EventManager, Receiver, System};

    pub use crate::error::{EcsError, ScriptError, ScriptResult};

    pub use crate::scripting::{
        event_proxy, ComponentWrapper, EventProxy, ScriptBinding, ScriptComponent, ScriptEvent,
        ScriptObject, ScriptSystem, ScriptValue,
    };

    pub use ecs_script_derive::{ScriptComponent, ScriptEvent};

    pub use rhai::Dynamic;
}

/// Initialize logging for applications embedding the script system
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
