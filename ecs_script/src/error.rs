//! Error types for the scripting bridge

use thiserror::Error;

/// Errors raised by the entity/event layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcsError {
    #[error("entity {0} does not exist")]
    NoSuchEntity(u64),

    #[error("entity manager for entity {0} has been dropped")]
    ManagerDropped(u64),
}

/// Errors raised while binding, constructing or invoking script objects
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The module or the class inside it could not be found
    #[error("cannot resolve {module}.{class}: {reason}")]
    Resolution {
        module: String,
        class: String,
        reason: String,
    },

    /// The class was found but constructing an instance failed
    #[error("cannot construct {module}.{class}: {reason}")]
    Construction {
        module: String,
        class: String,
        reason: String,
    },

    /// A hook or event handler raised while executing
    #[error("script method '{method}' failed: {reason}")]
    Invocation { method: String, reason: String },

    /// The object's map could not be locked, or no longer holds a map
    #[error("script object unavailable for '{method}'")]
    Busy { method: String },

    /// The runtime is not in a state that allows the operation
    #[error("script runtime unavailable: {0}")]
    Lifecycle(String),

    /// A previous invocation error has not been cleared
    #[error("script runtime has an uncleared error: {0}")]
    ErrorPending(String),

    /// Native code touched an attribute the script object never declared
    #[error("script object has no attribute '{attribute}'")]
    MissingAttribute { attribute: String },

    /// Native code read an attribute as the wrong type
    #[error("attribute '{attribute}' is {found}, expected {expected}")]
    AttributeType {
        attribute: String,
        expected: &'static str,
        found: String,
    },

    #[error(transparent)]
    Ecs(#[from] EcsError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    /// True for failures raised while running script code
    pub fn is_invocation(&self) -> bool {
        matches!(self, ScriptError::Invocation { .. } | ScriptError::Busy { .. })
    }
}

/// Result alias used throughout the crate
pub type ScriptResult<T> = Result<T, ScriptError>;
