//! Shared handles to script-side object instances

use crate::error::{ScriptError, ScriptResult};
use crate::scripting::runtime::{RuntimeCore, ScriptModule};
use rhai::{CallFnOptions, Dynamic, DynamicReadLock, FnPtr, Map, Scope, Variant};
use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

struct ObjectInner {
    module: Arc<ScriptModule>,
    class: String,
    /// Shared object map; clones refer to the same instance
    instance: Dynamic,
    runtime: Weak<RuntimeCore>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        trace!(
            module = %self.module.name,
            class = %self.class,
            "Released script object"
        );
    }
}

/// Reference-counted handle to one script object
///
/// Cloning shares the instance. The instance is released exactly once, when
/// the last handle is dropped. Handles only keep a weak reference to the
/// runtime, so using one after shutdown is a lifecycle error.
///
/// No lock is held while a method runs, so script code may call back into
/// the same object, for example through an event it emits.
#[derive(Clone)]
pub struct ScriptObject {
    inner: Arc<ObjectInner>,
}

/// Non-owning handle to a [`ScriptObject`]
#[derive(Clone)]
pub struct WeakScriptObject {
    inner: Weak<ObjectInner>,
}

impl WeakScriptObject {
    pub fn upgrade(&self) -> Option<ScriptObject> {
        self.inner.upgrade().map(|inner| ScriptObject { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl ScriptObject {
    pub(crate) fn new(
        module: Arc<ScriptModule>,
        class: &str,
        instance: Dynamic,
        runtime: &Arc<RuntimeCore>,
    ) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                module,
                class: class.to_string(),
                instance: instance.into_shared(),
                runtime: Arc::downgrade(runtime),
            }),
        }
    }

    /// Dotted name of the module the class came from
    pub fn module(&self) -> &str {
        &self.inner.module.name
    }

    pub fn class(&self) -> &str {
        &self.inner.class
    }

    pub fn downgrade(&self) -> WeakScriptObject {
        WeakScriptObject {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// True if both handles refer to the same instance
    pub fn ptr_eq(&self, other: &ScriptObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to this instance
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// True while the runtime that created this object is live
    pub fn is_live(&self) -> bool {
        self.inner.runtime.strong_count() > 0
    }

    fn runtime(&self) -> ScriptResult<Arc<RuntimeCore>> {
        self.inner.runtime.upgrade().ok_or_else(|| {
            ScriptError::Lifecycle(format!(
                "{}.{} outlived the script runtime",
                self.module(),
                self.class()
            ))
        })
    }

    /// Read access to the object map
    ///
    /// Fails if the lock is poisoned or script code replaced `this` with a
    /// value that is not a map.
    fn fields(&self, name: &str) -> ScriptResult<DynamicReadLock<'_, Map>> {
        self.inner
            .instance
            .read_lock::<Map>()
            .ok_or_else(|| ScriptError::Busy {
                method: name.to_string(),
            })
    }

    /// Callable stored under `name`, if the object has one
    fn method(&self, name: &str) -> ScriptResult<Option<FnPtr>> {
        Ok(self
            .fields(name)?
            .get(name)
            .and_then(|value| value.clone().try_cast::<FnPtr>()))
    }

    /// Check for a method without calling it
    ///
    /// Attributes that exist but are not callable count as absent.
    pub fn has_method(&self, name: &str) -> ScriptResult<bool> {
        self.runtime()?;
        Ok(self.method(name)?.is_some())
    }

    /// Call an optional hook
    ///
    /// Returns `Ok(None)` without touching the runtime when the object has no
    /// such method. A failure inside the script sets the runtime's sticky
    /// error state.
    pub fn call_method(&self, name: &str, args: Vec<Dynamic>) -> ScriptResult<Option<Dynamic>> {
        let runtime = self.runtime()?;
        let Some(method) = self.method(name)? else {
            trace!(class = self.class(), method = name, "No such hook, skipping");
            return Ok(None);
        };
        runtime.ensure_clear()?;
        self.call(&runtime, name, &method, args).map(Some)
    }

    /// Call a method the object is required to have
    pub fn invoke(&self, name: &str, args: Vec<Dynamic>) -> ScriptResult<Dynamic> {
        self.call_method(name, args)?
            .ok_or_else(|| ScriptError::Invocation {
                method: name.to_string(),
                reason: format!("{}.{} has no method '{name}'", self.module(), self.class()),
            })
    }

    fn call(
        &self,
        runtime: &RuntimeCore,
        name: &str,
        method: &FnPtr,
        args: Vec<Dynamic>,
    ) -> ScriptResult<Dynamic> {
        trace!(
            module = self.module(),
            class = self.class(),
            method = name,
            "Invoking script method"
        );

        let mut call_args: Vec<Dynamic> = method.curry().to_vec();
        call_args.extend(args);

        // Binding a clone of the shared map lets the method mutate the instance
        let mut this = self.inner.instance.clone();
        let options = CallFnOptions::new()
            .eval_ast(true)
            .rewind_scope(true)
            .bind_this_ptr(&mut this);

        runtime
            .engine
            .call_fn_with_options::<Dynamic>(
                options,
                &mut Scope::new(),
                &self.inner.module.ast,
                method.fn_name(),
                call_args,
            )
            .map_err(|e| {
                let reason = e.to_string();
                warn!(
                    module = self.module(),
                    class = self.class(),
                    method = name,
                    error = %reason,
                    "Script method failed"
                );
                runtime.raise(format!("{}.{}.{name}: {reason}", self.module(), self.class()));
                ScriptError::Invocation {
                    method: name.to_string(),
                    reason,
                }
            })
    }

    /// Read an attribute declared by the object
    pub fn attr(&self, name: &str) -> ScriptResult<Dynamic> {
        self.runtime()?;
        let value = self.fields(name)?.get(name).cloned();
        value.ok_or_else(|| ScriptError::MissingAttribute {
            attribute: name.to_string(),
        })
    }

    /// Read an attribute and convert it to a native type
    pub fn get<T: Variant + Clone>(&self, name: &str) -> ScriptResult<T> {
        let value = self.attr(name)?;
        let found = value.type_name().to_string();
        value
            .try_cast::<T>()
            .ok_or_else(|| ScriptError::AttributeType {
                attribute: name.to_string(),
                expected: type_name::<T>(),
                found,
            })
    }

    /// Overwrite an attribute the object already declares
    pub fn set_attr(&self, name: &str, value: impl Into<Dynamic>) -> ScriptResult<()> {
        self.runtime()?;
        let mut instance = self.inner.instance.clone();
        let mut map = instance
            .write_lock::<Map>()
            .ok_or_else(|| ScriptError::Busy {
                method: name.to_string(),
            })?;
        match map.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(ScriptError::MissingAttribute {
                attribute: name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptObject")
            .field("module", &self.module())
            .field("class", &self.class())
            .field("handles", &self.strong_count())
            .finish()
    }
}
