//! Native components and events shared with scripts
//!
//! A [`ComponentWrapper`] is the one instance both sides talk to: script code
//! that constructs `Position(1.0, 2.0)` and calls `assign_to(entity)` puts the
//! same shared instance into entity storage that native lookups return, and
//! `Position::get_component(entity)` hands scripts back that instance.

use crate::ecs::Entity;
use rhai::{Dynamic, Engine, EvalAltResult, Module, Variant, FLOAT, INT};
use std::any::type_name;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// Shared, lockable handle to a component instance
pub struct ComponentWrapper<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for ComponentWrapper<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Default> Default for ComponentWrapper<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for ComponentWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentWrapper").field(&*self.read()).finish()
    }
}

impl<T> ComponentWrapper<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// True if both handles refer to the same instance
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<T: Clone> ComponentWrapper<T> {
    /// Copy of the current value
    pub fn get(&self) -> T {
        self.read().clone()
    }
}

/// Conversion between a native field type and its script representation
pub trait ScriptValue: Sized {
    type Script: Variant + Clone;

    fn to_script(&self) -> Self::Script;
    fn from_script(value: Self::Script) -> Self;

    /// Convert an untyped script value, as passed to constructors and setters
    fn from_dynamic(value: Dynamic) -> Result<Self, String> {
        let found = value.type_name();
        value
            .try_cast::<Self::Script>()
            .map(Self::from_script)
            .ok_or_else(|| format!("expected {}, found {found}", type_name::<Self::Script>()))
    }
}

macro_rules! script_float {
    ($($ty:ty),*) => {$(
        impl ScriptValue for $ty {
            type Script = FLOAT;

            fn to_script(&self) -> FLOAT {
                *self as FLOAT
            }

            fn from_script(value: FLOAT) -> Self {
                value as $ty
            }

            // Integer literals are accepted wherever a float is expected
            fn from_dynamic(value: Dynamic) -> Result<Self, String> {
                value
                    .as_float()
                    .or_else(|_| value.as_int().map(|int| int as FLOAT))
                    .map(Self::from_script)
                    .map_err(|found| format!("expected a number, found {found}"))
            }
        }
    )*};
}

macro_rules! script_int {
    ($($ty:ty),*) => {$(
        impl ScriptValue for $ty {
            type Script = INT;

            fn to_script(&self) -> INT {
                *self as INT
            }

            fn from_script(value: INT) -> Self {
                value as $ty
            }
        }
    )*};
}

script_float!(f32, f64);
script_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

macro_rules! script_identity {
    ($($ty:ty),*) => {$(
        impl ScriptValue for $ty {
            type Script = $ty;

            fn to_script(&self) -> $ty {
                self.clone()
            }

            fn from_script(value: $ty) -> Self {
                value
            }
        }
    )*};
}

script_identity!(bool, String, Entity, Dynamic);

/// A component type scripts can construct, read and write
///
/// Normally implemented with `#[derive(ScriptComponent)]`.
pub trait ScriptComponent: Default + fmt::Debug + Send + Sync + 'static {
    /// Class name seen by scripts
    const SCRIPT_NAME: &'static str;

    /// Register constructors and field accessors for `ComponentWrapper<Self>`
    fn register_fields(engine: &mut Engine);
}

/// An event payload type scripts can read
///
/// Normally implemented with `#[derive(ScriptEvent)]`.
pub trait ScriptEvent: Clone + fmt::Debug + Send + Sync + 'static {
    const SCRIPT_NAME: &'static str;

    /// Register read-only field accessors
    fn register_fields(engine: &mut Engine);
}

/// Expose `T` to scripts as a shared component class
pub fn register_component<T: ScriptComponent>(engine: &mut Engine) {
    debug!(component = T::SCRIPT_NAME, "Registering script component");

    engine
        .register_type_with_name::<ComponentWrapper<T>>(T::SCRIPT_NAME)
        .register_fn(
            "assign_to",
            |component: &mut ComponentWrapper<T>,
             entity: Entity|
             -> Result<(), Box<EvalAltResult>> {
                if let Err(e) = entity.assign(component.clone()) {
                    return Err(format!("cannot assign {} to {entity}: {e}", T::SCRIPT_NAME).into());
                }
                trace!(
                    component = T::SCRIPT_NAME,
                    entity = entity.bits(),
                    "Assigned from script"
                );
                Ok(())
            },
        )
        .register_fn(
            "==",
            |a: &mut ComponentWrapper<T>, b: ComponentWrapper<T>| a.ptr_eq(&b),
        )
        .register_fn(
            "!=",
            |a: &mut ComponentWrapper<T>, b: ComponentWrapper<T>| !a.ptr_eq(&b),
        )
        .register_fn("to_string", |component: &mut ComponentWrapper<T>| {
            format!("{:?}", *component.read())
        })
        .register_fn("to_debug", |component: &mut ComponentWrapper<T>| {
            format!("{:?}", *component.read())
        });

    let mut module = Module::new();
    module.set_native_fn(
        "get_component",
        |entity: Entity| -> Result<Dynamic, Box<EvalAltResult>> {
            Ok(entity
                .component::<ComponentWrapper<T>>()
                .map(Dynamic::from)
                .unwrap_or(Dynamic::UNIT))
        },
    );
    module.set_native_fn(
        "has_component",
        |entity: Entity| -> Result<bool, Box<EvalAltResult>> {
            Ok(entity.has_component::<ComponentWrapper<T>>())
        },
    );
    engine.register_static_module(T::SCRIPT_NAME, module.into());

    T::register_fields(engine);
}

/// Expose `E` to scripts as a read-only event class
pub fn register_event<E: ScriptEvent>(engine: &mut Engine) {
    debug!(event = E::SCRIPT_NAME, "Registering script event");

    engine
        .register_type_with_name::<E>(E::SCRIPT_NAME)
        .register_fn("to_string", |event: &mut E| format!("{event:?}"))
        .register_fn("to_debug", |event: &mut E| format!("{event:?}"));

    E::register_fields(engine);
}
