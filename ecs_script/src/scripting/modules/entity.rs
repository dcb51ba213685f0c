//! Entity handles as seen by scripts

use crate::ecs::Entity;
use rhai::{Engine, EvalAltResult, INT};
use tracing::debug;

/// Register the `Entity` type with Rhai
pub fn register_entity_api(engine: &mut Engine) {
    debug!("Registering entity API");

    engine
        .register_type_with_name::<Entity>("Entity")
        .register_get("id", |e: &mut Entity| e.bits() as INT)
        .register_get("valid", |e: &mut Entity| e.valid())
        .register_fn("==", |a: &mut Entity, b: Entity| *a == b)
        .register_fn("!=", |a: &mut Entity, b: Entity| *a != b)
        .register_fn("to_string", |e: &mut Entity| e.to_string())
        .register_fn("to_debug", |e: &mut Entity| format!("{e:?}"))
        .register_fn(
            "destroy",
            |e: &mut Entity| -> Result<(), Box<EvalAltResult>> {
                e.destroy().map_err(|err| err.to_string().into())
            },
        );
}
