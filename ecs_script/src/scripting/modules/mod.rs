//! Rhai modules exposing the core API to scripts

pub mod entity;

use rhai::Engine;
use tracing::debug;

/// Register the API every script can rely on
pub fn register_all_modules(engine: &mut Engine) {
    debug!("Registering scripting modules");

    entity::register_entity_api(engine);

    debug!("All scripting modules registered");
}
