//! Component tying an entity to its script object

use crate::ecs::Entity;
use crate::scripting::object::ScriptObject;
use rhai::Dynamic;

/// Marks an entity as scripted
///
/// Cloning a binding shares the underlying script object. Each entity carries
/// at most one binding; assigning a new one replaces the old.
#[derive(Debug, Clone)]
pub struct ScriptBinding {
    entity: Entity,
    module: String,
    class: String,
    args: Vec<Dynamic>,
    object: ScriptObject,
    serial: u64,
}

impl ScriptBinding {
    pub(crate) fn new(
        entity: Entity,
        module: &str,
        class: &str,
        args: Vec<Dynamic>,
        object: ScriptObject,
        serial: u64,
    ) -> Self {
        Self {
            entity,
            module: module.to_string(),
            class: class.to_string(),
            args,
            object,
            serial,
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Extra constructor arguments, excluding the entity
    pub fn args(&self) -> &[Dynamic] {
        &self.args
    }

    pub fn object(&self) -> &ScriptObject {
        &self.object
    }

    /// Creation order among all bindings made by one system
    pub fn serial(&self) -> u64 {
        self.serial
    }
}
