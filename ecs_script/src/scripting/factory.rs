//! Instantiates script classes for entities

use crate::ecs::Entity;
use crate::error::{ScriptError, ScriptResult};
use crate::scripting::object::ScriptObject;
use crate::scripting::runtime::RuntimeCore;
use rhai::{CallFnOptions, Dynamic, Scope};
use std::sync::Arc;
use tracing::debug;

/// Resolves `module.class` pairs through a live runtime
///
/// The factory keeps nothing; every handle it returns is owned by the caller.
pub struct ScriptObjectFactory<'a> {
    core: &'a Arc<RuntimeCore>,
}

impl<'a> ScriptObjectFactory<'a> {
    pub(crate) fn new(core: &'a Arc<RuntimeCore>) -> Self {
        Self { core }
    }

    /// Construct `class` from `module` for `entity`
    ///
    /// The constructor receives the entity followed by `args`.
    pub fn create(
        &self,
        module: &str,
        class: &str,
        entity: &Entity,
        args: Vec<Dynamic>,
    ) -> ScriptResult<ScriptObject> {
        let resolution = |reason: String| ScriptError::Resolution {
            module: module.to_string(),
            class: class.to_string(),
            reason,
        };
        let construction = |reason: String| ScriptError::Construction {
            module: module.to_string(),
            class: class.to_string(),
            reason,
        };

        self.core.ensure_clear()?;

        let script = self.core.import(module).map_err(resolution)?;

        let arities = script.arities(class);
        if arities.is_empty() {
            return Err(resolution(format!(
                "no class '{class}' in {}",
                script.path.display()
            )));
        }

        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(Dynamic::from(entity.clone()));
        call_args.extend(args);

        if !arities.contains(&call_args.len()) {
            return Err(construction(format!(
                "constructor takes {arities:?} arguments including the entity, got {}",
                call_args.len()
            )));
        }

        // Evaluating the AST first runs the module's top-level imports
        let options = CallFnOptions::new().eval_ast(true).rewind_scope(true);
        let instance = self
            .core
            .engine
            .call_fn_with_options::<Dynamic>(
                options,
                &mut Scope::new(),
                &script.ast,
                class,
                call_args,
            )
            .map_err(|e| construction(e.to_string()))?;

        if !instance.is_map() {
            return Err(construction(format!(
                "constructor returned {} instead of an object map",
                instance.type_name()
            )));
        }

        debug!(
            module,
            class,
            entity = entity.bits(),
            "Created script object"
        );
        Ok(ScriptObject::new(script, class, instance, self.core))
    }
}
