//! Frame-driven system interface

use crate::ecs::event::EventManager;
use crate::ecs::world::EntityManager;
use crate::error::ScriptResult;

/// A unit of per-frame logic driven by the application loop
pub trait System {
    /// One-time setup; called before the first update
    fn configure(&mut self, _events: &EventManager) -> ScriptResult<()> {
        Ok(())
    }

    /// Advance the system by `dt` seconds
    fn update(
        &mut self,
        entities: &EntityManager,
        events: &EventManager,
        dt: f64,
    ) -> ScriptResult<()>;
}
