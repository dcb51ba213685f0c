//! Entity, event and system primitives the scripting layer is built on
//!
//! A thin handle-based layer over hecs: entities know their manager, so
//! native and script code can assign and look up components from anywhere.

pub mod event;
pub mod system;
pub mod world;

pub use event::{Event, EventManager, Receiver, SubscriptionId};
pub use system::System;
pub use world::{Entity, EntityManager};
