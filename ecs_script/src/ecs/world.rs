//! Entity manager wrapping `hecs::World` behind a shared handle
//!
//! Entities hand out a non-owning reference back to their manager so that
//! script code holding an [`Entity`] can assign or look up components
//! without keeping the world alive.

use crate::error::EcsError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, trace};

type SharedWorld = Arc<RwLock<hecs::World>>;

fn read_world(world: &RwLock<hecs::World>) -> RwLockReadGuard<'_, hecs::World> {
    world.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_world(world: &RwLock<hecs::World>) -> RwLockWriteGuard<'_, hecs::World> {
    world.write().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle to the component storage of one world
///
/// Guards on the underlying storage are only ever held for the duration of a
/// single operation, never across a call into script code.
#[derive(Clone, Default)]
pub struct EntityManager {
    inner: SharedWorld,
}

impl EntityManager {
    /// Create a new empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new entity without components
    pub fn create(&self) -> Entity {
        let id = write_world(&self.inner).spawn(());
        debug!(entity = id.to_bits().get(), "Created entity");
        Entity::new(id, &self.inner)
    }

    /// Look up a live entity by its raw id
    pub fn get(&self, id: hecs::Entity) -> Option<Entity> {
        read_world(&self.inner)
            .contains(id)
            .then(|| Entity::new(id, &self.inner))
    }

    /// Check if an entity belongs to this manager and is still alive
    pub fn contains(&self, entity: &Entity) -> bool {
        entity.belongs_to(&self.inner) && read_world(&self.inner).contains(entity.id)
    }

    /// Destroy an entity and drop all of its components
    pub fn destroy(&self, entity: &Entity) -> Result<(), EcsError> {
        if !entity.belongs_to(&self.inner) {
            return Err(EcsError::NoSuchEntity(entity.bits()));
        }
        entity.destroy()
    }

    /// Number of live entities
    pub fn len(&self) -> u32 {
        read_world(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every entity carrying `T` together with a clone of the component
    ///
    /// The storage guard is released before this returns, so callers may
    /// freely mutate the world while walking the result.
    pub fn query_cloned<T: hecs::Component + Clone>(&self) -> Vec<(Entity, T)> {
        let world = read_world(&self.inner);
        let mut query = world.query::<&T>();
        let items: Vec<_> = query
            .iter()
            .map(|(id, component)| (Entity::new(id, &self.inner), component.clone()))
            .collect();
        trace!(
            component = std::any::type_name::<T>(),
            count = items.len(),
            "Queried components"
        );
        items
    }
}

/// Handle to one entity
///
/// Holds only a weak reference to its manager; every operation fails with
/// [`EcsError::ManagerDropped`] once the manager is gone.
#[derive(Clone)]
pub struct Entity {
    id: hecs::Entity,
    world: Weak<RwLock<hecs::World>>,
}

impl Entity {
    fn new(id: hecs::Entity, world: &SharedWorld) -> Self {
        Self {
            id,
            world: Arc::downgrade(world),
        }
    }

    /// Raw hecs id
    pub fn id(&self) -> hecs::Entity {
        self.id
    }

    /// Stable integer form of the id
    pub fn bits(&self) -> u64 {
        self.id.to_bits().get()
    }

    /// True while the manager exists and the entity has not been destroyed
    pub fn valid(&self) -> bool {
        self.world
            .upgrade()
            .map(|world| read_world(&world).contains(self.id))
            .unwrap_or(false)
    }

    /// Insert a component, replacing any existing component of the same type
    pub fn assign<T: hecs::Component>(&self, component: T) -> Result<(), EcsError> {
        let world = self.world()?;
        let result = write_world(&world).insert_one(self.id, component);
        result.map_err(|_| EcsError::NoSuchEntity(self.bits()))?;
        trace!(
            entity = self.bits(),
            component = std::any::type_name::<T>(),
            "Assigned component"
        );
        Ok(())
    }

    /// Clone a component out of storage
    ///
    /// Components that are shared handles (such as component wrappers or
    /// script bindings) come back as another handle to the same instance.
    pub fn component<T: hecs::Component + Clone>(&self) -> Option<T> {
        let world = self.world.upgrade()?;
        let world = read_world(&world);
        let component = world.get::<&T>(self.id).ok().map(|c| (*c).clone());
        component
    }

    pub fn has_component<T: hecs::Component>(&self) -> bool {
        match self.world.upgrade() {
            Some(world) => read_world(&world).get::<&T>(self.id).is_ok(),
            None => false,
        }
    }

    /// Remove a component and hand it back to the caller
    pub fn remove<T: hecs::Component>(&self) -> Option<T> {
        let world = self.world.upgrade()?;
        let removed = write_world(&world).remove_one::<T>(self.id).ok();
        removed
    }

    /// Destroy this entity and drop its components
    pub fn destroy(&self) -> Result<(), EcsError> {
        let world = self.world()?;
        let removed = write_world(&world).despawn(self.id);
        removed.map_err(|_| EcsError::NoSuchEntity(self.bits()))?;
        debug!(entity = self.bits(), "Destroyed entity");
        Ok(())
    }

    fn world(&self) -> Result<SharedWorld, EcsError> {
        self.world
            .upgrade()
            .ok_or(EcsError::ManagerDropped(self.bits()))
    }

    fn belongs_to(&self, world: &SharedWorld) -> bool {
        std::ptr::eq(self.world.as_ptr(), Arc::as_ptr(world))
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.world, &other.world)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.world.as_ptr().hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({:?})", self.id)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.bits())
    }
}
