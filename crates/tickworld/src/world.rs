//! The world: objects, systems and error routing.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use tracing::{debug, error};

use crate::component::Bundle;
use crate::entity::{Entity, EntityAllocator};
use crate::error::WorldError;
use crate::object::{Object, ObjectRef};
use crate::param::ArgValue;
use crate::system::System;

/// Point-in-time list of a world's objects.
pub(crate) type Snapshot = Arc<Vec<ObjectRef>>;

type ErrorHandler = dyn Fn(&str, &[ArgValue], &anyhow::Error) + Send + Sync;

struct WorldInner {
    allocator: EntityAllocator,
    objects: RwLock<Snapshot>,
    index: DashMap<Entity, ObjectRef>,
    systems: RwLock<Vec<Arc<System>>>,
    on_error: RwLock<Option<Arc<ErrorHandler>>>,
}

/// A collection of objects and the systems that run over them.
///
/// `World` is a handle: clones share the same objects and systems, and a
/// system receiving a `World` parameter gets such a clone.
#[derive(Clone)]
pub struct World {
    inner: Arc<WorldInner>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl World {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(WorldInner {
                allocator: EntityAllocator::new(),
                objects: RwLock::new(Arc::new(Vec::new())),
                index: DashMap::new(),
                systems: RwLock::new(Vec::new()),
                on_error: RwLock::new(None),
            }),
        }
    }

    /// Next unused entity id of this world.
    #[must_use]
    pub fn allocate_entity(&self) -> Entity {
        self.inner.allocator.allocate()
    }

    /// An empty object with a fresh id. It is not part of the world until
    /// passed to [`World::add_object`].
    #[must_use]
    pub fn create_object(&self) -> Object {
        Object::new(self.allocate_entity())
    }

    /// Append an object to the world.
    ///
    /// Objects built with an id from elsewhere are accepted; the allocator
    /// moves past that id so it is never handed out again.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateEntity`] if an object with the same id
    /// is already present.
    pub fn add_object(&self, object: Object) -> Result<Entity, WorldError> {
        let entity = object.entity();
        let mut objects = write(&self.inner.objects);
        if self.inner.index.contains_key(&entity) {
            return Err(WorldError::DuplicateEntity(entity));
        }
        self.inner.allocator.ensure_above(entity);
        self.insert_locked(&mut *objects, object);
        Ok(entity)
    }

    /// Build an object from `bundle` under a fresh id and add it.
    pub fn spawn<B: Bundle>(&self, bundle: B) -> Entity {
        let entity = self.allocate_entity();
        let mut objects = write(&self.inner.objects);
        self.insert_locked(&mut *objects, Object::from_bundle(entity, bundle));
        entity
    }

    fn insert_locked(&self, objects: &mut Snapshot, object: Object) {
        let object = ObjectRef::new(object);
        self.inner.index.insert(object.entity(), object.clone());
        Arc::make_mut(objects).push(object);
    }

    /// Shared handle to an object, if present.
    #[must_use]
    pub fn get_object(&self, entity: Entity) -> Option<ObjectRef> {
        self.inner
            .index
            .get(&entity)
            .map(|object| object.value().clone())
    }

    /// Remove an object. Returns `false` if it was not present.
    pub fn remove_object(&self, entity: Entity) -> bool {
        let mut objects = write(&self.inner.objects);
        if self.inner.index.remove(&entity).is_none() {
            return false;
        }
        Arc::make_mut(&mut *objects).retain(|object| object.entity() != entity);
        debug!(%entity, "removed object");
        true
    }

    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.inner.index.contains_key(&entity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.inner.objects).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every object, in collection order.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.snapshot().iter().map(ObjectRef::entity).collect()
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Arc::clone(&read(&self.inner.objects))
    }

    /// Register a system. Systems are never unregistered.
    pub fn add_system(&self, system: System) {
        debug!(
            system = system.name(),
            periodic = system.is_periodic(),
            requires = ?system.signature().required_components(),
            "registered system"
        );
        write(&self.inner.systems).push(Arc::new(system));
    }

    /// Number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        read(&self.inner.systems).len()
    }

    pub(crate) fn systems_snapshot(&self) -> Vec<Arc<System>> {
        read(&self.inner.systems).clone()
    }

    /// Route errors returned by systems to `handler` instead of the log.
    ///
    /// The handler receives the system's name, the arguments it was invoked
    /// with and the error. It may be called from several threads at once.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &[ArgValue], &anyhow::Error) + Send + Sync + 'static,
    {
        let handler: Arc<ErrorHandler> = Arc::new(handler);
        *write(&self.inner.on_error) = Some(handler);
    }

    /// Restore the default of logging system errors.
    pub fn clear_error_handler(&self) {
        *write(&self.inner.on_error) = None;
    }

    pub(crate) fn report_system_error(&self, name: &str, args: &[ArgValue], err: &anyhow::Error) {
        let handler = read(&self.inner.on_error).clone();
        match handler {
            Some(handler) => handler(name, args, err),
            None => error!(system = name, error = %err, "system returned error"),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("objects", &self.len())
            .field("systems", &self.system_count())
            .field("allocated", &self.inner.allocator.count())
            .finish()
    }
}
