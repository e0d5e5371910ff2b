//! Objects: an entity plus the components attached to it.
//!
//! Storage is keyed by [`ComponentTypeId`]; each key maps to the ordered list
//! of values of that type. An object may carry several components of the
//! same type, in which case lookup, write-back and [`Object::remove`] always
//! act on the first one attached.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::component::{AnyComponent, Bundle, Component, ComponentTypeId};
use crate::entity::Entity;

/// An entity together with its components.
pub struct Object {
    entity: Entity,
    storage: HashMap<ComponentTypeId, Vec<Box<dyn AnyComponent>>>,
    /// Attachment order across all types. The n-th occurrence of a type here
    /// corresponds to slot n of that type in `storage`.
    order: Vec<ComponentTypeId>,
}

impl Object {
    /// Create an object with no components.
    #[must_use]
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            storage: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Create an object from an ordered bundle of components.
    #[must_use]
    pub fn from_bundle<B: Bundle>(entity: Entity, bundle: B) -> Self {
        let mut object = Self::new(entity);
        for component in bundle.into_components() {
            object.insert_boxed(component);
        }
        object
    }

    /// Append a component, builder style.
    #[must_use]
    pub fn with<T: Component>(mut self, component: T) -> Self {
        self.insert(component);
        self
    }

    /// Returns the entity this object belongs to.
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Total number of components, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append a component after every existing one.
    pub fn insert<T: Component>(&mut self, component: T) {
        self.insert_boxed(Box::new(component));
    }

    /// Append an already type-erased component.
    pub fn insert_boxed(&mut self, component: Box<dyn AnyComponent>) {
        let ty = component.component_type();
        self.storage.entry(ty).or_default().push(component);
        self.order.push(ty);
    }

    /// Returns `true` if at least one component of type `T` is attached.
    #[must_use]
    pub fn has<T: Component>(&self) -> bool {
        self.storage.contains_key(&ComponentTypeId::of::<T>())
    }

    /// The first component of type `T`.
    #[must_use]
    pub fn component<T: Component>(&self) -> Option<&T> {
        self.storage
            .get(&ComponentTypeId::of::<T>())?
            .first()?
            .downcast_ref::<T>()
    }

    /// Mutable access to the first component of type `T`.
    #[must_use]
    pub fn component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.storage
            .get_mut(&ComponentTypeId::of::<T>())?
            .first_mut()?
            .downcast_mut::<T>()
    }

    /// Every component of type `T`, in attachment order.
    pub fn components_of<T: Component>(&self) -> impl Iterator<Item = &T> {
        self.storage
            .get(&ComponentTypeId::of::<T>())
            .into_iter()
            .flatten()
            .filter_map(|slot| slot.downcast_ref::<T>())
    }

    /// All components in attachment order.
    #[must_use]
    pub fn components(&self) -> Vec<&dyn AnyComponent> {
        let mut cursor: HashMap<ComponentTypeId, usize> = HashMap::new();
        self.order
            .iter()
            .filter_map(|ty| {
                let next = cursor.entry(*ty).or_insert(0);
                let slot = self.storage.get(ty)?.get(*next)?;
                *next += 1;
                Some(&**slot)
            })
            .collect()
    }

    /// Overwrite the first component of type `T`.
    ///
    /// Returns `false`, leaving the object untouched, when no component of
    /// that type is attached.
    pub fn replace_first<T: Component>(&mut self, value: T) -> bool {
        match self.component_mut::<T>() {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Detach and return the first component of type `T`.
    pub fn remove<T: Component>(&mut self) -> Option<T> {
        let ty = ComponentTypeId::of::<T>();
        let slots = self.storage.get_mut(&ty)?;
        if slots.is_empty() {
            return None;
        }
        let removed = slots.remove(0);
        if slots.is_empty() {
            self.storage.remove(&ty);
        }
        if let Some(pos) = self.order.iter().position(|t| *t == ty) {
            self.order.remove(pos);
        }
        removed.into_any().downcast::<T>().ok().map(|value| *value)
    }

    /// Detach every component of type `T`. Returns how many were removed.
    pub fn remove_all<T: Component>(&mut self) -> usize {
        let ty = ComponentTypeId::of::<T>();
        let Some(slots) = self.storage.remove(&ty) else {
            return 0;
        };
        self.order.retain(|t| *t != ty);
        slots.len()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("entity", &self.entity)
            .field("components", &self.components())
            .finish()
    }
}

/// Shared handle to an object living in a [`World`](crate::World).
///
/// The object's components sit behind their own lock, independent of the
/// world's collection lock. Poisoned locks are recovered: a panicking system
/// leaves whatever it had already written.
#[derive(Clone)]
pub struct ObjectRef {
    entity: Entity,
    cell: Arc<RwLock<Object>>,
}

impl ObjectRef {
    pub(crate) fn new(object: Object) -> Self {
        Self {
            entity: object.entity(),
            cell: Arc::new(RwLock::new(object)),
        }
    }

    /// The entity of the referenced object. Does not take the lock.
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Shared access to the object.
    pub fn read(&self) -> RwLockReadGuard<'_, Object> {
        self.cell.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the object.
    pub fn write(&self) -> RwLockWriteGuard<'_, Object> {
        self.cell.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&*self.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(i32);
    impl Component for Position {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(i32);
    impl Component for Velocity {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Marker;
    impl Component for Marker {}

    #[test]
    fn test_lookup_and_insert() {
        let mut object = Object::from_bundle(Entity(1), (Position(1), Velocity(2)));
        assert_eq!(object.entity(), Entity(1));
        assert_eq!(object.len(), 2);
        assert_eq!(object.component::<Position>(), Some(&Position(1)));
        assert_eq!(object.component::<Velocity>(), Some(&Velocity(2)));
        assert!(object.component::<Marker>().is_none());

        object.insert(Marker);
        assert!(object.has::<Marker>());
        assert_eq!(object.len(), 3);
    }

    #[test]
    fn test_components_listed_in_attachment_order() {
        let object = Object::new(Entity(1))
            .with(Velocity(1))
            .with(Position(2))
            .with(Velocity(3))
            .with(Marker);

        let listed = object.components();
        assert_eq!(listed.len(), 4);
        assert_eq!(listed[0].downcast_ref::<Velocity>(), Some(&Velocity(1)));
        assert_eq!(listed[1].downcast_ref::<Position>(), Some(&Position(2)));
        assert_eq!(listed[2].downcast_ref::<Velocity>(), Some(&Velocity(3)));
        assert!(listed[3].is::<Marker>());
    }

    #[test]
    fn test_empty_object() {
        let object = Object::new(Entity(7));
        assert!(object.is_empty());
        assert!(object.components().is_empty());
    }

    #[test]
    fn test_replace_first_without_slot_is_rejected() {
        let mut object = Object::from_bundle(Entity(1), (Position(1),));
        assert!(object.replace_first(Position(5)));
        assert_eq!(object.component::<Position>(), Some(&Position(5)));
        assert!(!object.replace_first(Velocity(9)));
        assert!(!object.has::<Velocity>());
    }

    // Duplicate components of one type: every single-value operation acts on
    // the first attached. This mirrors how matching has always behaved and is
    // pinned here rather than treated as a multi-component feature.
    #[test]
    fn test_duplicate_components_first_match() {
        let mut object = Object::from_bundle(Entity(1), (Position(1), Velocity(0), Position(10)));

        assert_eq!(object.component::<Position>(), Some(&Position(1)));
        let all: Vec<_> = object.components_of::<Position>().copied().collect();
        assert_eq!(all, vec![Position(1), Position(10)]);

        assert!(object.replace_first(Position(2)));
        let all: Vec<_> = object.components_of::<Position>().copied().collect();
        assert_eq!(all, vec![Position(2), Position(10)]);

        assert_eq!(object.remove::<Position>(), Some(Position(2)));
        assert_eq!(object.component::<Position>(), Some(&Position(10)));
        let listed = object.components();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].is::<Velocity>());
        assert_eq!(listed[1].downcast_ref::<Position>(), Some(&Position(10)));
    }

    #[test]
    fn test_remove_all() {
        let mut object = Object::from_bundle(Entity(1), (Position(1), Marker, Position(2)));
        assert_eq!(object.remove_all::<Position>(), 2);
        assert!(!object.has::<Position>());
        assert_eq!(object.len(), 1);
        assert_eq!(object.remove_all::<Position>(), 0);
        assert_eq!(object.remove::<Position>(), None);
    }

    #[test]
    fn test_object_ref_shares_state() {
        let handle = ObjectRef::new(Object::from_bundle(Entity(4), (Position(1),)));
        let other = handle.clone();
        other.write().replace_first(Position(8));
        assert_eq!(handle.entity(), Entity(4));
        assert_eq!(handle.read().component::<Position>(), Some(&Position(8)));
    }
}
