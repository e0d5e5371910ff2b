//! System parameters.
//!
//! Every parameter type of a system implements [`SystemParam`], which both
//! describes what the parameter needs ([`ParamKind`], captured once when the
//! system is registered) and resolves a value for one entity at dispatch
//! time.
//!
//! | Parameter type | Receives |
//! |---|---|
//! | any [`Component`] | a clone of the entity's first component of that type |
//! | [`Entity`] | the entity's id |
//! | [`SystemTime`] | the timestamp of the current tick |
//! | [`World`] | a handle to the owning world |
//! | [`Query<Q>`](crate::Query) | a cursor over the other objects of the world |

use std::time::SystemTime;

use crate::component::{AnyComponent, Component, ComponentTypeId};
use crate::entity::Entity;
use crate::error::SignatureError;
use crate::object::Object;
use crate::query::TermKind;
use crate::world::World;

/// What a parameter asks of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// A component of the given type must be attached to the entity.
    Component(ComponentTypeId),
    /// The entity's id.
    Entity,
    /// The tick timestamp.
    Time,
    /// The owning world.
    World,
    /// A query cursor with the given terms.
    Query(Vec<TermKind>),
}

/// A resolved argument, as handed to the error handler when a system fails.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Component(Box<dyn AnyComponent>),
    Entity(Entity),
    Time(SystemTime),
    World,
    Query(Vec<TermKind>),
}

impl ArgValue {
    /// The component value, if this argument was a component of type `T`.
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        match self {
            Self::Component(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// Everything a parameter may draw from while being resolved for one entity.
pub struct ParamContext<'a> {
    world: &'a World,
    object: &'a Object,
    now: SystemTime,
}

impl<'a> ParamContext<'a> {
    pub(crate) fn new(world: &'a World, object: &'a Object, now: SystemTime) -> Self {
        Self { world, object, now }
    }

    /// The world being swept.
    #[must_use]
    pub fn world(&self) -> &'a World {
        self.world
    }

    /// The object the system is being matched against.
    #[must_use]
    pub fn object(&self) -> &'a Object {
        self.object
    }

    #[must_use]
    pub fn entity(&self) -> Entity {
        self.object.entity()
    }

    /// Timestamp of the tick being dispatched.
    #[must_use]
    pub fn now(&self) -> SystemTime {
        self.now
    }
}

/// A value a system can declare as a parameter.
pub trait SystemParam: Sized + Send + 'static {
    /// Capability description, captured at registration.
    fn kind() -> ParamKind;

    /// Resolve the parameter for the entity in `ctx`.
    ///
    /// `Ok(None)` means the entity does not match and must be skipped.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] when the parameter's shape cannot be
    /// served at all.
    fn fetch(ctx: &ParamContext<'_>) -> Result<Option<Self>, SignatureError>;

    /// Snapshot of the resolved value for error reports.
    fn describe(&self) -> ArgValue;
}

impl<C: Component> SystemParam for C {
    fn kind() -> ParamKind {
        ParamKind::Component(ComponentTypeId::of::<C>())
    }

    fn fetch(ctx: &ParamContext<'_>) -> Result<Option<Self>, SignatureError> {
        Ok(ctx.object().component::<C>().cloned())
    }

    fn describe(&self) -> ArgValue {
        ArgValue::Component(Box::new(self.clone()))
    }
}

impl SystemParam for Entity {
    fn kind() -> ParamKind {
        ParamKind::Entity
    }

    fn fetch(ctx: &ParamContext<'_>) -> Result<Option<Self>, SignatureError> {
        Ok(Some(ctx.entity()))
    }

    fn describe(&self) -> ArgValue {
        ArgValue::Entity(*self)
    }
}

impl SystemParam for SystemTime {
    fn kind() -> ParamKind {
        ParamKind::Time
    }

    fn fetch(ctx: &ParamContext<'_>) -> Result<Option<Self>, SignatureError> {
        Ok(Some(ctx.now()))
    }

    fn describe(&self) -> ArgValue {
        ArgValue::Time(*self)
    }
}

impl SystemParam for World {
    fn kind() -> ParamKind {
        ParamKind::World
    }

    fn fetch(ctx: &ParamContext<'_>) -> Result<Option<Self>, SignatureError> {
        Ok(Some(ctx.world().clone()))
    }

    fn describe(&self) -> ArgValue {
        ArgValue::World
    }
}
