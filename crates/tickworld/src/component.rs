//! Core [`Component`] trait and type-erased component values.
//!
//! Components are plain Rust values. A type opts in with an empty impl:
//!
//! ```rust
//! use tickworld::Component;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Health {
//!     current: f32,
//!     max: f32,
//! }
//!
//! impl Component for Health {}
//! ```
//!
//! Matching is by exact Rust type: a system parameter of type `Health` only
//! ever receives a `Health` component.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a component type, used as the key of an object's storage and
/// of a system's declared signature.
///
/// Equality and hashing use the underlying [`TypeId`]; the name is kept for
/// diagnostics only.
#[derive(Clone, Copy)]
pub struct ComponentTypeId {
    id: TypeId,
    name: &'static str,
}

impl ComponentTypeId {
    /// Compute the [`ComponentTypeId`] for a component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::type_name(),
        }
    }

    /// Human-readable name of the component type.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentTypeId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentTypeId {}

impl Hash for ComponentTypeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentTypeId").field(&self.name).finish()
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The core component trait.
///
/// Components must be `Send + Sync` because systems run on worker threads,
/// `Clone` because parameters are handed to systems by value, and `Debug` so
/// that failing invocations can be reported with their arguments.
pub trait Component: Any + Send + Sync + Clone + fmt::Debug {
    /// A human-readable name for this component type.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::of::<Self>()
    }
}

/// Object-safe view of a [`Component`], used for heterogeneous storage.
pub trait AnyComponent: Any + Send + Sync + fmt::Debug {
    /// The [`ComponentTypeId`] of the concrete value.
    fn component_type(&self) -> ComponentTypeId;

    /// Clone into a new box.
    fn clone_box(&self) -> Box<dyn AnyComponent>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Component> AnyComponent for T {
    fn component_type(&self) -> ComponentTypeId {
        ComponentTypeId::of::<T>()
    }

    fn clone_box(&self) -> Box<dyn AnyComponent> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn AnyComponent {
    /// Returns `true` if the boxed value is a `T`.
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast to a concrete component reference.
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Downcast to a concrete mutable component reference.
    #[must_use]
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

impl Clone for Box<dyn AnyComponent> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// An ordered group of components used to build an [`Object`](crate::Object)
/// in one call, e.g. `(Position(1), Velocity(2))`.
pub trait Bundle: Send + 'static {
    /// Box every component, preserving order.
    fn into_components(self) -> Vec<Box<dyn AnyComponent>>;
}

impl Bundle for () {
    fn into_components(self) -> Vec<Box<dyn AnyComponent>> {
        Vec::new()
    }
}

impl Bundle for Vec<Box<dyn AnyComponent>> {
    fn into_components(self) -> Vec<Box<dyn AnyComponent>> {
        self
    }
}

macro_rules! impl_bundle_tuple {
    ($($name:ident $var:ident),+) => {
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            fn into_components(self) -> Vec<Box<dyn AnyComponent>> {
                let ($($var,)+) = self;
                vec![$(Box::new($var) as Box<dyn AnyComponent>),+]
            }
        }
    };
}

impl_bundle_tuple!(A a);
impl_bundle_tuple!(A a, B b);
impl_bundle_tuple!(A a, B b, C c);
impl_bundle_tuple!(A a, B b, C c, D d);
impl_bundle_tuple!(A a, B b, C c, D d, E e);
impl_bundle_tuple!(A a, B b, C c, D d, E e, F f);
impl_bundle_tuple!(A a, B b, C c, D d, E e, F f, G g);
impl_bundle_tuple!(A a, B b, C c, D d, E e, F f, G g, H h);
