//! System return values.
//!
//! A system's return value decides what is written back onto the entity it
//! ran on:
//!
//! - `()` writes nothing;
//! - a [`Component`] overwrites the entity's first component of that type;
//! - a tuple of components overwrites each in turn;
//! - `Result<T, E>` writes `T` on `Ok` and routes `E` to the world's error
//!   handler on `Err`, writing nothing;
//! - `(T, Result<(), E>)` always writes `T` and additionally routes `E` to
//!   the error handler on `Err`. The error does not undo the write.
//!
//! A produced value whose type the entity does not carry is discarded.

use tracing::trace;

use crate::component::{Component, ComponentTypeId};
use crate::object::Object;

/// Component values to write back after a successful invocation.
pub trait WriteBack: Send + 'static {
    /// `true` when nothing is ever written, letting the dispatcher skip the
    /// object's write lock.
    const EMPTY: bool = false;

    /// Types written, in order.
    fn produced() -> Vec<ComponentTypeId>;

    /// Apply to `object`. Returns how many values found a slot.
    fn write_back(self, object: &mut Object) -> usize;
}

/// Anything a system may return.
pub trait SystemOutput: Send + 'static {
    type Writes: WriteBack;

    /// Whether the output can carry an error. Resolved arguments are only
    /// captured for error reports when this is set.
    const FALLIBLE: bool;

    /// Split into the values to write back and the error to report. Either,
    /// both or neither may be present.
    fn into_parts(self) -> (Option<Self::Writes>, Option<anyhow::Error>);
}

fn write_one<C: Component>(object: &mut Object, value: C) -> usize {
    if object.replace_first(value) {
        1
    } else {
        trace!(
            entity = %object.entity(),
            component = C::type_name(),
            "discarding output without a matching component"
        );
        0
    }
}

impl WriteBack for () {
    const EMPTY: bool = true;

    fn produced() -> Vec<ComponentTypeId> {
        Vec::new()
    }

    fn write_back(self, _object: &mut Object) -> usize {
        0
    }
}

impl<C: Component> WriteBack for C {
    fn produced() -> Vec<ComponentTypeId> {
        vec![ComponentTypeId::of::<C>()]
    }

    fn write_back(self, object: &mut Object) -> usize {
        write_one(object, self)
    }
}

impl SystemOutput for () {
    type Writes = ();
    const FALLIBLE: bool = false;

    fn into_parts(self) -> (Option<Self::Writes>, Option<anyhow::Error>) {
        (Some(()), None)
    }
}

impl<C: Component> SystemOutput for C {
    type Writes = C;
    const FALLIBLE: bool = false;

    fn into_parts(self) -> (Option<Self::Writes>, Option<anyhow::Error>) {
        (Some(self), None)
    }
}

impl<W, E> SystemOutput for Result<W, E>
where
    W: WriteBack,
    E: Into<anyhow::Error> + Send + 'static,
{
    type Writes = W;
    const FALLIBLE: bool = true;

    fn into_parts(self) -> (Option<Self::Writes>, Option<anyhow::Error>) {
        match self {
            Ok(writes) => (Some(writes), None),
            Err(err) => (None, Some(err.into())),
        }
    }
}

impl<W, E> SystemOutput for (W, Result<(), E>)
where
    W: WriteBack,
    E: Into<anyhow::Error> + Send + 'static,
{
    type Writes = W;
    const FALLIBLE: bool = true;

    fn into_parts(self) -> (Option<Self::Writes>, Option<anyhow::Error>) {
        let (writes, status) = self;
        (Some(writes), status.err().map(Into::into))
    }
}

macro_rules! impl_output_tuple {
    ($($name:ident $var:ident),+) => {
        impl<$($name: Component),+> WriteBack for ($($name,)+) {
            fn produced() -> Vec<ComponentTypeId> {
                vec![$(ComponentTypeId::of::<$name>()),+]
            }

            fn write_back(self, object: &mut Object) -> usize {
                let ($($var,)+) = self;
                0 $(+ write_one(object, $var))+
            }
        }

        impl<$($name: Component),+> SystemOutput for ($($name,)+) {
            type Writes = Self;
            const FALLIBLE: bool = false;

            fn into_parts(self) -> (Option<Self::Writes>, Option<anyhow::Error>) {
                (Some(self), None)
            }
        }
    };
}

impl_output_tuple!(A a);
impl_output_tuple!(A a, B b);
impl_output_tuple!(A a, B b, C c);
impl_output_tuple!(A a, B b, C c, D d);
impl_output_tuple!(A a, B b, C c, D d, E e);
impl_output_tuple!(A a, B b, C c, D d, E e, F f);
impl_output_tuple!(A a, B b, C c, D d, E e, F f, G g);
impl_output_tuple!(A a, B b, C c, D d, E e, F f, G g, H h);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(i32);
    impl Component for Position {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(i32);
    impl Component for Velocity {}

    #[derive(Debug, thiserror::Error)]
    #[error("blocked")]
    struct Blocked;

    #[test]
    fn test_single_component_writes_first_slot() {
        let mut object = Object::from_bundle(Entity(1), (Position(1), Position(9)));
        assert_eq!(Position(4).write_back(&mut object), 1);
        let all: Vec<_> = object.components_of::<Position>().copied().collect();
        assert_eq!(all, vec![Position(4), Position(9)]);
    }

    #[test]
    fn test_tuple_writes_each_and_discards_missing() {
        let mut object = Object::from_bundle(Entity(1), (Position(1),));
        assert_eq!((Position(2), Velocity(3)).write_back(&mut object), 1);
        assert_eq!(object.component::<Position>(), Some(&Position(2)));
        assert!(!object.has::<Velocity>());
    }

    #[test]
    fn test_produced_types() {
        assert!(<() as WriteBack>::EMPTY);
        assert!(<() as WriteBack>::produced().is_empty());
        assert_eq!(
            <(Position, Velocity) as WriteBack>::produced(),
            vec![
                ComponentTypeId::of::<Position>(),
                ComponentTypeId::of::<Velocity>()
            ]
        );
    }

    #[test]
    fn test_result_output() {
        assert!(<Result<Position, Blocked> as SystemOutput>::FALLIBLE);
        assert!(!<Position as SystemOutput>::FALLIBLE);

        let ok: Result<Position, Blocked> = Ok(Position(1));
        assert!(matches!(ok.into_parts(), (Some(Position(1)), None)));

        let err: Result<Position, Blocked> = Err(Blocked);
        let (writes, error) = err.into_parts();
        assert!(writes.is_none());
        assert!(error.unwrap().downcast_ref::<Blocked>().is_some());
    }

    #[test]
    fn test_values_with_error_output() {
        assert!(<(Position, Result<(), Blocked>) as SystemOutput>::FALLIBLE);

        let (writes, error) = (Position(9), Err::<(), _>(Blocked)).into_parts();
        assert_eq!(writes, Some(Position(9)));
        assert!(error.unwrap().downcast_ref::<Blocked>().is_some());

        let (writes, error) = ((Position(1), Velocity(2)), Ok::<(), Blocked>(())).into_parts();
        assert_eq!(writes, Some((Position(1), Velocity(2))));
        assert!(error.is_none());
    }
}
