//! System registration.
//!
//! A system is any function or closure whose parameters implement
//! [`SystemParam`] and whose return value implements [`SystemOutput`]:
//!
//! ```rust
//! use tickworld::{Component, System};
//!
//! #[derive(Debug, Clone, Copy)]
//! struct Position(f32);
//! impl Component for Position {}
//!
//! #[derive(Debug, Clone, Copy)]
//! struct Velocity(f32);
//! impl Component for Velocity {}
//!
//! fn movement(pos: Position, vel: Velocity) -> Position {
//!     Position(pos.0 + vel.0)
//! }
//!
//! let system = System::new(movement).named("movement");
//! assert_eq!(system.name(), "movement");
//! assert_eq!(system.signature().params.len(), 2);
//! ```
//!
//! Up to eight parameters are supported. The parameter list is captured as a
//! [`Signature`] when the system is built.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};

use crate::component::ComponentTypeId;
use crate::dispatch::{EntityOutcome, Tick};
use crate::object::ObjectRef;
use crate::output::{SystemOutput, WriteBack};
use crate::param::{ParamContext, ParamKind, SystemParam};
use crate::scheduler::Trigger;

/// Declared shape of a system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// What each parameter asks for, in declaration order.
    pub params: Vec<ParamKind>,
    /// Component types written back after each invocation.
    pub produces: Vec<ComponentTypeId>,
    /// Whether the system can return an error.
    pub fallible: bool,
}

impl Signature {
    /// Component types an entity must carry to match.
    #[must_use]
    pub fn required_components(&self) -> Vec<ComponentTypeId> {
        self.params
            .iter()
            .filter_map(|param| match param {
                ParamKind::Component(ty) => Some(*ty),
                _ => None,
            })
            .collect()
    }
}

/// Type-erased system body, run against one object at a time.
pub(crate) trait ErasedSystem: Send + Sync + 'static {
    fn signature(&self) -> &Signature;

    fn run_on(&self, tick: &Tick<'_>, object: &ObjectRef) -> EntityOutcome;
}

/// A registered system: its body, display name and optional trigger.
pub struct System {
    name: String,
    body: Box<dyn ErasedSystem>,
    periodic: bool,
    trigger: Mutex<Option<Trigger>>,
}

impl System {
    /// Wrap a function or closure.
    pub fn new<Marker, F: IntoSystem<Marker>>(func: F) -> Self {
        func.into_system()
    }

    fn from_body(name: String, body: Box<dyn ErasedSystem>) -> Self {
        Self {
            name,
            body,
            periodic: false,
            trigger: Mutex::new(None),
        }
    }

    /// Override the name used in error reports and logs.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Run on every timestamp produced by `trigger` instead of once.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.periodic = true;
        self.trigger = Mutex::new(Some(trigger));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        self.body.signature()
    }

    /// `true` if the system was given a trigger.
    #[must_use]
    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// Hand the trigger to a schedule. A trigger is consumed by the first run
    /// that drives it.
    pub(crate) fn take_trigger(&self) -> Option<Trigger> {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn run_on(&self, tick: &Tick<'_>, object: &ObjectRef) -> EntityOutcome {
        self.body.run_on(tick, object)
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("signature", self.signature())
            .field("periodic", &self.periodic)
            .finish()
    }
}

/// Conversion of functions and closures into a [`System`].
///
/// `Marker` is the function's pointer type and only serves to keep the impls
/// for different arities apart.
pub trait IntoSystem<Marker>: Sized {
    fn into_system(self) -> System;
}

struct FunctionSystem<F, Marker> {
    func: F,
    signature: Signature,
    _marker: PhantomData<fn() -> Marker>,
}

/// Short display name for a callable, from its type name.
///
/// `my_crate::systems::movement` becomes `movement`; a closure defined in
/// `setup` becomes `setup::{{closure}}`.
pub(crate) fn short_system_name(full: &str) -> String {
    const CLOSURE: &str = "::{{closure}}";
    let trimmed = full.trim_end_matches(CLOSURE);
    let base = trimmed.rsplit("::").next().unwrap_or(trimmed);
    if trimmed.len() == full.len() {
        base.to_string()
    } else {
        format!("{base}{CLOSURE}")
    }
}

macro_rules! impl_function_system {
    ($($param:ident $arg:ident),*) => {
        impl<Func, Out, $($param),*> IntoSystem<fn($($param),*) -> Out> for Func
        where
            Func: Fn($($param),*) -> Out + Send + Sync + 'static,
            Out: SystemOutput,
            $($param: SystemParam,)*
        {
            fn into_system(self) -> System {
                let signature = Signature {
                    params: vec![$(<$param as SystemParam>::kind()),*],
                    produces: <Out::Writes as WriteBack>::produced(),
                    fallible: Out::FALLIBLE,
                };
                System::from_body(
                    short_system_name(std::any::type_name::<Func>()),
                    Box::new(FunctionSystem::<Func, fn($($param),*) -> Out> {
                        func: self,
                        signature,
                        _marker: PhantomData,
                    }),
                )
            }
        }

        impl<Func, Out, $($param),*> ErasedSystem for FunctionSystem<Func, fn($($param),*) -> Out>
        where
            Func: Fn($($param),*) -> Out + Send + Sync + 'static,
            Out: SystemOutput,
            $($param: SystemParam,)*
        {
            fn signature(&self) -> &Signature {
                &self.signature
            }

            #[allow(unused_variables)]
            fn run_on(&self, tick: &Tick<'_>, object: &ObjectRef) -> EntityOutcome {
                let guard = object.read();
                let ctx = ParamContext::new(tick.world, &guard, tick.now);
                $(
                    let $arg = match <$param as SystemParam>::fetch(&ctx) {
                        Ok(Some(value)) => value,
                        Ok(None) => return EntityOutcome::Skipped,
                        Err(err) => return EntityOutcome::Invalid(err),
                    };
                )*
                // The system may call back into the world, including this
                // object, so no lock is held across the call.
                drop(guard);

                let args = if Out::FALLIBLE {
                    vec![$(SystemParam::describe(&$arg)),*]
                } else {
                    Vec::new()
                };

                let (writes, error) = (self.func)($($arg),*).into_parts();
                let written = match writes {
                    Some(writes) if !<Out::Writes as WriteBack>::EMPTY => {
                        writes.write_back(&mut object.write())
                    }
                    _ => 0,
                };
                match error {
                    Some(error) => EntityOutcome::Failed { args, error, written },
                    None => EntityOutcome::Invoked { written },
                }
            }
        }
    };
}

impl_function_system!();
impl_function_system!(P0 p0);
impl_function_system!(P0 p0, P1 p1);
impl_function_system!(P0 p0, P1 p1, P2 p2);
impl_function_system!(P0 p0, P1 p1, P2 p2, P3 p3);
impl_function_system!(P0 p0, P1 p1, P2 p2, P3 p3, P4 p4);
impl_function_system!(P0 p0, P1 p1, P2 p2, P3 p3, P4 p4, P5 p5);
impl_function_system!(P0 p0, P1 p1, P2 p2, P3 p3, P4 p4, P5 p5, P6 p6);
impl_function_system!(P0 p0, P1 p1, P2 p2, P3 p3, P4 p4, P5 p5, P6 p6, P7 p7);
