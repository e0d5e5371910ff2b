//! # tickworld
//!
//! A small entity-component runtime. Entities are bags of independently
//! typed components; systems are plain functions whose parameters name the
//! components they need and whose return value names the components they
//! overwrite.
//!
//! ```rust
//! use tickworld::{Component, System, World};
//!
//! #[derive(Debug, Clone, Copy, PartialEq)]
//! struct Position(i32);
//! impl Component for Position {}
//!
//! #[derive(Debug, Clone, Copy, PartialEq)]
//! struct Velocity(i32);
//! impl Component for Velocity {}
//!
//! fn movement(pos: Position, vel: Velocity) -> Position {
//!     Position(pos.0 + vel.0)
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let world = World::new();
//!     let entity = world.spawn((Position(1), Velocity(2)));
//!     world.add_system(System::new(movement));
//!
//!     let report = world.run().await;
//!     assert!(report.is_clean());
//!
//!     let object = world.get_object(entity).unwrap();
//!     assert_eq!(object.read().component::<Position>(), Some(&Position(3)));
//! }
//! ```
//!
//! ## Modules
//!
//! - [`entity`]: entity ids and the per-world allocator
//! - [`component`]: the component trait and type-erased storage helpers
//! - [`object`]: an entity together with its components
//! - [`world`]: the object collection, registered systems and error routing
//! - [`param`] / [`output`]: what systems can take and return
//! - [`query`]: cursors for searching other entities from inside a system
//! - [`system`]: turning functions into systems
//! - [`scheduler`]: triggers, runs and run reports
//! - [`config`]: runtime settings for blocking runs

pub mod component;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod object;
pub mod output;
pub mod param;
pub mod query;
pub mod scheduler;
pub mod system;
pub mod world;

pub use component::{AnyComponent, Bundle, Component, ComponentTypeId};
pub use config::RuntimeConfig;
pub use dispatch::SweepStats;
pub use entity::{Entity, EntityAllocator};
pub use error::{SignatureError, WorldError};
pub use object::{Object, ObjectRef};
pub use output::{SystemOutput, WriteBack};
pub use param::{ArgValue, ParamContext, ParamKind, SystemParam};
pub use query::{Query, QueryData, QueryIter, QueryResult, QueryTerm, TermKind};
pub use scheduler::{RunReport, Run, ScheduleEnd, ScheduleHandle, ScheduleOutcome, Trigger};
pub use system::{IntoSystem, Signature, System};
pub use world::World;
