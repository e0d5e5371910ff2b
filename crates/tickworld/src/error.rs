//! Runtime error types.

use crate::entity::Entity;

/// Errors returned by [`World`](crate::World) operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// An object with this entity is already part of the world.
    #[error("{0} is already present in the world")]
    DuplicateEntity(Entity),

    /// The tokio runtime backing a blocking run could not be built.
    #[error("failed to build runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// A system parameter whose shape cannot be served.
///
/// Reported per entity: the dispatcher logs it and treats the entity as not
/// matching the system for that tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// A query was declared without any term to report.
    #[error("invalid query `{query}`: at least one term must be requested")]
    EmptyQuery {
        /// Type name of the offending query.
        query: &'static str,
    },
}
