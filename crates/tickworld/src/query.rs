//! Query cursors handed to systems for looking up *other* entities.
//!
//! A system that declares a [`Query<Q>`] parameter receives a cursor over the
//! world's objects as they are when the system is invoked on an entity, so it
//! reflects removals made by earlier invocations of the same sweep. `Q` is a tuple
//! of terms, each one of:
//!
//! - `usize`: the positional index of the match,
//! - [`Entity`]: the id of the match,
//! - any [`Component`] type: a clone of the match's first component of
//!   that type. Objects lacking it are passed over.
//!
//! ```rust,ignore
//! fn chase(_: Hunter, pos: Position, prey: Query<(Prey, Position)>) -> Position {
//!     match prey.first().into_item() {
//!         Some((_, target)) => pos.step_towards(target),
//!         None => pos,
//!     }
//! }
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::component::{Component, ComponentTypeId};
use crate::entity::Entity;
use crate::error::SignatureError;
use crate::object::Object;
use crate::param::{ArgValue, ParamContext, ParamKind, SystemParam};
use crate::world::Snapshot;

/// One term of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Index,
    Entity,
    Component(ComponentTypeId),
}

/// A single value a query can report about a match.
pub trait QueryTerm: Sized + Send + 'static {
    fn kind() -> TermKind;

    /// Extract the term from the object at `index`, or `None` if the object
    /// does not satisfy it.
    fn fetch(index: usize, object: &Object) -> Option<Self>;
}

impl QueryTerm for usize {
    fn kind() -> TermKind {
        TermKind::Index
    }

    fn fetch(index: usize, _object: &Object) -> Option<Self> {
        Some(index)
    }
}

impl QueryTerm for Entity {
    fn kind() -> TermKind {
        TermKind::Entity
    }

    fn fetch(_index: usize, object: &Object) -> Option<Self> {
        Some(object.entity())
    }
}

impl<C: Component> QueryTerm for C {
    fn kind() -> TermKind {
        TermKind::Component(ComponentTypeId::of::<C>())
    }

    fn fetch(_index: usize, object: &Object) -> Option<Self> {
        object.component::<C>().cloned()
    }
}

/// A tuple of [`QueryTerm`]s.
pub trait QueryData: Sized + Send + 'static {
    fn terms() -> Vec<TermKind>;

    /// All terms for the object at `index`, or `None` if any term fails.
    fn fetch(index: usize, object: &Object) -> Option<Self>;
}

// Accepted by the type system so that the shape check below can reject it
// per entity instead of at compile time.
impl QueryData for () {
    fn terms() -> Vec<TermKind> {
        Vec::new()
    }

    fn fetch(_index: usize, _object: &Object) -> Option<Self> {
        Some(())
    }
}

macro_rules! impl_query_data_tuple {
    ($($name:ident),+) => {
        impl<$($name: QueryTerm),+> QueryData for ($($name,)+) {
            fn terms() -> Vec<TermKind> {
                vec![$(<$name as QueryTerm>::kind()),+]
            }

            fn fetch(index: usize, object: &Object) -> Option<Self> {
                Some(($(<$name as QueryTerm>::fetch(index, object)?,)+))
            }
        }
    };
}

impl_query_data_tuple!(A);
impl_query_data_tuple!(A, B);
impl_query_data_tuple!(A, B, C);
impl_query_data_tuple!(A, B, C, D);
impl_query_data_tuple!(A, B, C, D, E);
impl_query_data_tuple!(A, B, C, D, E, F);
impl_query_data_tuple!(A, B, C, D, E, F, G);
impl_query_data_tuple!(A, B, C, D, E, F, G, H);

/// Outcome of advancing a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult<Q> {
    /// The first object at or after the offset that satisfies every term.
    Found { index: usize, item: Q },
    /// Nothing matched; `len` is the number of objects in the snapshot.
    NotFound { len: usize },
}

impl<Q> QueryResult<Q> {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    /// Index of the match, or the snapshot length when nothing matched.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Found { index, .. } => *index,
            Self::NotFound { len } => *len,
        }
    }

    /// Offset to resume from to find the next match.
    #[must_use]
    pub fn next_offset(&self) -> Option<usize> {
        match self {
            Self::Found { index, .. } => Some(index + 1),
            Self::NotFound { .. } => None,
        }
    }

    #[must_use]
    pub fn into_item(self) -> Option<Q> {
        match self {
            Self::Found { item, .. } => Some(item),
            Self::NotFound { .. } => None,
        }
    }
}

/// Resumable search over the objects of a world.
///
/// Built fresh from the world's live collection for every entity a system is
/// invoked on. Once built it is a point-in-time view: it never observes
/// objects added afterwards, and still reports objects removed afterwards.
pub struct Query<Q> {
    snapshot: Snapshot,
    _marker: PhantomData<fn() -> Q>,
}

impl<Q: QueryData> Query<Q> {
    /// Build a cursor over `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::EmptyQuery`] if `Q` has no terms.
    pub(crate) fn build(snapshot: Snapshot) -> Result<Self, SignatureError> {
        if Q::terms().is_empty() {
            return Err(SignatureError::EmptyQuery {
                query: std::any::type_name::<Q>(),
            });
        }
        Ok(Self {
            snapshot,
            _marker: PhantomData,
        })
    }

    /// Number of objects in the snapshot, matching or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// The first match in the snapshot.
    #[must_use]
    pub fn first(&self) -> QueryResult<Q> {
        self.advance_from(0)
    }

    /// The first match at or after `offset`.
    #[must_use]
    pub fn advance_from(&self, offset: usize) -> QueryResult<Q> {
        for (index, object) in self.snapshot.iter().enumerate().skip(offset) {
            if let Some(item) = Q::fetch(index, &object.read()) {
                return QueryResult::Found { index, item };
            }
        }
        QueryResult::NotFound {
            len: self.snapshot.len(),
        }
    }

    /// Every match, in collection order, paired with its index.
    pub fn iter(&self) -> QueryIter<'_, Q> {
        QueryIter {
            query: self,
            offset: 0,
        }
    }

    /// Number of matching objects.
    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }
}

impl<Q> Clone for Query<Q> {
    fn clone(&self) -> Self {
        Self {
            snapshot: Snapshot::clone(&self.snapshot),
            _marker: PhantomData,
        }
    }
}

impl<Q> fmt::Debug for Query<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("terms", &std::any::type_name::<Q>())
            .field("len", &self.snapshot.len())
            .finish()
    }
}

impl<Q: QueryData> SystemParam for Query<Q> {
    fn kind() -> ParamKind {
        ParamKind::Query(Q::terms())
    }

    fn fetch(ctx: &ParamContext<'_>) -> Result<Option<Self>, SignatureError> {
        Self::build(ctx.world().snapshot()).map(Some)
    }

    fn describe(&self) -> ArgValue {
        ArgValue::Query(Q::terms())
    }
}

/// Iterator over every match of a [`Query`].
pub struct QueryIter<'q, Q> {
    query: &'q Query<Q>,
    offset: usize,
}

impl<Q: QueryData> Iterator for QueryIter<'_, Q> {
    type Item = (usize, Q);

    fn next(&mut self) -> Option<Self::Item> {
        match self.query.advance_from(self.offset) {
            QueryResult::Found { index, item } => {
                self.offset = index + 1;
                Some((index, item))
            }
            QueryResult::NotFound { len } => {
                self.offset = len;
                None
            }
        }
    }
}

impl<Q: QueryData> std::iter::FusedIterator for QueryIter<'_, Q> {}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::world::World;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Player;
    impl Component for Player {}

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Target;
    impl Component for Target {}

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Position(i32);
    impl Component for Position {}

    #[test]
    fn test_find_first() {
        let world = World::new();
        world.spawn((Player, Position(1)));
        let target = world.spawn((Target, Position(5)));

        let query = Query::<(Entity, Target, Position)>::build(world.snapshot()).unwrap();
        assert_eq!(
            query.first(),
            QueryResult::Found {
                index: 1,
                item: (target, Target, Position(5)),
            }
        );
    }

    #[test]
    fn test_enumerate_all_matches() {
        let world = World::new();
        world.spawn((Player,));
        let mut targets = HashSet::new();
        for _ in 0..5 {
            targets.insert(world.spawn((Target,)));
        }

        let query = Query::<(usize, Entity, Target)>::build(world.snapshot()).unwrap();
        let mut visited = Vec::new();
        let mut offset = 0;
        loop {
            match query.advance_from(offset) {
                QueryResult::Found {
                    index,
                    item: (reported, entity, _),
                } => {
                    assert_eq!(index, reported);
                    visited.push(entity);
                    offset = index + 1;
                }
                QueryResult::NotFound { len } => {
                    assert_eq!(len, 6);
                    break;
                }
            }
        }

        assert_eq!(visited.len(), 5);
        assert_eq!(visited.iter().copied().collect::<HashSet<_>>(), targets);
        assert_eq!(query.count(), 5);
    }

    #[test]
    fn test_not_found_reports_length() {
        let world = World::new();
        world.spawn((Player,));
        world.spawn((Position(3),));

        let query = Query::<(usize, Target)>::build(world.snapshot()).unwrap();
        let result = query.first();
        assert!(!result.is_found());
        assert_eq!(result.index(), 2);
        assert_eq!(result.next_offset(), None);
        assert_eq!(result.into_item(), None);
    }

    #[test]
    fn test_offset_past_end() {
        let world = World::new();
        world.spawn((Target,));
        let query = Query::<(Target,)>::build(world.snapshot()).unwrap();
        assert_eq!(query.advance_from(1), QueryResult::NotFound { len: 1 });
        assert_eq!(query.advance_from(100), QueryResult::NotFound { len: 1 });
    }

    #[test]
    fn test_iter_yields_indices_in_order() {
        let world = World::new();
        world.spawn((Target, Position(1)));
        world.spawn((Player,));
        world.spawn((Target, Position(3)));

        let query = Query::<(Position,)>::build(world.snapshot()).unwrap();
        let found: Vec<_> = query.iter().map(|(i, (p,))| (i, p)).collect();
        assert_eq!(found, vec![(0, Position(1)), (2, Position(3))]);
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let world = World::new();
        let first = world.spawn((Target,));
        let query = Query::<(Entity, Target)>::build(world.snapshot()).unwrap();

        world.spawn((Target,));
        world.remove_object(first);

        assert_eq!(query.len(), 1);
        assert_eq!(query.first().into_item(), Some((first, Target)));
    }

    #[test]
    fn test_empty_query_is_rejected() {
        let world = World::new();
        let err = Query::<()>::build(world.snapshot()).unwrap_err();
        assert!(matches!(err, SignatureError::EmptyQuery { .. }));
    }

    #[test]
    fn test_query_param_kind() {
        assert_eq!(
            Query::<(usize, Entity, Target)>::kind(),
            ParamKind::Query(vec![
                TermKind::Index,
                TermKind::Entity,
                TermKind::Component(ComponentTypeId::of::<Target>()),
            ])
        );
    }
}
