use std::fmt::{Display, Formatter};

use crate::cache::Cache;
use crate::entity::{Entity, SnowflakeId};

/// Caller-supplied reference to an entity: a canonical id, a secondary key
/// such as a username, or a live instance. The variant is decided once at the
/// call site; managers pick endpoints by variant, not by re-sniffing strings.
#[derive(Debug, Clone)]
pub enum Resolvable<T> {
    Id(SnowflakeId),
    Key(String),
    Entity(T),
}

impl<T> From<SnowflakeId> for Resolvable<T> {
    fn from(id: SnowflakeId) -> Self {
        Resolvable::Id(id)
    }
}

/// Strings are classified by format: a valid snowflake becomes `Id`,
/// anything else becomes `Key`. Deterministic for a given input.
impl<T> From<&str> for Resolvable<T> {
    fn from(s: &str) -> Self {
        match SnowflakeId::parse(s) {
            Some(id) => Resolvable::Id(id),
            None => Resolvable::Key(s.to_string()),
        }
    }
}

impl<T> From<String> for Resolvable<T> {
    fn from(s: String) -> Self {
        s.as_str().into()
    }
}

macro_rules! resolvable_from_entity {
    ($($entity:ty),+ $(,)?) => {
        $(impl From<$entity> for Resolvable<$entity> {
            fn from(entity: $entity) -> Self {
                Resolvable::Entity(entity)
            }
        })+
    };
}

resolvable_from_entity!(
    crate::entity::User,
    crate::entity::Tweet,
    crate::entity::Space,
    crate::entity::TwitterList,
    crate::entity::StreamRule,
);

impl<T: Entity> Display for Resolvable<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolvable::Id(id) => write!(f, "id {id}"),
            Resolvable::Key(key) => write!(f, "key {key:?}"),
            Resolvable::Entity(entity) => write!(f, "entity {}", entity.id()),
        }
    }
}

impl<T: Entity> Resolvable<T> {
    /// Resolve to a canonical id against the given cache.
    ///
    /// Ids and live instances answer directly; keys scan the cache for a
    /// matching secondary key. `None` means unresolved, never an error.
    pub fn resolve_id(&self, cache: &Cache<T>) -> Option<SnowflakeId> {
        match self {
            Resolvable::Id(id) => Some(id.clone()),
            Resolvable::Entity(entity) => Some(entity.id().clone()),
            Resolvable::Key(key) => cache.find_by_key(key).map(|e| e.id().clone()),
        }
    }

    /// Resolve to the cached entity. A live instance still answers from the
    /// cache slot so callers observe the canonical cached copy.
    pub fn resolve(&self, cache: &Cache<T>) -> Option<T> {
        self.resolve_id(cache).and_then(|id| cache.get(&id))
    }
}
