use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::entity::{Entity, SnowflakeId, Space, StreamRule, Tweet, TwitterList, User};

/// Shared per-resource entity cache, keyed by snowflake id.
///
/// Entries are whole-object upserts; a re-fetch replaces the previous copy
/// (last write wins). Lifetime is the client session.
#[derive(Debug)]
pub struct Cache<T> {
    inner: Arc<Mutex<HashMap<SnowflakeId, T>>>,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Cache {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity> Cache<T> {
    pub fn new() -> Self {
        Cache {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SnowflakeId, T>> {
        // No await ever happens under this lock, so poisoning implies a
        // panic in a plain map operation.
        self.inner.lock().expect("cache mutex poisoned")
    }

    pub fn get(&self, id: &SnowflakeId) -> Option<T> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &SnowflakeId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn upsert(&self, entity: T) {
        self.lock().insert(entity.id().clone(), entity);
    }

    pub fn remove(&self, id: &SnowflakeId) -> Option<T> {
        self.lock().remove(id)
    }

    /// Linear scan for an entry whose secondary key matches.
    /// O(cache size); caches are bounded by session activity.
    pub fn find_by_key(&self, key: &str) -> Option<T> {
        self.lock().values().find(|e| e.secondary_key() == Some(key)).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear()
    }
}

/// Handles to every resource cache in a client session.
///
/// Managers carry a clone of this so that denormalized `includes` entities can
/// be routed into their own resource's cache rather than the requesting one.
/// It is a non-owning context handle; entities never point back at it.
#[derive(Debug, Clone, Default)]
pub struct Caches {
    pub users: Cache<User>,
    pub tweets: Cache<Tweet>,
    pub spaces: Cache<Space>,
    pub lists: Cache<TwitterList>,
    pub stream_rules: Cache<StreamRule>,
}

impl Caches {
    pub fn new() -> Self {
        Caches::default()
    }
}
