//! Typed client for the Twitter v2 API.
//!
//! Each resource type gets a manager that resolves heterogeneous references
//! (id, username, or live instance) to canonical ids, answers from an
//! in-memory cache when it can, and merges response envelopes — including
//! denormalized `includes` — back into the per-resource caches. Cursor
//! pagination is exposed through [`Book`]s.
//!
//! ```no_run
//! # async fn run() -> twitter_api::Result<()> {
//! use twitter_api::{Client, Credentials, FetchOptions};
//!
//! let client = Client::new(Credentials::from_env()?)?;
//! let user = client.users.fetch("jack", FetchOptions::default()).await?;
//! // Second fetch answers from the cache, no network call.
//! let same = client.users.fetch("jack", FetchOptions::default()).await?;
//! assert_eq!(user, same);
//! # Ok(())
//! # }
//! ```

mod book;
mod cache;
mod consts;
mod entity;
mod error;
mod manager;
mod resolve;
mod transport;

#[cfg(test)]
mod test;

use std::sync::Arc;

pub use book::{Book, BookOptions, BookState, Exclude};
pub use cache::{Cache, Caches};
pub use entity::{
    Entity, ReferencedTweet, SnowflakeId, Space, StreamRule, StreamRuleDefinition, Tweet, TweetPublicMetrics,
    TwitterList, User, UserPublicMetrics,
};
pub use error::{Error, Result};
pub use manager::{FetchOptions, ListManager, SpaceManager, StreamRuleManager, TweetManager, UserBatch, UserManager};
pub use resolve::Resolvable;
pub use transport::{ApiError, AuthMode, Credentials, HttpTransport, Includes, Meta, RawResponse, Transport};

/// Entry point holding one manager per resource type. Managers share a
/// transport and a [`Caches`] context that lives for the client session.
#[derive(Clone)]
pub struct Client {
    pub users: UserManager,
    pub tweets: TweetManager,
    pub spaces: SpaceManager,
    pub lists: ListManager,
    pub stream_rules: StreamRuleManager,
}

impl Client {
    pub fn new(credentials: Credentials) -> Result<Client> {
        let transport = Arc::new(HttpTransport::new(credentials)?);
        Ok(Client::with_transport(transport))
    }

    /// Build a client over a custom transport. The seam tests use to swap in
    /// a recording mock.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Client {
        let caches = Caches::new();
        Client {
            users: UserManager::new(transport.clone(), caches.clone()),
            tweets: TweetManager::new(transport.clone(), caches.clone()),
            spaces: SpaceManager::new(transport.clone(), caches.clone()),
            lists: ListManager::new(transport.clone(), caches.clone()),
            stream_rules: StreamRuleManager::new(transport, caches),
        }
    }
}
