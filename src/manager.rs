use std::sync::Arc;

use itertools::Itertools;
use serde_json::json;

use crate::book::{Book, BookOptions};
use crate::cache::{Cache, Caches};
use crate::consts::*;
use crate::entity::{Entity, SnowflakeId, Space, StreamRule, StreamRuleDefinition, Tweet, TwitterList, User};
use crate::error::{Error, Result};
use crate::resolve::Resolvable;
use crate::transport::{AuthMode, Includes, Transport};

/// Per-call fetch configuration.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Bypass the cache lookup and force a remote fetch. Only meaningful for
    /// single-fetch; batch calls always confirm over the wire.
    pub skip_cache_check: bool,
    /// Upsert fetched entities (including includes) into the caches.
    pub cache_after_fetching: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            skip_cache_check: false,
            cache_after_fetching: true,
        }
    }
}

/// Generic resolve → cache → fetch → merge pipeline shared by every manager.
/// Managers compose this with their own endpoint set; there is no manager
/// inheritance.
#[derive(Clone)]
pub(crate) struct Store<T> {
    pub(crate) cache: Cache<T>,
    pub(crate) caches: Caches,
    pub(crate) transport: Arc<dyn Transport>,
}

impl<T: Entity> Store<T> {
    pub(crate) async fn fetch_single(
        &self,
        endpoint: &str,
        query: Vec<(String, String)>,
        auth: AuthMode,
        options: FetchOptions,
    ) -> Result<Option<T>> {
        let response = self.transport.request(endpoint, &query, None, auth).await?;
        if response.is_empty() {
            return Ok(None);
        }
        let Some(data) = response.data else {
            return Ok(None);
        };
        let entity: T = serde_json::from_value(data)?;
        self.merge_includes(response.includes.as_ref(), options.cache_after_fetching);
        if options.cache_after_fetching {
            self.cache.upsert(entity.clone());
        }
        Ok(Some(entity))
    }

    /// Fetch a list endpoint once, returning entities in response order plus
    /// the next pagination token, if any.
    pub(crate) async fn fetch_collection(
        &self,
        endpoint: &str,
        query: Vec<(String, String)>,
        auth: AuthMode,
        options: FetchOptions,
    ) -> Result<(Vec<T>, Option<String>)> {
        let response = self.transport.request(endpoint, &query, None, auth).await?;
        let next_token = response.meta.as_ref().and_then(|m| m.next_token.clone());
        if response.is_empty() {
            return Ok((Vec::new(), next_token));
        }
        let Some(data) = response.data else {
            return Ok((Vec::new(), next_token));
        };
        let entities: Vec<T> = serde_json::from_value(data)?;
        self.merge_includes(response.includes.as_ref(), options.cache_after_fetching);
        if options.cache_after_fetching {
            for entity in &entities {
                self.cache.upsert(entity.clone());
            }
            tracing::info!(endpoint, count = entities.len(), "stored entities to cache");
        }
        Ok((entities, next_token))
    }

    /// Route denormalized includes into their own resource's caches,
    /// never into the requesting manager's cache.
    fn merge_includes(&self, includes: Option<&Includes>, cache_results: bool) {
        let Some(includes) = includes else { return };
        if !cache_results {
            return;
        }
        for user in includes.users.iter().unique_by(|u| u.id.clone()) {
            self.caches.users.upsert(user.clone());
        }
        for tweet in includes.tweets.iter().unique_by(|t| t.id.clone()) {
            self.caches.tweets.upsert(tweet.clone());
        }
    }
}

fn validate_batch_size(len: usize) -> Result<()> {
    if len == 0 || len > BATCH_MAX_COUNT {
        return Err(Error::InvalidArgument(format!(
            "batch requests accept between 1 and {BATCH_MAX_COUNT} items, got {len}"
        )));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<()> {
    let valid = !username.is_empty()
        && username.len() <= 15
        && username.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("not a valid username: {username:?}")))
    }
}

fn resolution_error<T: Entity>(resolvable: &Resolvable<T>) -> Error {
    Error::Resolution(resolvable.to_string())
}

fn query_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn user_query() -> Vec<(String, String)> {
    query_pairs(&[("user.fields", DEFAULT_USER_FIELDS)])
}

fn tweet_query() -> Vec<(String, String)> {
    query_pairs(&[
        ("tweet.fields", DEFAULT_TWEET_FIELDS),
        ("expansions", TWEET_EXPANSIONS),
        ("user.fields", DEFAULT_USER_FIELDS),
    ])
}

fn space_query() -> Vec<(String, String)> {
    query_pairs(&[
        ("space.fields", DEFAULT_SPACE_FIELDS),
        ("expansions", SPACE_EXPANSIONS),
        ("user.fields", DEFAULT_USER_FIELDS),
    ])
}

fn list_query() -> Vec<(String, String)> {
    query_pairs(&[
        ("list.fields", DEFAULT_LIST_FIELDS),
        ("expansions", LIST_EXPANSIONS),
        ("user.fields", DEFAULT_USER_FIELDS),
    ])
}

// MARK: Users

/// Batch request shape for users, decided at the call site.
#[derive(Debug, Clone)]
pub enum UserBatch {
    ByResolvable(Vec<Resolvable<User>>),
    ByIdList(Vec<SnowflakeId>),
    ByUsernameList(Vec<String>),
}

#[derive(Clone)]
pub struct UserManager {
    store: Store<User>,
}

impl UserManager {
    pub(crate) fn new(transport: Arc<dyn Transport>, caches: Caches) -> Self {
        UserManager {
            store: Store {
                cache: caches.users.clone(),
                caches,
                transport,
            },
        }
    }

    pub fn cache(&self) -> &Cache<User> {
        &self.store.cache
    }

    pub fn resolve_id(&self, user: impl Into<Resolvable<User>>) -> Option<SnowflakeId> {
        user.into().resolve_id(&self.store.cache)
    }

    pub fn resolve(&self, user: impl Into<Resolvable<User>>) -> Option<User> {
        user.into().resolve(&self.store.cache)
    }

    /// Fetch one user. Username resolvables that miss the cache go to the
    /// username endpoint; ids and instances go to the id endpoint.
    pub async fn fetch(&self, user: impl Into<Resolvable<User>>, options: FetchOptions) -> Result<Option<User>> {
        let resolvable = user.into();
        if !options.skip_cache_check {
            if let Some(cached) = resolvable.resolve(&self.store.cache) {
                return Ok(Some(cached));
            }
        }
        match &resolvable {
            Resolvable::Key(username) => {
                validate_username(username)?;
                let endpoint = format!("users/by/username/{username}");
                self.store.fetch_single(&endpoint, user_query(), AuthMode::App, options).await
            }
            _ => {
                let id = resolvable
                    .resolve_id(&self.store.cache)
                    .ok_or_else(|| resolution_error(&resolvable))?;
                let endpoint = format!("users/{id}");
                self.store.fetch_single(&endpoint, user_query(), AuthMode::App, options).await
            }
        }
    }

    /// Batched fetch. Inputs are partitioned into an id bucket and a
    /// username bucket with one remote call per non-empty bucket; results
    /// keep each bucket's response order, id bucket first. Batch calls
    /// always confirm over the wire; the cache only upgrades usernames
    /// already known locally into the id bucket.
    pub async fn fetch_many(&self, request: UserBatch, options: FetchOptions) -> Result<Vec<User>> {
        let (ids, usernames) = self.partition(request)?;
        validate_batch_size(ids.len() + usernames.len())?;

        let mut results = Vec::new();
        if !ids.is_empty() {
            let mut query = user_query();
            query.push(("ids".to_string(), ids.iter().join(",")));
            let (users, _) = self.store.fetch_collection("users", query, AuthMode::App, options).await?;
            results.extend(users);
        }
        if !usernames.is_empty() {
            let mut query = user_query();
            query.push(("usernames".to_string(), usernames.iter().join(",")));
            let (users, _) = self
                .store
                .fetch_collection("users/by", query, AuthMode::App, options)
                .await?;
            results.extend(users);
        }
        Ok(results)
    }

    fn partition(&self, request: UserBatch) -> Result<(Vec<SnowflakeId>, Vec<String>)> {
        let mut ids = Vec::new();
        let mut usernames = Vec::new();
        match request {
            UserBatch::ByIdList(list) => ids = list,
            UserBatch::ByUsernameList(list) => {
                for username in &list {
                    validate_username(username)?;
                }
                usernames = list;
            }
            UserBatch::ByResolvable(list) => {
                for resolvable in list {
                    match resolvable.resolve_id(&self.store.cache) {
                        Some(id) => ids.push(id),
                        None => match resolvable {
                            Resolvable::Key(username) => {
                                validate_username(&username)?;
                                usernames.push(username);
                            }
                            _ => return Err(resolution_error(&resolvable)),
                        },
                    }
                }
            }
        }
        Ok((ids, usernames))
    }

    pub fn followers_book(&self, user: impl Into<Resolvable<User>>, options: BookOptions) -> Result<Book<User>> {
        let id = self.subject_id(user)?;
        Book::new(
            self.store.clone(),
            format!("users/{id}/followers"),
            user_query(),
            "pagination_token",
            options,
        )
    }

    pub fn following_book(&self, user: impl Into<Resolvable<User>>, options: BookOptions) -> Result<Book<User>> {
        let id = self.subject_id(user)?;
        Book::new(
            self.store.clone(),
            format!("users/{id}/following"),
            user_query(),
            "pagination_token",
            options,
        )
    }

    fn subject_id(&self, user: impl Into<Resolvable<User>>) -> Result<SnowflakeId> {
        let resolvable = user.into();
        resolvable
            .resolve_id(&self.store.cache)
            .ok_or_else(|| resolution_error(&resolvable))
    }
}

// MARK: Tweets

#[derive(Clone)]
pub struct TweetManager {
    store: Store<Tweet>,
}

impl TweetManager {
    pub(crate) fn new(transport: Arc<dyn Transport>, caches: Caches) -> Self {
        TweetManager {
            store: Store {
                cache: caches.tweets.clone(),
                caches,
                transport,
            },
        }
    }

    pub fn cache(&self) -> &Cache<Tweet> {
        &self.store.cache
    }

    pub fn resolve_id(&self, tweet: impl Into<Resolvable<Tweet>>) -> Option<SnowflakeId> {
        tweet.into().resolve_id(&self.store.cache)
    }

    pub fn resolve(&self, tweet: impl Into<Resolvable<Tweet>>) -> Option<Tweet> {
        tweet.into().resolve(&self.store.cache)
    }

    /// Fetch one tweet by id. Tweets have no secondary-key endpoint, so a
    /// key resolvable that misses the cache cannot be fetched.
    pub async fn fetch(&self, tweet: impl Into<Resolvable<Tweet>>, options: FetchOptions) -> Result<Option<Tweet>> {
        let resolvable = tweet.into();
        if !options.skip_cache_check {
            if let Some(cached) = resolvable.resolve(&self.store.cache) {
                return Ok(Some(cached));
            }
        }
        let id = resolvable
            .resolve_id(&self.store.cache)
            .ok_or_else(|| resolution_error(&resolvable))?;
        let endpoint = format!("tweets/{id}");
        self.store.fetch_single(&endpoint, tweet_query(), AuthMode::App, options).await
    }

    /// Batched fetch by id. Always one remote call covering every requested
    /// tweet, in response order.
    pub async fn fetch_many(&self, tweets: Vec<Resolvable<Tweet>>, options: FetchOptions) -> Result<Vec<Tweet>> {
        validate_batch_size(tweets.len())?;
        let ids: Vec<SnowflakeId> = tweets
            .iter()
            .map(|r| r.resolve_id(&self.store.cache).ok_or_else(|| resolution_error(r)))
            .collect::<Result<_>>()?;

        let mut query = tweet_query();
        query.push(("ids".to_string(), ids.iter().join(",")));
        let (results, _) = self.store.fetch_collection("tweets", query, AuthMode::App, options).await?;
        Ok(results)
    }

    pub fn search_book(&self, query: &str, options: BookOptions) -> Result<Book<Tweet>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument("search query must not be empty".to_string()));
        }
        if let Some(max_results) = options.max_results {
            if max_results < SEARCH_PAGE_MIN_COUNT {
                return Err(Error::InvalidArgument(format!(
                    "search pages hold at least {SEARCH_PAGE_MIN_COUNT} results, got {max_results}"
                )));
            }
        }
        let mut base = tweet_query();
        base.push(("query".to_string(), query.to_string()));
        Book::new(
            self.store.clone(),
            "tweets/search/recent".to_string(),
            base,
            "next_token",
            options,
        )
    }

    pub fn user_tweets_book(&self, user: impl Into<Resolvable<User>>, options: BookOptions) -> Result<Book<Tweet>> {
        let id = self.subject_user_id(user)?;
        Book::new(
            self.store.clone(),
            format!("users/{id}/tweets"),
            tweet_query(),
            "pagination_token",
            options,
        )
    }

    pub fn liked_tweets_book(&self, user: impl Into<Resolvable<User>>, options: BookOptions) -> Result<Book<Tweet>> {
        let id = self.subject_user_id(user)?;
        Book::new(
            self.store.clone(),
            format!("users/{id}/liked_tweets"),
            tweet_query(),
            "pagination_token",
            options,
        )
    }

    fn subject_user_id(&self, user: impl Into<Resolvable<User>>) -> Result<SnowflakeId> {
        let resolvable = user.into();
        resolvable
            .resolve_id(&self.store.caches.users)
            .ok_or_else(|| resolution_error(&resolvable))
    }
}

// MARK: Spaces

#[derive(Clone)]
pub struct SpaceManager {
    store: Store<Space>,
}

impl SpaceManager {
    pub(crate) fn new(transport: Arc<dyn Transport>, caches: Caches) -> Self {
        SpaceManager {
            store: Store {
                cache: caches.spaces.clone(),
                caches,
                transport,
            },
        }
    }

    pub fn cache(&self) -> &Cache<Space> {
        &self.store.cache
    }

    pub fn resolve_id(&self, space: impl Into<Resolvable<Space>>) -> Option<SnowflakeId> {
        space.into().resolve_id(&self.store.cache)
    }

    pub fn resolve(&self, space: impl Into<Resolvable<Space>>) -> Option<Space> {
        space.into().resolve(&self.store.cache)
    }

    pub async fn fetch(&self, space: impl Into<Resolvable<Space>>, options: FetchOptions) -> Result<Option<Space>> {
        let resolvable = space.into();
        if !options.skip_cache_check {
            if let Some(cached) = resolvable.resolve(&self.store.cache) {
                return Ok(Some(cached));
            }
        }
        let id = resolvable
            .resolve_id(&self.store.cache)
            .ok_or_else(|| resolution_error(&resolvable))?;
        let endpoint = format!("spaces/{id}");
        self.store.fetch_single(&endpoint, space_query(), AuthMode::App, options).await
    }

    pub async fn fetch_many(&self, spaces: Vec<Resolvable<Space>>, options: FetchOptions) -> Result<Vec<Space>> {
        validate_batch_size(spaces.len())?;
        let ids: Vec<SnowflakeId> = spaces
            .iter()
            .map(|r| r.resolve_id(&self.store.cache).ok_or_else(|| resolution_error(r)))
            .collect::<Result<_>>()?;

        let mut query = space_query();
        query.push(("ids".to_string(), ids.iter().join(",")));
        let (results, _) = self.store.fetch_collection("spaces", query, AuthMode::App, options).await?;
        Ok(results)
    }

    /// Fetch live and scheduled spaces created by the given users.
    pub async fn fetch_by_creators(
        &self,
        creators: Vec<Resolvable<User>>,
        options: FetchOptions,
    ) -> Result<Vec<Space>> {
        validate_batch_size(creators.len())?;
        let ids: Vec<SnowflakeId> = creators
            .iter()
            .map(|r| r.resolve_id(&self.store.caches.users).ok_or_else(|| resolution_error(r)))
            .collect::<Result<_>>()?;

        let mut query = space_query();
        query.push(("user_ids".to_string(), ids.iter().join(",")));
        let (results, _) = self
            .store
            .fetch_collection("spaces/by/creator_ids", query, AuthMode::App, options)
            .await?;
        Ok(results)
    }

    pub async fn search(&self, query: &str, state: Option<&str>, options: FetchOptions) -> Result<Vec<Space>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument("search query must not be empty".to_string()));
        }
        let mut params = space_query();
        params.push(("query".to_string(), query.to_string()));
        if let Some(state) = state {
            params.push(("state".to_string(), state.to_string()));
        }
        let (results, _) = self
            .store
            .fetch_collection("spaces/search", params, AuthMode::App, options)
            .await?;
        Ok(results)
    }
}

// MARK: Lists

#[derive(Clone)]
pub struct ListManager {
    store: Store<TwitterList>,
}

impl ListManager {
    pub(crate) fn new(transport: Arc<dyn Transport>, caches: Caches) -> Self {
        ListManager {
            store: Store {
                cache: caches.lists.clone(),
                caches,
                transport,
            },
        }
    }

    pub fn cache(&self) -> &Cache<TwitterList> {
        &self.store.cache
    }

    pub fn resolve_id(&self, list: impl Into<Resolvable<TwitterList>>) -> Option<SnowflakeId> {
        list.into().resolve_id(&self.store.cache)
    }

    pub fn resolve(&self, list: impl Into<Resolvable<TwitterList>>) -> Option<TwitterList> {
        list.into().resolve(&self.store.cache)
    }

    pub async fn fetch(
        &self,
        list: impl Into<Resolvable<TwitterList>>,
        options: FetchOptions,
    ) -> Result<Option<TwitterList>> {
        let resolvable = list.into();
        if !options.skip_cache_check {
            if let Some(cached) = resolvable.resolve(&self.store.cache) {
                return Ok(Some(cached));
            }
        }
        let id = resolvable
            .resolve_id(&self.store.cache)
            .ok_or_else(|| resolution_error(&resolvable))?;
        let endpoint = format!("lists/{id}");
        self.store.fetch_single(&endpoint, list_query(), AuthMode::App, options).await
    }

    pub fn owned_lists_book(
        &self,
        user: impl Into<Resolvable<User>>,
        options: BookOptions,
    ) -> Result<Book<TwitterList>> {
        let resolvable = user.into();
        let id = resolvable
            .resolve_id(&self.store.caches.users)
            .ok_or_else(|| resolution_error(&resolvable))?;
        Book::new(
            self.store.clone(),
            format!("users/{id}/owned_lists"),
            list_query(),
            "pagination_token",
            options,
        )
    }
}

// MARK: Stream rules

#[derive(Clone)]
pub struct StreamRuleManager {
    store: Store<StreamRule>,
}

impl StreamRuleManager {
    pub(crate) fn new(transport: Arc<dyn Transport>, caches: Caches) -> Self {
        StreamRuleManager {
            store: Store {
                cache: caches.stream_rules.clone(),
                caches,
                transport,
            },
        }
    }

    pub fn cache(&self) -> &Cache<StreamRule> {
        &self.store.cache
    }

    pub fn resolve_id(&self, rule: impl Into<Resolvable<StreamRule>>) -> Option<SnowflakeId> {
        rule.into().resolve_id(&self.store.cache)
    }

    pub fn resolve(&self, rule: impl Into<Resolvable<StreamRule>>) -> Option<StreamRule> {
        rule.into().resolve(&self.store.cache)
    }

    /// Fetch every rule installed on the filtered stream.
    pub async fn fetch_all(&self, options: FetchOptions) -> Result<Vec<StreamRule>> {
        let (rules, _) = self
            .store
            .fetch_collection("tweets/search/stream/rules", Vec::new(), AuthMode::App, options)
            .await?;
        Ok(rules)
    }

    /// Fetch one rule. The API has no single-rule endpoint, so a cache miss
    /// refreshes the whole rule set and answers from it.
    pub async fn fetch(
        &self,
        rule: impl Into<Resolvable<StreamRule>>,
        options: FetchOptions,
    ) -> Result<Option<StreamRule>> {
        let resolvable = rule.into();
        if !options.skip_cache_check {
            if let Some(cached) = resolvable.resolve(&self.store.cache) {
                return Ok(Some(cached));
            }
        }
        let rules = self.fetch_all(options).await?;
        let found = match &resolvable {
            Resolvable::Id(id) => rules.into_iter().find(|r| &r.id == id),
            Resolvable::Entity(entity) => rules.into_iter().find(|r| r.id == entity.id),
            Resolvable::Key(value) => rules.into_iter().find(|r| &r.value == value),
        };
        Ok(found)
    }

    pub async fn create(&self, definitions: Vec<StreamRuleDefinition>, options: FetchOptions) -> Result<Vec<StreamRule>> {
        validate_batch_size(definitions.len())?;
        for definition in &definitions {
            if definition.value.trim().is_empty() {
                return Err(Error::InvalidArgument("rule value must not be empty".to_string()));
            }
        }

        let body = json!({ "add": definitions });
        let response = self
            .store
            .transport
            .request("tweets/search/stream/rules", &[], Some(body), AuthMode::App)
            .await?;
        let Some(data) = response.data else {
            return Ok(Vec::new());
        };
        let rules: Vec<StreamRule> = serde_json::from_value(data)?;
        if options.cache_after_fetching {
            for rule in &rules {
                self.store.cache.upsert(rule.clone());
            }
        }
        Ok(rules)
    }

    /// Delete rules by id or by value. One remote call per bucket, then the
    /// deleted entries are evicted from the cache.
    pub async fn delete(&self, rules: Vec<Resolvable<StreamRule>>) -> Result<()> {
        validate_batch_size(rules.len())?;

        let mut ids: Vec<SnowflakeId> = Vec::new();
        let mut values: Vec<String> = Vec::new();
        for resolvable in rules {
            match resolvable.resolve_id(&self.store.cache) {
                Some(id) => ids.push(id),
                None => match resolvable {
                    Resolvable::Key(value) => values.push(value),
                    _ => return Err(resolution_error(&resolvable)),
                },
            }
        }

        if !ids.is_empty() {
            let body = json!({ "delete": { "ids": &ids } });
            self.store
                .transport
                .request("tweets/search/stream/rules", &[], Some(body), AuthMode::App)
                .await?;
            for id in &ids {
                self.store.cache.remove(id);
            }
        }
        if !values.is_empty() {
            let body = json!({ "delete": { "values": &values } });
            self.store
                .transport
                .request("tweets/search/stream/rules", &[], Some(body), AuthMode::App)
                .await?;
            for value in &values {
                if let Some(rule) = self.store.cache.find_by_key(value) {
                    self.store.cache.remove(&rule.id);
                }
            }
        }
        Ok(())
    }
}
