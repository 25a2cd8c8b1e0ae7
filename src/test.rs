use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::*;

#[derive(Debug, Clone)]
struct RecordedCall {
    endpoint: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl RecordedCall {
    fn param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// Transport double: queues canned envelopes and records every call.
/// An exhausted queue answers with an empty envelope.
#[derive(Default)]
struct MockTransport {
    responses: Mutex<VecDeque<RawResponse>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    fn new() -> Arc<MockTransport> {
        Arc::new(MockTransport::default())
    }

    fn queue(&self, envelope: Value) {
        let response: RawResponse = serde_json::from_value(envelope).unwrap();
        self.responses.lock().unwrap().push_back(response);
    }

    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<Value>,
        _auth: AuthMode,
    ) -> Result<RawResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: endpoint.to_string(),
            query: query.to_vec(),
            body,
        });
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
    }
}

fn user_json(id: &str, username: &str) -> Value {
    json!({ "id": id, "name": format!("User {username}"), "username": username })
}

fn tweet_json(id: &str, author_id: &str) -> Value {
    json!({ "id": id, "text": "hello", "author_id": author_id })
}

fn seeded_user(client: &Client, id: &str, username: &str) -> User {
    let user: User = serde_json::from_value(user_json(id, username)).unwrap();
    client.users.cache().upsert(user.clone());
    user
}

// MARK: Resolution

#[tokio::test]
async fn cached_id_resolves_without_transport() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    let user = seeded_user(&client, "100", "alice");

    assert_eq!(client.users.resolve_id("100").unwrap().as_str(), "100");
    assert_eq!(client.users.resolve("100").unwrap(), user);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn cached_username_resolves_absent_does_not() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    seeded_user(&client, "100", "alice");

    assert_eq!(client.users.resolve_id("alice").unwrap().as_str(), "100");
    assert!(client.users.resolve_id("bob").is_none());
    assert_eq!(transport.call_count(), 0);
}

// MARK: Single fetch

#[tokio::test]
async fn fetch_cached_id_never_hits_transport() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    let user = seeded_user(&client, "100", "alice");

    let fetched = client.users.fetch("100", FetchOptions::default()).await.unwrap();
    assert_eq!(fetched.unwrap(), user);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn skip_cache_check_always_hits_transport_once() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    seeded_user(&client, "100", "alice");
    transport.queue(json!({ "data": user_json("100", "alice_fresh") }));

    let options = FetchOptions {
        skip_cache_check: true,
        ..Default::default()
    };
    let fetched = client.users.fetch("100", options).await.unwrap().unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(transport.calls()[0].endpoint, "users/100");
    assert_eq!(fetched.username, "alice_fresh");
    // Last write wins in the cache.
    assert_eq!(client.users.resolve("100").unwrap().username, "alice_fresh");
}

#[tokio::test]
async fn username_miss_goes_to_username_endpoint_then_caches() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    transport.queue(json!({ "data": user_json("100", "alice") }));

    let fetched = client.users.fetch("alice", FetchOptions::default()).await.unwrap();
    assert_eq!(fetched.unwrap().id.as_str(), "100");
    assert_eq!(transport.calls()[0].endpoint, "users/by/username/alice");

    // Now resolvable from the cache by username, no further call.
    let again = client.users.fetch("alice", FetchOptions::default()).await.unwrap();
    assert_eq!(again.unwrap().id.as_str(), "100");
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn tweet_key_without_cache_entry_is_resolution_error() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());

    let error = client.tweets.fetch("not-an-id", FetchOptions::default()).await.unwrap_err();
    assert!(matches!(error, Error::Resolution(_)));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn zero_result_count_yields_none() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    transport.queue(json!({ "meta": { "result_count": 0 } }));

    let fetched = client.users.fetch("404", FetchOptions::default()).await.unwrap();
    assert!(fetched.is_none());
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn round_trip_entity_equals_cached_copy() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    transport.queue(json!({ "data": tweet_json("900", "100") }));

    let fetched = client.tweets.fetch("900", FetchOptions::default()).await.unwrap().unwrap();
    let cached = client.tweets.resolve("900").unwrap();
    assert_eq!(fetched, cached);
    assert_eq!(client.tweets.cache().len(), 1);
}

#[tokio::test]
async fn cache_after_fetching_false_leaves_caches_untouched() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    transport.queue(json!({
        "data": tweet_json("900", "100"),
        "includes": { "users": [user_json("100", "alice")] },
    }));

    let options = FetchOptions {
        cache_after_fetching: false,
        ..Default::default()
    };
    let fetched = client.tweets.fetch("900", options).await.unwrap();
    assert!(fetched.is_some());
    assert!(client.tweets.cache().is_empty());
    assert!(client.users.cache().is_empty());
}

#[tokio::test]
async fn includes_are_routed_to_their_own_caches() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    transport.queue(json!({
        "data": tweet_json("900", "100"),
        "includes": { "users": [user_json("100", "alice")] },
    }));

    client.tweets.fetch("900", FetchOptions::default()).await.unwrap();
    assert_eq!(client.users.resolve("alice").unwrap().id.as_str(), "100");
    assert_eq!(client.users.cache().len(), 1);
    assert_eq!(client.tweets.cache().len(), 1);
}

// MARK: Batch fetch

#[tokio::test]
async fn batch_fetch_issues_one_call_covering_all_ids() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    seeded_user(&client, "1", "alice");
    transport.queue(json!({
        "data": [user_json("1", "alice"), user_json("2", "bob"), user_json("3", "carol")],
        "meta": { "result_count": 3 },
    }));

    let request = UserBatch::ByIdList(vec![
        "1".parse().unwrap(),
        "2".parse().unwrap(),
        "3".parse().unwrap(),
    ]);
    let users = client.users.fetch_many(request, FetchOptions::default()).await.unwrap();

    // Batch paths always confirm over the wire, even for the cached id.
    assert_eq!(transport.call_count(), 1);
    assert_eq!(transport.calls()[0].endpoint, "users");
    assert_eq!(transport.calls()[0].param("ids").unwrap(), "1,2,3");
    let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, ["1", "2", "3"]);
}

#[tokio::test]
async fn batch_partitions_into_id_and_username_buckets() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    seeded_user(&client, "2", "bob");
    transport.queue(json!({ "data": [user_json("1", "alice"), user_json("2", "bob")] }));
    transport.queue(json!({ "data": [user_json("3", "carol")] }));

    // "bob" upgrades to the id bucket through the cache; "carol" stays a key.
    let request = UserBatch::ByResolvable(vec!["1".into(), "bob".into(), "carol".into()]);
    let users = client.users.fetch_many(request, FetchOptions::default()).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].endpoint, "users");
    assert_eq!(calls[0].param("ids").unwrap(), "1,2");
    assert_eq!(calls[1].endpoint, "users/by");
    assert_eq!(calls[1].param("usernames").unwrap(), "carol");
    assert_eq!(users.len(), 3);
    assert_eq!(users[2].username, "carol");
}

#[tokio::test]
async fn batch_zero_results_is_empty_not_error() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    transport.queue(json!({ "meta": { "result_count": 0 } }));

    let request = UserBatch::ByIdList(vec!["1".parse().unwrap()]);
    let users = client.users.fetch_many(request, FetchOptions::default()).await.unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn batch_size_is_validated_before_transport() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());

    let empty = client
        .users
        .fetch_many(UserBatch::ByIdList(Vec::new()), FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(empty, Error::InvalidArgument(_)));

    let oversized: Vec<SnowflakeId> = (0..101).map(|i| i.to_string().parse().unwrap()).collect();
    let too_many = client
        .users
        .fetch_many(UserBatch::ByIdList(oversized), FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(too_many, Error::InvalidArgument(_)));

    let bad_name = client
        .users
        .fetch_many(
            UserBatch::ByUsernameList(vec!["not a username!".to_string()]),
            FetchOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(bad_name, Error::InvalidArgument(_)));

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn spaces_by_creators_resolves_through_user_cache() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    seeded_user(&client, "100", "alice");
    transport.queue(json!({
        "data": [{ "id": "500", "state": "live", "creator_id": "100" }],
        "meta": { "result_count": 1 },
    }));

    let spaces = client
        .spaces
        .fetch_by_creators(vec!["alice".into()], FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(transport.calls()[0].endpoint, "spaces/by/creator_ids");
    assert_eq!(transport.calls()[0].param("user_ids").unwrap(), "100");
    assert_eq!(spaces[0].id.as_str(), "500");
    assert_eq!(client.spaces.cache().len(), 1);
}

// MARK: Books

#[tokio::test]
async fn book_walks_cursor_then_stays_exhausted() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    seeded_user(&client, "100", "alice");
    transport.queue(json!({
        "data": [tweet_json("900", "100")],
        "meta": { "result_count": 1, "next_token": "cursor-1" },
    }));
    transport.queue(json!({
        "data": [tweet_json("901", "100")],
        "meta": { "result_count": 1 },
    }));

    let mut book = client.tweets.user_tweets_book("alice", BookOptions::default()).unwrap();
    assert_eq!(*book.state(), BookState::Unfetched);

    let first = book.fetch_next_page().await.unwrap();
    assert_eq!(first[0].id.as_str(), "900");
    assert_eq!(*book.state(), BookState::HasPage("cursor-1".to_string()));

    let second = book.fetch_next_page().await.unwrap();
    assert_eq!(second[0].id.as_str(), "901");
    assert_eq!(*book.state(), BookState::Exhausted);
    assert!(!book.has_more());

    // The cursor travelled on the second call, under the timeline parameter.
    let calls = transport.calls();
    assert_eq!(calls[0].endpoint, "users/100/tweets");
    assert!(calls[0].param("pagination_token").is_none());
    assert_eq!(calls[1].param("pagination_token").unwrap(), "cursor-1");

    // Exhausted books answer empty without the transport.
    let third = book.fetch_next_page().await.unwrap();
    assert!(third.is_empty());
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn book_first_empty_page_exhausts() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    transport.queue(json!({ "meta": { "result_count": 0 } }));

    let mut book = client.tweets.search_book("from:alice", BookOptions::default()).unwrap();
    let page = book.fetch_next_page().await.unwrap();
    assert!(page.is_empty());
    assert_eq!(*book.state(), BookState::Exhausted);
    assert_eq!(transport.calls()[0].endpoint, "tweets/search/recent");
    assert_eq!(transport.calls()[0].param("query").unwrap(), "from:alice");
}

#[tokio::test]
async fn book_constraints_become_query_parameters() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    seeded_user(&client, "100", "alice");

    let options = BookOptions {
        exclude: vec![Exclude::Retweets, Exclude::Replies],
        max_results: Some(50),
        ..Default::default()
    };
    let mut book = client.tweets.user_tweets_book("100", options).unwrap();
    book.fetch_next_page().await.unwrap();

    let call = &transport.calls()[0];
    assert_eq!(call.param("exclude").unwrap(), "retweets,replies");
    assert_eq!(call.param("max_results").unwrap(), "50");
}

#[tokio::test]
async fn book_validation_raises_before_transport() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());

    let empty_query = client.tweets.search_book("  ", BookOptions::default()).unwrap_err();
    assert!(matches!(empty_query, Error::InvalidArgument(_)));

    let tiny_page = client
        .tweets
        .search_book(
            "rust",
            BookOptions {
                max_results: Some(5),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(tiny_page, Error::InvalidArgument(_)));

    let unknown_user = client.tweets.user_tweets_book("nobody", BookOptions::default()).unwrap_err();
    assert!(matches!(unknown_user, Error::Resolution(_)));

    assert_eq!(transport.call_count(), 0);
}

// MARK: Stream rules

#[tokio::test]
async fn created_rules_enter_cache_and_resolve_by_value() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    transport.queue(json!({
        "data": [{ "id": "7", "value": "cats has:media", "tag": "cats" }],
        "meta": { "summary": { "created": 1 } },
    }));

    let rules = client
        .stream_rules
        .create(
            vec![StreamRuleDefinition {
                value: "cats has:media".to_string(),
                tag: Some("cats".to_string()),
            }],
            FetchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(rules[0].id.as_str(), "7");
    let body = transport.calls()[0].body.clone().unwrap();
    assert_eq!(body["add"][0]["value"], "cats has:media");
    assert_eq!(
        client.stream_rules.resolve("cats has:media").unwrap().id.as_str(),
        "7"
    );
}

#[tokio::test]
async fn delete_rules_partitions_and_evicts() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    let rule: StreamRule = serde_json::from_value(json!({ "id": "7", "value": "cats" })).unwrap();
    client.stream_rules.cache().upsert(rule);

    // "cats" resolves to id 7 through the cache; "dogs" stays a raw value.
    client
        .stream_rules
        .delete(vec!["cats".into(), "dogs".into()])
        .await
        .unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].body.as_ref().unwrap()["delete"]["ids"][0], "7");
    assert_eq!(calls[1].body.as_ref().unwrap()["delete"]["values"][0], "dogs");
    assert!(client.stream_rules.cache().is_empty());
}

#[tokio::test]
async fn rule_fetch_miss_refreshes_rule_set() {
    let transport = MockTransport::new();
    let client = Client::with_transport(transport.clone());
    transport.queue(json!({
        "data": [
            { "id": "7", "value": "cats" },
            { "id": "8", "value": "dogs" },
        ],
        "meta": { "result_count": 2 },
    }));

    let rule = client
        .stream_rules
        .fetch("dogs", FetchOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rule.id.as_str(), "8");
    assert_eq!(transport.calls()[0].endpoint, "tweets/search/stream/rules");
    assert_eq!(client.stream_rules.cache().len(), 2);

    // Both rules are now cached; no further transport calls needed.
    assert!(client.stream_rules.fetch("cats", FetchOptions::default()).await.unwrap().is_some());
    assert_eq!(transport.call_count(), 1);
}
