use chrono::{DateTime, SecondsFormat, Utc};

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::manager::{FetchOptions, Store};
use crate::transport::AuthMode;

/// Immutable page constraints for a book: date range, exclusion filters,
/// page size. Fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct BookOptions {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exclude: Vec<Exclude>,
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclude {
    Retweets,
    Replies,
}

impl Exclude {
    fn as_str(&self) -> &'static str {
        match self {
            Exclude::Retweets => "retweets",
            Exclude::Replies => "replies",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookState {
    Unfetched,
    HasPage(String),
    Exhausted,
}

/// Cursor-based pagination over a sequence of remote pages.
///
/// State machine: `Unfetched -> HasPage(cursor) -> Exhausted`. Once exhausted
/// a book stays exhausted; recreate it to start over. `fetch_next_page` takes
/// `&mut self`, so pages are inherently fetched sequentially.
pub struct Book<T> {
    store: Store<T>,
    endpoint: String,
    query: Vec<(String, String)>,
    cursor_param: &'static str,
    state: BookState,
}

impl<T> std::fmt::Debug for Book<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Book")
            .field("endpoint", &self.endpoint)
            .field("query", &self.query)
            .field("cursor_param", &self.cursor_param)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T: Entity> Book<T> {
    pub(crate) fn new(
        store: Store<T>,
        endpoint: String,
        mut query: Vec<(String, String)>,
        cursor_param: &'static str,
        options: BookOptions,
    ) -> Result<Book<T>> {
        if let Some(max_results) = options.max_results {
            if max_results == 0 || max_results > crate::consts::PAGE_DEFAULT_COUNT {
                return Err(Error::InvalidArgument(format!(
                    "max_results must be between 1 and {}, got {max_results}",
                    crate::consts::PAGE_DEFAULT_COUNT
                )));
            }
            query.push(("max_results".to_string(), max_results.to_string()));
        }
        if let Some(start_time) = options.start_time {
            query.push((
                "start_time".to_string(),
                start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(end_time) = options.end_time {
            query.push((
                "end_time".to_string(),
                end_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if !options.exclude.is_empty() {
            let excluded: Vec<&str> = options.exclude.iter().map(Exclude::as_str).collect();
            query.push(("exclude".to_string(), excluded.join(",")));
        }

        Ok(Book {
            store,
            endpoint,
            query,
            cursor_param,
            state: BookState::Unfetched,
        })
    }

    pub fn state(&self) -> &BookState {
        &self.state
    }

    pub fn has_more(&self) -> bool {
        self.state != BookState::Exhausted
    }

    /// Fetch the next page. Returns an empty collection once exhausted,
    /// without touching the network. Fetched entities are cached through the
    /// underlying manager's pipeline.
    pub async fn fetch_next_page(&mut self) -> Result<Vec<T>> {
        if self.state == BookState::Exhausted {
            return Ok(Vec::new());
        }

        let mut query = self.query.clone();
        if let BookState::HasPage(cursor) = &self.state {
            query.push((self.cursor_param.to_string(), cursor.clone()));
        }

        let (entities, next_token) = self
            .store
            .fetch_collection(&self.endpoint, query, AuthMode::App, FetchOptions::default())
            .await?;
        self.state = match next_token {
            Some(token) => BookState::HasPage(token),
            None => BookState::Exhausted,
        };
        Ok(entities)
    }
}
