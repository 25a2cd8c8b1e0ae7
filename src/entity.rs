use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Opaque, platform-assigned numeric-string identifier.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SnowflakeId(String);

impl SnowflakeId {
    /// Validate a snowflake: non-empty, ASCII digits only.
    pub fn parse(s: &str) -> Option<SnowflakeId> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            Some(SnowflakeId(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SnowflakeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SnowflakeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SnowflakeId::parse(s).ok_or_else(|| Error::InvalidArgument(format!("not a snowflake id: {s:?}")))
    }
}

/// A cacheable domain object fetched from the API.
///
/// `secondary_key` is the human-readable handle some resources carry next to
/// their id (username for users, rule value for stream rules). It is stable
/// but not guaranteed unique over time, so it only ever resolves against the
/// local cache.
pub trait Entity: Clone + PartialEq + serde::de::DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &SnowflakeId;

    fn secondary_key(&self) -> Option<&str> {
        None
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct UserPublicMetrics {
    #[serde(default)]
    pub followers_count: u32,
    #[serde(default)]
    pub following_count: u32,
    #[serde(default)]
    pub tweet_count: u32,
    #[serde(default)]
    pub listed_count: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: SnowflakeId,
    pub name: String,
    pub username: String,
    pub created_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub pinned_tweet_id: Option<SnowflakeId>,
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub verified: bool,
    pub url: Option<String>,
    #[serde(default)]
    pub public_metrics: UserPublicMetrics,
}

impl Entity for User {
    fn id(&self) -> &SnowflakeId {
        &self.id
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.username)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct TweetPublicMetrics {
    #[serde(default)]
    pub retweet_count: u32,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub quote_count: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: SnowflakeId,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Tweet {
    pub id: SnowflakeId,
    pub text: String,
    pub author_id: Option<SnowflakeId>,
    pub conversation_id: Option<SnowflakeId>,
    pub created_at: Option<DateTime<Utc>>,
    pub in_reply_to_user_id: Option<SnowflakeId>,
    pub lang: Option<String>,
    #[serde(default)]
    pub possibly_sensitive: bool,
    #[serde(default)]
    pub referenced_tweets: Vec<ReferencedTweet>,
    pub reply_settings: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub public_metrics: TweetPublicMetrics,
}

impl Entity for Tweet {
    fn id(&self) -> &SnowflakeId {
        &self.id
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Space {
    pub id: SnowflakeId,
    pub state: String,
    pub title: Option<String>,
    pub creator_id: Option<SnowflakeId>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub lang: Option<String>,
    #[serde(default)]
    pub host_ids: Vec<SnowflakeId>,
    #[serde(default)]
    pub speaker_ids: Vec<SnowflakeId>,
    #[serde(default)]
    pub participant_count: u32,
}

impl Entity for Space {
    fn id(&self) -> &SnowflakeId {
        &self.id
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TwitterList {
    pub id: SnowflakeId,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<SnowflakeId>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub follower_count: u32,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub private: bool,
}

impl Entity for TwitterList {
    fn id(&self) -> &SnowflakeId {
        &self.id
    }
}

/// A rule installed on the filtered stream.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StreamRule {
    pub id: SnowflakeId,
    pub value: String,
    pub tag: Option<String>,
}

impl Entity for StreamRule {
    fn id(&self) -> &SnowflakeId {
        &self.id
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.value)
    }
}

/// Payload for installing a new filtered-stream rule.
#[derive(Serialize, Debug, Clone)]
pub struct StreamRuleDefinition {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}
