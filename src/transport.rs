use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::consts::API_BASE;
use crate::entity::{Tweet, User};
use crate::error::{Error, Result};

/// Which credential signs the call. Most read endpoints accept app-only
/// bearer auth; filtered-stream rule management requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    App,
    User,
}

/// Bearer tokens for both auth modes. Header construction happens in the
/// transport; OAuth signing beyond that is out of scope.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub bearer_token: String,
    pub user_token: Option<String>,
}

impl Credentials {
    pub fn app_only(bearer_token: impl Into<String>) -> Self {
        Credentials {
            bearer_token: bearer_token.into(),
            user_token: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        let bearer_token = std::env::var("TWITTER_BEARER_TOKEN")
            .map_err(|_| Error::InvalidArgument("TWITTER_BEARER_TOKEN is not set".to_string()))?;
        let user_token = std::env::var("TWITTER_USER_TOKEN").ok();
        Ok(Credentials {
            bearer_token,
            user_token,
        })
    }

    fn token_for(&self, auth: AuthMode) -> &str {
        match auth {
            AuthMode::App => &self.bearer_token,
            AuthMode::User => self.user_token.as_deref().unwrap_or(&self.bearer_token),
        }
    }
}

/// Pagination and count metadata from the response envelope.
/// `result_count == 0` is the canonical "no results" signal.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Meta {
    pub result_count: Option<u64>,
    pub next_token: Option<String>,
    pub previous_token: Option<String>,
    pub summary: Option<Value>,
}

/// Denormalized related entities embedded alongside the primary data.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub tweets: Vec<Tweet>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ApiError {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub value: Option<String>,
}

/// The v2 response envelope. `data` stays raw JSON here; managers know
/// whether to read it as one entity or a list.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawResponse {
    pub data: Option<Value>,
    pub includes: Option<Includes>,
    pub meta: Option<Meta>,
    pub errors: Option<Vec<ApiError>>,
}

impl RawResponse {
    /// True when the envelope carries no usable primary data.
    pub fn is_empty(&self) -> bool {
        if let Some(meta) = &self.meta {
            if meta.result_count == Some(0) {
                return true;
            }
        }
        match &self.data {
            None | Some(Value::Null) => true,
            Some(Value::Array(items)) => items.is_empty(),
            _ => false,
        }
    }
}

/// One signed HTTP call against the API. Retry and backoff policy belongs to
/// implementations, not to the managers above this seam.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<Value>,
        auth: AuthMode,
    ) -> Result<RawResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    credentials: Credentials,
}

impl HttpTransport {
    pub fn new(credentials: Credentials) -> Result<HttpTransport> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static("twitter_api-rs"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(HttpTransport { client, credentials })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<Value>,
        auth: AuthMode,
    ) -> Result<RawResponse> {
        let base_url = format!("{}/{}", API_BASE, endpoint);
        let url = if query.is_empty() {
            Url::parse(&base_url)?
        } else {
            Url::parse_with_params(&base_url, query)?
        };
        tracing::debug!(%url, has_body = body.is_some(), "twitter api request");

        let token = self.credentials.token_for(auth);
        let request = match &body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.get(url),
        };
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        let content = response.text().await?;
        tracing::trace!(%status, body = %content, "twitter api response");

        if !status.is_success() {
            let envelope: ErrorEnvelope = serde_json::from_str(&content).unwrap_or_default();
            return Err(Error::RemoteApi {
                status: status.as_u16(),
                title: envelope.title.unwrap_or_else(|| "Unknown".to_string()),
                detail: envelope.detail.unwrap_or_else(|| status.to_string()),
            });
        }

        let response: RawResponse = serde_json::from_str(&content)?;
        if let Some(errors) = &response.errors {
            tracing::warn!(count = errors.len(), "response carries partial errors");
        }
        Ok(response)
    }
}

#[derive(Deserialize, Debug, Default)]
struct ErrorEnvelope {
    title: Option<String>,
    detail: Option<String>,
}
