use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Cannot resolve {0} to an id accepted by this endpoint")]
    Resolution(String),
    #[error("Remote API error ({status}): {title}: {detail}")]
    RemoteApi { status: u16, title: String, detail: String },
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(reqwest::Error),
    #[error("Cannot encode/decode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cannot parse URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(error)
        }
    }
}
