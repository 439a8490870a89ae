use thiserror::Error;

/// Failures reported by external generation services.
///
/// The split between `Transient` and `Fatal` drives the retry controller:
/// transient failures (timeouts, 5xx, throttling) are worth another attempt,
/// fatal ones (rejected input, bad credentials) are not.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Provider rejected the request: {0}")]
    Fatal(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Map an HTTP status to the transient/fatal split. Client errors are
    /// treated as fatal except 408 and 429, which clear up on their own.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status.is_server_error()
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            Self::Transient(format!("HTTP {status}: {body}"))
        } else {
            Self::Fatal(format!("HTTP {status}: {body}"))
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Http(_) => true,
            Self::Malformed(_) => true,
            Self::Fatal(_) => false,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
