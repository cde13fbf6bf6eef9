use std::fmt;

/// Errors that can occur while talking to the backend.
/// Every variant maps to a user-safe message via [`ApiError::user_message`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Client misconfigured (bad base URL, TLS setup). Not retryable.
    Config(String),
    /// Connectivity failure (DNS, connection refused, reset). Retryable.
    Network(String),
    /// The request exceeded the configured timeout. Retryable.
    Timeout,
    /// HTTP error status. Retryable if status >= 500 or 429.
    Api { status: u16, message: String },
    /// Envelope came back with `success: false`. Message is passed through.
    Server(String),
    /// Body did not match the expected shape. Not retryable.
    Parse(String),
}

impl ApiError {
    /// True for failures where trying again later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout => true,
            ApiError::Api { status, .. } => *status >= 500 || *status == 429,
            ApiError::Config(_) | ApiError::Server(_) | ApiError::Parse(_) => false,
        }
    }

    /// Message suitable for showing to a rider or driver.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Config(_) => "The app is not configured correctly.".to_string(),
            ApiError::Network(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            ApiError::Timeout => "The request timed out. Please try again.".to_string(),
            ApiError::Api { status: 401, .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiError::Api { status: 429, .. } => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            ApiError::Api { status, .. } if *status >= 500 => {
                "The service is temporarily unavailable. Please try again.".to_string()
            }
            ApiError::Api { message, .. } | ApiError::Server(message) => {
                if message.trim().is_empty() {
                    "Request failed.".to_string()
                } else {
                    message.clone()
                }
            }
            ApiError::Parse(_) => "Unexpected response from the server.".to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Config(msg) => write!(f, "config error: {msg}"),
            ApiError::Network(msg) => write!(f, "network error: {msg}"),
            ApiError::Timeout => write!(f, "request timed out"),
            ApiError::Api { status, message } => {
                write!(f, "API error (HTTP {status}): {message}")
            }
            ApiError::Server(msg) => write!(f, "server error: {msg}"),
            ApiError::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Parse(e.to_string())
        } else if e.is_builder() {
            ApiError::Config(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}
