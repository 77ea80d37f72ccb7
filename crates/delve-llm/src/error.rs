//! Errors from model backends and structured generation.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// A provider's rate-limit rejection.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub message: String,
    /// Wait the provider asked for, if it named one.
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(message: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(message)
        }
    }

    /// Read the wait from a `Retry-After` header (whole seconds), else from
    /// the body text. Groq only does the latter ("Please try again in 6.5s").
    pub fn from_response(message: &str, retry_after_header: Option<&str>) -> Self {
        let from_header = retry_after_header
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        Self {
            message: message.to_string(),
            retry_after: from_header.or_else(|| wait_in_message(message)),
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.retry_after {
            Some(wait) => write!(f, "{} (retry after {:.2}s)", self.message, wait.as_secs_f64()),
            None => f.write_str(&self.message),
        }
    }
}

/// Seconds following "try again in" / "retry in", case-insensitively.
fn wait_in_message(message: &str) -> Option<Duration> {
    let lower = message.to_ascii_lowercase();
    ["try again in ", "retry in "].iter().find_map(|marker| {
        let rest = &lower[lower.find(marker)? + marker.len()..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        rest[..end].parse::<f64>().ok().map(Duration::from_secs_f64)
    })
}

#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider answered with an error status.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// A structured call came back without a usable object of the asked shape.
    #[error("Output did not conform to schema '{schema}': {reason}")]
    SchemaConformance { schema: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    pub fn schema(schema: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaConformance {
            schema: schema.into(),
            reason: reason.into(),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        if let Self::RateLimit(info) = self {
            info.retry_after
        } else {
            None
        }
    }

    /// Transport failures and rate limits; everything else fails the same way twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "Request timed out: "
        } else if err.is_connect() {
            "Connection failed: "
        } else {
            ""
        };
        LlmError::Network(format!("{}{}", kind, err))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(LlmError::Network("timeout".to_string()).is_retryable());
        assert!(LlmError::rate_limit("rate limited").is_retryable());
        assert!(!LlmError::Config("bad config".to_string()).is_retryable());
        assert!(!LlmError::Auth("unauthorized".to_string()).is_retryable());
        assert!(!LlmError::schema("queries", "missing field").is_retryable());
    }

    #[test]
    fn test_rate_limit_from_groq_message() {
        let info = RateLimitInfo::from_response(
            "Rate limit reached. Please try again in 6.57792s. Need more tokens?",
            None,
        );
        let retry = info.retry_after.unwrap();
        assert!((retry.as_secs_f64() - 6.57792).abs() < 0.001);

        let info = RateLimitInfo::from_response("Rate limit exceeded", None);
        assert!(info.retry_after.is_none());
    }

    #[test]
    fn test_rate_limit_header_wins() {
        let info = RateLimitInfo::from_response("try again in 30s", Some(" 5 "));
        assert_eq!(info.retry_after, Some(Duration::from_secs(5)));

        let info = RateLimitInfo::from_response("slow down", Some("soon"));
        assert!(info.retry_after.is_none());
    }

    #[test]
    fn test_retry_after_accessor() {
        let err = LlmError::RateLimit(RateLimitInfo::with_retry_after(
            "limited",
            Duration::from_secs(5),
        ));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
        assert_eq!(LlmError::Network("x".into()).retry_after(), None);
    }

    #[test]
    fn test_display() {
        let info = RateLimitInfo::with_retry_after("Rate limited", Duration::from_secs_f64(6.5));
        assert!(info.to_string().contains("retry after 6.50s"));

        let err = LlmError::schema("learning", "missing field `learning`");
        assert_eq!(
            err.to_string(),
            "Output did not conform to schema 'learning': missing field `learning`"
        );
    }
}
