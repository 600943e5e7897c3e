//! Generation engine abstraction
//!
//! Defines the `TextEngine` and `ImageEngine` traits that decouple the HTTP
//! layer from the upstream provider. Engines receive the credential the pool
//! selected and report failures as `EngineError`, which tells the caller
//! whether the credential should be quarantined.

pub mod openrouter;
pub mod placeholder;

pub use openrouter::OpenRouterEngine;
pub use placeholder::{PlaceholderImageEngine, PlaceholderTextEngine};

use key_pool::Credential;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// A fully built text generation request.
#[derive(Debug, Clone, Serialize)]
pub struct TextRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
}

/// Upstream failure, classified by who is at fault.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Transport failure, timeout, rate limit or upstream 5xx
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// 401/403: the credential itself was refused
    #[error("provider refused credential: {0}")]
    Unauthorized(String),

    /// Other 4xx: the request was refused, not the credential
    #[error("provider rejected request: {0}")]
    Rejected(String),

    /// Response could not be understood
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the credential used for the call should be quarantined.
    pub fn quarantines_credential(&self) -> bool {
        !matches!(self, EngineError::Rejected(_))
    }

    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::Unavailable(_) => "unavailable",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::Rejected(_) => "rejected",
            EngineError::Internal(_) => "internal",
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Classify a non-success upstream response by HTTP status.
///
/// 401/403 are Unauthorized, 408/429/5xx are Unavailable, remaining 4xx are
/// Rejected, anything else is Internal.
pub fn classify_status(status: u16, body: &str) -> EngineError {
    let detail = format!("HTTP {status}: {}", truncate(body, 200));
    match status {
        401 | 403 => EngineError::Unauthorized(detail),
        408 | 429 | 500..=599 => EngineError::Unavailable(detail),
        400..=499 => EngineError::Rejected(detail),
        _ => EngineError::Internal(detail),
    }
}

fn truncate(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Text generation backend.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn TextEngine>`).
pub trait TextEngine: Send + Sync {
    /// Identifier for logging and metrics (e.g. "openrouter", "placeholder")
    fn id(&self) -> &str;

    /// Generate text for `request`, authenticating with `credential`.
    fn generate<'a>(
        &'a self,
        request: &'a TextRequest,
        credential: &'a Credential,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Image generation backend. Returns the URLs of the generated images; an
/// empty list means the provider produced nothing (e.g. a blocked prompt).
pub trait ImageEngine: Send + Sync {
    fn id(&self) -> &str;

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        credential: &'a Credential,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth_failures() {
        assert!(matches!(
            classify_status(401, "no auth"),
            EngineError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_status(403, "forbidden"),
            EngineError::Unauthorized(_)
        ));
    }

    #[test]
    fn classify_transient_failures() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(
                matches!(classify_status(status, ""), EngineError::Unavailable(_)),
                "status {status}"
            );
        }
    }

    #[test]
    fn classify_client_errors_as_rejected() {
        for status in [400, 404, 413, 422] {
            assert!(
                matches!(classify_status(status, ""), EngineError::Rejected(_)),
                "status {status}"
            );
        }
    }

    #[test]
    fn classify_unexpected_status_as_internal() {
        assert!(matches!(
            classify_status(302, "moved"),
            EngineError::Internal(_)
        ));
    }

    #[test]
    fn only_rejected_spares_the_credential() {
        assert!(EngineError::Unavailable("x".into()).quarantines_credential());
        assert!(EngineError::Unauthorized("x".into()).quarantines_credential());
        assert!(EngineError::Internal("x".into()).quarantines_credential());
        assert!(!EngineError::Rejected("x".into()).quarantines_credential());
    }

    #[test]
    fn detail_is_truncated() {
        let body = "é".repeat(500);
        let err = classify_status(500, &body);
        let msg = err.to_string();
        assert!(msg.contains("HTTP 500"));
        assert_eq!(msg.matches('é').count(), 200);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(EngineError::Unavailable(String::new()).label(), "unavailable");
        assert_eq!(EngineError::Unauthorized(String::new()).label(), "unauthorized");
        assert_eq!(EngineError::Rejected(String::new()).label(), "rejected");
        assert_eq!(EngineError::Internal(String::new()).label(), "internal");
    }
}
