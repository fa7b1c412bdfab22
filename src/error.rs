//! Error taxonomy for repository access and proposal application.
//!
//! Everything that talks to the remote source-control service returns
//! [`PipelineError`]. Application-edge code (config loading, CLI) uses
//! `anyhow` on top of it.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced by the analyzer, the enhancement pipeline and the
/// repository host.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing credential or repository target, or an unusable setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The remote rejected the credential (401/403), or none was supplied.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Repository, ref or path does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote is throttling us (429, or 403 with an exhausted quota).
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// Transport failure, timeout, or a body we could not decode.
    #[error("network error: {0}")]
    Network(String),

    /// Any other non-success response.
    #[error("remote returned {status}: {message}")]
    Api { status: u16, message: String },

    /// A single file write inside a proposal failed.
    #[error("failed to apply {path}: {source}")]
    ProposalApplication {
        path: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Map a non-success HTTP response onto the taxonomy.
    ///
    /// `rate_remaining` is the value of the `x-ratelimit-remaining` header,
    /// which distinguishes quota exhaustion from a permissions failure on 403.
    pub fn classify(status: StatusCode, rate_remaining: Option<&str>, body: &str) -> Self {
        let message = summarize_body(body);
        match status.as_u16() {
            401 => Self::Auth(message),
            403 if rate_remaining == Some("0") => Self::RateLimit(message),
            403 => Self::Auth(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimit(message),
            code => Self::Api {
                status: code,
                message,
            },
        }
    }

    /// Wrap a per-file failure.
    pub fn application(path: &str, source: PipelineError) -> Self {
        Self::ProposalApplication {
            path: path.to_string(),
            source: Box::new(source),
        }
    }

    /// Whether this error means the target simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else if err.is_decode() {
            Self::Network(format!("undecodable response body: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Pull the `message` field out of a JSON error body, falling back to the
/// raw (truncated) text.
fn summarize_body(body: &str) -> String {
    const MAX_LEN: usize = 300;

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.len() <= MAX_LEN {
        return trimmed.to_string();
    }
    let mut end = MAX_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
