use std::time::Duration;
use thiserror::Error;

const MAX_SNIPPET_CHARS: usize = 200;

/// Truncate free-form text (error bodies, unparsable model output) to a
/// bounded length before embedding it in an error.
pub(crate) fn bounded_snippet(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.chars().count() <= MAX_SNIPPET_CHARS {
        return trimmed.to_string();
    }

    let mut end = MAX_SNIPPET_CHARS;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &trimmed[..end])
}

/// Failure taxonomy for one dispatched call.
///
/// `Auth` is the only fatal class: retrying cannot fix invalid credentials,
/// so the retry layer short-circuits on it. Per-frame decode failures never
/// surface here at all; they are swallowed inside the decoders.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("backend {backend} authentication failed")]
    Auth { backend: String },

    #[error("backend {backend} rate-limited the request")]
    RateLimited { backend: String },

    #[error("backend returned an empty response")]
    EmptyResponse,

    #[error("no JSON payload found in output: {snippet}")]
    NoJsonFound { snippet: String },

    #[error("output JSON failed to parse ({message}): {snippet}")]
    InvalidJson { snippet: String, message: String },

    #[error("backend {backend} does not support {operation}")]
    Unsupported { backend: String, operation: String },

    #[error("config: {0}")]
    Config(String),
}

impl DispatchError {
    /// Whether retrying this failure is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
