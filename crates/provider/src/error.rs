use thiserror::Error;

/// Failure taxonomy for provider calls.  The variant decides what the retry
/// policy does with the error, so concrete providers should map their
/// failures onto `Authentication`/`Transient` wherever they can tell.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Credential rejected, or the requested entity (model, deployment) does
    /// not exist.  Never retried; trips the credential watch.
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// Temporary unavailability or overload.  Retried with backoff.
    #[error("provider unavailable: {0}")]
    Transient(String),

    /// Everything else: malformed responses, local failures, provider bugs.
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Authentication,
    Retriable,
    Fatal,
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Authentication(_) => ErrorClass::Authentication,
            Self::Transient(_) => ErrorClass::Retriable,
            Self::Other(message) => classify_message(message),
        }
    }

    /// Map an HTTP status to the taxonomy.  `message` is the (possibly
    /// truncated) response body.
    pub fn from_status(status: u16, message: &str) -> Self {
        let detail = format!("HTTP {status}: {message}");
        match status {
            401 | 403 | 404 => Self::Authentication(detail),
            408 | 429 | 500 | 502 | 503 | 504 | 529 => Self::Transient(detail),
            _ => Self::Other(detail),
        }
    }
}

const AUTH_MARKERS: &[&str] = &[
    "api key",
    "unauthorized",
    "unauthenticated",
    "invalid credential",
    "permission denied",
    "forbidden",
    "not found",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "unavailable",
    "overloaded",
    "rate limit",
    "too many requests",
    "timed out",
    "timeout",
    "temporarily",
    "try again",
];

/// Fallback classification for providers that only surface plain-text errors.
fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if AUTH_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ErrorClass::Authentication
    } else if TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ErrorClass::Retriable
    } else {
        ErrorClass::Fatal
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
