use std::time::Duration;

use http::StatusCode;

/// Why an admission was rejected.
///
/// This is a closed set: the scheduler never produces any other failure, and
/// callers can match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The admission carried an empty region or bucket.
    InvalidRoute,
    /// The bucket's queue is at capacity.
    QueueFull,
    /// No credential slots exist to serve the request.
    NoAvailableKey,
    /// The limiter is shutting down.
    ShuttingDown,
}

impl RejectReason {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidRoute => "invalid_route",
            RejectReason::QueueFull => "queue_full",
            RejectReason::NoAvailableKey => "no_available_key",
            RejectReason::ShuttingDown => "shutting_down",
        }
    }

    /// The status an embedding proxy should answer the client with.
    pub fn http_status(&self) -> StatusCode {
        match self {
            RejectReason::InvalidRoute => StatusCode::BAD_REQUEST,
            RejectReason::QueueFull | RejectReason::NoAvailableKey => {
                StatusCode::TOO_MANY_REQUESTS
            }
            RejectReason::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured admission rejection.
///
/// Produced only by the event loop; always terminates the admit path without
/// the request being forwarded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("admission rejected: {reason}")]
pub struct RejectedError {
    pub reason: RejectReason,
    /// How long the caller should wait before retrying. Zero when retrying
    /// cannot help.
    pub retry_after: Duration,
}

impl RejectedError {
    pub(crate) fn new(reason: RejectReason) -> Self {
        Self {
            reason,
            retry_after: Duration::ZERO,
        }
    }

    pub(crate) fn with_retry_after(reason: RejectReason, retry_after: Duration) -> Self {
        Self {
            reason,
            retry_after,
        }
    }

    /// The status an embedding proxy should answer the client with.
    pub fn http_status(&self) -> StatusCode {
        self.reason.http_status()
    }

    /// Value for a `Retry-After` response header: whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        let mut secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs += 1;
        }
        secs
    }
}

/// Invalid configuration, either of the limiter itself or of the embedding
/// process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A limiter option failed validation.
    #[error("invalid limiter config: {0}")]
    InvalidLimiter(&'static str),
    /// One or more configuration values were missing or malformed. All
    /// problems are collected before reporting.
    #[error("invalid relay config: {}", .0.join("; "))]
    InvalidEnvironment(Vec<String>),
}

/// An inbound request path that cannot be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("missing region and upstream path")]
    MissingRegion,
    #[error("invalid region")]
    InvalidRegion,
    #[error("missing upstream path")]
    MissingUpstreamPath,
}
