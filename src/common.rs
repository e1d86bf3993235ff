use std::time::{Duration, Instant};

use http::{HeaderMap, StatusCode};

/// Admission priority class.
///
/// High priority skips pacing but still honours hard window ceilings and
/// retry-after blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Maps an `X-Priority` header value. Only a case-insensitive `"high"`
    /// escalates; anything else is normal.
    pub fn from_header(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("high") {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The routing tuple submitted for admission.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Regional upstream identifier, e.g. `"na1"`.
    pub region: String,
    /// Canonical per-method scope key, e.g. `"na1:lol/status/v4/platform-data"`.
    pub bucket: String,
    pub priority: Priority,
}

/// Result of a successful admission: the credential slot the caller must use
/// for the upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub key_index: usize,
}

/// Upstream response metadata fed back into the limiter.
#[derive(Debug, Clone)]
pub struct Observation {
    pub region: String,
    pub bucket: String,
    /// Which credential slot served the request.
    pub key_index: usize,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// A `limit / window` pair, used to seed app scopes before the first
/// observation arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSpec {
    pub limit: u32,
    pub window: Duration,
}

/// Time source for the scheduler. Override in tests to control pacing math.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The default [`Clock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl Clock for WallClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
