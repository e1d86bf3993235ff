use std::time::{Duration, SystemTime};

/// One advertised window: a `limit:windowSeconds` entry paired with its
/// observed `count:windowSeconds` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParsedWindow {
    pub limit: u32,
    pub count: u32,
    pub window: Duration,
}

/// Parses a paired advertised-limit / observed-count header.
///
/// Both headers are comma-separated `value:windowSeconds` lists that pair up
/// by position. Entries with a non-positive limit or window, or unparseable
/// integers, are skipped. A missing or malformed count entry counts as zero.
/// Malformed input never fails; it just yields fewer (or no) windows.
pub(crate) fn parse_rate_header(limit_header: &str, count_header: &str) -> Vec<ParsedWindow> {
    let limit_header = limit_header.trim();
    if limit_header.is_empty() {
        return Vec::new();
    }

    let counts: Vec<&str> = count_header.trim().split(',').collect();
    let mut out = Vec::new();

    for (i, raw) in limit_header.split(',').enumerate() {
        let Some((limit_part, window_part)) = raw.trim().split_once(':') else {
            continue;
        };
        let Ok(limit) = limit_part.parse::<u32>() else {
            continue;
        };
        let Ok(window_secs) = window_part.parse::<u32>() else {
            continue;
        };
        if limit == 0 || window_secs == 0 {
            continue;
        }

        let count = counts
            .get(i)
            .and_then(|entry| entry.trim().split_once(':'))
            .and_then(|(count_part, _)| count_part.parse::<u32>().ok())
            .unwrap_or(0);

        out.push(ParsedWindow {
            limit,
            count,
            window: Duration::from_secs(u64::from(window_secs)),
        });
    }

    out
}

/// Parses a `Retry-After` value into a delay from `now`.
///
/// Accepts non-negative delta-seconds or an RFC 7231 HTTP-date; dates in the
/// past collapse to a zero delay. Anything else is `None`.
pub(crate) fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    if let Ok(at) = httpdate::parse_http_date(value) {
        return Some(at.duration_since(now).unwrap_or(Duration::ZERO));
    }

    None
}
