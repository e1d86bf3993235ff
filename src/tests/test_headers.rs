use std::time::{Duration, SystemTime};

use crate::limiter::headers::{ParsedWindow, parse_rate_header, parse_retry_after};

#[test]
fn parses_paired_limit_and_count_lists() {
    let windows = parse_rate_header("20:1,100:120", "4:1,40:120");

    assert_eq!(
        windows,
        vec![
            ParsedWindow {
                limit: 20,
                count: 4,
                window: Duration::from_secs(1),
            },
            ParsedWindow {
                limit: 100,
                count: 40,
                window: Duration::from_secs(120),
            },
        ]
    );
}

#[test]
fn empty_limit_header_yields_nothing() {
    assert!(parse_rate_header("", "4:1").is_empty());
    assert!(parse_rate_header("   ", "4:1").is_empty());
}

#[test]
fn malformed_limit_entries_are_skipped() {
    let windows = parse_rate_header("abc:1,20:1", "1:1,4:1");
    assert_eq!(
        windows,
        vec![ParsedWindow {
            limit: 20,
            count: 4,
            window: Duration::from_secs(1),
        }]
    );

    assert!(parse_rate_header("20", "4:1").is_empty());
    assert!(parse_rate_header("20:1:5", "4:1").is_empty());
}

#[test]
fn non_positive_limits_and_windows_are_skipped() {
    assert!(parse_rate_header("0:1", "0:1").is_empty());
    assert!(parse_rate_header("-5:1", "0:1").is_empty());
    assert!(parse_rate_header("20:0", "4:0").is_empty());
    assert!(parse_rate_header("20:-1", "4:1").is_empty());
}

#[test]
fn missing_or_malformed_count_defaults_to_zero() {
    let windows = parse_rate_header("20:1,100:120", "4:1");
    assert_eq!(windows[0].count, 4);
    assert_eq!(windows[1].count, 0);

    let windows = parse_rate_header("20:1", "");
    assert_eq!(windows[0].count, 0);

    let windows = parse_rate_header("20:1", "x:1");
    assert_eq!(windows[0].count, 0);
}

#[test]
fn count_is_taken_even_when_it_exceeds_the_limit() {
    // Clamping to the limit happens in the state layer, not the parser.
    let windows = parse_rate_header("20:1", "50:1");
    assert_eq!(windows[0].count, 50);
}

#[test]
fn retry_after_delta_seconds() {
    let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

    assert_eq!(parse_retry_after("2", now), Some(Duration::from_secs(2)));
    assert_eq!(parse_retry_after(" 2 ", now), Some(Duration::from_secs(2)));
    assert_eq!(parse_retry_after("0", now), Some(Duration::ZERO));
}

#[test]
fn retry_after_http_date() {
    let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

    let future = httpdate::fmt_http_date(now + Duration::from_secs(3));
    assert_eq!(parse_retry_after(&future, now), Some(Duration::from_secs(3)));

    // Past dates collapse to "retry immediately".
    let past = httpdate::fmt_http_date(now - Duration::from_secs(30));
    assert_eq!(parse_retry_after(&past, now), Some(Duration::ZERO));
}

#[test]
fn retry_after_garbage_is_ignored() {
    let now = SystemTime::now();

    assert_eq!(parse_retry_after("", now), None);
    assert_eq!(parse_retry_after("abc", now), None);
    assert_eq!(parse_retry_after("-1", now), None);
    assert_eq!(parse_retry_after("2.5", now), None);
}
