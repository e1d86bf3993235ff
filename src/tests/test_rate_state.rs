use std::time::{Duration, Instant};

use crate::LimitSpec;
use crate::limiter::headers::ParsedWindow;
use crate::limiter::rate_state::{KeyState, LimitWindow, RateState};

fn window(limit: u32, used: u32, secs: u64, now: Instant) -> LimitWindow {
    LimitWindow {
        limit,
        used,
        window: Duration::from_secs(secs),
        reset_at: now + Duration::from_secs(secs),
    }
}

fn parsed(limit: u32, count: u32, secs: u64) -> ParsedWindow {
    ParsedWindow {
        limit,
        count,
        window: Duration::from_secs(secs),
    }
}

#[test]
fn next_allowed_paces_across_remaining_window() {
    let now = Instant::now();
    let mut state = RateState {
        windows: vec![window(5, 0, 1, now)],
        blocked_until: None,
        last_granted: Some(now),
    };

    // interval = 1s / 5 remaining = 200ms after the last grant.
    assert_eq!(state.next_allowed(now, false), now + Duration::from_millis(200));
}

#[test]
fn next_allowed_without_prior_grant_is_immediate() {
    let now = Instant::now();
    let mut state = RateState {
        windows: vec![window(5, 0, 1, now)],
        blocked_until: None,
        last_granted: None,
    };

    assert_eq!(state.next_allowed(now, false), now);
}

#[test]
fn high_priority_bypasses_pacing_but_not_exhaustion() {
    let now = Instant::now();
    let mut state = RateState {
        windows: vec![window(5, 0, 1, now)],
        blocked_until: None,
        last_granted: Some(now),
    };
    assert_eq!(state.next_allowed(now, true), now);

    let full_reset = now + Duration::from_secs(1);
    let mut exhausted = RateState {
        windows: vec![window(5, 5, 1, now)],
        blocked_until: None,
        last_granted: Some(now),
    };
    assert_eq!(exhausted.next_allowed(now, true), full_reset);
}

#[test]
fn bypass_is_never_later_than_paced() {
    let now = Instant::now();

    for (limit, used) in [(5u32, 0u32), (5, 3), (5, 5), (1, 0), (100, 99)] {
        let mut state = RateState {
            windows: vec![window(limit, used, 2, now)],
            blocked_until: Some(now + Duration::from_millis(50)),
            last_granted: Some(now),
        };
        let bypass = state.next_allowed(now, true);
        let paced = state.next_allowed(now, false);
        assert!(bypass <= paced, "limit={limit} used={used}");
    }
}

#[test]
fn exhausted_window_pushes_to_reset() {
    let now = Instant::now();
    let mut state = RateState {
        windows: vec![window(3, 3, 2, now)],
        blocked_until: None,
        last_granted: Some(now),
    };

    assert_eq!(state.next_allowed(now, false), now + Duration::from_secs(2));
}

#[test]
fn blocked_until_dominates_ready_windows() {
    let now = Instant::now();
    let blocked_until = now + Duration::from_secs(3);
    let mut state = RateState {
        windows: vec![window(5, 0, 1, now)],
        blocked_until: Some(blocked_until),
        last_granted: None,
    };

    assert_eq!(state.next_allowed(now, false), blocked_until);
    assert_eq!(state.next_allowed(now, true), blocked_until);
}

#[test]
fn expired_windows_roll_forward() {
    let now = Instant::now();
    let mut state = RateState {
        windows: vec![window(3, 3, 1, now)],
        blocked_until: None,
        last_granted: None,
    };

    let later = now + Duration::from_secs(2);
    assert_eq!(state.next_allowed(later, false), later);
    assert_eq!(state.windows[0].used, 0);
    assert_eq!(state.windows[0].reset_at, later + Duration::from_secs(1));
}

#[test]
fn consume_increments_every_window() {
    let now = Instant::now();
    let mut state = RateState {
        windows: vec![window(5, 0, 1, now), window(100, 7, 120, now)],
        blocked_until: None,
        last_granted: None,
    };

    assert!(state.consume(now));
    assert_eq!(state.windows[0].used, 1);
    assert_eq!(state.windows[1].used, 8);
    assert_eq!(state.last_granted, Some(now));
}

#[test]
fn consume_denies_without_mutating_when_any_window_is_full() {
    let now = Instant::now();
    let mut state = RateState {
        windows: vec![window(1, 1, 1, now), window(100, 7, 120, now)],
        blocked_until: None,
        last_granted: None,
    };

    assert!(!state.consume(now));
    assert_eq!(state.windows[0].used, 1);
    assert_eq!(state.windows[1].used, 7);
    assert_eq!(state.last_granted, None);
}

#[test]
fn consume_denies_while_blocked() {
    let now = Instant::now();
    let mut state = RateState {
        windows: vec![window(5, 0, 1, now)],
        blocked_until: Some(now + Duration::from_secs(1)),
        last_granted: None,
    };

    assert!(!state.consume(now));
    assert_eq!(state.windows[0].used, 0);

    // Past the block the same state admits.
    let later = now + Duration::from_secs(2);
    assert!(state.consume(later));
}

#[test]
fn apply_replaces_windows_and_anchors_pacing() {
    let now = Instant::now();
    let mut state = RateState::default();

    state.apply(&[parsed(20, 4, 1)], None, false, now, Duration::ZERO);

    assert_eq!(state.windows.len(), 1);
    assert_eq!(state.windows[0].limit, 20);
    assert_eq!(state.windows[0].used, 4);
    assert_eq!(state.windows[0].reset_at, now + Duration::from_secs(1));
    // Non-zero observed usage anchors pacing so the next admissions do not
    // burst.
    assert_eq!(state.last_granted, Some(now));
}

#[test]
fn apply_with_zero_counts_does_not_anchor_pacing() {
    let now = Instant::now();
    let mut state = RateState::default();

    state.apply(&[parsed(20, 0, 1)], None, false, now, Duration::ZERO);

    assert_eq!(state.last_granted, None);
}

#[test]
fn apply_preserves_reset_of_matching_active_window() {
    let t0 = Instant::now();
    let mut state = RateState::default();
    state.apply(&[parsed(100, 10, 120)], None, false, t0, Duration::ZERO);
    let original_reset = state.windows[0].reset_at;

    // A second observation inside the same upstream window must not re-anchor
    // the reset to "now", and usage only moves up.
    let t1 = t0 + Duration::from_secs(1);
    state.apply(&[parsed(100, 5, 120)], None, false, t1, Duration::ZERO);

    assert_eq!(state.windows[0].reset_at, original_reset);
    assert_eq!(state.windows[0].used, 10);

    let t2 = t0 + Duration::from_secs(2);
    state.apply(&[parsed(100, 42, 120)], None, false, t2, Duration::ZERO);
    assert_eq!(state.windows[0].reset_at, original_reset);
    assert_eq!(state.windows[0].used, 42);
}

#[test]
fn apply_clamps_count_to_limit() {
    let now = Instant::now();
    let mut state = RateState::default();

    state.apply(&[parsed(20, 50, 1)], None, false, now, Duration::ZERO);

    assert_eq!(state.windows[0].used, 20);
}

#[test]
fn apply_with_empty_parse_keeps_windows() {
    let now = Instant::now();
    let mut state = RateState {
        windows: vec![window(5, 2, 1, now)],
        blocked_until: None,
        last_granted: Some(now),
    };

    state.apply(&[], Some(Duration::from_secs(2)), true, now, Duration::ZERO);

    assert_eq!(state.windows.len(), 1);
    assert_eq!(state.windows[0].used, 2);
    assert_eq!(state.blocked_until, Some(now + Duration::from_secs(2)));
}

#[test]
fn retry_after_raises_block_monotonically() {
    let now = Instant::now();
    let mut state = RateState::default();

    state.apply(&[], Some(Duration::from_secs(5)), true, now, Duration::ZERO);
    assert_eq!(state.blocked_until, Some(now + Duration::from_secs(5)));

    // A shorter retry never lowers the block.
    state.apply(&[], Some(Duration::from_secs(2)), true, now, Duration::ZERO);
    assert_eq!(state.blocked_until, Some(now + Duration::from_secs(5)));

    // Retry without the apply flag (non-429 response) is ignored.
    state.apply(&[], Some(Duration::from_secs(60)), false, now, Duration::ZERO);
    assert_eq!(state.blocked_until, Some(now + Duration::from_secs(5)));
}

#[test]
fn additional_window_pads_observed_durations() {
    let now = Instant::now();
    let mut state = RateState::default();

    state.apply(&[parsed(20, 0, 1)], None, false, now, Duration::from_millis(500));

    assert_eq!(state.windows[0].window, Duration::from_millis(1_500));
    assert_eq!(state.windows[0].reset_at, now + Duration::from_millis(1_500));
}

#[test]
fn seeded_state_starts_unused() {
    let now = Instant::now();
    let state = RateState::seeded(
        &[
            LimitSpec {
                limit: 3,
                window: Duration::from_secs(1),
            },
            LimitSpec {
                limit: 100,
                window: Duration::from_secs(120),
            },
        ],
        now,
    );

    assert_eq!(state.windows.len(), 2);
    assert!(state.windows.iter().all(|w| w.used == 0));
    assert_eq!(state.windows[0].reset_at, now + Duration::from_secs(1));
    assert_eq!(state.last_granted, None);
}

#[test]
fn key_state_seeds_app_scope_and_persists_mutations() {
    let now = Instant::now();
    let defaults = [LimitSpec {
        limit: 3,
        window: Duration::from_secs(1),
    }];
    let mut key = KeyState::default();

    assert_eq!(key.app("na1", &defaults, now).windows.len(), 1);
    assert!(key.app("na1", &defaults, now).consume(now));
    assert_eq!(key.app("na1", &defaults, now).windows[0].used, 1);

    // Method scopes start empty; regions are independent.
    assert!(key.method("na1:lol/status/v4/platform-data").windows.is_empty());
    assert_eq!(key.app("euw1", &defaults, now).windows[0].used, 0);
}
