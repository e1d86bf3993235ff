use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::LimitSpec;

use super::headers::ParsedWindow;

/// One advertised rate window with its locally tracked usage.
///
/// Covers `[reset_at - window, reset_at)`; when the clock passes `reset_at`
/// the usage resets and the interval rolls forward by one `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LimitWindow {
    pub limit: u32,
    pub used: u32,
    pub window: Duration,
    pub reset_at: Instant,
}

impl LimitWindow {
    fn roll_if_expired(&mut self, now: Instant) {
        if self.reset_at <= now {
            self.used = 0;
            self.reset_at = now + self.window;
        }
    }
}

/// Sliding-window usage for one credential in one scope (app or method).
///
/// Mutated only from the event loop; the single-writer discipline is what
/// makes `consume` atomic.
#[derive(Debug, Default)]
pub(crate) struct RateState {
    pub windows: Vec<LimitWindow>,
    /// No admission before this instant, regardless of window budget.
    pub blocked_until: Option<Instant>,
    /// Most recent grant in this scope; the pacing anchor.
    pub last_granted: Option<Instant>,
}

impl RateState {
    /// A state pre-populated with zero-used windows, for cold-start pacing.
    pub fn seeded(specs: &[LimitSpec], now: Instant) -> Self {
        let windows = specs
            .iter()
            .map(|spec| LimitWindow {
                limit: spec.limit,
                used: 0,
                window: spec.window,
                reset_at: now + spec.window,
            })
            .collect();

        Self {
            windows,
            ..Self::default()
        }
    }

    /// Earliest instant a request may be admitted in this scope.
    ///
    /// Expired windows are rolled forward first. A fully used window pushes
    /// the candidate to its reset; otherwise, unless `bypass_pacing` is set,
    /// the pacing slot `last_granted + time_left / requests_left` applies, so
    /// admissions spread across the remaining window instead of clumping at
    /// the reset boundary.
    pub fn next_allowed(&mut self, now: Instant, bypass_pacing: bool) -> Instant {
        let mut next = now;

        if let Some(blocked_until) = self.blocked_until
            && blocked_until > next
        {
            next = blocked_until;
        }

        for w in &mut self.windows {
            w.roll_if_expired(now);

            if w.used >= w.limit {
                if w.reset_at > next {
                    next = w.reset_at;
                }
                continue;
            }
            if bypass_pacing {
                continue;
            }

            let requests_left = w.limit - w.used;
            let time_left = w.reset_at.saturating_duration_since(now);
            if time_left.is_zero() {
                continue;
            }

            let interval = time_left / requests_left;
            if interval.is_zero() {
                continue;
            }

            if let Some(last_granted) = self.last_granted {
                let slot = last_granted + interval;
                if slot > next {
                    next = slot;
                }
            }
        }

        next
    } // end method next_allowed

    /// Spends one unit in every window, or nothing at all.
    ///
    /// Denies while blocked or when any window is exhausted; on success every
    /// window's usage increments and the pacing anchor moves to `now`.
    pub fn consume(&mut self, now: Instant) -> bool {
        if let Some(blocked_until) = self.blocked_until
            && blocked_until > now
        {
            return false;
        }

        for w in &mut self.windows {
            w.roll_if_expired(now);
            if w.used >= w.limit {
                return false;
            }
        }

        for w in &mut self.windows {
            w.used += 1;
        }
        self.last_granted = Some(now);
        true
    } // end method consume

    /// Folds an observed upstream response into this scope.
    ///
    /// Parsed windows replace the list, except that a pre-existing window of
    /// the same nominal duration whose reset is still in the future keeps its
    /// `reset_at` and the larger of the two usage counts. Re-anchoring to
    /// `now` mid-window would reset the upstream's clock and over-admit.
    ///
    /// `additional_window` pads every observed duration to hedge clock skew
    /// against the upstream.
    pub fn apply(
        &mut self,
        parsed: &[ParsedWindow],
        retry_after: Option<Duration>,
        apply_retry: bool,
        now: Instant,
        additional_window: Duration,
    ) {
        let mut seen_count = false;

        if !parsed.is_empty() {
            let existing: HashMap<Duration, LimitWindow> =
                self.windows.iter().map(|w| (w.window, *w)).collect();

            let mut updated = Vec::with_capacity(parsed.len());
            for p in parsed {
                let window = p.window + additional_window;
                let mut next = LimitWindow {
                    limit: p.limit,
                    used: p.count.min(p.limit),
                    window,
                    reset_at: now + window,
                };

                if next.used > 0 {
                    seen_count = true;
                }

                if let Some(old) = existing.get(&window)
                    && old.reset_at > now
                {
                    next.used = next.used.max(old.used);
                    next.reset_at = old.reset_at;
                }

                updated.push(next);
            }
            self.windows = updated;
        }

        if self.last_granted.is_none() && seen_count {
            // Exact prior request timestamps are unknown; anchoring at "now"
            // avoids an instant post-observation burst.
            self.last_granted = Some(now);
        }

        if apply_retry
            && let Some(delta) = retry_after
        {
            let until = now + delta;
            if self.blocked_until.is_none_or(|blocked| until > blocked) {
                self.blocked_until = Some(until);
            }
        }
    } // end method apply
}

/// Per-credential rate scopes: app level keyed by region, method level keyed
/// by bucket. Both are created lazily on first touch.
#[derive(Debug, Default)]
pub(crate) struct KeyState {
    app_by_region: HashMap<String, RateState>,
    method_by_bucket: HashMap<String, RateState>,
}

impl KeyState {
    /// The app-scope state for `region`, seeding configured default windows
    /// when the scope is first materialised.
    pub fn app(&mut self, region: &str, defaults: &[LimitSpec], now: Instant) -> &mut RateState {
        self.app_by_region
            .entry(region.to_string())
            .or_insert_with(|| RateState::seeded(defaults, now))
    }

    /// The method-scope state for `bucket`.
    pub fn method(&mut self, bucket: &str) -> &mut RateState {
        self.method_by_bucket.entry(bucket.to_string()).or_default()
    }
}
