use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_channel::Receiver;
use http::{HeaderMap, StatusCode};
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    AdmissionOutcome, Clock, LimitSpec, MetricsSink, Observation, Priority, RejectReason,
    RejectedError, Ticket,
};

use super::bucket_queue::{AdmitRequest, BucketQueue};
use super::headers::{parse_rate_header, parse_retry_after};
use super::rate_state::KeyState;
use super::wake_heap::WakeHeap;

/// Timer arm when no bucket is scheduled to wake.
const IDLE_TIMER_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
/// Retry delay after a consume denial races a concurrent state update.
const CONSUME_RETRY_DELAY: Duration = Duration::from_millis(5);

pub(crate) struct LoopSettings {
    pub key_count: usize,
    pub queue_capacity: usize,
    pub additional_window: Duration,
    pub default_app_limits: Vec<LimitSpec>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// The single-writer scheduler.
///
/// Owns every piece of mutable core state: per-credential windows, bucket
/// queues, and the wake heap. The public API only talks to it through
/// channels, so no locks guard any of it.
pub(crate) struct EventLoop {
    queue_capacity: usize,
    additional_window: Duration,
    default_app_limits: Vec<LimitSpec>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    keys: Vec<KeyState>,
    buckets: Vec<BucketQueue>,
    bucket_slots: HashMap<String, usize>,
    wakeups: WakeHeap,
    admit_rx: Receiver<AdmitRequest>,
    observe_rx: Receiver<Observation>,
    close_rx: Receiver<oneshot::Sender<()>>,
}

impl EventLoop {
    pub fn new(
        settings: LoopSettings,
        admit_rx: Receiver<AdmitRequest>,
        observe_rx: Receiver<Observation>,
        close_rx: Receiver<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            queue_capacity: settings.queue_capacity,
            additional_window: settings.additional_window,
            default_app_limits: settings.default_app_limits,
            clock: settings.clock,
            metrics: settings.metrics,
            keys: (0..settings.key_count).map(|_| KeyState::default()).collect(),
            buckets: Vec::new(),
            bucket_slots: HashMap::new(),
            wakeups: WakeHeap::default(),
            admit_rx,
            observe_rx,
            close_rx,
        }
    }

    pub async fn run(mut self) {
        loop {
            let sleep_for = match self.wakeups.peek() {
                Some((_, at)) => at.saturating_duration_since(self.clock.now()),
                None => IDLE_TIMER_WINDOW,
            };

            tokio::select! {
                req = self.admit_rx.recv() => match req {
                    Ok(req) => self.handle_admit(req),
                    Err(_) => break,
                },
                obs = self.observe_rx.recv() => match obs {
                    Ok(obs) => self.handle_observation(obs),
                    Err(_) => break,
                },
                ack = self.close_rx.recv() => {
                    self.shutdown();
                    if let Ok(ack) = ack {
                        let _ = ack.send(());
                    }
                    return;
                }
                _ = tokio::time::sleep(sleep_for) => self.drain_due(),
            }
        }

        // Every limiter handle is gone; fail whatever is queued and exit.
        self.shutdown();
    } // end method run

    fn handle_admit(&mut self, req: AdmitRequest) {
        if req.cancelled() {
            return;
        }

        let slot = self.bucket_slot(&req.admission.region, &req.admission.bucket);

        if self.buckets[slot].depth() >= self.queue_capacity {
            let now = self.clock.now();
            let (_, earliest) = pick_key(
                &mut self.keys,
                &self.default_app_limits,
                now,
                &req.admission.region,
                &req.admission.bucket,
                req.admission.priority,
            );
            let retry_after = earliest
                .saturating_duration_since(now)
                .max(Duration::from_secs(1));

            debug!(bucket = %req.admission.bucket, "bucket queue full, rejecting admission");
            let _ = req.reply.send(Err(RejectedError::with_retry_after(
                RejectReason::QueueFull,
                retry_after,
            )));
            self.metrics
                .observe_admission(Duration::ZERO, AdmissionOutcome::RejectedQueueFull);
            return;
        }

        let priority = req.admission.priority;
        self.buckets[slot].enqueue(req);
        self.metrics
            .observe_queue_depth(&self.buckets[slot].name, priority, self.buckets[slot].depth());
        self.dispatch(slot);
    } // end method handle_admit

    fn handle_observation(&mut self, obs: Observation) {
        if obs.key_index >= self.keys.len() {
            return;
        }
        if obs.region.is_empty() || obs.bucket.is_empty() {
            return;
        }

        let now = self.clock.now();
        let retry_after = header_str(&obs.headers, "Retry-After")
            .and_then(|value| parse_retry_after(value, SystemTime::now()));

        let limit_type = header_str(&obs.headers, "X-Rate-Limit-Type").unwrap_or("");
        let rate_limited = obs.status == StatusCode::TOO_MANY_REQUESTS;
        let apply_method_retry = rate_limited && limit_type.trim().eq_ignore_ascii_case("method");
        let apply_app_retry = rate_limited && !apply_method_retry;

        let app_limits = parse_rate_header(
            header_str(&obs.headers, "X-App-Rate-Limit").unwrap_or(""),
            header_str(&obs.headers, "X-App-Rate-Limit-Count").unwrap_or(""),
        );
        let method_limits = parse_rate_header(
            header_str(&obs.headers, "X-Method-Rate-Limit").unwrap_or(""),
            header_str(&obs.headers, "X-Method-Rate-Limit-Count").unwrap_or(""),
        );

        let key = &mut self.keys[obs.key_index];
        key.app(&obs.region, &self.default_app_limits, now).apply(
            &app_limits,
            retry_after,
            apply_app_retry,
            now,
            self.additional_window,
        );
        key.method(&obs.bucket).apply(
            &method_limits,
            retry_after,
            apply_method_retry,
            now,
            self.additional_window,
        );

        // An app-scope change can unblock or newly block every bucket in the
        // region, so re-evaluate all of them.
        for slot in 0..self.buckets.len() {
            if self.buckets[slot].region == obs.region {
                self.dispatch(slot);
            }
        }
    } // end method handle_observation

    /// Serves a bucket's queue until it drains or its head must wait.
    fn dispatch(&mut self, slot: usize) {
        loop {
            let Some(req) = self.buckets[slot].dequeue_valid() else {
                self.wakeups.remove(&mut self.buckets, slot);
                return;
            };

            let now = self.clock.now();
            let (key_index, earliest) = pick_key(
                &mut self.keys,
                &self.default_app_limits,
                now,
                &self.buckets[slot].region,
                &self.buckets[slot].name,
                req.admission.priority,
            );

            let Some(key_index) = key_index else {
                let _ = req.reply.send(Err(RejectedError::with_retry_after(
                    RejectReason::NoAvailableKey,
                    Duration::from_secs(1),
                )));
                self.metrics
                    .observe_admission(Duration::ZERO, AdmissionOutcome::RejectedNoKey);
                continue;
            };

            if earliest > now {
                // Not ready yet: back to the head of its class, wake later.
                self.buckets[slot].requeue_front(req);
                self.wakeups.upsert(&mut self.buckets, slot, Some(earliest));
                return;
            }

            let key = &mut self.keys[key_index];
            let admitted = key
                .app(&self.buckets[slot].region, &self.default_app_limits, now)
                .consume(now)
                && key.method(&self.buckets[slot].name).consume(now);

            if !admitted {
                // Lost the race with a just-applied observation; retry shortly.
                self.buckets[slot].requeue_front(req);
                self.wakeups
                    .upsert(&mut self.buckets, slot, Some(now + CONSUME_RETRY_DELAY));
                return;
            }

            let wait = now.saturating_duration_since(req.submitted_at);
            let priority = req.admission.priority;
            let _ = req.reply.send(Ok(Ticket { key_index }));
            self.metrics.observe_admission(wait, AdmissionOutcome::Allowed);
            self.metrics.observe_queue_depth(
                &self.buckets[slot].name,
                priority,
                self.buckets[slot].depth(),
            );
        }
    } // end method dispatch

    fn drain_due(&mut self) {
        let now = self.clock.now();
        while let Some(slot) = self.wakeups.pop_due(&mut self.buckets, now) {
            self.dispatch(slot);
        }
    }

    fn shutdown(&mut self) {
        self.admit_rx.close();
        self.observe_rx.close();

        // Requests still in flight on the admit channel get the same answer
        // as queued ones.
        while let Ok(req) = self.admit_rx.try_recv() {
            let _ = req
                .reply
                .send(Err(RejectedError::new(RejectReason::ShuttingDown)));
        }

        for slot in 0..self.buckets.len() {
            while let Some(req) = self.buckets[slot].dequeue_valid() {
                let _ = req
                    .reply
                    .send(Err(RejectedError::new(RejectReason::ShuttingDown)));
            }
        }
    } // end method shutdown

    fn bucket_slot(&mut self, region: &str, bucket: &str) -> usize {
        if let Some(&slot) = self.bucket_slots.get(bucket) {
            return slot;
        }
        let slot = self.buckets.len();
        self.buckets
            .push(BucketQueue::new(region.to_string(), bucket.to_string()));
        self.bucket_slots.insert(bucket.to_string(), slot);
        slot
    }
}

/// Finds the credential whose combined app/method readiness is earliest.
///
/// Ties resolve to the lowest index, deterministically. High priority skips
/// pacing but not hard ceilings or blocks. With no credentials at all the
/// sentinel `(None, now + 1s)` is returned.
fn pick_key(
    keys: &mut [KeyState],
    default_app_limits: &[LimitSpec],
    now: Instant,
    region: &str,
    bucket: &str,
    priority: Priority,
) -> (Option<usize>, Instant) {
    let bypass_pacing = priority == Priority::High;
    let mut best: Option<(usize, Instant)> = None;

    for (index, key) in keys.iter_mut().enumerate() {
        let app_at = key
            .app(region, default_app_limits, now)
            .next_allowed(now, bypass_pacing);
        let method_at = key.method(bucket).next_allowed(now, bypass_pacing);
        let ready_at = app_at.max(method_at);

        if best.is_none_or(|(_, best_at)| ready_at < best_at) {
            best = Some((index, ready_at));
        }
    }

    match best {
        Some((index, at)) => (Some(index), at),
        None => (None, now + Duration::from_secs(1)),
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
