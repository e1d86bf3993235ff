use std::sync::Arc;
use std::time::Duration;

use async_channel::TrySendError;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    Admission, Clock, ConfigError, LimitSpec, MetricsSink, NoopMetrics, Observation, RejectReason,
    RejectedError, Ticket, WallClock,
};

use super::bucket_queue::AdmitRequest;
use super::event_loop::{EventLoop, LoopSettings};

/// Buffer of the observation channel; saturation beyond this drops updates.
const OBSERVE_BUFFER: usize = 256;

/// Options for [`Limiter::new`].
#[derive(Clone, Default)]
pub struct LimiterConfig {
    /// Number of interchangeable credential slots. Must be > 0.
    pub key_count: usize,
    /// Maximum queued admissions per bucket; beyond this, requests are
    /// rejected with `queue_full`. Must be > 0.
    pub queue_capacity: usize,
    /// Safety margin added to every observed window duration, hedging clock
    /// skew between the relay and the upstream.
    pub additional_window: Duration,
    /// Starter windows applied to every app scope before any observation, so
    /// cold-start traffic is already paced.
    pub default_app_limits: Vec<LimitSpec>,
    /// Time source; wall clock unless overridden (tests).
    pub clock: Option<Arc<dyn Clock>>,
    /// Metrics sink; a no-op sink unless overridden. Implementations are
    /// called synchronously from the scheduler and must not block.
    pub metrics: Option<Arc<dyn MetricsSink>>,
}

/// Admission gate in front of a rate-limited upstream.
///
/// Decides which credential serves each request and when it may be released,
/// from the limits the upstream advertises in its response headers. All
/// mutable state lives behind a single event-loop task; handles are cheap to
/// clone and safe to share across tasks.
#[derive(Clone)]
pub struct Limiter {
    admit_tx: async_channel::Sender<AdmitRequest>,
    observe_tx: async_channel::Sender<Observation>,
    close_tx: async_channel::Sender<oneshot::Sender<()>>,
    clock: Arc<dyn Clock>,
}

impl Limiter {
    /// Validates `config`, spawns the scheduler task, and returns a handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: LimiterConfig) -> Result<Self, ConfigError> {
        if config.key_count == 0 {
            return Err(ConfigError::InvalidLimiter("key_count must be > 0"));
        }
        if config.queue_capacity == 0 {
            return Err(ConfigError::InvalidLimiter("queue_capacity must be > 0"));
        }

        let clock: Arc<dyn Clock> = config.clock.unwrap_or_else(|| Arc::new(WallClock));
        let metrics: Arc<dyn MetricsSink> = config.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));

        let (admit_tx, admit_rx) = async_channel::bounded(1);
        let (observe_tx, observe_rx) = async_channel::bounded(OBSERVE_BUFFER);
        let (close_tx, close_rx) = async_channel::bounded(1);

        let event_loop = EventLoop::new(
            LoopSettings {
                key_count: config.key_count,
                queue_capacity: config.queue_capacity,
                additional_window: config.additional_window,
                default_app_limits: config.default_app_limits,
                clock: Arc::clone(&clock),
                metrics,
            },
            admit_rx,
            observe_rx,
            close_rx,
        );
        tokio::spawn(event_loop.run());

        Ok(Self {
            admit_tx,
            observe_tx,
            close_tx,
            clock,
        })
    }

    /// Submits a request and waits for its ticket.
    ///
    /// Resolves once the scheduler admits the request (a [`Ticket`] naming
    /// the credential to use upstream) or rejects it with a structured
    /// [`RejectedError`]. Safe for any number of concurrent callers.
    ///
    /// Dropping the returned future abandons the request; the scheduler skips
    /// it without consuming budget. The limiter imposes no timeout of its
    /// own: wrap the call in [`tokio::time::timeout`] as needed.
    pub async fn admit(&self, admission: Admission) -> Result<Ticket, RejectedError> {
        if admission.region.is_empty() || admission.bucket.is_empty() {
            return Err(RejectedError::new(RejectReason::InvalidRoute));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = AdmitRequest {
            admission,
            submitted_at: self.clock.now(),
            reply: reply_tx,
        };

        if self.admit_tx.send(request).await.is_err() {
            return Err(RejectedError::new(RejectReason::ShuttingDown));
        }

        match reply_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RejectedError::new(RejectReason::ShuttingDown)),
        }
    }

    /// Feeds an upstream response's status and headers back into the
    /// scheduler.
    ///
    /// Never blocks. When the observation channel is saturated the update is
    /// dropped: window counts are corrected monotonically by `admit` itself
    /// and by later observations, so a lost one only leaves a transiently
    /// optimistic view.
    pub fn observe(&self, observation: Observation) {
        match self.observe_tx.try_send(observation) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("observation channel saturated, dropping update");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Shuts the scheduler down and waits for it to drain.
    ///
    /// Every queued admission fails with `shutting_down`. Already-issued
    /// tickets are unaffected.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.close_tx.send(ack_tx).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}
