//! RiftRelay's admission core: decides which upstream credential serves each
//! request and when it may be released, from rate limits the upstream
//! advertises in its response headers.
//!
//! The crate focuses on:
//! - never exceeding an advertised window
//! - smoothing bursts across the remaining window instead of clumping at
//!   reset boundaries
//! - letting high-priority traffic skip pacing while still honouring hard
//!   limits
//! - surfacing backpressure as structured rejection instead of upstream 429s
//!
//! # Quick start
//!
//! ```no_run
//! use riftrelay::{Admission, Limiter, LimiterConfig, Priority};
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = Limiter::new(LimiterConfig {
//!         key_count: 2,
//!         queue_capacity: 1024,
//!         ..LimiterConfig::default()
//!     })
//!     .expect("valid limiter config");
//!
//!     match limiter
//!         .admit(Admission {
//!             region: "na1".to_string(),
//!             bucket: "na1:lol/status/v4/platform-data".to_string(),
//!             priority: Priority::Normal,
//!         })
//!         .await
//!     {
//!         Ok(ticket) => {
//!             // Forward the request using credential ticket.key_index, then
//!             // feed the upstream response back with limiter.observe(...).
//!             let _ = ticket.key_index;
//!         }
//!         Err(rejected) => {
//!             // rejected.http_status() / rejected.retry_after_secs() map the
//!             // rejection onto an HTTP answer.
//!             let _ = rejected.reason;
//!         }
//!     }
//!
//!     limiter.close().await;
//! }
//! ```

mod common;
pub use common::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod limiter;
pub use limiter::*;

mod metrics;
pub use metrics::*;

mod route;
pub use route::*;

#[cfg(test)]
mod tests;
