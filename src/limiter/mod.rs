//! The admission and pacing core.
//!
//! One event-loop task owns all mutable scheduling state: per-credential
//! sliding windows, per-bucket priority queues, and a time-ordered wake heap.
//! [`Limiter`] handles communicate with it exclusively through channels, so
//! the state needs no locks.
//!
//! For every admission the loop picks the credential whose app and method
//! scopes are ready earliest, paces normal-priority traffic evenly across the
//! remaining window, and feeds observed upstream headers back into the window
//! state.

mod admission;
pub use admission::*;

pub(crate) mod bucket_queue;
pub(crate) mod headers;
pub(crate) mod rate_state;
pub(crate) mod wake_heap;

mod event_loop;
