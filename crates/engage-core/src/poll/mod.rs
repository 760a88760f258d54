//! Bounded polling
//!
//! Service liveness is confirmed by polling a predicate at a fixed interval
//! for a fixed number of attempts. Running out of attempts is an error, never
//! a silent continue.
//!
//! ```rust
//! use engage_core::poll::{poll_until, PollPolicy};
//! use std::time::Duration;
//!
//! let policy = PollPolicy::new(Duration::from_millis(1), 3);
//! let mut calls = 0;
//! let attempts = poll_until(&policy, "counter", || {
//!     calls += 1;
//!     Ok::<_, std::io::Error>(calls == 2)
//! })
//! .unwrap();
//! assert_eq!(attempts, 2);
//! ```

mod error;
mod executor;

pub use error::PollError;
pub use executor::{poll_until, poll_until_observed, PollObserver, PollPolicy, TracingObserver};
