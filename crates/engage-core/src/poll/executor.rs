//! Poll execution

use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::error::PollError;
use crate::config::PollSettings;

/// Fixed-interval polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Upper bound on the time a poll can take
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollSettings::default().into()
    }
}

impl From<PollSettings> for PollPolicy {
    fn from(settings: PollSettings) -> Self {
        Self::new(settings.interval(), settings.max_attempts)
    }
}

/// Observer for poll attempts
pub trait PollObserver {
    fn on_attempt(&self, what: &str, attempt: u32, max_attempts: u32);
    fn on_satisfied(&self, what: &str, attempt: u32, elapsed: Duration);
    fn on_exhausted(&self, what: &str, attempts: u32, elapsed: Duration);
}

/// Observer that logs through `tracing`
pub struct TracingObserver;

impl PollObserver for TracingObserver {
    fn on_attempt(&self, what: &str, attempt: u32, max_attempts: u32) {
        debug!("Waiting for {} (attempt {}/{})", what, attempt, max_attempts);
    }

    fn on_satisfied(&self, what: &str, attempt: u32, elapsed: Duration) {
        debug!(
            "{} satisfied after {} attempts ({:.2}s)",
            what,
            attempt,
            elapsed.as_secs_f64()
        );
    }

    fn on_exhausted(&self, what: &str, attempts: u32, elapsed: Duration) {
        warn!(
            "Gave up waiting for {} after {} attempts ({:.2}s)",
            what,
            attempts,
            elapsed.as_secs_f64()
        );
    }
}

/// Poll `check` until it returns `Ok(true)`, logging through `tracing`.
///
/// Returns the attempt number that succeeded.
pub fn poll_until<F, E>(policy: &PollPolicy, what: &str, check: F) -> Result<u32, PollError<E>>
where
    F: FnMut() -> Result<bool, E>,
{
    poll_until_observed(policy, what, &TracingObserver, check)
}

/// Poll with a custom observer
pub fn poll_until_observed<F, E, O>(
    policy: &PollPolicy,
    what: &str,
    observer: &O,
    mut check: F,
) -> Result<u32, PollError<E>>
where
    F: FnMut() -> Result<bool, E>,
    O: PollObserver + ?Sized,
{
    let start = Instant::now();

    for attempt in 1..=policy.max_attempts {
        observer.on_attempt(what, attempt, policy.max_attempts);

        if check().map_err(PollError::Check)? {
            observer.on_satisfied(what, attempt, start.elapsed());
            return Ok(attempt);
        }

        if attempt < policy.max_attempts {
            thread::sleep(policy.interval);
        }
    }

    let total_duration = start.elapsed();
    observer.on_exhausted(what, policy.max_attempts, total_duration);
    Err(PollError::Exhausted {
        what: what.to_string(),
        attempts: policy.max_attempts,
        total_duration,
    })
}
