//! Error types for bounded polling

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Errors that can occur while polling a predicate
#[derive(Debug)]
pub enum PollError<E> {
    /// The predicate never became true within the attempt budget
    Exhausted {
        /// What was being waited for
        what: String,
        /// Number of attempts made
        attempts: u32,
        /// Total time spent polling
        total_duration: Duration,
    },

    /// The predicate itself failed; polling stops immediately
    Check(E),
}

impl<E: fmt::Display> fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Exhausted {
                what,
                attempts,
                total_duration,
            } => write!(
                f,
                "timed out waiting for {} after {} attempts over {:.2}s",
                what,
                attempts,
                total_duration.as_secs_f64()
            ),
            PollError::Check(err) => write!(f, "poll check failed: {}", err),
        }
    }
}

impl<E: Error + 'static> Error for PollError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PollError::Exhausted { .. } => None,
            PollError::Check(err) => Some(err),
        }
    }
}

impl<E> PollError<E> {
    /// True if the attempt budget ran out
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PollError::Exhausted { .. })
    }
}
