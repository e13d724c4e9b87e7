use std::thread;
use std::time::{Duration, Instant};

use testbed_core::{Condition, PollPolicy, Readiness, ResourceKey};
use tracing::{debug, trace};

use crate::traits::ReadinessObserver;
use crate::{Result, SessionError};

/// Lower bound for the delay between two polls.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Poll `observer` until `key` reaches `condition`.
///
/// The condition is checked at least once, even with a zero timeout. Sleeps
/// never extend past the deadline. A timeout too large to represent waits
/// without a deadline.
///
/// # Errors
///
/// Returns [`SessionError::Timeout`] when the deadline passes,
/// [`SessionError::PermanentlyFailed`] when the resource reports that it will
/// never reach the condition, or the observer's own error.
pub fn wait_until(
    observer: &dyn ReadinessObserver,
    key: &ResourceKey,
    condition: &Condition,
    policy: PollPolicy,
) -> Result<()> {
    let started = Instant::now();
    let deadline = started.checked_add(policy.timeout);
    let interval = policy.interval.max(MIN_INTERVAL);
    let mut polls = 0_u32;

    loop {
        polls += 1;
        match observer.observe(key, condition)? {
            Readiness::Ready => {
                debug!(resource = %key, %condition, polls, "condition reached");
                return Ok(());
            }
            Readiness::Failed(reason) => {
                return Err(SessionError::PermanentlyFailed {
                    key: key.clone(),
                    reason,
                });
            }
            Readiness::Pending => {}
        }

        let now = Instant::now();
        let sleep = match deadline {
            Some(deadline) if now >= deadline => {
                return Err(SessionError::Timeout {
                    key: key.clone(),
                    condition: condition.clone(),
                    waited: now - started,
                });
            }
            Some(deadline) => interval.min(deadline - now),
            None => interval,
        };
        trace!(resource = %key, %condition, polls, "waiting");
        thread::sleep(sleep);
    }
}
