//! Await-with-backoff confirmation polling
//!
//! All confirmation waits go through one primitive so timeout semantics are
//! uniform across ledgers: a fixed retry interval and a hard attempt ceiling
//! that acts as the timeout. There is no cancellation token; an abandoned
//! poll stops being awaited but does not abort the underlying transaction.

use paygrid_types::Result;
use std::future::Future;
use std::time::Duration;

/// Polling parameters for one confirmation wait
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Fixed delay between probe attempts
    pub interval: Duration,
    /// Hard attempt ceiling; exceeding it yields `PollOutcome::TimedOut`
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

/// One probe observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollProbe<T> {
    /// Not yet in a terminal state
    Pending,
    /// Terminal success
    Confirmed(T),
    /// Terminal failure reported by the ledger
    Failed(String),
}

/// Result of a bounded confirmation wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Confirmed(T),
    Failed(String),
    TimedOut,
}

/// Probe until a terminal state or the attempt ceiling is reached.
///
/// Probe errors propagate immediately; they are adapter faults, not
/// pending states.
pub async fn await_confirmation<T, F, Fut>(
    config: &PollConfig,
    mut probe: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollProbe<T>>>,
{
    for attempt in 0..config.max_attempts {
        match probe().await? {
            PollProbe::Pending => {
                tracing::debug!(attempt, "confirmation pending");
                tokio::time::sleep(config.interval).await;
            }
            PollProbe::Confirmed(value) => return Ok(PollOutcome::Confirmed(value)),
            PollProbe::Failed(reason) => return Ok(PollOutcome::Failed(reason)),
        }
    }
    Ok(PollOutcome::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn confirms_after_pending_reads() {
        let reads = AtomicU32::new(0);
        let outcome = await_confirmation(&fast_config(10), || async {
            if reads.fetch_add(1, Ordering::SeqCst) < 3 {
                Ok(PollProbe::Pending)
            } else {
                Ok(PollProbe::Confirmed("done"))
            }
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Confirmed("done"));
    }

    #[tokio::test]
    async fn times_out_at_attempt_ceiling() {
        let reads = AtomicU32::new(0);
        let outcome: PollOutcome<()> = await_confirmation(&fast_config(5), || async {
            reads.fetch_add(1, Ordering::SeqCst);
            Ok(PollProbe::Pending)
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(reads.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn failure_is_terminal() {
        let outcome: PollOutcome<()> = await_confirmation(&fast_config(10), || async {
            Ok(PollProbe::Failed("reverted".to_string()))
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Failed("reverted".to_string()));
    }
}
