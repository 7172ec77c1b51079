//! Check-in outcome verification.
//!
//! A launched worker is judged from the outside: after a grace period its
//! state is re-fetched, and a running worker whose output contains
//! [`SUCCESS_MARKER`] has found the reservation.
//!
//! Two policies:
//! - `SingleSample`: wait the grace period, sample once.
//! - `Poll`: wait the grace period, then re-sample with doubling delays
//!   until the marker shows up, the worker stops, or the timeout passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::RuntimeError;
use crate::runtime::{WorkerHandle, WorkerRuntime};

/// Line a worker prints once the reservation has been found.
pub const SUCCESS_MARKER: &str = "Flight information found";

/// Upper bound for the delay between two polls.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Lower bound for the delay between two polls.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a launched worker is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyPolicy {
    /// Sleep `grace`, then classify a single sample.
    SingleSample { grace: Duration },
    /// Sleep `grace`, then sample every `interval` (doubling, capped) until
    /// `timeout` has passed since verification began.
    Poll {
        grace: Duration,
        interval: Duration,
        timeout: Duration,
    },
}

impl VerifyPolicy {
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(3);
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self::SingleSample {
            grace: Self::DEFAULT_GRACE,
        }
    }
}

/// Result of verifying one worker. Terminal for its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Worker is running and reported the reservation.
    Success { job_id: String },
    /// Worker is gone or has stopped.
    NotFound,
    /// Worker is running but never printed the marker. Carries its output.
    StillPending { output: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Samples worker state and classifies the outcome.
#[derive(Clone)]
pub struct OutcomeVerifier {
    runtime: Arc<dyn WorkerRuntime>,
    policy: VerifyPolicy,
}

impl OutcomeVerifier {
    pub fn new(runtime: Arc<dyn WorkerRuntime>, policy: VerifyPolicy) -> Self {
        Self { runtime, policy }
    }

    /// Verify `handle` according to the configured policy.
    pub async fn verify(&self, handle: &WorkerHandle) -> Result<Outcome, RuntimeError> {
        let outcome = match self.policy {
            VerifyPolicy::SingleSample { grace } => {
                tokio::time::sleep(grace).await;
                self.sample(handle).await?
            }
            VerifyPolicy::Poll {
                grace,
                interval,
                timeout,
            } => self.poll(handle, grace, interval, timeout).await?,
        };

        if let Outcome::StillPending { output } = &outcome {
            tracing::warn!(
                worker = handle.short_id(),
                "Couldn't find reservation. Worker output below"
            );
            tracing::warn!("{output}");
        }
        Ok(outcome)
    }

    async fn poll(
        &self,
        handle: &WorkerHandle,
        grace: Duration,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Outcome, RuntimeError> {
        // `None` when the timeout is too large to represent: poll until the worker settles.
        let deadline = Instant::now().checked_add(timeout);
        tokio::time::sleep(grace).await;

        let mut delay = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        loop {
            let outcome = self.sample(handle).await?;
            if !matches!(outcome, Outcome::StillPending { .. }) {
                return Ok(outcome);
            }

            let now = Instant::now();
            let pause = match deadline {
                Some(deadline) if now >= deadline => return Ok(outcome),
                Some(deadline) => delay.min(deadline - now),
                None => delay,
            };
            tokio::time::sleep(pause).await;
            delay = (delay * 2).min(MAX_POLL_INTERVAL);
        }
    }

    /// Re-fetch the worker's state and classify it once.
    async fn sample(&self, handle: &WorkerHandle) -> Result<Outcome, RuntimeError> {
        let state = match self.runtime.inspect(&handle.id).await {
            Ok(state) => state,
            Err(RuntimeError::NotFound { .. }) => {
                tracing::info!(worker = handle.short_id(), "Worker no longer exists");
                return Ok(Outcome::NotFound);
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            worker = handle.short_id(),
            status = %state.status,
            "Sampled worker state"
        );

        if !state.running {
            return Ok(Outcome::NotFound);
        }

        let output = self.runtime.fetch_output(&handle.id).await?;
        if contains_marker(&output) {
            Ok(Outcome::Success {
                job_id: handle.short_id().to_string(),
            })
        } else {
            Ok(Outcome::StillPending {
                output: String::from_utf8_lossy(&output).into_owned(),
            })
        }
    }
}

fn contains_marker(output: &[u8]) -> bool {
    let marker = SUCCESS_MARKER.as_bytes();
    output.windows(marker.len()).any(|w| w == marker)
}
