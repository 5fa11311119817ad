use super::{JobApi, JobCredentials, JobHandle, JobStatus};
use crate::services::error::PipelineError;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// How often and for how long to ask about a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
    max_duration: Option<Duration>,
}

impl PollPolicy {
    pub fn new(delay: Duration) -> anyhow::Result<Self> {
        anyhow::ensure!(!delay.is_zero(), "poll delay must be greater than zero");
        Ok(Self {
            delay,
            max_attempts: None,
            max_duration: None,
        })
    }

    /// Cap the number of status queries. Zero means no cap.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = (attempts > 0).then_some(attempts);
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }
}

/// Terminal status plus how long it took to get there.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub status: JobStatus,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Queries a job until it reaches a terminal state or the policy runs out.
///
/// Running → sleep and query again. Completed or Failed → return at once.
/// The poller never sleeps after the last permitted query and never starts
/// a sleep that would overrun the wall-clock budget.
pub struct JobPoller {
    policy: PollPolicy,
}

impl JobPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub async fn poll(
        &self,
        api: &dyn JobApi,
        handle: &JobHandle,
        credentials: &JobCredentials,
    ) -> Result<PollOutcome, PipelineError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let status = api.status(handle, credentials).await?;

            if status.is_terminal() {
                let elapsed = started.elapsed();
                info!(
                    "🏁 Job {} {} after {} queries ({:?})",
                    handle.id,
                    status.label(),
                    attempts,
                    elapsed
                );
                return Ok(PollOutcome {
                    status,
                    attempts,
                    elapsed,
                });
            }
            debug!("⏳ Job {} still running (query {})", handle.id, attempts);

            let elapsed = started.elapsed();
            let attempts_spent = self.policy.max_attempts.is_some_and(|max| attempts >= max);
            let time_spent = self
                .policy
                .max_duration
                .is_some_and(|max| elapsed + self.policy.delay > max);
            if attempts_spent || time_spent {
                warn!(
                    "⌛ Job {} still running after {} queries ({:?}), giving up",
                    handle.id, attempts, elapsed
                );
                return Err(PipelineError::PollTimeout {
                    job_id: handle.id.clone(),
                    attempts,
                    elapsed,
                });
            }

            sleep(self.policy.delay).await;
        }
    }
}
