use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::services::fashn::{JobState, ProviderError, SynthesisProvider};

/// Timing rules for resolving a submitted job.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Fixed delay between submission and the first status query.
    pub quiescence: Duration,
    /// Interval before the second query; backed off multiplicatively after.
    pub interval: Duration,
    /// Cap on the backed-off interval.
    pub max_interval: Duration,
    /// Backoff multiplier applied after each non-terminal response.
    pub backoff: f64,
    /// Wall-clock budget for the polling phase (excludes quiescence). Once
    /// exceeded the job is forced to a timeout failure.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_secs(30),
            interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(10),
            backoff: 1.5,
            timeout: Duration::from_secs(120),
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            quiescence: Duration::from_secs(config.poll_quiescence_secs),
            interval: Duration::from_secs(config.poll_interval_secs),
            max_interval: Duration::from_secs(config.poll_max_interval_secs),
            timeout: Duration::from_secs(config.poll_timeout_secs),
            ..Self::default()
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        let scaled = current.mul_f64(self.backoff);
        scaled.min(self.max_interval)
    }
}

/// Sit out the provider's minimum generation time before the first query.
pub async fn wait_quiescence(
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<(), PollError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        _ = sleep(policy.quiescence) => Ok(()),
    }
}

/// Query the job until the provider reports a terminal state.
///
/// Non-terminal (`pending`) responses are retried with capped multiplicative
/// backoff until `policy.timeout` elapses. A transport or API failure on any
/// single query is terminal for the job — retrying here is cheap, but a
/// half-broken link would just stretch the user's wait past the timeout
/// anyway. Submission is never retried from here or anywhere else.
///
/// Cancellation wins every race: once `cancel` fires, no further query is
/// issued and the in-flight one is dropped.
pub async fn poll_until_terminal(
    provider: &dyn SynthesisProvider,
    job_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<String>, PollError> {
    let deadline = Instant::now() + policy.timeout;
    let mut interval = policy.interval;

    loop {
        let state = tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            state = provider.status(job_id) => state.map_err(PollError::Request)?,
        };

        match state {
            JobState::Succeeded { output } if output.is_empty() => {
                return Err(PollError::EmptyOutput);
            }
            JobState::Succeeded { output } => {
                tracing::debug!(job_id, outputs = output.len(), "generation succeeded");
                return Ok(output);
            }
            JobState::Failed { error } => {
                return Err(PollError::Rejected {
                    reason: error.unwrap_or_else(|| "unspecified provider failure".to_string()),
                });
            }
            JobState::Pending => {
                tracing::trace!(job_id, "job still pending");
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(PollError::Timeout {
                limit: policy.timeout,
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = sleep(interval.min(remaining)) => {}
        }

        interval = policy.next_interval(interval);
    }
}

/// Full resolution of a submitted job: quiescence delay, then the poll loop.
pub async fn poll_job(
    provider: &dyn SynthesisProvider,
    job_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<String>, PollError> {
    wait_quiescence(policy, cancel).await?;
    poll_until_terminal(provider, job_id, policy, cancel).await
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The status query itself failed (network or provider API error),
    /// distinct from the provider reporting the job failed.
    #[error("status query failed: {0}")]
    Request(ProviderError),

    /// The provider reported the generation failed.
    #[error("generation failed: {reason}")]
    Rejected { reason: String },

    /// The provider reported success but returned no output images.
    #[error("generation succeeded with empty output")]
    EmptyOutput,

    /// The job never reached a terminal state within the polling budget.
    #[error("job did not resolve within {limit:?}")]
    Timeout { limit: Duration },

    /// The flow was torn down; nothing was or will be mutated.
    #[error("polling cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::models::job::GarmentCategory;

    /// Scripted provider: pops one canned status response per query.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<JobState>>,
        status_calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<JobState>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                status_calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SynthesisProvider for ScriptedProvider {
        async fn submit(
            &self,
            _model: &str,
            _garment: &str,
            _category: GarmentCategory,
        ) -> Result<String, ProviderError> {
            Ok("job-1".to_string())
        }

        async fn status(&self, _job_id: &str) -> Result<JobState, ProviderError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            // Stuck on pending once the script runs out.
            let next = self.responses.lock().unwrap().pop_front();
            Ok(next.unwrap_or(JobState::Pending))
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            quiescence: Duration::from_secs(30),
            interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(10),
            backoff: 1.5,
            timeout: Duration::from_secs(120),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pending_is_retried_until_success() {
        let provider = ScriptedProvider::new(vec![
            JobState::Pending,
            JobState::Pending,
            JobState::Succeeded {
                output: vec!["https://x/r.png".to_string()],
            },
        ]);
        let cancel = CancellationToken::new();

        let outputs = poll_job(&provider, "job-1", &fast_policy(), &cancel)
            .await
            .unwrap();

        assert_eq!(outputs, vec!["https://x/r.png".to_string()]);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failure_reason_is_kept() {
        let provider = ScriptedProvider::new(vec![JobState::Failed {
            error: Some("nsfw_content".to_string()),
        }]);
        let cancel = CancellationToken::new();

        let err = poll_job(&provider, "job-1", &fast_policy(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Rejected { reason } if reason == "nsfw_content"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_output_is_a_failure() {
        let provider = ScriptedProvider::new(vec![JobState::Succeeded { output: vec![] }]);
        let cancel = CancellationToken::new();

        let err = poll_job(&provider, "job-1", &fast_policy(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::EmptyOutput));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_job_times_out() {
        // Script is empty: every query reports pending.
        let provider = ScriptedProvider::new(vec![]);
        let cancel = CancellationToken::new();
        let policy = fast_policy();

        let started = Instant::now();
        let err = poll_job(&provider, "job-1", &policy, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Timeout { .. }));
        // Budget spent: quiescence plus the polling window, nothing unbounded.
        let elapsed = started.elapsed();
        assert!(elapsed >= policy.quiescence + policy.timeout);
        assert!(elapsed < policy.quiescence + policy.timeout + Duration::from_secs(15));
        assert!(provider.calls() > 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_quiescence_issues_no_queries() {
        let provider = ScriptedProvider::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poll_job(&provider, "job-1", &fast_policy(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Cancelled));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_loop_stops_further_queries() {
        let provider = ScriptedProvider::new(vec![]);
        let cancel = CancellationToken::new();
        let policy = fast_policy();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            // Past quiescence and the first query, inside the retry sleep.
            sleep(Duration::from_secs(31)).await;
            cancel_clone.cancel();
        });

        let err = poll_job(&provider, "job-1", &policy, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Cancelled));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = fast_policy();
        let mut interval = policy.interval;
        for _ in 0..16 {
            interval = policy.next_interval(interval);
            assert!(interval <= policy.max_interval);
        }
        assert_eq!(interval, policy.max_interval);
    }
}
