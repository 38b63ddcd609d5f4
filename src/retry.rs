use crate::error::Result;
use crate::observer::{ProgressEvent, ProgressSink};
use std::future::Future;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Exponential-backoff retry for complete calls. Streaming calls never go
/// through here: a retried stream would replay chunks the caller already saw.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay inserted before attempt `attempt` (1-based). The first attempt
    /// runs immediately.
    fn backoff_before(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `attempt` up to `max_attempts` times. Fatal errors short-circuit
    /// without further attempts; exhaustion returns the last error.
    pub async fn run<T, F, Fut>(&self, sink: &dyn ProgressSink, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for n in 1..=self.max_attempts {
            if n > 1 {
                let delay = self.backoff_before(n);
                sink.on_event(&ProgressEvent::Retry { attempt: n, delay });
                tokio::time::sleep(delay).await;
            }

            match attempt().await {
                Ok(value) => {
                    if n > 1 {
                        tracing::info!(attempt = n, "call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_fatal() => {
                    tracing::warn!(error = %err, "fatal error, not retrying");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        attempt = n,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            // max_attempts >= 1, so at least one attempt ran.
            None => unreachable!("retry loop exited without an attempt"),
        }
    }
}
