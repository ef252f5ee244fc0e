use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::telemetry::add_metric;
use crate::upstream::types::{LlmClient, UpstreamError};

/// Answer returned when every attempt hit an overloaded service.
pub const APOLOGY: &str =
    "The generative service is temporarily overloaded. Please try again later.";

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Wait `attempt × step` after the failed attempt (3 s, 6 s, ... for a 3 s step)
    Linear {
        /// Delay after the first failure
        step: Duration,
    },
    /// Wait `initial × factor^(attempt-1)`, capped at `max`
    Exponential {
        /// Delay after the first failure
        initial: Duration,
        /// Growth factor
        factor: f64,
        /// Upper bound
        max: Duration,
    },
}

/// How often and how patiently to retry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Delay schedule
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Linear {
                step: Duration::from_secs(3),
            },
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear { step } => step.saturating_mul(attempt),
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                let exponent = attempt.saturating_sub(1) as i32;
                let secs = initial.as_secs_f64() * factor.powi(exponent);
                if secs.is_finite() && secs < max.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    max
                }
            }
        }
    }
}

/// Why [`with_retry`] gave up
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last: E,
    },
    /// An attempt failed with an error that is not retried
    #[error("{0}")]
    Fatal(E),
}

/// Runs `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or `policy.max_attempts` is reached. The operation receives the
/// 1-based attempt number.
pub async fn with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(error) if !should_retry(&error) => return Err(RetryError::Fatal(error)),
            Err(error) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                })
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    "Attempt failed: {}; retrying",
                    error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Sends `prompt` to `client`, retrying overloads under `policy`.
///
/// Never fails: an exhausted retry budget yields [`APOLOGY`], any other error
/// yields `"Error: <message>"`.
pub async fn ask_with_retry(client: &dyn LlmClient, prompt: &str, policy: &RetryPolicy) -> String {
    let outcome = with_retry(policy, UpstreamError::is_overloaded, |attempt| {
        info!(attempt, model = %client.model(), "Sending prompt");
        client.ask(prompt)
    })
    .await;

    match outcome {
        Ok(answer) => answer,
        Err(RetryError::Exhausted { attempts, last }) => {
            warn!(attempts, "Upstream still overloaded: {}", last);
            add_metric("upstream_retry_exhausted", 1.0, &[("model", client.model().to_string())]);
            APOLOGY.to_string()
        }
        Err(RetryError::Fatal(error)) => format!("Error: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::types::{Completion, CompletionRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct ScriptedClient {
        answers: Mutex<Vec<Result<Completion, UpstreamError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedClient {
        fn new(mut answers: Vec<Result<Completion, UpstreamError>>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, UpstreamError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(UpstreamError::Other("script exhausted".into())))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn overloaded() -> Result<Completion, UpstreamError> {
        Err(UpstreamError::from_status(503, "model overloaded"))
    }

    fn answer(text: &str) -> Result<Completion, UpstreamError> {
        Ok(Completion {
            content: text.to_string(),
            model: Some("scripted".to_string()),
            total_tokens: None,
        })
    }

    #[test]
    fn linear_schedule_is_three_then_six_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(3));
        assert_eq!(policy.delay_after(2), Duration::from_secs(6));
    }

    #[test]
    fn exponential_schedule_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: Backoff::Exponential {
                initial: Duration::from_secs(1),
                factor: 2.0,
                max: Duration::from_secs(5),
            },
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn three_overloads_wait_three_and_six_seconds_then_apologise() {
        let client = ScriptedClient::new(vec![overloaded(), overloaded(), overloaded()]);

        let reply = ask_with_retry(&client, "hello", &RetryPolicy::default()).await;

        assert_eq!(reply, APOLOGY);
        let times = client.call_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_secs(3));
        assert_eq!(times[2] - times[1], Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_one_overload() {
        let client = ScriptedClient::new(vec![overloaded(), answer("hola")]);

        let reply = ask_with_retry(&client, "hello", &RetryPolicy::default()).await;

        assert_eq!(reply, "hola");
        assert_eq!(client.call_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let client = ScriptedClient::new(vec![Err(UpstreamError::Http {
            status: 400,
            message: "bad request".to_string(),
        })]);

        let reply = ask_with_retry(&client, "hello", &RetryPolicy::default()).await;

        assert_eq!(reply, "Error: HTTP 400: bad request");
        assert_eq!(client.call_times().len(), 1);
    }
}
