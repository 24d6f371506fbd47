//! Optimistic read-modify-write with bounded retry
//!
//! Each attempt returns an explicit [`Outcome`]: conflicts and store outages are
//! [`Outcome::Retryable`] and restart the cycle from a fresh read, everything else
//! is [`Outcome::Fatal`] and ends it immediately.

use crate::client::ResourceClient;
use crate::{Error, Result};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of one attempt
#[derive(Debug)]
pub enum Outcome<T> {
    Retryable(Error),
    Fatal(Error),
    Success(T),
}

impl<T> Outcome<T> {
    /// Sort a store result by whether its error is worth another attempt
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) if err.is_retryable() => Outcome::Retryable(err),
            Err(err) => Outcome::Fatal(err),
        }
    }
}

/// Retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Maximum number of attempts
    pub steps: u32,
    /// Delay after the first failed attempt
    pub duration: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub factor: f64,
    /// Each delay is stretched by up to this fraction at random
    pub jitter: f64,
    /// Upper bound for a single delay before jitter
    pub cap: Duration,
    /// Wall-clock budget for the whole cycle
    pub max_elapsed: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            steps: 5,
            duration: Duration::from_millis(10),
            factor: 1.0,
            jitter: 0.1,
            cap: Duration::from_secs(1),
            max_elapsed: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Delay to wait after `attempt` failed attempts (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.duration.as_secs_f64() * self.factor.max(1.0).powi(exponent);
        let capped = base.min(self.cap.as_secs_f64());
        let stretched = if self.jitter > 0.0 {
            capped + capped * self.jitter * rand::random::<f64>()
        } else {
            capped
        };
        Duration::from_secs_f64(stretched)
    }
}

/// Run `attempt` until it succeeds, fails fatally, or the policy gives up
///
/// Cancelling `cancel` aborts promptly, both mid-attempt and mid-sleep, with
/// [`Error::Cancelled`]. Running out of steps or of the wall-clock budget yields
/// [`Error::RetryExhausted`].
pub async fn retry_on_conflict<T, F, Fut>(
    backoff: &Backoff,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let started = Instant::now();
    let steps = backoff.steps.max(1);
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = attempt() => outcome,
        };
        attempts += 1;

        let cause = match outcome {
            Outcome::Success(value) => return Ok(value),
            Outcome::Fatal(err) => return Err(err),
            Outcome::Retryable(cause) => cause,
        };

        if attempts >= steps {
            warn!(error = %cause, attempts, "retry attempts exhausted");
            return Err(Error::RetryExhausted { attempts });
        }

        let delay = backoff.delay(attempts - 1);
        if started.elapsed() + delay > backoff.max_elapsed {
            warn!(error = %cause, attempts, "retry budget exhausted");
            return Err(Error::RetryExhausted { attempts });
        }

        debug!(error = %cause, attempts, delay_ms = delay.as_millis() as u64, "retrying");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Re-read `name`, apply `mutate` to the latest copy and write it back
///
/// `mutate` must compute the whole next state from the object it is given: it
/// runs once per attempt, each time on a freshly read base. An error from
/// `mutate` ends the cycle without retrying, as does a missing object.
pub async fn update_with_retry<K, F>(
    client: &ResourceClient<K>,
    name: &str,
    backoff: &Backoff,
    cancel: &CancellationToken,
    mutate: F,
) -> Result<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    F: Fn(K) -> Result<K>,
{
    let mutate = &mutate;
    retry_on_conflict(backoff, cancel, move || async move {
        let latest = match client.get(name).await {
            Ok(latest) => latest,
            Err(err) => return Outcome::from_result(Err(err)),
        };
        let next = match mutate(latest) {
            Ok(next) => next,
            Err(err) => return Outcome::Fatal(err),
        };
        Outcome::from_result(client.replace(&next).await)
    })
    .await
}
