use crate::client::ConductorClient;
use crate::proto::{Host, UpdateHostStatusRequest};
use crate::{Error, Result};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use nodelet_config::Config;
use tonic::transport::Endpoint;
use tonic::{Code, Status};
use tracing::{debug, info, warn};

/// The remote side the node agent reports to.
#[async_trait]
pub trait Conductor: Send {
    /// Submits the observed host and returns the conductor's view of it.
    async fn update_host_status(&mut self, host: &Host) -> Result<Host>;
}

/// Retry configuration for conductor calls.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per call, at least one.
    pub max_attempts: u32,

    /// Deadline of a single attempt.
    pub attempt_timeout: Duration,

    /// Deadline of the whole call, retries included.
    pub deadline: Duration,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Upper bound for the delay between attempts.
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            deadline: Duration::from_secs(20),
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Builds the policy from the conductor settings in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.grpc_retry_max.max(1),
            attempt_timeout: Duration::from_secs(config.grpc_retry_timeout_seconds),
            deadline: Duration::from_secs(config.connect_timeout),
            ..Self::default()
        }
    }
}

const fn is_retryable(code: Code) -> bool {
    matches!(code, Code::Aborted | Code::Unavailable)
}

/// Runs `call` under `policy`.
///
/// Only `Aborted`, `Unavailable` and attempts exceeding their own deadline
/// are retried. The whole sequence is bounded by [`RetryPolicy::deadline`].
///
/// # Errors
///
/// Returns the last status once attempts run out, or [`Error::Timeout`].
pub async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = std::result::Result<T, Status>> + Send,
{
    let attempts = async {
        let mut attempt = 0;
        let mut delay = policy.initial_delay;

        loop {
            attempt += 1;
            let error = match tokio::time::timeout(policy.attempt_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(status)) if is_retryable(status.code()) => Error::Status(status),
                Ok(Err(status)) => return Err(Error::Status(status)),
                Err(_) => Error::Timeout(policy.attempt_timeout),
            };

            if attempt >= policy.max_attempts {
                return Err(error);
            }

            warn!("conductor call attempt {attempt} failed: {error}");
            tokio::time::sleep(delay).await;
            delay = std::cmp::min(delay.mul_f32(policy.backoff_factor), policy.max_delay);
        }
    };

    tokio::time::timeout(policy.deadline, attempts)
        .await
        .map_err(|_| Error::Timeout(policy.deadline))?
}

/// gRPC implementation of [`Conductor`].
///
/// The channel is opened on first use. A failed connect leaves the client
/// disconnected so the next update tries again.
#[derive(Debug)]
pub struct GrpcConductor {
    url: String,
    connect_timeout: Duration,
    policy: RetryPolicy,
    client: Option<ConductorClient>,
}

impl GrpcConductor {
    /// Creates a disconnected client for the conductor at `url` (`host:port`).
    pub fn new(url: impl Into<String>, connect_timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            policy,
            client: None,
        }
    }

    /// Creates a client from the conductor settings in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.transport_url.clone(),
            Duration::from_secs(config.connect_timeout),
            RetryPolicy::from_config(config),
        )
    }

    async fn client(&mut self) -> Result<ConductorClient> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        debug!("connecting to conductor at {}", self.url);
        let channel = Endpoint::from_shared(format!("http://{}", self.url))?
            .connect_timeout(self.connect_timeout)
            .connect()
            .await?;
        info!("connected to conductor at {}", self.url);

        let client = ConductorClient::new(channel);
        self.client = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Conductor for GrpcConductor {
    async fn update_host_status(&mut self, host: &Host) -> Result<Host> {
        let client = self.client().await?;

        let response = call_with_retry(&self.policy, || {
            let mut client = client.clone();
            let request = UpdateHostStatusRequest {
                status: Some(host.clone()),
            };
            async move { client.update_host_status(request).await }
        })
        .await?;

        response.into_inner().host.ok_or(Error::MissingHost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            attempt_timeout: Duration::from_millis(50),
            deadline: Duration::from_secs(5),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn test_policy_from_config() {
        let config = Config {
            grpc_retry_max: 0,
            grpc_retry_timeout_seconds: 7,
            connect_timeout: 11,
            ..Config::default()
        };

        let policy = RetryPolicy::from_config(&config);

        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(7));
        assert_eq!(policy.deadline, Duration::from_secs(11));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unavailable_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = call_with_retry(&fast_policy(3), || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Status::unavailable("down"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(logs_contain("conductor call attempt 2 failed"));
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = call_with_retry(&fast_policy(3), || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Status::aborted("conflict"))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Status(s)) if s.code() == Code::Aborted));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_codes_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = call_with_retry(&fast_policy(3), || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Status::invalid_argument("bad host"))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Status(s)) if s.code() == Code::InvalidArgument));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out_and_retries() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = call_with_retry(&fast_policy(2), || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_conductor_stays_disconnected() {
        let mut conductor = GrpcConductor::new(
            "127.0.0.1:1",
            Duration::from_millis(200),
            fast_policy(1),
        );

        let result = conductor.update_host_status(&Host::default()).await;

        assert!(result.is_err());
        assert!(conductor.client.is_none());
    }
}
