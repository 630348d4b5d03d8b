//! Connect-time retry for the initiator role.
//!
//! Retries only apply while establishing the TCP connection. Once a socket is
//! up, any later failure is terminal for that connection.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// How many extra connect attempts to make and how long to wait between them.
///
/// `max_retries = 0` means a single attempt; a zero `retry_wait` retries
/// immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_wait_ms: u64) -> Self {
        Self {
            max_retries,
            retry_wait: Duration::from_millis(retry_wait_ms),
        }
    }

    /// Total number of attempts this policy allows.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Runs `attempt` until it succeeds or the policy is exhausted.
///
/// `attempt` receives the zero-based attempt number.
///
/// # Errors
///
/// Returns the error of the last attempt.
pub async fn retry_connect<S, F, Fut>(policy: RetryPolicy, mut attempt: F) -> io::Result<S>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = io::Result<S>>,
{
    let mut number = 0;
    loop {
        match attempt(number).await {
            Ok(stream) => return Ok(stream),
            Err(e) if number < policy.max_retries => {
                warn!(
                    attempt = number + 1,
                    of = policy.attempts(),
                    "connect failed: {e}; retrying in {:?}",
                    policy.retry_wait
                );
                if !policy.retry_wait.is_zero() {
                    tokio::time::sleep(policy.retry_wait).await;
                }
                number += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Opens a TCP connection to the first reachable address in `addrs`,
/// retrying according to `policy`.
///
/// # Errors
///
/// Returns the I/O error of the final attempt once retries are exhausted.
pub async fn connect_with_retry(addrs: &[SocketAddr], policy: RetryPolicy) -> io::Result<TcpStream> {
    retry_connect(policy, |number| {
        debug!(attempt = number + 1, "connecting to {addrs:?}");
        TcpStream::connect(addrs)
    })
    .await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn refused() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "refused")
    }

    #[test]
    fn test_policy_attempts_counts_first_try() {
        assert_eq!(RetryPolicy::default().attempts(), 1);
        assert_eq!(RetryPolicy::new(2, 50).attempts(), 3);
    }

    #[tokio::test]
    async fn test_retry_connect_makes_exactly_max_retries_plus_one_attempts() {
        // Arrange
        let policy = RetryPolicy::new(2, 50);
        let mut stamps = Vec::new();

        // Act
        let result: io::Result<()> = retry_connect(policy, |_| {
            stamps.push(Instant::now());
            async { Err(refused()) }
        })
        .await;

        // Assert
        assert!(result.is_err());
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn test_retry_connect_stops_at_first_success() {
        let mut calls = 0;

        let result = retry_connect(RetryPolicy::new(5, 0), |number| {
            calls += 1;
            async move {
                if number == 1 {
                    Ok(number)
                } else {
                    Err(refused())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let mut calls = 0;

        let result: io::Result<()> = retry_connect(RetryPolicy::default(), |_| {
            calls += 1;
            async { Err(refused()) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(calls, 1);
    }
}
