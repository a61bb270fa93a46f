//! Bounded retry for channel file I/O.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

/// Fixed-backoff retry bounded by a total time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub window: Duration,
}

impl RetryPolicy {
    pub fn new(interval: Duration, window: Duration) -> Self {
        Self { interval, window }
    }

    /// Run `op` until it succeeds or the next attempt would start past the window.
    ///
    /// `op` receives the zero-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> io::Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if start.elapsed() + self.interval > self.window {
                        return Err(e);
                    }
                    debug!(attempt = attempt, error = %e, "Channel I/O failed, retrying");
                }
            }

            attempt += 1;
            sleep(self.interval).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(333), Duration::from_millis(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let value = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(io::Error::new(io::ErrorKind::Other, "busy"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_window() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: io::Result<()> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::new(io::ErrorKind::Other, "locked")) }
            })
            .await;

        assert!(result.is_err());
        // Attempts at 0, 333, 666 and 999 ms
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
