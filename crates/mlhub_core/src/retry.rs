//! Bounded retry with a fixed interval and a distinguished last attempt.
//!
//! A handler `f(last_chance)` is attempted at most `max_retry` times. Every
//! attempt but the final one receives `false`; the final one receives `true`
//! so the handler can apply terminal policy (for example swallow a failure
//! its own backend will retry). A single-attempt policy runs `f(true)` once.
//!
//! The loop does not classify errors: every failure is retried. Handlers that
//! know a failure is permanent turn it into success themselves.
//!
//! Sleeps block the calling consumer, which keeps per-topic ordering: the next
//! event of the stream waits until this one resolves. When a shutdown receiver
//! is attached, a pending sleep is cut short and the last error is returned.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;

/// Interval used by [`Retrier::run`].
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct Retrier {
    max_retry: u32,
    interval: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Retrier {
    pub fn new(max_retry: u32) -> Self {
        Self {
            max_retry,
            interval: DEFAULT_RETRY_INTERVAL,
            shutdown: None,
        }
    }

    /// Override the interval used by [`Retrier::run`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Abort sleeping retries once the receiver observes `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Retry `f` with the default short interval.
    pub async fn run<F, Fut>(&self, f: F) -> Result<()>
    where
        F: FnMut(bool) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.retry(f, self.interval).await
    }

    pub async fn retry<F, Fut>(&self, mut f: F, interval: Duration) -> Result<()>
    where
        F: FnMut(bool) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let n = i64::from(self.max_retry) - 1;
        if n <= 0 {
            return f(true).await;
        }

        let mut last_err = match f(false).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        for attempt in 2..=n {
            debug!(attempt, error = %last_err, "retrying after failure");
            if !self.pause(interval).await {
                warn!(attempt, "retry aborted by shutdown");
                return Err(last_err);
            }

            match f(false).await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = e,
            }
        }

        debug!(attempt = n + 1, error = %last_err, "last chance after failure");
        if !self.pause(interval).await {
            warn!(attempt = n + 1, "retry aborted by shutdown");
            return Err(last_err);
        }

        f(true).await
    }

    /// Sleep for `interval`. Returns false when shutdown arrived first.
    async fn pause(&self, interval: Duration) -> bool {
        let Some(shutdown) = &self.shutdown else {
            tokio::time::sleep(interval).await;
            return true;
        };

        let mut shutdown = shutdown.clone();
        if *shutdown.borrow() {
            return false;
        }

        let sleep = tokio::time::sleep(interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => return false,
                    Ok(()) => continue,
                    Err(_) => {
                        // Sender gone: nobody can request shutdown any more.
                        sleep.await;
                        return true;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MlHubError;
    use std::sync::{Arc, Mutex};

    fn recorder() -> Arc<Mutex<Vec<bool>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    async fn always_fail(calls: &Arc<Mutex<Vec<bool>>>, last_chance: bool) -> Result<()> {
        calls.lock().unwrap().push(last_chance);
        Err(MlHubError::provisioning("backend down"))
    }

    #[tokio::test(start_paused = true)]
    async fn three_attempts_on_persistent_failure() {
        let calls = recorder();
        let retrier = Retrier::new(3);

        let started = tokio::time::Instant::now();
        let result = retrier.run(|last| always_fail(&calls, last)).await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), vec![false, false, true]);
        assert_eq!(started.elapsed(), DEFAULT_RETRY_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_is_the_last_chance() {
        let calls = recorder();
        let result = Retrier::new(1)
            .run(|last| always_fail(&calls, last))
            .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_retry_still_attempts_once() {
        let calls = recorder();
        let _ = Retrier::new(0).run(|last| always_fail(&calls, last)).await;
        assert_eq!(*calls.lock().unwrap(), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn two_attempts_skip_the_middle_loop() {
        let calls = recorder();
        let _ = Retrier::new(2).run(|last| always_fail(&calls, last)).await;
        assert_eq!(*calls.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn success_stops_retrying() {
        let calls = recorder();
        let result = Retrier::new(5)
            .run(|last| {
                let calls = calls.clone();
                async move {
                    let mut calls = calls.lock().unwrap();
                    calls.push(last);
                    if calls.len() < 2 {
                        Err(MlHubError::provisioning("flaky"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(*calls.lock().unwrap(), vec![false, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_resource_still_gets_every_attempt() {
        let calls = recorder();
        let result = Retrier::new(3)
            .run(|last| {
                let calls = calls.clone();
                async move {
                    calls.lock().unwrap().push(last);
                    Err(MlHubError::ResourceNotExists("evaluate e1".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(MlHubError::ResourceNotExists(_))));
        assert_eq!(*calls.lock().unwrap(), vec![false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_failure_reaches_the_last_chance() {
        let calls = recorder();
        let result = Retrier::new(3)
            .run(|last| {
                let calls = calls.clone();
                async move {
                    calls.lock().unwrap().push(last);
                    if last {
                        Ok(())
                    } else {
                        Err(MlHubError::Validation("bad payload".into()))
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(*calls.lock().unwrap(), vec![false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn last_chance_may_resolve_the_failure() {
        let result = Retrier::new(3)
            .run(|last| async move {
                if last {
                    Ok(())
                } else {
                    Err(MlHubError::provisioning("still failing"))
                }
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_interval_is_used_between_attempts() {
        let calls = recorder();
        let started = tokio::time::Instant::now();
        let _ = Retrier::new(3)
            .retry(|last| always_fail(&calls, last), Duration::from_secs(10))
            .await;
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_a_sleeping_retry() {
        let calls = recorder();
        let (tx, rx) = watch::channel(false);
        let retrier = Retrier::new(10)
            .with_interval(Duration::from_secs(60))
            .with_shutdown(rx);

        let task_calls = calls.clone();
        let handle = tokio::spawn(async move {
            retrier.run(|last| always_fail(&task_calls, last)).await
        });

        tokio::time::sleep(Duration::from_secs(90)).await;
        tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(MlHubError::Provisioning { .. })));
        // First attempt at t=0, second at t=60, shutdown during the second sleep.
        assert_eq!(*calls.lock().unwrap(), vec![false, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_shutdown_sender_does_not_abort() {
        let calls = recorder();
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let _ = Retrier::new(3)
            .with_shutdown(rx)
            .run(|last| always_fail(&calls, last))
            .await;
        assert_eq!(*calls.lock().unwrap(), vec![false, false, true]);
    }
}
