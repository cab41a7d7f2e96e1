//! Process shutdown: one `CancellationToken` for every long-running task,
//! tripped by Ctrl-C or by a task that cannot continue.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long tasks get to finish once shutdown starts.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A task the coordinator waits for, labelled for the shutdown log.
pub type NamedTask = (&'static str, JoinHandle<()>);

/// Owns the shutdown token.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token tasks watch for cancellation.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start shutting down.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token on the first Ctrl-C. The listener exits on its own
    /// once the token is cancelled some other way.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => info!("interrupt received, shutting down"),
                        Err(error) => warn!(error = %error, "cannot listen for interrupt, shutting down"),
                    }
                    token.cancel();
                }
            }
        })
    }

    /// Cancel the token and give `tasks` until `timeout` (default 10 s) to
    /// finish. Stragglers are aborted. Returns how many finished in time.
    pub async fn graceful_shutdown(&self, tasks: Vec<NamedTask>, timeout: Option<Duration>) -> usize {
        self.shutdown();
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        let deadline = Instant::now() + timeout;
        info!(tasks = tasks.len(), timeout_ms = timeout.as_millis(), "draining tasks");

        let mut finished = 0;
        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {
                    debug!(task = name, "task finished");
                    finished += 1;
                }
                Ok(Err(error)) => warn!(task = name, error = %error, "task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "task did not finish before the deadline, aborting");
                    handle.abort();
                }
            }
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        assert!(!ShutdownCoordinator::new().is_shutting_down());
    }

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let a = coord.token();
        let b = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(a.is_cancelled() && b.is_cancelled());
    }

    #[tokio::test]
    async fn ctrl_c_listener_exits_on_shutdown() {
        let coord = ShutdownCoordinator::new();
        let listener = coord.cancel_on_ctrl_c();
        coord.shutdown();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn cooperative_tasks_drain() {
        let coord = ShutdownCoordinator::new();
        let tasks: Vec<NamedTask> = (0..3)
            .map(|_| {
                let token = coord.token();
                ("worker", tokio::spawn(async move { token.cancelled().await }))
            })
            .collect();
        assert_eq!(coord.graceful_shutdown(tasks, None).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_is_aborted_at_deadline() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let polite = tokio::spawn(async move { token.cancelled().await });
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let started = Instant::now();

        let finished = coord
            .graceful_shutdown(
                vec![("stuck", stuck), ("polite", polite)],
                Some(Duration::from_millis(100)),
            )
            .await;
        assert_eq!(finished, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
