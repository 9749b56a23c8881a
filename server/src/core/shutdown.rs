//! Process shutdown coordination
//!
//! A single watch channel fans the stop request out to every worker loop.
//! Loops observe the flag between batches, finish the batch they are on,
//! and exit; `drain` then joins them under a deadline so a hung warehouse
//! call cannot wedge process exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::constants::SHUTDOWN_TIMEOUT_SECS;

/// Stop flag plus the set of worker tasks to join on exit
#[derive(Clone)]
pub struct Shutdown {
    stop: Arc<watch::Sender<bool>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop: Arc::new(stop),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Receiver side of the stop flag, for a worker loop to watch
    pub fn watcher(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    /// Track a worker task so `drain` joins it on exit
    pub async fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().await.push(handle);
    }

    /// Flip the stop flag. Takes effect even if no watcher exists yet.
    pub fn request(&self) {
        self.stop.send_replace(true);
    }

    /// Whether a stop has been requested
    pub fn is_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn requested(&self) {
        let mut rx = self.stop.subscribe();
        let _ = rx.wait_for(|&stop| stop).await;
    }

    /// Request a stop and join every tracked task, bounded by a deadline.
    /// Tasks still running at the deadline are detached, not aborted.
    pub async fn drain(&self) {
        self.request();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        tracing::debug!(tasks = tasks.len(), "Draining worker tasks");

        let deadline = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
        if tokio::time::timeout(deadline, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            tracing::warn!(
                deadline_secs = deadline.as_secs(),
                "Worker tasks still running at shutdown deadline, detaching"
            );
        } else {
            tracing::debug!("Worker tasks drained");
        }
    }

    /// Flip the stop flag when the process receives Ctrl+C or SIGTERM.
    /// A signal stream that cannot be watched is logged and ignored rather
    /// than treated as fatal.
    pub fn on_termination_signal(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            let interrupt = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Cannot watch for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Cannot watch for SIGTERM");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = interrupt => tracing::info!("Interrupt received, stopping workers"),
                _ = terminate => tracing::info!("Termination signal received, stopping workers"),
            }

            shutdown.request();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_flag_starts_clear() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_requested());
    }

    #[tokio::test]
    async fn test_request_sets_flag() {
        let shutdown = Shutdown::new();
        shutdown.request();
        assert!(shutdown.is_requested());
    }

    #[tokio::test]
    async fn test_watcher_observes_request() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.watcher();

        assert!(!*rx.borrow());
        shutdown.request();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_requested_resolves_after_request() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.requested().await })
        };

        tokio::task::yield_now().await;
        shutdown.request();

        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_drain_joins_tracked_tasks() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.watcher();
        shutdown
            .track(tokio::spawn(async move {
                let _ = rx.wait_for(|&stop| stop).await;
            }))
            .await;

        shutdown.drain().await;
        assert!(shutdown.is_requested());
        assert!(shutdown.tasks.lock().await.is_empty());
    }
}
