//! Cancellation primitives
//!
//! Provides:
//! - A one-shot, idempotent "done" broadcast observed by every listener
//! - Bounded joining of background tasks
//! - OS signal handling (SIGTERM, SIGINT) for the command line

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One-shot broadcast.
///
/// Firing is idempotent: concurrent callers race on an atomic flag and only
/// the first one sends. Listeners that subscribe after the signal fired still
/// observe it.
#[derive(Debug, Clone)]
pub struct DoneSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    fired: Arc<AtomicBool>,
}

impl DoneSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        // send_replace never fails, even with no receivers alive
        self.tx.send_replace(true);
        true
    }

    pub fn is_done(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves once the signal has fired
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // Sender lives in `self`, so wait_for can only fail if it was dropped
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Named background tasks joined together with a grace period
pub struct TaskGroup {
    tasks: Vec<(String, tokio::task::JoinHandle<()>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name.into(), tokio::spawn(future)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task to exit, each within `grace`; overrunning tasks
    /// are aborted. Returns how many had to be aborted.
    pub async fn join_all(&mut self, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        let mut aborted = 0;

        for (name, mut handle) in self.tasks.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {
                    debug!(task = %name, "Task exited");
                }
                Ok(Err(e)) if e.is_cancelled() => {
                    debug!(task = %name, "Task cancelled");
                }
                Ok(Err(e)) => {
                    warn!(task = %name, "Task failed: {}", e);
                }
                Err(_) => {
                    warn!(task = %name, "Task did not stop within {:?}, aborting", grace);
                    handle.abort();
                    let _ = handle.await;
                    aborted += 1;
                }
            }
        }

        aborted
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain(..) {
            handle.abort();
        }
    }
}

/// Fire `signal` when the process receives SIGINT or SIGTERM (Ctrl+C
/// elsewhere)
pub async fn wait_for_signal(signal: DoneSignal) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let mut sigterm = unix_signal(SignalKind::terminate())?;
        let mut sigint = unix_signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    signal.fire();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fire_is_idempotent() {
        let signal = DoneSignal::new();
        assert!(!signal.is_done());

        let mut fired = 0;
        for _ in 0..5 {
            if signal.fire() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert!(signal.is_done());
    }

    #[tokio::test]
    async fn test_every_listener_observes_fire() {
        let signal = DoneSignal::new();
        let mut listeners = Vec::new();
        for _ in 0..8 {
            let signal = signal.clone();
            listeners.push(tokio::spawn(async move { signal.wait().await }));
        }

        signal.fire();
        for listener in listeners {
            tokio::time::timeout(Duration::from_secs(1), listener)
                .await
                .expect("listener missed the signal")
                .unwrap();
        }

        // Late subscriber
        tokio::time::timeout(Duration::from_millis(100), signal.clone().wait())
            .await
            .expect("late listener missed the signal");
    }

    #[tokio::test]
    async fn test_concurrent_fire_sends_once() {
        let signal = DoneSignal::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let signal = signal.clone();
            handles.push(tokio::spawn(async move { signal.fire() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_task_group_aborts_stragglers() {
        let signal = DoneSignal::new();
        let mut group = TaskGroup::new();

        let cooperative = signal.clone();
        group.spawn("cooperative", async move { cooperative.wait().await });
        group.spawn("stubborn", async {
            tokio::time::sleep(Duration::from_secs(100)).await;
        });
        assert_eq!(group.len(), 2);

        signal.fire();
        let aborted = group.join_all(Duration::from_millis(100)).await;

        assert_eq!(aborted, 1);
        assert!(group.is_empty());
    }
}
