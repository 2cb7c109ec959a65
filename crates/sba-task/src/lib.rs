//! Background worker management for the fabric's network functions.
//!
//! Every NF runs a handful of periodic workers next to its HTTP server
//! (statistics sweeps, heartbeats, the DU slot tick). A [`TaskSet`] owns
//! them: workers implement [`NfTask`], observe the set's [`Shutdown`] token
//! cooperatively, and are joined together when the process winds down, with
//! an abort as the backstop for anything that ignores the token.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cooperative shutdown token handed to every worker of one [`TaskSet`].
///
/// Workers `select!` on [`Shutdown::requested`] next to their interval tick;
/// the token also covers the HTTP server's graceful-shutdown future.
#[derive(Clone, Debug)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolves once shutdown has been requested, including when the
    /// request predates the call. A dropped [`TaskSet`] counts as a
    /// request: an orphaned worker has nothing left to work for.
    pub async fn requested(&mut self) {
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }

    pub fn is_requested(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// A long-running worker owned by a network function.
pub trait NfTask: Send + 'static {
    /// Names the worker in join reports and logs.
    const NAME: &'static str;

    fn run(self, shutdown: Shutdown) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// How one worker ended, reported by [`TaskSet::shutdown_and_join`].
#[derive(Debug)]
pub enum TaskEnd {
    Completed,
    Failed(anyhow::Error),
    Panicked(tokio::task::JoinError),
    /// Ignored the shutdown token past the grace period and was aborted.
    TimedOut,
}

struct RunningTask {
    name: &'static str,
    handle: JoinHandle<anyhow::Result<()>>,
}

/// The workers of one NF process, tied to a single stop flag.
pub struct TaskSet {
    stop: watch::Sender<bool>,
    running: Vec<RunningTask>,
}

impl TaskSet {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);

        TaskSet {
            stop,
            running: Vec::new(),
        }
    }

    /// A fresh shutdown token tied to this set.
    pub fn shutdown(&self) -> Shutdown {
        Shutdown {
            receiver: self.stop.subscribe(),
        }
    }

    pub fn spawn<T: NfTask>(&mut self, task: T) {
        let handle = tokio::spawn(task.run(self.shutdown()));

        self.running.push(RunningTask { name: T::NAME, handle });
    }

    pub fn request_shutdown(&self) {
        let _ = self.stop.send(true);
    }

    /// Request shutdown, then give every worker up to `grace` to finish.
    /// Stragglers are aborted. Returns one `(name, end)` entry per worker,
    /// in spawn order, for the caller to log.
    pub async fn shutdown_and_join(mut self, grace: Duration) -> Vec<(&'static str, TaskEnd)> {
        self.request_shutdown();

        let deadline = tokio::time::Instant::now() + grace;
        let mut report = Vec::with_capacity(self.running.len());

        for mut task in std::mem::take(&mut self.running) {
            let end = match tokio::time::timeout_at(deadline, &mut task.handle).await {
                Ok(Ok(Ok(()))) => TaskEnd::Completed,
                Ok(Ok(Err(error))) => TaskEnd::Failed(error),
                Ok(Err(join_error)) => TaskEnd::Panicked(join_error),
                Err(_elapsed) => {
                    task.handle.abort();
                    TaskEnd::TimedOut
                }
            };

            report.push((task.name, end));
        }

        report
    }
}

impl Default for TaskSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        // Tell any still-running workers to stop; the process is going away.
        let _ = self.stop.send(true);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct Obedient {
        stopped: Arc<AtomicBool>,
    }

    impl NfTask for Obedient {
        const NAME: &'static str = "obedient";

        async fn run(self, mut shutdown: Shutdown) -> anyhow::Result<()> {
            shutdown.requested().await;
            self.stopped.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    struct Failing;

    impl NfTask for Failing {
        const NAME: &'static str = "failing";

        async fn run(self, _shutdown: Shutdown) -> anyhow::Result<()> {
            anyhow::bail!("worker broke")
        }
    }

    struct Stubborn;

    impl NfTask for Stubborn {
        const NAME: &'static str = "stubborn";

        async fn run(self, _shutdown: Shutdown) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn workers_observe_the_shutdown_request() {
        let stopped = Arc::new(AtomicBool::new(false));

        let mut tasks = TaskSet::new();
        tasks.spawn(Obedient {
            stopped: Arc::clone(&stopped),
        });

        let report = tasks.shutdown_and_join(Duration::from_secs(1)).await;

        assert!(stopped.load(Ordering::Relaxed));
        assert!(matches!(report.as_slice(), [("obedient", TaskEnd::Completed)]));
    }

    #[tokio::test]
    async fn join_reports_failures_by_name() {
        let mut tasks = TaskSet::new();
        tasks.spawn(Failing);

        let report = tasks.shutdown_and_join(Duration::from_secs(1)).await;

        assert!(matches!(report.as_slice(), [("failing", TaskEnd::Failed(_))]));
    }

    #[tokio::test]
    async fn stragglers_are_aborted_after_the_grace_period() {
        let mut tasks = TaskSet::new();
        tasks.spawn(Stubborn);

        let report = tasks.shutdown_and_join(Duration::from_millis(50)).await;

        assert!(matches!(report.as_slice(), [("stubborn", TaskEnd::TimedOut)]));
    }

    #[tokio::test]
    async fn token_resolves_even_for_late_subscribers() {
        let tasks = TaskSet::new();
        tasks.request_shutdown();

        let mut late = tasks.shutdown();
        assert!(late.is_requested());
        late.requested().await;
    }
}
