//! Periodic background removal of stale entries.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

/// Shortest allowed sweep period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// State that accumulates expired entries and can drop them in one pass.
pub trait Sweep: Send + Sync + 'static {
    /// Short name used in log events.
    fn name(&self) -> &'static str;

    /// Remove everything that has expired, returning the number removed.
    fn sweep_expired(&self) -> usize;
}

/// Handle to a running sweeper task.
///
/// The task stops when the handle is dropped or when the swept target is
/// dropped, whichever comes first.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper.
    pub fn shutdown(self) {
        self.task.abort();
    }

    /// Whether the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a task that sweeps `target` every `every`.
///
/// Only a weak reference is held, so the sweeper never keeps its target
/// alive. Must be called from within a tokio runtime.
pub fn spawn_sweeper<T: Sweep>(target: &Arc<T>, every: Duration) -> SweeperHandle {
    let every = every.max(MIN_INTERVAL);
    let weak: Weak<T> = Arc::downgrade(target);
    let name = target.name();

    debug!(target_name = name, interval_ms = every.as_millis() as u64, "Starting sweeper");

    let task = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(target) = weak.upgrade() else {
                debug!(target_name = name, "Sweep target dropped, stopping sweeper");
                break;
            };
            let removed = target.sweep_expired();
            trace!(target_name = name, removed = removed, "Sweep tick");
        }
    });

    SweeperHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        sweeps: AtomicUsize,
    }

    impl Sweep for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn sweep_expired(&self) -> usize {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_every_interval() {
        let target = Arc::new(Counting::default());
        let _handle = spawn_sweeper(&target, Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_target_dropped() {
        let target = Arc::new(Counting::default());
        let handle = spawn_sweeper(&target, Duration::from_secs(1));

        drop(target);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;

        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweeping() {
        let target = Arc::new(Counting::default());
        let handle = spawn_sweeper(&target, Duration::from_secs(1));

        handle.shutdown();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(target.sweeps.load(Ordering::SeqCst), 0);
    }
}
