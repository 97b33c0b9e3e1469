//! Keyed single-flight job executor.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

struct RunningJob {
    id: u64,
    cancel: CancellationToken,
}

/// Removes the job's table entry however the job ends, panics included.
struct JobSlot {
    jobs: Arc<DashMap<String, RunningJob>>,
    key: String,
    id: u64,
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        let id = self.id;
        self.jobs.remove_if(&self.key, |_, running| running.id == id);
    }
}

/// Runs at most one job per key, on a pool bounded to `pool_size` concurrent
/// jobs. Jobs get a [`CancellationToken`] they must poll at their suspension
/// points.
pub struct ConstrainedExecutor {
    jobs: Arc<DashMap<String, RunningJob>>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    next_id: AtomicU64,
    root: CancellationToken,
}

impl ConstrainedExecutor {
    pub fn new(pool_size: usize) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            tasks: Mutex::new(JoinSet::new()),
            next_id: AtomicU64::new(1),
            root: CancellationToken::new(),
        }
    }

    /// Starts `job` unless one is already running for `key`. Returns whether it
    /// was started.
    pub fn may_execute<F, Fut>(&self, key: &str, job: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.root.is_cancelled() {
            return false;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();
        match self.jobs.entry(key.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(RunningJob {
                    id,
                    cancel: cancel.clone(),
                });
            }
        }
        self.spawn(key.to_string(), id, cancel, job);
        true
    }

    /// Starts `job`, cancelling whatever runs for `key`. Returns whether a
    /// running job got cancelled.
    pub fn must_execute<F, Fut>(&self, key: &str, job: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.root.is_cancelled() {
            return false;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();
        let previous = self.jobs.insert(
            key.to_string(),
            RunningJob {
                id,
                cancel: cancel.clone(),
            },
        );
        let cancelled = match previous {
            Some(previous) => {
                previous.cancel.cancel();
                true
            }
            None => false,
        };
        self.spawn(key.to_string(), id, cancel, job);
        cancelled
    }

    fn spawn<F, Fut>(&self, key: String, id: u64, cancel: CancellationToken, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let slot = JobSlot {
            jobs: self.jobs.clone(),
            key,
            id,
        };
        let permits = self.permits.clone();
        let task = async move {
            let _slot = slot;
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                return;
            };
            if cancel.is_cancelled() {
                return;
            }
            job(cancel).await;
        };

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    pub fn has_running_with_key(&self, key: &str) -> bool {
        self.jobs.contains_key(key)
    }

    pub fn cancel_running_with_key(&self, key: &str) -> bool {
        match self.jobs.get(key) {
            Some(running) => {
                running.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for running in self.jobs.iter() {
            running.cancel.cancel();
        }
    }

    pub fn running_keys(&self) -> Vec<String> {
        self.jobs.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Refuses new jobs and cancels running ones.
    pub fn close(&self) {
        self.root.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Waits up to `timeout` for spawned jobs, then aborts the stragglers.
    /// Returns whether everything finished in time.
    pub async fn join_all(&self, timeout: Duration) -> bool {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        let drained = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            tracing::warn!(
                "{} routing job(s) did not stop within {:?}, aborting",
                tasks.len(),
                timeout
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        drained
    }
}

impl Drop for ConstrainedExecutor {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_may_execute_is_single_flight() {
        let executor = ConstrainedExecutor::new(5);
        let release = Arc::new(Notify::new());
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let release = release.clone();
            let runs = runs.clone();
            executor.may_execute("central", move |_cancel| async move {
                runs.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
            });
        }
        assert!(executor.has_running_with_key("central"));

        release.notify_one();
        assert!(executor.join_all(Duration::from_secs(5)).await);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!executor.has_running_with_key("central"));
    }

    #[tokio::test]
    async fn test_must_execute_cancels_running_job() {
        let executor = ConstrainedExecutor::new(5);
        let first_cancelled = Arc::new(AtomicUsize::new(0));
        let second_runs = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Notify::new());

        {
            let first_cancelled = first_cancelled.clone();
            let started = started.clone();
            assert!(executor.may_execute("central", move |cancel| async move {
                started.notify_one();
                cancel.cancelled().await;
                first_cancelled.fetch_add(1, Ordering::SeqCst);
            }));
        }
        started.notified().await;

        let second = second_runs.clone();
        let cancelled = executor.must_execute("central", move |_cancel| async move {
            second.fetch_add(1, Ordering::SeqCst);
        });
        assert!(cancelled);

        assert!(executor.join_all(Duration::from_secs(5)).await);
        assert_eq!(first_cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(second_runs.load(Ordering::SeqCst), 1);
        assert!(executor.is_idle());
    }

    #[tokio::test]
    async fn test_must_execute_without_running_job() {
        let executor = ConstrainedExecutor::new(1);
        assert!(!executor.must_execute("hosted", |_cancel| async {}));
        assert!(executor.join_all(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_closed_executor_refuses_jobs() {
        let executor = ConstrainedExecutor::new(1);
        executor.close();
        assert!(!executor.may_execute("a", |_cancel| async {}));
        assert!(!executor.must_execute("a", |_cancel| async {}));
        assert!(executor.running_keys().is_empty());
    }

    #[tokio::test]
    async fn test_join_all_aborts_stuck_jobs() {
        let executor = ConstrainedExecutor::new(1);
        executor.may_execute("stuck", |_cancel| async {
            std::future::pending::<()>().await;
        });
        assert!(!executor.join_all(Duration::from_millis(50)).await);
        assert!(executor.is_idle());
    }
}
