//! Bounded-concurrency worker pool.
//!
//! Executes no-argument tasks (futures) with at most `max_workers` running
//! concurrently. Workers are spawned lazily, one at a time, as submissions
//! arrive; the intake queue holds a single task, so a saturated pool pushes
//! back on [`WorkerPool::add`] instead of buffering work without bound.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// A queued unit of work, run to completion by exactly one worker.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Returned by [`WorkerPool::add`] when the pool has stopped or the run was
/// cancelled before a worker picked the task up. The task is dropped, never
/// run; any caller-side accounting must absorb the drop.
#[derive(Debug, thiserror::Error)]
#[error("worker pool is not accepting tasks")]
pub struct TaskRejected;

/// Outcome of a non-blocking [`WorkerPool::try_add`].
pub enum Submission {
    /// The task was handed to the pool and will run on a worker.
    Accepted,
    /// Every worker is busy and the intake slot is taken; the task comes
    /// back to the caller, who may run it inline or retry.
    Saturated(Task),
}

/// Bounded-concurrency executor with lazy worker spawn and cooperative
/// shutdown.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    max_workers: usize,
    /// Workers spawned so far; never exceeds `max_workers`.
    spawned: AtomicUsize,
    /// Workers currently parked on the queue waiting for a task.
    idle: AtomicUsize,
    queue_tx: mpsc::Sender<Task>,
    /// Single receiver shared by all workers; locked only while waiting.
    queue_rx: Mutex<mpsc::Receiver<Task>>,
    cancel: CancellationToken,
    workers: TaskTracker,
}

impl WorkerPool {
    /// Create a pool that will run at most `max_workers` tasks concurrently,
    /// shutting down when `cancel` fires or [`stop`](Self::stop) is called.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(max_workers: usize, cancel: CancellationToken) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(1);

        let inner = Arc::new(PoolInner {
            max_workers: max_workers.max(1),
            spawned: AtomicUsize::new(0),
            idle: AtomicUsize::new(0),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            cancel,
            workers: TaskTracker::new(),
        });

        // Shutdown reaper: once cancellation fires, close the intake so
        // blocked `add`s fail over to rejection, and drop anything queued
        // but not yet claimed by a worker.
        let reaper = Arc::clone(&inner);
        inner.workers.spawn(async move {
            reaper.cancel.cancelled().await;
            let mut queue = reaper.queue_rx.lock().await;
            queue.close();
            while queue.try_recv().is_ok() {}
        });

        Self { inner }
    }

    /// Submit a task for execution.
    ///
    /// Hands off immediately when the queue slot is free, growing the pool
    /// by one worker when none are idle and the cap allows; otherwise blocks
    /// until a worker frees up. Returns [`TaskRejected`] — dropping the task
    /// unrun — when the pool has stopped or cancellation fires mid-wait.
    pub async fn add<F>(&self, task: F) -> Result<(), TaskRejected>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(TaskRejected);
        }

        let task: Task = Box::pin(task);
        let task = match inner.queue_tx.try_send(task) {
            Ok(()) => {
                self.ensure_worker();
                return Ok(());
            }
            Err(TrySendError::Closed(_)) => return Err(TaskRejected),
            Err(TrySendError::Full(task)) => task,
        };

        self.ensure_worker();

        tokio::select! {
            _ = inner.cancel.cancelled() => Err(TaskRejected),
            sent = inner.queue_tx.send(task) => sent.map_err(|_| TaskRejected),
        }
    }

    /// Submit a task without ever blocking the caller.
    ///
    /// The important caller is a worker mid-task dispatching follow-up work:
    /// blocking there with every worker busy would wedge the pool, since the
    /// only thread that could drain the queue is the one waiting on it.
    /// Saturation hands the task back instead, and running it inline on the
    /// caller keeps concurrency at the cap because the caller's own task is
    /// suspended for the duration.
    pub fn try_add<F>(&self, task: F) -> Result<Submission, TaskRejected>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(TaskRejected);
        }

        let task: Task = Box::pin(task);
        match inner.queue_tx.try_send(task) {
            Ok(()) => {
                self.ensure_worker();
                Ok(Submission::Accepted)
            }
            Err(TrySendError::Closed(_)) => Err(TaskRejected),
            Err(TrySendError::Full(task)) => Ok(Submission::Saturated(task)),
        }
    }

    /// Signal every worker to exit, refuse new submissions, and block until
    /// all workers have drained.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.workers.close();
        self.inner.workers.wait().await;
    }

    /// Block until a prior or concurrent [`stop`](Self::stop) (or pool
    /// cancellation) completes.
    pub async fn wait_on_stop(&self) {
        self.inner.cancel.cancelled().await;
        self.inner.workers.close();
        self.inner.workers.wait().await;
    }

    /// The cancellation token governing this pool.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Spawn one more worker when none are idle and the cap allows.
    ///
    /// The reservation is a compare-exchange loop, so concurrent `add`s can
    /// never push the pool past `max_workers`. The idle check itself may
    /// race — the worst case is a worker spawned that was not strictly
    /// needed, never a cap violation.
    fn ensure_worker(&self) {
        let inner = &self.inner;

        if inner.idle.load(Ordering::Acquire) > 0 {
            return;
        }

        let mut spawned = inner.spawned.load(Ordering::Acquire);
        loop {
            if spawned >= inner.max_workers {
                return;
            }
            match inner.spawned.compare_exchange(
                spawned,
                spawned + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => spawned = current,
            }
        }

        debug!(spawned = spawned + 1, max = inner.max_workers, "spawning worker");
        inner.workers.spawn(worker_loop(Arc::clone(inner)));
    }
}

/// One worker: pull tasks off the shared queue until shutdown.
async fn worker_loop(pool: Arc<PoolInner>) {
    loop {
        pool.idle.fetch_add(1, Ordering::AcqRel);
        let task = next_task(&pool).await;
        pool.idle.fetch_sub(1, Ordering::AcqRel);

        match task {
            Some(task) => task.await,
            None => return,
        }
    }
}

/// Wait for the next queued task; `None` when the pool is shutting down.
/// The receiver lock is released before the task runs.
async fn next_task(pool: &PoolInner) -> Option<Task> {
    let mut queue = tokio::select! {
        _ = pool.cancel.cancelled() => return None,
        queue = pool.queue_rx.lock() => queue,
    };

    tokio::select! {
        _ = pool.cancel.cancelled() => None,
        task = queue.recv() => task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::time::timeout;

    #[tokio::test]
    async fn runs_every_submitted_task() {
        let pool = WorkerPool::new(3, CancellationToken::new());
        let (tx, mut rx) = unbounded_channel();

        for i in 0..10 {
            let tx = tx.clone();
            pool.add(async move {
                let _ = tx.send(i);
            })
            .await
            .expect("add");
        }

        let mut done = Vec::new();
        for _ in 0..10 {
            let i = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("task result in time")
                .expect("channel open");
            done.push(i);
        }
        done.sort_unstable();
        assert_eq!(done, (0..10).collect::<Vec<_>>());

        pool.stop().await;
    }

    #[tokio::test]
    async fn never_exceeds_the_worker_cap() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = unbounded_channel();

        for _ in 0..6 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let tx = tx.clone();
            pool.add(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                let _ = tx.send(());
            })
            .await
            .expect("add");
        }

        for _ in 0..6 {
            timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("completion in time");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);

        pool.stop().await;
    }

    #[tokio::test]
    async fn try_add_hands_back_the_task_on_saturation() {
        let pool = WorkerPool::new(1, CancellationToken::new());
        let (hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupy the only worker.
        pool.add(async move {
            let _ = hold_rx.await;
        })
        .await
        .expect("add");
        tokio::time::sleep(Duration::from_millis(5)).await;

        // Fill the intake slot.
        pool.add(async {}).await.expect("add queued");

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        match pool.try_add(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }) {
            Ok(Submission::Saturated(task)) => task.await,
            _ => panic!("expected saturation"),
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let _ = hold_tx.send(());
        pool.stop().await;
    }

    #[tokio::test]
    async fn add_after_stop_is_rejected() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        pool.stop().await;

        let result = pool.add(async {}).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancellation_rejects_new_tasks() {
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(1, cancel.clone());
        cancel.cancel();

        assert!(pool.add(async {}).await.is_err());
        pool.wait_on_stop().await;
    }

    #[tokio::test]
    async fn stop_drains_running_tasks() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let finished = Arc::clone(&finished);
            pool.add(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .expect("add");
        }

        // Give the workers a moment to pick the tasks up, then stop.
        tokio::time::sleep(Duration::from_millis(5)).await;
        timeout(Duration::from_secs(5), pool.stop())
            .await
            .expect("stop drains");
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }
}
