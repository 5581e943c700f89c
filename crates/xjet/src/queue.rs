//! Concurrency-limited async task queue with pause/resume, cancellation,
//! and tag-based removal.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Raised when a queued task is cancelled before it runs (`clear`,
/// `removeTasksByTag`) rather than completing normally.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("task was cancelled")]
pub struct Cancelled;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Entry {
    tag: Option<String>,
    /// Runs the task and ships its result through the oneshot held by
    /// the enqueuing side; boxed so heterogeneous result types can share
    /// one queue.
    run: Box<dyn FnOnce() -> BoxedTask + Send>,
}

#[derive(Default)]
struct Inner {
    waiting: VecDeque<Entry>,
    running: usize,
    concurrency: usize,
    started: bool,
}

/// A FIFO, concurrency-limited task queue. Starts `Paused`; call
/// [`Queue::start`] to begin draining.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<Mutex<Inner>>,
}

impl Queue {
    /// `concurrency < 1` is clamped to 1.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self { inner: Arc::new(Mutex::new(Inner { concurrency, ..Default::default() })) }
    }

    /// Enqueue a zero-arg async task. Resolves with the task's value, or
    /// rejects with [`Cancelled`] if removed before it ran.
    pub async fn enqueue<F, Fut, T>(&self, tag: Option<String>, task: F) -> Result<T, Cancelled>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<T>();
        let run: Box<dyn FnOnce() -> BoxedTask + Send> = Box::new(move || {
            Box::pin(async move {
                let value = task().await;
                let _ = tx.send(value);
            })
        });

        {
            let mut inner = self.inner.lock().await;
            inner.waiting.push_back(Entry { tag, run });
        }
        self.drain().await;

        rx.await.map_err(|_| Cancelled)
    }

    /// Transition to `Running` and begin draining.
    pub async fn start(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.started = true;
        }
        self.drain().await;
    }

    /// Transition to `Paused`. In-flight tasks finish; no new ones start.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        inner.started = false;
    }

    /// Remove every waiting task, rejecting each with [`Cancelled`].
    /// Returns the number removed. Does not touch in-flight tasks.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let n = inner.waiting.len();
        inner.waiting.clear();
        n
    }

    /// Remove waiting tasks whose tag equals `tag`, rejecting each.
    /// Returns the number removed.
    pub async fn remove_tasks_by_tag(&self, tag: &str) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.waiting.len();
        inner.waiting.retain(|e| e.tag.as_deref() != Some(tag));
        before - inner.waiting.len()
    }

    pub async fn running_count(&self) -> usize {
        self.inner.lock().await.running
    }

    pub async fn waiting_count(&self) -> usize {
        self.inner.lock().await.waiting.len()
    }

    fn drain(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            loop {
                let task = {
                    let mut inner = self.inner.lock().await;
                    if !inner.started || inner.running >= inner.concurrency {
                        return;
                    }
                    let Some(entry) = inner.waiting.pop_front() else { return };
                    inner.running += 1;
                    entry.run
                };

                let fut = task();
                let this = self.clone();
                tokio::spawn(async move {
                    fut.await;
                    let mut inner = this.inner.lock().await;
                    inner.running = inner.running.saturating_sub(1);
                    drop(inner);
                    this.drain().await;
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_within_concurrency_bound() {
        let queue = Queue::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        queue.start().await;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let running = running.clone();
            let max_seen = max_seen.clone();
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(None, move || async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn clear_cancels_waiting_tasks() {
        let queue = Queue::new(1);
        // Don't start: everything stays queued.
        let handle = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(None, || async { 1 }).await })
        };
        tokio::task::yield_now().await;
        let removed = queue.clear().await;
        assert_eq!(removed, 1);
        assert!(matches!(handle.await.unwrap(), Err(Cancelled)));
    }

    #[tokio::test]
    async fn remove_tasks_by_tag_only_removes_matching() {
        let queue = Queue::new(1);
        let a = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(Some("a".into()), || async { 1 }).await })
        };
        let b = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(Some("b".into()), || async { 2 }).await })
        };
        tokio::task::yield_now().await;
        let removed = queue.remove_tasks_by_tag("a").await;
        assert_eq!(removed, 1);
        queue.start().await;
        assert!(a.await.unwrap().is_err());
        assert_eq!(b.await.unwrap().unwrap(), 2);
    }
}
