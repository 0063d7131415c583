//! Background task queue with bounded concurrency and a retry budget
//!
//! Jobs are dispatched FIFO from a bounded channel to a fixed pool of
//! workers. Each job is a future factory so failed attempts can be re-run.
//! Enqueueing returns a [`TaskHandle`]; fire-and-forget callers drop it,
//! tests await it to synchronize on completion.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::error::{Error, Result};

type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type TaskFactory = Box<dyn Fn() -> TaskFuture + Send + Sync>;

struct Job {
    name: String,
    factory: TaskFactory,
    done: oneshot::Sender<std::result::Result<(), String>>,
}

/// Completion signal for an enqueued task.
pub struct TaskHandle {
    receiver: oneshot::Receiver<std::result::Result<(), String>>,
}

impl TaskHandle {
    /// Wait for the task to finish all attempts.
    ///
    /// Returns the terminal outcome: `Ok` on any successful attempt, the
    /// last error once the retry budget is spent, or a storage error when
    /// the queue shut down before running the task.
    pub async fn wait(self) -> Result<()> {
        match self.receiver.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(Error::storage(message)),
            Err(_) => Err(Error::storage("task queue dropped the job")),
        }
    }
}

/// Fixed-worker background queue.
pub struct TaskQueue {
    sender: mpsc::Sender<Job>,
    retries: usize,
    workers: Vec<JoinHandle<()>>,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(config.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let retries = config.retries;

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut guard = receiver.lock().await;
                            guard.recv().await
                        };
                        let Some(job) = job else {
                            break;
                        };
                        run_job(job, retries, worker).await;
                    }
                })
            })
            .collect();

        Self {
            sender,
            retries,
            workers,
        }
    }

    /// Retries after the first attempt, from config.
    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Enqueue a task built from a future factory.
    ///
    /// The factory is invoked once per attempt. Applies backpressure when
    /// the channel is full; fails once the queue has shut down.
    pub async fn enqueue<F>(&self, name: impl Into<String>, factory: F) -> Result<TaskHandle>
    where
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        let (done, receiver) = oneshot::channel();
        let job = Job {
            name: name.into(),
            factory: Box::new(factory),
            done,
        };
        self.sender
            .send(job)
            .await
            .map_err(|_| Error::storage("task queue is shut down"))?;
        Ok(TaskHandle { receiver })
    }

    /// Stop accepting jobs, drain the channel, and wait for workers.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn run_job(job: Job, retries: usize, worker: usize) {
    let mut last_error = String::new();
    for attempt in 0..=retries {
        match (job.factory)().await {
            Ok(()) => {
                let _ = job.done.send(Ok(()));
                return;
            }
            Err(error) => {
                last_error = error.to_string();
                if attempt < retries {
                    tracing::warn!(
                        task = %job.name,
                        worker,
                        attempt = attempt + 1,
                        error = %last_error,
                        "background task failed; retrying"
                    );
                }
            }
        }
    }
    tracing::warn!(
        task = %job.name,
        worker,
        error = %last_error,
        "background task exhausted its retry budget"
    );
    let _ = job.done.send(Err(last_error));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    fn queue(workers: usize, retries: usize) -> TaskQueue {
        TaskQueue::new(QueueConfig {
            workers,
            retries,
            capacity: 16,
        })
    }

    #[tokio::test]
    async fn task_runs_and_handle_resolves() {
        let q = queue(1, 0);
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        let handle = q
            .enqueue("increment", move || {
                let c = Arc::clone(&c);
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .await
            .unwrap();

        assert_ok!(handle.wait().await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        q.shutdown().await;
    }

    #[tokio::test]
    async fn failing_task_retries_until_budget() {
        let q = queue(1, 2);
        let attempts = Arc::new(AtomicUsize::new(0));

        let a = Arc::clone(&attempts);
        let handle = q
            .enqueue("always-fails", move || {
                let a = Arc::clone(&a);
                Box::pin(async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(Error::storage("boom"))
                })
            })
            .await
            .unwrap();

        assert!(handle.wait().await.is_err());
        // 1 initial attempt + 2 retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        q.shutdown().await;
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_budget() {
        let q = queue(1, 2);
        let attempts = Arc::new(AtomicUsize::new(0));

        let a = Arc::clone(&attempts);
        let handle = q
            .enqueue("fails-twice", move || {
                let a = Arc::clone(&a);
                Box::pin(async move {
                    if a.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::storage("transient"))
                    } else {
                        Ok(())
                    }
                })
            })
            .await
            .unwrap();

        assert_ok!(handle.wait().await);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        q.shutdown().await;
    }

    #[tokio::test]
    async fn jobs_dispatch_in_fifo_order() {
        let q = queue(1, 0);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let order = Arc::clone(&order);
            let handle = q
                .enqueue(format!("job-{i}"), move || {
                    let order = Arc::clone(&order);
                    Box::pin(async move {
                        order.lock().await.push(i);
                        Ok(())
                    })
                })
                .await
                .unwrap();
            handles.push(handle);
        }
        for handle in handles {
            handle.wait().await.unwrap();
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
        q.shutdown().await;
    }
}
