//! Fixed-size worker pool over a bounded queue.
//!
//! Every offline push becomes one job. `submit` waits for queue space, so a
//! burst of webhooks slows down instead of growing memory without bound.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::PushError;

type Job = BoxFuture<'static, ()>;

pub struct DispatchWorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    submitted: AtomicU64,
    completed: Arc<AtomicU64>,
}

impl DispatchWorkerPool {
    pub fn new(workers: usize, queue: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let completed = Arc::new(AtomicU64::new(0));

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let completed = completed.clone();
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = receiver.lock().await;
                            rx.recv().await
                        };
                        match job {
                            Some(job) => {
                                job.await;
                                completed.fetch_add(1, Ordering::Relaxed);
                            }
                            None => {
                                debug!(worker_id, "Dispatch queue closed, worker exiting");
                                break;
                            }
                        }
                    }
                })
            })
            .collect();

        info!(workers, queue, "Dispatch worker pool started");
        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            submitted: AtomicU64::new(0),
            completed,
        }
    }

    /// Queues a job, waiting while the queue is full.
    pub async fn submit<F>(&self, job: F) -> Result<(), PushError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self
            .sender
            .lock()
            .map_err(|_| PushError::PoolClosed)?
            .clone()
            .ok_or(PushError::PoolClosed)?;
        sender.send(Box::pin(job)).await.map_err(|_| PushError::PoolClosed)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Stops accepting jobs and waits for everything already queued to run.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().ok().and_then(|mut s| s.take());
        drop(sender);

        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut w) => w.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!(
            submitted = self.submitted(),
            completed = self.completed(),
            "Dispatch worker pool drained"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrency_never_exceeds_worker_count() {
        let pool = DispatchWorkerPool::new(2, 16);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let active = active.clone();
            let peak = peak.clone();
            pool.submit(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        pool.shutdown().await;

        assert_eq!(pool.completed(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn submit_waits_when_queue_is_full() {
        let pool = DispatchWorkerPool::new(1, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        pool.submit(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .await
        .unwrap();
        started_rx.await.unwrap();

        // The worker is busy; this one fills the queue.
        pool.submit(async {}).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.submit(async {})).await;
        assert!(blocked.is_err());

        release_tx.send(()).unwrap();
        pool.submit(async {}).await.unwrap();
        pool.shutdown().await;
        assert_eq!(pool.completed(), 3);
    }

    #[tokio::test]
    async fn shutdown_drains_then_rejects() {
        let pool = DispatchWorkerPool::new(4, 64);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let count = count.clone();
            pool.submit(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        pool.shutdown().await;

        assert_eq!(count.load(Ordering::SeqCst), 20);
        assert_eq!(pool.submitted(), 20);
        assert!(matches!(pool.submit(async {}).await, Err(PushError::PoolClosed)));
    }
}
