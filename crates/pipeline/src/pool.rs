//! Fixed-size worker pool
//!
//! A bounded queue of jobs drained by N worker tasks. Work is submitted in
//! batches; every batch gets its own result channel, which closes once the
//! last job of the batch has reported. Waiting for that close is the join
//! barrier the training controller needs between folds.
//!
//! A panicking job is reported as an error for its key and never takes its
//! worker down.

use answerforge_common::{AppError, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Job = BoxFuture<'static, ()>;

pub struct WorkerPool {
    size: usize,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing a queue of depth `capacity`.
    /// Must be called from within a Tokio runtime.
    pub fn new(size: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..size)
            .map(|worker| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                    debug!(worker, "Worker exiting");
                })
            })
            .collect();

        info!(size, capacity, "Worker pool started");

        Self {
            size,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Queue one job per task and return a handle on their results.
    ///
    /// Results arrive in completion order. Queueing happens in the
    /// background, so results can be consumed while later tasks are still
    /// waiting for queue space.
    pub fn run_batch<K, T>(&self, tasks: Vec<(K, BoxFuture<'static, Result<T>>)>) -> Result<Batch<K, T>>
    where
        K: Clone + Send + 'static,
        T: Send + 'static,
    {
        let sender = self
            .sender
            .lock()
            .as_ref()
            .cloned()
            .ok_or(AppError::WorkerPoolClosed)?;

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let expected = tasks.len();

        tokio::spawn(async move {
            for (key, task) in tasks {
                let results = results_tx.clone();
                let job_key = key.clone();
                let job = async move {
                    let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(panic) => Err(AppError::Other(anyhow::anyhow!(
                            "worker task panicked: {}",
                            panic_message(&*panic)
                        ))),
                    };
                    let _ = results.send((job_key, outcome));
                }
                .boxed();

                if sender.send(job).await.is_err() {
                    warn!("Worker pool closed while a batch was being queued");
                    let _ = results_tx.send((key, Err(AppError::WorkerPoolClosed)));
                }
            }
        });

        Ok(Batch {
            expected,
            results: results_rx,
        })
    }

    /// Stop accepting work, let queued and in-flight jobs finish, and wait
    /// for every worker to exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool shut down");
    }
}

/// Results of one submitted batch
pub struct Batch<K, T> {
    expected: usize,
    results: mpsc::UnboundedReceiver<(K, Result<T>)>,
}

impl<K: Send + 'static, T: Send + 'static> Batch<K, T> {
    /// Number of tasks in the batch
    pub fn len(&self) -> usize {
        self.expected
    }

    pub fn is_empty(&self) -> bool {
        self.expected == 0
    }

    /// Next finished task, or `None` once every task has reported
    pub async fn next(&mut self) -> Option<(K, Result<T>)> {
        self.results.recv().await
    }

    /// Block until every task of the batch has finished
    pub async fn join(mut self) -> Vec<(K, Result<T>)> {
        let mut outcomes = Vec::with_capacity(self.expected);
        while let Some(outcome) = self.results.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    pub fn into_stream(self) -> BoxStream<'static, (K, Result<T>)> {
        Box::pin(stream::unfold(self.results, |mut results| async move {
            results.recv().await.map(|item| (item, results))
        }))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
