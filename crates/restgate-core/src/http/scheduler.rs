//! Bounded-concurrency FIFO request scheduler
//!
//! Submitted operations are queued in order and admitted through a counting
//! gate of `N` slots. Each submission gets an [`OperationHandle`] that
//! resolves with the operation's own result; a failing or panicking operation
//! only ever resolves its own handle.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::trace;

use crate::{Error, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Lifecycle of a submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl OperationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => OperationState::Queued,
            1 => OperationState::Running,
            2 => OperationState::Completed,
            _ => OperationState::Failed,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Failed)
    }
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    running: AtomicUsize,
}

/// Result handle for one submitted operation
#[derive(Debug)]
pub struct OperationHandle<T> {
    receiver: oneshot::Receiver<Result<T>>,
    state: Arc<AtomicU8>,
}

impl<T> OperationHandle<T> {
    pub fn state(&self) -> OperationState {
        OperationState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl<T> Future for OperationHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                self.state
                    .store(OperationState::Failed as u8, Ordering::Release);
                Poll::Ready(Err(Error::Scheduler {
                    message: "operation was dropped before it resolved".to_string(),
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// FIFO admission queue with at most `concurrency` operations running.
///
/// Must be created inside a Tokio runtime: the admission loop runs as a
/// task and stops once the scheduler is dropped and the queue drains.
#[derive(Debug, Clone)]
pub struct RequestScheduler {
    sender: mpsc::UnboundedSender<Job>,
    counters: Arc<Counters>,
    concurrency: usize,
}

impl RequestScheduler {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        tokio::spawn(admission_loop(
            receiver,
            Arc::new(Semaphore::new(concurrency)),
            Arc::clone(&counters),
        ));

        Self {
            sender,
            counters,
            concurrency,
        }
    }

    /// Queue an operation; the handle is returned immediately
    pub fn submit<F, T>(&self, operation: F) -> OperationHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, receiver) = oneshot::channel();
        let state = Arc::new(AtomicU8::new(OperationState::Queued as u8));

        let job_state = Arc::clone(&state);
        let job: Job = Box::pin(async move {
            job_state.store(OperationState::Running as u8, Ordering::Release);
            let result = operation.await;
            let finished = if result.is_ok() {
                OperationState::Completed
            } else {
                OperationState::Failed
            };
            job_state.store(finished as u8, Ordering::Release);
            // The caller may have stopped waiting
            let _ = result_tx.send(result);
        });

        self.counters.queued.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(job).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            state.store(OperationState::Failed as u8, Ordering::Release);
        }

        OperationHandle { receiver, state }
    }

    /// Operations waiting for a slot
    pub fn queued(&self) -> usize {
        self.counters.queued.load(Ordering::Acquire)
    }

    /// Operations currently holding a slot
    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::Acquire)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

async fn admission_loop(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    slots: Arc<Semaphore>,
    counters: Arc<Counters>,
) {
    while let Some(job) = receiver.recv().await {
        // Admission happens strictly in submission order
        let permit = match Arc::clone(&slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        counters.queued.fetch_sub(1, Ordering::AcqRel);
        counters.running.fetch_add(1, Ordering::AcqRel);
        trace!(
            queued = counters.queued.load(Ordering::Relaxed),
            running = counters.running.load(Ordering::Relaxed),
            "Admitted operation"
        );

        let counters = Arc::clone(&counters);
        tokio::spawn(async move {
            let guard = RunningGuard {
                counters,
                _permit: permit,
            };
            job.await;
            drop(guard);
        });
    }
}

/// Releases the slot even when the job panics
struct RunningGuard {
    counters: Arc<Counters>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::AcqRel);
    }
}
