//! Disk Lane Module
//!
//! A single serialized background lane that owns the disk state and runs
//! every disk task in submission order.
//!
//! # Execution model
//! - One tokio task drains an unbounded FIFO channel.
//! - Each job runs on the blocking pool; the next job starts only after the
//!   previous one returned, so disk tasks never overlap.
//! - A job's result goes to its [`Pending`] handle. If nobody is waiting and
//!   the job failed, the error is logged.
//! - A panicking job is caught and logged; the lane keeps running.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::{CacheError, Result};

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

// == Io Lane ==
/// Handle used to submit tasks to the lane. Cheap to clone.
///
/// The lane stops once every handle is dropped and queued jobs are drained.
#[derive(Debug)]
pub struct IoLane<S> {
    sender: mpsc::UnboundedSender<Job<S>>,
}

impl<S> Clone for IoLane<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<S: Send + 'static> IoLane<S> {
    // == Spawn ==
    /// Starts the lane owning `state`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(state: S) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_lane(state, receiver));
        Self { sender }
    }

    // == Submit ==
    /// Queues `task` and returns immediately.
    ///
    /// Await the returned [`Pending`] to observe the result, or drop it to
    /// fire and forget.
    pub fn submit<T, F>(&self, task: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let (reply, pending) = oneshot::channel();
        let job: Job<S> = Box::new(move |state| {
            let result = task(state);
            if let Err(Err(e)) = reply.send(result) {
                warn!(error = %e, "Disk task failed");
            }
        });

        match self.sender.send(job) {
            Ok(()) => Pending::waiting(pending),
            Err(_) => Pending::ready(Err(CacheError::LaneUnavailable(
                "disk lane has shut down".to_string(),
            ))),
        }
    }
}

async fn run_lane<S: Send + 'static>(mut state: S, mut jobs: mpsc::UnboundedReceiver<Job<S>>) {
    debug!("Disk lane started");

    while let Some(job) = jobs.recv().await {
        let handle = tokio::task::spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&mut state)));
            (state, outcome)
        });

        match handle.await {
            Ok((returned, outcome)) => {
                state = returned;
                if outcome.is_err() {
                    error!("Disk task panicked; continuing with the next task");
                }
            }
            Err(e) => {
                error!(error = %e, "Disk lane stopped");
                return;
            }
        }
    }

    debug!("Disk lane drained and stopped");
}

// == Pending ==
/// Completion handle of a cache operation.
///
/// Resolves to the operation's result. Operations answered without the lane
/// (memory hits, memory-only stores) resolve on the first poll.
#[derive(Debug)]
#[must_use = "drop the handle explicitly to fire and forget"]
pub struct Pending<T> {
    state: PendingState<T>,
}

#[derive(Debug)]
enum PendingState<T> {
    Ready(Option<Result<T>>),
    Waiting(oneshot::Receiver<Result<T>>),
}

// Never pin-projected.
impl<T> Unpin for Pending<T> {}

impl<T> Pending<T> {
    /// An already-completed handle.
    pub fn ready(result: Result<T>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    fn waiting(receiver: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            state: PendingState::Waiting(receiver),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Ready(slot) => Poll::Ready(slot.take().unwrap_or_else(|| {
                Err(CacheError::LaneUnavailable(
                    "completion already taken".to_string(),
                ))
            })),
            PendingState::Waiting(receiver) => Pin::new(receiver).poll(cx).map(|received| {
                received.unwrap_or_else(|_| {
                    Err(CacheError::LaneUnavailable(
                        "disk task dropped before completing".to_string(),
                    ))
                })
            }),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tasks_run_in_submission_order() {
        let lane = IoLane::spawn(Vec::<u32>::new());

        for i in 0..50 {
            drop(lane.submit(move |log: &mut Vec<u32>| {
                log.push(i);
                Ok(())
            }));
        }
        let log = lane.submit(|log: &mut Vec<u32>| Ok(log.clone())).await.unwrap();

        assert_eq!(log, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_error_goes_to_its_own_task() {
        let lane = IoLane::spawn(0u32);

        let failing = lane.submit(|_: &mut u32| -> Result<()> {
            Err(CacheError::InvalidValue("boom".to_string()))
        });
        let next = lane.submit(|count: &mut u32| {
            *count += 1;
            Ok(*count)
        });

        assert!(matches!(failing.await, Err(CacheError::InvalidValue(_))));
        assert_eq!(next.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_panic_does_not_stop_lane() {
        let lane = IoLane::spawn(0u32);

        let panicking = lane.submit(|_: &mut u32| -> Result<()> { panic!("disk task bug") });
        let after = lane.submit(|count: &mut u32| {
            *count += 5;
            Ok(*count)
        });

        assert!(matches!(panicking.await, Err(CacheError::LaneUnavailable(_))));
        assert_eq!(after.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_dropped_handle_still_runs() {
        let lane = IoLane::spawn(());
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        drop(lane.submit(move |_: &mut ()| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        lane.submit(|_: &mut ()| Ok(())).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_pending_resolves_on_first_poll() {
        let mut task = tokio_test::task::spawn(Pending::ready(Ok(42)));
        let result = tokio_test::assert_ready!(task.poll());
        assert_eq!(result.unwrap(), 42);
    }
}
