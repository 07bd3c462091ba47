//! # Interval Poller
//!
//! Repeatedly runs a fetch on a timer until it is cancelled or a stop
//! predicate accepts a result.
//!
//! - Ticks never overlap: the next fetch starts only after the previous one
//!   settled and the interval elapsed.
//! - A failed tick is logged and the loop keeps going.
//! - The fetch receives the poller's cancellation token; pass it down into
//!   [`RequestOptions`](crate::console::sync::RequestOptions) so a cancelled
//!   poller leaves the store alone.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let handle = Poller::new(Duration::from_secs(3))
//!     .stop_when(|job: &Job| job.status.is_terminal())
//!     .spawn(move |cancel| {
//!         let client = client.clone();
//!         async move {
//!             client
//!                 .get_job_with("job-2", RequestOptions::new().cancel(cancel))
//!                 .await
//!         }
//!     });
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::shared::error::{ApiErrorKind, ApiResult};

type StopPredicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Polling loop configuration
pub struct Poller<T> {
    interval: Duration,
    immediate: bool,
    stop_when: Option<StopPredicate<T>>,
}

impl<T> std::fmt::Debug for Poller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("interval", &self.interval)
            .field("immediate", &self.immediate)
            .field("stop_when", &self.stop_when.is_some())
            .finish()
    }
}

impl<T> Poller<T>
where
    T: Send + Sync + 'static,
{
    /// Poll every `interval`, starting with an immediate first tick
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            immediate: true,
            stop_when: None,
        }
    }

    /// Whether the first tick runs right away or after one interval
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Stop after the first successful result `predicate` accepts
    pub fn stop_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.stop_when = Some(Box::new(predicate));
        self
    }

    pub fn spawn<F, Fut>(self, fetch: F) -> PollHandle<T>
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (latest, receiver) = watch::channel(None);
        let ticks = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(run(self, fetch, token.clone(), latest, Arc::clone(&ticks)));

        PollHandle {
            token,
            latest: receiver,
            ticks,
            task: Some(task),
        }
    }
}

async fn run<T, F, Fut>(
    poller: Poller<T>,
    mut fetch: F,
    token: CancellationToken,
    latest: watch::Sender<Option<T>>,
    ticks: Arc<AtomicU64>,
) where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    if !poller.immediate && !pause(&token, poller.interval).await {
        tracing::debug!("Poller cancelled before first tick");
        return;
    }

    loop {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = fetch(token.clone()) => result,
        };
        if token.is_cancelled() {
            break;
        }
        ticks.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok(value) => {
                let done = poller.stop_when.as_ref().is_some_and(|stop| stop(&value));
                latest.send_replace(Some(value));
                if done {
                    tracing::debug!("Poller stop condition reached");
                    break;
                }
            }
            Err(e) if e.kind == ApiErrorKind::Cancelled => {}
            Err(e) => tracing::warn!("Poll tick failed: {}", e),
        }

        if !pause(&token, poller.interval).await {
            break;
        }
    }
    tracing::debug!("Poller stopped after {} ticks", ticks.load(Ordering::SeqCst));
}

/// Sleep for `interval`; false when cancelled first
async fn pause(token: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

/// Handle to a running poller. Dropping it stops the loop.
#[must_use = "dropping a PollHandle stops the poller"]
#[derive(Debug)]
pub struct PollHandle<T> {
    token: CancellationToken,
    latest: watch::Receiver<Option<T>>,
    ticks: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl<T: Clone> PollHandle<T> {
    /// Most recent successful result
    pub fn latest(&self) -> Option<T> {
        self.latest.borrow().clone()
    }
}

impl<T> PollHandle<T> {
    /// Receiver that wakes on every successful result
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.latest.clone()
    }

    /// Completed ticks, failed ones included
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Stop polling. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the loop to end on its own (stop condition) or after `cancel`
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Poller task failed: {}", e);
            }
        }
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
