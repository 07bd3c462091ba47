//! # Job Log Streaming
//!
//! Follows a live byte stream, splits it into lines and keeps the most
//! recent ones in a bounded buffer.
//!
//! ## Lifecycle
//!
//! ```text
//! Connecting ──open ok──▶ Streaming ──body ends──▶ Ended
//!      │                      │
//!      └──open fails──┐       └──body fails──┐
//!                     ▼                      ▼
//!              Unavailable(reason)   Unavailable(reason)
//! ```
//!
//! [`LogStream::reconnect`] tears the current session down and opens the
//! stream again from its live position. Lines already buffered are kept.
//! [`LogStream::cancel`] ends everything; afterwards neither the buffer nor
//! the status change again.
//!
//! Stream failures are scoped to the stream and never touch the store's
//! reachability flag.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::console::sync::{ByteStream, SyncClient};
use crate::shared::error::{ApiErrorKind, ApiResult};

/// Lines kept by default
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// FIFO of the most recent lines; the oldest line goes first when full
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    total: u64,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.total += 1;
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        for line in lines {
            self.push(line);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines ever pushed, dropped ones included
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Lines pushed after `cursor` (a previous [`total`](Self::total)) that
    /// are still buffered, and the new cursor
    pub fn since(&self, cursor: u64) -> (Vec<String>, u64) {
        let fresh = self.total.saturating_sub(cursor).min(self.lines.len() as u64) as usize;
        let skip = self.lines.len() - fresh;
        (self.lines.iter().skip(skip).cloned().collect(), self.total)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Longest partial line held between chunks before it is flushed as a line.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Incremental byte → line decoder.
///
/// Bytes after the last `\n` are held until the next chunk, so lines (and
/// multi-byte characters) split across chunks come out whole. A partial line
/// longer than [`MAX_LINE_BYTES`] is emitted as it stands.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete lines contained in `chunk` plus whatever was pending
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let held = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        // Held bytes are known to be newline-free
        if let Some(offset) = chunk.iter().rposition(|b| *b == b'\n') {
            let rest = self.pending.split_off(held + offset + 1);
            let complete = std::mem::replace(&mut self.pending, rest);
            let complete = complete.strip_suffix(b"\n").unwrap_or(&complete);
            lines.extend(complete.split(|b| *b == b'\n').map(decode_line));
        }
        if self.pending.len() > MAX_LINE_BYTES {
            tracing::debug!(bytes = self.pending.len(), "Flushing overlong partial line");
            lines.push(decode_line(&std::mem::take(&mut self.pending)));
        }
        lines
    }

    /// Trailing partial line once the stream is over
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Where a stream currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Connecting,
    Streaming,
    Ended,
    Unavailable(String),
}

impl StreamStatus {
    /// Whether the session is over (until a reconnect)
    pub fn is_settled(&self) -> bool {
        matches!(self, StreamStatus::Ended | StreamStatus::Unavailable(_))
    }
}

type Opener = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, ApiResult<ByteStream>> + Send + Sync>;

struct Shared {
    buffer: Mutex<LogBuffer>,
    status: watch::Sender<StreamStatus>,
}

impl Shared {
    /// Apply a change unless `token` was cancelled. The buffer lock orders
    /// this against `LogStream::cancel`.
    fn commit(
        &self,
        token: &CancellationToken,
        lines: Vec<String>,
        status: Option<StreamStatus>,
    ) -> bool {
        let mut buffer = lock(&self.buffer);
        if token.is_cancelled() {
            return false;
        }
        buffer.extend(lines);
        if let Some(status) = status {
            self.status.send_replace(status);
        }
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A followed log stream. Dropping it cancels the stream.
#[must_use = "dropping a LogStream cancels it"]
pub struct LogStream {
    shared: Arc<Shared>,
    opener: Opener,
    root: CancellationToken,
    session: Mutex<CancellationToken>,
}

impl std::fmt::Debug for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStream")
            .field("status", &*self.shared.status.borrow())
            .field("lines", &lock(&self.shared.buffer).len())
            .field("cancelled", &self.root.is_cancelled())
            .finish()
    }
}

impl LogStream {
    /// Start following the stream produced by `opener`
    pub fn spawn<F, Fut>(opener: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<ByteStream>> + Send + 'static,
    {
        Self::spawn_with_capacity(DEFAULT_LOG_CAPACITY, opener)
    }

    pub fn spawn_with_capacity<F, Fut>(capacity: usize, opener: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<ByteStream>> + Send + 'static,
    {
        let (status, _) = watch::channel(StreamStatus::Connecting);
        let root = CancellationToken::new();
        let session = root.child_token();
        let stream = Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(LogBuffer::new(capacity)),
                status,
            }),
            opener: Arc::new(move |token: CancellationToken| opener(token).boxed()),
            root,
            session: Mutex::new(session.clone()),
        };
        stream.start(session);
        stream
    }

    /// Follow the log output of `job_id`
    pub fn for_job(client: SyncClient, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        Self::spawn(move |token| {
            let client = client.clone();
            let job_id = job_id.clone();
            async move { client.stream_job_logs(&job_id, Some(token)).await }
        })
    }

    fn start(&self, token: CancellationToken) {
        tokio::spawn(follow(
            Arc::clone(&self.shared),
            Arc::clone(&self.opener),
            token,
        ));
    }

    /// Snapshot of the buffered lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        lock(&self.shared.buffer).lines()
    }

    /// Lines buffered since `cursor`, see [`LogBuffer::since`]
    pub fn lines_since(&self, cursor: u64) -> (Vec<String>, u64) {
        lock(&self.shared.buffer).since(cursor)
    }

    pub fn status(&self) -> StreamStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.shared.status.subscribe()
    }

    /// Resolve once the current session ends or fails, or the stream is cancelled
    pub async fn settled(&self) -> StreamStatus {
        let mut status = self.shared.status.subscribe();
        tokio::select! {
            _ = self.root.cancelled() => {}
            _ = status.wait_for(StreamStatus::is_settled) => {}
        }
        self.status()
    }

    /// Drop the current session and open the stream again.
    ///
    /// Does nothing once the stream was cancelled.
    pub fn reconnect(&self) {
        let mut session = lock(&self.session);
        if self.root.is_cancelled() {
            tracing::debug!("Reconnect ignored: log stream cancelled");
            return;
        }
        session.cancel();
        let next = self.root.child_token();
        *session = next.clone();
        drop(session);

        tracing::info!("Reconnecting log stream");
        self.shared
            .commit(&next, Vec::new(), Some(StreamStatus::Connecting));
        self.start(next);
    }

    /// Stop following. Safe to call any number of times.
    pub fn cancel(&self) {
        if self.root.is_cancelled() {
            return;
        }
        self.root.cancel();
        // Waits out a commit racing with the cancellation
        drop(lock(&self.shared.buffer));
        tracing::debug!("Log stream cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

async fn follow(shared: Arc<Shared>, opener: Opener, token: CancellationToken) {
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        opened = opener(token.clone()) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) if e.kind == ApiErrorKind::Cancelled => return,
        Err(e) => {
            tracing::warn!("Log stream unavailable: {}", e);
            shared.commit(&token, Vec::new(), Some(StreamStatus::Unavailable(e.message)));
            return;
        }
    };
    if !shared.commit(&token, Vec::new(), Some(StreamStatus::Streaming)) {
        return;
    }

    let mut decoder = LineDecoder::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = stream.next() => next,
        };
        match next {
            // One buffer commit per chunk
            Some(Ok(chunk)) => {
                let lines = decoder.feed(&chunk);
                if !lines.is_empty() && !shared.commit(&token, lines, None) {
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Log stream interrupted: {}", e);
                let tail = decoder.finish().into_iter().collect();
                shared.commit(&token, tail, Some(StreamStatus::Unavailable(e.message)));
                return;
            }
            None => {
                tracing::debug!("Log stream ended");
                let tail = decoder.finish().into_iter().collect();
                shared.commit(&token, tail, Some(StreamStatus::Ended));
                return;
            }
        }
    }
}
