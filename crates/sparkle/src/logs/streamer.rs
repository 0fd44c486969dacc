use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{LogCursor, LogLine, LogSource};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::retry::{RetryPolicy, retry_result, sleep_or_cancel};

/// Pulls pages from a [`LogSource`] and turns them into lines.
///
/// Several streamers may share one [`LogCursor`]; every line is emitted once
/// and in order across all of them.
pub struct LogStreamer {
    source: Arc<dyn LogSource>,
    cursor: Arc<LogCursor>,
    batch_size: u32,
    idle_delay: Duration,
    policy: RetryPolicy,
}

impl LogStreamer {
    pub fn new(source: Arc<dyn LogSource>, cursor: Arc<LogCursor>, config: &EngineConfig) -> Self {
        Self {
            source,
            cursor,
            batch_size: config.log_batch_size.max(1),
            idle_delay: config.log_idle_delay,
            policy: config.retry.clone(),
        }
    }

    /// Fetch one page at the cursor and send its lines to `sink`.
    ///
    /// Returns the raw amount the offset moved by, so `0` means the source had
    /// nothing new. A page fetched against an offset another fetcher has
    /// already moved past is thrown away and fetched again.
    pub async fn fetch_next(
        &self,
        sink: &mpsc::Sender<Result<LogLine>>,
        token: &CancellationToken,
    ) -> Result<u64> {
        let source = self.source.as_ref();
        let batch_size = self.batch_size;
        loop {
            let snapshot = self.cursor.offset().await;
            let chunk =
                retry_result(&self.policy, token, move |_| source.fetch(snapshot, batch_size))
                    .await?;

            let mut state = self.cursor.lock().await;
            if state.offset() != snapshot {
                debug!(
                    snapshot,
                    offset = state.offset(),
                    "Log offset moved during fetch, fetching again"
                );
                continue;
            }

            let consumed = chunk.consumed();
            for line in state.commit(chunk, source.kind()) {
                if sink.send(Ok(line)).await.is_err() {
                    return Err(EngineError::Cancelled);
                }
            }
            return Ok(consumed);
        }
    }

    /// Stream lines until the source is exhausted, fails or `token` fires.
    ///
    /// A partial trailing line is flushed before the stream ends on every
    /// path. Errors are yielded as the final item; cancellation just ends the
    /// stream.
    pub fn stream(self, token: CancellationToken) -> BoxStream<'static, Result<LogLine>> {
        let (tx, rx) = mpsc::channel(self.batch_size as usize);
        tokio::spawn(async move {
            let result = self.run(&tx, &token).await;

            let kind = self.source.kind();
            if let Some(line) = self.cursor.lock().await.drain(kind) {
                let _ = tx.send(Ok(line)).await;
            }

            match result {
                Ok(()) => debug!(kind = %kind, "Log stream complete"),
                Err(EngineError::Cancelled) => debug!(kind = %kind, "Log stream cancelled"),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Log stream failed");
                    let _ = tx.send(Err(e)).await;
                }
            }
        });
        ReceiverStream::new(rx).boxed()
    }

    async fn run(&self, tx: &mpsc::Sender<Result<LogLine>>, token: &CancellationToken) -> Result<()> {
        let source = self.source.as_ref();
        loop {
            if token.is_cancelled() || tx.is_closed() {
                return Err(EngineError::Cancelled);
            }
            if self.fetch_next(tx, token).await? > 0 {
                continue;
            }
            if !retry_result(&self.policy, token, move |_| source.should_wait()).await? {
                return Ok(());
            }
            let offset = self.cursor.offset().await;
            debug!(
                offset,
                delay_ms = self.idle_delay.as_millis() as u64,
                "No new log output yet"
            );
            // An idle stream sends nothing, so a dropped receiver is only seen here.
            tokio::select! {
                biased;
                _ = tx.closed() => return Err(EngineError::Cancelled),
                slept = sleep_or_cancel(self.idle_delay, token) => slept?,
            }
        }
    }
}
