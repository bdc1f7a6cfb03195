//! Best-effort background writes to the transcript cache

use super::TranscriptCache;
use crate::transcript::Message;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug)]
enum CacheOp {
    Store(Vec<Message>),
    Clear,
}

/// Ordered, fire-and-forget queue in front of a [`TranscriptCache`].
///
/// Writes are applied in submission order by a single task. Failures are
/// logged and dropped; callers never observe them.
pub struct CacheWriter {
    tx: mpsc::UnboundedSender<CacheOp>,
    handle: JoinHandle<()>,
}

impl CacheWriter {
    pub fn spawn<C: TranscriptCache + 'static>(cache: C) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<CacheOp>();
        let handle = tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                let result = match &op {
                    CacheOp::Store(messages) => cache.store(messages).await,
                    CacheOp::Clear => cache.clear().await,
                };
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Discarding failed cache write");
                }
            }
        });
        Self { tx, handle }
    }

    pub fn store(&self, messages: Vec<Message>) {
        self.submit(CacheOp::Store(messages));
    }

    pub fn clear(&self) {
        self.submit(CacheOp::Clear);
    }

    fn submit(&self, op: CacheOp) {
        if self.tx.send(op).is_err() {
            tracing::debug!("Cache writer stopped, dropping write");
        }
    }

    /// Stop accepting writes and wait for queued ones to finish
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::debug!(error = %e, "Cache writer task ended abnormally");
        }
    }
}
