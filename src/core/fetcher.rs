use crate::core::error::{FetchError, FetchFailure};
use crate::core::events::EngineEvent;
use crate::core::model::TransferId;
use crate::core::store::SegmentStore;
use crate::driver::{DriverContext, TransferDriver};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use url::Url;

/// Everything a segment task shares with its siblings. Read-only apart from
/// the byte counter.
#[derive(Clone)]
pub struct SegmentFetcher {
    pub id: TransferId,
    pub driver: Arc<dyn TransferDriver>,
    pub ctx: DriverContext,
    pub url: Url,
    pub total_size: u64,
    pub downloaded: Arc<AtomicU64>,
    pub event_tx: broadcast::Sender<EngineEvent>,
}

impl SegmentFetcher {
    /// Downloads `store.range` into `store`. The store file is only created
    /// once the server answered with a success status.
    pub async fn fetch(&self, store: &SegmentStore) -> Result<u64, FetchError> {
        let index = store.index;
        let fail = |cause| FetchError::new(index, cause);

        let mut body = self
            .driver
            .fetch_range(&self.url, &self.ctx, store.range)
            .await
            .map_err(fail)?;

        let mut file = store
            .create()
            .await
            .map_err(|e| fail(FetchFailure::Storage(e)))?;

        let expected = store.range.len();
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(fail)?;
            // a server that ignored the range sends more than asked for
            let after = written + chunk.len() as u64;
            if after > expected {
                return Err(fail(FetchFailure::LengthMismatch { expected, actual: after }));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| fail(FetchFailure::Storage(e)))?;
            written += chunk.len() as u64;

            let now = self.downloaded.fetch_add(chunk.len() as u64, Ordering::Relaxed)
                + chunk.len() as u64;
            let _ = self.event_tx.send(EngineEvent::Progress {
                id: self.id,
                downloaded: now,
                total: self.total_size,
            });
        }
        file.flush().await.map_err(|e| fail(FetchFailure::Storage(e)))?;

        if written != expected {
            return Err(fail(FetchFailure::LengthMismatch { expected, actual: written }));
        }

        tracing::debug!(index, range = %store.range, bytes = written, "segment stored");
        Ok(written)
    }
}
