use crate::core::error::MergeError;
use crate::core::store::SegmentStore;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Concatenates segment stores, in index order, into the target file.
pub struct Merger;

impl Merger {
    /// Creates (or truncates) `target` and appends every store to it.
    ///
    /// All stores must exist before the target is touched, so merging a set
    /// that was already merged fails without clobbering the earlier result.
    pub async fn merge(target: &Path, stores: &[SegmentStore]) -> Result<u64, MergeError> {
        Self::check_present(stores).await?;

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MergeError::Open { path: target.to_path_buf(), source })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(target)
            .await
            .map_err(|source| MergeError::Open { path: target.to_path_buf(), source })?;

        Self::merge_into(&mut file, stores).await
    }

    /// Appends each store to `out` and deletes it once written. Stops at the
    /// first failure; stores already merged are gone by then.
    pub async fn merge_into<W>(out: &mut W, stores: &[SegmentStore]) -> Result<u64, MergeError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut ordered: Vec<&SegmentStore> = stores.iter().collect();
        ordered.sort_by_key(|s| s.index);

        let mut total = 0u64;
        for store in ordered {
            let index = store.index;
            let data = tokio::fs::read(&store.path).await.map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    MergeError::MissingStore { index, path: store.path.clone() }
                } else {
                    MergeError::Read { index, source }
                }
            })?;

            // a file writer only reports a failed write on flush
            out.write_all(&data)
                .await
                .map_err(|source| MergeError::Write { index, source })?;
            out.flush()
                .await
                .map_err(|source| MergeError::Write { index, source })?;
            total += data.len() as u64;

            if let Err(e) = store.remove().await {
                tracing::warn!(index, path = %store.path.display(), error = %e, "could not delete merged store");
            }
        }

        Ok(total)
    }

    async fn check_present(stores: &[SegmentStore]) -> Result<(), MergeError> {
        for store in stores {
            if !store.exists().await {
                return Err(MergeError::MissingStore { index: store.index, path: store.path.clone() });
            }
        }
        Ok(())
    }
}
