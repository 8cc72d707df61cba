use crate::core::model::ByteRange;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

/// Temporary on-disk holder of one segment's bytes.
///
/// Owned by the fetcher that created it until the merger takes it over to
/// read and delete it.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    pub index: usize,
    pub range: ByteRange,
    pub path: PathBuf,
}

impl SegmentStore {
    pub fn new(dir: &Path, index: usize, range: ByteRange) -> Self {
        Self { index, range, path: Self::path_for(dir, index) }
    }

    pub fn path_for(dir: &Path, index: usize) -> PathBuf {
        dir.join(format!("section-{}.tmp", index))
    }

    /// Creates the backing file, truncating leftovers of an earlier run.
    pub async fn create(&self) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path).await.is_ok()
    }

    pub async fn remove(&self) -> std::io::Result<()> {
        tokio::fs::remove_file(&self.path).await
    }
}
