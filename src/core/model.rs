use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub type TransferId = Uuid;

/// What the user asked for. Built once by the CLI and never mutated.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: String,
    pub target: PathBuf,
    pub segments: u64,
}

/// Inclusive, 0-indexed byte range of the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "range start {start} past end {end}");
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Probing,
    Planning,
    Fetching,
    Merging,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TransferReport {
    pub id: TransferId,
    pub total_size: u64,
    pub segments: usize,
    pub target: PathBuf,
    pub elapsed: Duration,
}
