use crate::core::model::{ByteRange, TransferId, TransferState};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged { id: TransferId, state: TransferState },
    Probed { id: TransferId, total_size: u64 },
    Planned { id: TransferId, ranges: Vec<ByteRange> },
    Progress { id: TransferId, downloaded: u64, total: u64 },
    SegmentDone { id: TransferId, index: usize, completed: usize, total: usize },
    SegmentFailed { id: TransferId, index: usize, message: String },
    Merged { id: TransferId, target: PathBuf, bytes: u64 },
}
