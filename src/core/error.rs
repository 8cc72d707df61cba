use reqwest::StatusCode;
use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum TransferError {
    #[error("probe failed: {0}")]
    ProbeFailed(#[from] ProbeError),

    #[error("invalid segment count {segments} for a resource of {total_size} bytes")]
    InvalidSegmentCount { segments: u64, total_size: u64 },

    #[error("{failed} of {total} segments failed, first: {first}")]
    Fetch {
        failed: usize,
        total: usize,
        #[source]
        first: FetchError,
    },

    #[error("merge failed, target left incomplete: {0}")]
    Merge(#[from] MergeError),

    #[error("transfer cancelled")]
    Cancelled,
}

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("malformed url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error("response has no Content-Length header")]
    MissingLength,

    #[error("unparseable Content-Length {0:?}")]
    InvalidLength(String),

    #[error("invalid request header: {0}")]
    Header(String),
}

/// A failure of one segment, tagged with the segment it belongs to.
#[derive(thiserror::Error, Debug)]
#[error("segment {index}: {cause}")]
pub struct FetchError {
    pub index: usize,
    #[source]
    pub cause: FetchFailure,
}

impl FetchError {
    pub fn new(index: usize, cause: FetchFailure) -> Self {
        Self { index, cause }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchFailure {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("no response within {0}s")]
    Timeout(u64),

    #[error("unexpected status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("writing segment store failed: {0}")]
    Storage(#[source] io::Error),

    #[error("expected {expected} bytes, received {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("invalid request header: {0}")]
    Header(String),

    #[error("segment task died: {0}")]
    TaskFailed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum MergeError {
    #[error("segment store {index} is missing ({path})")]
    MissingStore { index: usize, path: PathBuf },

    #[error("cannot open target {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read segment store {index}: {source}")]
    Read {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("cannot write segment {index} to target: {source}")]
    Write {
        index: usize,
        #[source]
        source: io::Error,
    },
}
