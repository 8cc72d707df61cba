pub mod http;

use crate::core::error::{FetchFailure, ProbeError};
use crate::core::model::ByteRange;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::HashMap;
use url::Url;

/// Body of a range response, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchFailure>>;

#[derive(Debug, Clone)]
pub struct DriverContext {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Extra headers sent with every request.
    pub headers: HashMap<String, String>,
}

impl Default for DriverContext {
    fn default() -> Self {
        Self {
            user_agent: concat!("segfetch/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 60,
            headers: HashMap::new(),
        }
    }
}

#[async_trait]
pub trait TransferDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Metadata-only request; returns the exact size of the resource.
    async fn probe(&self, url: &Url, ctx: &DriverContext) -> Result<u64, ProbeError>;

    /// Partial-content request for `range`. A non-success status is an error,
    /// the body is handed back unread.
    async fn fetch_range(
        &self,
        url: &Url,
        ctx: &DriverContext,
        range: ByteRange,
    ) -> Result<ByteStream, FetchFailure>;
}
