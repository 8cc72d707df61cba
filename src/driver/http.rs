use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, RANGE, USER_AGENT};
use std::time::Duration;
use url::Url;

use crate::core::error::{FetchFailure, ProbeError};
use crate::core::model::ByteRange;
use crate::driver::{ByteStream, DriverContext, TransferDriver};

pub struct HttpDriver {
    client: reqwest::Client,
}

impl HttpDriver {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    fn build_headers(ctx: &DriverContext) -> Result<HeaderMap, String> {
        let mut h = HeaderMap::new();
        h.insert(
            USER_AGENT,
            HeaderValue::from_str(&ctx.user_agent).map_err(|e| format!("user-agent: {e}"))?,
        );
        for (k, v) in &ctx.headers {
            let name = HeaderName::from_bytes(k.as_bytes()).map_err(|e| format!("{k}: {e}"))?;
            let value = HeaderValue::from_str(v).map_err(|e| format!("{k}: {e}"))?;
            h.insert(name, value);
        }
        Ok(h)
    }
}

/// Reads the resource size from the `Content-Length` header.
pub(crate) fn parse_content_length(headers: &HeaderMap) -> Result<u64, ProbeError> {
    let raw = headers.get(CONTENT_LENGTH).ok_or(ProbeError::MissingLength)?;
    let s = raw
        .to_str()
        .map_err(|_| ProbeError::InvalidLength(String::from_utf8_lossy(raw.as_bytes()).into_owned()))?;
    s.trim().parse::<u64>().map_err(|_| ProbeError::InvalidLength(s.to_string()))
}

#[async_trait]
impl TransferDriver for HttpDriver {
    fn name(&self) -> &'static str {
        "http-driver"
    }

    async fn probe(&self, url: &Url, ctx: &DriverContext) -> Result<u64, ProbeError> {
        let headers = Self::build_headers(ctx).map_err(ProbeError::Header)?;

        let head = self
            .client
            .head(url.clone())
            .headers(headers)
            .timeout(Duration::from_secs(ctx.timeout_secs))
            .send()
            .await
            .map_err(ProbeError::Transport)?;

        let status = head.status();
        if status.as_u16() > 299 {
            return Err(ProbeError::Status(status));
        }

        let total = parse_content_length(head.headers())?;
        tracing::debug!(%url, %status, total, "probe ok");
        Ok(total)
    }

    async fn fetch_range(
        &self,
        url: &Url,
        ctx: &DriverContext,
        range: ByteRange,
    ) -> Result<ByteStream, FetchFailure> {
        let headers = Self::build_headers(ctx).map_err(FetchFailure::Header)?;

        // only the wait for response headers is bounded, bodies may take long
        let send = self
            .client
            .get(url.clone())
            .headers(headers)
            .header(RANGE, range.header_value())
            .send();
        let resp = tokio::time::timeout(Duration::from_secs(ctx.timeout_secs), send)
            .await
            .map_err(|_| FetchFailure::Timeout(ctx.timeout_secs))?
            .map_err(FetchFailure::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchFailure::UnexpectedStatus(status));
        }
        tracing::trace!(%url, %status, %range, "range response");

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchFailure::Transport))
            .boxed())
    }
}
