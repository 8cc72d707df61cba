use crate::core::error::{FetchError, FetchFailure, ProbeError, TransferError};
use crate::core::events::EngineEvent;
use crate::core::fetcher::SegmentFetcher;
use crate::core::merger::Merger;
use crate::core::model::*;
use crate::core::planner::plan_ranges;
use crate::core::store::SegmentStore;
use crate::driver::{DriverContext, TransferDriver};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// Drives one transfer through probe, plan, fetch and merge.
#[derive(Clone)]
pub struct Engine {
    driver: Arc<dyn TransferDriver>,
    driver_ctx: DriverContext,
    temp_dir: PathBuf,
    event_tx: broadcast::Sender<EngineEvent>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(driver: Arc<dyn TransferDriver>, driver_ctx: DriverContext, temp_dir: PathBuf) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            driver,
            driver_ctx,
            temp_dir,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Cancelling this token aborts the running transfer before it merges.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn start(&self, request: &TransferRequest) -> Result<TransferReport, TransferError> {
        let id = Uuid::new_v4();
        self.set_state(id, TransferState::Idle);
        tracing::info!(%id, url = %request.url, target = %request.target.display(), segments = request.segments, "transfer requested");

        let result = self.run(id, request).await;
        match &result {
            Ok(report) => {
                tracing::info!(%id, bytes = report.total_size, elapsed_ms = report.elapsed.as_millis() as u64, "transfer done");
            }
            Err(e) => {
                tracing::error!(%id, error = %e, "transfer failed");
                self.set_state(id, TransferState::Failed);
            }
        }
        result
    }

    async fn run(&self, id: TransferId, request: &TransferRequest) -> Result<TransferReport, TransferError> {
        let started = Instant::now();

        self.set_state(id, TransferState::Probing);
        let url = parse_url(&request.url)?;
        let total_size = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
            probed = self.driver.probe(&url, &self.driver_ctx) => probed?,
        };
        tracing::debug!(%id, driver = self.driver.name(), total_size, "probed");
        let _ = self.event_tx.send(EngineEvent::Probed { id, total_size });

        self.set_state(id, TransferState::Planning);
        let ranges = plan_ranges(total_size, request.segments)?;
        let _ = self.event_tx.send(EngineEvent::Planned { id, ranges: ranges.clone() });

        self.set_state(id, TransferState::Fetching);
        let stores = self.fetch_all(id, &url, total_size, &ranges).await?;

        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        self.set_state(id, TransferState::Merging);
        let bytes = Merger::merge(&request.target, &stores).await?;
        let _ = self.event_tx.send(EngineEvent::Merged { id, target: request.target.clone(), bytes });

        self.set_state(id, TransferState::Done);
        Ok(TransferReport {
            id,
            total_size,
            segments: ranges.len(),
            target: request.target.clone(),
            elapsed: started.elapsed(),
        })
    }

    /// Spawns one task per range and waits for all of them. Any failure fails
    /// the whole fetch, but only after every sibling has finished.
    async fn fetch_all(
        &self,
        id: TransferId,
        url: &Url,
        total_size: u64,
        ranges: &[ByteRange],
    ) -> Result<Vec<SegmentStore>, TransferError> {
        let fetcher = SegmentFetcher {
            id,
            driver: self.driver.clone(),
            ctx: self.driver_ctx.clone(),
            url: url.clone(),
            total_size,
            downloaded: Arc::new(AtomicU64::new(0)),
            event_tx: self.event_tx.clone(),
        };

        let total = ranges.len();
        let mut aborts = Vec::with_capacity(total);
        let mut pending = FuturesUnordered::new();
        for (index, range) in ranges.iter().copied().enumerate() {
            let store = SegmentStore::new(&self.temp_dir, index, range);
            let f = fetcher.clone();
            let handle = tokio::spawn(async move { f.fetch(&store).await.map(|_| store) });
            aborts.push(handle.abort_handle());
            pending.push(async move { (index, handle.await) });
        }

        let mut stores: Vec<Option<SegmentStore>> = vec![None; total];
        let mut failures: Vec<FetchError> = vec![];
        let mut completed = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::warn!(%id, "cancelled, abandoning in-flight segments");
                    for a in &aborts {
                        a.abort();
                    }
                    return Err(TransferError::Cancelled);
                }
                next = pending.next() => next,
            };
            let Some((index, joined)) = next else { break };

            let outcome = match joined {
                Ok(r) => r,
                Err(e) => Err(FetchError::new(index, FetchFailure::TaskFailed(e.to_string()))),
            };
            match outcome {
                Ok(store) => {
                    completed += 1;
                    stores[index] = Some(store);
                    let _ = self.event_tx.send(EngineEvent::SegmentDone { id, index, completed, total });
                }
                Err(e) => {
                    tracing::error!(%id, index = e.index, error = %e.cause, "segment failed");
                    let _ = self.event_tx.send(EngineEvent::SegmentFailed { id, index, message: e.cause.to_string() });
                    failures.push(e);
                }
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|e| e.index);
            tracing::warn!(%id, completed, dir = %self.temp_dir.display(), "segment stores of this run are left on disk");
            let failed = failures.len();
            let first = failures.swap_remove(0);
            return Err(TransferError::Fetch { failed, total, first });
        }

        Ok(stores.into_iter().flatten().collect())
    }

    fn set_state(&self, id: TransferId, state: TransferState) {
        tracing::debug!(%id, ?state, "state");
        let _ = self.event_tx.send(EngineEvent::StateChanged { id, state });
    }
}

fn parse_url(raw: &str) -> Result<Url, ProbeError> {
    let url = Url::parse(raw).map_err(|source| ProbeError::InvalidUrl { url: raw.to_string(), source })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProbeError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fetcher::tests::FakeDriver;
    use crate::driver::http::HttpDriver;
    use std::path::Path;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i * 31 % 256) as u8).collect()
    }

    fn request(url: &str, target: &Path, segments: u64) -> TransferRequest {
        TransferRequest { url: url.to_string(), target: target.to_path_buf(), segments }
    }

    fn engine(driver: impl TransferDriver + 'static, dir: &Path) -> Engine {
        Engine::new(Arc::new(driver), DriverContext::default(), dir.to_path_buf())
    }

    fn section_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("section-"))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn downloads_over_http_in_segments() {
        let server = MockServer::start().await;
        let body = payload(100);
        Mock::given(method("HEAD"))
            .and(path("/big.iso"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", "100")
                    .set_body_bytes(body.clone()),
            )
            .mount(&server)
            .await;
        for (start, end) in [(0usize, 25usize), (26, 51), (52, 77), (78, 99)] {
            Mock::given(method("GET"))
                .and(path("/big.iso"))
                .and(header("range", format!("bytes={start}-{end}").as_str()))
                .respond_with(ResponseTemplate::new(206).set_body_bytes(body[start..=end].to_vec()))
                .expect(1)
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("big.iso");
        let e = Engine::new(Arc::new(HttpDriver::new().unwrap()), DriverContext::default(), dir.path().to_path_buf());

        let report = e.start(&request(&format!("{}/big.iso", server.uri()), &target, 4)).await.unwrap();
        assert_eq!(report.total_size, 100);
        assert_eq!(report.segments, 4);
        assert_eq!(std::fs::read(&target).unwrap(), body);
        assert!(section_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn server_ignoring_range_fails_without_full_copies() {
        let server = MockServer::start().await;
        let body = payload(100_000);
        Mock::given(method("HEAD"))
            .and(path("/big.iso"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-length", "100000"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/big.iso"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("big.iso");
        let e = Engine::new(Arc::new(HttpDriver::new().unwrap()), DriverContext::default(), dir.path().to_path_buf());

        let err = e.start(&request(&format!("{}/big.iso", server.uri()), &target, 4)).await.unwrap_err();
        match err {
            TransferError::Fetch { failed, total, first } => {
                assert_eq!((failed, total), (4, 4));
                assert!(matches!(first.cause, FetchFailure::LengthMismatch { expected: 25_001, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!target.exists());
        let ranges = plan_ranges(100_000, 4).unwrap();
        for (i, r) in ranges.iter().enumerate() {
            let stored = std::fs::metadata(dir.path().join(format!("section-{i}.tmp")))
                .map(|m| m.len())
                .unwrap_or(0);
            assert!(stored <= r.len(), "section {i} holds {stored} bytes");
        }
    }

    #[tokio::test]
    async fn probe_404_fails_without_side_effects() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let e = Engine::new(Arc::new(HttpDriver::new().unwrap()), DriverContext::default(), dir.path().to_path_buf());

        let err = e.start(&request(&format!("{}/gone", server.uri()), &target, 4)).await.unwrap_err();
        assert!(matches!(err, TransferError::ProbeFailed(ProbeError::Status(s)) if s.as_u16() == 404));
        assert!(section_files(dir.path()).is_empty());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn malformed_url_is_a_probe_failure() {
        let dir = tempfile::tempdir().unwrap();
        let e = engine(FakeDriver::new(payload(10)), dir.path());

        let err = e.start(&request("not a url", &dir.path().join("x"), 1)).await.unwrap_err();
        assert!(matches!(err, TransferError::ProbeFailed(ProbeError::InvalidUrl { .. })));

        let err = e.start(&request("ftp://host/file", &dir.path().join("x"), 1)).await.unwrap_err();
        assert!(matches!(err, TransferError::ProbeFailed(ProbeError::UnsupportedScheme(s)) if s == "ftp"));
    }

    #[tokio::test]
    async fn too_many_segments_is_rejected_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let e = engine(FakeDriver::new(payload(3)), dir.path());

        let err = e.start(&request("http://localhost/f", &target, 4)).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidSegmentCount { segments: 4, total_size: 3 }));

        let err = e.start(&request("http://localhost/f", &target, 0)).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidSegmentCount { segments: 0, .. }));
        assert!(section_files(dir.path()).is_empty());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn failed_segment_fails_transfer_and_skips_merge() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let mut driver = FakeDriver::new(payload(100));
        driver.fail_status.insert(52);
        let e = engine(driver, dir.path());

        let err = e.start(&request("http://localhost/f", &target, 4)).await.unwrap_err();
        match err {
            TransferError::Fetch { failed, total, first } => {
                assert_eq!((failed, total), (1, 4));
                assert_eq!(first.index, 2);
                assert!(matches!(first.cause, FetchFailure::UnexpectedStatus(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!target.exists());
        // siblings finished and kept their bytes
        assert_eq!(
            section_files(dir.path()),
            vec!["section-0.tmp", "section-1.tmp", "section-3.tmp"]
        );
        assert_eq!(std::fs::read(dir.path().join("section-3.tmp")).unwrap(), payload(100)[78..].to_vec());
    }

    #[tokio::test]
    async fn lowest_failing_segment_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = FakeDriver::new(payload(100));
        driver.fail_status.extend([78, 26]);
        let e = engine(driver, dir.path());

        let err = e.start(&request("http://localhost/f", &dir.path().join("o"), 4)).await.unwrap_err();
        assert!(matches!(err, TransferError::Fetch { failed: 2, first: FetchError { index: 1, .. }, .. }));
    }

    #[tokio::test]
    async fn panicking_segment_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let mut driver = FakeDriver::new(payload(100));
        driver.panic_at.insert(0);
        let e = engine(driver, dir.path());

        let err = e.start(&request("http://localhost/f", &target, 4)).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Fetch { first: FetchError { index: 0, cause: FetchFailure::TaskFailed(_) }, .. }
        ));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn cancelled_transfer_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let e = engine(FakeDriver::new(payload(100)), dir.path());
        e.cancel_token().cancel();

        let err = e.start(&request("http://localhost/f", &target, 4)).await.unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert!(section_files(dir.path()).is_empty());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn emits_state_transitions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let e = engine(FakeDriver::new(payload(40)), dir.path());
        let mut rx = e.subscribe();

        e.start(&request("http://localhost/f", &dir.path().join("o"), 3)).await.unwrap();

        let mut states = vec![];
        let mut done_segments = 0;
        while let Ok(evt) = rx.try_recv() {
            match evt {
                EngineEvent::StateChanged { state, .. } => states.push(state),
                EngineEvent::SegmentDone { .. } => done_segments += 1,
                _ => {}
            }
        }
        assert_eq!(
            states,
            vec![
                TransferState::Idle,
                TransferState::Probing,
                TransferState::Planning,
                TransferState::Fetching,
                TransferState::Merging,
                TransferState::Done,
            ]
        );
        assert_eq!(done_segments, 3);
    }
}
