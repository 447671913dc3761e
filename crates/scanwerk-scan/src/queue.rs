// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan job queue — hands scans from request handlers to one background worker.
//
// Submission never waits for hardware. The worker runs one job at a time on
// the blocking pool and records the outcome in the session store, where the
// status views pick it up.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::human_errors::humanize_error;
use scanwerk_core::types::{ScanJobId, ScanRequest, ScanResult};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::duplex::{DuplexCoordinator, DuplexOutcome};
use crate::state::SessionStore;

/// What a job asks the worker to do.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanJobKind {
    /// A scan whose result becomes the pending frontside.
    Scan { request: ScanRequest },
    /// The backside pass for the device's pending frontside.
    Backside { device: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanJob {
    pub id: ScanJobId,
    pub kind: ScanJobKind,
    pub submitted_at: DateTime<Utc>,
}

impl ScanJob {
    pub fn scan(request: ScanRequest) -> Self {
        Self::new(ScanJobKind::Scan { request })
    }

    pub fn backside(device: impl Into<String>) -> Self {
        Self::new(ScanJobKind::Backside {
            device: device.into(),
        })
    }

    fn new(kind: ScanJobKind) -> Self {
        Self {
            id: ScanJobId::new(),
            kind,
            submitted_at: Utc::now(),
        }
    }

    pub fn device(&self) -> &str {
        match &self.kind {
            ScanJobKind::Scan { request } => &request.device,
            ScanJobKind::Backside { device } => device,
        }
    }
}

/// Result of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    Scanned(ScanResult),
    Duplex(DuplexOutcome),
}

impl JobReport {
    /// Message for the device view when the job ended without the expected
    /// document.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Scanned(result) if result.is_empty() => Some(
                "No pages were scanned. Load the pages and scan again.".into(),
            ),
            Self::Duplex(DuplexOutcome::PageCountMismatch { front, back }) => Some(
                humanize_error(&ScanwerkError::PageCountMismatch {
                    front: *front,
                    back: *back,
                })
                .to_string(),
            ),
            Self::Duplex(DuplexOutcome::NoBacksidePages) => Some(
                "No back sides were scanned. Load the flipped stack and scan again, or press done."
                    .into(),
            ),
            _ => None,
        }
    }
}

/// Sending half of the job queue.
#[derive(Clone)]
pub struct ScanQueue {
    sender: mpsc::UnboundedSender<ScanJob>,
}

impl ScanQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(coordinator: Arc<DuplexCoordinator>, store: Arc<SessionStore>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(receiver, coordinator, store));
        Self { sender }
    }

    pub fn submit(&self, job: ScanJob) -> Result<()> {
        info!(job = %job.id, device = job.device(), "scan job queued");
        self.sender
            .send(job)
            .map_err(|_| ScanwerkError::QueueClosed)
    }
}

async fn run_worker(
    mut jobs: mpsc::UnboundedReceiver<ScanJob>,
    coordinator: Arc<DuplexCoordinator>,
    store: Arc<SessionStore>,
) {
    while let Some(job) = jobs.recv().await {
        let id = job.id;
        let device = job.device().to_owned();
        let runner = Arc::clone(&coordinator);

        match tokio::task::spawn_blocking(move || run_job(&runner, &job)).await {
            Ok(Ok(report)) => {
                match report.notice() {
                    Some(notice) => store.record_error(&device, notice),
                    None => store.clear_error(&device),
                }
                info!(job = %id, device = %device, ?report, "scan job finished");
            }
            Ok(Err(err)) => {
                error!(job = %id, device = %device, %err, "scan job failed");
                store.record_error(&device, humanize_error(&err).to_string());
            }
            Err(join_err) => {
                error!(job = %id, device = %device, %join_err, "scan job aborted");
                store.record_error(&device, "The scan stopped unexpectedly. Try again.");
            }
        }
    }
    warn!("scan queue closed, worker exiting");
}

fn run_job(coordinator: &DuplexCoordinator, job: &ScanJob) -> Result<JobReport> {
    match &job.kind {
        ScanJobKind::Scan { request } => coordinator.perform_scan(request).map(JobReport::Scanned),
        ScanJobKind::Backside { device } => coordinator
            .scan_backside_for(device)
            .map(JobReport::Duplex),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use scanwerk_driver::{Feed, SimulatedBackend, SimulatedDevice};

    use super::*;
    use crate::access::HardwareGate;
    use crate::executor::ScanExecutor;

    fn request(device: &str) -> ScanRequest {
        ScanRequest {
            device: device.into(),
            resolution: 72,
            source: "ADF".into(),
            mode: "Gray".into(),
            filename: "queued".into(),
        }
    }

    async fn settle(store: &SessionStore, device: &str) {
        for _ in 0..1000 {
            if store.state(device).is_some_and(|s| !s.busy && !s.queued) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job for {device} did not finish");
    }

    fn queue_with(device: SimulatedDevice, dir: &std::path::Path) -> (ScanQueue, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::new());
        let gate = Arc::new(HardwareGate::new(Arc::new(SimulatedBackend::new(vec![device]))));
        let coordinator = Arc::new(DuplexCoordinator::new(
            gate,
            Arc::clone(&store),
            ScanExecutor::new(dir),
        ));
        (ScanQueue::start(coordinator, Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn worker_runs_job_and_records_frontside() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, store) = queue_with(
            SimulatedDevice::new("sim:0").with_feed(Feed::pages(&[(10, 5), (10, 5)])),
            dir.path(),
        );
        assert!(store.try_mark_queued("sim:0").0);

        queue.submit(ScanJob::scan(request("sim:0"))).expect("submit");
        settle(&store, "sim:0").await;

        let state = store.state("sim:0").expect("state");
        assert_eq!(state.pending_frontside, Some(PathBuf::from("queued.pdf")));
        assert!(state.last_error.is_none());
        assert!(dir.path().join("queued.pdf").exists());
    }

    #[tokio::test]
    async fn failed_job_leaves_a_readable_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, store) = queue_with(
            SimulatedDevice::new("sim:0").with_feed(Feed::jamming(&[])),
            dir.path(),
        );
        assert!(store.try_mark_queued("sim:0").0);

        queue.submit(ScanJob::scan(request("sim:0"))).expect("submit");
        settle(&store, "sim:0").await;

        let state = store.state("sim:0").expect("state");
        let message = state.last_error.expect("error recorded");
        assert!(message.contains("stuck"), "unexpected message: {message}");
        assert!(!state.has_pending_frontside);
    }

    #[tokio::test]
    async fn rejected_job_still_releases_the_queued_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, store) = queue_with(SimulatedDevice::new("sim:0"), dir.path());
        assert!(store.try_mark_queued("sim:0").0);

        let mut bad = request("sim:0");
        bad.resolution = 0;
        queue.submit(ScanJob::scan(bad)).expect("submit");
        settle(&store, "sim:0").await;

        assert!(store.state("sim:0").is_some_and(|s| s.last_error.is_some()));
    }

    #[test]
    fn mismatch_and_empty_passes_produce_notices() {
        assert!(JobReport::Duplex(DuplexOutcome::PageCountMismatch { front: 2, back: 3 })
            .notice()
            .is_some_and(|n| n.contains('3')));
        assert!(JobReport::Scanned(ScanResult::empty()).notice().is_some());
        assert!(
            JobReport::Scanned(ScanResult::written(PathBuf::from("a.pdf"), 1))
                .notice()
                .is_none()
        );
    }
}
