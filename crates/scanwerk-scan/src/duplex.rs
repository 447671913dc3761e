// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Duplex coordinator — scans a frontside, then its backside, and merges them.
//
// Per-device state machine:
//
//   Idle --frontside scan--> AwaitingBackside --backside, counts match--> Idle (merged)
//                            AwaitingBackside --backside, counts differ--> Idle (unmerged)
//                            AwaitingBackside --done--> Idle (unmerged)
//
// A failed scan leaves the state where it was.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{DeviceState, ScanRequest, ScanResult};
use scanwerk_document::{PdfReader, interleave_duplex};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::access::{BusyGuard, HardwareGate};
use crate::executor::ScanExecutor;
use crate::state::SessionStore;

/// How a backside scan ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DuplexOutcome {
    /// Both passes merged into the frontside file.
    Merged { file: PathBuf, pages: usize },
    /// Page counts differed; the frontside was kept on its own.
    PageCountMismatch { front: usize, back: usize },
    /// The backside pass captured nothing; the frontside is still pending.
    NoBacksidePages,
}

pub struct DuplexCoordinator {
    gate: Arc<HardwareGate>,
    store: Arc<SessionStore>,
    executor: ScanExecutor,
}

impl DuplexCoordinator {
    pub fn new(gate: Arc<HardwareGate>, store: Arc<SessionStore>, executor: ScanExecutor) -> Self {
        Self {
            gate,
            store,
            executor,
        }
    }

    pub fn scan_dir(&self) -> &Path {
        self.executor.scan_dir()
    }

    /// Scan with `request` and remember the result as a frontside.
    #[instrument(skip_all, fields(device = %request.device))]
    pub fn perform_scan(&self, request: &ScanRequest) -> Result<ScanResult> {
        // Marking busy consumes the queued marker, so it comes before anything
        // that can reject the request.
        let _busy = BusyGuard::mark(&self.store, &request.device);
        request.validate()?;

        let result = self
            .gate
            .with_exclusive_access(|backend| self.executor.execute(backend, request))?;

        if let Some(file) = &result.file {
            self.store.record_frontside(request, file);
        }
        Ok(result)
    }

    /// Scan the backside of the device's pending frontside and merge both.
    #[instrument(skip(self))]
    pub fn scan_backside_for(&self, device: &str) -> Result<DuplexOutcome> {
        let _busy = BusyGuard::mark(&self.store, device);

        let (front_file, front_request) = self
            .store
            .pending_frontside(device)
            .ok_or_else(|| ScanwerkError::NoPendingFrontside(device.to_owned()))?;
        let back_request = front_request.backside_of(&front_file);

        let back = self
            .gate
            .with_exclusive_access(|backend| self.executor.execute(backend, &back_request))?;
        let Some(back_file) = back.file else {
            info!("backside scan captured no pages, frontside still pending");
            return Ok(DuplexOutcome::NoBacksidePages);
        };

        let front_path = self.scan_dir().join(&front_file);
        let back_path = self.scan_dir().join(&back_file);
        self.merge(device, &front_file, &front_path, &back_path)
    }

    /// Leave AwaitingBackside without merging. Refused while a scan for the
    /// device is queued or running, so a backside in flight still merges.
    pub fn mark_done(&self, device: &str) -> Result<DeviceState> {
        let (finished, state) = self.store.try_finish_duplex(device);
        if !finished {
            info!(device, busy = state.busy, queued = state.queued, "done refused, scan in flight");
            return Err(ScanwerkError::DeviceBusy(device.to_owned()));
        }
        info!(device, "duplex workflow finished");
        Ok(state)
    }

    fn merge(
        &self,
        device: &str,
        front_file: &Path,
        front_path: &Path,
        back_path: &Path,
    ) -> Result<DuplexOutcome> {
        let merged = PdfReader::open(front_path).and_then(|front| {
            let back = PdfReader::open(back_path)?;
            interleave_duplex(&front, &back)
        });

        match merged {
            Ok(mut document) => {
                let pages = document.page_count();
                let saved = document.save(front_path);
                remove_backside(back_path);
                saved?;
                self.store.clear_pending(device);
                info!(file = %front_file.display(), pages, "duplex scan merged");
                Ok(DuplexOutcome::Merged {
                    file: front_file.to_path_buf(),
                    pages,
                })
            }
            Err(ScanwerkError::PageCountMismatch { front, back }) => {
                warn!(front, back, "page numbers don't match, skipping merge");
                remove_backside(back_path);
                self.store.clear_pending(device);
                Ok(DuplexOutcome::PageCountMismatch { front, back })
            }
            Err(err) => {
                remove_backside(back_path);
                Err(err)
            }
        }
    }
}

fn remove_backside(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        warn!(path = %path.display(), %err, "could not delete backside file");
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use scanwerk_driver::{DriverCall, Feed, SimulatedBackend, SimulatedDevice};

    use super::*;

    struct Fixture {
        backend: Arc<SimulatedBackend>,
        store: Arc<SessionStore>,
        coordinator: Arc<DuplexCoordinator>,
        dir: tempfile::TempDir,
    }

    fn fixture(backend: SimulatedBackend) -> Fixture {
        let backend = Arc::new(backend);
        let store = Arc::new(SessionStore::new());
        let dir = tempfile::tempdir().expect("tempdir");
        let coordinator = Arc::new(DuplexCoordinator::new(
            Arc::new(HardwareGate::new(backend.clone())),
            Arc::clone(&store),
            ScanExecutor::new(dir.path()),
        ));
        Fixture {
            backend,
            store,
            coordinator,
            dir,
        }
    }

    fn feeder_request(device: &str, filename: &str) -> ScanRequest {
        ScanRequest {
            device: device.into(),
            resolution: 72,
            source: "ADF".into(),
            mode: "Gray".into(),
            filename: filename.into(),
        }
    }

    fn widths(path: &Path) -> Vec<f32> {
        let reader = PdfReader::open(path).expect("open pdf");
        (1..=reader.page_count() as u32)
            .map(|n| reader.page_size(n).expect("size").0)
            .collect()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn backside_pages_are_interleaved_in_reverse() {
        let fx = fixture(SimulatedBackend::new(vec![
            SimulatedDevice::new("sim:0")
                .with_feed(Feed::pages(&[(10, 5), (11, 5), (12, 5)]))
                .with_feed(Feed::pages(&[(20, 5), (21, 5), (22, 5)])),
        ]));

        let front = fx
            .coordinator
            .perform_scan(&feeder_request("sim:0", "letter"))
            .expect("frontside");
        assert_eq!(front.pages, 3);
        assert!(fx.store.state("sim:0").is_some_and(|s| s.has_pending_frontside));

        let outcome = fx.coordinator.scan_backside_for("sim:0").expect("backside");

        assert_eq!(
            outcome,
            DuplexOutcome::Merged {
                file: PathBuf::from("letter.pdf"),
                pages: 6
            }
        );
        assert_eq!(
            widths(&fx.dir.path().join("letter.pdf")),
            vec![10.0, 22.0, 11.0, 21.0, 12.0, 20.0]
        );
        assert!(!fx.dir.path().join("letter.pdf_backside.pdf").exists());
        let state = fx.store.state("sim:0").expect("state");
        assert!(!state.has_pending_frontside && !state.busy);
    }

    #[test]
    fn mismatch_keeps_frontside_untouched_and_drops_backside() {
        let fx = fixture(SimulatedBackend::new(vec![
            SimulatedDevice::new("sim:0")
                .with_feed(Feed::pages(&[(10, 5), (11, 5)]))
                .with_feed(Feed::pages(&[(20, 5), (21, 5), (22, 5)])),
        ]));
        fx.coordinator
            .perform_scan(&feeder_request("sim:0", "short"))
            .expect("frontside");
        let front_path = fx.dir.path().join("short.pdf");
        let before = std::fs::read(&front_path).expect("read frontside");

        let outcome = fx.coordinator.scan_backside_for("sim:0").expect("backside");

        assert_eq!(outcome, DuplexOutcome::PageCountMismatch { front: 2, back: 3 });
        assert_eq!(std::fs::read(&front_path).expect("reread frontside"), before);
        assert!(!fx.dir.path().join("short.pdf_backside.pdf").exists());
        assert!(fx.store.pending_frontside("sim:0").is_none());
    }

    #[test]
    fn backside_without_frontside_touches_no_hardware() {
        let fx = fixture(SimulatedBackend::new(vec![SimulatedDevice::new("sim:0")]));
        fx.store.replace_devices(Default::default());

        let result = fx.coordinator.scan_backside_for("sim:0");

        assert!(matches!(result, Err(ScanwerkError::NoPendingFrontside(_))));
        assert!(!fx.backend.hardware_touched());
        assert!(!fx.store.is_busy("sim:0"));
    }

    #[test]
    fn failed_backside_keeps_the_frontside_pending() {
        let fx = fixture(SimulatedBackend::new(vec![
            SimulatedDevice::new("sim:0")
                .with_feed(Feed::pages(&[(10, 5)]))
                .with_feed(Feed::jamming(&[(20, 5)])),
        ]));
        fx.coordinator
            .perform_scan(&feeder_request("sim:0", "jam"))
            .expect("frontside");

        let result = fx.coordinator.scan_backside_for("sim:0");

        assert!(matches!(result, Err(ScanwerkError::ScanFailed(_))));
        let state = fx.store.state("sim:0").expect("state");
        assert!(state.has_pending_frontside);
        assert!(!state.busy);
        assert_eq!(widths(&fx.dir.path().join("jam.pdf")), vec![10.0]);
    }

    #[test]
    fn empty_backside_pass_keeps_waiting() {
        let fx = fixture(SimulatedBackend::new(vec![
            SimulatedDevice::new("sim:0")
                .with_feed(Feed::pages(&[(10, 5)]))
                .with_feed(Feed::empty()),
        ]));
        fx.coordinator
            .perform_scan(&feeder_request("sim:0", "single"))
            .expect("frontside");

        let outcome = fx.coordinator.scan_backside_for("sim:0").expect("backside");

        assert_eq!(outcome, DuplexOutcome::NoBacksidePages);
        assert!(fx.store.pending_frontside("sim:0").is_some());

        fx.coordinator.mark_done("sim:0").expect("done");
        assert!(fx.store.pending_frontside("sim:0").is_none());
    }

    #[test]
    fn busy_spans_the_scan_and_clears_after_success_and_failure() {
        let fx = fixture(
            SimulatedBackend::new(vec![
                SimulatedDevice::new("sim:0")
                    .with_feed(Feed::pages(&[(10, 5), (10, 5), (10, 5)]))
                    .with_feed(Feed::jamming(&[(10, 5)])),
            ])
            .with_page_delay(Duration::from_millis(30)),
        );

        let worker = {
            let coordinator = Arc::clone(&fx.coordinator);
            std::thread::spawn(move || coordinator.perform_scan(&feeder_request("sim:0", "slow")))
        };
        wait_for(|| fx.backend.calls().contains(&DriverCall::Page("sim:0".into())));
        assert!(fx.store.is_busy("sim:0"));
        worker.join().expect("join").expect("scan");
        assert!(!fx.store.is_busy("sim:0"));

        let failed = fx.coordinator.perform_scan(&feeder_request("sim:0", "broken"));
        assert!(failed.is_err());
        assert!(!fx.store.is_busy("sim:0"));
    }

    #[test]
    fn busy_holds_while_a_second_scan_waits_for_the_hardware() {
        let fx = fixture(
            SimulatedBackend::new(vec![
                SimulatedDevice::new("sim:0")
                    .with_feed(Feed::pages(&[(10, 5), (10, 5), (10, 5), (10, 5), (10, 5)]))
                    .with_feed(Feed::pages(&[(20, 5), (20, 5), (20, 5)])),
            ])
            .with_page_delay(Duration::from_millis(30)),
        );

        let first = {
            let coordinator = Arc::clone(&fx.coordinator);
            std::thread::spawn(move || coordinator.perform_scan(&feeder_request("sim:0", "a")))
        };
        wait_for(|| fx.backend.calls().contains(&DriverCall::Page("sim:0".into())));
        let second = {
            let coordinator = Arc::clone(&fx.coordinator);
            std::thread::spawn(move || coordinator.perform_scan(&feeder_request("sim:0", "b")))
        };
        std::thread::sleep(Duration::from_millis(20));

        first.join().expect("join first").expect("first scan");
        assert!(fx.store.is_busy("sim:0"));

        wait_for(|| {
            fx.backend
                .calls()
                .iter()
                .filter(|call| **call == DriverCall::Init)
                .count()
                == 2
        });
        assert!(fx.store.is_busy("sim:0"));
        assert!(fx.store.state("sim:0").is_some_and(|s| s.busy));

        second.join().expect("join second").expect("second scan");
        assert!(!fx.store.is_busy("sim:0"));
    }

    #[test]
    fn done_is_refused_while_the_backside_scan_runs() {
        let fx = fixture(
            SimulatedBackend::new(vec![
                SimulatedDevice::new("sim:0")
                    .with_feed(Feed::pages(&[(10, 5), (11, 5), (12, 5)]))
                    .with_feed(Feed::pages(&[(20, 5), (21, 5), (22, 5)])),
            ])
            .with_page_delay(Duration::from_millis(30)),
        );
        fx.coordinator
            .perform_scan(&feeder_request("sim:0", "pair"))
            .expect("frontside");
        let pages_before = fx
            .backend
            .calls()
            .iter()
            .filter(|call| matches!(call, DriverCall::Page(_)))
            .count();

        let backside = {
            let coordinator = Arc::clone(&fx.coordinator);
            std::thread::spawn(move || coordinator.scan_backside_for("sim:0"))
        };
        wait_for(|| {
            fx.backend
                .calls()
                .iter()
                .filter(|call| matches!(call, DriverCall::Page(_)))
                .count()
                > pages_before
        });

        let refused = fx.coordinator.mark_done("sim:0");
        assert!(matches!(refused, Err(ScanwerkError::DeviceBusy(_))));
        assert!(fx.store.pending_frontside("sim:0").is_some());

        let outcome = backside.join().expect("join").expect("backside");
        assert_eq!(
            outcome,
            DuplexOutcome::Merged {
                file: PathBuf::from("pair.pdf"),
                pages: 6
            }
        );
        assert_eq!(
            widths(&fx.dir.path().join("pair.pdf")),
            vec![10.0, 22.0, 11.0, 21.0, 12.0, 20.0]
        );
    }

    #[test]
    fn concurrent_scans_never_interleave_hardware_sessions() {
        let devices = (0..4)
            .map(|n| SimulatedDevice::new(format!("sim:{n}")).with_default_feed(Feed::pages(&[(8, 8), (8, 8)])))
            .collect();
        let fx = fixture(SimulatedBackend::new(devices).with_page_delay(Duration::from_millis(1)));

        let workers: Vec<_> = (0..12)
            .map(|n| {
                let coordinator = Arc::clone(&fx.coordinator);
                std::thread::spawn(move || {
                    let device = format!("sim:{}", n % 4);
                    coordinator.perform_scan(&feeder_request(&device, &format!("job{n}")))
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().expect("join").expect("scan").pages, 2);
        }

        let mut open_sessions = 0usize;
        for call in fx.backend.calls() {
            match call {
                DriverCall::Init => {
                    open_sessions += 1;
                    assert_eq!(open_sessions, 1, "two hardware sessions overlapped");
                }
                DriverCall::Shutdown => open_sessions -= 1,
                _ => assert_eq!(open_sessions, 1, "driver call outside a session"),
            }
        }
        assert_eq!(fx.backend.max_concurrent_sessions(), 1);
    }
}
