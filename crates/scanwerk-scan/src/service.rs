// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan service — the boundary the web layer calls into.
//
// Every method returns quickly: refreshes and scans run on the blocking pool
// and report through the session store. All fields are Arc-wrapped so the
// service can be cloned into each request handler.

use std::sync::Arc;

use scanwerk_core::ScanConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{Device, DeviceMap, DeviceState, ScanJobId, ScanRequest};
use scanwerk_driver::ScannerBackend;
use serde::Serialize;
use tracing::{info, warn};

use crate::access::HardwareGate;
use crate::duplex::DuplexCoordinator;
use crate::executor::ScanExecutor;
use crate::queue::{ScanJob, ScanQueue};
use crate::registry::DeviceRegistry;
use crate::state::SessionStore;

/// Answer to a scan submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Submission {
    /// The job was queued.
    Accepted { job: ScanJobId, state: DeviceState },
    /// The device is scanning or already has a job waiting; nothing was queued.
    Busy { state: DeviceState },
}

#[derive(Clone)]
pub struct ScanService {
    config: Arc<ScanConfig>,
    store: Arc<SessionStore>,
    registry: DeviceRegistry,
    coordinator: Arc<DuplexCoordinator>,
    queue: ScanQueue,
}

impl ScanService {
    /// Wire up the service and spawn its scan worker. Must be called from
    /// within a tokio runtime.
    pub fn start(config: ScanConfig, backend: Arc<dyn ScannerBackend>) -> Self {
        info!(
            backend = backend.name(),
            scan_dir = %config.scan_dir.display(),
            "starting scan service"
        );

        let store = Arc::new(SessionStore::new());
        let gate = Arc::new(HardwareGate::new(backend));
        let registry = DeviceRegistry::new(Arc::clone(&gate), Arc::clone(&store));
        let coordinator = Arc::new(DuplexCoordinator::new(
            gate,
            Arc::clone(&store),
            ScanExecutor::new(config.scan_dir.clone()),
        ));
        let queue = ScanQueue::start(Arc::clone(&coordinator), Arc::clone(&store));

        Self {
            config: Arc::new(config),
            store,
            registry,
            coordinator,
            queue,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    // -- Registry -------------------------------------------------------------

    /// Start a refresh in the background. Returns `false` if one is already
    /// running.
    pub fn refresh_registry(&self) -> bool {
        let Some(flag) = self.registry.try_raise_flag() else {
            return false;
        };
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = registry.refresh_flagged(flag) {
                warn!(%err, "registry refresh failed");
            }
        });
        true
    }

    /// Refresh and wait for the new snapshot.
    pub async fn refresh_registry_now(&self) -> Result<Arc<DeviceMap>> {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || registry.refresh())
            .await
            .map_err(|err| ScanwerkError::Enumeration(format!("refresh task failed: {err}")))?
    }

    pub fn registry_snapshot(&self) -> Arc<DeviceMap> {
        self.registry.snapshot()
    }

    pub fn is_refreshing(&self) -> bool {
        self.registry.is_refreshing()
    }

    pub fn device(&self, device_id: &str) -> Result<Device> {
        self.store
            .device(device_id)
            .ok_or_else(|| ScanwerkError::UnknownDevice(device_id.to_owned()))
    }

    // -- Scans ----------------------------------------------------------------

    /// Queue a scan. The device must be in the registry.
    pub fn submit_scan(&self, request: ScanRequest) -> Result<Submission> {
        request.validate()?;
        self.device(&request.device)?;
        let device = request.device.clone();
        self.enqueue(&device, ScanJob::scan(request))
    }

    /// Queue the backside pass for the device's pending frontside.
    pub fn submit_backside_scan(&self, device: &str) -> Result<Submission> {
        let state = self.device_state(device)?;
        if !state.has_pending_frontside {
            return Err(ScanwerkError::NoPendingFrontside(device.to_owned()));
        }
        self.enqueue(device, ScanJob::backside(device))
    }

    /// Finish the duplex workflow without scanning a backside. Fails with
    /// `DeviceBusy` while a job for the device is queued or running.
    pub fn mark_done(&self, device: &str) -> Result<DeviceState> {
        self.device_state(device)?;
        self.coordinator.mark_done(device)
    }

    pub fn device_state(&self, device: &str) -> Result<DeviceState> {
        self.store
            .state(device)
            .ok_or_else(|| ScanwerkError::UnknownDevice(device.to_owned()))
    }

    fn enqueue(&self, device: &str, job: ScanJob) -> Result<Submission> {
        let (accepted, state) = self.store.try_mark_queued(device);
        if !accepted {
            info!(device, busy = state.busy, queued = state.queued, "device busy, job not queued");
            return Ok(Submission::Busy { state });
        }

        let id = job.id;
        if let Err(err) = self.queue.submit(job) {
            self.store.clear_queued(device);
            return Err(err);
        }
        Ok(Submission::Accepted {
            job: id,
            state: self.store.state(device).unwrap_or(state),
        })
    }
}
