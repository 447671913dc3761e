// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared scan state — the registry snapshot and per-device sessions.
//
// Everything sits behind one short-held lock. No method here touches
// hardware, so the lock is never held across a driver call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scanwerk_core::types::{Device, DeviceMap, DeviceState, ScanRequest};
use tracing::debug;

/// Session state of one device.
#[derive(Debug, Clone, Default)]
struct DeviceSession {
    /// Calls holding the device; more than zero means `busy`.
    busy: usize,
    queued: bool,
    pending_frontside: Option<PathBuf>,
    last_request: Option<ScanRequest>,
    last_error: Option<String>,
}

impl DeviceSession {
    fn is_idle(&self) -> bool {
        self.busy == 0 && !self.queued && self.pending_frontside.is_none()
    }

    fn view(&self) -> DeviceState {
        DeviceState {
            busy: self.busy > 0,
            queued: self.queued,
            has_pending_frontside: self.pending_frontside.is_some(),
            pending_frontside: self.pending_frontside.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    devices: Arc<DeviceMap>,
    /// Refreshes in flight; more than zero means `refreshing`.
    refreshes: usize,
    sessions: HashMap<String, DeviceSession>,
}

/// Process-wide registry snapshot and session table.
#[derive(Debug, Default)]
pub struct SessionStore {
    shared: Mutex<Shared>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // State stays consistent between statements, so a panic elsewhere
        // never leaves it half-written.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Registry -------------------------------------------------------------

    /// Last completed registry snapshot.
    pub fn snapshot(&self) -> Arc<DeviceMap> {
        Arc::clone(&self.lock().devices)
    }

    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.lock().devices.get(device_id).cloned()
    }

    /// Swap in a freshly built snapshot. Sessions are created for new
    /// devices; sessions of vanished devices are kept while they still
    /// carry work.
    pub fn replace_devices(&self, devices: DeviceMap) {
        let mut shared = self.lock();
        for id in devices.keys() {
            shared.sessions.entry(id.clone()).or_default();
        }
        shared
            .sessions
            .retain(|id, session| devices.contains_key(id) || !session.is_idle());
        debug!(devices = devices.len(), "registry snapshot replaced");
        shared.devices = Arc::new(devices);
    }

    /// Mark a refresh as started unless one is already running.
    pub fn try_begin_refresh(&self) -> bool {
        let mut shared = self.lock();
        if shared.refreshes > 0 {
            return false;
        }
        shared.refreshes = 1;
        true
    }

    pub fn begin_refresh(&self) {
        self.lock().refreshes += 1;
    }

    pub fn end_refresh(&self) {
        let mut shared = self.lock();
        shared.refreshes = shared.refreshes.saturating_sub(1);
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshes > 0
    }

    // -- Sessions -------------------------------------------------------------

    /// State of a device, `None` if it was never discovered.
    pub fn state(&self, device_id: &str) -> Option<DeviceState> {
        self.lock().sessions.get(device_id).map(DeviceSession::view)
    }

    /// Mark a device busy. Consumes its queued marker. Calls nest: the
    /// device stays busy until every `mark_busy` has its `clear_busy`.
    pub fn mark_busy(&self, device_id: &str) {
        let mut shared = self.lock();
        let session = shared.sessions.entry(device_id.to_owned()).or_default();
        session.busy += 1;
        session.queued = false;
    }

    pub fn clear_busy(&self, device_id: &str) {
        if let Some(session) = self.lock().sessions.get_mut(device_id) {
            session.busy = session.busy.saturating_sub(1);
        }
    }

    pub fn is_busy(&self, device_id: &str) -> bool {
        self.lock()
            .sessions
            .get(device_id)
            .is_some_and(|session| session.busy > 0)
    }

    /// Mark a job for the device as queued unless the device is busy or
    /// already has one waiting. Returns the resulting state and whether the
    /// marker was set.
    pub fn try_mark_queued(&self, device_id: &str) -> (bool, DeviceState) {
        let mut shared = self.lock();
        let session = shared.sessions.entry(device_id.to_owned()).or_default();
        if session.busy > 0 || session.queued {
            return (false, session.view());
        }
        session.queued = true;
        (true, session.view())
    }

    pub fn clear_queued(&self, device_id: &str) {
        if let Some(session) = self.lock().sessions.get_mut(device_id) {
            session.queued = false;
        }
    }

    // -- Duplex ---------------------------------------------------------------

    /// Remember a finished frontside and the request that produced it.
    pub fn record_frontside(&self, request: &ScanRequest, file: &Path) {
        let mut shared = self.lock();
        let session = shared.sessions.entry(request.device.clone()).or_default();
        session.pending_frontside = Some(file.to_path_buf());
        session.last_request = Some(request.clone());
    }

    /// Frontside waiting for its backside, with the request that produced it.
    pub fn pending_frontside(&self, device_id: &str) -> Option<(PathBuf, ScanRequest)> {
        let shared = self.lock();
        let session = shared.sessions.get(device_id)?;
        Some((
            session.pending_frontside.clone()?,
            session.last_request.clone()?,
        ))
    }

    pub fn clear_pending(&self, device_id: &str) {
        if let Some(session) = self.lock().sessions.get_mut(device_id) {
            session.pending_frontside = None;
        }
    }

    /// Drop the pending frontside and the last error, unless a job for the
    /// device is queued or running. Returns the state either way and whether
    /// it was cleared.
    pub fn try_finish_duplex(&self, device_id: &str) -> (bool, DeviceState) {
        let mut shared = self.lock();
        let session = shared.sessions.entry(device_id.to_owned()).or_default();
        if session.busy > 0 || session.queued {
            return (false, session.view());
        }
        session.pending_frontside = None;
        session.last_error = None;
        (true, session.view())
    }

    // -- Job outcome ----------------------------------------------------------

    pub fn record_error(&self, device_id: &str, message: impl Into<String>) {
        if let Some(session) = self.lock().sessions.get_mut(device_id) {
            session.last_error = Some(message.into());
        }
    }

    pub fn clear_error(&self, device_id: &str) {
        if let Some(session) = self.lock().sessions.get_mut(device_id) {
            session.last_error = None;
        }
    }
}
