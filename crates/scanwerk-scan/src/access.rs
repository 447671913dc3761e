// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device access serialization.
//
// The driver layer is global and not reentrant, so every enumeration and
// every scan runs inside one process-wide hardware session. The hardware
// lock is separate from the state lock and is held for the whole session.

use std::sync::{Arc, Mutex, PoisonError};

use scanwerk_core::error::Result;
use scanwerk_driver::ScannerBackend;
use tracing::{debug, instrument};

use crate::state::SessionStore;

/// Owns the backend and hands it out one session at a time.
pub struct HardwareGate {
    backend: Arc<dyn ScannerBackend>,
    lock: Mutex<()>,
}

impl HardwareGate {
    pub fn new(backend: Arc<dyn ScannerBackend>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run `op` inside an initialised driver session while holding the
    /// hardware lock. The session is shut down and the lock released on
    /// every exit path, unwinding included.
    #[instrument(skip_all, fields(backend = self.backend.name()))]
    pub fn with_exclusive_access<T>(
        &self,
        op: impl FnOnce(&dyn ScannerBackend) -> Result<T>,
    ) -> Result<T> {
        // A panicking holder poisons the lock; the session guard has already
        // shut the driver down by then, so the lock is safe to reuse.
        let _lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let session = HardwareSession::start(self.backend.as_ref())?;
        op(session.backend)
    }
}

/// An initialised driver session; shuts the driver down on drop.
struct HardwareSession<'a> {
    backend: &'a dyn ScannerBackend,
}

impl<'a> HardwareSession<'a> {
    fn start(backend: &'a dyn ScannerBackend) -> Result<Self> {
        backend.init()?;
        debug!("hardware session started");
        Ok(Self { backend })
    }
}

impl Drop for HardwareSession<'_> {
    fn drop(&mut self) {
        self.backend.shutdown();
        debug!("hardware session ended");
    }
}

/// Keeps a device marked busy for as long as it lives.
pub struct BusyGuard<'a> {
    store: &'a SessionStore,
    device: String,
}

impl<'a> BusyGuard<'a> {
    pub fn mark(store: &'a SessionStore, device: &str) -> Self {
        store.mark_busy(device);
        Self {
            store,
            device: device.to_owned(),
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.store.clear_busy(&self.device);
    }
}

/// Run `op` with `device` marked busy.
pub fn with_busy_marker<T>(store: &SessionStore, device: &str, op: impl FnOnce() -> T) -> T {
    let _busy = BusyGuard::mark(store, device);
    op()
}
