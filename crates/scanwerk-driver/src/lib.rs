// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-driver — Scanner driver abstractions.
//
// Defines the traits the scan service drives hardware through, plus the
// backends shipped with the server: libsane for real scanners (behind the
// `sane` feature), a stub for hosts without scanners, and a simulated backend
// with virtual devices.

use std::sync::Arc;

use scanwerk_core::BackendKind;

pub mod sane;
pub mod simulated;
pub mod stub;
pub mod traits;

pub use simulated::{DriverCall, Feed, SimulatedBackend, SimulatedDevice};
pub use traits::{DeviceHandle, DeviceInfo, OptionDescriptor, ScannerBackend};

/// Build the backend selected in the configuration.
pub fn backend_for(kind: BackendKind) -> Arc<dyn ScannerBackend> {
    match kind {
        BackendKind::Sane => sane_backend(),
        BackendKind::Simulated => Arc::new(SimulatedBackend::demo()),
        // No driver: every call reports the backend as unavailable.
        BackendKind::None => Arc::new(stub::StubBackend),
    }
}

#[cfg(feature = "sane")]
fn sane_backend() -> Arc<dyn ScannerBackend> {
    Arc::new(sane::SaneBackend)
}

#[cfg(not(feature = "sane"))]
fn sane_backend() -> Arc<dyn ScannerBackend> {
    tracing::warn!("built without the `sane` feature, no scanners will be found");
    Arc::new(stub::StubBackend)
}
