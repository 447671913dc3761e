// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub backend for hosts without a scanner driver.
//
// Every call fails with `BackendUnavailable`; the server still starts and
// serves an empty scanner list.

use scanwerk_core::error::{Result, ScanwerkError};

use crate::traits::{DeviceHandle, DeviceInfo, ScannerBackend};

/// No-op backend returned when no driver is configured.
#[derive(Debug, Default)]
pub struct StubBackend;

impl ScannerBackend for StubBackend {
    fn name(&self) -> &str {
        "none (stub)"
    }

    fn init(&self) -> Result<()> {
        tracing::warn!("ScannerBackend::init called on stub backend");
        Err(ScanwerkError::BackendUnavailable)
    }

    fn shutdown(&self) {}

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Err(ScanwerkError::BackendUnavailable)
    }

    fn open<'a>(&'a self, _device_id: &str) -> Result<Box<dyn DeviceHandle + 'a>> {
        tracing::warn!("ScannerBackend::open called on stub backend");
        Err(ScanwerkError::BackendUnavailable)
    }
}
