// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device registry — discovers attached scanners and their options.

use std::sync::Arc;

use scanwerk_core::error::Result;
use scanwerk_core::types::{Device, DeviceMap};
use scanwerk_driver::{DeviceInfo, OptionDescriptor, ScannerBackend};
use tracing::{error, info, instrument};

use crate::access::HardwareGate;
use crate::state::SessionStore;

/// Raised `refreshing` flag; lowered when dropped.
pub struct RefreshFlag {
    store: Arc<SessionStore>,
}

impl Drop for RefreshFlag {
    fn drop(&mut self) {
        self.store.end_refresh();
    }
}

/// Builds registry snapshots through the hardware gate.
#[derive(Clone)]
pub struct DeviceRegistry {
    gate: Arc<HardwareGate>,
    store: Arc<SessionStore>,
}

impl DeviceRegistry {
    pub fn new(gate: Arc<HardwareGate>, store: Arc<SessionStore>) -> Self {
        Self { gate, store }
    }

    /// Enumerate devices and swap in the new snapshot.
    pub fn refresh(&self) -> Result<Arc<DeviceMap>> {
        self.store.begin_refresh();
        let flag = RefreshFlag {
            store: Arc::clone(&self.store),
        };
        self.refresh_flagged(flag)
    }

    /// Raise the `refreshing` flag unless a refresh is already running.
    pub fn try_raise_flag(&self) -> Option<RefreshFlag> {
        self.store.try_begin_refresh().then(|| RefreshFlag {
            store: Arc::clone(&self.store),
        })
    }

    /// Refresh under an already raised flag, lowering it when done.
    ///
    /// A device that fails to open or report its options is logged and left
    /// out. If enumeration itself fails the previous snapshot stays.
    #[instrument(skip_all, fields(backend = self.gate.backend_name()))]
    pub fn refresh_flagged(&self, _flag: RefreshFlag) -> Result<Arc<DeviceMap>> {
        let devices = self.gate.with_exclusive_access(|backend| {
            let listed = backend.enumerate_devices()?;
            let mut devices = DeviceMap::new();
            for info in listed {
                let id = info.id.clone();
                match read_device(backend, info) {
                    Ok(device) => {
                        devices.insert(id, device);
                    }
                    Err(err) => error!(device = %id, %err, "skipping device"),
                }
            }
            Ok(devices)
        })?;

        info!(devices = devices.len(), "registry refreshed");
        self.store.replace_devices(devices);
        Ok(self.store.snapshot())
    }

    pub fn snapshot(&self) -> Arc<DeviceMap> {
        self.store.snapshot()
    }

    pub fn is_refreshing(&self) -> bool {
        self.store.is_refreshing()
    }
}

/// Open a device, read its options, and close it again.
fn read_device(backend: &dyn ScannerBackend, info: DeviceInfo) -> Result<Device> {
    let handle = backend.open(&info.id)?;
    let options = handle
        .options()?
        .into_iter()
        .map(OptionDescriptor::into_option)
        .collect::<Result<Vec<_>>>()?;

    Ok(Device {
        id: info.id,
        vendor: info.vendor,
        model: info.model,
        device_type: info.type_info,
        options,
    })
}
