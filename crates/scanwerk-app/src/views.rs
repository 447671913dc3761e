// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON views served by the web layer.
//
// Each response names the view the client should show (`"view": ...`), so a
// front-end can swap partials the same way the device page polls for
// scanning / backside / options.

use std::path::PathBuf;

use scanwerk_core::ScanConfig;
use scanwerk_core::error::Result;
use scanwerk_core::human_errors::HumanError;
use scanwerk_core::types::{Device, DeviceState};
use scanwerk_scan::ScanService;
use serde::Serialize;

/// One row of the scanner list.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub id: String,
    pub label: String,
    pub device_type: String,
    pub state: Option<DeviceState>,
}

/// Scan parameters offered for a device, with the preselected values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanForm {
    pub device: String,
    pub sources: Vec<String>,
    pub modes: Vec<String>,
    pub resolutions: Vec<String>,
    pub source: String,
    pub mode: String,
    pub resolution: u32,
    pub filename: String,
}

impl ScanForm {
    /// Preselect the configured preference when the device offers it,
    /// otherwise the device's first choice.
    pub fn for_device(device: &Device, config: &ScanConfig) -> Self {
        let sources = device.choices_for("source");
        let modes = device.choices_for("mode");
        let resolutions = device.choices_for("resolution");

        let preferred_resolution = config.preferred_resolution.to_string();
        let resolution = if resolutions.is_empty() || resolutions.contains(&preferred_resolution) {
            config.preferred_resolution
        } else {
            resolutions
                .iter()
                .find_map(|value| value.parse::<u32>().ok())
                .unwrap_or(config.preferred_resolution)
        };

        Self {
            device: device.id.clone(),
            source: pick(&sources, &config.preferred_source),
            mode: pick(&modes, &config.preferred_mode),
            resolution,
            filename: String::new(),
            sources,
            modes,
            resolutions,
        }
    }
}

fn pick(choices: &[String], preferred: &str) -> String {
    if choices.is_empty() || choices.iter().any(|choice| choice == preferred) {
        preferred.to_owned()
    } else {
        choices[0].clone()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    /// Scanner list.
    Index {
        devices: Vec<DeviceSummary>,
        refreshing: bool,
    },
    /// A registry refresh is running.
    Updating,
    /// Full device page: capabilities, scan form, and state.
    Device {
        device: Device,
        form: ScanForm,
        state: DeviceState,
    },
    /// A job for the device is queued or running.
    Scanning { device: String, state: DeviceState },
    /// A frontside waits for its backside.
    ScanBackside {
        device: String,
        pending_frontside: Option<PathBuf>,
        state: DeviceState,
        notice: Option<HumanError>,
    },
    /// Scan form for a new job.
    ScanOptions {
        form: ScanForm,
        state: DeviceState,
        notice: Option<HumanError>,
    },
}

impl View {
    pub fn scanning(device: &str, state: DeviceState) -> Self {
        Self::Scanning {
            device: device.to_owned(),
            state,
        }
    }
}

pub fn index_view(service: &ScanService) -> View {
    let devices = service
        .registry_snapshot()
        .values()
        .map(|device| DeviceSummary {
            id: device.id.clone(),
            label: device.label(),
            device_type: device.device_type.clone(),
            state: service.device_state(&device.id).ok(),
        })
        .collect();
    View::Index {
        devices,
        refreshing: service.is_refreshing(),
    }
}

pub fn device_page(service: &ScanService, device_id: &str) -> Result<View> {
    let device = service.device(device_id)?;
    let state = service.device_state(device_id)?;
    Ok(View::Device {
        form: ScanForm::for_device(&device, service.config()),
        device,
        state,
    })
}

/// The partial matching the device's current state: scanning while a job is
/// queued or running, the backside prompt while a frontside is pending, the
/// scan form otherwise.
pub fn device_view(
    service: &ScanService,
    device_id: &str,
    notice: Option<HumanError>,
) -> Result<View> {
    let state = service.device_state(device_id)?;

    if state.busy || state.queued {
        return Ok(View::scanning(device_id, state));
    }
    if state.has_pending_frontside {
        return Ok(View::ScanBackside {
            device: device_id.to_owned(),
            pending_frontside: state.pending_frontside.clone(),
            state,
            notice,
        });
    }

    let device = service.device(device_id)?;
    Ok(View::ScanOptions {
        form: ScanForm::for_device(&device, service.config()),
        state,
        notice,
    })
}
