// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk scan server.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScanwerkError};

/// Source name that makes the executor drain the automatic document feeder.
pub const ADF_SOURCE: &str = "ADF";

/// Unique identifier for a queued scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanJobId(pub Uuid);

impl ScanJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScanJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Device options -----------------------------------------------------------

/// Value type of a device option (SANE type codes 0..=5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionKind {
    Bool,
    Int,
    /// Fixed-point number, exposed as a real.
    Fixed,
    String,
    /// Action button without a value.
    Button,
    /// Groups the options that follow it; carries no value.
    Group,
}

impl OptionKind {
    /// Map a driver type code onto a kind.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Bool),
            1 => Some(Self::Int),
            2 => Some(Self::Fixed),
            3 => Some(Self::String),
            4 => Some(Self::Button),
            5 => Some(Self::Group),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::Bool => 0,
            Self::Int => 1,
            Self::Fixed => 2,
            Self::String => 3,
            Self::Button => 4,
            Self::Group => 5,
        }
    }
}

/// Physical unit of an option value (SANE unit codes 0..=6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionUnit {
    None,
    Pixel,
    Bit,
    Millimetre,
    Dpi,
    Percent,
    Microsecond,
}

impl OptionUnit {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Pixel),
            2 => Some(Self::Bit),
            3 => Some(Self::Millimetre),
            4 => Some(Self::Dpi),
            5 => Some(Self::Percent),
            6 => Some(Self::Microsecond),
            _ => None,
        }
    }

    /// Short suffix for display next to a value.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Pixel => "px",
            Self::Bit => "bit",
            Self::Millimetre => "mm",
            Self::Dpi => "dpi",
            Self::Percent => "%",
            Self::Microsecond => "µs",
        }
    }
}

/// Capability bits reported for each option.
pub mod capability {
    pub const SOFT_SELECT: u32 = 1 << 0;
    pub const HARD_SELECT: u32 = 1 << 1;
    pub const SOFT_DETECT: u32 = 1 << 2;
    pub const EMULATED: u32 = 1 << 3;
    pub const AUTOMATIC: u32 = 1 << 4;
    pub const INACTIVE: u32 = 1 << 5;
    pub const ADVANCED: u32 = 1 << 6;
}

/// Set of values an option accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionConstraint {
    Range { min: f64, max: f64, step: f64 },
    IntList { values: Vec<i64> },
    FloatList { values: Vec<f64> },
    StringList { values: Vec<String> },
}

/// One configurable option of a scanning device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOption {
    /// Device-local ordinal.
    pub index: u32,
    pub name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub kind: OptionKind,
    pub unit: OptionUnit,
    /// Storage size in bytes as reported by the driver.
    pub size: u32,
    /// Bitmask of [`capability`] flags.
    pub capabilities: u32,
    pub constraint: Option<OptionConstraint>,
}

impl ScanOption {
    /// Check that the constraint shape fits the option kind.
    pub fn validate(&self) -> Result<()> {
        let fits = match (&self.kind, &self.constraint) {
            (_, None) => true,
            (OptionKind::Int, Some(OptionConstraint::Range { .. }))
            | (OptionKind::Int, Some(OptionConstraint::IntList { .. }))
            | (OptionKind::Fixed, Some(OptionConstraint::Range { .. }))
            | (OptionKind::Fixed, Some(OptionConstraint::FloatList { .. }))
            | (OptionKind::String, Some(OptionConstraint::StringList { .. })) => true,
            _ => false,
        };

        if !fits {
            return Err(ScanwerkError::InvalidOption(format!(
                "option {} ({}) of kind {:?} cannot carry constraint {:?}",
                self.index, self.title, self.kind, self.constraint
            )));
        }

        if let Some(OptionConstraint::Range { min, max, .. }) = &self.constraint
            && min > max
        {
            return Err(ScanwerkError::InvalidOption(format!(
                "option {} ({}) has an empty range {min}..{max}",
                self.index, self.title
            )));
        }

        Ok(())
    }

    pub fn is_settable(&self) -> bool {
        self.capabilities & capability::SOFT_SELECT != 0
    }

    pub fn is_active(&self) -> bool {
        self.capabilities & capability::INACTIVE == 0
    }

    pub fn is_advanced(&self) -> bool {
        self.capabilities & capability::ADVANCED != 0
    }

    /// Discrete choices rendered as strings, empty for ranges and free values.
    pub fn choices(&self) -> Vec<String> {
        match &self.constraint {
            Some(OptionConstraint::IntList { values }) => {
                values.iter().map(|v| v.to_string()).collect()
            }
            Some(OptionConstraint::FloatList { values }) => {
                values.iter().map(|v| v.to_string()).collect()
            }
            Some(OptionConstraint::StringList { values }) => values.clone(),
            Some(OptionConstraint::Range { .. }) | None => Vec::new(),
        }
    }
}

// -- Devices ------------------------------------------------------------------

/// A scanning device and the options it reported at the last registry refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier, e.g. `epson2:net:192.168.1.20`.
    pub id: String,
    pub vendor: String,
    pub model: String,
    /// Driver-reported device type, e.g. "flatbed scanner".
    pub device_type: String,
    pub options: Vec<ScanOption>,
}

impl Device {
    /// Human-readable label ("Vendor Model").
    pub fn label(&self) -> String {
        format!("{} {}", self.vendor, self.model)
    }

    /// Find an option by its well-known name (`source`, `mode`, `resolution`, …).
    pub fn option_named(&self, name: &str) -> Option<&ScanOption> {
        self.options
            .iter()
            .find(|option| option.name.as_deref() == Some(name))
    }

    /// Choices of a named option, empty if the device lacks it.
    pub fn choices_for(&self, name: &str) -> Vec<String> {
        self.option_named(name)
            .map(ScanOption::choices)
            .unwrap_or_default()
    }
}

/// Registry snapshot keyed by device identifier.
pub type DeviceMap = BTreeMap<String, Device>;

// -- Scans --------------------------------------------------------------------

/// Parameters of one scan, as submitted by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Target device identifier.
    #[serde(alias = "scanner")]
    pub device: String,
    /// Resolution in DPI, must be positive.
    pub resolution: u32,
    /// Free-form source name such as "ADF" or "Flatbed".
    pub source: String,
    /// Free-form colour mode such as "Gray" or "Color".
    pub mode: String,
    /// Output filename; empty means a timestamped name.
    #[serde(default)]
    pub filename: String,
}

impl ScanRequest {
    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(ScanwerkError::InvalidRequest("no device selected".into()));
        }
        if self.resolution == 0 {
            return Err(ScanwerkError::InvalidRequest(
                "resolution must be a positive number of DPI".into(),
            ));
        }
        Ok(())
    }

    /// Whether the request drains the automatic document feeder.
    pub fn uses_feeder(&self) -> bool {
        self.source == ADF_SOURCE
    }

    /// Request for the second pass of a duplex scan: same device and
    /// settings, written next to the frontside as `<front>_backside.pdf`.
    pub fn backside_of(&self, frontside: &Path) -> Self {
        let front_name = frontside
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            filename: format!("{front_name}_backside.pdf"),
            ..self.clone()
        }
    }
}

/// Outcome of one scan pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Path of the written PDF relative to the scan directory, `None` when no
    /// page was captured.
    pub file: Option<PathBuf>,
    pub pages: usize,
}

impl ScanResult {
    pub fn empty() -> Self {
        Self {
            file: None,
            pages: 0,
        }
    }

    pub fn written(file: PathBuf, pages: usize) -> Self {
        Self {
            file: Some(file),
            pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_none()
    }
}

/// Per-device session state as exposed to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// A scan is running on the device.
    pub busy: bool,
    /// A job for the device waits for the scan worker.
    pub queued: bool,
    pub has_pending_frontside: bool,
    pub pending_frontside: Option<PathBuf>,
    /// Plain-language message of the last failed job.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(kind: OptionKind, constraint: Option<OptionConstraint>) -> ScanOption {
        ScanOption {
            index: 1,
            name: Some("test".into()),
            title: "Test".into(),
            description: None,
            kind,
            unit: OptionUnit::None,
            size: 4,
            capabilities: capability::SOFT_SELECT,
            constraint,
        }
    }

    #[test]
    fn group_and_button_reject_constraints() {
        let range = OptionConstraint::Range {
            min: 0.0,
            max: 1.0,
            step: 0.0,
        };
        assert!(option(OptionKind::Group, None).validate().is_ok());
        assert!(option(OptionKind::Group, Some(range.clone())).validate().is_err());
        assert!(option(OptionKind::Button, Some(range.clone())).validate().is_err());
        assert!(option(OptionKind::Bool, Some(range)).validate().is_err());
    }

    #[test]
    fn constraint_shape_must_follow_kind() {
        let strings = OptionConstraint::StringList {
            values: vec!["ADF".into()],
        };
        let ints = OptionConstraint::IntList {
            values: vec![150, 300],
        };
        let reals = OptionConstraint::FloatList {
            values: vec![0.5, 1.0],
        };
        assert!(option(OptionKind::String, Some(strings.clone())).validate().is_ok());
        assert!(option(OptionKind::Int, Some(strings)).validate().is_err());
        assert!(option(OptionKind::Int, Some(ints.clone())).validate().is_ok());
        assert!(option(OptionKind::Fixed, Some(ints)).validate().is_err());
        assert!(option(OptionKind::Fixed, Some(reals.clone())).validate().is_ok());
        assert!(option(OptionKind::String, Some(reals)).validate().is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let range = OptionConstraint::Range {
            min: 600.0,
            max: 75.0,
            step: 1.0,
        };
        assert!(option(OptionKind::Int, Some(range)).validate().is_err());
    }

    #[test]
    fn capability_helpers_read_the_bitmask() {
        let mut opt = option(OptionKind::Int, None);
        assert!(opt.is_settable());
        assert!(opt.is_active());
        opt.capabilities = capability::INACTIVE | capability::ADVANCED;
        assert!(!opt.is_settable());
        assert!(!opt.is_active());
        assert!(opt.is_advanced());
    }

    #[test]
    fn kind_codes_round_trip_and_reject_unknown() {
        for code in 0..=5 {
            let kind = OptionKind::from_code(code).expect("known code");
            assert_eq!(kind.code(), code);
        }
        assert!(OptionKind::from_code(6).is_none());
        assert!(OptionUnit::from_code(7).is_none());
    }

    #[test]
    fn backside_request_keeps_settings_and_derives_name() {
        let front = ScanRequest {
            device: "sim:0".into(),
            resolution: 300,
            source: "ADF".into(),
            mode: "Gray".into(),
            filename: String::new(),
        };
        let back = front.backside_of(Path::new("report.pdf"));
        assert_eq!(back.filename, "report.pdf_backside.pdf");
        assert_eq!(back.device, front.device);
        assert_eq!(back.resolution, 300);
        assert_eq!(back.source, "ADF");
        assert_eq!(back.mode, "Gray");
    }

    #[test]
    fn request_validation_rejects_zero_resolution() {
        let request = ScanRequest {
            device: "sim:0".into(),
            resolution: 0,
            source: "Flatbed".into(),
            mode: "Color".into(),
            filename: String::new(),
        };
        assert!(matches!(
            request.validate(),
            Err(ScanwerkError::InvalidRequest(_))
        ));
    }

    #[test]
    fn request_accepts_legacy_scanner_field() {
        let request: ScanRequest = serde_json::from_str(
            r#"{"scanner":"sim:0","resolution":150,"source":"Flatbed","mode":"Gray"}"#,
        )
        .expect("parse request");
        assert_eq!(request.device, "sim:0");
        assert!(request.filename.is_empty());
        assert!(!request.uses_feeder());
    }
}
