// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for scanner drivers.
//
// The driver layer is global state and not reentrant: callers must wrap every
// use in one `init`/`shutdown` session and never overlap two sessions.

use image::DynamicImage;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{OptionConstraint, OptionKind, OptionUnit, ScanOption};

/// A device as listed by the driver, before its options are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub vendor: String,
    pub model: String,
    pub type_info: String,
}

/// One option record exactly as the driver describes it.
///
/// Converted into a validated [`ScanOption`] at the registry boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDescriptor {
    pub index: u32,
    pub name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub type_code: u32,
    pub unit_code: u32,
    pub size: u32,
    pub capabilities: u32,
    pub constraint: Option<OptionConstraint>,
}

impl OptionDescriptor {
    /// Decode type and unit codes and check the constraint shape.
    pub fn into_option(self) -> Result<ScanOption> {
        let kind = OptionKind::from_code(self.type_code).ok_or_else(|| {
            ScanwerkError::InvalidOption(format!(
                "option {} ({}) has unknown type code {}",
                self.index, self.title, self.type_code
            ))
        })?;
        let unit = OptionUnit::from_code(self.unit_code).ok_or_else(|| {
            ScanwerkError::InvalidOption(format!(
                "option {} ({}) has unknown unit code {}",
                self.index, self.title, self.unit_code
            ))
        })?;

        let option = ScanOption {
            index: self.index,
            name: self.name,
            title: self.title,
            description: self.description,
            kind,
            unit,
            size: self.size,
            capabilities: self.capabilities,
            constraint: self.constraint,
        };
        option.validate()?;
        Ok(option)
    }
}

/// Entry point of a scanner driver.
pub trait ScannerBackend: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Initialise the driver subsystem. Must precede every other call.
    fn init(&self) -> Result<()>;

    /// Tear the driver subsystem down. Closes nothing the caller still holds.
    fn shutdown(&self);

    /// List attached devices.
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Open a device. Fails with `DeviceUnavailable` when it cannot be opened.
    /// The device is closed when the handle is dropped.
    fn open<'a>(&'a self, device_id: &str) -> Result<Box<dyn DeviceHandle + 'a>>;
}

/// An open scanning device.
pub trait DeviceHandle {
    /// Option descriptors in device order.
    fn options(&self) -> Result<Vec<OptionDescriptor>>;

    fn set_source(&mut self, source: &str) -> Result<()>;

    fn set_resolution(&mut self, dpi: u32) -> Result<()>;

    fn set_mode(&mut self, mode: &str) -> Result<()>;

    /// Acquire exactly one page.
    fn scan_one(&mut self) -> Result<DynamicImage>;

    /// Pull pages from the feeder until it runs empty.
    ///
    /// The sequence is finite and cannot be restarted; an empty feeder ends
    /// it normally. A device fault yields one `Err` item.
    fn scan_sequence<'s>(&'s mut self) -> Box<dyn Iterator<Item = Result<DynamicImage>> + 's>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(type_code: u32, constraint: Option<OptionConstraint>) -> OptionDescriptor {
        OptionDescriptor {
            index: 2,
            name: Some("mode".into()),
            title: "Scan mode".into(),
            description: None,
            type_code,
            unit_code: 0,
            size: 32,
            capabilities: 5,
            constraint,
        }
    }

    #[test]
    fn string_option_with_string_list_converts() {
        let option = descriptor(
            3,
            Some(OptionConstraint::StringList {
                values: vec!["Gray".into(), "Color".into()],
            }),
        )
        .into_option()
        .expect("valid option");
        assert_eq!(option.kind, OptionKind::String);
        assert_eq!(option.choices(), vec!["Gray", "Color"]);
    }

    #[test]
    fn unknown_type_code_is_rejected() {
        assert!(matches!(
            descriptor(9, None).into_option(),
            Err(ScanwerkError::InvalidOption(_))
        ));
    }

    #[test]
    fn mismatched_constraint_is_rejected() {
        let result = descriptor(5, Some(OptionConstraint::IntList { values: vec![1] }))
            .into_option();
        assert!(matches!(result, Err(ScanwerkError::InvalidOption(_))));
    }
}
