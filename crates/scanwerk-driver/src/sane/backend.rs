// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ScannerBackend and DeviceHandle on top of libsane.

use std::ffi::{CStr, CString, c_char, c_void};
use std::ptr;

use image::DynamicImage;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{OptionKind, capability};
use tracing::{debug, info, warn};

use super::convert::{self, FrameParams, RawConstraint, RawOption, STATUS_EOF, STATUS_GOOD, STATUS_NO_DOCS};
use super::ffi;
use crate::traits::{DeviceHandle, DeviceInfo, OptionDescriptor, ScannerBackend};

/// Bytes requested per `sane_read`.
const READ_CHUNK: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Copy a driver-owned C string. Null reads as `None`.
///
/// # Safety
///
/// `ptr` must be null or point to a nul-terminated string valid for the call.
unsafe fn owned_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null and nul-terminated per the caller's contract.
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

fn status_text(status: ffi::SaneStatus) -> String {
    // SAFETY: sane_strstatus returns a static string for every status value.
    unsafe { owned_str(ffi::sane_strstatus(status)) }.unwrap_or_else(|| format!("status {status}"))
}

fn check(status: ffi::SaneStatus, call: &str) -> Result<()> {
    if status == STATUS_GOOD {
        Ok(())
    } else {
        Err(convert::status_error(status, &format!("{call}: {}", status_text(status))))
    }
}

/// Copy an option descriptor, constraint included, into owned values.
///
/// # Safety
///
/// `desc` must come from `sane_get_option_descriptor` on a handle that has
/// seen no call since.
unsafe fn copy_descriptor(index: u32, desc: &ffi::SaneOptionDescriptor) -> RawOption {
    // SAFETY: the union member read matches `constraint_type`. Word lists are
    // length-prefixed and string lists null-terminated per the SANE standard.
    let constraint = unsafe {
        match desc.constraint_type {
            convert::CONSTRAINT_RANGE if !desc.constraint.range.is_null() => {
                let range = &*desc.constraint.range;
                RawConstraint::Range {
                    min: range.min,
                    max: range.max,
                    quant: range.quant,
                }
            }
            convert::CONSTRAINT_WORD_LIST if !desc.constraint.word_list.is_null() => {
                let list = desc.constraint.word_list;
                let len = usize::try_from(*list).unwrap_or_default();
                RawConstraint::WordList(std::slice::from_raw_parts(list.add(1), len).to_vec())
            }
            convert::CONSTRAINT_STRING_LIST if !desc.constraint.string_list.is_null() => {
                let mut values = Vec::new();
                let mut cursor = desc.constraint.string_list;
                while !(*cursor).is_null() {
                    values.extend(owned_str(*cursor));
                    cursor = cursor.add(1);
                }
                RawConstraint::StringList(values)
            }
            _ => RawConstraint::None,
        }
    };

    // SAFETY: descriptor strings are null or nul-terminated.
    let (name, title, description) =
        unsafe { (owned_str(desc.name), owned_str(desc.title), owned_str(desc.desc)) };

    RawOption {
        index,
        name,
        title,
        description,
        type_code: desc.type_ as u32,
        unit_code: desc.unit as u32,
        size: desc.size as u32,
        capabilities: desc.cap as u32,
        constraint,
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Scanners reachable through libsane, local or via `saned`.
#[derive(Debug, Default)]
pub struct SaneBackend;

impl ScannerBackend for SaneBackend {
    fn name(&self) -> &str {
        "sane"
    }

    fn init(&self) -> Result<()> {
        let mut version: ffi::SaneWord = 0;
        // SAFETY: version is a valid out-pointer; no auth callback is installed.
        let status = unsafe { ffi::sane_init(&mut version, None) };
        check(status, "sane_init")?;
        debug!(
            major = (version >> 24) & 0xff,
            minor = (version >> 16) & 0xff,
            "libsane initialised"
        );
        Ok(())
    }

    fn shutdown(&self) {
        // SAFETY: handles from this session are dropped before the session ends.
        unsafe { ffi::sane_exit() };
        debug!("libsane shut down");
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut list: *const *const ffi::SaneDevice = ptr::null();
        // SAFETY: list is a valid out-pointer.
        let status = unsafe { ffi::sane_get_devices(&mut list, 0) };
        check(status, "sane_get_devices")
            .map_err(|err| ScanwerkError::Enumeration(err.to_string()))?;

        let mut devices = Vec::new();
        if list.is_null() {
            return Ok(devices);
        }

        // SAFETY: list is a null-terminated array that stays valid until the
        // next sane_get_devices or sane_exit. Records are copied in the loop.
        unsafe {
            let mut cursor = list;
            while !(*cursor).is_null() {
                let device = &**cursor;
                if let Some(id) = owned_str(device.name) {
                    devices.push(DeviceInfo {
                        id,
                        vendor: owned_str(device.vendor).unwrap_or_default(),
                        model: owned_str(device.model).unwrap_or_default(),
                        type_info: owned_str(device.type_).unwrap_or_default(),
                    });
                }
                cursor = cursor.add(1);
            }
        }

        info!(count = devices.len(), "sane devices listed");
        Ok(devices)
    }

    fn open<'a>(&'a self, device_id: &str) -> Result<Box<dyn DeviceHandle + 'a>> {
        let name = CString::new(device_id).map_err(|_| {
            ScanwerkError::DeviceUnavailable(format!("{device_id}: invalid device name"))
        })?;
        let mut raw: ffi::SaneHandle = ptr::null_mut();
        // SAFETY: name is nul-terminated and outlives the call; raw is a valid
        // out-pointer.
        let status = unsafe { ffi::sane_open(name.as_ptr(), &mut raw) };
        if status != STATUS_GOOD {
            return Err(ScanwerkError::DeviceUnavailable(format!(
                "{device_id}: {}",
                status_text(status)
            )));
        }

        info!(device = device_id, "sane device opened");
        Ok(Box::new(SaneHandle {
            raw,
            device: device_id.to_owned(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Device handle
// ---------------------------------------------------------------------------

struct SaneHandle {
    raw: ffi::SaneHandle,
    device: String,
}

impl SaneHandle {
    fn option_count(&self) -> Result<u32> {
        let mut count: ffi::SaneWord = 0;
        // SAFETY: option 0 is the word-sized option count on every device.
        let status = unsafe {
            ffi::sane_control_option(
                self.raw,
                0,
                ffi::ACTION_GET_VALUE,
                (&mut count as *mut ffi::SaneWord).cast::<c_void>(),
                ptr::null_mut(),
            )
        };
        check(status, "read option count")?;
        Ok(u32::try_from(count).unwrap_or_default())
    }

    /// Every option after the count, in device order.
    fn raw_options(&self) -> Result<Vec<RawOption>> {
        let count = self.option_count()?;
        let mut options = Vec::new();
        for index in 1..count {
            // SAFETY: raw is open and index is below the option count.
            let desc = unsafe { ffi::sane_get_option_descriptor(self.raw, index as ffi::SaneWord) };
            if desc.is_null() {
                continue;
            }
            // SAFETY: non-null descriptor, copied before the next driver call.
            options.push(unsafe { copy_descriptor(index, &*desc) });
        }
        Ok(options)
    }

    /// The named option if the device offers it and it is active.
    fn settable(&self, name: &str) -> Result<Option<RawOption>> {
        let option = self
            .raw_options()?
            .into_iter()
            .find(|option| option.name.as_deref() == Some(name));
        match option {
            Some(option) if option.capabilities & capability::INACTIVE == 0 => Ok(Some(option)),
            Some(_) => {
                warn!(device = %self.device, option = name, "option inactive, left unchanged");
                Ok(None)
            }
            None => {
                warn!(device = %self.device, option = name, "device has no such option");
                Ok(None)
            }
        }
    }

    fn set_value(&self, option: &RawOption, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < option.size as usize {
            return Err(ScanwerkError::InvalidOption(format!(
                "value for option {} needs {} bytes",
                option.index, option.size
            )));
        }
        let mut info: ffi::SaneWord = 0;
        // SAFETY: buffer holds at least `size` bytes in the option's encoding.
        let status = unsafe {
            ffi::sane_control_option(
                self.raw,
                option.index as ffi::SaneWord,
                ffi::ACTION_SET_VALUE,
                buffer.as_mut_ptr().cast::<c_void>(),
                &mut info,
            )
        };
        check(status, &format!("set {}", option.name.as_deref().unwrap_or("option")))
    }

    fn set_string(&self, name: &str, value: &str) -> Result<()> {
        let Some(option) = self.settable(name)? else {
            return Ok(());
        };
        if option.type_code != OptionKind::String.code() {
            return Err(ScanwerkError::InvalidOption(format!(
                "{}: option {name} does not take text",
                self.device
            )));
        }
        let mut buffer = convert::encode_string(value, option.size)?;
        self.set_value(&option, &mut buffer)?;
        debug!(device = %self.device, option = name, value, "option set");
        Ok(())
    }

    fn start(&self) -> ffi::SaneStatus {
        // SAFETY: raw is open.
        unsafe { ffi::sane_start(self.raw) }
    }

    fn cancel(&self) {
        // SAFETY: raw is open; cancelling an idle handle is a no-op.
        unsafe { ffi::sane_cancel(self.raw) }
    }

    /// Read the frame started by the last `sane_start` to its end.
    fn read_frame(&self) -> Result<DynamicImage> {
        let mut params = ffi::SaneParameters::default();
        // SAFETY: params is a valid out-pointer.
        let status = unsafe { ffi::sane_get_parameters(self.raw, &mut params) };
        check(status, "sane_get_parameters")?;

        let mut data = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let mut length: ffi::SaneWord = 0;
            // SAFETY: chunk holds READ_CHUNK bytes and the driver writes at
            // most max_length of them.
            let status = unsafe {
                ffi::sane_read(
                    self.raw,
                    chunk.as_mut_ptr(),
                    READ_CHUNK as ffi::SaneWord,
                    &mut length,
                )
            };
            match status {
                STATUS_GOOD => {
                    let length = usize::try_from(length).unwrap_or_default().min(READ_CHUNK);
                    data.extend_from_slice(&chunk[..length]);
                }
                STATUS_EOF => break,
                other => check(other, "sane_read")?,
            }
        }

        let frame = FrameParams {
            format: params.format,
            bytes_per_line: usize::try_from(params.bytes_per_line).unwrap_or_default(),
            pixels_per_line: usize::try_from(params.pixels_per_line).unwrap_or_default(),
            lines: usize::try_from(params.lines).ok(),
            depth: u32::try_from(params.depth).unwrap_or_default(),
        };
        debug!(device = %self.device, bytes = data.len(), ?frame, "frame read");
        convert::frame_to_image(&frame, &data)
    }
}

impl DeviceHandle for SaneHandle {
    fn options(&self) -> Result<Vec<OptionDescriptor>> {
        Ok(self
            .raw_options()?
            .into_iter()
            .map(RawOption::into_descriptor)
            .collect())
    }

    fn set_source(&mut self, source: &str) -> Result<()> {
        self.set_string("source", source)
    }

    fn set_resolution(&mut self, dpi: u32) -> Result<()> {
        let Some(option) = self.settable("resolution")? else {
            return Ok(());
        };
        let word = if option.is_fixed() {
            convert::fix(f64::from(dpi))
        } else if option.type_code == OptionKind::Int.code() {
            i32::try_from(dpi).map_err(|_| {
                ScanwerkError::InvalidOption(format!("resolution {dpi} out of range"))
            })?
        } else {
            return Err(ScanwerkError::InvalidOption(format!(
                "{}: resolution is not numeric",
                self.device
            )));
        };
        self.set_value(&option, &mut word.to_ne_bytes())?;
        debug!(device = %self.device, dpi, "resolution set");
        Ok(())
    }

    fn set_mode(&mut self, mode: &str) -> Result<()> {
        self.set_string("mode", mode)
    }

    fn scan_one(&mut self) -> Result<DynamicImage> {
        let page = check(self.start(), "sane_start").and_then(|()| self.read_frame());
        self.cancel();
        page
    }

    fn scan_sequence<'s>(&'s mut self) -> Box<dyn Iterator<Item = Result<DynamicImage>> + 's> {
        Box::new(FeederPages {
            handle: self,
            finished: false,
        })
    }
}

impl Drop for SaneHandle {
    fn drop(&mut self) {
        // SAFETY: raw came from sane_open and is closed exactly once.
        unsafe { ffi::sane_close(self.raw) };
        debug!(device = %self.device, "sane device closed");
    }
}

/// Pages pulled from the feeder, one `sane_start` per sheet. An empty feeder
/// ends the sequence.
struct FeederPages<'s> {
    handle: &'s SaneHandle,
    finished: bool,
}

impl FeederPages<'_> {
    fn finish(&mut self) {
        self.finished = true;
        self.handle.cancel();
    }
}

impl Iterator for FeederPages<'_> {
    type Item = Result<DynamicImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let page = match self.handle.start() {
            STATUS_GOOD => self.handle.read_frame(),
            STATUS_NO_DOCS => {
                self.finish();
                return None;
            }
            status => check(status, "sane_start").and_then(|()| self.handle.read_frame()),
        };
        if page.is_err() {
            self.finish();
        }
        Some(page)
    }
}

impl Drop for FeederPages<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.handle.cancel();
        }
    }
}
