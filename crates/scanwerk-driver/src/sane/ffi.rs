// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// libsane C API (SANE standard 1.0, `sane/sane.h`).

use std::ffi::{c_char, c_int, c_void};

pub type SaneWord = c_int;
pub type SaneStatus = c_int;
pub type SaneHandle = *mut c_void;

/// `SANE_ACTION_GET_VALUE`
pub const ACTION_GET_VALUE: c_int = 0;
/// `SANE_ACTION_SET_VALUE`
pub const ACTION_SET_VALUE: c_int = 1;

#[repr(C)]
pub struct SaneDevice {
    pub name: *const c_char,
    pub vendor: *const c_char,
    pub model: *const c_char,
    pub type_: *const c_char,
}

#[repr(C)]
pub struct SaneRange {
    pub min: SaneWord,
    pub max: SaneWord,
    pub quant: SaneWord,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union SaneConstraint {
    pub string_list: *const *const c_char,
    /// First word is the number of entries that follow.
    pub word_list: *const SaneWord,
    pub range: *const SaneRange,
}

#[repr(C)]
pub struct SaneOptionDescriptor {
    pub name: *const c_char,
    pub title: *const c_char,
    pub desc: *const c_char,
    pub type_: c_int,
    pub unit: c_int,
    pub size: SaneWord,
    pub cap: SaneWord,
    pub constraint_type: c_int,
    pub constraint: SaneConstraint,
}

#[repr(C)]
#[derive(Default)]
pub struct SaneParameters {
    pub format: c_int,
    pub last_frame: SaneWord,
    pub bytes_per_line: SaneWord,
    pub pixels_per_line: SaneWord,
    /// -1 when unknown until the frame is read.
    pub lines: SaneWord,
    pub depth: SaneWord,
}

pub type SaneAuthCallback =
    Option<unsafe extern "C" fn(resource: *const c_char, username: *mut c_char, password: *mut c_char)>;

#[link(name = "sane")]
unsafe extern "C" {
    pub fn sane_init(version_code: *mut SaneWord, authorize: SaneAuthCallback) -> SaneStatus;
    pub fn sane_exit();
    pub fn sane_get_devices(
        device_list: *mut *const *const SaneDevice,
        local_only: SaneWord,
    ) -> SaneStatus;
    pub fn sane_open(devicename: *const c_char, handle: *mut SaneHandle) -> SaneStatus;
    pub fn sane_close(handle: SaneHandle);
    pub fn sane_get_option_descriptor(
        handle: SaneHandle,
        option: SaneWord,
    ) -> *const SaneOptionDescriptor;
    pub fn sane_control_option(
        handle: SaneHandle,
        option: SaneWord,
        action: c_int,
        value: *mut c_void,
        info: *mut SaneWord,
    ) -> SaneStatus;
    pub fn sane_get_parameters(handle: SaneHandle, params: *mut SaneParameters) -> SaneStatus;
    pub fn sane_start(handle: SaneHandle) -> SaneStatus;
    pub fn sane_read(
        handle: SaneHandle,
        data: *mut u8,
        max_length: SaneWord,
        length: *mut SaneWord,
    ) -> SaneStatus;
    pub fn sane_cancel(handle: SaneHandle);
    pub fn sane_strstatus(status: SaneStatus) -> *const c_char;
}
