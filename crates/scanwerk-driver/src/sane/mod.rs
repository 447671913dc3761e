// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SANE backend — local and network scanners through libsane.
//
// The C bindings and the backend itself are gated behind the `sane` cargo
// feature because they link against the system libsane. The conversions from
// SANE records (option descriptors, status codes, image frames) are plain Rust
// and always compiled.
//
// ## ABI Safety
//
// Unsafe code falls into two categories:
//
// 1. **C calls** (`sane_*`): libsane keeps global state and is not
//    reentrant. The scan service serialises every driver session through its
//    hardware gate, so no two calls ever overlap.
//
// 2. **Reading driver-owned memory** (device list, option descriptors,
//    constraint lists): pointers returned by libsane stay valid until the next
//    call on the same handle. Everything is copied into owned Rust values
//    before that call is made.

pub mod convert;

#[cfg(feature = "sane")]
mod backend;
#[cfg(feature = "sane")]
mod ffi;

#[cfg(feature = "sane")]
pub use backend::SaneBackend;
