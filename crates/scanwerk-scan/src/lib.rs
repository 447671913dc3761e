// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-scan — Scan orchestration for the Scanwerk scan server.
//
// Serializes access to the scanner driver, keeps the device registry and the
// per-device session state, runs scans into PDFs, and assembles two-pass
// duplex documents. Web handlers talk to `ScanService` only.

pub mod access;
pub mod duplex;
pub mod executor;
pub mod queue;
pub mod registry;
pub mod service;
pub mod state;

pub use duplex::{DuplexCoordinator, DuplexOutcome};
pub use executor::{ScanExecutor, target_filename};
pub use service::{ScanService, Submission};
pub use state::SessionStore;
