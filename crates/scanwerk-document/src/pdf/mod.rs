// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — page creation, page import, and duplex interleaving.

pub mod reader;
pub mod writer;

pub use reader::{PdfReader, ScanDocument, interleave_duplex};
pub use writer::PdfWriter;
