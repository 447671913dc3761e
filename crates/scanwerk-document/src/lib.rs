// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-document — Document assembly for the Scanwerk scan server.
//
// Turns scanned page images into single-page PDFs, collects them into an
// output document, and interleaves the two passes of a duplex scan.

pub mod pdf;

// Re-export the primary items so callers can use `scanwerk_document::PdfReader` etc.
pub use pdf::reader::{PdfReader, ScanDocument, interleave_duplex};
pub use pdf::writer::{JPEG_QUALITY, PdfWriter};
