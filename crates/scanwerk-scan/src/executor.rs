// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan executor — drives one device through one scan and writes the PDF.
//
// Callers must already hold exclusive hardware access. Pages are encoded in a
// scoped working directory and collected in memory; the PDF is written only
// after the last page arrived, so a failed scan leaves nothing behind.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use image::DynamicImage;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{ScanRequest, ScanResult};
use scanwerk_document::{PdfReader, PdfWriter, ScanDocument};
use scanwerk_driver::ScannerBackend;
use tracing::{debug, info, instrument, warn};

/// Runs scans into a fixed output directory.
#[derive(Debug, Clone)]
pub struct ScanExecutor {
    scan_dir: PathBuf,
}

impl ScanExecutor {
    pub fn new(scan_dir: impl Into<PathBuf>) -> Self {
        Self {
            scan_dir: scan_dir.into(),
        }
    }

    pub fn scan_dir(&self) -> &Path {
        &self.scan_dir
    }

    /// Scan with the current local time for default filenames.
    pub fn execute(&self, backend: &dyn ScannerBackend, request: &ScanRequest) -> Result<ScanResult> {
        self.execute_at(backend, request, Local::now().naive_local())
    }

    #[instrument(skip(self, backend, request), fields(device = %request.device, source = %request.source, resolution = request.resolution))]
    pub fn execute_at(
        &self,
        backend: &dyn ScannerBackend,
        request: &ScanRequest,
        now: NaiveDateTime,
    ) -> Result<ScanResult> {
        let mut handle = backend.open(&request.device)?;
        handle.set_source(&request.source)?;
        handle.set_resolution(request.resolution)?;
        handle.set_mode(&request.mode)?;

        let target = target_filename(&request.filename, now);
        let workdir = tempfile::tempdir()?;
        let writer = PdfWriter::new(workdir.path(), request.resolution);
        let mut output = ScanDocument::new();

        if request.uses_feeder() {
            for (index, page) in handle.scan_sequence().enumerate() {
                let page = page.map_err(as_scan_failure)?;
                append_image(&writer, &mut output, &page, index)?;
            }
        } else {
            let page = handle.scan_one().map_err(as_scan_failure)?;
            append_image(&writer, &mut output, &page, 0)?;
        }
        drop(handle);

        if output.is_empty() {
            warn!("no pages scanned, nothing written");
            return Ok(ScanResult::empty());
        }

        std::fs::create_dir_all(&self.scan_dir)?;
        output.save(&self.scan_dir.join(&target))?;

        info!(file = %target, pages = output.page_count(), "scan written");
        Ok(ScanResult::written(PathBuf::from(target), output.page_count()))
    }
}

fn append_image(
    writer: &PdfWriter,
    output: &mut ScanDocument,
    image: &DynamicImage,
    index: usize,
) -> Result<()> {
    let bytes = writer.image_page(image, index)?;
    let page = PdfReader::from_bytes(&bytes)?;
    output.append_page(&page, 1)?;
    debug!(index, "page added");
    Ok(())
}

/// Device faults during acquisition surface as `ScanFailed`.
fn as_scan_failure(err: ScanwerkError) -> ScanwerkError {
    match err {
        ScanwerkError::ScanFailed(_) => err,
        other => ScanwerkError::ScanFailed(other.to_string()),
    }
}

/// Output filename for a scan.
///
/// Only the base name of `requested` is kept. An empty name (or one without
/// a base name) becomes `Scan_<YYYY-MM-DD_HH_MM_SS>.pdf`. `.pdf` is appended
/// unless the name already ends in exactly `.pdf`.
pub fn target_filename(requested: &str, now: NaiveDateTime) -> String {
    let base = requested
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let base = match base {
        "" | "." | ".." => now.format("Scan_%Y-%m-%d_%H_%M_%S.pdf").to_string(),
        name => name.to_owned(),
    };

    if Path::new(&base).extension().is_some_and(|ext| ext == "pdf") {
        base
    } else {
        format!("{base}.pdf")
    }
}
