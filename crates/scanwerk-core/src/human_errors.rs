// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the scan pages.
//
// The web views never show a raw error. Every technical error is mapped to a
// plain sentence plus a suggestion, and the view falls back to the last form
// that worked.

use serde::Serialize;

use crate::error::ScanwerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Trying again is likely to work.
    Transient,
    /// The user must do something first (load paper, pick a device).
    ActionRequired,
    /// Retrying will not help.
    Permanent,
}

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

impl std::fmt::Display for HumanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.message, self.suggestion)
    }
}

/// Convert a `ScanwerkError` into a `HumanError`.
pub fn humanize_error(err: &ScanwerkError) -> HumanError {
    match err {
        ScanwerkError::DeviceUnavailable(_) => HumanError {
            message: "The scanner can't be reached.".into(),
            suggestion: "Check that it is switched on and connected, then refresh the scanner list.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanwerkError::UnknownDevice(id) => HumanError {
            message: "That scanner isn't in the list.".into(),
            suggestion: format!("Refresh the scanner list and pick it again. ({id})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanwerkError::Enumeration(_) | ScanwerkError::InvalidOption(_) => HumanError {
            message: "A scanner reported settings we couldn't read.".into(),
            suggestion: "Refresh the scanner list. If the scanner stays missing, restart it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanwerkError::BackendUnavailable => HumanError {
            message: "Scanning isn't available on this server.".into(),
            suggestion: "Ask the administrator to enable a scanner backend.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanwerkError::ScanFailed(detail) => humanize_scan_failure(detail),

        ScanwerkError::InvalidRequest(detail) => HumanError {
            message: "Some scan settings are missing or wrong.".into(),
            suggestion: format!("Check the form and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanwerkError::NoPendingFrontside(_) => HumanError {
            message: "There is no front side waiting for its back side.".into(),
            suggestion: "Scan the front sides first, then flip the stack and scan the back sides.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanwerkError::DeviceBusy(_) => HumanError {
            message: "The scanner is still working on the last request.".into(),
            suggestion: "Wait for the scan to finish, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanwerkError::PageCountMismatch { front, back } => HumanError {
            message: "The back sides didn't match the front sides.".into(),
            suggestion: format!(
                "The front side had {front} pages but {back} back sides were scanned. The front side was kept on its own."
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanwerkError::QueueClosed => HumanError {
            message: "The scan service is shutting down.".into(),
            suggestion: "Wait a moment and reload the page.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanwerkError::Pdf(_) | ScanwerkError::Image(_) => HumanError {
            message: "The scanned pages couldn't be turned into a PDF.".into(),
            suggestion: "Try scanning again. If it keeps failing, try a lower resolution.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanwerkError::Config(_) => HumanError {
            message: "The server configuration has a problem.".into(),
            suggestion: "Ask the administrator to check the configuration file.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanwerkError::Io(_) | ScanwerkError::Serialization(_) => HumanError {
            message: "The scan couldn't be saved.".into(),
            suggestion: "Check that the scan folder exists and has free space.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

/// Map driver failure details to specific advice.
fn humanize_scan_failure(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("jam") {
        HumanError {
            message: "Paper is stuck in the scanner.".into(),
            suggestion: "Open the feeder, remove the stuck sheet, and scan again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("no docs") || lower.contains("empty") {
        HumanError {
            message: "The document feeder is empty.".into(),
            suggestion: "Load the pages into the feeder and scan again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("cover open") || lower.contains("cover-open") {
        HumanError {
            message: "The scanner lid or feeder cover is open.".into(),
            suggestion: "Close it and scan again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else {
        HumanError {
            message: "The scanner stopped in the middle of the scan.".into(),
            suggestion: format!("Nothing was saved. Try again. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}
