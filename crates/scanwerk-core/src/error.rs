// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.

use thiserror::Error;

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanwerkError {
    // -- Device errors --
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("device enumeration failed: {0}")]
    Enumeration(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("no scanner backend available")]
    BackendUnavailable,

    // -- Scan errors --
    #[error("scan failed: {0}")]
    ScanFailed(String),

    #[error("invalid scan request: {0}")]
    InvalidRequest(String),

    #[error("device busy: {0}")]
    DeviceBusy(String),

    #[error("no frontside scan pending for {0}")]
    NoPendingFrontside(String),

    #[error("page count mismatch: frontside has {front} pages, backside has {back}")]
    PageCountMismatch { front: usize, back: usize },

    #[error("scan queue is not accepting jobs")]
    QueueClosed,

    // -- Document errors --
    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("image encoding failed: {0}")]
    Image(String),

    // -- Configuration / storage --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanwerkError>;
