// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conversions between SANE wire values and Scanwerk types.

use image::{DynamicImage, GrayImage, RgbImage};
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{OptionConstraint, OptionKind};

use crate::traits::OptionDescriptor;

// -- Status codes -------------------------------------------------------------

pub const STATUS_GOOD: i32 = 0;
pub const STATUS_UNSUPPORTED: i32 = 1;
pub const STATUS_CANCELLED: i32 = 2;
pub const STATUS_DEVICE_BUSY: i32 = 3;
pub const STATUS_INVAL: i32 = 4;
pub const STATUS_EOF: i32 = 5;
pub const STATUS_JAMMED: i32 = 6;
pub const STATUS_NO_DOCS: i32 = 7;
pub const STATUS_COVER_OPEN: i32 = 8;
pub const STATUS_IO_ERROR: i32 = 9;
pub const STATUS_NO_MEM: i32 = 10;
pub const STATUS_ACCESS_DENIED: i32 = 11;

// -- Descriptor and frame codes -----------------------------------------------

pub const CONSTRAINT_NONE: i32 = 0;
pub const CONSTRAINT_RANGE: i32 = 1;
pub const CONSTRAINT_WORD_LIST: i32 = 2;
pub const CONSTRAINT_STRING_LIST: i32 = 3;

pub const FRAME_GRAY: i32 = 0;
pub const FRAME_RGB: i32 = 1;

/// `SANE_Fixed` carries 16 fractional bits.
const FIXED_SCALE: f64 = 65536.0;

pub fn unfix(word: i32) -> f64 {
    f64::from(word) / FIXED_SCALE
}

pub fn fix(value: f64) -> i32 {
    (value * FIXED_SCALE).round() as i32
}

/// Constraint of an option, values still in wire form.
#[derive(Debug, Clone, PartialEq)]
pub enum RawConstraint {
    None,
    Range { min: i32, max: i32, quant: i32 },
    WordList(Vec<i32>),
    StringList(Vec<String>),
}

/// An option descriptor copied out of libsane.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOption {
    pub index: u32,
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub type_code: u32,
    pub unit_code: u32,
    pub size: u32,
    pub capabilities: u32,
    pub constraint: RawConstraint,
}

impl RawOption {
    pub fn is_fixed(&self) -> bool {
        self.type_code == OptionKind::Fixed.code()
    }

    /// Decode fixed-point words and drop empty strings. Type and unit codes
    /// pass through untouched; [`OptionDescriptor::into_option`] checks them.
    pub fn into_descriptor(self) -> OptionDescriptor {
        let fixed = self.is_fixed();
        let number = |word: i32| if fixed { unfix(word) } else { f64::from(word) };

        let constraint = match self.constraint {
            RawConstraint::None => None,
            RawConstraint::Range { min, max, quant } => Some(OptionConstraint::Range {
                min: number(min),
                max: number(max),
                step: number(quant),
            }),
            RawConstraint::WordList(words) if fixed => Some(OptionConstraint::FloatList {
                values: words.into_iter().map(unfix).collect(),
            }),
            RawConstraint::WordList(words) => Some(OptionConstraint::IntList {
                values: words.into_iter().map(i64::from).collect(),
            }),
            RawConstraint::StringList(values) => Some(OptionConstraint::StringList { values }),
        };

        let name = non_empty(self.name);
        OptionDescriptor {
            index: self.index,
            title: non_empty(self.title)
                .or_else(|| name.clone())
                .unwrap_or_default(),
            name,
            description: non_empty(self.description),
            type_code: self.type_code,
            unit_code: self.unit_code,
            size: self.size,
            capabilities: self.capabilities,
            constraint,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Map a failed status onto an error. `detail` names the call and carries
/// libsane's own message.
pub fn status_error(status: i32, detail: &str) -> ScanwerkError {
    match status {
        STATUS_JAMMED => ScanwerkError::ScanFailed(format!("paper jam ({detail})")),
        STATUS_NO_DOCS => ScanwerkError::ScanFailed(format!("no docs in the feeder ({detail})")),
        STATUS_COVER_OPEN => ScanwerkError::ScanFailed(format!("cover open ({detail})")),
        STATUS_DEVICE_BUSY | STATUS_ACCESS_DENIED => {
            ScanwerkError::DeviceUnavailable(detail.to_owned())
        }
        STATUS_INVAL | STATUS_UNSUPPORTED => ScanwerkError::InvalidOption(detail.to_owned()),
        _ => ScanwerkError::ScanFailed(detail.to_owned()),
    }
}

/// Encode a string option value: nul-terminated and padded to the option
/// size, as `sane_control_option` reads it.
pub fn encode_string(value: &str, size: u32) -> Result<Vec<u8>> {
    let size = size as usize;
    if value.as_bytes().contains(&0) || value.len() >= size {
        return Err(ScanwerkError::InvalidOption(format!(
            "value {value:?} does not fit a {size}-byte option"
        )));
    }
    let mut buf = value.as_bytes().to_vec();
    buf.resize(size, 0);
    Ok(buf)
}

/// Geometry of one frame as reported by `sane_get_parameters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameParams {
    pub format: i32,
    pub bytes_per_line: usize,
    pub pixels_per_line: usize,
    /// `None` when the driver does not know the height in advance.
    pub lines: Option<usize>,
    pub depth: u32,
}

/// Build an 8-bit image from raw frame bytes.
///
/// Handles single-pass gray and RGB frames. Line-art (depth 1) uses SANE's
/// convention of a set bit meaning black. 16-bit samples keep their high byte.
/// A trailing partial row is dropped.
pub fn frame_to_image(params: &FrameParams, data: &[u8]) -> Result<DynamicImage> {
    let channels = match params.format {
        FRAME_GRAY => 1,
        FRAME_RGB => 3,
        other => {
            return Err(ScanwerkError::ScanFailed(format!(
                "frame format {other} is not supported"
            )));
        }
    };
    let width = params.pixels_per_line;
    let row_bytes = match (channels, params.depth) {
        (1, 1) => width.div_ceil(8),
        (_, 8) => width * channels,
        (_, 16) => width * channels * 2,
        (_, depth) => {
            return Err(ScanwerkError::ScanFailed(format!(
                "{depth}-bit frames with {channels} channel(s) are not supported"
            )));
        }
    };
    if width == 0 || params.bytes_per_line < row_bytes {
        return Err(ScanwerkError::ScanFailed(format!(
            "frame rows of {} bytes cannot hold {width} pixels",
            params.bytes_per_line
        )));
    }

    let complete = data.len() / params.bytes_per_line;
    let lines = params.lines.map_or(complete, |lines| lines.min(complete));

    let mut pixels = Vec::with_capacity(width * channels * lines);
    for row in data.chunks_exact(params.bytes_per_line).take(lines) {
        match params.depth {
            1 => pixels.extend((0..width).map(|x| {
                if row[x / 8] & (0x80 >> (x % 8)) != 0 { 0 } else { 255 }
            })),
            8 => pixels.extend_from_slice(&row[..row_bytes]),
            _ => pixels.extend(
                row[..row_bytes]
                    .chunks_exact(2)
                    .map(|pair| (u16::from_ne_bytes([pair[0], pair[1]]) >> 8) as u8),
            ),
        }
    }

    let (width, height) = (dimension(width)?, dimension(lines)?);
    let image = if channels == 1 {
        GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
    } else {
        RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
    };
    image.ok_or_else(|| ScanwerkError::Image("frame buffer does not match its geometry".into()))
}

fn dimension(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ScanwerkError::ScanFailed(format!("frame dimension {value} is too large")))
}

#[cfg(test)]
mod tests {
    use scanwerk_core::human_errors::{Severity, humanize_error};
    use scanwerk_core::types::OptionUnit;

    use super::*;

    fn raw(name: &str, type_code: u32, unit_code: u32, constraint: RawConstraint) -> RawOption {
        RawOption {
            index: 4,
            name: Some(name.into()),
            title: Some(format!("{name} title")),
            description: Some(String::new()),
            type_code,
            unit_code,
            size: 4,
            capabilities: 5,
            constraint,
        }
    }

    #[test]
    fn fixed_range_is_decoded_to_reals() {
        let option = raw(
            "br-x",
            2,
            3,
            RawConstraint::Range {
                min: 0,
                max: 216 << 16,
                quant: 1 << 15,
            },
        )
        .into_descriptor()
        .into_option()
        .expect("valid option");

        assert_eq!(option.kind, OptionKind::Fixed);
        assert_eq!(option.unit, OptionUnit::Millimetre);
        assert_eq!(
            option.constraint,
            Some(OptionConstraint::Range {
                min: 0.0,
                max: 216.0,
                step: 0.5
            })
        );
        assert!(option.description.is_none());
    }

    #[test]
    fn word_lists_follow_the_option_type() {
        let resolution = raw("resolution", 1, 4, RawConstraint::WordList(vec![75, 150, 300]))
            .into_descriptor();
        assert_eq!(
            resolution.constraint,
            Some(OptionConstraint::IntList {
                values: vec![75, 150, 300]
            })
        );

        let gamma = raw("gamma", 2, 0, RawConstraint::WordList(vec![1 << 16, 3 << 15]))
            .into_descriptor();
        assert_eq!(
            gamma.constraint,
            Some(OptionConstraint::FloatList {
                values: vec![1.0, 1.5]
            })
        );
        assert!(gamma.into_option().is_ok());
    }

    #[test]
    fn group_records_without_names_keep_their_title() {
        let mut group = raw("", 5, 0, RawConstraint::None);
        group.title = Some("Geometry".into());

        let descriptor = group.into_descriptor();

        assert!(descriptor.name.is_none());
        assert_eq!(descriptor.title, "Geometry");
        assert_eq!(
            descriptor.into_option().expect("group").kind,
            OptionKind::Group
        );
    }

    #[test]
    fn string_list_converts_to_choices() {
        let option = raw(
            "source",
            3,
            0,
            RawConstraint::StringList(vec!["Flatbed".into(), "ADF".into()]),
        )
        .into_descriptor()
        .into_option()
        .expect("valid option");
        assert_eq!(option.choices(), vec!["Flatbed", "ADF"]);
    }

    #[test]
    fn feeder_statuses_reach_the_user_as_actions() {
        let jam = humanize_error(&status_error(STATUS_JAMMED, "sane_start: Document feeder jammed"));
        assert!(jam.message.contains("stuck"));

        let empty = humanize_error(&status_error(STATUS_NO_DOCS, "sane_start"));
        assert_eq!(empty.severity, Severity::ActionRequired);
        assert!(empty.message.contains("empty"));

        assert!(matches!(
            status_error(STATUS_DEVICE_BUSY, "sane_open"),
            ScanwerkError::DeviceUnavailable(_)
        ));
        assert!(matches!(
            status_error(STATUS_IO_ERROR, "sane_read"),
            ScanwerkError::ScanFailed(_)
        ));
    }

    #[test]
    fn string_values_are_padded_and_bounded() {
        assert_eq!(encode_string("ADF", 6).expect("fits"), b"ADF\0\0\0".to_vec());
        assert!(encode_string("Flatbed", 7).is_err());
        assert!(encode_string("A\0B", 8).is_err());
    }

    #[test]
    fn fixed_point_round_trips_whole_dpi() {
        assert_eq!(fix(300.0), 300 << 16);
        assert_eq!(unfix(fix(150.0)), 150.0);
    }

    #[test]
    fn line_art_set_bits_are_black() {
        let params = FrameParams {
            format: FRAME_GRAY,
            bytes_per_line: 1,
            pixels_per_line: 4,
            lines: Some(2),
            depth: 1,
        };

        let image = frame_to_image(&params, &[0b1010_0000, 0b0001_0000]).expect("image");

        assert_eq!(image.to_luma8().into_raw(), vec![0, 255, 0, 255, 255, 255, 255, 0]);
    }

    #[test]
    fn padded_rgb_rows_are_trimmed_and_partial_rows_dropped() {
        let params = FrameParams {
            format: FRAME_RGB,
            bytes_per_line: 8,
            pixels_per_line: 2,
            lines: None,
            depth: 8,
        };
        let mut data = vec![1, 2, 3, 4, 5, 6, 0xEE, 0xEE];
        data.extend([7, 8, 9]);

        let image = frame_to_image(&params, &data).expect("image");

        assert_eq!((image.width(), image.height()), (2, 1));
        assert_eq!(image.to_rgb8().into_raw(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn three_pass_frames_are_refused() {
        let params = FrameParams {
            format: 2,
            bytes_per_line: 4,
            pixels_per_line: 4,
            lines: Some(1),
            depth: 8,
        };
        assert!(matches!(
            frame_to_image(&params, &[0; 4]),
            Err(ScanwerkError::ScanFailed(_))
        ));
    }
}
