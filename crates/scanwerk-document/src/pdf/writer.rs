// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — wrap one scanned page image into a standalone single-page PDF.
//
// The page is JPEG-encoded into the scan's working directory and embedded
// as a DCT-compressed image XObject, so no pixel data is re-encoded by the
// PDF layer. The page size is the image size at the scan resolution.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use scanwerk_core::error::{Result, ScanwerkError};
use tracing::{debug, instrument};

/// JPEG quality used for every scanned page.
pub const JPEG_QUALITY: u8 = 95;

/// Converts page images into single-page PDFs.
pub struct PdfWriter {
    /// Directory receiving the intermediate `scan_<n>.jpg` files.
    workdir: PathBuf,
    /// Scan resolution, used to size the page.
    dpi: u32,
    quality: u8,
}

impl PdfWriter {
    pub fn new(workdir: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            workdir: workdir.into(),
            dpi: dpi.max(1),
            quality: JPEG_QUALITY,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Encode `image` as page `index` and return the bytes of a one-page PDF.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn image_page(&self, image: &DynamicImage, index: usize) -> Result<Vec<u8>> {
        let normalized = normalize(image);
        let jpeg_path = self.workdir.join(format!("scan_{index}.jpg"));
        self.encode_jpeg(&normalized, &jpeg_path)?;
        let jpeg = std::fs::read(&jpeg_path)?;

        let color_space = if matches!(normalized.as_ref(), DynamicImage::ImageLuma8(_)) {
            "DeviceGray"
        } else {
            "DeviceRGB"
        };
        let (width_px, height_px) = (normalized.width(), normalized.height());
        let page_width = points(width_px, self.dpi);
        let page_height = points(height_px, self.dpi);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width_px),
                "Height" => i64::from(height_px),
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(page_width),
                        0.into(),
                        0.into(),
                        Object::Real(page_height),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|err| ScanwerkError::Pdf(format!("failed to encode page content: {err}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(page_width),
                Object::Real(page_height),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "Contents" => content_id,
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|err| ScanwerkError::Pdf(format!("failed to serialise page {index}: {err}")))?;

        debug!(output_bytes = output.len(), page_width, page_height, "Page PDF created");
        Ok(output)
    }

    fn encode_jpeg(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        // The image crate's baseline encoder samples chroma at full resolution.
        let encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        image.write_with_encoder(encoder).map_err(|err| {
            ScanwerkError::Image(format!("failed to encode {}: {err}", path.display()))
        })?;
        out.flush()?;
        Ok(())
    }
}

/// JPEG carries 8-bit gray or RGB only.
fn normalize(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(image),
        other if other.color().has_color() => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
        other => Cow::Owned(DynamicImage::ImageLuma8(other.to_luma8())),
    }
}

/// Pixels at `dpi` to PDF points.
fn points(pixels: u32, dpi: u32) -> f32 {
    pixels as f32 * 72.0 / dpi as f32
}
