// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader and output document — open existing PDFs and copy their pages
// into a new document using the `lopdf` crate.

use std::collections::HashMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use scanwerk_core::error::{Result, ScanwerkError};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against malformed page trees whose /Parent chain loops.
const MAX_TREE_DEPTH: usize = 64;

/// Reads existing PDF files.
pub struct PdfReader {
    document: Document,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref).map_err(|err| {
            ScanwerkError::Pdf(format!("failed to open {}: {err}", path_ref.display()))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            ScanwerkError::Pdf(format!("failed to load PDF from memory: {err}"))
        })?;

        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// Width and height in points of a page (1-indexed), from its MediaBox.
    pub fn page_size(&self, page_number: u32) -> Result<(f32, f32)> {
        let page_id = self.page_id(page_number)?;
        let page = self.page_dictionary(page_id)?;
        let media_box = match page.get(b"MediaBox") {
            Ok(value) => value.clone(),
            Err(_) => inherited(&self.document, page, b"MediaBox").ok_or_else(|| {
                ScanwerkError::Pdf(format!("page {page_number} has no MediaBox"))
            })?,
        };
        let media_box = match media_box {
            Object::Reference(id) => self
                .document
                .get_object(id)
                .map_err(|err| ScanwerkError::Pdf(format!("unresolved MediaBox: {err}")))?
                .clone(),
            other => other,
        };

        match media_box {
            Object::Array(values) if values.len() == 4 => {
                let coords: Vec<f32> = values.iter().filter_map(number).collect();
                if coords.len() != 4 {
                    return Err(ScanwerkError::Pdf(format!(
                        "page {page_number} has a non-numeric MediaBox"
                    )));
                }
                Ok((coords[2] - coords[0], coords[3] - coords[1]))
            }
            _ => Err(ScanwerkError::Pdf(format!(
                "page {page_number} has a malformed MediaBox"
            ))),
        }
    }

    // -- Helpers --------------------------------------------------------------

    fn page_id(&self, page_number: u32) -> Result<ObjectId> {
        let pages = self.document.get_pages();
        pages.get(&page_number).copied().ok_or_else(|| {
            ScanwerkError::Pdf(format!(
                "page {page_number} out of range (document has {} pages)",
                pages.len()
            ))
        })
    }

    fn page_dictionary(&self, page_id: ObjectId) -> Result<&Dictionary> {
        self.document.get_dictionary(page_id).map_err(|err| {
            ScanwerkError::Pdf(format!("cannot read page object {page_id:?}: {err}"))
        })
    }
}

/// A PDF under construction: a page tree that pages of other documents are
/// appended to.
pub struct ScanDocument {
    document: Document,
    pages_id: ObjectId,
    page_count: usize,
}

impl Default for ScanDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanDocument {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        Self {
            document,
            pages_id,
            page_count: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn is_empty(&self) -> bool {
        self.page_count == 0
    }

    /// Copy page `page_number` (1-indexed) of `source` to the end of this
    /// document, together with everything it references.
    pub fn append_page(&mut self, source: &PdfReader, page_number: u32) -> Result<()> {
        let page_id = source.page_id(page_number)?;
        let page = source.page_dictionary(page_id)?;

        let new_page_id = self.document.new_object_id();
        let mut memo = HashMap::from([(page_id, new_page_id)]);

        let mut cloned = import_dictionary(&source.document, &mut self.document, page, &mut memo);
        for key in INHERITABLE {
            if !cloned.has(key)
                && let Some(value) = inherited(&source.document, page, key)
            {
                let value = import_object(&source.document, &mut self.document, &value, &mut memo);
                cloned.set(key, value);
            }
        }
        cloned.set("Parent", Object::Reference(self.pages_id));
        self.document
            .objects
            .insert(new_page_id, Object::Dictionary(cloned));

        let pages = self
            .document
            .get_dictionary_mut(self.pages_id)
            .map_err(|err| ScanwerkError::Pdf(format!("page tree root missing: {err}")))?;
        if let Ok(Object::Array(kids)) = pages.get_mut(b"Kids") {
            kids.push(Object::Reference(new_page_id));
        }
        self.page_count += 1;
        pages.set("Count", self.page_count as i64);

        debug!(page_number, total = self.page_count, "Page appended");
        Ok(())
    }

    /// Serialise into memory.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|err| ScanwerkError::Pdf(format!("failed to serialise document: {err}")))?;
        Ok(output)
    }

    /// Write to `path`, replacing any existing file only once the new one is
    /// complete.
    #[instrument(skip(self), fields(path = %path.display(), pages = self.page_count))]
    pub fn save(&mut self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir)?;
        self.document
            .save_to(staged.as_file_mut())
            .map_err(|err| ScanwerkError::Pdf(format!("failed to write {}: {err}", path.display())))?;
        staged.persist(path).map_err(|err| ScanwerkError::Io(err.error))?;

        info!("PDF saved");
        Ok(())
    }
}

/// Interleave two single-sided passes into one double-sided document.
///
/// The back pass is the flipped stack, so its pages arrive in reverse: sheet
/// `n` pairs front page `n` with back page `count - 1 - n`.
#[instrument(skip_all, fields(front = front.page_count(), back = back.page_count()))]
pub fn interleave_duplex(front: &PdfReader, back: &PdfReader) -> Result<ScanDocument> {
    let count = front.page_count();
    if back.page_count() != count {
        return Err(ScanwerkError::PageCountMismatch {
            front: count,
            back: back.page_count(),
        });
    }

    let mut merged = ScanDocument::new();
    for n in 0..count as u32 {
        merged.append_page(front, n + 1)?;
        merged.append_page(back, count as u32 - n)?;
    }
    Ok(merged)
}

// -- Object import ------------------------------------------------------------

/// Look an inheritable attribute up the /Parent chain of `page`.
fn inherited(source: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = source.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn import_dictionary(
    source: &Document,
    target: &mut Document,
    dict: &Dictionary,
    memo: &mut HashMap<ObjectId, ObjectId>,
) -> Dictionary {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        // /Parent would drag the source page tree along; the caller sets it.
        if key == b"Parent" {
            continue;
        }
        new_dict.set(key.clone(), import_object(source, target, value, memo));
    }
    new_dict
}

/// Deep-copy `object` into `target`, following references. Each source
/// object is copied once, so shared resources and cycles map onto the same
/// target object.
fn import_object(
    source: &Document,
    target: &mut Document,
    object: &Object,
    memo: &mut HashMap<ObjectId, ObjectId>,
) -> Object {
    match object {
        Object::Dictionary(dict) => Object::Dictionary(import_dictionary(source, target, dict, memo)),
        Object::Array(items) => Object::Array(
            items
                .iter()
                .map(|item| import_object(source, target, item, memo))
                .collect(),
        ),
        Object::Stream(stream) => {
            let dict = import_dictionary(source, target, &stream.dict, memo);
            Object::Stream(Stream::new(dict, stream.content.clone()))
        }
        Object::Reference(ref_id) => {
            if let Some(mapped) = memo.get(ref_id) {
                return Object::Reference(*mapped);
            }
            let new_id = target.new_object_id();
            memo.insert(*ref_id, new_id);
            let copied = match source.get_object(*ref_id) {
                Ok(referenced) => import_object(source, target, referenced, memo),
                Err(err) => {
                    warn!(?ref_id, %err, "Cannot resolve reference, using Null");
                    Object::Null
                }
            };
            target.objects.insert(new_id, copied);
            Object::Reference(new_id)
        }
        other => other.clone(),
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}
