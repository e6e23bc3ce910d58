//! Document loading and validation
//!
//! Checks an uploaded file's media type and size, parses it, and summarizes
//! it without touching page content.

use crate::error::EditError;
use lopdf::Document;
use serde::Serialize;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A file picked by the user, before it is accepted as a document
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub name: String,
    /// Declared media type, as reported by the file picker
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }
}

/// An opened document. Source bytes stay untouched for export.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
    pub page_count: u32,
    pub document: Document,
}

/// Summary shown before the user commits to editing
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct PdfInfo {
    pub page_count: u32,
    /// Header version, e.g. "1.7"
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Accept `file` as the document to edit.
pub fn load_document(file: CandidateFile, max_file_size: usize) -> Result<LoadedDocument, EditError> {
    if file.media_type != PDF_MEDIA_TYPE {
        return Err(EditError::InvalidFileType(file.media_type));
    }
    if file.bytes.len() > max_file_size {
        return Err(EditError::FileTooLarge {
            size: file.bytes.len(),
            limit: max_file_size,
        });
    }

    let document = parse_document(&file.bytes)?;
    let page_count = document.get_pages().len() as u32;

    tracing::info!(
        "Loaded '{}': {} pages, {} bytes",
        file.name,
        page_count,
        file.bytes.len()
    );

    Ok(LoadedDocument {
        name: file.name,
        bytes: file.bytes,
        page_count,
        document,
    })
}

fn parse_document(bytes: &[u8]) -> Result<Document, EditError> {
    check_header(bytes)?;

    let document = Document::load_mem(bytes)
        .map_err(|e| EditError::DocumentLoad(format!("Failed to parse PDF: {}", e)))?;

    if document.get_pages().is_empty() {
        return Err(EditError::DocumentLoad("PDF has no pages".into()));
    }
    Ok(document)
}

fn check_header(bytes: &[u8]) -> Result<(), EditError> {
    if bytes.len() < 8 {
        return Err(EditError::DocumentLoad("File too small to be a valid PDF".into()));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(EditError::DocumentLoad(
            "Not a valid PDF file (missing %PDF- header)".into(),
        ));
    }
    Ok(())
}

/// Parse `bytes` and summarize the document.
pub fn pdf_info(bytes: &[u8]) -> Result<PdfInfo, EditError> {
    let document = parse_document(bytes)?;
    let (title, author) = extract_metadata(&document);

    Ok(PdfInfo {
        page_count: document.get_pages().len() as u32,
        version: extract_version(bytes),
        encrypted: document.is_encrypted(),
        size_bytes: bytes.len(),
        title,
        author,
    })
}

/// Header and trailer check without parsing the object graph
pub fn quick_validate(bytes: &[u8]) -> Result<(), EditError> {
    check_header(bytes)?;

    let tail = if bytes.len() > 1024 {
        &bytes[bytes.len() - 1024..]
    } else {
        bytes
    };
    if !tail.windows(5).any(|w| w == b"%%EOF") {
        return Err(EditError::DocumentLoad(
            "PDF appears truncated (missing %%EOF marker)".into(),
        ));
    }
    Ok(())
}

fn extract_version(bytes: &[u8]) -> String {
    bytes
        .get(5..8)
        .and_then(|v| std::str::from_utf8(v).ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "1.4".to_string())
}

fn extract_metadata(document: &Document) -> (Option<String>, Option<String>) {
    let info = match document
        .trailer
        .get(b"Info")
        .and_then(|obj| obj.as_reference())
        .and_then(|id| document.get_dictionary(id))
    {
        Ok(dict) => dict,
        Err(_) => return (None, None),
    };

    let field = |key: &[u8]| {
        info.get(key)
            .and_then(|obj| obj.as_str())
            .ok()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .filter(|s| !s.is_empty())
    };
    (field(b"Title"), field(b"Author"))
}

/// Human-readable file size, e.g. "1.5 MB"
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
