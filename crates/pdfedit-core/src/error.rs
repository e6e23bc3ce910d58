use crate::elements::ElementId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Invalid file type: expected application/pdf, got '{0}'")]
    InvalidFileType(String),

    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Failed to load PDF: {0}")]
    DocumentLoad(String),

    #[error("Nothing has been drawn")]
    NoContent,

    #[error("Failed to render page {page}: {reason}")]
    PageRender { page: u32, reason: String },

    #[error("Failed to embed element {id}: {reason}")]
    ElementEmbed { id: ElementId, reason: String },

    #[error("No elements to export")]
    NoElements,

    #[error("Export failed: {0}")]
    EditExport(#[source] Box<EditError>),

    #[error("Text cannot be encoded: {0}")]
    TextEncoding(String),

    #[error("No document loaded")]
    NoDocument,

    #[error("Element {0} not found")]
    ElementNotFound(ElementId),

    #[error("Page {page} is out of range (1-{page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("Signature {0} not found")]
    SignatureNotFound(usize),

    #[error("Signature storage error: {0}")]
    Storage(String),

    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    #[error("PDF operation failed: {0}")]
    Operation(String),
}

impl EditError {
    /// Wrap an error as a fatal export failure, leaving existing wrappers alone.
    pub fn into_export(self) -> Self {
        match self {
            EditError::EditExport(_) => self,
            other => EditError::EditExport(Box::new(other)),
        }
    }
}
