//! In-browser PDF page editing
//!
//! Places text, images, shapes, freehand drawings and redaction blocks over
//! the pages of a document, then flattens everything into a new PDF whose
//! pages are raster backgrounds with the annotations drawn on top.
//!
//! Page rasterization happens outside this crate (the browser's PDF engine)
//! and is handed in through [`PageRasterizer`]. Merge and split tools work
//! on the document structure directly with lopdf.

pub mod canvas;
pub mod config;
pub mod editor;
pub mod elements;
pub mod error;
pub mod export;
pub mod geometry;
pub mod loader;
pub mod merge;
pub mod raster;
pub mod signature;
pub mod split;

pub use canvas::StrokeCanvas;
pub use config::EditorConfig;
pub use editor::{EditorMode, EditorSession, FinishedDrawing, TextKey, ToolMode};
pub use elements::{
    AnnotationElement, AnnotationModel, ElementId, ElementKind, ElementPatch, ElementPayload,
    FontFamily, ShapeKind,
};
pub use error::EditError;
pub use export::{flatten_document, FlattenedDocument, PageRasterizer, PrerenderedPages};
pub use geometry::{DisplayPoint, DisplayRect, DisplaySize, PageGeometry, PageSize, PdfRect};
pub use loader::{format_bytes, pdf_info, quick_validate, CandidateFile, LoadedDocument, PdfInfo};
pub use merge::{merge_documents, MERGED_FILENAME};
pub use signature::{remove_background, KeyValueStore, MemoryStore, SignatureRecord, SignatureStore};
pub use split::{parse_range_groups, parse_ranges, split_document, PageRange, SplitMode, SplitOutput};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, EditError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| EditError::DocumentLoad(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}
