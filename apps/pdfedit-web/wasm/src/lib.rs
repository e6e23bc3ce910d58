//! WASM bindings for the PDF page editor
//!
//! All document and interaction state lives in Rust behind [`EditSession`].
//! JavaScript renders page previews, forwards DOM events and handles file I/O.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { EditSession } from './pkg/pdfedit_wasm.js';
//!
//! await init();
//!
//! const session = new EditSession();
//! session.loadDocument(file.name, file.type, bytes);
//! session.setTool("text");
//! session.clickPage(100, 100);
//! session.setTextDraft("Hello");
//! session.textKey("Enter", false);
//!
//! for (let page = 1; page <= session.pageCount; page++) {
//!     const { width, height, rgba } = await renderPage(page, session.exportScale);
//!     session.setPageRaster(page, width, height, rgba);
//! }
//! downloadBlob(session.export(), session.exportFilename);
//! ```

pub mod edit_session;
pub mod logging;
pub mod storage;

use pdfedit_core::{SplitMode, MERGED_FILENAME};
use wasm_bindgen::prelude::*;

pub use edit_session::EditSession;

fn to_js(e: pdfedit_core::EditError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    logging::init(tracing::Level::INFO);
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Quick validation check for a PDF file
#[wasm_bindgen]
pub fn quick_validate(bytes: &[u8]) -> Result<(), JsValue> {
    pdfedit_core::quick_validate(bytes).map_err(to_js)
}

/// Page count, version, encryption and metadata for the file info panel
#[wasm_bindgen]
pub fn get_pdf_info(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let info = pdfedit_core::pdf_info(bytes).map_err(to_js)?;

    serde_wasm_bindgen::to_value(&info)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
pub fn get_page_count(bytes: &[u8]) -> Result<u32, JsValue> {
    pdfedit_core::get_page_count(bytes).map_err(to_js)
}

/// Format bytes as human-readable string
#[wasm_bindgen]
pub fn format_bytes(bytes: f64) -> String {
    pdfedit_core::format_bytes(bytes.max(0.0) as u64)
}

/// Merge documents in the given order.
/// `progress` receives (documentDone, documentCount, message).
#[wasm_bindgen(js_name = mergeDocuments)]
pub fn merge_documents(files: js_sys::Array, progress: Option<js_sys::Function>) -> Result<js_sys::Uint8Array, JsValue> {
    let inputs: Vec<Vec<u8>> = files
        .iter()
        .map(|file| js_sys::Uint8Array::new(&file).to_vec())
        .collect();

    let merged = pdfedit_core::merge_documents(&inputs, |current, total| {
        if let Some(ref callback) = progress {
            let msg = format!("Merging document {} of {}", current, total);
            let _ = callback.call3(
                &JsValue::null(),
                &JsValue::from(current as u32),
                &JsValue::from(total as u32),
                &JsValue::from_str(&msg),
            );
        }
    })
    .map_err(to_js)?;

    let output = js_sys::Uint8Array::new_with_length(merged.len() as u32);
    output.copy_from(&merged);
    Ok(output)
}

#[wasm_bindgen(js_name = mergedFilename)]
pub fn merged_filename() -> String {
    MERGED_FILENAME.to_string()
}

/// Split into one document per page, or per range when `ranges` is given ("1-3, 5").
/// Returns an array of `{ filename, bytes }`.
#[wasm_bindgen(js_name = splitDocument)]
pub fn split_document(bytes: &[u8], filename: &str, ranges: Option<String>) -> Result<js_sys::Array, JsValue> {
    let mode = split_mode(bytes, ranges.as_deref()).map_err(to_js)?;
    let outputs = pdfedit_core::split_document(bytes, filename, &mode).map_err(to_js)?;

    let result = js_sys::Array::new();
    for output in outputs {
        let entry = js_sys::Object::new();
        js_sys::Reflect::set(&entry, &"filename".into(), &JsValue::from_str(&output.filename))?;
        js_sys::Reflect::set(&entry, &"bytes".into(), &js_sys::Uint8Array::from(output.bytes.as_slice()))?;
        result.push(&entry);
    }
    Ok(result)
}

fn split_mode(bytes: &[u8], ranges: Option<&str>) -> Result<SplitMode, pdfedit_core::EditError> {
    match ranges.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(SplitMode::EveryPage),
        Some(ranges) => {
            let page_count = pdfedit_core::get_page_count(bytes)?;
            Ok(SplitMode::Ranges(pdfedit_core::parse_range_groups(ranges, page_count)?))
        }
    }
}

/// Sorted unique pages named by a range expression
#[wasm_bindgen(js_name = parseRanges)]
pub fn parse_ranges(input: &str, page_count: u32) -> Result<Vec<u32>, JsValue> {
    pdfedit_core::parse_ranges(input, page_count).map_err(to_js)
}
