//! Page editing session exposed to JavaScript

use crate::storage::SignatureBackend;
use pdfedit_core::{
    CandidateFile, DisplayPoint, DisplayRect, EditError, EditorConfig, EditorSession, ElementId,
    ElementPatch, FinishedDrawing, PrerenderedPages, ShapeKind, TextKey, ToolMode,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;

fn to_js(e: EditError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Parse a lowercase name such as `"text"` or `"circle"` into a core enum.
fn parse_name<T: DeserializeOwned>(what: &str, name: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(name.to_ascii_lowercase()))
        .map_err(|_| format!("Unknown {}: {}", what, name))
}

fn parse_text_key(key: &str, shift: bool) -> Result<TextKey, String> {
    match key {
        "Enter" => Ok(TextKey::Enter { shift }),
        "Escape" => Ok(TextKey::Escape),
        other => Err(format!("Unhandled key: {}", other)),
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[derive(Serialize)]
struct DrawingOutcome {
    element: Option<ElementId>,
    signature: Option<usize>,
}

#[derive(Serialize)]
struct ExportSummary {
    page_count: u32,
    elements_drawn: usize,
    skipped: Vec<ElementId>,
}

#[wasm_bindgen]
pub struct EditSession {
    inner: EditorSession<SignatureBackend>,
    rasters: PrerenderedPages,
    progress_callback: Option<js_sys::Function>,
    last_export: Option<ExportSummary>,
}

#[wasm_bindgen]
impl EditSession {
    /// `config_json` overrides any subset of the editor defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<EditSession, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) if !json.trim().is_empty() => {
                EditorConfig::from_json(json).map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?
            }
            _ => EditorConfig::default(),
        };
        let inner = EditorSession::new(config, SignatureBackend::detect()).map_err(to_js)?;
        Ok(Self {
            inner,
            rasters: PrerenderedPages::new(),
            progress_callback: None,
            last_export: None,
        })
    }

    /// Returns the page count. A rejected file leaves the current document open.
    #[wasm_bindgen(js_name = loadDocument)]
    pub fn load_document(&mut self, name: &str, media_type: &str, bytes: &[u8]) -> Result<u32, JsValue> {
        let file = CandidateFile::new(name, media_type, bytes.to_vec());
        let page_count = self.inner.load_document(file).map_err(to_js)?;
        self.rasters.clear();
        self.last_export = None;
        Ok(page_count)
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.inner.page_count()
    }

    #[wasm_bindgen(getter, js_name = activePage)]
    pub fn active_page(&self) -> u32 {
        self.inner.active_page()
    }

    #[wasm_bindgen(getter, js_name = documentName)]
    pub fn document_name(&self) -> Option<String> {
        self.inner.document().map(|doc| doc.name.clone())
    }

    /// Original bytes, handed to the page renderer
    #[wasm_bindgen(js_name = getDocumentBytes)]
    pub fn get_document_bytes(&self) -> Option<js_sys::Uint8Array> {
        self.inner.document().map(|doc| js_sys::Uint8Array::from(doc.bytes.as_slice()))
    }

    /// Switch pages and return the new page's geometry
    #[wasm_bindgen(js_name = setPage)]
    pub fn set_page(&mut self, page: u32) -> Result<JsValue, JsValue> {
        let geometry = self.inner.set_page(page).map_err(to_js)?;
        to_value(&geometry)
    }

    #[wasm_bindgen(js_name = getGeometry)]
    pub fn get_geometry(&self) -> Result<JsValue, JsValue> {
        match self.inner.geometry() {
            Some(geometry) => to_value(geometry),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn tool(&self) -> String {
        tool_name(self.inner.tool()).to_string()
    }

    /// Shape and redaction tools insert immediately and return the new element's id.
    #[wasm_bindgen(js_name = setTool)]
    pub fn set_tool(&mut self, tool: &str) -> Result<Option<ElementId>, JsValue> {
        let tool: ToolMode = parse_name("tool", tool).map_err(|e| JsValue::from_str(&e))?;
        self.inner.set_tool(tool).map_err(to_js)
    }

    #[wasm_bindgen(js_name = clickPage)]
    pub fn click_page(&mut self, x: f64, y: f64) {
        self.inner.click_page(DisplayPoint::new(x, y));
    }

    /// Position of the pending text entry, if the user has clicked the page
    #[wasm_bindgen(js_name = getTextPosition)]
    pub fn get_text_position(&self) -> Result<JsValue, JsValue> {
        match self.inner.mode() {
            pdfedit_core::EditorMode::PlacingText {
                position: Some(point), ..
            } => to_value(point),
            _ => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = setTextDraft)]
    pub fn set_text_draft(&mut self, text: &str) {
        self.inner.set_text_draft(text);
    }

    /// `key` is a DOM `KeyboardEvent.key`. Returns the id of a confirmed text element.
    #[wasm_bindgen(js_name = textKey)]
    pub fn text_key(&mut self, key: &str, shift: bool) -> Result<Option<ElementId>, JsValue> {
        let key = parse_text_key(key, shift).map_err(|e| JsValue::from_str(&e))?;
        self.inner.text_key(key).map_err(to_js)
    }

    #[wasm_bindgen(js_name = textBlur)]
    pub fn text_blur(&mut self) -> Result<Option<ElementId>, JsValue> {
        self.inner.text_blur().map_err(to_js)
    }

    #[wasm_bindgen(js_name = addImage)]
    pub fn add_image(&mut self, bytes: &[u8]) -> Result<ElementId, JsValue> {
        self.inner.add_image_bytes(bytes).map_err(to_js)
    }

    #[wasm_bindgen(js_name = addShape)]
    pub fn add_shape(&mut self, shape: &str) -> Result<ElementId, JsValue> {
        let shape: ShapeKind = parse_name("shape", shape).map_err(|e| JsValue::from_str(&e))?;
        self.inner.add_shape(shape).map_err(to_js)
    }

    #[wasm_bindgen(js_name = addRedaction)]
    pub fn add_redaction(&mut self) -> Result<ElementId, JsValue> {
        self.inner.add_redaction().map_err(to_js)
    }

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.inner.pointer_down(DisplayPoint::new(x, y));
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&mut self, x: f64, y: f64) {
        self.inner.pointer_move(DisplayPoint::new(x, y));
    }

    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&mut self) {
        self.inner.pointer_up();
    }

    /// Returns `{ element }` or `{ signature }` depending on where the ink went.
    #[wasm_bindgen(js_name = finishDrawing)]
    pub fn finish_drawing(&mut self, save_as_signature: bool) -> Result<JsValue, JsValue> {
        let outcome = match self.inner.finish_drawing(save_as_signature).map_err(to_js)? {
            FinishedDrawing::Element(id) => DrawingOutcome {
                element: Some(id),
                signature: None,
            },
            FinishedDrawing::Signature(index) => DrawingOutcome {
                element: None,
                signature: Some(index),
            },
        };
        to_value(&outcome)
    }

    pub fn select(&mut self, id: Option<ElementId>) -> Result<(), JsValue> {
        self.inner.select(id).map_err(to_js)
    }

    #[wasm_bindgen(getter)]
    pub fn selected(&self) -> Option<ElementId> {
        self.inner.selected()
    }

    #[wasm_bindgen(js_name = moveElement)]
    pub fn move_element(&mut self, id: ElementId, x: f64, y: f64) -> Result<(), JsValue> {
        self.inner.move_element(id, DisplayPoint::new(x, y)).map_err(to_js)
    }

    #[wasm_bindgen(js_name = resizeElement)]
    pub fn resize_element(&mut self, id: ElementId, x: f64, y: f64, width: f64, height: f64) -> Result<(), JsValue> {
        self.inner
            .resize_element(id, DisplayRect { x, y, width, height })
            .map_err(to_js)
    }

    /// `patch_json` uses the same field names as the element JSON, e.g. `{"text":"Hi","bold":true}`.
    #[wasm_bindgen(js_name = updateElement)]
    pub fn update_element(&mut self, id: ElementId, patch_json: &str) -> Result<(), JsValue> {
        let patch: ElementPatch =
            serde_json::from_str(patch_json).map_err(|e| JsValue::from_str(&format!("Invalid patch: {}", e)))?;
        self.inner.update_element(id, &patch).map_err(to_js)
    }

    #[wasm_bindgen(js_name = deleteElement)]
    pub fn delete_element(&mut self, id: ElementId) -> Result<(), JsValue> {
        self.inner.delete_element(id).map(|_| ()).map_err(to_js)
    }

    /// Elements on the active page, for the overlay
    #[wasm_bindgen(js_name = getPageElements)]
    pub fn get_page_elements(&self) -> Result<JsValue, JsValue> {
        to_value(&self.inner.elements_on_active_page())
    }

    #[wasm_bindgen(js_name = getElementsJson)]
    pub fn get_elements_json(&self) -> Result<String, JsValue> {
        self.inner
            .model()
            .to_json()
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = elementCount)]
    pub fn element_count(&self) -> usize {
        self.inner.model().len()
    }

    #[wasm_bindgen(js_name = signaturePadDown)]
    pub fn signature_pad_down(&mut self, x: f64, y: f64) {
        self.inner.signature_pad_down(DisplayPoint::new(x, y));
    }

    #[wasm_bindgen(js_name = signaturePadMove)]
    pub fn signature_pad_move(&mut self, x: f64, y: f64) {
        self.inner.signature_pad_move(DisplayPoint::new(x, y));
    }

    #[wasm_bindgen(js_name = signaturePadUp)]
    pub fn signature_pad_up(&mut self) {
        self.inner.signature_pad_up();
    }

    #[wasm_bindgen(js_name = clearSignaturePad)]
    pub fn clear_signature_pad(&mut self) {
        self.inner.clear_signature_pad();
    }

    #[wasm_bindgen(js_name = saveSignaturePad)]
    pub fn save_signature_pad(&mut self) -> Result<usize, JsValue> {
        self.inner.save_signature_pad().map_err(to_js)
    }

    #[wasm_bindgen(js_name = uploadSignature)]
    pub fn upload_signature(&mut self, bytes: &[u8]) -> Result<usize, JsValue> {
        self.inner.upload_signature(bytes).map_err(to_js)
    }

    #[wasm_bindgen(js_name = deleteSignature)]
    pub fn delete_signature(&mut self, index: usize) -> Result<(), JsValue> {
        self.inner.delete_signature(index).map_err(to_js)
    }

    #[wasm_bindgen(js_name = applySignature)]
    pub fn apply_signature(&mut self, index: usize) -> Result<ElementId, JsValue> {
        self.inner.apply_signature(index).map_err(to_js)
    }

    /// Saved signatures as PNG data URIs, oldest first
    #[wasm_bindgen(js_name = listSignatures)]
    pub fn list_signatures(&self) -> js_sys::Array {
        self.inner
            .signatures()
            .records()
            .iter()
            .map(|record| JsValue::from_str(&record.data_uri))
            .collect()
    }

    #[wasm_bindgen(getter, js_name = signaturesPersist)]
    pub fn signatures_persist(&self) -> bool {
        self.inner.signatures().backend().is_durable()
    }

    /// Hand over a rendered page background (RGBA, row-major) for export.
    #[wasm_bindgen(js_name = setPageRaster)]
    pub fn set_page_raster(&mut self, page: u32, width: u32, height: u32, rgba: Vec<u8>) -> Result<(), JsValue> {
        self.rasters.insert_rgba(page, width, height, rgba).map_err(to_js)
    }

    #[wasm_bindgen(js_name = hasPageRaster)]
    pub fn has_page_raster(&self, page: u32) -> bool {
        self.rasters.contains(page)
    }

    /// Scale the page renderer should use for export backgrounds
    #[wasm_bindgen(getter, js_name = exportScale)]
    pub fn export_scale(&self) -> f64 {
        self.inner.config().export_scale
    }

    /// Callback receives (pageDone, pageCount, message)
    #[wasm_bindgen(js_name = setProgressCallback)]
    pub fn set_progress_callback(&mut self, callback: js_sys::Function) {
        self.progress_callback = Some(callback);
    }

    /// Flatten every page with its elements into a new PDF.
    pub fn export(&mut self) -> Result<js_sys::Uint8Array, JsValue> {
        let callback = self.progress_callback.clone();
        let result = self
            .inner
            .export_with_progress(&mut self.rasters, |current, total| {
                if let Some(ref callback) = callback {
                    let msg = format!("Rendering page {} of {}", current, total);
                    let _ = callback.call3(
                        &JsValue::null(),
                        &JsValue::from(current),
                        &JsValue::from(total),
                        &JsValue::from_str(&msg),
                    );
                }
            })
            .map_err(to_js)?;

        let output = js_sys::Uint8Array::new_with_length(result.bytes.len() as u32);
        output.copy_from(&result.bytes);
        self.last_export = Some(ExportSummary {
            page_count: result.page_count,
            elements_drawn: result.elements_drawn,
            skipped: result.skipped,
        });
        Ok(output)
    }

    /// `{ page_count, elements_drawn, skipped }` of the last export, or null
    #[wasm_bindgen(js_name = getExportSummary)]
    pub fn get_export_summary(&self) -> Result<JsValue, JsValue> {
        match &self.last_export {
            Some(summary) => to_value(summary),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(getter, js_name = exportFilename)]
    pub fn export_filename(&self) -> String {
        self.inner.config().export_filename.clone()
    }
}

fn tool_name(tool: ToolMode) -> &'static str {
    match tool {
        ToolMode::None => "none",
        ToolMode::Text => "text",
        ToolMode::Image => "image",
        ToolMode::Shape => "shape",
        ToolMode::Drawing => "drawing",
        ToolMode::Redaction => "redaction",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_names() {
        assert_eq!(parse_name::<ToolMode>("tool", "text").unwrap(), ToolMode::Text);
        assert_eq!(parse_name::<ToolMode>("tool", "Drawing").unwrap(), ToolMode::Drawing);
        assert_eq!(parse_name::<ToolMode>("tool", "none").unwrap(), ToolMode::None);
        assert_eq!(
            parse_name::<ToolMode>("tool", "lasso").unwrap_err(),
            "Unknown tool: lasso"
        );
    }

    #[test]
    fn test_tool_names_round_trip() {
        for tool in [
            ToolMode::None,
            ToolMode::Text,
            ToolMode::Image,
            ToolMode::Shape,
            ToolMode::Drawing,
            ToolMode::Redaction,
        ] {
            assert_eq!(parse_name::<ToolMode>("tool", tool_name(tool)).unwrap(), tool);
        }
    }

    #[test]
    fn test_parse_shape_names() {
        assert_eq!(parse_name::<ShapeKind>("shape", "circle").unwrap(), ShapeKind::Circle);
        assert!(parse_name::<ShapeKind>("shape", "star").is_err());
    }

    #[test]
    fn test_export_summary_fields() {
        let summary = ExportSummary {
            page_count: 3,
            elements_drawn: 2,
            skipped: vec![4],
        };
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            serde_json::json!({ "page_count": 3, "elements_drawn": 2, "skipped": [4] })
        );
    }

    #[test]
    fn test_parse_text_key() {
        assert_eq!(parse_text_key("Enter", true).unwrap(), TextKey::Enter { shift: true });
        assert_eq!(parse_text_key("Escape", false).unwrap(), TextKey::Escape);
        assert!(parse_text_key("Tab", false).is_err());
    }
}
