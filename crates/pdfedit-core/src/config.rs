//! Editor configuration
//!
//! Every constant the editor relies on lives here so the browser shell can
//! override it with a JSON blob. Missing fields fall back to the defaults.

use crate::elements::FontFamily;
use crate::geometry::{DisplayPoint, DisplaySize};
use serde::{Deserialize, Serialize};

/// 100 MB upload ceiling
pub const DEFAULT_MAX_FILE_SIZE: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    /// Width in display pixels that every page preview is rendered at
    pub display_width: f64,
    /// Rasterization scale used for page backgrounds during export
    pub export_scale: f64,
    /// Largest accepted upload in bytes
    pub max_file_size: usize,
    /// Placed images and signatures are capped to this width
    pub max_placed_image_width: f64,
    /// Where images, shapes and redactions land when first inserted
    pub default_position: DisplayPoint,
    pub text_box: DisplaySize,
    pub text_font_size: f64,
    pub text_color: String,
    pub text_font: FontFamily,
    pub shape_size: DisplaySize,
    pub shape_color: String,
    pub redaction_size: DisplaySize,
    pub drawing_stroke_width: f32,
    pub signature_stroke_width: f32,
    pub signature_canvas: DisplaySize,
    /// Key of the durable slot that holds saved signatures
    pub signature_storage_key: String,
    pub export_filename: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            display_width: 800.0,
            export_scale: 2.0,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_placed_image_width: 200.0,
            default_position: DisplayPoint::new(50.0, 50.0),
            text_box: DisplaySize::new(200.0, 30.0),
            text_font_size: 14.0,
            text_color: "#000000".to_string(),
            text_font: FontFamily::Helvetica,
            shape_size: DisplaySize::new(100.0, 100.0),
            shape_color: "#FF0000".to_string(),
            redaction_size: DisplaySize::new(200.0, 50.0),
            drawing_stroke_width: 3.0,
            signature_stroke_width: 2.0,
            signature_canvas: DisplaySize::new(600.0, 240.0),
            signature_storage_key: "pdfSignatures".to_string(),
            export_filename: "edited_document.pdf".to_string(),
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
