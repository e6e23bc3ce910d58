//! Editing session
//!
//! Owns the loaded document, the annotation model and the interaction state.
//! Interaction state is a single `EditorMode`, so a pending text placement,
//! an active drawing and a selection can never coexist.

use crate::canvas::StrokeCanvas;
use crate::config::EditorConfig;
use crate::elements::{AnnotationElement, AnnotationModel, ElementId, ElementPatch, ElementPayload, ShapeKind};
use crate::error::EditError;
use crate::export::{flatten_document_with_progress, FlattenedDocument, PageRasterizer};
use crate::geometry::{page_size, DisplayPoint, DisplayRect, DisplaySize, PageGeometry};
use crate::loader::{load_document, CandidateFile, LoadedDocument};
use crate::raster::{decode_data_uri_raster, decode_raster, encode_data_uri, png_data_uri, RasterFormat};
use crate::signature::{KeyValueStore, SignatureStore};
use serde::{Deserialize, Serialize};

/// The creation tool a user has picked, as shown in the toolbar
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    #[default]
    None,
    Text,
    Image,
    Shape,
    Drawing,
    Redaction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorMode {
    Idle,
    /// Text tool is active. `position` is set once the user clicks the page.
    PlacingText {
        position: Option<DisplayPoint>,
        draft: String,
    },
    /// Waiting for the user to pick an image file
    AwaitingImage,
    Drawing {
        canvas: StrokeCanvas,
    },
    Selected(ElementId),
}

impl EditorMode {
    pub fn tool(&self) -> ToolMode {
        match self {
            EditorMode::PlacingText { .. } => ToolMode::Text,
            EditorMode::AwaitingImage => ToolMode::Image,
            EditorMode::Drawing { .. } => ToolMode::Drawing,
            EditorMode::Idle | EditorMode::Selected(_) => ToolMode::None,
        }
    }
}

/// Keys the inline text entry reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKey {
    Enter { shift: bool },
    Escape,
}

/// Where a finished drawing ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishedDrawing {
    Element(ElementId),
    Signature(usize),
}

pub struct EditorSession<S: KeyValueStore> {
    config: EditorConfig,
    document: Option<LoadedDocument>,
    active_page: u32,
    geometry: Option<PageGeometry>,
    model: AnnotationModel,
    mode: EditorMode,
    signatures: SignatureStore<S>,
    signature_pad: StrokeCanvas,
}

impl<S: KeyValueStore> EditorSession<S> {
    pub fn new(config: EditorConfig, signature_backend: S) -> Result<Self, EditError> {
        let signatures = SignatureStore::open(signature_backend, &config.signature_storage_key)?;
        let signature_pad = StrokeCanvas::new(config.signature_canvas, config.signature_stroke_width);

        Ok(Self {
            config,
            document: None,
            active_page: 1,
            geometry: None,
            model: AnnotationModel::new(),
            mode: EditorMode::Idle,
            signatures,
            signature_pad,
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.document.as_ref()
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |doc| doc.page_count)
    }

    pub fn active_page(&self) -> u32 {
        self.active_page
    }

    pub fn geometry(&self) -> Option<&PageGeometry> {
        self.geometry.as_ref()
    }

    pub fn model(&self) -> &AnnotationModel {
        &self.model
    }

    pub fn mode(&self) -> &EditorMode {
        &self.mode
    }

    pub fn tool(&self) -> ToolMode {
        self.mode.tool()
    }

    pub fn selected(&self) -> Option<ElementId> {
        match self.mode {
            EditorMode::Selected(id) => Some(id),
            _ => None,
        }
    }

    pub fn signatures(&self) -> &SignatureStore<S> {
        &self.signatures
    }

    pub fn elements_on_active_page(&self) -> Vec<&AnnotationElement> {
        self.model.elements_on_page(self.active_page)
    }

    // ---- document and pages ----

    /// Replace the current document. On failure the previous state is kept.
    pub fn load_document(&mut self, file: CandidateFile) -> Result<u32, EditError> {
        let loaded = load_document(file, self.config.max_file_size)?;
        let geometry = self.geometry_for(&loaded, 1)?;
        let page_count = loaded.page_count;

        self.document = Some(loaded);
        self.active_page = 1;
        self.geometry = Some(geometry);
        self.model.clear();
        self.mode = EditorMode::Idle;
        Ok(page_count)
    }

    /// Switch the active page. Elements on other pages are kept but inert.
    pub fn set_page(&mut self, page: u32) -> Result<PageGeometry, EditError> {
        let doc = self.document.as_ref().ok_or(EditError::NoDocument)?;
        if page == 0 || page > doc.page_count {
            return Err(EditError::PageOutOfRange {
                page,
                page_count: doc.page_count,
            });
        }
        let geometry = self.geometry_for(doc, page)?;

        self.active_page = page;
        self.geometry = Some(geometry);
        self.enter(EditorMode::Idle);
        Ok(geometry)
    }

    fn geometry_for(&self, doc: &LoadedDocument, page: u32) -> Result<PageGeometry, EditError> {
        let size = page_size(&doc.document, page)?;
        Ok(PageGeometry::for_page(size, self.config.display_width))
    }

    fn require_geometry(&self) -> Result<PageGeometry, EditError> {
        self.geometry.ok_or(EditError::NoDocument)
    }

    fn enter(&mut self, mode: EditorMode) {
        match &self.mode {
            EditorMode::PlacingText {
                position: Some(_), ..
            } => tracing::debug!("Discarding pending text placement"),
            EditorMode::Drawing { canvas } if canvas.stroke_count() > 0 => {
                tracing::debug!("Discarding {} unfinished strokes", canvas.stroke_count())
            }
            _ => {}
        }
        self.mode = mode;
    }

    // ---- tools ----

    /// Activate a tool, cancelling whatever flow was in progress.
    /// Shape and redaction insert a default element right away and return its id.
    pub fn set_tool(&mut self, tool: ToolMode) -> Result<Option<ElementId>, EditError> {
        if tool == ToolMode::None {
            self.enter(EditorMode::Idle);
            return Ok(None);
        }

        let geometry = self.require_geometry()?;
        match tool {
            ToolMode::None => Ok(None),
            ToolMode::Text => {
                self.enter(EditorMode::PlacingText {
                    position: None,
                    draft: String::new(),
                });
                Ok(None)
            }
            ToolMode::Image => {
                self.enter(EditorMode::AwaitingImage);
                Ok(None)
            }
            ToolMode::Drawing => {
                self.signature_pad.pointer_up();
                let canvas = StrokeCanvas::new(geometry.rendered_size(), self.config.drawing_stroke_width);
                self.enter(EditorMode::Drawing { canvas });
                Ok(None)
            }
            ToolMode::Shape => self.add_shape(ShapeKind::Rectangle).map(Some),
            ToolMode::Redaction => self.add_redaction().map(Some),
        }
    }

    /// A click on empty page area: places the text cursor or clears the selection.
    pub fn click_page(&mut self, point: DisplayPoint) {
        if let EditorMode::Selected(_) = self.mode {
            self.mode = EditorMode::Idle;
        } else if let EditorMode::PlacingText { position, .. } = &mut self.mode {
            position.get_or_insert(point);
        }
    }

    pub fn set_text_draft(&mut self, text: &str) {
        if let EditorMode::PlacingText {
            position: Some(_),
            draft,
        } = &mut self.mode
        {
            *draft = text.to_string();
        }
    }

    pub fn text_key(&mut self, key: TextKey) -> Result<Option<ElementId>, EditError> {
        match key {
            TextKey::Enter { shift: false } => self.confirm_text(),
            TextKey::Enter { shift: true } => {
                if let EditorMode::PlacingText {
                    position: Some(_),
                    draft,
                } = &mut self.mode
                {
                    draft.push('\n');
                }
                Ok(None)
            }
            TextKey::Escape => {
                self.cancel_text();
                Ok(None)
            }
        }
    }

    /// The text entry lost focus: keep non-empty text, drop the rest.
    pub fn text_blur(&mut self) -> Result<Option<ElementId>, EditError> {
        let has_text = matches!(
            &self.mode,
            EditorMode::PlacingText { position: Some(_), draft } if !draft.trim().is_empty()
        );
        if has_text {
            self.confirm_text()
        } else {
            self.cancel_text();
            Ok(None)
        }
    }

    fn cancel_text(&mut self) {
        if let EditorMode::PlacingText { position, draft } = &mut self.mode {
            *position = None;
            draft.clear();
        }
    }

    fn confirm_text(&mut self) -> Result<Option<ElementId>, EditError> {
        let (position, text) = match &self.mode {
            EditorMode::PlacingText {
                position: Some(position),
                draft,
            } if !draft.trim().is_empty() => (*position, draft.clone()),
            _ => return Ok(None),
        };

        let payload = ElementPayload::Text {
            text,
            font_size: self.config.text_font_size,
            color: self.config.text_color.clone(),
            font_family: self.config.text_font,
            bold: false,
        };
        let id = self
            .model
            .add(self.active_page, position, Some(self.config.text_box), payload);
        self.mode = EditorMode::Idle;
        tracing::debug!("Placed text element {} on page {}", id, self.active_page);
        Ok(Some(id))
    }

    // ---- inserting elements ----

    /// Insert an image from a `data:` URI, capped to the configured width.
    pub fn add_image(&mut self, data_uri: String) -> Result<ElementId, EditError> {
        self.require_geometry()?;
        let raster = decode_data_uri_raster(&data_uri)?;
        self.place_raster(data_uri, raster.width(), raster.height())
    }

    /// Insert an image from raw PNG or JPEG bytes.
    pub fn add_image_bytes(&mut self, bytes: &[u8]) -> Result<ElementId, EditError> {
        self.require_geometry()?;
        let raster = decode_raster(bytes)?;
        let mime = match raster.format {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        };
        self.place_raster(encode_data_uri(mime, bytes), raster.width(), raster.height())
    }

    fn place_raster(&mut self, data_uri: String, width: u32, height: u32) -> Result<ElementId, EditError> {
        let size = DisplaySize::fit_width(width as f64, height as f64, self.config.max_placed_image_width);
        let id = self.model.add(
            self.active_page,
            self.config.default_position,
            Some(size),
            ElementPayload::Image { data_uri },
        );
        self.enter(EditorMode::Idle);
        Ok(id)
    }

    pub fn add_shape(&mut self, shape: ShapeKind) -> Result<ElementId, EditError> {
        self.require_geometry()?;
        let id = self.model.add(
            self.active_page,
            self.config.default_position,
            Some(self.config.shape_size),
            ElementPayload::Shape {
                shape,
                color: self.config.shape_color.clone(),
            },
        );
        self.enter(EditorMode::Selected(id));
        Ok(id)
    }

    pub fn add_redaction(&mut self) -> Result<ElementId, EditError> {
        self.require_geometry()?;
        let id = self.model.add(
            self.active_page,
            self.config.default_position,
            Some(self.config.redaction_size),
            ElementPayload::Redaction,
        );
        self.enter(EditorMode::Selected(id));
        Ok(id)
    }

    // ---- drawing ----

    pub fn pointer_down(&mut self, point: DisplayPoint) {
        if let EditorMode::Drawing { canvas } = &mut self.mode {
            canvas.pointer_down(point);
        }
    }

    pub fn pointer_move(&mut self, point: DisplayPoint) {
        if let EditorMode::Drawing { canvas } = &mut self.mode {
            canvas.pointer_move(point);
        }
    }

    /// Pointer released or left the page. The drawing stays open for more strokes.
    pub fn pointer_up(&mut self) {
        if let EditorMode::Drawing { canvas } = &mut self.mode {
            canvas.pointer_up();
        }
    }

    /// Rasterize the open drawing and leave drawing mode.
    /// With `save_as_signature` the ink goes to the signature store instead of the page.
    pub fn finish_drawing(&mut self, save_as_signature: bool) -> Result<FinishedDrawing, EditError> {
        let canvas = match std::mem::replace(&mut self.mode, EditorMode::Idle) {
            EditorMode::Drawing { canvas } => canvas,
            other => {
                self.mode = other;
                return Err(EditError::NoContent);
            }
        };

        let image = canvas.finalize()?;
        let data_uri = png_data_uri(&image)?;

        if save_as_signature {
            let index = self.signatures.add(data_uri)?;
            return Ok(FinishedDrawing::Signature(index));
        }

        let id = self.model.add(
            self.active_page,
            DisplayPoint::new(0.0, 0.0),
            Some(canvas.size()),
            ElementPayload::Drawing { data_uri },
        );
        Ok(FinishedDrawing::Element(id))
    }

    // ---- selection and manipulation ----

    /// Select one element on the active page, or clear the selection with `None`.
    /// Ignored while drawing.
    pub fn select(&mut self, id: Option<ElementId>) -> Result<(), EditError> {
        if matches!(self.mode, EditorMode::Drawing { .. }) {
            return Ok(());
        }
        match id {
            Some(id) => {
                let on_page = self
                    .model
                    .get(id)
                    .is_some_and(|el| el.page_number == self.active_page);
                if !on_page {
                    return Err(EditError::ElementNotFound(id));
                }
                self.enter(EditorMode::Selected(id));
            }
            None => {
                if let EditorMode::Selected(_) = self.mode {
                    self.mode = EditorMode::Idle;
                }
            }
        }
        Ok(())
    }

    /// Drag an element to `point`, kept inside the page overlay.
    pub fn move_element(&mut self, id: ElementId, point: DisplayPoint) -> Result<(), EditError> {
        if matches!(self.mode, EditorMode::Drawing { .. }) {
            return Ok(());
        }
        let geometry = self.require_geometry()?;
        let element = self.model.get(id).ok_or(EditError::ElementNotFound(id))?;
        let current = element.display_rect();

        let clamped = geometry.clamp_to_overlay(DisplayRect {
            x: point.x,
            y: point.y,
            ..current
        });
        self.model
            .update(id, &ElementPatch::position(DisplayPoint::new(clamped.x, clamped.y)))
    }

    pub fn resize_element(&mut self, id: ElementId, bounds: DisplayRect) -> Result<(), EditError> {
        if matches!(self.mode, EditorMode::Drawing { .. }) {
            return Ok(());
        }
        let geometry = self.require_geometry()?;
        if !self.model.contains(id) {
            return Err(EditError::ElementNotFound(id));
        }
        self.model
            .update(id, &ElementPatch::bounds(geometry.clamp_to_overlay(bounds)))
    }

    pub fn update_element(&mut self, id: ElementId, patch: &ElementPatch) -> Result<(), EditError> {
        self.model.update(id, patch)
    }

    pub fn delete_element(&mut self, id: ElementId) -> Result<AnnotationElement, EditError> {
        let removed = self.model.remove(id)?;
        if self.selected() == Some(id) {
            self.mode = EditorMode::Idle;
        }
        Ok(removed)
    }

    // ---- signatures ----

    /// Signature pad input is ignored while page drawing is active.
    pub fn signature_pad_down(&mut self, point: DisplayPoint) {
        if !matches!(self.mode, EditorMode::Drawing { .. }) {
            self.signature_pad.pointer_down(point);
        }
    }

    pub fn signature_pad_move(&mut self, point: DisplayPoint) {
        self.signature_pad.pointer_move(point);
    }

    pub fn signature_pad_up(&mut self) {
        self.signature_pad.pointer_up();
    }

    pub fn clear_signature_pad(&mut self) {
        self.signature_pad.clear();
    }

    /// Save the signature pad's ink and clear the pad.
    pub fn save_signature_pad(&mut self) -> Result<usize, EditError> {
        let index = self.signatures.save_drawn(&self.signature_pad)?;
        self.signature_pad.clear();
        Ok(index)
    }

    pub fn upload_signature(&mut self, bytes: &[u8]) -> Result<usize, EditError> {
        self.signatures.save_uploaded(bytes)
    }

    pub fn delete_signature(&mut self, index: usize) -> Result<(), EditError> {
        self.signatures.remove(index).map(|_| ())
    }

    /// Place a saved signature on the active page as an image element.
    pub fn apply_signature(&mut self, index: usize) -> Result<ElementId, EditError> {
        let data_uri = self.signatures.get(index)?.data_uri.clone();
        self.add_image(data_uri)
    }

    // ---- export ----

    pub fn export(&self, rasterizer: &mut dyn PageRasterizer) -> Result<FlattenedDocument, EditError> {
        self.export_with_progress(rasterizer, |_, _| {})
    }

    pub fn export_with_progress<F>(
        &self,
        rasterizer: &mut dyn PageRasterizer,
        progress: F,
    ) -> Result<FlattenedDocument, EditError>
    where
        F: FnMut(u32, u32),
    {
        let doc = self.document.as_ref().ok_or(EditError::NoDocument)?;
        flatten_document_with_progress(&doc.document, &self.model, &self.config, rasterizer, progress)
    }
}
