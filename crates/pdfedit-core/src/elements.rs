//! Annotation model
//!
//! An ordered, page-scoped collection of overlay elements placed by the user.
//! Positions and sizes are display-space pixels; conversion to PDF space only
//! happens at export time.

use crate::error::EditError;
use crate::geometry::{DisplayPoint, DisplayRect, DisplaySize};
use serde::{Deserialize, Serialize};

pub type ElementId = u64;

/// Box used for text elements placed without an explicit size
pub const DEFAULT_TEXT_BOX: DisplaySize = DisplaySize::new(200.0, 30.0);

/// Size assumed for resizable elements that somehow lack one
const FALLBACK_BOX: DisplaySize = DisplaySize::new(100.0, 100.0);

/// Deserializes from any family name the UI may send, see [`FontFamily::from_name`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String")]
pub enum FontFamily {
    #[default]
    Helvetica,
    TimesRoman,
    Courier,
}

impl FontFamily {
    /// Map a user-facing family name onto one of the three supported families.
    /// Handles CSS generic families as well as names like "Times Roman".
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();

        match lower.as_str() {
            "serif" => return FontFamily::TimesRoman,
            "monospace" => return FontFamily::Courier,
            _ => {}
        }

        if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
            return FontFamily::TimesRoman;
        }

        if lower.contains("courier")
            || lower.contains("mono")
            || lower.contains("consolas")
            || lower.contains("monaco")
        {
            return FontFamily::Courier;
        }

        FontFamily::Helvetica
    }

    /// Standard-14 base font for this family and weight
    pub fn standard_font(self, bold: bool) -> &'static str {
        match (self, bold) {
            (FontFamily::Helvetica, false) => "Helvetica",
            (FontFamily::Helvetica, true) => "Helvetica-Bold",
            (FontFamily::TimesRoman, false) => "Times-Roman",
            (FontFamily::TimesRoman, true) => "Times-Bold",
            (FontFamily::Courier, false) => "Courier",
            (FontFamily::Courier, true) => "Courier-Bold",
        }
    }
}

impl From<String> for FontFamily {
    fn from(name: String) -> Self {
        FontFamily::from_name(&name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Circle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Text,
    Image,
    Shape,
    Drawing,
    Redaction,
}

/// Kind-specific data carried by an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementPayload {
    Text {
        text: String,
        font_size: f64,
        color: String,
        font_family: FontFamily,
        bold: bool,
    },
    Image {
        data_uri: String,
    },
    Shape {
        shape: ShapeKind,
        color: String,
    },
    Drawing {
        data_uri: String,
    },
    /// Opaque white block; carries no data beyond its size
    Redaction,
}

impl ElementPayload {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementPayload::Text { .. } => ElementKind::Text,
            ElementPayload::Image { .. } => ElementKind::Image,
            ElementPayload::Shape { .. } => ElementKind::Shape,
            ElementPayload::Drawing { .. } => ElementKind::Drawing,
            ElementPayload::Redaction => ElementKind::Redaction,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotationElement {
    pub id: ElementId,
    /// 1-indexed page this element is anchored to
    pub page_number: u32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(flatten)]
    pub payload: ElementPayload,
}

impl AnnotationElement {
    pub fn kind(&self) -> ElementKind {
        self.payload.kind()
    }

    /// Display-space bounds, substituting the default box for unsized elements
    pub fn display_rect(&self) -> DisplayRect {
        let fallback = match self.kind() {
            ElementKind::Text => DEFAULT_TEXT_BOX,
            _ => FALLBACK_BOX,
        };
        DisplayRect {
            x: self.x,
            y: self.y,
            width: self.width.unwrap_or(fallback.width),
            height: self.height.unwrap_or(fallback.height),
        }
    }
}

/// Partial update applied by `AnnotationModel::update`.
/// Fields that do not apply to the element's kind are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ElementPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub text: Option<String>,
    pub font_size: Option<f64>,
    pub color: Option<String>,
    pub font_family: Option<FontFamily>,
    pub bold: Option<bool>,
    pub shape: Option<ShapeKind>,
}

impl ElementPatch {
    pub fn position(point: DisplayPoint) -> Self {
        Self {
            x: Some(point.x),
            y: Some(point.y),
            ..Self::default()
        }
    }

    pub fn bounds(rect: DisplayRect) -> Self {
        Self {
            x: Some(rect.x),
            y: Some(rect.y),
            width: Some(rect.width),
            height: Some(rect.height),
            ..Self::default()
        }
    }

    fn apply(&self, element: &mut AnnotationElement) {
        if let Some(x) = self.x {
            element.x = x;
        }
        if let Some(y) = self.y {
            element.y = y;
        }
        if let Some(width) = self.width {
            element.width = Some(width);
        }
        if let Some(height) = self.height {
            element.height = Some(height);
        }

        match &mut element.payload {
            ElementPayload::Text {
                text,
                font_size,
                color,
                font_family,
                bold,
            } => {
                if let Some(new_text) = &self.text {
                    *text = new_text.clone();
                }
                if let Some(size) = self.font_size {
                    *font_size = size;
                }
                if let Some(new_color) = &self.color {
                    *color = new_color.clone();
                }
                if let Some(family) = self.font_family {
                    *font_family = family;
                }
                if let Some(is_bold) = self.bold {
                    *bold = is_bold;
                }
            }
            ElementPayload::Shape { shape, color } => {
                if let Some(kind) = self.shape {
                    *shape = kind;
                }
                if let Some(new_color) = &self.color {
                    *color = new_color.clone();
                }
            }
            ElementPayload::Image { .. } | ElementPayload::Drawing { .. } | ElementPayload::Redaction => {}
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationModel {
    next_id: ElementId,
    elements: Vec<AnnotationElement>,
}

impl AnnotationModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new element and return its freshly allocated id.
    pub fn add(
        &mut self,
        page_number: u32,
        position: DisplayPoint,
        size: Option<DisplaySize>,
        payload: ElementPayload,
    ) -> ElementId {
        let id = self.next_id;
        self.next_id += 1;

        self.elements.push(AnnotationElement {
            id,
            page_number,
            x: position.x,
            y: position.y,
            width: size.map(|s| s.width),
            height: size.map(|s| s.height),
            payload,
        });
        id
    }

    pub fn update(&mut self, id: ElementId, patch: &ElementPatch) -> Result<(), EditError> {
        let element = self
            .elements
            .iter_mut()
            .find(|el| el.id == id)
            .ok_or(EditError::ElementNotFound(id))?;
        patch.apply(element);
        Ok(())
    }

    pub fn remove(&mut self, id: ElementId) -> Result<AnnotationElement, EditError> {
        let pos = self
            .elements
            .iter()
            .position(|el| el.id == id)
            .ok_or(EditError::ElementNotFound(id))?;
        Ok(self.elements.remove(pos))
    }

    pub fn get(&self, id: ElementId) -> Option<&AnnotationElement> {
        self.elements.iter().find(|el| el.id == id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.get(id).is_some()
    }

    pub fn elements(&self) -> &[AnnotationElement] {
        &self.elements
    }

    /// Elements anchored to `page`, in creation order
    pub fn elements_on_page(&self, page: u32) -> Vec<&AnnotationElement> {
        self.elements
            .iter()
            .filter(|el| el.page_number == page)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Drop every element. Ids keep counting up so stale references never alias.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_payload(text: &str) -> ElementPayload {
        ElementPayload::Text {
            text: text.to_string(),
            font_size: 14.0,
            color: "#000000".to_string(),
            font_family: FontFamily::Helvetica,
            bold: false,
        }
    }

    #[test]
    fn test_model_new_is_empty() {
        let model = AnnotationModel::new();
        assert!(model.is_empty());
        assert_eq!(model.len(), 0);
    }

    #[test]
    fn test_rapid_creation_yields_unique_ids() {
        let mut model = AnnotationModel::new();
        let ids: Vec<ElementId> = (0..100)
            .map(|_| {
                model.add(
                    1,
                    DisplayPoint::new(50.0, 50.0),
                    Some(DisplaySize::new(100.0, 100.0)),
                    ElementPayload::Shape {
                        shape: ShapeKind::Rectangle,
                        color: "#FF0000".to_string(),
                    },
                )
            })
            .collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 100);
        assert_eq!(model.len(), 100);
    }

    #[test]
    fn test_ids_not_reused_after_remove_or_clear() {
        let mut model = AnnotationModel::new();
        let first = model.add(1, DisplayPoint::new(0.0, 0.0), None, text_payload("a"));
        model.remove(first).unwrap();
        let second = model.add(1, DisplayPoint::new(0.0, 0.0), None, text_payload("b"));
        model.clear();
        let third = model.add(1, DisplayPoint::new(0.0, 0.0), None, text_payload("c"));
        assert!(first < second && second < third);
    }

    #[test]
    fn test_elements_on_page_preserves_order() {
        let mut model = AnnotationModel::new();
        let a = model.add(1, DisplayPoint::new(0.0, 0.0), None, text_payload("a"));
        model.add(2, DisplayPoint::new(0.0, 0.0), None, text_payload("b"));
        let c = model.add(1, DisplayPoint::new(0.0, 0.0), None, ElementPayload::Redaction);

        let page1: Vec<ElementId> = model.elements_on_page(1).iter().map(|e| e.id).collect();
        assert_eq!(page1, vec![a, c]);
        assert_eq!(model.elements_on_page(3).len(), 0);
    }

    #[test]
    fn test_update_text_styling() {
        let mut model = AnnotationModel::new();
        let id = model.add(1, DisplayPoint::new(10.0, 10.0), None, text_payload("Hello"));
        let patch = ElementPatch {
            text: Some("Goodbye".to_string()),
            font_family: Some(FontFamily::Courier),
            bold: Some(true),
            ..ElementPatch::default()
        };
        model.update(id, &patch).unwrap();

        match &model.get(id).unwrap().payload {
            ElementPayload::Text {
                text,
                font_family,
                bold,
                ..
            } => {
                assert_eq!(text, "Goodbye");
                assert_eq!(*font_family, FontFamily::Courier);
                assert!(*bold);
            }
            other => panic!("Expected text payload, got {:?}", other),
        }
    }

    #[test]
    fn test_update_ignores_fields_for_other_kinds() {
        let mut model = AnnotationModel::new();
        let id = model.add(
            1,
            DisplayPoint::new(50.0, 50.0),
            Some(DisplaySize::new(200.0, 50.0)),
            ElementPayload::Redaction,
        );
        let patch = ElementPatch {
            text: Some("ignored".to_string()),
            width: Some(300.0),
            ..ElementPatch::default()
        };
        model.update(id, &patch).unwrap();
        let element = model.get(id).unwrap();
        assert_eq!(element.width, Some(300.0));
        assert_eq!(element.payload, ElementPayload::Redaction);
    }

    #[test]
    fn test_update_unknown_id_fails() {
        let mut model = AnnotationModel::new();
        let result = model.update(42, &ElementPatch::default());
        assert!(matches!(result, Err(EditError::ElementNotFound(42))));
    }

    #[test]
    fn test_text_without_size_uses_default_box() {
        let mut model = AnnotationModel::new();
        let id = model.add(1, DisplayPoint::new(5.0, 6.0), None, text_payload("x"));
        let rect = model.get(id).unwrap().display_rect();
        assert_eq!(rect.width, DEFAULT_TEXT_BOX.width);
        assert_eq!(rect.height, DEFAULT_TEXT_BOX.height);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut model = AnnotationModel::new();
        model.add(
            2,
            DisplayPoint::new(1.0, 2.0),
            Some(DisplaySize::new(3.0, 4.0)),
            ElementPayload::Shape {
                shape: ShapeKind::Circle,
                color: "#00FF00".to_string(),
            },
        );
        let restored = AnnotationModel::from_json(&model.to_json().unwrap()).unwrap();
        assert_eq!(model.elements(), restored.elements());
    }

    #[test]
    fn test_font_family_mapping() {
        assert_eq!(FontFamily::from_name("Times Roman"), FontFamily::TimesRoman);
        assert_eq!(FontFamily::from_name("TimesRoman"), FontFamily::TimesRoman);
        assert_eq!(FontFamily::from_name("serif"), FontFamily::TimesRoman);
        assert_eq!(FontFamily::from_name("Courier"), FontFamily::Courier);
        assert_eq!(FontFamily::from_name("monospace"), FontFamily::Courier);
        assert_eq!(FontFamily::from_name("Helvetica"), FontFamily::Helvetica);
        assert_eq!(FontFamily::from_name("g_d0_f1"), FontFamily::Helvetica);
    }

    #[test]
    fn test_patch_accepts_ui_family_names() {
        let patch: ElementPatch = serde_json::from_str(r#"{"font_family":"Times Roman"}"#).unwrap();
        assert_eq!(patch.font_family, Some(FontFamily::TimesRoman));

        let patch: ElementPatch = serde_json::from_str(r#"{"font_family":"helvetica"}"#).unwrap();
        assert_eq!(patch.font_family, Some(FontFamily::Helvetica));

        let patch: ElementPatch = serde_json::from_str(r#"{"font_family":"monospace"}"#).unwrap();
        assert_eq!(patch.font_family, Some(FontFamily::Courier));
    }

    #[test]
    fn test_text_restyled_from_json_patch() {
        let mut model = AnnotationModel::new();
        let id = model.add(1, DisplayPoint::new(10.0, 10.0), None, text_payload("Hello"));
        let patch: ElementPatch = serde_json::from_str(r#"{"font_family":"serif","bold":true}"#).unwrap();
        model.update(id, &patch).unwrap();

        match &model.get(id).unwrap().payload {
            ElementPayload::Text { font_family, bold, .. } => {
                assert_eq!(font_family.standard_font(*bold), "Times-Bold");
            }
            other => panic!("Expected text payload, got {:?}", other),
        }
    }

    #[test]
    fn test_standard_font_variants() {
        assert_eq!(FontFamily::Helvetica.standard_font(true), "Helvetica-Bold");
        assert_eq!(FontFamily::TimesRoman.standard_font(false), "Times-Roman");
        assert_eq!(FontFamily::TimesRoman.standard_font(true), "Times-Bold");
        assert_eq!(FontFamily::Courier.standard_font(true), "Courier-Bold");
    }
}
