//! Page geometry and coordinate transforms
//!
//! Display space is the on-screen preview: origin top-left, y grows down,
//! measured in pixels of a page rendered `display_width` wide.
//! Native space is the PDF page at scale 1.0: origin bottom-left, points.

use crate::error::EditError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

/// Default page size when neither the page nor its ancestors carry a MediaBox
const US_LETTER: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

impl DisplayPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Scale down to `max_width` preserving aspect ratio; never scales up.
    pub fn fit_width(intrinsic_width: f64, intrinsic_height: f64, max_width: f64) -> Self {
        if intrinsic_width <= 0.0 || intrinsic_height <= 0.0 {
            return Self::new(0.0, 0.0);
        }
        let aspect_ratio = intrinsic_width / intrinsic_height;
        let width = intrinsic_width.min(max_width);
        Self::new(width, width / aspect_ratio)
    }
}

/// Rectangle in display space, anchored at its top-left corner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Rectangle in native PDF space, anchored at its bottom-left corner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Native page dimensions in points, after applying /Rotate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Display geometry of one page, recomputed whenever the active page changes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageGeometry {
    pub rendered_width: f64,
    pub rendered_height: f64,
    pub scale_factor: f64,
    pub native_width: f64,
    pub native_height: f64,
}

impl PageGeometry {
    pub fn for_page(native: PageSize, display_width: f64) -> Self {
        let scale_factor = display_width / native.width;
        Self {
            rendered_width: display_width,
            rendered_height: native.height * scale_factor,
            scale_factor,
            native_width: native.width,
            native_height: native.height,
        }
    }

    pub fn rendered_size(&self) -> DisplaySize {
        DisplaySize::new(self.rendered_width, self.rendered_height)
    }

    pub fn to_native_len(&self, len: f64) -> f64 {
        len / self.scale_factor
    }

    /// `(x / scale, nativeHeight - y / scale)`
    pub fn to_native_point(&self, point: DisplayPoint) -> (f64, f64) {
        (
            point.x / self.scale_factor,
            self.native_height - point.y / self.scale_factor,
        )
    }

    /// Convert a top-left anchored display rect into a bottom-left anchored PDF rect.
    pub fn to_native_rect(&self, rect: DisplayRect) -> PdfRect {
        let (x, top) = self.to_native_point(DisplayPoint::new(rect.x, rect.y));
        let width = self.to_native_len(rect.width);
        let height = self.to_native_len(rect.height);
        PdfRect {
            x,
            y: top - height,
            width,
            height,
        }
    }

    /// Keep a rect inside the page overlay, the way a drag is bounded by its parent.
    pub fn clamp_to_overlay(&self, rect: DisplayRect) -> DisplayRect {
        let width = rect.width.min(self.rendered_width).max(0.0);
        let height = rect.height.min(self.rendered_height).max(0.0);
        DisplayRect {
            x: rect.x.clamp(0.0, self.rendered_width - width),
            y: rect.y.clamp(0.0, self.rendered_height - height),
            width,
            height,
        }
    }
}

/// Native size of a 1-indexed page, honoring MediaBox inheritance and /Rotate
pub fn page_size(doc: &Document, page_num: u32) -> Result<PageSize, EditError> {
    let page_id = doc
        .get_pages()
        .get(&page_num)
        .copied()
        .ok_or_else(|| EditError::DocumentLoad(format!("Page {} not found", page_num)))?;

    let media_box = match inherited_attribute(doc, page_id, b"MediaBox") {
        Some(obj) => parse_box(doc, obj)?,
        None => return Ok(US_LETTER),
    };
    let width = (media_box[2] - media_box[0]).abs();
    let height = (media_box[3] - media_box[1]).abs();
    if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
        return Err(EditError::DocumentLoad(format!(
            "Page {} has an empty MediaBox ({} x {})",
            page_num, width, height
        )));
    }

    let rotation = inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .map(normalize_rotation)
        .unwrap_or(0);

    if rotation == 90 || rotation == 270 {
        Ok(PageSize {
            width: height,
            height: width,
        })
    } else {
        Ok(PageSize { width, height })
    }
}

/// Walk the page tree upward until `key` is found.
pub(crate) fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current: Option<&Dictionary> = doc.get_dictionary(page_id).ok();
    // Page trees are shallow; the bound guards against Parent cycles.
    for _ in 0..64 {
        let dict = current?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    None
}

/// Parse a box array `[x1 y1 x2 y2]`, resolving an indirect array if needed.
fn parse_box(doc: &Document, obj: &Object) -> Result<[f64; 4], EditError> {
    let array = match obj {
        Object::Array(a) => a,
        Object::Reference(id) => doc
            .get_object(*id)
            .and_then(Object::as_array)
            .map_err(|e| EditError::DocumentLoad(format!("Invalid MediaBox: {}", e)))?,
        _ => return Err(EditError::DocumentLoad("MediaBox is not an array".into())),
    };

    if array.len() != 4 {
        return Err(EditError::DocumentLoad(format!(
            "MediaBox has {} elements, expected 4",
            array.len()
        )));
    }

    let mut values = [0.0; 4];
    for (i, item) in array.iter().enumerate() {
        values[i] = match item {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => {
                return Err(EditError::DocumentLoad(format!(
                    "MediaBox element {} is not a number",
                    i
                )))
            }
        };
    }
    Ok(values)
}

fn normalize_rotation(angle: i64) -> i64 {
    angle.rem_euclid(360)
}
