//! Export / flattening engine
//!
//! Builds a brand new document: every source page becomes a full-bleed raster
//! background at its native size, and the annotations anchored to that page
//! are drawn on top in native PDF space.
//!
//! Failure policy:
//! - a single element whose raster cannot be embedded is logged and skipped
//! - a page that cannot be rendered, or text that cannot be encoded, aborts
//!   the whole export with `EditError::EditExport`

use crate::config::EditorConfig;
use crate::elements::{AnnotationElement, AnnotationModel, ElementId, ElementPayload, ShapeKind};
use crate::error::EditError;
use crate::geometry::{page_size, DisplayPoint, PageGeometry, PageSize, PdfRect};
use crate::raster::{decode_data_uri_raster, jpeg_components, DecodedRaster, RasterFormat};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbaImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::HashMap;
use std::io::Write;

/// Cubic Bézier control distance for a quarter circle of radius 1
const KAPPA: f64 = 0.5523;

/// Baseline-to-baseline distance for multi-line text, in multiples of the font size
const LINE_HEIGHT: f64 = 1.2;

/// Renders source pages to RGBA rasters at a given scale.
pub trait PageRasterizer {
    fn rasterize(&mut self, page: u32, scale: f64) -> Result<RgbaImage, EditError>;
}

/// Rasters supplied ahead of time, typically by the browser's PDF renderer.
/// The requested scale is ignored; callers render at the export scale.
#[derive(Debug, Clone, Default)]
pub struct PrerenderedPages {
    pages: HashMap<u32, RgbaImage>,
}

impl PrerenderedPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, page: u32, image: RgbaImage) {
        self.pages.insert(page, image);
    }

    /// Store a raw RGBA buffer, e.g. straight from a canvas `ImageData`.
    pub fn insert_rgba(&mut self, page: u32, width: u32, height: u32, rgba: Vec<u8>) -> Result<(), EditError> {
        let image = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| EditError::PageRender {
            page,
            reason: format!("RGBA buffer does not match {}x{}", width, height),
        })?;
        self.insert(page, image);
        Ok(())
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains_key(&page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

impl PageRasterizer for PrerenderedPages {
    fn rasterize(&mut self, page: u32, _scale: f64) -> Result<RgbaImage, EditError> {
        self.pages.get(&page).cloned().ok_or_else(|| EditError::PageRender {
            page,
            reason: "page has not been rendered".into(),
        })
    }
}

/// Result of a successful export
#[derive(Debug, Clone)]
pub struct FlattenedDocument {
    pub bytes: Vec<u8>,
    pub page_count: u32,
    pub elements_drawn: usize,
    /// Elements left out because their raster could not be embedded
    pub skipped: Vec<ElementId>,
}

pub fn flatten_document(
    source: &Document,
    model: &AnnotationModel,
    config: &EditorConfig,
    rasterizer: &mut dyn PageRasterizer,
) -> Result<FlattenedDocument, EditError> {
    flatten_document_with_progress(source, model, config, rasterizer, |_, _| {})
}

/// Flatten every page, calling `progress(done, total)` after each one.
pub fn flatten_document_with_progress<F>(
    source: &Document,
    model: &AnnotationModel,
    config: &EditorConfig,
    rasterizer: &mut dyn PageRasterizer,
    mut progress: F,
) -> Result<FlattenedDocument, EditError>
where
    F: FnMut(u32, u32),
{
    if model.is_empty() {
        return Err(EditError::NoElements);
    }

    let result = build_output(source, model, config, rasterizer, &mut progress);
    if let Err(e) = &result {
        tracing::error!("Export aborted: {}", e);
    }
    result
}

fn build_output(
    source: &Document,
    model: &AnnotationModel,
    config: &EditorConfig,
    rasterizer: &mut dyn PageRasterizer,
    progress: &mut dyn FnMut(u32, u32),
) -> Result<FlattenedDocument, EditError> {
    let page_count = source.get_pages().len() as u32;

    let mut out = Document::with_version("1.7");
    let pages_id = out.new_object_id();
    let mut fonts = FontRegistry::default();
    let mut kids = Vec::with_capacity(page_count as usize);
    let mut elements_drawn = 0;
    let mut skipped = Vec::new();

    for page in 1..=page_count {
        let size = page_size(source, page).map_err(|e| as_page_render(page, e).into_export())?;

        let raster = rasterizer
            .rasterize(page, config.export_scale)
            .map_err(|e| as_page_render(page, e).into_export())?;
        if raster.width() == 0 || raster.height() == 0 {
            return Err(EditError::PageRender {
                page,
                reason: "rasterizer returned an empty image".into(),
            }
            .into_export());
        }

        let mut builder = PageBuilder::new(size);
        builder.draw_background(&mut out, &raster)?;

        let geometry = PageGeometry::for_page(size, config.display_width);
        for element in model.elements_on_page(page) {
            if is_blank_text(element) {
                tracing::debug!("Element {} has no text, nothing to draw", element.id);
                continue;
            }
            match draw_element(&mut out, &mut builder, &mut fonts, &geometry, element) {
                Ok(()) => elements_drawn += 1,
                Err(EditError::ElementEmbed { id, reason }) => {
                    tracing::warn!("Skipping element {} on page {}: {}", id, page, reason);
                    skipped.push(id);
                }
                Err(e) => return Err(e.into_export()),
            }
        }

        kids.push(Object::Reference(builder.finish(&mut out, pages_id)?));
        tracing::debug!("Flattened page {}/{}", page, page_count);
        progress(page, page_count);
    }

    out.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);
    out.compress();

    let mut bytes = Vec::new();
    out.save_to(&mut bytes)
        .map_err(|e| EditError::Operation(format!("Failed to save PDF: {}", e)).into_export())?;

    tracing::info!(
        "Exported {} pages, {} elements drawn, {} skipped",
        page_count,
        elements_drawn,
        skipped.len()
    );

    Ok(FlattenedDocument {
        bytes,
        page_count,
        elements_drawn,
        skipped,
    })
}

fn as_page_render(page: u32, error: EditError) -> EditError {
    match error {
        EditError::PageRender { .. } => error,
        other => EditError::PageRender {
            page,
            reason: other.to_string(),
        },
    }
}

/// Content stream and resources for one output page
struct PageBuilder {
    size: PageSize,
    operations: Vec<Operation>,
    xobjects: Dictionary,
    fonts: Dictionary,
    next_image: usize,
}

impl PageBuilder {
    fn new(size: PageSize) -> Self {
        Self {
            size,
            operations: Vec::new(),
            xobjects: Dictionary::new(),
            fonts: Dictionary::new(),
            next_image: 0,
        }
    }

    fn draw_background(&mut self, doc: &mut Document, raster: &RgbaImage) -> Result<(), EditError> {
        let rgb = composite_on_white(raster);
        let data = deflate(&rgb).map_err(|e| EditError::Operation(e.to_string()).into_export())?;
        let stream = image_stream(raster.width(), raster.height(), "DeviceRGB", "FlateDecode", data, None);
        let id = doc.add_object(stream);
        self.xobjects.set("Bg", id);

        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(self.size.width),
                    0.into(),
                    0.into(),
                    real(self.size.height),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Bg".to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    /// Register an image XObject and return its resource name.
    fn add_image(&mut self, id: ObjectId) -> String {
        self.next_image += 1;
        let name = format!("Im{}", self.next_image);
        self.xobjects.set(name.as_bytes(), id);
        name
    }

    fn finish(self, doc: &mut Document, pages_id: ObjectId) -> Result<ObjectId, EditError> {
        let content = Content {
            operations: self.operations,
        };
        let encoded = content
            .encode()
            .map_err(|e| EditError::Operation(format!("Failed to encode content: {}", e)).into_export())?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let mut resources = Dictionary::new();
        resources.set("XObject", self.xobjects);
        if !self.fonts.is_empty() {
            resources.set("Font", self.fonts);
        }

        Ok(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), real(self.size.width), real(self.size.height)],
            "Contents" => content_id,
            "Resources" => resources,
        }))
    }
}

/// One Type1 font object per base font, shared by every page.
#[derive(Default)]
struct FontRegistry {
    fonts: Vec<(&'static str, ObjectId)>,
}

impl FontRegistry {
    fn resource(&mut self, doc: &mut Document, base_font: &'static str) -> (String, ObjectId) {
        let index = match self.fonts.iter().position(|(name, _)| *name == base_font) {
            Some(index) => index,
            None => {
                let id = doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => base_font,
                    "Encoding" => "WinAnsiEncoding",
                });
                self.fonts.push((base_font, id));
                self.fonts.len() - 1
            }
        };
        (format!("F{}", index + 1), self.fonts[index].1)
    }
}

fn draw_element(
    doc: &mut Document,
    page: &mut PageBuilder,
    fonts: &mut FontRegistry,
    geometry: &PageGeometry,
    element: &AnnotationElement,
) -> Result<(), EditError> {
    let rect = geometry.to_native_rect(element.display_rect());

    match &element.payload {
        ElementPayload::Text {
            text,
            font_size,
            color,
            font_family,
            bold,
        } => {
            let lines = text
                .lines()
                .map(encode_win_ansi)
                .collect::<Result<Vec<_>, _>>()?;

            let (font_name, font_id) = fonts.resource(doc, font_family.standard_font(*bold));
            page.fonts.set(font_name.as_bytes(), font_id);

            let (x, top) = geometry.to_native_point(DisplayPoint::new(element.x, element.y));
            page.operations.extend(text_operations(
                &font_name,
                *font_size,
                parse_hex_color(color),
                (x, top - font_size),
                lines,
            ));
        }
        ElementPayload::Image { data_uri } | ElementPayload::Drawing { data_uri } => {
            let raster = decode_data_uri_raster(data_uri).map_err(|e| EditError::ElementEmbed {
                id: element.id,
                reason: e.to_string(),
            })?;
            let xobject = embed_raster(doc, &raster).map_err(|e| EditError::ElementEmbed {
                id: element.id,
                reason: e.to_string(),
            })?;
            let name = page.add_image(xobject);
            page.operations.extend(image_operations(&name, rect));
        }
        ElementPayload::Shape { shape, color } => {
            let fill = parse_hex_color(color);
            match shape {
                ShapeKind::Rectangle => page.operations.extend(rect_fill(rect, fill)),
                ShapeKind::Circle => {
                    let radius = rect.width / 2.0;
                    let center = (rect.x + radius, rect.y + rect.height - radius);
                    page.operations.extend(circle_fill(center, radius, fill));
                }
            }
        }
        ElementPayload::Redaction => {
            page.operations.extend(rect_fill(rect, (1.0, 1.0, 1.0)));
        }
    }

    tracing::debug!("Drew {:?} element {}", element.kind(), element.id);
    Ok(())
}

fn is_blank_text(element: &AnnotationElement) -> bool {
    matches!(&element.payload, ElementPayload::Text { text, .. } if text.trim().is_empty())
}

fn text_operations(
    font_name: &str,
    font_size: f64,
    (r, g, b): (f32, f32, f32),
    (x, y): (f64, f64),
    lines: Vec<Vec<u8>>,
) -> Vec<Operation> {
    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font_name.as_bytes().to_vec()), real(font_size)],
        ),
        Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
        Operation::new("TL", vec![real(font_size * LINE_HEIGHT)]),
        Operation::new("Td", vec![real(x), real(y)]),
    ];
    for (i, line) in lines.into_iter().enumerate() {
        if i > 0 {
            ops.push(Operation::new("T*", vec![]));
        }
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(line, StringFormat::Literal)],
        ));
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

fn image_operations(name: &str, rect: PdfRect) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(rect.width),
                0.into(),
                0.into(),
                real(rect.height),
                real(rect.x),
                real(rect.y),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

fn rect_fill(rect: PdfRect, (r, g, b): (f32, f32, f32)) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
        Operation::new(
            "re",
            vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Four Bézier quarter arcs, counter-clockwise from the rightmost point.
fn circle_fill((cx, cy): (f64, f64), radius: f64, (r, g, b): (f32, f32, f32)) -> Vec<Operation> {
    let k = KAPPA * radius;
    let curve = |pts: [f64; 6]| Operation::new("c", pts.iter().map(|v| real(*v)).collect());

    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
        Operation::new("m", vec![real(cx + radius), real(cy)]),
        curve([cx + radius, cy + k, cx + k, cy + radius, cx, cy + radius]),
        curve([cx - k, cy + radius, cx - radius, cy + k, cx - radius, cy]),
        curve([cx - radius, cy - k, cx - k, cy - radius, cx, cy - radius]),
        curve([cx + k, cy - radius, cx + radius, cy - k, cx + radius, cy]),
        Operation::new("h", vec![]),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Colour space for passing a JPEG through untouched. CMYK and anything
/// unrecognised get `None` and are re-encoded from the decoded pixels.
fn jpeg_color_space(raster: &DecodedRaster) -> Option<&'static str> {
    if raster.format != RasterFormat::Jpeg {
        return None;
    }
    match jpeg_components(&raster.encoded)? {
        1 => Some("DeviceGray"),
        3 => Some("DeviceRGB"),
        _ => None,
    }
}

/// Embed a decoded raster as an image XObject.
/// Gray and RGB JPEG data is passed through; anything else is re-encoded with a soft mask.
fn embed_raster(doc: &mut Document, raster: &DecodedRaster) -> Result<ObjectId, EditError> {
    let (width, height) = (raster.width(), raster.height());

    if let Some(color_space) = jpeg_color_space(raster) {
        let stream = image_stream(width, height, color_space, "DCTDecode", raster.encoded.clone(), None);
        return Ok(doc.add_object(stream));
    }

    let rgba = raster.image.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for px in rgba.pixels() {
        rgb.extend_from_slice(&px.0[..3]);
        alpha.push(px[3]);
    }

    let rgb = deflate(&rgb).map_err(|e| EditError::ImageDecode(e.to_string()))?;
    let smask = if alpha.iter().any(|&a| a < 255) {
        let alpha = deflate(&alpha).map_err(|e| EditError::ImageDecode(e.to_string()))?;
        Some(doc.add_object(image_stream(width, height, "DeviceGray", "FlateDecode", alpha, None)))
    } else {
        None
    };

    Ok(doc.add_object(image_stream(width, height, "DeviceRGB", "FlateDecode", rgb, smask)))
}

fn image_stream(
    width: u32,
    height: u32,
    color_space: &str,
    filter: &str,
    data: Vec<u8>,
    smask: Option<ObjectId>,
) -> Stream {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => Object::Name(color_space.as_bytes().to_vec()),
        "BitsPerComponent" => 8,
        "Filter" => Object::Name(filter.as_bytes().to_vec()),
    };
    if let Some(id) = smask {
        dict.set("SMask", id);
    }
    // Data is already encoded; keep Document::compress from touching it.
    Stream::new(dict, data).with_compression(false)
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Drop alpha by compositing over a white page.
fn composite_on_white(image: &RgbaImage) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((image.width() * image.height() * 3) as usize);
    for px in image.pixels() {
        let alpha = px[3] as u32;
        for channel in &px.0[..3] {
            let blended = (*channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255;
            rgb.push(blended as u8);
        }
    }
    rgb
}

/// Parse `#RRGGBB` into 0-1 components. Anything unparseable is black.
fn parse_hex_color(color: &str) -> (f32, f32, f32) {
    let hex = color.trim_start_matches('#');
    if hex.len() < 6 || !hex.is_ascii() {
        return (0.0, 0.0, 0.0);
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).unwrap_or(0) as f32 / 255.0
    };
    (channel(0..2), channel(2..4), channel(4..6))
}

/// Encode text for a Standard-14 font using WinAnsiEncoding.
pub fn encode_win_ansi(text: &str) -> Result<Vec<u8>, EditError> {
    text.chars()
        .filter(|c| *c != '\r')
        .map(|c| {
            win_ansi_byte(c).ok_or_else(|| {
                EditError::TextEncoding(format!(
                    "'{}' (U+{:04X}) is not available in WinAnsiEncoding",
                    c, c as u32
                ))
            })
        })
        .collect()
}

fn win_ansi_byte(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => match c {
            '€' => Some(0x80),
            '‚' => Some(0x82),
            'ƒ' => Some(0x83),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '†' => Some(0x86),
            '‡' => Some(0x87),
            'ˆ' => Some(0x88),
            '‰' => Some(0x89),
            'Š' => Some(0x8A),
            '‹' => Some(0x8B),
            'Œ' => Some(0x8C),
            'Ž' => Some(0x8E),
            '\u{2018}' => Some(0x91),
            '\u{2019}' => Some(0x92),
            '\u{201C}' => Some(0x93),
            '\u{201D}' => Some(0x94),
            '•' => Some(0x95),
            '\u{2013}' => Some(0x96),
            '\u{2014}' => Some(0x97),
            '˜' => Some(0x98),
            '™' => Some(0x99),
            'š' => Some(0x9A),
            '›' => Some(0x9B),
            'œ' => Some(0x9C),
            'ž' => Some(0x9E),
            'Ÿ' => Some(0x9F),
            _ => None,
        },
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{ElementPatch, FontFamily};
    use crate::geometry::DisplaySize;
    use crate::loader::test_pdf;
    use crate::raster::png_data_uri;
    use image::Rgba;

    fn source(pages: u32) -> Document {
        Document::load_mem(&test_pdf::build(pages, 612, 792)).unwrap()
    }

    fn rasters(pages: u32) -> PrerenderedPages {
        let mut prerendered = PrerenderedPages::new();
        for page in 1..=pages {
            prerendered.insert(page, RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])));
        }
        prerendered
    }

    fn page_operations(bytes: &[u8], page: u32) -> Vec<Operation> {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = doc.get_pages()[&page];
        let content = doc.get_page_content(page_id).unwrap();
        Content::decode(&content).unwrap().operations
    }

    fn operands(op: &Operation) -> Vec<f64> {
        op.operands.iter().map(|o| o.as_float().unwrap() as f64).collect()
    }

    #[test]
    fn test_empty_model_is_rejected() {
        let result = flatten_document(&source(1), &AnnotationModel::new(), &EditorConfig::default(), &mut rasters(1));
        assert!(matches!(result, Err(EditError::NoElements)));
    }

    #[test]
    fn test_missing_raster_is_fatal_page_render() {
        let mut model = AnnotationModel::new();
        model.add(1, DisplayPoint::new(50.0, 50.0), Some(DisplaySize::new(200.0, 50.0)), ElementPayload::Redaction);

        let mut partial = rasters(1);
        let result = flatten_document(&source(2), &model, &EditorConfig::default(), &mut partial);
        match result {
            Err(EditError::EditExport(inner)) => {
                assert!(matches!(*inner, EditError::PageRender { page: 2, .. }))
            }
            other => panic!("Expected EditExport(PageRender), got {:?}", other.map(|d| d.page_count)),
        }
    }

    #[test]
    fn test_unencodable_text_is_fatal() {
        let mut model = AnnotationModel::new();
        model.add(
            1,
            DisplayPoint::new(10.0, 10.0),
            None,
            ElementPayload::Text {
                text: "日本語".into(),
                font_size: 14.0,
                color: "#000000".into(),
                font_family: FontFamily::Helvetica,
                bold: false,
            },
        );
        let result = flatten_document(&source(1), &model, &EditorConfig::default(), &mut rasters(1));
        match result {
            Err(EditError::EditExport(inner)) => assert!(matches!(*inner, EditError::TextEncoding(_))),
            other => panic!("Expected EditExport(TextEncoding), got {:?}", other.map(|d| d.page_count)),
        }
    }

    #[test]
    fn test_output_pages_keep_native_size() {
        let mut model = AnnotationModel::new();
        model.add(1, DisplayPoint::new(0.0, 0.0), None, ElementPayload::Redaction);

        let out = flatten_document(&source(2), &model, &EditorConfig::default(), &mut rasters(2)).unwrap();
        assert_eq!(out.page_count, 2);

        let doc = Document::load_mem(&out.bytes).unwrap();
        for page_id in doc.get_pages().values() {
            let media_box = doc.get_dictionary(*page_id).unwrap().get(b"MediaBox").unwrap().as_array().unwrap();
            let dims: Vec<f32> = media_box.iter().map(|o| o.as_float().unwrap()).collect();
            assert_eq!(dims, vec![0.0, 0.0, 612.0, 792.0]);
        }
    }

    #[test]
    fn test_redaction_is_white_fill() {
        let mut model = AnnotationModel::new();
        model.add(1, DisplayPoint::new(80.0, 160.0), Some(DisplaySize::new(200.0, 50.0)), ElementPayload::Redaction);
        let out = flatten_document(&source(1), &model, &EditorConfig::default(), &mut rasters(1)).unwrap();

        let ops = page_operations(&out.bytes, 1);
        let re = ops.iter().position(|op| op.operator == "re").unwrap();
        assert_eq!(operands(&ops[re - 1]), vec![1.0, 1.0, 1.0]);
        assert_eq!(ops[re + 1].operator, "f");

        let scale = 800.0 / 612.0;
        let rect = operands(&ops[re]);
        assert!((rect[0] - 80.0 / scale).abs() < 0.01);
        assert!((rect[1] - (792.0 - 160.0 / scale - 50.0 / scale)).abs() < 0.01);
        assert!((rect[2] - 200.0 / scale).abs() < 0.01);
    }

    #[test]
    fn test_circle_is_centered_in_bounds() {
        let mut model = AnnotationModel::new();
        model.add(
            1,
            DisplayPoint::new(0.0, 0.0),
            Some(DisplaySize::new(800.0, 800.0)),
            ElementPayload::Shape {
                shape: ShapeKind::Circle,
                color: "#FF0000".into(),
            },
        );
        let out = flatten_document(&source(1), &model, &EditorConfig::default(), &mut rasters(1)).unwrap();
        let ops = page_operations(&out.bytes, 1);

        assert_eq!(ops.iter().filter(|op| op.operator == "c").count(), 4);
        let start = ops.iter().find(|op| op.operator == "m").unwrap();
        // 800 display px is the full 612pt width: radius 306, centre (306, 486).
        let m = operands(start);
        assert!((m[0] - 612.0).abs() < 0.01);
        assert!((m[1] - 486.0).abs() < 0.01);
    }

    #[test]
    fn test_bad_image_is_skipped_not_fatal() {
        let mut model = AnnotationModel::new();
        let bad = model.add(
            1,
            DisplayPoint::new(50.0, 50.0),
            Some(DisplaySize::new(100.0, 100.0)),
            ElementPayload::Image {
                data_uri: "data:image/png;base64,bm90IGFuIGltYWdl".into(),
            },
        );
        model.add(1, DisplayPoint::new(0.0, 0.0), None, ElementPayload::Redaction);

        let out = flatten_document(&source(1), &model, &EditorConfig::default(), &mut rasters(1)).unwrap();
        assert_eq!(out.skipped, vec![bad]);
        assert_eq!(out.elements_drawn, 1);
    }

    #[test]
    fn test_png_with_alpha_gets_soft_mask() {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        let mut model = AnnotationModel::new();
        model.add(
            1,
            DisplayPoint::new(0.0, 0.0),
            Some(DisplaySize::new(20.0, 20.0)),
            ElementPayload::Drawing {
                data_uri: png_data_uri(&img).unwrap(),
            },
        );
        let out = flatten_document(&source(1), &model, &EditorConfig::default(), &mut rasters(1)).unwrap();

        let doc = Document::load_mem(&out.bytes).unwrap();
        let page_id = doc.get_pages()[&1];
        let resources = doc.get_dictionary(page_id).unwrap().get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"Im1").unwrap().as_reference().unwrap();
        let image = doc.get_object(image_id).unwrap().as_stream().unwrap();
        assert!(image.dict.get(b"SMask").is_ok());
    }

    #[test]
    fn test_blank_text_is_not_counted_as_drawn() {
        let mut model = AnnotationModel::new();
        let id = model.add(
            1,
            DisplayPoint::new(10.0, 10.0),
            None,
            ElementPayload::Text {
                text: "Draft".into(),
                font_size: 14.0,
                color: "#000000".into(),
                font_family: FontFamily::Helvetica,
                bold: false,
            },
        );
        model
            .update(id, &ElementPatch { text: Some(String::new()), ..ElementPatch::default() })
            .unwrap();
        model.add(1, DisplayPoint::new(0.0, 0.0), None, ElementPayload::Redaction);

        let out = flatten_document(&source(1), &model, &EditorConfig::default(), &mut rasters(1)).unwrap();
        assert_eq!(out.elements_drawn, 1);
        assert!(out.skipped.is_empty());
        assert!(page_operations(&out.bytes, 1).iter().all(|op| op.operator != "BT"));
    }

    #[test]
    fn test_multi_line_text_uses_leading() {
        let mut model = AnnotationModel::new();
        model.add(
            1,
            DisplayPoint::new(10.0, 10.0),
            None,
            ElementPayload::Text {
                text: "Line one\nLine two".into(),
                font_size: 10.0,
                color: "#000000".into(),
                font_family: FontFamily::Helvetica,
                bold: false,
            },
        );

        let out = flatten_document(&source(1), &model, &EditorConfig::default(), &mut rasters(1)).unwrap();
        let ops = page_operations(&out.bytes, 1);
        let text_ops: Vec<&str> = ops
            .iter()
            .map(|op| op.operator.as_str())
            .skip_while(|op| *op != "BT")
            .collect();
        assert_eq!(text_ops, vec!["BT", "Tf", "rg", "TL", "Td", "Tj", "T*", "Tj", "ET"]);

        let leading = ops.iter().find(|op| op.operator == "TL").unwrap();
        assert!((operands(leading)[0] - 12.0).abs() < 1e-3);
        let shown: Vec<Vec<u8>> = ops
            .iter()
            .filter(|op| op.operator == "Tj")
            .map(|op| op.operands[0].as_str().unwrap().to_vec())
            .collect();
        assert_eq!(shown, vec![b"Line one".to_vec(), b"Line two".to_vec()]);
    }

    #[test]
    fn test_cmyk_jpeg_is_not_passed_through() {
        let rgb = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255]));
        let cmyk_header = vec![
            0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x14, 0x08, 0x00, 0x10, 0x00, 0x10, 0x04,
        ];
        let raster = DecodedRaster {
            format: RasterFormat::Jpeg,
            encoded: cmyk_header,
            image: image::DynamicImage::ImageRgba8(rgb),
        };
        assert_eq!(jpeg_color_space(&raster), None);

        let mut doc = Document::with_version("1.7");
        let id = embed_raster(&mut doc, &raster).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode".as_slice());
        assert_eq!(stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceRGB".as_slice());
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), (1.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("00ff00"), (0.0, 1.0, 0.0));
        assert_eq!(parse_hex_color("#abc"), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Hi (é)").unwrap(), b"Hi (\xE9)".to_vec());
        assert_eq!(encode_win_ansi("€—").unwrap(), vec![0x80, 0x97]);
        assert!(matches!(encode_win_ansi("→"), Err(EditError::TextEncoding(_))));
    }

    #[test]
    fn test_prerendered_rejects_mismatched_buffer() {
        let mut pages = PrerenderedPages::new();
        assert!(pages.insert_rgba(1, 2, 2, vec![0; 15]).is_err());
        assert!(pages.insert_rgba(1, 2, 2, vec![0; 16]).is_ok());
        assert!(pages.contains(1));
    }
}
