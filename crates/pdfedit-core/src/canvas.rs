//! Freehand stroke capture
//!
//! Strokes are kept as polylines and only rasterized when the caller
//! finalizes the canvas. Both page drawing mode and the signature pad use
//! this type.

use crate::error::EditError;
use crate::geometry::{DisplayPoint, DisplaySize};
use crate::raster::has_visible_content;
use image::{Rgba, RgbaImage};
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeCanvas {
    width: u32,
    height: u32,
    stroke_width: f32,
    strokes: Vec<Vec<DisplayPoint>>,
    stroking: bool,
}

impl StrokeCanvas {
    pub fn new(size: DisplaySize, stroke_width: f32) -> Self {
        Self {
            width: size.width.round().max(0.0) as u32,
            height: size.height.round().max(0.0) as u32,
            stroke_width,
            strokes: Vec::new(),
            stroking: false,
        }
    }

    pub fn size(&self) -> DisplaySize {
        DisplaySize::new(self.width as f64, self.height as f64)
    }

    /// Begin a new stroke at `point`.
    pub fn pointer_down(&mut self, point: DisplayPoint) {
        self.strokes.push(vec![point]);
        self.stroking = true;
    }

    /// Extend the current stroke with a segment from the last point to `point`.
    pub fn pointer_move(&mut self, point: DisplayPoint) {
        if !self.stroking {
            return;
        }
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.push(point);
        }
    }

    /// End the current stroke. Later strokes are still accepted.
    pub fn pointer_up(&mut self) {
        self.stroking = false;
    }

    pub fn is_stroking(&self) -> bool {
        self.stroking
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.stroking = false;
    }

    /// Render every stroke in black ink with round caps and joins.
    pub fn rasterize(&self) -> Result<RgbaImage, EditError> {
        let mut pixmap = match Pixmap::new(self.width, self.height) {
            Some(pixmap) => pixmap,
            None => return Ok(RgbaImage::new(self.width, self.height)),
        };

        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.anti_alias = true;

        let stroke = Stroke {
            width: self.stroke_width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };

        for points in &self.strokes {
            // A press without movement leaves no mark.
            if points.len() < 2 {
                continue;
            }
            let mut builder = PathBuilder::new();
            builder.move_to(points[0].x as f32, points[0].y as f32);
            for point in &points[1..] {
                builder.line_to(point.x as f32, point.y as f32);
            }
            if let Some(path) = builder.finish() {
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }

        Ok(pixmap_to_image(&pixmap))
    }

    /// Rasterize and require at least one visible pixel.
    pub fn finalize(&self) -> Result<RgbaImage, EditError> {
        let image = self.rasterize()?;
        if !has_visible_content(&image) {
            return Err(EditError::NoContent);
        }
        Ok(image)
    }
}

/// tiny-skia stores premultiplied RGBA; image expects straight alpha.
fn pixmap_to_image(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = src.demultiply();
        *dst = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}
