//! Reusable signature collection
//!
//! Signatures outlive any single document. They are kept as an ordered list
//! of PNG data URIs in one durable key-value slot, rewritten on every change.

use crate::canvas::StrokeCanvas;
use crate::error::EditError;
use crate::raster::{decode_raster, png_data_uri};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Backgrounds at or below this luminance are treated as dark.
const LIGHT_BACKGROUND_LUMINANCE: f64 = 100.0;
/// How far below the background luminance a pixel must be to count as ink.
const INK_MARGIN: f64 = 40.0;
/// Threshold used when the background is dark.
const DARK_BACKGROUND_THRESHOLD: f64 = 200.0;

/// A durable string slot, e.g. browser `localStorage`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, EditError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), EditError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, EditError> {
        Ok(self.slots.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), EditError> {
        self.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SignatureRecord {
    pub data_uri: String,
}

pub struct SignatureStore<S: KeyValueStore> {
    backend: S,
    key: String,
    records: Vec<SignatureRecord>,
}

impl<S: KeyValueStore> SignatureStore<S> {
    /// Load the collection from `key`. An unreadable slot starts empty.
    pub fn open(backend: S, key: &str) -> Result<Self, EditError> {
        let records = match backend.get(key)? {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable signature list: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        tracing::debug!("Loaded {} saved signatures", records.len());

        Ok(Self {
            backend,
            key: key.to_string(),
            records,
        })
    }

    pub fn records(&self) -> &[SignatureRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Result<&SignatureRecord, EditError> {
        self.records
            .get(index)
            .ok_or(EditError::SignatureNotFound(index))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Append a signature and persist. Returns its index.
    pub fn add(&mut self, data_uri: String) -> Result<usize, EditError> {
        self.records.push(SignatureRecord { data_uri });
        if let Err(e) = self.persist() {
            self.records.pop();
            return Err(e);
        }
        Ok(self.records.len() - 1)
    }

    /// Delete by index and persist. There is no undo.
    pub fn remove(&mut self, index: usize) -> Result<SignatureRecord, EditError> {
        if index >= self.records.len() {
            return Err(EditError::SignatureNotFound(index));
        }
        let removed = self.records.remove(index);
        if let Err(e) = self.persist() {
            self.records.insert(index, removed);
            return Err(e);
        }
        Ok(removed)
    }

    /// Save a hand-drawn signature from the signature pad.
    pub fn save_drawn(&mut self, canvas: &StrokeCanvas) -> Result<usize, EditError> {
        let image = canvas.finalize()?;
        self.add(png_data_uri(&image)?)
    }

    /// Save an uploaded photo or scan with its background keyed out.
    pub fn save_uploaded(&mut self, bytes: &[u8]) -> Result<usize, EditError> {
        let mut image = decode_raster(bytes)?.image.to_rgba8();
        remove_background(&mut image);
        self.add(png_data_uri(&image)?)
    }

    fn persist(&mut self) -> Result<(), EditError> {
        let json = serde_json::to_string(&self.records)
            .map_err(|e| EditError::Storage(e.to_string()))?;
        self.backend.set(&self.key, &json)
    }
}

fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

/// Make light pixels transparent, keyed off the average of the four corners.
///
/// This is a luminance chroma-key, not segmentation: anti-aliased edges and
/// light ink strokes can be clipped, and unevenly lit photos may keep patches
/// of background.
pub fn remove_background(image: &mut RgbaImage) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let corners = [
        (0, 0),
        (width - 1, 0),
        (0, height - 1),
        (width - 1, height - 1),
    ];
    let (mut r, mut g, mut b) = (0.0, 0.0, 0.0);
    for (x, y) in corners {
        let px = image.get_pixel(x, y);
        r += px[0] as f64;
        g += px[1] as f64;
        b += px[2] as f64;
    }
    let samples = corners.len() as f64;
    let background = 0.299 * (r / samples) + 0.587 * (g / samples) + 0.114 * (b / samples);

    let threshold = if background > LIGHT_BACKGROUND_LUMINANCE {
        background - INK_MARGIN
    } else {
        DARK_BACKGROUND_THRESHOLD
    };

    for px in image.pixels_mut() {
        if luminance(px[0], px[1], px[2]) > threshold {
            px[3] = 0;
        }
    }
}
