//! Raster helpers: data URIs, decoding with format fallback, PNG encoding

use crate::error::EditError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbaImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

/// A decoded raster together with the encoded bytes it came from
#[derive(Debug, Clone)]
pub struct DecodedRaster {
    pub format: RasterFormat,
    pub encoded: Vec<u8>,
    pub image: DynamicImage,
}

impl DecodedRaster {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Split a base64 `data:` URI into its media type and payload bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), EditError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| EditError::ImageDecode("Not a data URI".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| EditError::ImageDecode("Data URI has no payload".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| EditError::ImageDecode("Data URI is not base64 encoded".into()))?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| EditError::ImageDecode(format!("Invalid base64: {}", e)))?;
    Ok((mime.to_string(), bytes))
}

/// Decode raster bytes, trying PNG first and falling back to JPEG.
pub fn decode_raster(bytes: &[u8]) -> Result<DecodedRaster, EditError> {
    match image::load_from_memory_with_format(bytes, ImageFormat::Png) {
        Ok(image) => Ok(DecodedRaster {
            format: RasterFormat::Png,
            encoded: bytes.to_vec(),
            image,
        }),
        Err(png_err) => image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map(|image| DecodedRaster {
                format: RasterFormat::Jpeg,
                encoded: bytes.to_vec(),
                image,
            })
            .map_err(|jpeg_err| {
                EditError::ImageDecode(format!(
                    "not a PNG ({}) or JPEG ({})",
                    png_err, jpeg_err
                ))
            }),
    }
}

pub fn decode_data_uri_raster(uri: &str) -> Result<DecodedRaster, EditError> {
    let (_, bytes) = decode_data_uri(uri)?;
    decode_raster(&bytes)
}

/// Colour component count from a JPEG frame header (1 gray, 3 YCbCr/RGB, 4 CMYK).
pub fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        match marker {
            // fill byte
            0xFF => pos += 1,
            // standalone markers carry no length
            0x01 | 0xD0..=0xD7 => pos += 2,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                // FF Cn, length(2), precision(1), height(2), width(2), components(1)
                return bytes.get(pos + 9).copied();
            }
            0xDA => return None,
            _ => {
                let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
                pos += 2 + len;
            }
        }
    }
    None
}

/// True when any pixel carries non-zero alpha
pub fn has_visible_content(image: &RgbaImage) -> bool {
    image.pixels().any(|px| px[3] > 0)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EditError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, image.width(), image.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| EditError::ImageDecode(format!("PNG encoding failed: {}", e)))?;
        writer
            .write_image_data(image.as_raw())
            .map_err(|e| EditError::ImageDecode(format!("PNG encoding failed: {}", e)))?;
    }
    Ok(out)
}

pub fn png_data_uri(image: &RgbaImage) -> Result<String, EditError> {
    Ok(encode_data_uri("image/png", &encode_png(image)?))
}
