use std::{fmt, path::Path};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, RgbaImage};
use serde::Serialize;

/// An image encoded as a data URL (`data:<mime>;base64,<payload>`).
///
/// Text pasted by the user is held verbatim, so this may also be bare base64, or garbage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageDataUrl(String);

impl ImageDataUrl {
    /// Use `text` as-is. Nothing is validated until the image is decoded.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Encode raw file bytes, sniffing the MIME type from their contents.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mime = image::guess_format(bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");
        Self::encode(mime, bytes)
    }

    /// Read an image file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Could not read image file: `{}`", path.display()))?;

        let mime = image::guess_format(&bytes)
            .or_else(|_| ImageFormat::from_path(path))
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");

        Ok(Self::encode(mime, &bytes))
    }

    fn encode(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base64 part, without any `data:...,` header.
    pub fn payload(&self) -> &str {
        match self.0.split_once(',') {
            Some((_, payload)) => payload,
            None => &self.0,
        }
    }

    /// Decode the payload into raw bytes. Whitespace is ignored and missing padding restored.
    pub fn decode_bytes(&self) -> Result<Vec<u8>> {
        let mut payload: String = self
            .payload()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        let missing = (4 - payload.len() % 4) % 4;
        payload.extend(std::iter::repeat('=').take(missing));

        STANDARD
            .decode(payload)
            .context("Invalid base64-encoded image data")
    }

    pub fn decode_image(&self) -> Result<RgbaImage> {
        let bytes = self.decode_bytes()?;
        let image = image::load_from_memory(&bytes).context("Unable to open image")?;
        Ok(image.to_rgba8())
    }
}

impl fmt::Display for ImageDataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // data urls get long, only show the start
        const MAX: usize = 48;
        match self.0.char_indices().nth(MAX) {
            Some((idx, _)) => write!(f, "{}...", &self.0[..idx]),
            None => f.write_str(&self.0),
        }
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}
