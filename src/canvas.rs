use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::{imageops::FilterType, ImageFormat, Rgba, RgbaImage};

use crate::{image_data::ImageDataUrl, services::ocr::BBox};

/// File name used when downloading an annotated image.
pub const ANNOTATED_FILE_NAME: &str = "annotated_image.png";

/// Uniform scale factor which makes an image fit entirely inside the viewport.
///
/// Small images are scaled up. The result always satisfies `scale * width <= viewport_width` and
/// `scale * height <= viewport_height`.
pub fn fit_scale(image_size: (u32, u32), viewport: (f32, f32)) -> f32 {
    let (width, height) = (image_size.0.max(1) as f32, image_size.1.max(1) as f32);
    let (viewport_width, viewport_height) = (viewport.0.max(0.0), viewport.1.max(0.0));

    let mut scale = f32::min(viewport_width / width, viewport_height / height);
    // float division can round up by an ulp
    while scale > 0.0 && (scale * width > viewport_width || scale * height > viewport_height) {
        scale *= 1.0 - f32::EPSILON;
    }
    scale
}

#[derive(Debug, Clone, Copy)]
pub struct Stroke {
    pub colour: [u8; 3],
    /// Line width in source image pixels.
    pub width: f32,
}

/// An image scaled to fit a viewport, with bounding boxes drawn on top.
#[derive(Debug, Clone)]
pub struct Canvas {
    pub scale: f32,
    pub image: RgbaImage,
    /// Number of rectangles stroked onto the canvas.
    pub rects_drawn: usize,
}

impl Canvas {
    /// Draw `source` scaled to fit `viewport`, then stroke every bounding box.
    ///
    /// Boxes are given in source image coordinates and go through the same scale as the image.
    pub fn render(source: &RgbaImage, bboxes: &[BBox], viewport: (f32, f32), stroke: Stroke) -> Self {
        let scale = fit_scale(source.dimensions(), viewport);
        let width = ((source.width() as f32 * scale).floor() as u32).max(1);
        let height = ((source.height() as f32 * scale).floor() as u32).max(1);

        let mut canvas = Self {
            scale,
            image: image::imageops::resize(source, width, height, FilterType::Triangle),
            rects_drawn: 0,
        };

        for bbox in bboxes {
            canvas.stroke_rect(bbox, stroke);
        }

        canvas
    }

    /// Same as a 2d canvas `strokeRect`: the line is centred on the rectangle's outline.
    fn stroke_rect(&mut self, bbox: &BBox, stroke: Stroke) {
        let s = self.scale;
        let (x0, y0, x1, y1) = (bbox.x_min * s, bbox.y_min * s, bbox.x_max * s, bbox.y_max * s);
        let half = stroke.width * s / 2.0;
        let colour = Rgba([stroke.colour[0], stroke.colour[1], stroke.colour[2], 255]);

        self.fill(x0 - half, y0 - half, x1 + half, y0 + half, colour);
        self.fill(x0 - half, y1 - half, x1 + half, y1 + half, colour);
        self.fill(x0 - half, y0 - half, x0 + half, y1 + half, colour);
        self.fill(x1 - half, y0 - half, x1 + half, y1 + half, colour);

        self.rects_drawn += 1;
    }

    fn fill(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, colour: Rgba<u8>) {
        // at least one pixel wide, clipped to [0, max]
        fn span(from: f32, to: f32, max: u32) -> std::ops::Range<u32> {
            let clamp = |n: f32| n.round().clamp(0.0, max as f32) as u32;
            let start = clamp(from);
            let end = clamp(to).max(start.saturating_add(1)).min(max);
            start..end
        }

        for y in span(y0, y1, self.image.height()) {
            for x in span(x0, x1, self.image.width()) {
                self.image.put_pixel(x, y, colour);
            }
        }
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buf, ImageFormat::Png)
            .context("Could not encode annotated image as PNG")?;
        Ok(buf.into_inner())
    }

    pub fn to_data_url(&self) -> Result<ImageDataUrl> {
        Ok(ImageDataUrl::from_bytes(&self.to_png()?))
    }

    /// Write the canvas as [`ANNOTATED_FILE_NAME`] into `dir`, returning the written path.
    pub fn download(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Could not create download directory: `{}`", dir.display()))?;

        let path = dir.join(ANNOTATED_FILE_NAME);
        std::fs::write(&path, self.to_png()?)
            .with_context(|| format!("Could not write annotated image: `{}`", path.display()))?;

        log::info!("Downloaded annotated image to `{}`", path.display());
        Ok(path)
    }
}
