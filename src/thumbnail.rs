//! Page previews for the editor grid.
//!
//! Rasterizing PDF content is left to the caller's renderer. The engine only
//! attaches whatever comes back to the matching page entry; a failed render
//! never blocks compression or rebuild.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use lopdf::{Document, ObjectId};

use crate::document::page_size;

/// Scale applied to page geometry when rendering previews.
pub const THUMBNAIL_SCALE: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct Thumbnail {
    original_index: usize,
    image: RgbaImage,
}

impl Thumbnail {
    pub fn new(original_index: usize, image: RgbaImage) -> Self {
        Self {
            original_index,
            image,
        }
    }

    pub fn blank(original_index: usize, width: u32, height: u32) -> Self {
        let image = RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([255, 255, 255, 255]));
        Self::new(original_index, image)
    }

    pub fn original_index(&self) -> usize {
        self.original_index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write thumbnail {:?}", path))
    }
}

pub trait ThumbnailRenderer {
    fn render_page(
        &mut self,
        doc: &Document,
        page_id: ObjectId,
        original_index: usize,
        scale: f32,
    ) -> Result<Thumbnail>;
}

/// Renders every page as a blank canvas with the page's scaled proportions.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlankPageRenderer;

impl ThumbnailRenderer for BlankPageRenderer {
    fn render_page(
        &mut self,
        doc: &Document,
        page_id: ObjectId,
        original_index: usize,
        scale: f32,
    ) -> Result<Thumbnail> {
        let (width, height) =
            page_size(doc, page_id).ok_or(anyhow!("Page {} has no MediaBox", original_index))?;
        let width = (width * scale).round() as u32;
        let height = (height * scale).round() as u32;
        Ok(Thumbnail::blank(original_index, width, height))
    }
}
