//! Document rasterization collaborator.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use kurbo::{Rect, Size};
use marginalia_core::repository::BoxFuture;
use std::path::Path;
use thiserror::Error;

/// Document rendering errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },
    #[error("Failed to decode page: {0}")]
    Decode(String),
    #[error("Render failed: {0}")]
    RenderFailed(String),
}

/// Result type for document rendering.
pub type RenderResult<T> = Result<T, RenderError>;

/// A paginated document the composite exporter can rasterize.
///
/// Page numbers start at 1. Page geometry is expressed in page units; at
/// `scale` one page unit spans `scale` output pixels.
pub trait DocumentRenderer {
    fn page_count(&self) -> usize;

    /// Size of a page at `scale`, or `None` if the page does not exist.
    fn page_viewport(&self, page: usize, scale: f64) -> Option<Size>;

    /// Rasterize `crop` (page units, unscaled) of a page at `output_scale`.
    fn render_page_region(&self, page: usize, crop: Rect, output_scale: f64) -> BoxFuture<'_, RenderResult<RgbaImage>>;

    /// Size in bytes of the document source.
    fn source_len(&self) -> u64;
}

/// A document whose pages are raster images, one page unit per pixel.
#[derive(Debug, Clone, Default)]
pub struct ImageDocument {
    pages: Vec<RgbaImage>,
    source_len: u64,
}

impl ImageDocument {
    /// Build from already decoded pages. The source size is the raw pixel size.
    pub fn from_pages(pages: Vec<RgbaImage>) -> Self {
        let source_len = pages.iter().map(|p| p.as_raw().len() as u64).sum();
        Self { pages, source_len }
    }

    /// Decode encoded page images (PNG, JPEG or WebP).
    pub fn from_encoded<B: AsRef<[u8]>>(sources: &[B]) -> RenderResult<Self> {
        let mut pages = Vec::with_capacity(sources.len());
        let mut source_len = 0u64;
        for bytes in sources {
            let bytes = bytes.as_ref();
            source_len += bytes.len() as u64;
            let decoded = image::load_from_memory(bytes).map_err(|e| RenderError::Decode(e.to_string()))?;
            pages.push(decoded.to_rgba8());
        }
        Ok(Self { pages, source_len })
    }

    /// Read and decode page image files.
    pub fn open(paths: &[impl AsRef<Path>]) -> RenderResult<Self> {
        let sources = paths
            .iter()
            .map(|p| {
                std::fs::read(p.as_ref())
                    .map_err(|e| RenderError::Decode(format!("{}: {}", p.as_ref().display(), e)))
            })
            .collect::<RenderResult<Vec<_>>>()?;
        Self::from_encoded(&sources)
    }

    fn page(&self, page: usize) -> RenderResult<&RgbaImage> {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or(RenderError::PageOutOfRange {
                page,
                count: self.pages.len(),
            })
    }

    fn render_sync(&self, page: usize, crop: Rect, output_scale: f64) -> RenderResult<RgbaImage> {
        let source = self.page(page)?;
        if !(output_scale > 0.0 && output_scale.is_finite()) {
            return Err(RenderError::RenderFailed(format!("invalid output scale {output_scale}")));
        }
        let (w, h) = source.dimensions();
        let crop = crop.abs().intersect(Rect::new(0.0, 0.0, w as f64, h as f64));
        let out_w = (crop.width() * output_scale).round() as u32;
        let out_h = (crop.height() * output_scale).round() as u32;
        if out_w == 0 || out_h == 0 {
            return Err(RenderError::RenderFailed("empty crop".to_string()));
        }

        // Whole source pixels covering the crop.
        let x0 = crop.x0.floor() as u32;
        let y0 = crop.y0.floor() as u32;
        let x1 = (crop.x1.ceil() as u32).min(w);
        let y1 = (crop.y1.ceil() as u32).min(h);
        let region = imageops::crop_imm(source, x0, y0, x1 - x0, y1 - y0).to_image();
        if region.dimensions() == (out_w, out_h) {
            return Ok(region);
        }
        Ok(imageops::resize(&region, out_w, out_h, FilterType::Triangle))
    }
}

impl DocumentRenderer for ImageDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_viewport(&self, page: usize, scale: f64) -> Option<Size> {
        let image = self.page(page).ok()?;
        let (w, h) = image.dimensions();
        Some(Size::new(w as f64 * scale, h as f64 * scale))
    }

    fn render_page_region(&self, page: usize, crop: Rect, output_scale: f64) -> BoxFuture<'_, RenderResult<RgbaImage>> {
        Box::pin(async move { self.render_sync(page, crop, output_scale) })
    }

    fn source_len(&self) -> u64 {
        self.source_len
    }
}
