//! Composite export: one attempt's ink flattened onto its document region.

use crate::document::DocumentRenderer;
use crate::raster;
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{DynamicImage, ExtendedColorType, RgbaImage};
use kurbo::{Rect, Vec2};
use marginalia_core::{
    AttemptId, ExportConfig, ExportFormat, InkRepository, RepositoryError, Viewport, geometry,
};
use thiserror::Error;
use tiny_skia::Color;

/// Composite export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Attempt has no strokes")]
    EmptyAttempt,
    #[error("Export region {width}x{height} exceeds {max_pixels} pixels")]
    RegionTooLarge { width: u64, height: u64, max_pixels: u64 },
    #[error("Document source is {bytes} bytes, limit is {max_bytes}")]
    SourceTooLarge { bytes: u64, max_bytes: u64 },
    #[error("No document to render")]
    MissingDocument,
    #[error("Rasterization failed: {0}")]
    RasterizationFailed(String),
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What to export and the budgets that guard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRequest {
    pub attempt_id: AttemptId,
    /// Largest document source accepted.
    pub max_source_bytes: u64,
    /// Largest output area accepted.
    pub max_output_pixels: u64,
}

/// An encoded composite.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ExportFormat,
    /// Page the region was cropped from (1-based).
    pub page_number: usize,
}

impl ExportedImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` for transport to a vision consumer.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.to_base64())
    }
}

/// World-space placement of one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlacement {
    pub page_number: usize,
    pub bounds: Rect,
}

/// Lay pages out top to bottom as the pager does.
pub fn page_layout(document: &dyn DocumentRenderer, config: &ExportConfig) -> Vec<PagePlacement> {
    let mut layout = Vec::with_capacity(document.page_count());
    let mut top = config.page_origin_y;
    for page_number in 1..=document.page_count() {
        let Some(size) = document.page_viewport(page_number, config.reference_scale) else {
            log::warn!("Page {} has no viewport; stopping layout", page_number);
            break;
        };
        let bounds = Rect::new(
            config.page_origin_x,
            top,
            config.page_origin_x + size.width,
            top + size.height,
        );
        layout.push(PagePlacement { page_number, bounds });
        top = bounds.y1 + config.page_gap;
    }
    layout
}

/// Page whose vertical span is closest to `center_y`. Ties go to the lower page.
pub fn locate_page(layout: &[PagePlacement], center_y: f64) -> Option<PagePlacement> {
    let distance = |p: &PagePlacement| {
        if center_y < p.bounds.y0 {
            p.bounds.y0 - center_y
        } else if center_y > p.bounds.y1 {
            center_y - p.bounds.y1
        } else {
            0.0
        }
    };
    let mut best: Option<(PagePlacement, f64)> = None;
    for page in layout {
        let d = distance(page);
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((*page, d));
        }
    }
    best.map(|(page, _)| page)
}

/// Encode a surface in the requested format.
pub fn encode(surface: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Png => encode_png(surface),
        ExportFormat::Jpeg { quality } => encode_jpeg(surface, quality),
    }
}

fn encode_png(surface: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let (width, height) = surface.dimensions();
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| ExportError::EncodingFailed(e.to_string()))?;
        writer
            .write_image_data(surface.as_raw())
            .map_err(|e| ExportError::EncodingFailed(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| ExportError::EncodingFailed(e.to_string()))?;
    }
    Ok(png_data)
}

fn encode_jpeg(surface: &RgbaImage, quality: u8) -> Result<Vec<u8>, ExportError> {
    let rgb = DynamicImage::ImageRgba8(surface.clone()).to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut jpeg_data = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg_data, quality.clamp(1, 100));
    encoder
        .encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| ExportError::EncodingFailed(e.to_string()))?;
    Ok(jpeg_data)
}

/// Flattens an attempt's strokes onto the document region under them.
pub struct CompositeExporter<'a> {
    repo: &'a dyn InkRepository,
    document: Option<&'a dyn DocumentRenderer>,
    config: ExportConfig,
}

impl<'a> CompositeExporter<'a> {
    pub fn new(repo: &'a dyn InkRepository, document: Option<&'a dyn DocumentRenderer>, config: ExportConfig) -> Self {
        Self { repo, document, config }
    }

    pub async fn export(&self, request: &ExportRequest) -> Result<ExportedImage, ExportError> {
        let document = self.document.ok_or(ExportError::MissingDocument)?;
        let source_bytes = document.source_len();
        if source_bytes > request.max_source_bytes {
            return Err(ExportError::SourceTooLarge {
                bytes: source_bytes,
                max_bytes: request.max_source_bytes,
            });
        }

        let mut strokes = self.repo.list_by_attempt(request.attempt_id).await?;
        strokes.sort_by_key(|s| s.created_at_ms);
        let ink_bounds =
            geometry::union_all(strokes.iter().map(|s| s.bounds())).ok_or(ExportError::EmptyAttempt)?;
        let region = geometry::expand(ink_bounds, self.config.padding);

        let scale = self.config.output_scale;
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(ExportError::RasterizationFailed(format!("invalid output scale {scale}")));
        }
        let width = ((region.width() * scale).ceil() as u64).max(1);
        let height = ((region.height() * scale).ceil() as u64).max(1);
        let too_large = width
            .checked_mul(height)
            .is_none_or(|area| area > request.max_output_pixels);
        if too_large || width > u32::MAX as u64 || height > u32::MAX as u64 {
            return Err(ExportError::RegionTooLarge {
                width,
                height,
                max_pixels: request.max_output_pixels,
            });
        }

        let layout = page_layout(document, &self.config);
        let page = locate_page(&layout, region.center().y).ok_or(ExportError::MissingDocument)?;

        let mut surface = raster::surface(width as u32, height as u32)
            .ok_or_else(|| ExportError::RasterizationFailed(format!("cannot allocate a {width}x{height} surface")))?;
        surface.fill(Color::WHITE);
        let visible = region.intersect(page.bounds);
        if visible.area() > 0.0 {
            let reference = self.config.reference_scale;
            let crop = Rect::new(
                (visible.x0 - page.bounds.x0) / reference,
                (visible.y0 - page.bounds.y0) / reference,
                (visible.x1 - page.bounds.x0) / reference,
                (visible.y1 - page.bounds.y0) / reference,
            );
            let background = document
                .render_page_region(page.page_number, crop, scale * reference)
                .await
                .map_err(|e| ExportError::RasterizationFailed(e.to_string()))?;
            let dx = ((visible.x0 - region.x0) * scale).round() as i32;
            let dy = ((visible.y0 - region.y0) * scale).round() as i32;
            raster::draw_image(&mut surface, &background, dx, dy);
        } else {
            log::debug!("Export region does not overlap page {}", page.page_number);
        }

        let viewport = Viewport::new(Vec2::new(-region.x0 * scale, -region.y0 * scale), scale);
        for stroke in &strokes {
            raster::draw_stroke(&mut surface, stroke.points(), &stroke.style, &viewport);
        }

        let bytes = encode(&raster::image_from_pixmap(&surface), self.config.format)?;
        log::info!(
            "Exported attempt {} from page {}: {}x{} {} ({} bytes)",
            request.attempt_id,
            page.page_number,
            width,
            height,
            self.config.format.extension(),
            bytes.len()
        );
        Ok(ExportedImage {
            bytes,
            width: width as u32,
            height: height as u32,
            format: self.config.format,
            page_number: page.page_number,
        })
    }
}
