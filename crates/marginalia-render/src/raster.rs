//! CPU rasterization onto tiny-skia pixmaps.
//!
//! Shapes are built as kurbo paths and filled through tiny-skia. A stroke is
//! a ribbon of round caps at every sample joined by tapered quads; the pieces
//! are filled opaque into a scratch layer sized to the stroke, and the layer
//! is composited once at the stroke's opacity so translucent markers stay
//! uniform where the ribbon overlaps itself.

use image::{Rgba, RgbaImage};
use kurbo::{BezPath, Circle, PathEl, Point, Rect, RoundedRect, Shape, Vec2};
use marginalia_core::input::DEFAULT_PRESSURE;
use marginalia_core::{BrushKind, BrushStyle, InkColor, InkPoint, Viewport};
use tiny_skia::{
    Color, ColorU8, FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

/// Thinnest stroke radius drawn on screen, in pixels.
const MIN_SCREEN_RADIUS: f64 = 0.5;

/// Flattening tolerance for curved shapes, in pixels.
const TOLERANCE: f64 = 0.1;

/// World-space radius of a stroke at one sample.
///
/// Pencils scale with pressure between half and one and a half times the
/// nominal radius; markers ignore pressure.
pub fn stroke_radius(style: &BrushStyle, pressure: f64) -> f64 {
    let base = style.size * 0.5;
    match style.brush {
        BrushKind::Pencil => {
            let p = if pressure > 0.0 && pressure.is_finite() {
                pressure.min(1.0)
            } else {
                DEFAULT_PRESSURE
            };
            base * (0.5 + p)
        }
        BrushKind::Marker => base,
    }
}

/// Transparent surface of the given size. `None` for an empty or
/// unallocatable size.
pub fn surface(width: u32, height: u32) -> Option<Pixmap> {
    Pixmap::new(width, height)
}

/// Reset every pixel to transparent.
pub fn clear(target: &mut Pixmap) {
    target.fill(Color::TRANSPARENT);
}

fn paint_for(color: InkColor) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

fn to_skia_path(path: &BezPath) -> Option<Path> {
    let mut pb = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(a, b) => pb.quad_to(a.x as f32, a.y as f32, b.x as f32, b.y as f32),
            PathEl::CurveTo(a, b, c) => {
                pb.cubic_to(a.x as f32, a.y as f32, b.x as f32, b.y as f32, c.x as f32, c.y as f32)
            }
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

fn fill(target: &mut Pixmap, shape: &BezPath, paint: &Paint, transform: Transform) {
    if let Some(path) = to_skia_path(shape) {
        target.fill_path(&path, paint, FillRule::Winding, transform, None);
    }
}

/// Premultiplied copy of an RGBA image. `None` for an empty image.
pub fn pixmap_from_image(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

/// Straight-alpha copy of a pixmap, ready for encoding.
pub fn image_from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    image
}

/// Composite `src` onto `target` with its top-left corner at `(x, y)`.
pub fn draw_image(target: &mut Pixmap, src: &RgbaImage, x: i32, y: i32) {
    let Some(layer) = pixmap_from_image(src) else {
        return;
    };
    target.draw_pixmap(x, y, layer.as_ref(), &PixmapPaint::default(), Transform::identity(), None);
}

/// Tapered quad joining two round caps. `None` when one cap swallows the
/// other and the caps alone cover the segment.
fn segment_quad(a: Point, ra: f64, b: Point, rb: f64) -> Option<BezPath> {
    let d = b - a;
    let len = d.hypot();
    if len <= (ra - rb).abs() {
        return None;
    }
    let n = Vec2::new(-d.y, d.x) / len;
    let mut quad = BezPath::new();
    quad.move_to(a + n * ra);
    quad.line_to(b + n * rb);
    quad.line_to(b - n * rb);
    quad.line_to(a - n * ra);
    quad.close_path();
    Some(quad)
}

/// Draw a stroke given in world coordinates through `viewport`.
pub fn draw_stroke(target: &mut Pixmap, points: &[InkPoint], style: &BrushStyle, viewport: &Viewport) {
    if points.is_empty() {
        return;
    }
    let samples: Vec<(Point, f64)> = points
        .iter()
        .map(|p| {
            let r = (stroke_radius(style, p.pressure) * viewport.ratio).max(MIN_SCREEN_RADIUS);
            (viewport.to_screen(p.position()), r)
        })
        .collect();

    let Some(bounds) = samples
        .iter()
        .map(|&(p, r)| Rect::new(p.x - r - 1.0, p.y - r - 1.0, p.x + r + 1.0, p.y + r + 1.0))
        .reduce(|a, b| a.union(b))
    else {
        return;
    };
    let canvas = Rect::new(0.0, 0.0, target.width() as f64, target.height() as f64);
    let visible = bounds.intersect(canvas);
    if visible.width() <= 0.0 || visible.height() <= 0.0 {
        return;
    }
    let x0 = visible.x0.floor();
    let y0 = visible.y0.floor();
    let Some(mut layer) = surface((visible.x1.ceil() - x0) as u32, (visible.y1.ceil() - y0) as u32) else {
        return;
    };

    let opaque = paint_for(InkColor { a: 255, ..style.color });
    let to_layer = Transform::from_translate(-x0 as f32, -y0 as f32);
    for &(p, r) in &samples {
        fill(&mut layer, &Circle::new(p, r).to_path(TOLERANCE), &opaque, to_layer);
    }
    for pair in samples.windows(2) {
        if let Some(quad) = segment_quad(pair[0].0, pair[0].1, pair[1].0, pair[1].1) {
            fill(&mut layer, &quad, &opaque, to_layer);
        }
    }

    let opacity = (style.color.a as f64 / 255.0) * style.opacity.clamp(0.0, 1.0);
    let paint = PixmapPaint {
        opacity: opacity as f32,
        ..PixmapPaint::default()
    };
    target.draw_pixmap(x0 as i32, y0 as i32, layer.as_ref(), &paint, Transform::identity(), None);
}

/// Draw a constant-width polyline in screen coordinates.
pub fn draw_polyline(target: &mut Pixmap, points: &[Point], width: f64, color: InkColor, closed: bool) {
    if points.len() < 2 {
        return;
    }
    let mut line = BezPath::new();
    line.move_to(points[0]);
    for &p in &points[1..] {
        line.line_to(p);
    }
    if closed {
        line.close_path();
    }
    let Some(path) = to_skia_path(&line) else {
        return;
    };
    let stroke = Stroke {
        width: width.max(MIN_SCREEN_RADIUS * 2.0) as f32,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    target.stroke_path(&path, &paint_for(color), &stroke, Transform::identity(), None);
}

/// Fill a rounded rectangle given in screen pixels.
pub fn fill_rounded_rect(target: &mut Pixmap, rect: Rect, radius: f64, color: InkColor) {
    let rect = rect.abs();
    let radius = radius.clamp(0.0, rect.width().min(rect.height()) * 0.5);
    let shape = RoundedRect::from_rect(rect, radius).to_path(TOLERANCE);
    fill(target, &shape, &paint_for(color), Transform::identity());
}

/// Outline a rectangle given in screen pixels.
pub fn stroke_rect(target: &mut Pixmap, rect: Rect, width: f64, color: InkColor) {
    let corners = [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ];
    draw_polyline(target, &corners, width, color, true);
}
