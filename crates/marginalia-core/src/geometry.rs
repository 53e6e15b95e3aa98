//! Bounding-box and point-set math shared by hit-testing, selection and export.
//!
//! Everything here works in world coordinates and is free of state. Boxes are
//! `kurbo::Rect` with `x0/y0` as the minimum corner and `x1/y1` as the maximum.

use kurbo::{Point, Rect};

/// Componentwise min/max union of two boxes.
pub fn union(a: Rect, b: Rect) -> Rect {
    Rect::new(a.x0.min(b.x0), a.y0.min(b.y0), a.x1.max(b.x1), a.y1.max(b.y1))
}

/// Union of every box yielded by `boxes`, or `None` when there are none.
pub fn union_all(boxes: impl IntoIterator<Item = Rect>) -> Option<Rect> {
    boxes.into_iter().reduce(union)
}

/// Inflate all four edges by `amount`.
pub fn expand(rect: Rect, amount: f64) -> Rect {
    Rect::new(
        rect.x0 - amount,
        rect.y0 - amount,
        rect.x1 + amount,
        rect.y1 + amount,
    )
}

/// Closed containment: points on the edge are inside.
///
/// `kurbo::Rect::contains` is half-open, which would make a zero-width box
/// (a perfectly vertical stroke) unhittable.
pub fn contains(rect: Rect, point: Point) -> bool {
    point.x >= rect.x0 && point.x <= rect.x1 && point.y >= rect.y0 && point.y <= rect.y1
}

/// Closed overlap test between two boxes.
pub fn overlaps(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Squared Euclidean distance.
#[inline]
pub fn dist_sq(a: Point, b: Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Tight bounds of a point set.
pub fn bounds_of(points: impl IntoIterator<Item = Point>) -> Option<Rect> {
    let mut iter = points.into_iter();
    let first = iter.next()?;
    let mut rect = Rect::new(first.x, first.y, first.x, first.y);
    for p in iter {
        rect.x0 = rect.x0.min(p.x);
        rect.y0 = rect.y0.min(p.y);
        rect.x1 = rect.x1.max(p.x);
        rect.y1 = rect.y1.max(p.y);
    }
    Some(rect)
}

/// Ray-casting parity test.
///
/// O(vertices), so callers pre-filter with [`overlaps`] against the polygon's
/// bounds. Polygons with fewer than three vertices contain nothing.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[j];
        if (a.y > point.y) != (b.y > point.y) {
            let cross_x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
