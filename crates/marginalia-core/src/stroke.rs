//! The stroke model: one committed freehand polyline with style metadata.

use crate::geometry;
use crate::tools::{BrushKind, BrushStyle, InkColor};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type StrokeId = Uuid;
pub type SessionId = Uuid;
pub type DocumentId = Uuid;
pub type AttemptId = Uuid;

/// Minimum number of points a committed stroke carries.
pub const MIN_STROKE_POINTS: usize = 2;

/// A sampled input point in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkPoint {
    pub x: f64,
    pub y: f64,
    /// Normalized pen pressure in `[0, 1]`.
    pub pressure: f64,
    /// Sample time in milliseconds.
    pub t_ms: u64,
}

impl InkPoint {
    pub fn new(x: f64, y: f64, pressure: f64, t_ms: u64) -> Self {
        Self { x, y, pressure, t_ms }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.pressure.is_finite()
    }
}

/// Errors raised when building a stroke.
#[derive(Debug, Error, PartialEq)]
pub enum StrokeError {
    #[error("Stroke needs at least {MIN_STROKE_POINTS} points, got {0}")]
    TooFewPoints(usize),
    #[error("Point {0} has a non-finite coordinate")]
    NonFinitePoint(usize),
}

/// Owner context stamped on a new stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrokeOwner {
    pub session_id: SessionId,
    pub document_id: DocumentId,
    pub attempt_id: AttemptId,
}

/// A committed stroke.
///
/// `bounds` always equals the tight union of `points`; the fields that feed
/// it are private and every mutation recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StrokeRecord", into = "StrokeRecord")]
pub struct Stroke {
    pub id: StrokeId,
    pub session_id: SessionId,
    pub document_id: DocumentId,
    pub attempt_id: AttemptId,
    points: Vec<InkPoint>,
    bounds: Rect,
    pub style: BrushStyle,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Stroke {
    /// Build a stroke with a fresh id.
    pub fn new(
        owner: StrokeOwner,
        points: Vec<InkPoint>,
        style: BrushStyle,
        now_ms: u64,
    ) -> Result<Self, StrokeError> {
        Self::with_id(Uuid::new_v4(), owner, points, style, now_ms, now_ms)
    }

    pub(crate) fn with_id(
        id: StrokeId,
        owner: StrokeOwner,
        points: Vec<InkPoint>,
        style: BrushStyle,
        created_at_ms: u64,
        updated_at_ms: u64,
    ) -> Result<Self, StrokeError> {
        if points.len() < MIN_STROKE_POINTS {
            return Err(StrokeError::TooFewPoints(points.len()));
        }
        if let Some(i) = points.iter().position(|p| !p.is_finite()) {
            return Err(StrokeError::NonFinitePoint(i));
        }
        let bounds = tight_bounds(&points);
        Ok(Self {
            id,
            session_id: owner.session_id,
            document_id: owner.document_id,
            attempt_id: owner.attempt_id,
            points,
            bounds,
            style,
            created_at_ms,
            updated_at_ms,
        })
    }

    pub fn owner(&self) -> StrokeOwner {
        StrokeOwner {
            session_id: self.session_id,
            document_id: self.document_id,
            attempt_id: self.attempt_id,
        }
    }

    pub fn points(&self) -> &[InkPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Tight axis-aligned bounds of the points.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Bounds inflated by `padding` on every edge.
    pub fn padded_bounds(&self, padding: f64) -> Rect {
        geometry::expand(self.bounds, padding)
    }

    /// Shift every point by `(dx, dy)` and bump `updated_at_ms`.
    pub fn translate(&mut self, dx: f64, dy: f64, now_ms: u64) {
        for p in &mut self.points {
            p.x += dx;
            p.y += dy;
        }
        self.bounds = tight_bounds(&self.points);
        self.updated_at_ms = now_ms;
    }

    /// Smallest squared distance from `point` to any recorded sample.
    pub fn min_dist_sq(&self, point: Point) -> f64 {
        self.points
            .iter()
            .map(|p| geometry::dist_sq(p.position(), point))
            .fold(f64::INFINITY, f64::min)
    }

    /// Eraser-style hit test: padded box first, then exact point distance.
    pub fn hit_test(&self, point: Point, radius: f64) -> bool {
        if !geometry::contains(self.padded_bounds(radius), point) {
            return false;
        }
        self.min_dist_sq(point) <= radius * radius
    }

    /// Whether any sample lies inside `polygon`.
    ///
    /// `polygon_bounds` is the polygon's own bounding box, used to skip strokes
    /// that cannot intersect it.
    pub fn intersects_polygon(&self, polygon: &[Point], polygon_bounds: Rect) -> bool {
        if !geometry::overlaps(self.bounds, polygon_bounds) {
            return false;
        }
        self.points
            .iter()
            .any(|p| geometry::point_in_polygon(p.position(), polygon))
    }
}

fn tight_bounds(points: &[InkPoint]) -> Rect {
    geometry::bounds_of(points.iter().map(InkPoint::position)).unwrap_or(Rect::ZERO)
}

/// Flat persisted row for a stroke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrokeRecord {
    pub id: StrokeId,
    pub session_id: SessionId,
    pub document_id: DocumentId,
    pub attempt_id: AttemptId,
    pub points: Vec<InkPoint>,
    pub brush: BrushKind,
    pub color: InkColor,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    pub size: f64,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

fn default_opacity() -> f64 {
    1.0
}

impl From<Stroke> for StrokeRecord {
    fn from(stroke: Stroke) -> Self {
        Self {
            id: stroke.id,
            session_id: stroke.session_id,
            document_id: stroke.document_id,
            attempt_id: stroke.attempt_id,
            min_x: stroke.bounds.x0,
            min_y: stroke.bounds.y0,
            max_x: stroke.bounds.x1,
            max_y: stroke.bounds.y1,
            points: stroke.points,
            brush: stroke.style.brush,
            color: stroke.style.color,
            opacity: stroke.style.opacity,
            size: stroke.style.size,
            created_at_ms: stroke.created_at_ms,
            updated_at_ms: stroke.updated_at_ms,
        }
    }
}

impl TryFrom<StrokeRecord> for Stroke {
    type Error = StrokeError;

    /// The stored box columns are ignored; bounds are rebuilt from the points.
    fn try_from(record: StrokeRecord) -> Result<Self, Self::Error> {
        let owner = StrokeOwner {
            session_id: record.session_id,
            document_id: record.document_id,
            attempt_id: record.attempt_id,
        };
        let style = BrushStyle {
            brush: record.brush,
            color: record.color,
            opacity: record.opacity,
            size: record.size,
        };
        Self::with_id(
            record.id,
            owner,
            record.points,
            style,
            record.created_at_ms,
            record.updated_at_ms,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn owner(attempt_id: AttemptId) -> StrokeOwner {
        StrokeOwner {
            session_id: Uuid::nil(),
            document_id: Uuid::nil(),
            attempt_id,
        }
    }

    pub(crate) fn pts(coords: &[(f64, f64)]) -> Vec<InkPoint> {
        coords
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| InkPoint::new(x, y, 0.5, i as u64 * 16))
            .collect()
    }

    pub(crate) fn stroke(attempt_id: AttemptId, coords: &[(f64, f64)]) -> Stroke {
        Stroke::new(owner(attempt_id), pts(coords), BrushStyle::pencil(), 1_000).unwrap()
    }

    #[test]
    fn test_rejects_single_point() {
        let result = Stroke::new(owner(Uuid::new_v4()), pts(&[(1.0, 1.0)]), BrushStyle::pencil(), 0);
        assert_eq!(result.unwrap_err(), StrokeError::TooFewPoints(1));
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut points = pts(&[(0.0, 0.0), (1.0, 1.0)]);
        points[1].x = f64::NAN;
        let result = Stroke::new(owner(Uuid::new_v4()), points, BrushStyle::pencil(), 0);
        assert_eq!(result.unwrap_err(), StrokeError::NonFinitePoint(1));
    }

    #[test]
    fn test_bounds_match_points() {
        let s = stroke(Uuid::new_v4(), &[(0.0, 0.0), (100.0, 50.0), (50.0, 100.0)]);
        assert_eq!(s.bounds(), Rect::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_translate_keeps_bounds_tight() {
        let mut s = stroke(Uuid::new_v4(), &[(10.0, 10.0), (50.0, 40.0), (30.0, 25.0)]);
        s.translate(7.5, -3.25, 2_000);
        let expected = geometry::bounds_of(s.points().iter().map(InkPoint::position)).unwrap();
        assert_eq!(s.bounds(), expected);
        assert_eq!(s.bounds(), Rect::new(17.5, 6.75, 57.5, 36.75));
        assert_eq!(s.updated_at_ms, 2_000);
        assert_eq!(s.created_at_ms, 1_000);
    }

    #[test]
    fn test_translate_is_reversible() {
        let original = stroke(Uuid::new_v4(), &[(10.0, 10.0), (50.5, 40.25), (30.0, 25.0)]);
        let mut s = original.clone();
        s.translate(12.0, -6.5, 2_000);
        s.translate(-12.0, 6.5, 3_000);
        assert_eq!(s.points(), original.points());
        assert_eq!(s.bounds(), original.bounds());
    }

    #[test]
    fn test_hit_test() {
        let s = stroke(Uuid::new_v4(), &[(0.0, 0.0), (100.0, 0.0)]);
        assert!(s.hit_test(Point::new(2.0, 1.0), 5.0));
        assert!(!s.hit_test(Point::new(50.0, 20.0), 5.0));
        // Inside the padded box but far from every sample.
        assert!(!s.hit_test(Point::new(50.0, 0.0), 5.0));
    }

    #[test]
    fn test_intersects_polygon() {
        let s = stroke(Uuid::new_v4(), &[(10.0, 10.0), (20.0, 20.0)]);
        let poly = vec![
            Point::new(0.0, 0.0),
            Point::new(15.0, 0.0),
            Point::new(15.0, 15.0),
            Point::new(0.0, 15.0),
        ];
        let bounds = geometry::bounds_of(poly.iter().copied()).unwrap();
        assert!(s.intersects_polygon(&poly, bounds));

        let far: Vec<Point> = poly.iter().map(|p| Point::new(p.x + 100.0, p.y)).collect();
        let far_bounds = geometry::bounds_of(far.iter().copied()).unwrap();
        assert!(!s.intersects_polygon(&far, far_bounds));
    }

    #[test]
    fn test_record_roundtrip_recomputes_bounds() {
        let s = stroke(Uuid::new_v4(), &[(1.0, 2.0), (3.0, 4.0)]);
        let mut record = StrokeRecord::from(s.clone());
        record.min_x = -999.0;
        let back = Stroke::try_from(record).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_json_rejects_short_stroke() {
        let s = stroke(Uuid::new_v4(), &[(1.0, 2.0), (3.0, 4.0)]);
        let mut value = serde_json::to_value(&s).unwrap();
        value["points"] = serde_json::json!([{ "x": 1.0, "y": 1.0, "pressure": 0.5, "t_ms": 0 }]);
        assert!(serde_json::from_value::<Stroke>(value).is_err());
    }
}
