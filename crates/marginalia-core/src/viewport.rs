//! Screen/world coordinate mapping.

use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Pan and zoom of the host document pager.
///
/// The overlay never pans or zooms on its own; it receives a fresh viewport
/// from the pager whenever the page view moves and uses it for every event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Pan offset in screen pixels.
    pub pan: Vec2,
    /// World-to-screen scale ratio.
    pub ratio: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            ratio: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(pan: Vec2, ratio: f64) -> Self {
        Self { pan, ratio }
    }

    /// World-to-screen transform, used for rendering.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.pan) * Affine::scale(self.ratio)
    }

    /// Screen-to-world transform, used for input.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.ratio) * Affine::translate(-self.pan)
    }

    /// `(screen - pan) / ratio`
    pub fn to_world(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.pan.x) / self.ratio,
            (screen.y - self.pan.y) / self.ratio,
        )
    }

    /// `world * ratio + pan`
    pub fn to_screen(&self, world: Point) -> Point {
        Point::new(
            world.x * self.ratio + self.pan.x,
            world.y * self.ratio + self.pan.y,
        )
    }

    /// Map a world-space box to screen space.
    pub fn rect_to_screen(&self, rect: Rect) -> Rect {
        let p0 = self.to_screen(Point::new(rect.x0, rect.y0));
        let p1 = self.to_screen(Point::new(rect.x1, rect.y1));
        Rect::new(p0.x, p0.y, p1.x, p1.y)
    }

    /// Convert a screen-space length (e.g. a hit radius) to world units.
    pub fn screen_len_to_world(&self, len: f64) -> f64 {
        len / self.ratio
    }

    /// Convert a world-space length (e.g. a brush size) to screen pixels.
    pub fn world_len_to_screen(&self, len: f64) -> f64 {
        len * self.ratio
    }

    /// Whether the ratio can be inverted.
    pub fn is_valid(&self) -> bool {
        self.ratio.is_finite() && self.ratio > 0.0 && self.pan.x.is_finite() && self.pan.y.is_finite()
    }
}
