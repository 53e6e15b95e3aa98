//! Pointer input events fed to the gesture state machine.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Pressure assumed for devices that report none.
pub const DEFAULT_PRESSURE: f64 = 0.5;

/// Pointer device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

/// One pointer sample in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerInput {
    /// Stable id of the finger, pen or mouse for the life of a contact.
    pub contact_id: u64,
    pub kind: PointerKind,
    /// Position in screen (canvas) pixels.
    pub position: Point,
    /// Normalized pressure; `0.0` means the device reported none.
    pub pressure: f64,
    /// Event timestamp in milliseconds.
    pub t_ms: u64,
}

impl PointerInput {
    pub fn new(contact_id: u64, kind: PointerKind, position: Point, t_ms: u64) -> Self {
        Self {
            contact_id,
            kind,
            position,
            pressure: 0.0,
            t_ms,
        }
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = pressure;
        self
    }

    /// Same contact at a new position and time.
    pub fn moved_to(self, position: Point, t_ms: u64) -> Self {
        Self {
            position,
            t_ms,
            ..self
        }
    }

    /// Pressure to record, clamped to `[0, 1]`, with missing values replaced by
    /// [`DEFAULT_PRESSURE`].
    pub fn effective_pressure(&self) -> f64 {
        if self.pressure > 0.0 && self.pressure.is_finite() {
            self.pressure.min(1.0)
        } else {
            DEFAULT_PRESSURE
        }
    }
}
