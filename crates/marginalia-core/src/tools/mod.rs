//! Tools and brush styles.

use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Pencil,
    Marker,
    Eraser,
    Select,
}

impl Tool {
    /// Brush laid down by this tool, if it draws at all.
    pub fn brush(self) -> Option<BrushKind> {
        match self {
            Tool::Pencil => Some(BrushKind::Pencil),
            Tool::Marker => Some(BrushKind::Marker),
            Tool::Eraser | Tool::Select => None,
        }
    }
}

/// Kind of brush a stroke was drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrushKind {
    /// Pressure-sensitive, opaque.
    #[default]
    Pencil,
    /// Constant width, translucent.
    Marker,
}

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InkColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl InkColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let byte = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let r = byte(&hex[0..1])? * 17;
                let g = byte(&hex[1..2])? * 17;
                let b = byte(&hex[2..3])? * 17;
                Some(Self::new(r, g, b, 255))
            }
            6 => Some(Self::new(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?, 255)),
            8 => Some(Self::new(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
                byte(&hex[6..8])?,
            )),
            _ => None,
        }
    }
}

impl Default for InkColor {
    fn default() -> Self {
        Self::black()
    }
}

/// Style properties carried by every stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushStyle {
    pub brush: BrushKind,
    pub color: InkColor,
    /// Overall opacity (0.0 = fully transparent, 1.0 = fully opaque).
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Base diameter in world units.
    pub size: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl BrushStyle {
    pub const MIN_SIZE: f64 = 0.5;
    pub const MAX_SIZE: f64 = 64.0;

    pub fn pencil() -> Self {
        Self {
            brush: BrushKind::Pencil,
            color: InkColor::new(31, 31, 31, 255),
            opacity: 1.0,
            size: 2.5,
        }
    }

    pub fn marker() -> Self {
        Self {
            brush: BrushKind::Marker,
            color: InkColor::new(250, 204, 21, 255),
            opacity: 0.4,
            size: 14.0,
        }
    }

    /// Clamp size and opacity to usable ranges; non-finite values fall back
    /// to the brush default.
    pub fn sanitized(mut self) -> Self {
        let fallback = match self.brush {
            BrushKind::Pencil => Self::pencil(),
            BrushKind::Marker => Self::marker(),
        };
        self.size = if self.size.is_finite() {
            self.size.clamp(Self::MIN_SIZE, Self::MAX_SIZE)
        } else {
            fallback.size
        };
        self.opacity = if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            fallback.opacity
        };
        self
    }
}

impl Default for BrushStyle {
    fn default() -> Self {
        Self::pencil()
    }
}

/// Current tool plus one remembered style per brush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    pub tool: Tool,
    pub pencil: BrushStyle,
    pub marker: BrushStyle,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            tool: Tool::default(),
            pencil: BrushStyle::pencil(),
            marker: BrushStyle::marker(),
        }
    }
}

impl ToolSettings {
    /// Style that a new stroke drawn with the current tool gets.
    pub fn active_style(&self) -> Option<BrushStyle> {
        self.tool.brush().map(|brush| self.style_for(brush))
    }

    pub fn style_for(&self, brush: BrushKind) -> BrushStyle {
        match brush {
            BrushKind::Pencil => self.pencil,
            BrushKind::Marker => self.marker,
        }
    }

    /// Replace the remembered style for `style.brush`.
    pub fn set_style(&mut self, style: BrushStyle) {
        let style = style.sanitized();
        match style.brush {
            BrushKind::Pencil => self.pencil = style,
            BrushKind::Marker => self.marker = style,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_brush() {
        assert_eq!(Tool::Pencil.brush(), Some(BrushKind::Pencil));
        assert_eq!(Tool::Marker.brush(), Some(BrushKind::Marker));
        assert_eq!(Tool::Eraser.brush(), None);
        assert_eq!(Tool::Select.brush(), None);
    }

    #[test]
    fn test_hex_parsing() {
        assert_eq!(InkColor::from_hex("#fff"), Some(InkColor::white()));
        assert_eq!(InkColor::from_hex("#1f1f1f"), Some(InkColor::new(31, 31, 31, 255)));
        assert_eq!(InkColor::from_hex("#ff000080"), Some(InkColor::new(255, 0, 0, 128)));
        assert_eq!(InkColor::from_hex("red"), None);
        assert_eq!(InkColor::from_hex("#12345"), None);
    }

    #[test]
    fn test_sanitize_clamps() {
        let style = BrushStyle {
            size: 1000.0,
            opacity: f64::NAN,
            ..BrushStyle::marker()
        }
        .sanitized();
        assert_eq!(style.size, BrushStyle::MAX_SIZE);
        assert_eq!(style.opacity, BrushStyle::marker().opacity);
    }

    #[test]
    fn test_settings_active_style() {
        let mut settings = ToolSettings::default();
        assert_eq!(settings.active_style(), Some(BrushStyle::pencil()));

        settings.tool = Tool::Marker;
        let mut marker = BrushStyle::marker();
        marker.size = 20.0;
        settings.set_style(marker);
        assert_eq!(settings.active_style().map(|s| s.size), Some(20.0));

        settings.tool = Tool::Eraser;
        assert_eq!(settings.active_style(), None);
    }
}
