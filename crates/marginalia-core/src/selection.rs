//! Selection state and attempt cards.

use crate::stroke::{AttemptId, Stroke, StrokeId};
use kurbo::Rect;

/// What the user currently has selected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    /// Individually lasso- or tap-selected strokes of the active attempt.
    Strokes(Vec<StrokeId>),
    /// A whole (non-active) attempt, picked by tapping its card.
    Attempt(AttemptId),
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::None => true,
            Selection::Strokes(ids) => ids.is_empty(),
            Selection::Attempt(_) => false,
        }
    }

    /// Whether a specific stroke is part of a stroke selection.
    pub fn contains_stroke(&self, id: StrokeId) -> bool {
        matches!(self, Selection::Strokes(ids) if ids.contains(&id))
    }

    /// What a drag of this selection moves.
    pub fn translate_target(&self) -> Option<TranslateTarget> {
        match self {
            Selection::None => None,
            Selection::Strokes(ids) if ids.is_empty() => None,
            Selection::Strokes(ids) => Some(TranslateTarget::Strokes(ids.clone())),
            Selection::Attempt(id) => Some(TranslateTarget::Attempt(*id)),
        }
    }
}

/// Group of strokes moved together by a drag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateTarget {
    Attempt(AttemptId),
    Strokes(Vec<StrokeId>),
}

impl TranslateTarget {
    pub fn covers(&self, stroke: &Stroke) -> bool {
        match self {
            TranslateTarget::Attempt(id) => stroke.attempt_id == *id,
            TranslateTarget::Strokes(ids) => ids.contains(&stroke.id),
        }
    }
}

/// Background card for a non-active attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptCard {
    pub attempt_id: AttemptId,
    /// Padded union of the attempt's stroke bounds (world coordinates).
    pub bounds: Rect,
    /// Creation time of the attempt's earliest stroke.
    pub created_at_ms: u64,
    /// Short task reference supplied by the host, if any.
    pub label: Option<String>,
    pub stroke_count: usize,
}
