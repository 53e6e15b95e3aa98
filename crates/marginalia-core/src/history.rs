//! Linear undo/redo command log.

use crate::stroke::{AttemptId, Stroke, StrokeId};

/// An invertible, committed mutation of the stroke collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A stroke was drawn.
    Add(Stroke),
    /// Strokes were removed; restored as one batch on undo.
    Delete(Vec<Stroke>),
    /// Every stroke of an attempt moved rigidly.
    ///
    /// `before` and `after` hold the moved strokes on either side of the
    /// move; undo and redo put them back verbatim instead of re-applying
    /// the delta, so coordinates round-trip bit for bit.
    TranslateAttempt {
        attempt_id: AttemptId,
        dx: f64,
        dy: f64,
        before: Vec<Stroke>,
        after: Vec<Stroke>,
    },
    /// A hand-picked set of strokes moved rigidly.
    TranslateStrokes {
        stroke_ids: Vec<StrokeId>,
        dx: f64,
        dy: f64,
        before: Vec<Stroke>,
        after: Vec<Stroke>,
    },
}

impl Command {
    /// Short name for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Add(_) => "add",
            Command::Delete(_) => "delete",
            Command::TranslateAttempt { .. } => "translate-attempt",
            Command::TranslateStrokes { .. } => "translate-strokes",
        }
    }
}

/// Two plain stacks; pushing a new command discards the redo stack.
#[derive(Debug, Clone, Default)]
pub struct History {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly committed command.
    pub fn push(&mut self, command: Command) {
        log::debug!("history: push {}", command.label());
        self.undo_stack.push(command);
        self.redo_stack.clear();
    }

    /// Take the most recent command for undoing.
    ///
    /// The caller applies its inverse and then hands it to [`History::push_redo`].
    pub fn pop_undo(&mut self) -> Option<Command> {
        self.undo_stack.pop()
    }

    /// Take the most recently undone command for redoing.
    pub fn pop_redo(&mut self) -> Option<Command> {
        self.redo_stack.pop()
    }

    pub fn push_redo(&mut self, command: Command) {
        self.redo_stack.push(command);
    }

    /// Return a redone command to the undo stack without clearing redo.
    pub fn push_undone(&mut self, command: Command) {
        self.undo_stack.push(command);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn translate(dx: f64) -> Command {
        Command::TranslateAttempt {
            attempt_id: Uuid::nil(),
            dx,
            dy: 0.0,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    #[test]
    fn test_empty_stacks() {
        let mut history = History::new();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.pop_undo().is_none());
        assert!(history.pop_redo().is_none());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut history = History::new();
        history.push(translate(1.0));
        let cmd = history.pop_undo().unwrap();
        history.push_redo(cmd);
        assert!(history.can_redo());

        history.push(translate(2.0));
        assert!(!history.can_redo());
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_redo_keeps_remaining_redo() {
        let mut history = History::new();
        history.push(translate(1.0));
        history.push(translate(2.0));
        for _ in 0..2 {
            let cmd = history.pop_undo().unwrap();
            history.push_redo(cmd);
        }
        let cmd = history.pop_redo().unwrap();
        assert_eq!(cmd, translate(1.0));
        history.push_undone(cmd);
        assert_eq!(history.redo_len(), 1);
        assert_eq!(history.undo_len(), 1);
    }
}
