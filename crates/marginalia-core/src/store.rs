//! The ink store: source of truth for one `(session, document)` context.
//!
//! Owns the stroke collection, tool settings, selection, the undo/redo log and
//! the persistence outbox. The hosting screen owns one store and points it at
//! a context; nothing here is global.

use crate::config::{GestureConfig, InkConfig};
use crate::geometry;
use crate::history::{Command, History};
use crate::repository::{
    FlushOutcome, FlushOutcomeSummary, InkRepository, OutboxBatch, PersistOp, PersistOutbox, RepositoryResult,
    TranslateAttempt, TranslateStrokes,
};
use crate::selection::{AttemptCard, Selection, TranslateTarget};
use crate::stroke::{AttemptId, DocumentId, SessionId, Stroke, StrokeId, StrokeOwner};
use crate::time::now_ms;
use crate::tools::{BrushStyle, Tool, ToolSettings};
use kurbo::{Point, Rect};
use std::collections::HashMap;
use thiserror::Error;

/// The `(session, document)` pair strokes are scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InkContext {
    pub session_id: SessionId,
    pub document_id: DocumentId,
}

/// Errors from store mutations.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("No ink context is mounted")]
    NoContext,
    #[error("Stroke {0} belongs to a different session or document")]
    ForeignStroke(StrokeId),
    #[error("Stroke {0} is already in the collection")]
    DuplicateStroke(StrokeId),
}

/// Permission to load one context's strokes.
///
/// Carries the generation it was issued under so a late result for an old
/// context can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationTicket {
    pub generation: u64,
    pub context: InkContext,
}

impl HydrationTicket {
    /// Fetch the context's strokes.
    pub async fn load(self, repo: &dyn InkRepository) -> Hydration {
        let result = repo
            .list_by_session_and_document(self.context.session_id, self.context.document_id)
            .await;
        Hydration { ticket: self, result }
    }
}

/// Result of a hydration fetch, handed to [`InkStore::apply_hydration`].
#[derive(Debug)]
pub struct Hydration {
    pub ticket: HydrationTicket,
    pub result: RepositoryResult<Vec<Stroke>>,
}

/// Context-scoped ink state.
#[derive(Debug, Clone)]
pub struct InkStore {
    context: Option<InkContext>,
    generation: u64,
    hydrated: bool,
    /// Strokes in creation order.
    strokes: Vec<Stroke>,
    active_attempt: Option<AttemptId>,
    settings: ToolSettings,
    selection: Selection,
    history: History,
    outbox: PersistOutbox,
    labels: HashMap<AttemptId, String>,
    config: GestureConfig,
    revision: u64,
}

impl Default for InkStore {
    fn default() -> Self {
        Self::new(&InkConfig::default())
    }
}

impl InkStore {
    pub fn new(config: &InkConfig) -> Self {
        Self {
            context: None,
            generation: 0,
            hydrated: false,
            strokes: Vec::new(),
            active_attempt: None,
            settings: ToolSettings::default(),
            selection: Selection::None,
            history: History::new(),
            outbox: PersistOutbox::new(config.persistence),
            labels: HashMap::new(),
            config: config.gesture,
            revision: 0,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Bumped on every change that affects what the committed layer shows.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // --- context -----------------------------------------------------------

    pub fn context(&self) -> Option<InkContext> {
        self.context
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Point the store at a new context.
    ///
    /// A change empties the collection, history, selection and outbox and
    /// returns a ticket for loading the new context's strokes. Setting the
    /// same context again is a no-op.
    pub fn set_context(&mut self, context: Option<InkContext>) -> Option<HydrationTicket> {
        if context == self.context {
            return None;
        }
        log::info!("ink context changed to {:?}", context);
        self.context = context;
        self.generation += 1;
        self.hydrated = false;
        self.strokes.clear();
        self.history.clear();
        self.selection = Selection::None;
        self.outbox.reset();
        self.touch();
        context.map(|context| HydrationTicket {
            generation: self.generation,
            context,
        })
    }

    /// Replace the collection with a hydration result.
    ///
    /// Returns `Ok(false)` when the result belongs to a superseded context and
    /// was dropped.
    pub fn apply_hydration(&mut self, hydration: Hydration) -> RepositoryResult<bool> {
        let ticket = hydration.ticket;
        if ticket.generation != self.generation || Some(ticket.context) != self.context {
            log::warn!(
                "Dropping stale hydration for {:?} (generation {}, current {})",
                ticket.context,
                ticket.generation,
                self.generation
            );
            return Ok(false);
        }
        let mut strokes = hydration.result?;
        strokes.retain(|s| {
            let ours = s.session_id == ticket.context.session_id && s.document_id == ticket.context.document_id;
            if !ours {
                log::warn!("Hydration returned foreign stroke {}", s.id);
            }
            ours
        });
        strokes.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.cmp(&b.id)));
        log::info!("Hydrated {} stroke(s) for {:?}", strokes.len(), ticket.context);
        self.strokes = strokes;
        self.hydrated = true;
        self.selection = Selection::None;
        self.touch();
        Ok(true)
    }

    // --- attempts, tools, labels ---------------------------------------------

    pub fn active_attempt(&self) -> Option<AttemptId> {
        self.active_attempt
    }

    /// Change the editable attempt; any change clears the selection.
    pub fn set_active_attempt(&mut self, attempt: Option<AttemptId>) {
        if attempt == self.active_attempt {
            return;
        }
        self.active_attempt = attempt;
        self.selection = Selection::None;
        self.touch();
    }

    /// Owner stamped on strokes drawn right now.
    pub fn active_owner(&self) -> Option<StrokeOwner> {
        let context = self.context?;
        Some(StrokeOwner {
            session_id: context.session_id,
            document_id: context.document_id,
            attempt_id: self.active_attempt?,
        })
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn tool(&self) -> Tool {
        self.settings.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.settings.tool = tool;
    }

    pub fn set_brush_style(&mut self, style: BrushStyle) {
        self.settings.set_style(style);
    }

    /// Attach a short task reference shown on the attempt's card.
    pub fn set_attempt_label(&mut self, attempt_id: AttemptId, label: impl Into<String>) {
        self.labels.insert(attempt_id, label.into());
        self.touch();
    }

    pub fn attempt_label(&self, attempt_id: AttemptId) -> Option<&str> {
        self.labels.get(&attempt_id).map(String::as_str)
    }

    // --- selection -----------------------------------------------------------

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Replace the selection. Stroke ids that no longer exist are dropped.
    pub fn set_selection(&mut self, selection: Selection) {
        let selection = match selection {
            Selection::Strokes(ids) => {
                let ids: Vec<StrokeId> = ids.into_iter().filter(|id| self.stroke(*id).is_some()).collect();
                if ids.is_empty() {
                    Selection::None
                } else {
                    Selection::Strokes(ids)
                }
            }
            other => other,
        };
        if selection != self.selection {
            self.selection = selection;
            self.touch();
        }
    }

    pub fn clear_selection(&mut self) {
        self.set_selection(Selection::None);
    }

    /// Box shown around the selection and used for drag hit-testing.
    pub fn selection_bounds(&self) -> Option<Rect> {
        match &self.selection {
            Selection::None => None,
            Selection::Strokes(ids) => geometry::union_all(
                ids.iter()
                    .filter_map(|id| self.stroke(*id))
                    .map(|s| s.bounds()),
            )
            .map(|r| geometry::expand(r, self.config.selection_padding)),
            Selection::Attempt(id) => self.attempt_bounds(*id),
        }
    }

    // --- read selectors ----------------------------------------------------

    /// All strokes in creation order.
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn stroke(&self, id: StrokeId) -> Option<&Stroke> {
        self.strokes.iter().find(|s| s.id == id)
    }

    pub fn strokes_for_attempt(&self, attempt_id: AttemptId) -> impl Iterator<Item = &Stroke> {
        self.strokes.iter().filter(move |s| s.attempt_id == attempt_id)
    }

    /// Strokes of the active attempt (empty when none is active).
    pub fn active_strokes(&self) -> impl Iterator<Item = &Stroke> {
        let active = self.active_attempt;
        self.strokes.iter().filter(move |s| Some(s.attempt_id) == active)
    }

    /// Padded union of one attempt's stroke bounds.
    pub fn attempt_bounds(&self, attempt_id: AttemptId) -> Option<Rect> {
        geometry::union_all(self.strokes_for_attempt(attempt_id).map(|s| s.bounds()))
            .map(|r| geometry::expand(r, self.config.card_padding))
    }

    /// Cards for every non-active attempt, most recently created first.
    pub fn attempt_cards(&self) -> Vec<AttemptCard> {
        let mut cards: Vec<AttemptCard> = Vec::new();
        for stroke in &self.strokes {
            if Some(stroke.attempt_id) == self.active_attempt {
                continue;
            }
            let padded = stroke.padded_bounds(self.config.card_padding);
            match cards.iter_mut().find(|c| c.attempt_id == stroke.attempt_id) {
                Some(card) => {
                    card.bounds = geometry::union(card.bounds, padded);
                    card.created_at_ms = card.created_at_ms.min(stroke.created_at_ms);
                    card.stroke_count += 1;
                }
                None => cards.push(AttemptCard {
                    attempt_id: stroke.attempt_id,
                    bounds: padded,
                    created_at_ms: stroke.created_at_ms,
                    label: self.labels.get(&stroke.attempt_id).cloned(),
                    stroke_count: 1,
                }),
            }
        }
        cards.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then(b.attempt_id.cmp(&a.attempt_id))
        });
        cards
    }

    /// Topmost (most recently created) non-active attempt whose card contains `point`.
    pub fn card_at(&self, point: Point) -> Option<AttemptId> {
        self.attempt_cards()
            .into_iter()
            .find(|card| geometry::contains(card.bounds, point))
            .map(|card| card.attempt_id)
    }

    /// Newest active-attempt stroke within `radius` of `point`.
    pub fn active_stroke_at(&self, point: Point, radius: f64) -> Option<StrokeId> {
        let active = self.active_attempt?;
        self.strokes
            .iter()
            .rev()
            .filter(|s| s.attempt_id == active)
            .find(|s| s.hit_test(point, radius))
            .map(|s| s.id)
    }

    /// Active-attempt strokes with at least one point inside `polygon`.
    pub fn active_strokes_in_polygon(&self, polygon: &[Point]) -> Vec<StrokeId> {
        let Some(polygon_bounds) = geometry::bounds_of(polygon.iter().copied()) else {
            return Vec::new();
        };
        if polygon.len() < 3 {
            return Vec::new();
        }
        self.active_strokes()
            .filter(|s| s.intersects_polygon(polygon, polygon_bounds))
            .map(|s| s.id)
            .collect()
    }

    // --- mutations -----------------------------------------------------------

    /// Insert after every stroke created at or before this one.
    fn insert_sorted(&mut self, stroke: Stroke) {
        let index = self
            .strokes
            .partition_point(|s| s.created_at_ms <= stroke.created_at_ms);
        self.strokes.insert(index, stroke);
    }

    fn remove_ids(&mut self, ids: &[StrokeId]) -> Vec<Stroke> {
        let mut removed = Vec::new();
        self.strokes.retain(|s| {
            if ids.contains(&s.id) {
                removed.push(s.clone());
                false
            } else {
                true
            }
        });
        if let Selection::Strokes(selected) = &mut self.selection {
            selected.retain(|id| !ids.contains(id));
            if selected.is_empty() {
                self.selection = Selection::None;
            }
        }
        removed
    }

    fn translate_in_memory(&mut self, target: &TranslateTarget, dx: f64, dy: f64) {
        let now = now_ms();
        for stroke in &mut self.strokes {
            if target.covers(stroke) {
                stroke.translate(dx, dy, now);
            }
        }
        self.touch();
    }

    fn translate_op(target: &TranslateTarget, dx: f64, dy: f64) -> PersistOp {
        match target {
            TranslateTarget::Attempt(attempt_id) => PersistOp::TranslateAttempt(TranslateAttempt {
                attempt_id: *attempt_id,
                dx,
                dy,
            }),
            TranslateTarget::Strokes(ids) => PersistOp::TranslateStrokes(TranslateStrokes {
                stroke_ids: ids.clone(),
                dx,
                dy,
            }),
        }
    }

    /// Add a freshly drawn stroke: collection, history and outbox.
    pub fn commit_stroke(&mut self, stroke: Stroke) -> Result<(), StoreError> {
        let context = self.context.ok_or(StoreError::NoContext)?;
        if stroke.session_id != context.session_id || stroke.document_id != context.document_id {
            return Err(StoreError::ForeignStroke(stroke.id));
        }
        if self.stroke(stroke.id).is_some() {
            return Err(StoreError::DuplicateStroke(stroke.id));
        }
        self.outbox.push(PersistOp::Upsert(stroke.clone()));
        self.history.push(Command::Add(stroke.clone()));
        self.insert_sorted(stroke);
        self.touch();
        Ok(())
    }

    /// Remove one stroke during an eraser sweep without recording anything.
    ///
    /// The sweep is recorded as a whole by [`InkStore::record_erase`], or put
    /// back by [`InkStore::restore_strokes`] if the gesture is cancelled.
    pub fn take_stroke(&mut self, id: StrokeId) -> Option<Stroke> {
        let stroke = self.remove_ids(&[id]).pop();
        if stroke.is_some() {
            self.touch();
        }
        stroke
    }

    /// Put strokes back without recording anything.
    pub fn restore_strokes(&mut self, strokes: Vec<Stroke>) {
        for stroke in strokes {
            if self.stroke(stroke.id).is_none() {
                self.insert_sorted(stroke);
            }
        }
        self.touch();
    }

    /// Record strokes already taken out by an eraser sweep as one delete.
    pub fn record_erase(&mut self, erased: Vec<Stroke>) {
        if erased.is_empty() {
            return;
        }
        let ids: Vec<StrokeId> = erased.iter().map(|s| s.id).collect();
        self.outbox.push(PersistOp::Delete(ids));
        self.history.push(Command::Delete(erased));
    }

    /// Delete strokes as one undoable command. Returns how many were removed.
    pub fn delete_strokes(&mut self, ids: &[StrokeId]) -> usize {
        let removed = self.remove_ids(ids);
        let count = removed.len();
        if count > 0 {
            self.touch();
            self.record_erase(removed);
        }
        count
    }

    /// Delete the selected strokes of the active attempt.
    pub fn delete_selection(&mut self) -> usize {
        match self.selection.clone() {
            Selection::Strokes(ids) => self.delete_strokes(&ids),
            Selection::None | Selection::Attempt(_) => 0,
        }
    }

    /// Move strokes in memory only, e.g. while a drag is in progress.
    pub fn translate_preview(&mut self, target: &TranslateTarget, dx: f64, dy: f64) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        self.translate_in_memory(target, dx, dy);
    }

    /// Copies of the strokes `target` covers, taken when a drag starts.
    pub fn translation_snapshot(&self, target: &TranslateTarget) -> Vec<Stroke> {
        self.strokes.iter().filter(|s| target.covers(s)).cloned().collect()
    }

    /// Overwrite strokes with saved copies carrying the same ids. Ids no
    /// longer in the collection are skipped.
    pub fn restore_snapshot(&mut self, snapshot: &[Stroke]) {
        for saved in snapshot {
            if let Some(stroke) = self.strokes.iter_mut().find(|s| s.id == saved.id) {
                *stroke = saved.clone();
            }
        }
        self.touch();
    }

    /// Record a finished drag.
    ///
    /// Previewed steps are discarded: `before` (the snapshot taken at drag
    /// start) is restored and the total is applied to it once. A zero total
    /// is neither persisted nor recorded. Returns whether a command was pushed.
    pub fn commit_translation(&mut self, target: TranslateTarget, before: Vec<Stroke>, dx: f64, dy: f64) -> bool {
        self.restore_snapshot(&before);
        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        self.translate_in_memory(&target, dx, dy);
        let after = self.translation_snapshot(&target);
        self.outbox.push(Self::translate_op(&target, dx, dy));
        let command = match target {
            TranslateTarget::Attempt(attempt_id) => Command::TranslateAttempt {
                attempt_id,
                dx,
                dy,
                before,
                after,
            },
            TranslateTarget::Strokes(stroke_ids) => Command::TranslateStrokes {
                stroke_ids,
                dx,
                dy,
                before,
                after,
            },
        };
        self.history.push(command);
        true
    }

    /// Move strokes and record it in one step (no preview).
    pub fn translate(&mut self, target: TranslateTarget, dx: f64, dy: f64) -> bool {
        let before = self.translation_snapshot(&target);
        self.commit_translation(target, before, dx, dy)
    }

    // --- undo / redo -----------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Undo the most recent command. Returns false if there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(command) = self.history.pop_undo() else {
            return false;
        };
        log::debug!("undo {}", command.label());
        match &command {
            Command::Add(stroke) => {
                self.remove_ids(&[stroke.id]);
                self.outbox.push(PersistOp::Delete(vec![stroke.id]));
            }
            Command::Delete(strokes) => {
                for stroke in strokes {
                    if self.stroke(stroke.id).is_none() {
                        self.insert_sorted(stroke.clone());
                    }
                }
                self.outbox.push(PersistOp::BulkUpsert(strokes.clone()));
            }
            Command::TranslateAttempt {
                attempt_id,
                dx,
                dy,
                before,
                ..
            } => {
                self.restore_snapshot(before);
                let target = TranslateTarget::Attempt(*attempt_id);
                self.outbox.push(Self::translate_op(&target, -dx, -dy));
            }
            Command::TranslateStrokes {
                stroke_ids,
                dx,
                dy,
                before,
                ..
            } => {
                self.restore_snapshot(before);
                let target = TranslateTarget::Strokes(stroke_ids.clone());
                self.outbox.push(Self::translate_op(&target, -dx, -dy));
            }
        }
        self.history.push_redo(command);
        self.touch();
        true
    }

    /// Redo the most recently undone command. Returns false if there was nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(command) = self.history.pop_redo() else {
            return false;
        };
        log::debug!("redo {}", command.label());
        match &command {
            Command::Add(stroke) => {
                if self.stroke(stroke.id).is_none() {
                    self.insert_sorted(stroke.clone());
                }
                self.outbox.push(PersistOp::Upsert(stroke.clone()));
            }
            Command::Delete(strokes) => {
                let ids: Vec<StrokeId> = strokes.iter().map(|s| s.id).collect();
                self.remove_ids(&ids);
                self.outbox.push(PersistOp::Delete(ids));
            }
            Command::TranslateAttempt {
                attempt_id,
                dx,
                dy,
                after,
                ..
            } => {
                self.restore_snapshot(after);
                let target = TranslateTarget::Attempt(*attempt_id);
                self.outbox.push(Self::translate_op(&target, *dx, *dy));
            }
            Command::TranslateStrokes {
                stroke_ids,
                dx,
                dy,
                after,
                ..
            } => {
                self.restore_snapshot(after);
                let target = TranslateTarget::Strokes(stroke_ids.clone());
                self.outbox.push(Self::translate_op(&target, *dx, *dy));
            }
        }
        self.history.push_undone(command);
        self.touch();
        true
    }

    // --- persistence ---------------------------------------------------------

    pub fn outbox(&self) -> &PersistOutbox {
        &self.outbox
    }

    /// Whether some mutation has not been durably written yet.
    pub fn has_unsaved(&self) -> bool {
        self.outbox.has_unsaved()
    }

    /// Hand out queued writes; see [`PersistOutbox::take_ready`].
    pub fn take_persistence(&mut self, now_ms: u64) -> Option<OutboxBatch> {
        self.outbox.take_ready(now_ms)
    }

    pub fn settle_persistence(&mut self, outcome: FlushOutcome, now_ms: u64) {
        self.outbox.settle(outcome, now_ms);
    }

    /// Send queued writes while holding the store.
    pub async fn flush(&mut self, repo: &dyn InkRepository, now_ms: u64) -> Option<FlushOutcomeSummary> {
        self.outbox.flush(repo, now_ms).await
    }
}
