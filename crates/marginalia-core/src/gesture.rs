//! Pointer gesture state machine.
//!
//! Turns raw pointer events into drawing, erasing, lasso selection, card
//! selection and drag-to-move. Exactly one contact owns a gesture at a time;
//! every event carries the viewport it happened under, so world positions are
//! always derived from the current transform.

use crate::geometry;
use crate::input::{PointerInput, PointerKind};
use crate::selection::{Selection, TranslateTarget};
use crate::store::InkStore;
use crate::stroke::{AttemptId, InkPoint, Stroke, StrokeOwner};
use crate::time::now_ms;
use crate::tools::{BrushStyle, Tool};
use crate::viewport::Viewport;
use kurbo::{Point, Vec2};
use std::collections::HashSet;
use std::ops::{BitOr, BitOrAssign};

/// Which overlay layers an event dirtied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Redraw {
    /// Committed ink, cards and selection chrome.
    pub committed: bool,
    /// In-progress stroke or lasso.
    pub live: bool,
}

impl Redraw {
    pub const NONE: Self = Self {
        committed: false,
        live: false,
    };
    pub const COMMITTED: Self = Self {
        committed: true,
        live: false,
    };
    pub const LIVE: Self = Self {
        committed: false,
        live: true,
    };
    pub const ALL: Self = Self {
        committed: true,
        live: true,
    };

    pub fn is_empty(self) -> bool {
        !self.committed && !self.live
    }
}

impl BitOr for Redraw {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            committed: self.committed || rhs.committed,
            live: self.live || rhs.live,
        }
    }
}

impl BitOrAssign for Redraw {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// Public view of the current gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureMode {
    Idle,
    Draw,
    Erase,
    Lasso,
    Drag,
    Hold,
    /// Resolved to a plain selection; waiting for the pointer to lift.
    Settled,
}

#[derive(Debug, Clone)]
enum GestureState {
    Idle,
    Draw {
        contact: u64,
        owner: StrokeOwner,
        style: BrushStyle,
        points: Vec<InkPoint>,
    },
    Erase {
        contact: u64,
        erased: Vec<Stroke>,
    },
    Lasso {
        contact: u64,
        polygon: Vec<Point>,
    },
    Drag {
        contact: u64,
        target: TranslateTarget,
        /// Moved strokes as they were when the drag started.
        snapshot: Vec<Stroke>,
        start: Point,
        last: Point,
    },
    Hold {
        contact: u64,
        attempt_id: AttemptId,
        started_ms: u64,
        origin: Point,
    },
    Settled {
        contact: u64,
    },
}

impl GestureState {
    fn contact(&self) -> Option<u64> {
        match self {
            GestureState::Idle => None,
            GestureState::Draw { contact, .. }
            | GestureState::Erase { contact, .. }
            | GestureState::Lasso { contact, .. }
            | GestureState::Drag { contact, .. }
            | GestureState::Hold { contact, .. }
            | GestureState::Settled { contact } => Some(*contact),
        }
    }

    fn mode(&self) -> GestureMode {
        match self {
            GestureState::Idle => GestureMode::Idle,
            GestureState::Draw { .. } => GestureMode::Draw,
            GestureState::Erase { .. } => GestureMode::Erase,
            GestureState::Lasso { .. } => GestureMode::Lasso,
            GestureState::Drag { .. } => GestureMode::Drag,
            GestureState::Hold { .. } => GestureMode::Hold,
            GestureState::Settled { .. } => GestureMode::Settled,
        }
    }
}

/// Gesture interpreter for one overlay.
#[derive(Debug, Clone)]
pub struct GestureMachine {
    state: GestureState,
    contacts: HashSet<u64>,
}

impl Default for GestureMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureMachine {
    pub fn new() -> Self {
        Self {
            state: GestureState::Idle,
            contacts: HashSet::new(),
        }
    }

    pub fn mode(&self) -> GestureMode {
        self.state.mode()
    }

    /// Contact that owns the current gesture.
    pub fn owner(&self) -> Option<u64> {
        self.state.contact()
    }

    /// Number of contacts currently down.
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Draft stroke being drawn, in world coordinates.
    pub fn live_stroke(&self) -> Option<(&[InkPoint], &BrushStyle)> {
        match &self.state {
            GestureState::Draw { points, style, .. } => Some((points.as_slice(), style)),
            _ => None,
        }
    }

    /// Lasso polygon being traced, in world coordinates.
    pub fn lasso_polygon(&self) -> Option<&[Point]> {
        match &self.state {
            GestureState::Lasso { polygon, .. } => Some(polygon.as_slice()),
            _ => None,
        }
    }

    fn transition(&mut self, next: GestureState) {
        log::debug!("gesture: {:?} -> {:?}", self.mode(), next.mode());
        self.state = next;
    }

    pub fn pointer_down(&mut self, store: &mut InkStore, viewport: &Viewport, input: PointerInput) -> Redraw {
        self.contacts.insert(input.contact_id);
        if self.contacts.len() > 1 {
            // Multi-touch belongs to the pager; only a pending hold reacts.
            if let GestureState::Hold { contact, .. } = self.state {
                self.transition(GestureState::Settled { contact });
            }
            return Redraw::NONE;
        }
        if !matches!(self.state, GestureState::Idle) {
            return Redraw::NONE;
        }

        let world = viewport.to_world(input.position);
        let contact = input.contact_id;
        match store.tool() {
            Tool::Pencil | Tool::Marker => {
                let (Some(owner), Some(style)) = (store.active_owner(), store.settings().active_style()) else {
                    return Redraw::NONE;
                };
                let point = InkPoint::new(world.x, world.y, input.effective_pressure(), input.t_ms);
                self.transition(GestureState::Draw {
                    contact,
                    owner,
                    style,
                    points: vec![point],
                });
                Redraw::LIVE
            }
            Tool::Eraser => {
                if store.active_attempt().is_none() {
                    return Redraw::NONE;
                }
                let mut erased = Vec::new();
                let redraw = erase_at(store, viewport, world, &mut erased);
                self.transition(GestureState::Erase { contact, erased });
                redraw
            }
            Tool::Select => self.select_down(store, world, input),
        }
    }

    fn select_down(&mut self, store: &mut InkStore, world: Point, input: PointerInput) -> Redraw {
        let contact = input.contact_id;
        if let (Some(bounds), Some(target)) = (store.selection_bounds(), store.selection().translate_target()) {
            if geometry::contains(bounds, world) {
                self.transition(drag(store, contact, target, world));
                return Redraw::NONE;
            }
        }

        let card = if store.selection().is_empty() {
            store.card_at(world)
        } else {
            None
        };
        if let Some(attempt_id) = card {
            store.set_selection(Selection::Attempt(attempt_id));
            let next = match input.kind {
                PointerKind::Touch => GestureState::Hold {
                    contact,
                    attempt_id,
                    started_ms: input.t_ms,
                    origin: world,
                },
                PointerKind::Mouse | PointerKind::Pen => {
                    drag(store, contact, TranslateTarget::Attempt(attempt_id), world)
                }
            };
            self.transition(next);
            return Redraw::COMMITTED;
        }

        self.transition(GestureState::Lasso {
            contact,
            polygon: vec![world],
        });
        Redraw::LIVE
    }

    pub fn pointer_move(&mut self, store: &mut InkStore, viewport: &Viewport, input: PointerInput) -> Redraw {
        if self.owner() != Some(input.contact_id) {
            return Redraw::NONE;
        }
        let world = viewport.to_world(input.position);
        let config = *store.config();

        if let GestureState::Hold {
            contact,
            attempt_id,
            started_ms,
            origin,
        } = self.state
        {
            if input.t_ms.saturating_sub(started_ms) >= config.hold_ms {
                self.arm_hold(store, contact, attempt_id, origin);
            } else if geometry::dist_sq(origin, world) > config.hold_cancel_distance * config.hold_cancel_distance {
                self.transition(GestureState::Settled { contact });
                return Redraw::NONE;
            } else {
                return Redraw::NONE;
            }
        }

        match &mut self.state {
            GestureState::Draw { points, .. } => {
                let Some(last) = points.last() else {
                    return Redraw::NONE;
                };
                let min = config.min_point_distance;
                if geometry::dist_sq(last.position(), world) < min * min {
                    return Redraw::NONE;
                }
                points.push(InkPoint::new(world.x, world.y, input.effective_pressure(), input.t_ms));
                Redraw::LIVE
            }
            GestureState::Erase { erased, .. } => erase_at(store, viewport, world, erased),
            GestureState::Lasso { polygon, .. } => {
                if polygon.last() == Some(&world) {
                    return Redraw::NONE;
                }
                polygon.push(world);
                Redraw::LIVE
            }
            GestureState::Drag { target, last, .. } => {
                let delta = world - *last;
                *last = world;
                if delta == Vec2::ZERO {
                    return Redraw::NONE;
                }
                store.translate_preview(target, delta.x, delta.y);
                Redraw::COMMITTED
            }
            GestureState::Idle | GestureState::Hold { .. } | GestureState::Settled { .. } => Redraw::NONE,
        }
    }

    pub fn pointer_up(&mut self, store: &mut InkStore, viewport: &Viewport, input: PointerInput) -> Redraw {
        self.contacts.remove(&input.contact_id);
        if self.owner() != Some(input.contact_id) {
            return Redraw::NONE;
        }
        let world = viewport.to_world(input.position);
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        log::debug!("gesture: {:?} -> Idle", state.mode());

        match state {
            GestureState::Draw {
                owner,
                style,
                mut points,
                ..
            } => {
                let min = store.config().min_point_distance;
                let far_enough = points
                    .last()
                    .is_some_and(|last| geometry::dist_sq(last.position(), world) >= min * min);
                if far_enough {
                    points.push(InkPoint::new(world.x, world.y, input.effective_pressure(), input.t_ms));
                }
                let count = points.len();
                match Stroke::new(owner, points, style, now_ms()) {
                    Ok(stroke) => {
                        if let Err(e) = store.commit_stroke(stroke) {
                            log::warn!("Dropping stroke: {}", e);
                        }
                        Redraw::ALL
                    }
                    Err(e) => {
                        log::debug!("Discarding draft stroke with {} point(s): {}", count, e);
                        Redraw::LIVE
                    }
                }
            }
            GestureState::Erase { erased, .. } => {
                let dirty = !erased.is_empty();
                store.record_erase(erased);
                if dirty { Redraw::COMMITTED } else { Redraw::NONE }
            }
            GestureState::Lasso { polygon, .. } => {
                if polygon.len() < 3 {
                    tap_select(store, viewport, world);
                } else {
                    let hits = store.active_strokes_in_polygon(&polygon);
                    store.set_selection(Selection::Strokes(hits));
                }
                Redraw::ALL
            }
            GestureState::Drag {
                target,
                snapshot,
                start,
                last,
                ..
            } => {
                let total = last - start;
                if store.commit_translation(target, snapshot, total.x, total.y) {
                    Redraw::COMMITTED
                } else {
                    Redraw::NONE
                }
            }
            GestureState::Hold { .. } | GestureState::Settled { .. } | GestureState::Idle => Redraw::NONE,
        }
    }

    /// Abort the gesture and revert its in-memory effects.
    ///
    /// Nothing is written to history or persistence.
    pub fn pointer_cancel(&mut self, store: &mut InkStore) -> Redraw {
        self.contacts.clear();
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        match state {
            GestureState::Idle => Redraw::NONE,
            GestureState::Erase { erased, .. } => {
                if erased.is_empty() {
                    Redraw::NONE
                } else {
                    store.restore_strokes(erased);
                    Redraw::COMMITTED
                }
            }
            GestureState::Drag { snapshot, .. } => {
                store.restore_snapshot(&snapshot);
                Redraw::COMMITTED
            }
            GestureState::Draw { .. } | GestureState::Lasso { .. } => Redraw::LIVE,
            GestureState::Hold { .. } | GestureState::Settled { .. } => Redraw::NONE,
        }
    }

    /// Arm a pending touch hold once its delay has elapsed.
    ///
    /// Returns true if the gesture became a drag.
    pub fn poll_hold(&mut self, store: &InkStore, now_ms: u64) -> bool {
        let GestureState::Hold {
            contact,
            attempt_id,
            started_ms,
            origin,
        } = self.state
        else {
            return false;
        };
        if now_ms.saturating_sub(started_ms) < store.config().hold_ms {
            return false;
        }
        self.arm_hold(store, contact, attempt_id, origin);
        true
    }

    fn arm_hold(&mut self, store: &InkStore, contact: u64, attempt_id: AttemptId, origin: Point) {
        self.transition(drag(store, contact, TranslateTarget::Attempt(attempt_id), origin));
    }
}

fn drag(store: &InkStore, contact: u64, target: TranslateTarget, at: Point) -> GestureState {
    GestureState::Drag {
        contact,
        snapshot: store.translation_snapshot(&target),
        target,
        start: at,
        last: at,
    }
}

/// Remove the newest active-attempt stroke under the eraser.
fn erase_at(store: &mut InkStore, viewport: &Viewport, world: Point, erased: &mut Vec<Stroke>) -> Redraw {
    let radius = viewport.screen_len_to_world(store.config().eraser_radius_px);
    let Some(id) = store.active_stroke_at(world, radius) else {
        return Redraw::NONE;
    };
    match store.take_stroke(id) {
        Some(stroke) => {
            erased.push(stroke);
            Redraw::COMMITTED
        }
        None => Redraw::NONE,
    }
}

/// Tap fallback: active stroke under the point, else a card, else nothing.
fn tap_select(store: &mut InkStore, viewport: &Viewport, world: Point) {
    let radius = viewport.screen_len_to_world(store.config().tap_radius_px);
    if let Some(id) = store.active_stroke_at(world, radius) {
        store.set_selection(Selection::Strokes(vec![id]));
    } else if let Some(attempt_id) = store.card_at(world) {
        store.set_selection(Selection::Attempt(attempt_id));
    } else {
        store.clear_selection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use crate::repository::test_util::block_on;
    use crate::store::InkContext;
    use crate::stroke::StrokeId;
    use uuid::Uuid;

    struct Rig {
        store: InkStore,
        machine: GestureMachine,
        viewport: Viewport,
        attempt: AttemptId,
    }

    fn rig() -> Rig {
        let mut store = InkStore::default();
        let context = InkContext {
            session_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
        };
        let ticket = store.set_context(Some(context)).unwrap();
        store
            .apply_hydration(block_on(ticket.load(&MemoryRepository::new())))
            .unwrap();
        let attempt = Uuid::new_v4();
        store.set_active_attempt(Some(attempt));
        Rig {
            store,
            machine: GestureMachine::new(),
            viewport: Viewport::default(),
            attempt,
        }
    }

    impl Rig {
        fn seed(&mut self, attempt: AttemptId, coords: &[(f64, f64)], created: u64) -> StrokeId {
            let context = self.store.context().unwrap();
            let owner = StrokeOwner {
                session_id: context.session_id,
                document_id: context.document_id,
                attempt_id: attempt,
            };
            let points = coords
                .iter()
                .map(|&(x, y)| InkPoint::new(x, y, 0.5, created))
                .collect();
            let stroke = Stroke::new(owner, points, BrushStyle::pencil(), created).unwrap();
            let id = stroke.id;
            self.store.restore_strokes(vec![stroke]);
            id
        }

        fn down(&mut self, p: PointerInput) -> Redraw {
            self.machine.pointer_down(&mut self.store, &self.viewport, p)
        }

        fn mv(&mut self, p: PointerInput) -> Redraw {
            self.machine.pointer_move(&mut self.store, &self.viewport, p)
        }

        fn up(&mut self, p: PointerInput) -> Redraw {
            self.machine.pointer_up(&mut self.store, &self.viewport, p)
        }

        /// Down, moves and up for one mouse contact.
        fn drag_path(&mut self, path: &[(f64, f64)]) {
            let mut t = 0;
            let first = PointerInput::new(1, PointerKind::Mouse, Point::new(path[0].0, path[0].1), t);
            self.down(first);
            let mut p = first;
            for &(x, y) in &path[1..] {
                t += 16;
                p = p.moved_to(Point::new(x, y), t);
                self.mv(p);
            }
            self.up(p);
        }
    }

    fn mouse(x: f64, y: f64, t: u64) -> PointerInput {
        PointerInput::new(1, PointerKind::Mouse, Point::new(x, y), t)
    }

    #[test]
    fn test_draw_commits_stroke() {
        let mut rig = rig();
        rig.drag_path(&[(0.0, 0.0), (5.0, 0.0), (10.0, 5.0)]);

        assert_eq!(rig.machine.mode(), GestureMode::Idle);
        let strokes = rig.store.strokes();
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].attempt_id, rig.attempt);
        assert_eq!(strokes[0].len(), 3);
        assert!(rig.store.can_undo());
    }

    #[test]
    fn test_single_point_stroke_discarded() {
        let mut rig = rig();
        rig.down(mouse(10.0, 10.0, 0));
        // Below the minimum spacing, so never recorded.
        rig.mv(mouse(10.1, 10.1, 16));
        rig.up(mouse(10.1, 10.1, 32));

        assert!(rig.store.strokes().is_empty());
        assert!(!rig.store.can_undo());
        assert!(rig.store.outbox().is_empty());
    }

    #[test]
    fn test_release_point_is_recorded() {
        let mut rig = rig();
        rig.down(mouse(0.0, 0.0, 0));
        rig.up(mouse(30.0, 0.0, 16));
        let strokes = rig.store.strokes();
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].len(), 2);
        assert_eq!(strokes[0].points()[1].position(), Point::new(30.0, 0.0));
        assert_eq!(strokes[0].points()[1].t_ms, 16);

        // A release within the minimum spacing adds nothing.
        rig.down(mouse(0.0, 10.0, 100));
        rig.mv(mouse(20.0, 10.0, 116));
        rig.up(mouse(20.2, 10.0, 132));
        let strokes = rig.store.strokes();
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[1].len(), 2);
        assert_eq!(strokes[1].points()[1].position(), Point::new(20.0, 10.0));
    }

    #[test]
    fn test_draw_uses_viewport_at_event_time() {
        let mut rig = rig();
        rig.viewport = Viewport::new(Vec2::new(100.0, 50.0), 2.0);
        rig.drag_path(&[(100.0, 50.0), (120.0, 70.0)]);
        let s = &rig.store.strokes()[0];
        assert_eq!(s.points()[0].position(), Point::new(0.0, 0.0));
        assert_eq!(s.points()[1].position(), Point::new(10.0, 10.0));
    }

    #[test]
    fn test_no_draw_without_active_attempt() {
        let mut rig = rig();
        rig.store.set_active_attempt(None);
        rig.drag_path(&[(0.0, 0.0), (50.0, 50.0)]);
        assert!(rig.store.strokes().is_empty());
    }

    #[test]
    fn test_eraser_only_touches_active_attempt() {
        let mut rig = rig();
        let other = Uuid::new_v4();
        let a = rig.seed(rig.attempt, &[(0.0, 0.0), (10.0, 0.0)], 1);
        let b = rig.seed(rig.attempt, &[(100.0, 0.0), (110.0, 0.0)], 2);
        let foreign = rig.seed(other, &[(0.0, 2.0), (10.0, 2.0)], 3);

        rig.store.set_tool(Tool::Eraser);
        rig.drag_path(&[(0.0, 0.0), (50.0, 0.0), (100.0, 0.0), (200.0, 200.0)]);

        assert!(rig.store.stroke(a).is_none());
        assert!(rig.store.stroke(b).is_none());
        assert!(rig.store.stroke(foreign).is_some());

        // One sweep, one command, one delete batch.
        assert_eq!(rig.store.history().undo_len(), 1);
        let ops: Vec<_> = rig.store.outbox().pending().cloned().collect();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            crate::repository::PersistOp::Delete(ids) => assert_eq!(ids, &vec![a, b]),
            other => panic!("unexpected op {:?}", other),
        }

        assert!(rig.store.undo());
        assert!(rig.store.stroke(a).is_some());
        assert!(rig.store.stroke(b).is_some());
    }

    #[test]
    fn test_eraser_cancel_restores() {
        let mut rig = rig();
        let a = rig.seed(rig.attempt, &[(0.0, 0.0), (10.0, 0.0)], 1);
        rig.store.set_tool(Tool::Eraser);
        rig.down(mouse(0.0, 0.0, 0));
        assert!(rig.store.stroke(a).is_none());

        rig.machine.pointer_cancel(&mut rig.store);
        assert!(rig.store.stroke(a).is_some());
        assert!(!rig.store.can_undo());
        assert!(rig.store.outbox().is_empty());
    }

    #[test]
    fn test_lasso_selects_contained_strokes() {
        let mut rig = rig();
        let other = Uuid::new_v4();
        let inside = rig.seed(rig.attempt, &[(10.0, 10.0), (20.0, 20.0)], 1);
        let outside = rig.seed(rig.attempt, &[(200.0, 200.0), (210.0, 210.0)], 2);
        rig.seed(other, &[(30.0, 30.0), (31.0, 31.0)], 3);

        rig.store.set_tool(Tool::Select);
        rig.drag_path(&[(0.0, 0.0), (50.0, 0.0), (50.0, 50.0), (0.0, 50.0)]);

        assert_eq!(rig.store.selection(), &Selection::Strokes(vec![inside]));
        assert!(!rig.store.selection().contains_stroke(outside));
    }

    #[test]
    fn test_tap_selects_stroke_then_card_then_clears() {
        let mut rig = rig();
        let other = Uuid::new_v4();
        let mine = rig.seed(rig.attempt, &[(10.0, 10.0), (20.0, 10.0)], 1);
        rig.seed(other, &[(300.0, 300.0), (320.0, 320.0)], 2);
        rig.store.set_tool(Tool::Select);

        rig.drag_path(&[(11.0, 11.0)]);
        assert_eq!(rig.store.selection(), &Selection::Strokes(vec![mine]));

        // Outside the selection box and off any stroke: the card wins.
        rig.drag_path(&[(310.0, 310.0), (311.0, 311.0)]);
        assert_eq!(rig.store.selection(), &Selection::Attempt(other));

        rig.store.clear_selection();
        rig.drag_path(&[(1000.0, 1000.0)]);
        assert!(rig.store.selection().is_empty());
    }

    #[test]
    fn test_drag_selection_commits_one_translate() {
        let mut rig = rig();
        let a = rig.seed(rig.attempt, &[(10.0, 10.0), (20.0, 20.0)], 1);
        rig.store.set_tool(Tool::Select);
        rig.store.set_selection(Selection::Strokes(vec![a]));

        rig.drag_path(&[(15.0, 15.0), (20.0, 15.0), (25.0, 20.0)]);

        assert_eq!(rig.store.stroke(a).unwrap().bounds(), kurbo::Rect::new(20.0, 15.0, 30.0, 25.0));
        assert_eq!(rig.store.history().undo_len(), 1);
        assert_eq!(rig.store.outbox().len(), 1);

        assert!(rig.store.undo());
        assert_eq!(rig.store.stroke(a).unwrap().bounds(), kurbo::Rect::new(10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn test_zero_drag_not_recorded() {
        let mut rig = rig();
        let a = rig.seed(rig.attempt, &[(10.0, 10.0), (20.0, 20.0)], 1);
        rig.store.set_tool(Tool::Select);
        rig.store.set_selection(Selection::Strokes(vec![a]));

        rig.drag_path(&[(15.0, 15.0), (25.0, 15.0), (15.0, 15.0)]);
        assert!(!rig.store.can_undo());
        assert!(rig.store.outbox().is_empty());
    }

    #[test]
    fn test_drag_cancel_reverts_preview() {
        let mut rig = rig();
        let a = rig.seed(rig.attempt, &[(10.0, 10.0), (20.0, 20.0)], 1);
        rig.store.set_tool(Tool::Select);
        rig.store.set_selection(Selection::Strokes(vec![a]));

        rig.down(mouse(15.0, 15.0, 0));
        rig.mv(mouse(40.0, 40.0, 16));
        rig.machine.pointer_cancel(&mut rig.store);

        assert_eq!(rig.store.stroke(a).unwrap().bounds(), kurbo::Rect::new(10.0, 10.0, 20.0, 20.0));
        assert!(!rig.store.can_undo());
    }

    #[test]
    fn test_drag_undo_redo_exact_under_fractional_zoom() {
        let mut rig = rig();
        let a = rig.seed(rig.attempt, &[(10.1, 10.7), (20.3, 20.9)], 1);
        let original = rig.store.stroke(a).unwrap().points().to_vec();
        rig.store.set_tool(Tool::Select);
        rig.store.set_selection(Selection::Strokes(vec![a]));
        rig.viewport = Viewport::new(Vec2::new(0.7, 0.3), 3.0);

        // World (15, 15) and seven uneven steps from there.
        let path: Vec<(f64, f64)> = (0..8)
            .map(|i| (45.7 + i as f64 * 1.3, 45.3 + i as f64 * 0.7))
            .collect();
        rig.drag_path(&path);
        assert_eq!(rig.store.history().undo_len(), 1);

        let start = rig.viewport.to_world(Point::new(path[0].0, path[0].1));
        let end = rig.viewport.to_world(Point::new(path[7].0, path[7].1));
        let total = end - start;
        let moved = rig.store.stroke(a).unwrap().points().to_vec();
        for (p, o) in moved.iter().zip(&original) {
            assert_eq!((p.x, p.y), (o.x + total.x, o.y + total.y));
        }

        assert!(rig.store.undo());
        assert_eq!(rig.store.stroke(a).unwrap().points(), original.as_slice());
        assert!(rig.store.redo());
        assert_eq!(rig.store.stroke(a).unwrap().points(), moved.as_slice());
        assert!(rig.store.undo());
        assert_eq!(rig.store.stroke(a).unwrap().points(), original.as_slice());
    }

    #[test]
    fn test_drag_cancel_restores_exact_points() {
        let mut rig = rig();
        let a = rig.seed(rig.attempt, &[(10.1, 10.7), (20.3, 20.9)], 1);
        let original = rig.store.stroke(a).unwrap().points().to_vec();
        rig.store.set_tool(Tool::Select);
        rig.store.set_selection(Selection::Strokes(vec![a]));
        rig.viewport = Viewport::new(Vec2::new(0.7, 0.3), 3.0);

        rig.down(mouse(45.7, 45.3, 0));
        for i in 1..8 {
            rig.mv(mouse(45.7 + i as f64 * 1.3, 45.3 + i as f64 * 0.7, i * 16));
        }
        rig.machine.pointer_cancel(&mut rig.store);
        assert_eq!(rig.store.stroke(a).unwrap().points(), original.as_slice());
    }

    #[test]
    fn test_mouse_card_drag_moves_attempt() {
        let mut rig = rig();
        let other = Uuid::new_v4();
        let s = rig.seed(other, &[(100.0, 100.0), (120.0, 120.0)], 1);
        rig.store.set_tool(Tool::Select);

        rig.drag_path(&[(110.0, 110.0), (130.0, 110.0)]);

        assert_eq!(rig.store.stroke(s).unwrap().bounds(), kurbo::Rect::new(120.0, 100.0, 140.0, 120.0));
        assert_eq!(rig.store.selection(), &Selection::Attempt(other));
        assert_eq!(rig.store.history().undo_len(), 1);
    }

    #[test]
    fn test_touch_hold_arms_drag() {
        let mut rig = rig();
        let other = Uuid::new_v4();
        let s = rig.seed(other, &[(100.0, 100.0), (120.0, 120.0)], 1);
        rig.store.set_tool(Tool::Select);

        let touch = PointerInput::new(9, PointerKind::Touch, Point::new(110.0, 110.0), 1_000);
        rig.down(touch);
        assert_eq!(rig.machine.mode(), GestureMode::Hold);

        assert!(!rig.machine.poll_hold(&rig.store, 1_100));
        assert!(rig.machine.poll_hold(&rig.store, 1_000 + rig.store.config().hold_ms));
        assert_eq!(rig.machine.mode(), GestureMode::Drag);

        let moved = touch.moved_to(Point::new(110.0, 150.0), 1_500);
        rig.mv(moved);
        rig.up(moved);
        assert_eq!(rig.store.stroke(s).unwrap().bounds(), kurbo::Rect::new(100.0, 140.0, 120.0, 160.0));
    }

    #[test]
    fn test_touch_move_before_hold_settles() {
        let mut rig = rig();
        let other = Uuid::new_v4();
        let s = rig.seed(other, &[(100.0, 100.0), (120.0, 120.0)], 1);
        rig.store.set_tool(Tool::Select);

        let touch = PointerInput::new(9, PointerKind::Touch, Point::new(110.0, 110.0), 1_000);
        rig.down(touch);
        rig.mv(touch.moved_to(Point::new(110.0, 140.0), 1_050));
        assert_eq!(rig.machine.mode(), GestureMode::Settled);

        rig.up(touch.moved_to(Point::new(110.0, 140.0), 1_100));
        assert_eq!(rig.store.selection(), &Selection::Attempt(other));
        assert_eq!(rig.store.stroke(s).unwrap().bounds(), kurbo::Rect::new(100.0, 100.0, 120.0, 120.0));
        assert!(!rig.store.can_undo());
    }

    #[test]
    fn test_second_contact_settles_hold_and_is_ignored() {
        let mut rig = rig();
        let other = Uuid::new_v4();
        rig.seed(other, &[(100.0, 100.0), (120.0, 120.0)], 1);
        rig.store.set_tool(Tool::Select);

        let first = PointerInput::new(1, PointerKind::Touch, Point::new(110.0, 110.0), 0);
        let second = PointerInput::new(2, PointerKind::Touch, Point::new(300.0, 300.0), 10);
        rig.down(first);
        rig.down(second);
        assert_eq!(rig.machine.mode(), GestureMode::Settled);
        assert_eq!(rig.machine.owner(), Some(1));

        assert!(rig.mv(second.moved_to(Point::new(350.0, 350.0), 20)).is_empty());
        rig.up(second);
        assert_eq!(rig.machine.mode(), GestureMode::Settled);
        rig.up(first);
        assert_eq!(rig.machine.mode(), GestureMode::Idle);
    }

    #[test]
    fn test_second_contact_does_not_disturb_draw() {
        let mut rig = rig();
        let pen = PointerInput::new(1, PointerKind::Pen, Point::new(0.0, 0.0), 0).with_pressure(0.7);
        rig.down(pen);
        let palm = PointerInput::new(2, PointerKind::Touch, Point::new(500.0, 500.0), 5);
        rig.down(palm);
        rig.mv(palm.moved_to(Point::new(600.0, 600.0), 10));
        rig.mv(pen.moved_to(Point::new(10.0, 0.0), 16));
        rig.up(palm);
        rig.up(pen.moved_to(Point::new(10.0, 0.0), 32));

        let strokes = rig.store.strokes();
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].points()[0].pressure, 0.7);
        assert_eq!(strokes[0].bounds(), kurbo::Rect::new(0.0, 0.0, 10.0, 0.0));
    }

    #[test]
    fn test_cancel_discards_draft() {
        let mut rig = rig();
        rig.down(mouse(0.0, 0.0, 0));
        rig.mv(mouse(20.0, 0.0, 16));
        assert!(rig.machine.live_stroke().is_some());
        assert_eq!(rig.machine.pointer_cancel(&mut rig.store), Redraw::LIVE);
        assert_eq!(rig.machine.mode(), GestureMode::Idle);
        assert_eq!(rig.machine.contact_count(), 0);
        assert!(rig.store.strokes().is_empty());
    }
}
