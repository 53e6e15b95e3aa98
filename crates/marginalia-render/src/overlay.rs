//! The ink overlay surface.
//!
//! Binds the gesture machine to pointer input and keeps two raster layers in
//! screen space: a committed layer (cards, ink, selection box) repainted when
//! the store changes, and a live layer (draft stroke, lasso) repainted on every
//! input frame. Painting is driven by [`FrameScheduler`] tickets.

use crate::document::DocumentRenderer;
use crate::export::{CompositeExporter, ExportError, ExportRequest, ExportedImage};
use crate::frame::{FrameScheduler, FrameTicket};
use crate::raster;
use kurbo::{Point, Rect};
use marginalia_core::repository::FlushOutcomeSummary;
use marginalia_core::time::now_ms;
use marginalia_core::{
    AttemptId, DocumentId, GestureMachine, GestureMode, Hydration, HydrationTicket, InkColor, InkConfig, InkContext,
    InkRepository, InkStore, PointerInput, Redraw, RepositoryResult, SessionId, Viewport,
};
use tiny_skia::Pixmap;

/// What the host screen mounts the overlay with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountProps {
    pub session_id: SessionId,
    pub document_id: DocumentId,
    pub active_attempt_id: Option<AttemptId>,
}

/// Colors and metrics of the overlay chrome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub card_fill: InkColor,
    pub tab_fill: InkColor,
    pub selection_color: InkColor,
    pub lasso_color: InkColor,
    /// Card corner radius in screen pixels.
    pub card_radius: f64,
    /// Label tab size in screen pixels.
    pub tab_width: f64,
    pub tab_height: f64,
    /// Inset of the label text from the tab's left edge.
    pub label_inset: f64,
    pub outline_width: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            card_fill: InkColor::new(148, 163, 184, 40),
            tab_fill: InkColor::new(100, 116, 139, 200),
            selection_color: InkColor::new(59, 130, 246, 255),
            lasso_color: InkColor::new(59, 130, 246, 180),
            card_radius: 10.0,
            tab_width: 96.0,
            tab_height: 20.0,
            label_inset: 8.0,
            outline_width: 1.5,
        }
    }
}

impl OverlayStyle {
    pub fn with_card_fill(mut self, color: InkColor) -> Self {
        self.card_fill = color;
        self
    }

    pub fn with_tab_fill(mut self, color: InkColor) -> Self {
        self.tab_fill = color;
        self
    }

    pub fn with_selection_color(mut self, color: InkColor) -> Self {
        self.selection_color = color;
        self
    }

    pub fn with_lasso_color(mut self, color: InkColor) -> Self {
        self.lasso_color = color;
        self
    }
}

/// Where the host should draw one card's label text.
#[derive(Debug, Clone, PartialEq)]
pub struct CardLabel {
    pub attempt_id: AttemptId,
    pub text: String,
    /// Left end of the text baseline's vertical centre, in screen pixels.
    pub anchor: Point,
    /// The tab painted behind the text, in screen pixels.
    pub tab: Rect,
}

pub struct InkOverlay {
    store: InkStore,
    gestures: GestureMachine,
    viewport: Viewport,
    style: OverlayStyle,
    config: InkConfig,
    size: (u32, u32),
    /// `None` while the canvas has no area.
    committed: Option<Pixmap>,
    live: Option<Pixmap>,
    frames: FrameScheduler,
}

impl InkOverlay {
    pub fn new(config: InkConfig, width: u32, height: u32) -> Self {
        Self {
            store: InkStore::new(&config),
            gestures: GestureMachine::new(),
            viewport: Viewport::default(),
            style: OverlayStyle::default(),
            config,
            size: (width, height),
            committed: raster::surface(width, height),
            live: raster::surface(width, height),
            frames: FrameScheduler::new(),
        }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn store(&self) -> &InkStore {
        &self.store
    }

    /// Mutable store access. Call [`InkOverlay::invalidate`] afterwards if
    /// the change is visible.
    pub fn store_mut(&mut self) -> &mut InkStore {
        &mut self.store
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn gesture_mode(&self) -> GestureMode {
        self.gestures.mode()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn committed_layer(&self) -> Option<&Pixmap> {
        self.committed.as_ref()
    }

    pub fn live_layer(&self) -> Option<&Pixmap> {
        self.live.as_ref()
    }

    // --- lifecycle -------------------------------------------------------------

    /// Point the overlay at a session, document and active attempt.
    ///
    /// Returns a hydration ticket when the `(session, document)` pair changed;
    /// load it and hand the result to [`InkOverlay::apply_hydration`].
    pub fn mount(&mut self, props: MountProps) -> Option<HydrationTicket> {
        let context = InkContext {
            session_id: props.session_id,
            document_id: props.document_id,
        };
        // Settle any gesture against the outgoing context before it is swapped.
        if self.store.context() != Some(context) {
            self.gestures.pointer_cancel(&mut self.store);
        }
        let ticket = self.store.set_context(Some(context));
        self.store.set_active_attempt(props.active_attempt_id);
        self.invalidate();
        ticket
    }

    /// Drop the context and everything scoped to it.
    pub fn unmount(&mut self) {
        self.gestures.pointer_cancel(&mut self.store);
        self.store.set_context(None);
        self.invalidate();
    }

    pub fn apply_hydration(&mut self, hydration: Hydration) -> RepositoryResult<bool> {
        let applied = self.store.apply_hydration(hydration)?;
        if applied {
            self.frames.request(Redraw::COMMITTED);
        }
        Ok(applied)
    }

    pub fn set_active_attempt(&mut self, attempt: Option<AttemptId>) -> Option<FrameTicket> {
        self.store.set_active_attempt(attempt);
        self.frames.request(Redraw::COMMITTED)
    }

    pub fn set_attempt_label(&mut self, attempt_id: AttemptId, label: impl Into<String>) -> Option<FrameTicket> {
        self.store.set_attempt_label(attempt_id, label);
        self.frames.request(Redraw::COMMITTED)
    }

    /// Adopt the pager's current pan and zoom.
    pub fn set_viewport(&mut self, viewport: Viewport) -> Option<FrameTicket> {
        if !viewport.is_valid() {
            log::warn!("Ignoring invalid viewport {:?}", viewport);
            return None;
        }
        if viewport == self.viewport {
            return None;
        }
        self.viewport = viewport;
        self.frames.request(Redraw::ALL)
    }

    /// Resize both layers to the canvas size in pixels.
    pub fn resize(&mut self, width: u32, height: u32) -> Option<FrameTicket> {
        if self.size == (width, height) {
            return None;
        }
        self.size = (width, height);
        self.committed = raster::surface(width, height);
        self.live = raster::surface(width, height);
        self.frames.request(Redraw::ALL)
    }

    /// Schedule a full repaint.
    pub fn invalidate(&mut self) -> Option<FrameTicket> {
        self.frames.request(Redraw::ALL)
    }

    // --- input -----------------------------------------------------------------

    pub fn pointer_down(&mut self, input: PointerInput) -> Option<FrameTicket> {
        let redraw = self.gestures.pointer_down(&mut self.store, &self.viewport, input);
        self.frames.request(redraw)
    }

    pub fn pointer_move(&mut self, input: PointerInput) -> Option<FrameTicket> {
        let redraw = self.gestures.pointer_move(&mut self.store, &self.viewport, input);
        self.frames.request(redraw)
    }

    pub fn pointer_up(&mut self, input: PointerInput) -> Option<FrameTicket> {
        let redraw = self.gestures.pointer_up(&mut self.store, &self.viewport, input);
        self.frames.request(redraw)
    }

    pub fn pointer_cancel(&mut self) -> Option<FrameTicket> {
        let redraw = self.gestures.pointer_cancel(&mut self.store);
        self.frames.request(redraw)
    }

    /// Drive the touch hold timer; returns true when a card drag was armed.
    pub fn poll_hold(&mut self, now_ms: u64) -> bool {
        self.gestures.poll_hold(&self.store, now_ms)
    }

    // --- history ---------------------------------------------------------------

    pub fn undo(&mut self) -> Option<FrameTicket> {
        if self.store.undo() {
            self.frames.request(Redraw::COMMITTED)
        } else {
            None
        }
    }

    pub fn redo(&mut self) -> Option<FrameTicket> {
        if self.store.redo() {
            self.frames.request(Redraw::COMMITTED)
        } else {
            None
        }
    }

    pub fn can_undo(&self) -> bool {
        self.store.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.store.can_redo()
    }

    // --- painting --------------------------------------------------------------

    /// Schedule a repaint of `layers`; the host fires the returned ticket on
    /// its next animation frame.
    pub fn request_frame(&mut self, layers: Redraw) -> Option<FrameTicket> {
        self.frames.request(layers)
    }

    /// Ticket waiting to be painted, if any.
    pub fn pending_frame(&self) -> Option<FrameTicket> {
        self.frames.pending()
    }

    /// Paint for a fired animation frame. Superseded tickets paint nothing.
    pub fn paint_frame(&mut self, ticket: FrameTicket) -> Option<Redraw> {
        let layers = self.frames.take(ticket)?;
        if layers.committed {
            self.paint_committed();
        }
        if layers.live {
            self.paint_live();
        }
        Some(layers)
    }

    fn paint_committed(&mut self) {
        let Some(layer) = self.committed.as_mut() else {
            return;
        };
        raster::clear(layer);
        let viewport = self.viewport;
        let style = self.style;

        // Oldest card first so newer cards sit on top, matching hit-testing.
        for card in self.store.attempt_cards().iter().rev() {
            let rect = viewport.rect_to_screen(card.bounds);
            raster::fill_rounded_rect(layer, rect, style.card_radius, style.card_fill);
            if card.label.is_some() {
                let tab = label_tab(rect, &style);
                raster::fill_rounded_rect(layer, tab, style.tab_height * 0.25, style.tab_fill);
            }
        }

        for stroke in self.store.strokes() {
            raster::draw_stroke(layer, stroke.points(), &stroke.style, &viewport);
        }

        if let Some(bounds) = self.store.selection_bounds() {
            let rect = viewport.rect_to_screen(bounds);
            raster::stroke_rect(layer, rect, style.outline_width, style.selection_color);
        }
    }

    fn paint_live(&mut self) {
        let Some(layer) = self.live.as_mut() else {
            return;
        };
        raster::clear(layer);
        if let Some((points, brush)) = self.gestures.live_stroke() {
            raster::draw_stroke(layer, points, brush, &self.viewport);
        }
        if let Some(polygon) = self.gestures.lasso_polygon() {
            let screen: Vec<Point> = polygon.iter().map(|p| self.viewport.to_screen(*p)).collect();
            raster::draw_polyline(layer, &screen, self.style.outline_width, self.style.lasso_color, true);
        }
    }

    /// Labels of the visible cards, for the host to draw as text.
    pub fn card_labels(&self) -> Vec<CardLabel> {
        self.store
            .attempt_cards()
            .into_iter()
            .filter_map(|card| {
                let text = card.label?;
                let tab = label_tab(self.viewport.rect_to_screen(card.bounds), &self.style);
                Some(CardLabel {
                    attempt_id: card.attempt_id,
                    text,
                    anchor: Point::new(tab.x0 + self.style.label_inset, tab.center().y),
                    tab,
                })
            })
            .collect()
    }

    // --- persistence and export --------------------------------------------

    /// Send queued writes.
    pub async fn flush(&mut self, repo: &dyn InkRepository) -> Option<FlushOutcomeSummary> {
        self.store.flush(repo, now_ms()).await
    }

    /// Flatten an attempt onto its document region.
    ///
    /// Queued writes are flushed first so freshly drawn ink is included; a
    /// failed flush is logged and the export proceeds with what is stored.
    pub async fn export_attempt_composite(
        &mut self,
        repo: &dyn InkRepository,
        document: Option<&dyn DocumentRenderer>,
        request: ExportRequest,
    ) -> Result<ExportedImage, ExportError> {
        if let Some(summary) = self.flush(repo).await {
            if summary.failed {
                log::warn!("Exporting with unsaved ink ({} op(s) sent before failure)", summary.sent);
            }
        }
        CompositeExporter::new(repo, document, self.config.export)
            .export(&request)
            .await
    }
}

/// Label tab sitting on top of a card's top-left corner.
fn label_tab(card: Rect, style: &OverlayStyle) -> Rect {
    let width = style.tab_width.min(card.width());
    Rect::new(card.x0, card.y0 - style.tab_height, card.x0 + width, card.y0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ImageDocument;
    use image::{Rgba, RgbaImage};
    use kurbo::Vec2;
    use marginalia_core::{MemoryRepository, PointerKind, Selection, Tool};

    fn new_id() -> AttemptId {
        AttemptId::new_v4()
    }

    fn mounted(repo: &MemoryRepository) -> (InkOverlay, MountProps) {
        let mut overlay = InkOverlay::new(InkConfig::default(), 200, 200);
        let props = MountProps {
            session_id: new_id(),
            document_id: new_id(),
            active_attempt_id: Some(new_id()),
        };
        let ticket = overlay.mount(props).unwrap();
        let hydration = pollster::block_on(ticket.load(repo));
        overlay.apply_hydration(hydration).unwrap();
        (overlay, props)
    }

    fn mouse(x: f64, y: f64, t: u64) -> PointerInput {
        PointerInput::new(1, PointerKind::Mouse, Point::new(x, y), t)
    }

    fn alpha(layer: Option<&Pixmap>, x: u32, y: u32) -> u8 {
        layer.unwrap().pixel(x, y).unwrap().alpha()
    }

    fn paint(overlay: &mut InkOverlay) {
        if let Some(ticket) = overlay.pending_frame() {
            overlay.paint_frame(ticket);
        }
    }

    #[test]
    fn test_draw_paints_live_then_committed() {
        let repo = MemoryRepository::new();
        let (mut overlay, _) = mounted(&repo);
        paint(&mut overlay);

        overlay.pointer_down(mouse(20.0, 50.0, 0));
        overlay.pointer_move(mouse(60.0, 50.0, 16));
        paint(&mut overlay);
        assert_eq!(alpha(overlay.live_layer(), 40, 50), 255);
        assert_eq!(alpha(overlay.committed_layer(), 40, 50), 0);

        overlay.pointer_up(mouse(60.0, 50.0, 32));
        paint(&mut overlay);
        assert_eq!(alpha(overlay.live_layer(), 40, 50), 0);
        assert_eq!(alpha(overlay.committed_layer(), 40, 50), 255);
        assert!(overlay.can_undo());
    }

    #[test]
    fn test_move_burst_paints_once() {
        let repo = MemoryRepository::new();
        let (mut overlay, _) = mounted(&repo);
        paint(&mut overlay);

        let mut tickets = Vec::new();
        tickets.extend(overlay.pointer_down(mouse(10.0, 10.0, 0)));
        for i in 1..20 {
            tickets.extend(overlay.pointer_move(mouse(10.0 + i as f64 * 5.0, 10.0, i * 4)));
        }
        let painted = tickets.into_iter().filter_map(|t| overlay.paint_frame(t)).count();
        assert_eq!(painted, 1);
    }

    #[test]
    fn test_viewport_change_moves_ink() {
        let repo = MemoryRepository::new();
        let (mut overlay, _) = mounted(&repo);
        overlay.pointer_down(mouse(20.0, 20.0, 0));
        overlay.pointer_move(mouse(40.0, 20.0, 16));
        overlay.pointer_up(mouse(40.0, 20.0, 32));
        paint(&mut overlay);
        assert_eq!(alpha(overlay.committed_layer(), 30, 20), 255);

        overlay.set_viewport(Viewport::new(Vec2::new(0.0, 100.0), 1.0)).unwrap();
        paint(&mut overlay);
        assert_eq!(alpha(overlay.committed_layer(), 30, 20), 0);
        assert_eq!(alpha(overlay.committed_layer(), 30, 120), 255);
    }

    #[test]
    fn test_invalid_viewport_ignored() {
        let repo = MemoryRepository::new();
        let (mut overlay, _) = mounted(&repo);
        assert!(overlay.set_viewport(Viewport::new(Vec2::ZERO, 0.0)).is_none());
        assert_eq!(overlay.viewport(), &Viewport::default());
    }

    #[test]
    fn test_card_labels_follow_viewport() {
        let repo = MemoryRepository::new();
        let (mut overlay, props) = mounted(&repo);
        let other = new_id();
        overlay.store_mut().set_active_attempt(Some(other));
        overlay.pointer_down(mouse(50.0, 80.0, 0));
        overlay.pointer_move(mouse(90.0, 90.0, 16));
        overlay.pointer_up(mouse(90.0, 90.0, 32));
        overlay.set_active_attempt(props.active_attempt_id);
        overlay.set_attempt_label(other, "Task 3b");

        let labels = overlay.card_labels();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].text, "Task 3b");
        let padding = overlay.store().config().card_padding;
        assert_eq!(labels[0].tab.y1, 80.0 - padding);

        overlay.set_viewport(Viewport::new(Vec2::new(10.0, 0.0), 1.0));
        assert_eq!(overlay.card_labels()[0].tab.x0, 50.0 - padding + 10.0);
    }

    #[test]
    fn test_unlabeled_cards_have_no_label() {
        let repo = MemoryRepository::new();
        let (mut overlay, props) = mounted(&repo);
        overlay.store_mut().set_active_attempt(Some(new_id()));
        overlay.pointer_down(mouse(50.0, 80.0, 0));
        overlay.pointer_move(mouse(90.0, 90.0, 16));
        overlay.pointer_up(mouse(90.0, 90.0, 32));
        overlay.set_active_attempt(props.active_attempt_id);

        assert_eq!(overlay.store().attempt_cards().len(), 1);
        assert!(overlay.card_labels().is_empty());
    }

    #[test]
    fn test_selection_box_painted() {
        let repo = MemoryRepository::new();
        let (mut overlay, _) = mounted(&repo);
        overlay.pointer_down(mouse(50.0, 50.0, 0));
        overlay.pointer_move(mouse(100.0, 50.0, 16));
        overlay.pointer_up(mouse(100.0, 50.0, 32));

        overlay.store_mut().set_tool(Tool::Select);
        overlay.pointer_down(mouse(52.0, 51.0, 100));
        overlay.pointer_up(mouse(52.0, 51.0, 120));
        assert!(matches!(overlay.store().selection(), Selection::Strokes(ids) if ids.len() == 1));

        paint(&mut overlay);
        let padding = overlay.store().config().selection_padding;
        let edge_x = (50.0 - padding) as u32;
        let px = overlay.committed_layer().unwrap().pixel(edge_x, 50).unwrap().demultiply();
        assert!(px.alpha() > 0);
        let rgb = [px.red(), px.green(), px.blue()];
        for (got, want) in rgb.into_iter().zip([59u8, 130, 246]) {
            assert!(got.abs_diff(want) <= 2, "{rgb:?}");
        }
    }

    #[test]
    fn test_undo_redo_schedule_frames() {
        let repo = MemoryRepository::new();
        let (mut overlay, _) = mounted(&repo);
        assert!(overlay.undo().is_none());

        overlay.pointer_down(mouse(20.0, 20.0, 0));
        overlay.pointer_move(mouse(40.0, 20.0, 16));
        overlay.pointer_up(mouse(40.0, 20.0, 32));
        paint(&mut overlay);

        assert!(overlay.undo().is_some());
        assert!(overlay.can_redo());
        paint(&mut overlay);
        assert_eq!(alpha(overlay.committed_layer(), 30, 20), 0);
        assert!(overlay.redo().is_some());
    }

    #[test]
    fn test_remount_same_context_keeps_ink() {
        let repo = MemoryRepository::new();
        let (mut overlay, props) = mounted(&repo);
        overlay.pointer_down(mouse(20.0, 20.0, 0));
        overlay.pointer_move(mouse(40.0, 20.0, 16));
        overlay.pointer_up(mouse(40.0, 20.0, 32));

        let next = MountProps {
            active_attempt_id: None,
            ..props
        };
        assert!(overlay.mount(next).is_none());
        assert_eq!(overlay.store().strokes().len(), 1);
        assert!(overlay.store().selection().is_empty());

        overlay.unmount();
        assert!(overlay.store().strokes().is_empty());
    }

    #[test]
    fn test_mount_during_erase_drops_old_strokes() {
        let repo = MemoryRepository::new();
        let (mut overlay, props) = mounted(&repo);
        overlay.pointer_down(mouse(20.0, 20.0, 0));
        overlay.pointer_move(mouse(40.0, 20.0, 16));
        overlay.pointer_up(mouse(40.0, 20.0, 32));

        overlay.store_mut().set_tool(Tool::Eraser);
        overlay.pointer_down(mouse(30.0, 20.0, 100));
        assert_eq!(overlay.gesture_mode(), GestureMode::Erase);
        assert!(overlay.store().strokes().is_empty());

        let next = MountProps {
            session_id: new_id(),
            ..props
        };
        let ticket = overlay.mount(next).unwrap();
        assert_eq!(overlay.gesture_mode(), GestureMode::Idle);
        assert!(overlay.store().strokes().is_empty());

        let hydration = pollster::block_on(ticket.load(&repo));
        overlay.apply_hydration(hydration).unwrap();
        assert!(overlay.store().strokes().is_empty());
        assert!(!overlay.can_undo());
    }

    #[test]
    fn test_export_includes_unflushed_ink() {
        let repo = MemoryRepository::new();
        let (mut overlay, props) = mounted(&repo);
        overlay.pointer_down(mouse(20.0, 40.0, 0));
        overlay.pointer_move(mouse(60.0, 50.0, 16));
        overlay.pointer_up(mouse(60.0, 50.0, 32));
        assert!(overlay.store().has_unsaved());

        let doc = ImageDocument::from_pages(vec![RgbaImage::from_pixel(600, 800, Rgba([255, 255, 255, 255]))]);
        let request = ExportRequest {
            attempt_id: props.active_attempt_id.unwrap(),
            max_source_bytes: u64::MAX,
            max_output_pixels: u64::MAX,
        };
        let image = pollster::block_on(overlay.export_attempt_composite(&repo, Some(&doc), request)).unwrap();
        assert!(!overlay.store().has_unsaved());
        assert_eq!(image.page_number, 1);
        assert!(image.width > 0 && image.height > 0);
    }

    #[test]
    fn test_resize_reallocates_layers() {
        let repo = MemoryRepository::new();
        let (mut overlay, _) = mounted(&repo);
        assert!(overlay.resize(200, 200).is_none());
        assert!(overlay.resize(320, 240).is_some());
        assert_eq!(overlay.size(), (320, 240));
        let layer = overlay.committed_layer().unwrap();
        assert_eq!((layer.width(), layer.height()), (320, 240));
        let layer = overlay.live_layer().unwrap();
        assert_eq!((layer.width(), layer.height()), (320, 240));
    }

    #[test]
    fn test_zero_area_canvas_has_no_layers() {
        let repo = MemoryRepository::new();
        let (mut overlay, _) = mounted(&repo);
        overlay.resize(0, 240).unwrap();
        assert!(overlay.committed_layer().is_none());
        overlay.pointer_down(mouse(20.0, 20.0, 0));
        overlay.pointer_move(mouse(40.0, 20.0, 16));
        paint(&mut overlay);
        assert!(overlay.live_layer().is_none());
        overlay.pointer_up(mouse(40.0, 20.0, 32));
        assert_eq!(overlay.store().strokes().len(), 1);
    }
}
