//! Redraw throttling.
//!
//! The host owns the animation-frame clock. Every redraw request cancels the
//! pending one and replaces it with a fresh ticket carrying the merged dirty
//! layers; only the newest ticket is honoured when a frame fires, so a burst of
//! pointer moves costs at most one paint per frame.

use marginalia_core::Redraw;

/// Handle for one scheduled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameTicket(u64);

impl FrameTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct FrameScheduler {
    next_id: u64,
    pending: Option<(FrameTicket, Redraw)>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a redraw of `layers`, superseding any pending ticket.
    ///
    /// Returns `None` when there is nothing to redraw.
    pub fn request(&mut self, layers: Redraw) -> Option<FrameTicket> {
        if layers.is_empty() {
            return None;
        }
        let merged = match self.pending {
            Some((_, pending)) => pending | layers,
            None => layers,
        };
        self.next_id += 1;
        let ticket = FrameTicket(self.next_id);
        self.pending = Some((ticket, merged));
        Some(ticket)
    }

    /// Claim the layers to paint for a fired frame. Superseded tickets get `None`.
    pub fn take(&mut self, ticket: FrameTicket) -> Option<Redraw> {
        match self.pending {
            Some((current, layers)) if current == ticket => {
                self.pending = None;
                Some(layers)
            }
            _ => None,
        }
    }

    /// The ticket that will paint next, if any.
    pub fn pending(&self) -> Option<FrameTicket> {
        self.pending.map(|(ticket, _)| ticket)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
