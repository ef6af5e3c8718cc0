//! The rendering-surface seam and debounced visibility recomputation.

use std::time::Duration;
use tokio::time::Instant;

use crate::history::History;
use crate::scroll::ScrollSnapshot;

/// The one interface a rendering shell implements for the pane.
///
/// The shell owns geometry (item heights, pixel or row units); the pane owns
/// policy. Offsets and heights share whatever unit the shell measures in.
/// `Send + Sync` because the pane task holds the surface across await points.
pub trait ViewportSurface: Send + Sync {
    /// Current scroll geometry.
    fn snapshot(&self) -> ScrollSnapshot;

    /// Re-lay-out after a history mutation. Runs before the paired scroll
    /// adjustment resolves, so the snapshot taken afterwards reflects the
    /// new content height.
    fn commit(&mut self, history: &History);

    /// Write the scroll offset. Implementations clamp to the valid range.
    fn scroll_to(&mut self, offset: usize);

    /// Inclusive range of message positions intersecting the visible region,
    /// in display order. `None` when nothing is laid out.
    fn visible_range(&self) -> Option<(usize, usize)>;
}

/// Debounce bookkeeping for viewport recomputation.
///
/// Scroll and resize events arrive in bursts; each `poke` pushes the deadline
/// out, and the pane loop recomputes visibility once events settle. Correctness
/// only needs eventual convergence, not per-event recomputation.
#[derive(Debug)]
pub struct ViewportTracker {
    window: Duration,
    deadline: Option<Instant>,
}

impl ViewportTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Register a scroll or resize event.
    pub fn poke(&mut self) {
        self.deadline = Some(Instant::now() + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the deadline once it fires.
    pub fn clear(&mut self) {
        self.deadline = None;
    }
}

/// Sleep until `deadline`, or forever when there is none. Lets the pane loop
/// select on the debounce without special-casing the idle state.
pub(crate) async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
