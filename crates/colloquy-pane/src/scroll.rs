//! Scroll-position bookkeeping across history mutations.

use crate::viewport::ViewportSurface;

/// Viewport geometry captured immediately before a mutation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollSnapshot {
    /// Distance, in content-height units, from content top to viewport top
    pub offset: usize,
    /// Total laid-out content height
    pub content_height: usize,
    /// Visible window height
    pub viewport_height: usize,
}

impl ScrollSnapshot {
    /// Offset at which the viewport's bottom edge meets the content's bottom edge
    pub fn bottom_offset(&self) -> usize {
        self.content_height.saturating_sub(self.viewport_height)
    }

    /// Whether the viewport sits at the bottom, within `tolerance` units
    pub fn is_at_bottom(&self, tolerance: usize) -> bool {
        self.offset.saturating_add(tolerance) >= self.bottom_offset()
    }
}

/// What the viewport should do once a mutation's new layout lands. Exactly
/// one per mutation, consumed by [`ScrollAnchor`] and implicitly reset until
/// the next mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollBehavior {
    #[default]
    None,
    ScrollToBottom,
    KeepPosition,
}

/// Target offset for a mutation, or `None` when no write is needed.
///
/// `before` is the pre-mutation snapshot, `after` the fresh geometry once the
/// new content has been laid out. Pure so the decision table is testable
/// without a rendering surface.
pub fn resolve_offset(
    before: ScrollSnapshot,
    behavior: ScrollBehavior,
    after: ScrollSnapshot,
) -> Option<usize> {
    match behavior {
        ScrollBehavior::None => None,
        ScrollBehavior::ScrollToBottom => {
            let target = after.bottom_offset();
            (after.offset != target).then_some(target)
        }
        ScrollBehavior::KeepPosition => {
            let grown = after.content_height.saturating_sub(before.content_height);
            let target = before.offset.saturating_add(grown);
            (after.offset != target).then_some(target)
        }
    }
}

/// Behavior for a push-arrival append: stick to the bottom when the viewport
/// was already there or the message is the user's own; otherwise leave the
/// viewport alone so new content below the fold does not yank it.
pub fn append_behavior(
    at_arrival: ScrollSnapshot,
    is_outgoing: bool,
    tolerance: usize,
) -> ScrollBehavior {
    if at_arrival.is_at_bottom(tolerance) || is_outgoing {
        ScrollBehavior::ScrollToBottom
    } else {
        ScrollBehavior::None
    }
}

/// Applies resolved offsets to the surface and remembers that the next
/// scroll event is self-inflicted.
#[derive(Debug, Default)]
pub struct ScrollAnchor {
    suppress_next: bool,
}

impl ScrollAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and write the post-mutation offset. Arms one-shot suppression
    /// only when a write actually happened, so a skipped write cannot eat a
    /// real user scroll later.
    pub fn apply(
        &mut self,
        surface: &mut dyn ViewportSurface,
        before: ScrollSnapshot,
        behavior: ScrollBehavior,
    ) -> Option<usize> {
        let after = surface.snapshot();
        let target = resolve_offset(before, behavior, after)?;
        surface.scroll_to(target);
        self.suppress_next = true;
        Some(target)
    }

    /// True exactly once after a self-triggered adjustment.
    pub fn take_suppressed(&mut self) -> bool {
        std::mem::take(&mut self.suppress_next)
    }
}
