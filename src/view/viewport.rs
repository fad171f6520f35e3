use std::time::{Duration, Instant};

use crate::document::RowId;

use super::ViewState;

pub const DEFAULT_LINE_HEIGHT: f32 = 18.0;
pub const SCROLL_ANIMATION_DURATION: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnimation {
    from: f32,
    to: f32,
    started_at: Instant,
    duration: Duration,
}

impl ScrollAnimation {
    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn offset_at(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started_at);
        if self.duration.is_zero() || elapsed >= self.duration {
            return self.to;
        }
        let progress = elapsed.as_secs_f32() / self.duration.as_secs_f32();
        // Same "swing" easing jQuery applies to animated scrolls.
        let eased = 0.5 - (progress * std::f32::consts::PI).cos() / 2.0;
        self.from + (self.to - self.from) * eased
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.duration
    }
}

/// Vertical scroll model over the display lines of a [`ViewState`].
///
/// Every display line (row or placeholder) is `line_height` tall, so a row's
/// top edge is its display index times the line height.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    line_height: f32,
    scroll_top: f32,
    animation: Option<ScrollAnimation>,
    /// Set by a command jump until the scroll surface has applied it once.
    pending_jump: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_HEIGHT)
    }
}

impl Viewport {
    pub fn new(line_height: f32) -> Self {
        Self {
            line_height: line_height.max(1.0),
            scroll_top: 0.0,
            animation: None,
            pending_jump: false,
        }
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    /// Follows a scroll the user made directly; drops any running animation.
    pub fn set_scroll_top(&mut self, scroll_top: f32) {
        self.scroll_top = scroll_top.max(0.0);
        self.animation = None;
    }

    pub fn animation(&self) -> Option<&ScrollAnimation> {
        self.animation.as_ref()
    }

    /// Stops any running animation at the offset it has reached by `now`.
    pub fn settle(&mut self, now: Instant) {
        self.current_offset(now);
        self.animation = None;
    }

    /// Moves to `scroll_top` at once; the scroll surface must apply it next frame.
    pub fn jump_to(&mut self, scroll_top: f32) {
        self.set_scroll_top(scroll_top);
        self.pending_jump = true;
    }

    /// Offset a user scroll reported by the surface. Ignored while an
    /// animation or an unapplied jump owns the position.
    pub fn follow_user_scroll(&mut self, scroll_top: f32) {
        if self.animation.is_none() && !self.pending_jump {
            self.set_scroll_top(scroll_top);
        }
    }

    /// Offset the scroll surface must be forced to this frame, if any.
    pub fn frame_offset(&mut self, now: Instant) -> Option<f32> {
        if self.animation.is_some() {
            self.pending_jump = false;
            return Some(self.current_offset(now));
        }
        if std::mem::take(&mut self.pending_jump) {
            return Some(self.scroll_top);
        }
        None
    }

    pub fn row_top(&self, view: &ViewState, row: RowId) -> Option<f32> {
        view.display_index_of(row)
            .map(|index| index as f32 * self.line_height)
    }

    /// Distance from the top of the viewport to the row's top edge.
    pub fn screen_offset(&self, view: &ViewState, row: RowId) -> Option<f32> {
        self.row_top(view, row).map(|top| top - self.scroll_top)
    }

    /// Runs `mutate`, then scrolls so `anchor` sits at the same screen offset it had before.
    pub fn scroll_preserving_offset<R>(
        &mut self,
        view: &mut ViewState,
        anchor: RowId,
        mutate: impl FnOnce(&mut ViewState) -> R,
    ) -> R {
        let before = self.screen_offset(view, anchor);
        let result = mutate(view);
        if let (Some(offset), Some(top)) = (before, self.row_top(view, anchor)) {
            self.jump_to(top - offset);
        }
        result
    }

    /// Starts a smooth scroll to `scroll_top`, superseding any running animation.
    pub fn animate_to(&mut self, scroll_top: f32, now: Instant) {
        let from = self.current_offset(now);
        self.animation = Some(ScrollAnimation {
            from,
            to: scroll_top.max(0.0),
            started_at: now,
            duration: SCROLL_ANIMATION_DURATION,
        });
    }

    /// Advances the animation, settling `scroll_top` once it finishes.
    pub fn current_offset(&mut self, now: Instant) -> f32 {
        let Some(animation) = self.animation else {
            return self.scroll_top;
        };
        let offset = animation.offset_at(now);
        if animation.is_finished(now) {
            self.animation = None;
        }
        self.scroll_top = offset;
        offset
    }
}
