//! Visible-range computation for long task lists.
//!
//! Given the item count, viewport height, fixed item height and scroll
//! offset, pick the slice of items to render plus the offset that keeps the
//! slice at its scrolled position. Short lists skip windowing entirely.

use std::ops::Range;

/// Lists shorter than this render in full.
pub const WINDOW_THRESHOLD: usize = 50;

/// Extra rows kept around the visible range to hide fast-scroll gaps.
pub const BUFFER_ROWS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
    /// Translation applied to the rendered slice, `start * item height`.
    pub offset_px: f64,
    /// False when the list was rendered in full.
    pub windowed: bool,
}

impl Window {
    fn full(total: usize) -> Self {
        Self {
            start: 0,
            end: total,
            offset_px: 0.0,
            windowed: false,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Index of the last rendered item.
    pub fn last_index(&self) -> Option<usize> {
        self.end.checked_sub(1).filter(|_| !self.is_empty())
    }

    /// The rendered items. Indices past `items` are clipped.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let end = self.end.min(items.len());
        let start = self.start.min(end);
        &items[start..end]
    }

    /// Height of the full list, for sizing the scroll container.
    pub fn total_height(total: usize, item_px: f64) -> f64 {
        total as f64 * item_px.max(0.0)
    }
}

pub fn compute_window(total: usize, viewport_px: f64, item_px: f64, scroll_px: f64) -> Window {
    if total < WINDOW_THRESHOLD || item_px.is_nan() || item_px <= 0.0 {
        return Window::full(total);
    }

    let first_visible = (scroll_px.max(0.0) / item_px).floor() as usize;
    let visible_rows = (viewport_px.max(0.0) / item_px).ceil() as usize;

    let start = first_visible.saturating_sub(BUFFER_ROWS).min(total - 1);
    let last = start
        .saturating_add(visible_rows)
        .saturating_add(BUFFER_ROWS)
        .min(total - 1);

    Window {
        start,
        end: last + 1,
        offset_px: start as f64 * item_px,
        windowed: true,
    }
}
