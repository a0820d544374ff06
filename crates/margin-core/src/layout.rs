//! Thread layout: positions thread cards in the comment rail next to their anchors.
//!
//! The pass is a pure function of the thread set, the selection, the large embeds and the
//! geometry reported by a [`GeometryProvider`]. It is re-run from scratch whenever any of those
//! change (see [`crate::reflow`]); intermediate layouts are never patched.
//!
//! # Algorithm
//!
//! 1. Resolve each thread's anchor rect. Threads without one are dropped.
//! 2. Sort by anchor top, then anchor left.
//! 3. Walk down: a card that would overlap the previous card is pushed below it plus the gap.
//!    The selected card is pinned at its anchor.
//! 4. Walk up from the selected card: predecessors that collide with it are lifted by an
//!    accumulated offset, never below their own position.
//! 5. Non-selected cards whose top or bottom lies within a large embed are collapsed.

use crate::config::MarginConfig;
use crate::document::EmbedKey;
use crate::marks::ThreadId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Axis-aligned rectangle, in pixels, relative to the scroll container's viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Top edge.
    pub top: f64,
    /// Left edge.
    pub left: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Create a rect.
    pub const fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Smallest rect covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let top = self.top.min(other.top);
        let left = self.left.min(other.left);
        let bottom = self.bottom().max(other.bottom());
        let right = (self.left + self.width).max(other.left + other.width);
        Rect::new(top, left, right - left, bottom - top)
    }
}

/// Geometry queries the layout pass needs from the rendering layer.
pub trait GeometryProvider {
    /// Current bounds of the anchor carrying `mark_id`; `None` when it is not rendered.
    fn bounds_of(&self, mark_id: &ThreadId) -> Option<Rect>;

    /// Measured height of the thread card for `mark_id`, if it has been rendered.
    fn card_height(&self, mark_id: &ThreadId) -> Option<f64> {
        let _ = mark_id;
        None
    }

    /// Current bounds of an embedded object.
    fn embed_bounds(&self, key: EmbedKey) -> Option<Rect> {
        let _ = key;
        None
    }
}

/// In-memory [`GeometryProvider`] for headless hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct FixedGeometry {
    anchors: HashMap<ThreadId, Rect>,
    cards: HashMap<ThreadId, f64>,
    embeds: HashMap<EmbedKey, Rect>,
}

impl FixedGeometry {
    /// Create an empty geometry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the anchor rect of `mark_id`.
    pub fn set_anchor(&mut self, mark_id: impl Into<ThreadId>, rect: Rect) -> &mut Self {
        self.anchors.insert(mark_id.into(), rect);
        self
    }

    /// Forget the anchor of `mark_id`.
    pub fn remove_anchor(&mut self, mark_id: &ThreadId) -> &mut Self {
        self.anchors.remove(mark_id);
        self
    }

    /// Set the measured card height of `mark_id`.
    pub fn set_card_height(&mut self, mark_id: impl Into<ThreadId>, height: f64) -> &mut Self {
        self.cards.insert(mark_id.into(), height);
        self
    }

    /// Set the bounds of an embed.
    pub fn set_embed(&mut self, key: EmbedKey, rect: Rect) -> &mut Self {
        self.embeds.insert(key, rect);
        self
    }
}

impl GeometryProvider for FixedGeometry {
    fn bounds_of(&self, mark_id: &ThreadId) -> Option<Rect> {
        self.anchors.get(mark_id).copied()
    }

    fn card_height(&self, mark_id: &ThreadId) -> Option<f64> {
        self.cards.get(mark_id).copied()
    }

    fn embed_bounds(&self, key: EmbedKey) -> Option<Rect> {
        self.embeds.get(&key).copied()
    }
}

/// A thread to position: its current id and the id of its anchoring mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadAnchor {
    /// Thread id.
    pub id: ThreadId,
    /// Mark id used to find the anchor.
    pub mark_id: ThreadId,
}

impl ThreadAnchor {
    /// Create an anchor reference.
    pub fn new(id: impl Into<ThreadId>, mark_id: impl Into<ThreadId>) -> Self {
        Self {
            id: id.into(),
            mark_id: mark_id.into(),
        }
    }
}

/// Scroll-container offsets applied to anchor rects.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollOffsets {
    /// Height of the fixed navigation bar.
    pub navigation: f64,
    /// Current scroll position.
    pub scroll_top: f64,
}

impl ScrollOffsets {
    fn to_container(self, viewport_top: f64) -> f64 {
        viewport_top + self.scroll_top - self.navigation
    }
}

/// Positioned thread card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortedThread {
    /// Thread id.
    pub id: ThreadId,
    /// Mark id.
    pub mark_id: ThreadId,
    /// Card top (px, container coordinates).
    pub top: f64,
    /// Anchor left (px).
    pub left: f64,
    /// Card height used for stacking.
    pub height: f64,
    /// Render avatar-only.
    #[serde(default)]
    pub collapsed: bool,
}

impl SortedThread {
    /// Card bottom.
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Compute card positions. See the module docs for the algorithm.
pub fn layout(
    threads: &[ThreadAnchor],
    selected: Option<&ThreadId>,
    large_embeds: &[EmbedKey],
    offsets: ScrollOffsets,
    geometry: &dyn GeometryProvider,
    config: &MarginConfig,
) -> Vec<SortedThread> {
    let mut sorted: Vec<SortedThread> = threads
        .iter()
        .filter_map(|thread| {
            let Some(rect) = geometry.bounds_of(&thread.mark_id) else {
                tracing::debug!(thread = %thread.id, "anchor not rendered; dropped from layout");
                return None;
            };
            Some(SortedThread {
                id: thread.id.clone(),
                mark_id: thread.mark_id.clone(),
                top: offsets.to_container(rect.top),
                left: rect.left,
                height: geometry
                    .card_height(&thread.mark_id)
                    .unwrap_or(config.default_card_height),
                collapsed: false,
            })
        })
        .collect();

    sorted.sort_by(|a, b| match a.top.total_cmp(&b.top) {
        Ordering::Equal => a.left.total_cmp(&b.left),
        other => other,
    });

    let is_selected = |thread: &SortedThread| selected == Some(&thread.mark_id);

    stack_downward(&mut sorted, &is_selected, config.thread_gap);

    if let Some(pivot) = sorted.iter().position(|t| is_selected(t))
        && pivot > 0
    {
        lift_above(&mut sorted, pivot, config.thread_gap);
    }

    let spans: Vec<(f64, f64)> = large_embeds
        .iter()
        .filter_map(|key| geometry.embed_bounds(*key))
        .map(|rect| {
            let top = offsets.to_container(rect.top);
            (top, top + rect.height)
        })
        .collect();
    if !spans.is_empty() {
        for thread in sorted.iter_mut().filter(|t| selected != Some(&t.mark_id)) {
            let (top, bottom) = (thread.top, thread.bottom());
            thread.collapsed = spans.iter().any(|&(start, end)| {
                (start..=end).contains(&top) || (start..=end).contains(&bottom)
            });
        }
    }

    sorted
}

fn stack_downward(sorted: &mut [SortedThread], is_selected: &dyn Fn(&SortedThread) -> bool, gap: f64) {
    for idx in 1..sorted.len() {
        if is_selected(&sorted[idx]) {
            continue;
        }
        let previous_bottom = sorted[idx - 1].bottom();
        let anchor_top = sorted[idx].top;
        let overlap = previous_bottom - anchor_top;
        if overlap >= 0.0 {
            sorted[idx].top = anchor_top + overlap + gap;
        }
    }
}

fn lift_above(sorted: &mut [SortedThread], pivot: usize, gap: f64) {
    let original: Vec<f64> = sorted[..=pivot].iter().map(|t| t.top).collect();
    let mut accumulated = 0.0;
    for idx in (0..pivot).rev() {
        let next_top = original[idx + 1];
        accumulated += original[idx] + sorted[idx].height - next_top + gap;
        if accumulated <= 0.0 {
            break;
        }
        sorted[idx].top = (original[idx] - accumulated).min(original[idx]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchors(ids: &[&str]) -> Vec<ThreadAnchor> {
        ids.iter().map(|id| ThreadAnchor::new(*id, *id)).collect()
    }

    fn run(geometry: &FixedGeometry, ids: &[&str], selected: Option<&str>) -> Vec<SortedThread> {
        let selected = selected.map(ThreadId::from);
        layout(
            &anchors(ids),
            selected.as_ref(),
            &[],
            ScrollOffsets::default(),
            geometry,
            &MarginConfig::default(),
        )
    }

    #[test]
    fn test_sorts_by_top_then_left() {
        let mut geometry = FixedGeometry::new();
        geometry
            .set_anchor("b", Rect::new(100.0, 50.0, 10.0, 10.0))
            .set_anchor("a", Rect::new(100.0, 10.0, 10.0, 10.0))
            .set_anchor("c", Rect::new(10.0, 90.0, 10.0, 10.0));
        let out = run(&geometry, &["a", "b", "c"], None);
        let order: Vec<&str> = out.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_missing_anchor_is_dropped() {
        let mut geometry = FixedGeometry::new();
        geometry.set_anchor("a", Rect::new(0.0, 0.0, 1.0, 1.0));
        let out = run(&geometry, &["a", "ghost"], None);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_far_apart_cards_stay_at_anchor() {
        let mut geometry = FixedGeometry::new();
        geometry
            .set_anchor("a", Rect::new(0.0, 0.0, 1.0, 1.0))
            .set_anchor("b", Rect::new(500.0, 0.0, 1.0, 1.0));
        let out = run(&geometry, &["a", "b"], None);
        assert_eq!(out[0].top, 0.0);
        assert_eq!(out[1].top, 500.0);
    }

    #[test]
    fn test_offsets_apply_scroll_and_navigation() {
        let mut geometry = FixedGeometry::new();
        geometry.set_anchor("a", Rect::new(40.0, 0.0, 1.0, 1.0));
        let out = layout(
            &anchors(&["a"]),
            None,
            &[],
            ScrollOffsets {
                navigation: 60.0,
                scroll_top: 200.0,
            },
            &geometry,
            &MarginConfig::default(),
        );
        assert_eq!(out[0].top, 180.0);
    }
}
