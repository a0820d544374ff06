//! Mark interaction router: which thread is open and which one is hovered.
//!
//! One [`MarkRouter`] is shared by every editor surface of a workspace (the main body and any
//! embedded sub-document), so a thread's visual state is the same wherever its mark renders.
//! It is an explicitly constructed value, not global state.
//!
//! The router never touches the rendering layer directly: scrolling, anchor lookup and action
//! dispatch go through a [`RouterHost`].

use crate::layout::Rect;
use crate::marks::ThreadId;
use crate::threads::Action;
use serde::{Deserialize, Serialize};

/// Visual state of a thread's mark runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkState {
    /// Plain highlight.
    #[default]
    None,
    /// Hovered.
    Highlighted,
    /// Open.
    Selected,
}

/// A state change of one thread's marks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkTransition {
    /// Thread (mark) id.
    pub id: ThreadId,
    /// Previous state.
    pub from: MarkState,
    /// New state.
    pub to: MarkState,
}

/// Callback invoked for every [`MarkTransition`].
pub type TransitionCallback = Box<dyn FnMut(&MarkTransition) + Send>;

/// Scroll container state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    /// Current scroll offset.
    pub scroll_top: f64,
    /// Visible height.
    pub height: f64,
}

/// Pointer interaction on a mark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    /// Pointer entered the run.
    Enter,
    /// Pointer left the run.
    Leave,
    /// The run was clicked.
    Click,
}

/// Pointer event routed to the thread it targets (the run's primary visible id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerEvent {
    /// What happened.
    pub kind: PointerKind,
    /// Targeted thread (mark) id.
    pub id: ThreadId,
}

impl PointerEvent {
    /// Create an event.
    pub fn new(kind: PointerKind, id: impl Into<ThreadId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Capabilities the router needs from its embedding.
pub trait RouterHost {
    /// Bounds of the first rendered run carrying `id`, relative to the viewport.
    fn anchor_bounds(&self, id: &ThreadId) -> Option<Rect>;

    /// The scroll container, if one is attached.
    fn viewport(&self) -> Option<Viewport>;

    /// Scroll the container to `scroll_top`.
    fn scroll_to(&mut self, scroll_top: f64);

    /// Forward an action to application state.
    fn dispatch(&mut self, action: Action);
}

/// Process-wide selection and hover authority.
pub struct MarkRouter {
    selected: Option<ThreadId>,
    highlighted: Option<ThreadId>,
    scroll_ratio: f64,
    listeners: Vec<TransitionCallback>,
}

impl std::fmt::Debug for MarkRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkRouter")
            .field("selected", &self.selected)
            .field("highlighted", &self.highlighted)
            .field("scroll_ratio", &self.scroll_ratio)
            .finish_non_exhaustive()
    }
}

impl Default for MarkRouter {
    fn default() -> Self {
        Self::new(crate::config::SCROLL_ANCHOR_RATIO)
    }
}

impl MarkRouter {
    /// Create a router scrolling selected anchors to `scroll_ratio` of the viewport.
    pub fn new(scroll_ratio: f64) -> Self {
        Self {
            selected: None,
            highlighted: None,
            scroll_ratio,
            listeners: Vec::new(),
        }
    }

    /// Subscribe to mark state transitions.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&MarkTransition) + Send + 'static,
    {
        self.listeners.push(Box::new(callback));
    }

    /// The open thread.
    pub fn selected(&self) -> Option<&ThreadId> {
        self.selected.as_ref()
    }

    /// The hovered (not selected) thread.
    pub fn highlighted(&self) -> Option<&ThreadId> {
        self.highlighted.as_ref()
    }

    /// State of `id`'s marks. Selection takes priority over hover.
    pub fn state_of(&self, id: &ThreadId) -> MarkState {
        if self.selected.as_ref() == Some(id) {
            MarkState::Selected
        } else if self.highlighted.as_ref() == Some(id) {
            MarkState::Highlighted
        } else {
            MarkState::None
        }
    }

    /// Rendered state of a run carrying `ids`: the strongest state among them.
    pub fn run_state(&self, ids: &[ThreadId]) -> MarkState {
        ids.iter()
            .map(|id| self.state_of(id))
            .max()
            .unwrap_or_default()
    }

    /// Open `id`, closing any other thread first.
    ///
    /// `origin` is the anchor rect the interaction started from; when absent it is looked up
    /// through the host. Without any rendered anchor the selection is still recorded but no
    /// scrolling happens.
    pub fn select(&mut self, id: &ThreadId, origin: Option<Rect>, host: &mut dyn RouterHost) {
        if self.selected.as_ref() == Some(id) {
            return;
        }
        self.clear(host);

        let from = self.state_of(id);
        if self.highlighted.as_ref() == Some(id) {
            self.highlighted = None;
        }
        self.selected = Some(id.clone());
        self.emit(id, from, MarkState::Selected);

        match (origin.or_else(|| host.anchor_bounds(id)), host.viewport()) {
            (Some(rect), Some(viewport)) => {
                let target = (viewport.scroll_top + rect.top - self.scroll_ratio * viewport.height).max(0.0);
                host.scroll_to(target);
            }
            (None, _) => tracing::debug!(thread = %id, "selected thread has no rendered anchor"),
            (Some(_), None) => {}
        }

        host.dispatch(Action::SelectCommentThread {
            mark_id: id.clone(),
        });
    }

    /// Close `id` if it is the open thread.
    pub fn deselect(&mut self, id: &ThreadId, host: &mut dyn RouterHost) {
        if self.selected.as_ref() != Some(id) {
            return;
        }
        self.selected = None;
        self.emit(id, MarkState::Selected, MarkState::None);
        host.dispatch(Action::DeselectCommentThread);
    }

    /// Close the open thread, if any.
    pub fn clear(&mut self, host: &mut dyn RouterHost) {
        if let Some(id) = self.selected.clone() {
            self.deselect(&id, host);
        }
    }

    /// Mark `id` as hovered. No-op while `id` is selected.
    pub fn highlight(&mut self, id: &ThreadId) {
        if self.selected.as_ref() == Some(id) || self.highlighted.as_ref() == Some(id) {
            return;
        }
        if let Some(previous) = self.highlighted.take() {
            self.emit(&previous, MarkState::Highlighted, MarkState::None);
        }
        self.highlighted = Some(id.clone());
        self.emit(id, MarkState::None, MarkState::Highlighted);
    }

    /// Drop the hover state of `id`. No-op while `id` is selected.
    pub fn unhighlight(&mut self, id: &ThreadId) {
        if self.highlighted.as_ref() != Some(id) {
            return;
        }
        self.highlighted = None;
        self.emit(id, MarkState::Highlighted, MarkState::None);
    }

    /// Route a pointer interaction.
    pub fn pointer(&mut self, event: &PointerEvent, host: &mut dyn RouterHost) {
        match event.kind {
            PointerKind::Enter => {
                if self.state_of(&event.id) != MarkState::None {
                    return;
                }
                self.highlight(&event.id);
                host.dispatch(Action::HighlightCommentThread {
                    mark_id: event.id.clone(),
                });
            }
            PointerKind::Leave => {
                if self.state_of(&event.id) != MarkState::Highlighted {
                    return;
                }
                self.unhighlight(&event.id);
                host.dispatch(Action::UnhighlightCommentThread);
            }
            PointerKind::Click => self.select(&event.id, None, host),
        }
    }

    /// Forget `id` entirely (its thread is gone) without dispatching.
    pub fn forget(&mut self, id: &ThreadId) {
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
            self.emit(id, MarkState::Selected, MarkState::None);
        }
        if self.highlighted.as_ref() == Some(id) {
            self.highlighted = None;
            self.emit(id, MarkState::Highlighted, MarkState::None);
        }
    }

    fn emit(&mut self, id: &ThreadId, from: MarkState, to: MarkState) {
        let transition = MarkTransition {
            id: id.clone(),
            from,
            to,
        };
        tracing::debug!(thread = %id, ?from, ?to, "mark state");
        for listener in &mut self.listeners {
            listener(&transition);
        }
    }
}
