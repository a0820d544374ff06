//! Ties documents, marks, selection, thread state and layout together.
//!
//! A [`CommentWorkspace`] owns every open document (the main body plus embedded
//! sub-documents, keyed by [`EditorId`]), the single [`MarkRouter`] they share, the
//! [`ThreadStore`], and the geometry used for layout. Hosts drive it with user intents
//! (`create_thread`, `select`, `pointer`, ...) and read back [`SortedThread`] snapshots.
//!
//! Every action that reaches the store is also forwarded to subscribers registered with
//! [`CommentWorkspace::subscribe`].

use crate::config::MarginConfig;
use crate::document::{Document, EmbedKey};
use crate::layout::{GeometryProvider, Rect, ScrollOffsets, SortedThread, ThreadAnchor, layout};
use crate::lifecycle::{DocumentSet, EditorId, MarkManager, NewThread, SelectionKind};
use crate::marks::{ThreadId, formats_of};
use crate::reflow::{ReflowScheduler, ReflowTrigger};
use crate::router::{MarkRouter, MarkState, PointerEvent, RouterHost, Viewport};
use crate::threads::{
    Action, Confirmation, SubmitError, Submission, Thread, ThreadStage, ThreadStore,
};
use std::time::Instant;
use unicode_segmentation::UnicodeSegmentation;

/// Editor id of the main document body.
pub const MAIN_EDITOR: EditorId = EditorId::new(0);

/// Callback invoked for every dispatched action.
pub type ActionCallback = Box<dyn FnMut(&Action) + Send>;

/// The comment anchoring engine for one open document tree.
pub struct CommentWorkspace<G: GeometryProvider> {
    config: MarginConfig,
    documents: DocumentSet,
    marks: MarkManager,
    router: MarkRouter,
    store: ThreadStore,
    geometry: G,
    viewport: Viewport,
    navigation_offset: f64,
    reflow: ReflowScheduler,
    listeners: Vec<ActionCallback>,
}

impl<G: GeometryProvider> std::fmt::Debug for CommentWorkspace<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentWorkspace")
            .field("documents", &self.documents.len())
            .field("marks", &self.marks)
            .field("router", &self.router)
            .field("viewport", &self.viewport)
            .finish_non_exhaustive()
    }
}

struct Host<'a, G: GeometryProvider> {
    geometry: &'a G,
    viewport: &'a mut Viewport,
    store: &'a mut ThreadStore,
    reflow: &'a mut ReflowScheduler,
    listeners: &'a mut Vec<ActionCallback>,
}

impl<G: GeometryProvider> RouterHost for Host<'_, G> {
    fn anchor_bounds(&self, id: &ThreadId) -> Option<Rect> {
        self.geometry.bounds_of(id)
    }

    fn viewport(&self) -> Option<Viewport> {
        (self.viewport.height > 0.0).then_some(*self.viewport)
    }

    fn scroll_to(&mut self, scroll_top: f64) {
        self.viewport.scroll_top = scroll_top;
    }

    fn dispatch(&mut self, action: Action) {
        apply(self.store, self.reflow, self.listeners, action);
    }
}

fn apply(
    store: &mut ThreadStore,
    reflow: &mut ReflowScheduler,
    listeners: &mut [ActionCallback],
    action: Action,
) {
    let before = store.version();
    store.reduce(&action);
    if store.version() != before {
        reflow.request(ReflowTrigger::ThreadsChanged, Instant::now());
    }
    for listener in listeners.iter_mut() {
        listener(&action);
    }
}

impl<G: GeometryProvider> CommentWorkspace<G> {
    /// Create a workspace with an empty main document.
    pub fn new(geometry: G, config: MarginConfig) -> Self {
        let mut documents = DocumentSet::new();
        documents.insert(MAIN_EDITOR, Document::new());
        Self {
            router: MarkRouter::new(config.scroll_ratio),
            reflow: ReflowScheduler::new(config.resize_debounce()),
            config,
            documents,
            marks: MarkManager::new(),
            store: ThreadStore::new(),
            geometry,
            viewport: Viewport::default(),
            navigation_offset: 0.0,
            listeners: Vec::new(),
        }
    }

    /// Subscribe to every dispatched action.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&Action) + Send + 'static,
    {
        self.listeners.push(Box::new(callback));
    }

    /// Layout and scrolling parameters.
    pub fn config(&self) -> &MarginConfig {
        &self.config
    }

    /// Thread state.
    pub fn store(&self) -> &ThreadStore {
        &self.store
    }

    /// The shared selection router.
    pub fn router(&self) -> &MarkRouter {
        &self.router
    }

    /// Mutable router access (to subscribe to mark transitions).
    pub fn router_mut(&mut self) -> &mut MarkRouter {
        &mut self.router
    }

    /// Mark bookkeeping, including the anchor index.
    pub fn marks(&self) -> &MarkManager {
        &self.marks
    }

    /// The geometry provider.
    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    /// Mutable geometry access; request a reflow after changing it.
    pub fn geometry_mut(&mut self) -> &mut G {
        &mut self.geometry
    }

    /// The scroll container state.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Update the scroll container state.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Height of the fixed navigation bar above the scroll container.
    pub fn set_navigation_offset(&mut self, offset: f64) {
        self.navigation_offset = offset;
    }

    /// Open (or replace) a document under `editor`.
    pub fn open_document(&mut self, editor: EditorId, doc: Document) {
        self.marks.reindex(editor, &doc);
        self.documents.insert(editor, doc);
        self.reflow.request(ReflowTrigger::Reposition, Instant::now());
    }

    /// Close the document under `editor`.
    pub fn close_document(&mut self, editor: EditorId) -> Option<Document> {
        let doc = self.documents.remove(&editor)?;
        self.marks.forget_editor(editor);
        self.reflow.request(ReflowTrigger::Reposition, Instant::now());
        Some(doc)
    }

    /// The document under `editor`.
    pub fn document(&self, editor: EditorId) -> Option<&Document> {
        self.documents.get(&editor)
    }

    /// Run a content edit against one document and re-derive its anchors afterwards.
    ///
    /// Use this for user typing and for replaying remote operations; anchors the edit
    /// deleted disappear from the index and a reflow is requested.
    pub fn edit<R, F>(&mut self, editor: EditorId, f: F) -> Option<R>
    where
        F: FnOnce(&mut Document) -> R,
    {
        let doc = self.documents.get_mut(&editor)?;
        let result = f(doc);
        self.marks.reindex(editor, doc);
        self.reflow.request(ReflowTrigger::Reposition, Instant::now());
        Some(result)
    }

    /// Comment on a selection. Returns the new thread; nothing is recorded in thread state
    /// when the selection no longer exists.
    pub fn create_thread(
        &mut self,
        editor: EditorId,
        index: usize,
        len: usize,
        kind: SelectionKind,
    ) -> Option<NewThread> {
        let doc = self.documents.get_mut(&editor)?;
        let created = self.marks.create(editor, doc, index, len, kind);
        self.open_draft(&created);
        Some(created)
    }

    /// Comment on one embed through its own affordance.
    pub fn create_thread_on_embed(&mut self, editor: EditorId, key: EmbedKey) -> Option<NewThread> {
        let doc = self.documents.get_mut(&editor)?;
        let created = self.marks.create_from_embed(editor, doc, key)?;
        self.open_draft(&created);
        Some(created)
    }

    fn open_draft(&mut self, created: &NewThread) {
        if !created.anchored {
            return;
        }
        self.dispatch(Action::CreateNewCommentThread {
            id: created.id.clone(),
            index: created.index,
            length: created.len,
        });
        self.select(&created.id);
    }

    /// Strip a thread's marks from every document. Returns the number of runs touched.
    pub fn remove_thread(&mut self, mark_id: &ThreadId) -> usize {
        let touched = self.marks.remove(mark_id, &mut self.documents);
        self.router.forget(mark_id);
        self.reflow.request(ReflowTrigger::Reposition, Instant::now());
        touched
    }

    /// Abandon a draft that has no comments yet. Returns `false` for anything else.
    pub fn cancel_thread(&mut self, mark_id: &ThreadId) -> bool {
        let is_draft = self
            .store
            .thread(mark_id)
            .is_some_and(|t| &t.mark_id == mark_id && t.stage == ThreadStage::Draft);
        if !is_draft {
            return false;
        }
        self.deselect(mark_id);
        self.dispatch(Action::CancelNewCommentThread {
            id: mark_id.clone(),
        });
        self.remove_thread(mark_id);
        true
    }

    /// Resolve a thread (by thread id or mark id) and strip its marks.
    pub fn resolve_thread(&mut self, id: &ThreadId) -> bool {
        let Some(mark_id) = self.store.thread(id).map(|t| t.mark_id.clone()) else {
            tracing::debug!(thread = %id, "resolve for unknown thread ignored");
            return false;
        };
        self.deselect(&mark_id);
        self.dispatch(Action::ResolveThread { id: id.clone() });
        self.remove_thread(&mark_id);
        true
    }

    /// Replace the thread list with a backend snapshot.
    pub fn set_threads(&mut self, threads: Vec<Thread>) {
        let resolved: Vec<ThreadId> = threads
            .iter()
            .filter(|t| t.resolved)
            .map(|t| t.mark_id.clone())
            .collect();
        self.dispatch(Action::SetThreads { threads });
        for mark_id in resolved {
            if self.marks.anchors().contains(&mark_id) {
                self.remove_thread(&mark_id);
            }
        }
    }

    /// Open a thread.
    pub fn select(&mut self, mark_id: &ThreadId) {
        let (router, mut host) = self.split();
        router.select(mark_id, None, &mut host);
    }

    /// Close `mark_id` if it is open.
    pub fn deselect(&mut self, mark_id: &ThreadId) {
        let (router, mut host) = self.split();
        router.deselect(mark_id, &mut host);
    }

    /// Close whatever thread is open.
    pub fn clear_selection(&mut self) {
        let (router, mut host) = self.split();
        router.clear(&mut host);
    }

    /// Route a pointer event on a mark run.
    pub fn pointer(&mut self, event: &PointerEvent) {
        let (router, mut host) = self.split();
        router.pointer(event, &mut host);
    }

    /// Submit a comment optimistically. The host sends the returned request to the backend
    /// and passes the answer to [`Self::settle_submission`].
    pub fn submit_comment(&mut self, mark_id: &ThreadId, user_id: u64, body: &str) -> Option<Submission> {
        let (submission, action) = self.store.prepare_submit(mark_id, user_id, body)?;
        self.dispatch(action);
        Some(submission)
    }

    /// Record the backend answer for a submission.
    pub fn settle_submission(
        &mut self,
        submission: &Submission,
        result: Result<Confirmation, SubmitError>,
    ) {
        self.dispatch(submission.settle(result));
    }

    /// Resubmit the first failed comment of a thread.
    pub fn retry_comment(&mut self, mark_id: &ThreadId) -> Option<Submission> {
        let (submission, action) = self.store.prepare_retry(mark_id)?;
        self.dispatch(action);
        Some(submission)
    }

    /// Thread ids of the run at `index` that should render as marked.
    pub fn visible_ids_at(&self, editor: EditorId, index: usize) -> Option<Vec<ThreadId>> {
        let doc = self.documents.get(&editor)?;
        formats_of(doc.mark_at(index), &self.store)
    }

    /// Rendered state of the run at `index`.
    pub fn run_state_at(&self, editor: EditorId, index: usize) -> MarkState {
        self.visible_ids_at(editor, index)
            .map(|ids| self.router.run_state(&ids))
            .unwrap_or_default()
    }

    /// The anchored text of a thread, shortened to `max_graphemes` (embeds show as `\u{FFFC}`).
    pub fn anchor_excerpt(&self, mark_id: &ThreadId, max_graphemes: usize) -> Option<String> {
        let editor = self.marks.anchors().editors(mark_id).into_iter().next()?;
        let doc = self.documents.get(&editor)?;
        let text: String = doc
            .spans_with(mark_id)
            .iter()
            .map(|span| doc.slice_text(span.index, span.len))
            .collect::<Vec<_>>()
            .join(" ");
        let mut graphemes = text.graphemes(true);
        let mut excerpt: String = graphemes.by_ref().take(max_graphemes).collect();
        if graphemes.next().is_some() {
            excerpt.push('…');
        }
        Some(excerpt)
    }

    /// The window was resized; layout becomes due after the debounce.
    pub fn window_resized(&mut self, now: Instant) {
        self.reflow.request(ReflowTrigger::WindowResized, now);
    }

    /// A thread card changed size.
    pub fn panel_resized(&mut self) {
        self.reflow.request(ReflowTrigger::PanelResized, Instant::now());
    }

    /// Run the layout pass if one is due at `now`.
    pub fn take_reflow(&mut self, now: Instant) -> Option<Vec<SortedThread>> {
        self.reflow.take_due(now).then(|| self.layout())
    }

    /// Run the layout pass now.
    pub fn layout(&self) -> Vec<SortedThread> {
        let threads: Vec<ThreadAnchor> = self
            .store
            .threads()
            .iter()
            .map(|t| ThreadAnchor::new(t.id.clone(), t.mark_id.clone()))
            .collect();
        let large_embeds = self
            .documents
            .get(&MAIN_EDITOR)
            .map(Document::large_embeds)
            .unwrap_or_default();
        layout(
            &threads,
            self.router.selected(),
            &large_embeds,
            ScrollOffsets {
                navigation: self.navigation_offset,
                scroll_top: self.viewport.scroll_top,
            },
            &self.geometry,
            &self.config,
        )
    }

    fn dispatch(&mut self, action: Action) {
        apply(&mut self.store, &mut self.reflow, &mut self.listeners, action);
    }

    fn split(&mut self) -> (&mut MarkRouter, Host<'_, G>) {
        (
            &mut self.router,
            Host {
                geometry: &self.geometry,
                viewport: &mut self.viewport,
                store: &mut self.store,
                reflow: &mut self.reflow,
                listeners: &mut self.listeners,
            },
        )
    }
}
