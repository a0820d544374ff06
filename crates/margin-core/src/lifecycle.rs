//! Mark lifecycle: creating, removing and re-deriving comment marks.
//!
//! A user selection maps to one `[index, len)` range, but the document stores it as many
//! physical runs: lines split it, and earlier marks already cut it into runs with different
//! id-sets. [`decompose`] walks that structure and yields one [`RangeSegment`] per
//! distinct existing id-set, so the new thread id can be unioned into each piece without
//! disturbing the other threads anchored there.
//!
//! [`MarkManager`] also maintains the [`AnchorIndex`], the explicit mapping from a thread id
//! to the editors (documents) currently carrying it. Selection routing and layout use the
//! index instead of scanning every open document.

use crate::document::{Document, EmbedKey, Leaf, Source};
use crate::marks::{Mark, ThreadId, ids_of};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Identifier of an editor surface (the main document or an embedded sub-document).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditorId(u64);

impl EditorId {
    /// Create an editor id from a raw number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Open documents keyed by editor.
pub type DocumentSet = BTreeMap<EditorId, Document>;

/// What the user selected when invoking "comment".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    /// A text range.
    Text,
    /// A single embedded object at the selection index.
    Embed,
}

/// A contiguous piece of a range whose runs share one existing id-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSegment {
    /// Start offset.
    pub index: usize,
    /// Length.
    pub len: usize,
    /// Raw ids already anchored to this piece (empty when unmarked).
    pub ids: Vec<ThreadId>,
}

/// Result of creating a thread mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewThread {
    /// The fresh thread (and mark) id.
    pub id: ThreadId,
    /// Editor the selection was made in.
    pub editor: EditorId,
    /// Selection start.
    pub index: usize,
    /// Selection length.
    pub len: usize,
    /// `false` when the anchor content was already gone and nothing was marked.
    pub anchored: bool,
}

/// Thread id → editors whose documents currently carry that id.
#[derive(Debug, Clone, Default)]
pub struct AnchorIndex {
    by_thread: HashMap<ThreadId, BTreeSet<EditorId>>,
}

impl AnchorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `editor` anchors `id`.
    pub fn insert(&mut self, id: ThreadId, editor: EditorId) {
        self.by_thread.entry(id).or_default().insert(editor);
    }

    /// Forget that `editor` anchors `id`.
    pub fn remove(&mut self, id: &ThreadId, editor: EditorId) {
        if let Some(editors) = self.by_thread.get_mut(id) {
            editors.remove(&editor);
            if editors.is_empty() {
                self.by_thread.remove(id);
            }
        }
    }

    /// Forget `id` everywhere.
    pub fn remove_thread(&mut self, id: &ThreadId) {
        self.by_thread.remove(id);
    }

    /// Editors anchoring `id`, in id order.
    pub fn editors(&self, id: &ThreadId) -> Vec<EditorId> {
        self.by_thread
            .get(id)
            .map(|editors| editors.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if any editor anchors `id`.
    pub fn contains(&self, id: &ThreadId) -> bool {
        self.by_thread.contains_key(id)
    }

    /// All anchored thread ids.
    pub fn thread_ids(&self) -> impl Iterator<Item = &ThreadId> {
        self.by_thread.keys()
    }

    /// Number of anchored thread ids.
    pub fn len(&self) -> usize {
        self.by_thread.len()
    }

    /// Returns `true` if nothing is anchored.
    pub fn is_empty(&self) -> bool {
        self.by_thread.is_empty()
    }

    fn replace_editor(&mut self, editor: EditorId, ids: BTreeSet<ThreadId>) {
        self.by_thread.retain(|_, editors| {
            editors.remove(&editor);
            !editors.is_empty()
        });
        for id in ids {
            self.insert(id, editor);
        }
    }
}

/// Split `[index, index + len)` into pieces that each carry a single existing id-set.
///
/// Pieces never cross a line; embeds count as length 1 and are never subdivided. Returns
/// `None` when no line exists at `index` (the content is gone).
pub fn decompose(doc: &Document, index: usize, len: usize) -> Option<Vec<RangeSegment>> {
    let lines = doc.lines(index, len);
    if lines.is_empty() {
        return None;
    }

    let end = index.saturating_add(len);
    let mut out: Vec<RangeSegment> = Vec::new();
    for line in &lines {
        let mut line_open = false;
        for run in doc.runs(line) {
            let start = run.start.max(index);
            let stop = run.end().min(end);
            if start >= stop {
                continue;
            }
            let ids = ids_of(run.mark);
            if line_open
                && let Some(last) = out.last_mut()
                && last.index + last.len == start
                && last.ids == ids
            {
                last.len += stop - start;
                continue;
            }
            out.push(RangeSegment {
                index: start,
                len: stop - start,
                ids: ids.to_vec(),
            });
            line_open = true;
        }
    }
    Some(out)
}

fn embed_at(doc: &Document, index: usize) -> Option<EmbedKey> {
    match doc.leaf(index)? {
        (Leaf::Embed(embed, _), _) => Some(embed.key),
        (Leaf::Text(_), _) => None,
    }
}

/// Reposition callback, invoked after an anchor disappeared.
pub type RepositionCallback = Box<dyn FnMut(&ThreadId) + Send>;

/// Creates and removes comment marks and keeps the [`AnchorIndex`] current.
#[derive(Default)]
pub struct MarkManager {
    anchors: AnchorIndex,
    reposition: Vec<RepositionCallback>,
}

impl std::fmt::Debug for MarkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkManager")
            .field("anchors", &self.anchors)
            .finish_non_exhaustive()
    }
}

impl MarkManager {
    /// Create a manager with an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// The anchor index.
    pub fn anchors(&self) -> &AnchorIndex {
        &self.anchors
    }

    /// Subscribe to reposition signals (an anchor was removed, layout must be recomputed).
    pub fn on_reposition<F>(&mut self, callback: F)
    where
        F: FnMut(&ThreadId) + Send + 'static,
    {
        self.reposition.push(Box::new(callback));
    }

    /// Anchor a fresh thread to a selection.
    pub fn create(
        &mut self,
        editor: EditorId,
        doc: &mut Document,
        index: usize,
        len: usize,
        kind: SelectionKind,
    ) -> NewThread {
        self.create_with_id(ThreadId::generate(), editor, doc, index, len, kind)
    }

    /// Anchor a thread with a caller-chosen id to a selection.
    pub fn create_with_id(
        &mut self,
        id: ThreadId,
        editor: EditorId,
        doc: &mut Document,
        index: usize,
        len: usize,
        kind: SelectionKind,
    ) -> NewThread {
        let anchored = match kind {
            SelectionKind::Embed => match embed_at(doc, index) {
                Some(key) => self.mark_embed(&id, editor, doc, key),
                None => {
                    tracing::warn!(thread = %id, index, "no embed at selection; nothing marked");
                    false
                }
            },
            SelectionKind::Text => self.mark_range(&id, editor, doc, index, len),
        };

        tracing::debug!(thread = %id, editor = editor.get(), index, len, anchored, "created thread mark");
        let len = if kind == SelectionKind::Embed { 1 } else { len };
        NewThread {
            id,
            editor,
            index,
            len,
            anchored,
        }
    }

    /// Anchor a fresh thread to a specific embed (the embed's own "comment" affordance).
    pub fn create_from_embed(
        &mut self,
        editor: EditorId,
        doc: &mut Document,
        key: EmbedKey,
    ) -> Option<NewThread> {
        self.create_from_embed_with_id(ThreadId::generate(), editor, doc, key)
    }

    /// Like [`Self::create_from_embed`] with a caller-chosen id.
    pub fn create_from_embed_with_id(
        &mut self,
        id: ThreadId,
        editor: EditorId,
        doc: &mut Document,
        key: EmbedKey,
    ) -> Option<NewThread> {
        let index = doc.embed_index(key)?;
        let anchored = self.mark_embed(&id, editor, doc, key);
        tracing::debug!(thread = %id, editor = editor.get(), embed = key.get(), "created embed mark");
        Some(NewThread {
            id,
            editor,
            index,
            len: 1,
            anchored,
        })
    }

    /// Remove `id` from every run and embed of one document. Returns the number of physical
    /// runs touched.
    pub fn remove_from(&mut self, id: &ThreadId, editor: EditorId, doc: &mut Document) -> usize {
        let spans = doc.spans_with(id);
        for span in &spans {
            let rest = span.mark.without(id);
            let result = match span.embed {
                Some(key) => doc.format_embed(key, rest.as_ref(), Source::Api),
                None => doc.format_text(span.index, span.len, rest.as_ref(), Source::Api),
            };
            if let Err(err) = result {
                tracing::warn!(thread = %id, %err, "failed to clear mark run");
            }
        }
        self.anchors.remove(id, editor);
        spans.len()
    }

    /// Remove `id` from every document anchoring it and broadcast a reposition signal.
    pub fn remove(&mut self, id: &ThreadId, docs: &mut DocumentSet) -> usize {
        let mut touched = 0usize;
        for editor in self.anchors.editors(id) {
            match docs.get_mut(&editor) {
                Some(doc) => touched += self.remove_from(id, editor, doc),
                None => self.anchors.remove(id, editor),
            }
        }
        self.anchors.remove_thread(id);
        tracing::debug!(thread = %id, touched, "removed thread mark");
        for callback in &mut self.reposition {
            callback(id);
        }
        touched
    }

    /// Rebuild the index entries of one editor from its document.
    ///
    /// Hosts call this after replaying remote operations that may have deleted anchored
    /// content.
    pub fn reindex(&mut self, editor: EditorId, doc: &Document) {
        let ids: BTreeSet<ThreadId> = doc
            .marked_spans()
            .into_iter()
            .flat_map(|span| Vec::from(span.mark))
            .collect();
        self.anchors.replace_editor(editor, ids);
    }

    /// Drop an editor (its document was closed).
    pub fn forget_editor(&mut self, editor: EditorId) {
        self.anchors.replace_editor(editor, BTreeSet::new());
    }

    fn mark_range(
        &mut self,
        id: &ThreadId,
        editor: EditorId,
        doc: &mut Document,
        index: usize,
        len: usize,
    ) -> bool {
        let Some(segments) = decompose(doc, index, len) else {
            tracing::warn!(thread = %id, index, len, "anchor line not found; nothing marked");
            return false;
        };
        let mut marked = false;
        for segment in segments {
            let existing = Mark::new(segment.ids);
            let mark = Mark::union(existing.as_ref(), id);
            match doc.format_text(segment.index, segment.len, Some(&mark), Source::Api) {
                Ok(()) => marked = true,
                Err(err) => tracing::warn!(thread = %id, %err, "failed to format mark segment"),
            }
        }
        if marked {
            self.anchors.insert(id.clone(), editor);
        }
        marked
    }

    fn mark_embed(
        &mut self,
        id: &ThreadId,
        editor: EditorId,
        doc: &mut Document,
        key: EmbedKey,
    ) -> bool {
        let mark = Mark::union(doc.embed_mark(key), id);
        match doc.format_embed(key, Some(&mark), Source::Api) {
            Ok(()) => {
                self.anchors.insert(id.clone(), editor);
                true
            }
            Err(err) => {
                tracing::warn!(thread = %id, %err, "failed to mark embed");
                false
            }
        }
    }
}
