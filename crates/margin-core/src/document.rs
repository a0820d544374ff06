//! Rich-text document model.
//!
//! A deliberately small rich-text model that gives the anchoring engine the primitives it
//! needs: formatting a range with a [`Mark`], walking lines and the runs inside them, and
//! locating the runs or embeds that carry a thread id.
//!
//! # Offsets
//!
//! Offsets are Unicode scalar values (`char`). Every embed has length 1, and every text line
//! ends with a newline of length 1. A block embed is a line of its own with no newline.
//!
//! ```text
//!  "ab" ⏎ [image] "c" [chip] "d" ⏎
//!   0 1 2    3     4   5    6   7
//! ```
//!
//! The document always ends with a newline, and it cannot be deleted.
//!
//! # Marks and coalescing
//!
//! After every mutation adjacent text runs carrying equal marks are merged. Runs with
//! different id-sets are never merged, so a run boundary always separates distinct id-sets.

use crate::marks::{Mark, ThreadId};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Character the [`Document::text`] view uses for embeds.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Who caused a document mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Direct user input (typing, pasting, deleting).
    User,
    /// Programmatic change (mark bookkeeping, remote replay).
    Api,
    /// Programmatic change that must not be broadcast to subscribers.
    Silent,
}

/// Kind of a document mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Content inserted.
    Insert,
    /// Content deleted.
    Delete,
    /// Attributes changed.
    Format,
}

/// A broadcast document mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    /// What kind of change happened.
    pub kind: ChangeKind,
    /// Who caused it.
    pub source: Source,
    /// Affected character range in the pre-change document.
    pub range: Range<usize>,
    /// Document version after the change.
    pub version: u64,
}

/// Document change callback.
pub type DocumentChangeCallback = Box<dyn FnMut(&DocumentChange) + Send>;

/// Document errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// Offset beyond the document.
    #[error("invalid offset {offset} (document length {len})")]
    InvalidOffset {
        /// Requested offset.
        offset: usize,
        /// Document length.
        len: usize,
    },
    /// Range beyond the document.
    #[error("invalid range {start}..{end} (document length {len})")]
    InvalidRange {
        /// Range start.
        start: usize,
        /// Range end (exclusive).
        end: usize,
        /// Document length.
        len: usize,
    },
    /// No embed with this key.
    #[error("embed {0:?} not found")]
    EmbedNotFound(EmbedKey),
}

/// Stable identifier of an embedded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmbedKey(u64);

impl EmbedKey {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Display size attribute of an embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedSize {
    /// Small.
    Small,
    /// Medium (default).
    #[default]
    Medium,
    /// Large; threads alongside large block embeds collapse in the comment rail.
    Large,
}

/// An embedded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    /// Stable key.
    pub key: EmbedKey,
    /// Host-defined kind (`"image"`, `"video"`, `"document"`, ...).
    pub kind: String,
    /// Size attribute.
    pub size: EmbedSize,
}

/// Placement of an embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPlacement {
    /// Inside a text line.
    Inline,
    /// A line of its own.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Content {
    Text(String),
    Embed(Embed, EmbedPlacement),
    Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    content: Content,
    mark: Option<Mark>,
}

impl Segment {
    fn text(text: impl Into<String>, mark: Option<Mark>) -> Self {
        Self {
            content: Content::Text(text.into()),
            mark,
        }
    }

    fn newline() -> Self {
        Self {
            content: Content::Newline,
            mark: None,
        }
    }

    fn len(&self) -> usize {
        match &self.content {
            Content::Text(text) => text.chars().count(),
            Content::Embed(..) | Content::Newline => 1,
        }
    }

    fn ends_line(&self) -> bool {
        matches!(
            self.content,
            Content::Newline | Content::Embed(_, EmbedPlacement::Block)
        )
    }
}

/// Kind of a document line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Text (and inline embeds) followed by a newline.
    Text,
    /// A single block embed.
    Embed,
}

/// A line of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRef {
    /// Line number (0-based).
    pub line: usize,
    /// Start offset of the line.
    pub start: usize,
    /// Line length, including its newline when it has one.
    pub len: usize,
    /// Line kind.
    pub kind: LineKind,
    first_segment: usize,
    end_segment: usize,
}

impl LineRef {
    /// Exclusive end offset of the line.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A leaf of the document: a text run or an embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaf<'a> {
    /// A text run (without newline).
    Text(&'a str),
    /// An embed.
    Embed(&'a Embed, EmbedPlacement),
}

/// A run inside a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRef<'a> {
    /// Start offset.
    pub start: usize,
    /// Length (1 for embeds).
    pub len: usize,
    /// Run content.
    pub leaf: Leaf<'a>,
    /// Mark attribute, if any.
    pub mark: Option<&'a Mark>,
}

impl RunRef<'_> {
    /// Embed key, when the run is an embed.
    pub fn embed_key(&self) -> Option<EmbedKey> {
        match self.leaf {
            Leaf::Embed(embed, _) => Some(embed.key),
            Leaf::Text(_) => None,
        }
    }

    /// Exclusive end offset.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A physical run (text run or embed) that carries a given thread id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedSpan {
    /// Start offset.
    pub index: usize,
    /// Length.
    pub len: usize,
    /// Embed key when the span is an embed.
    pub embed: Option<EmbedKey>,
    /// The full mark attribute of the span.
    pub mark: Mark,
}

/// Description of an embed to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedSpec {
    /// Host-defined kind.
    pub kind: String,
    /// Size attribute.
    pub size: EmbedSize,
}

impl EmbedSpec {
    /// Create an embed spec.
    pub fn new(kind: impl Into<String>, size: EmbedSize) -> Self {
        Self {
            kind: kind.into(),
            size,
        }
    }
}

/// A rich-text document.
pub struct Document {
    segments: Vec<Segment>,
    version: u64,
    next_embed: u64,
    callbacks: Vec<DocumentChangeCallback>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("segments", &self.segments)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document (a single empty line).
    pub fn new() -> Self {
        Self {
            segments: vec![Segment::newline()],
            version: 0,
            next_embed: 1,
            callbacks: Vec::new(),
        }
    }

    /// Create a document from plain text. A trailing newline is added when missing.
    pub fn from_text(text: &str) -> Self {
        let mut doc = Self::new();
        let body = text.strip_suffix('\n').unwrap_or(text);
        doc.segments = Self::text_segments(body, None);
        doc.segments.push(Segment::newline());
        doc.normalize();
        doc
    }

    /// Subscribe to broadcast mutations.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&DocumentChange) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Document length.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// Always `false`: a document has at least its final newline.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Version number, incremented by every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Plain-text view; embeds appear as [`OBJECT_REPLACEMENT`].
    pub fn text(&self) -> String {
        self.slice_text(0, self.len())
    }

    /// Plain-text view of `[index, index + len)`.
    pub fn slice_text(&self, index: usize, len: usize) -> String {
        let end = index.saturating_add(len);
        let mut out = String::new();
        let mut pos = 0usize;
        for segment in &self.segments {
            let seg_len = segment.len();
            let seg_end = pos + seg_len;
            if seg_end > index && pos < end {
                let from = index.saturating_sub(pos);
                let to = (end - pos).min(seg_len);
                match &segment.content {
                    Content::Text(text) => out.extend(text.chars().skip(from).take(to - from)),
                    Content::Embed(..) => out.push(OBJECT_REPLACEMENT),
                    Content::Newline => out.push('\n'),
                }
            }
            pos = seg_end;
            if pos >= end {
                break;
            }
        }
        out
    }

    /// Insert text at `index`. Newlines split lines.
    ///
    /// Text inserted strictly inside a marked run extends that run's mark; text inserted at a
    /// run boundary is unmarked.
    pub fn insert_text(
        &mut self,
        index: usize,
        text: &str,
        source: Source,
    ) -> Result<(), DocumentError> {
        self.check_insert_offset(index)?;
        if text.is_empty() {
            return Ok(());
        }

        let inherited = if text.contains('\n') {
            None
        } else {
            self.text_run_strictly_containing(index)
        };

        let at = self.split_at(index);
        let mark = inherited.and_then(|seg| self.segments[seg].mark.clone());
        let new_segments = Self::text_segments(text, mark);
        self.segments.splice(at..at, new_segments);
        self.normalize();

        let inserted = text.chars().count();
        self.commit(ChangeKind::Insert, source, index..index + inserted);
        Ok(())
    }

    /// Insert an inline embed at `index`.
    pub fn insert_embed(
        &mut self,
        index: usize,
        spec: EmbedSpec,
        source: Source,
    ) -> Result<EmbedKey, DocumentError> {
        self.check_insert_offset(index)?;
        let key = self.alloc_embed_key();
        let at = self.split_at(index);
        self.segments.insert(
            at,
            Segment {
                content: Content::Embed(
                    Embed {
                        key,
                        kind: spec.kind,
                        size: spec.size,
                    },
                    EmbedPlacement::Inline,
                ),
                mark: None,
            },
        );
        self.normalize();
        self.commit(ChangeKind::Insert, source, index..index + 1);
        Ok(key)
    }

    /// Insert a block embed at `index`. When `index` is not at a line start the line is split
    /// first, so the embed always lands on a line of its own.
    pub fn insert_block_embed(
        &mut self,
        index: usize,
        spec: EmbedSpec,
        source: Source,
    ) -> Result<EmbedKey, DocumentError> {
        self.check_insert_offset(index)?;
        let key = self.alloc_embed_key();
        let mut at = self.split_at(index);
        let mut inserted = 1usize;
        if at > 0 && !self.segments[at - 1].ends_line() {
            self.segments.insert(at, Segment::newline());
            at += 1;
            inserted += 1;
        }
        self.segments.insert(
            at,
            Segment {
                content: Content::Embed(
                    Embed {
                        key,
                        kind: spec.kind,
                        size: spec.size,
                    },
                    EmbedPlacement::Block,
                ),
                mark: None,
            },
        );
        self.normalize();
        self.commit(ChangeKind::Insert, source, index..index + inserted);
        Ok(key)
    }

    /// Delete `[index, index + len)`. The final newline is never deleted; a range reaching it
    /// is clipped.
    pub fn delete(&mut self, index: usize, len: usize, source: Source) -> Result<(), DocumentError> {
        self.check_range(index, len)?;
        let end = (index + len).min(self.len() - 1);
        if end <= index {
            return Ok(());
        }
        let from = self.split_at(index);
        let to = self.split_at(end);
        self.segments.drain(from..to);
        self.normalize();
        self.commit(ChangeKind::Delete, source, index..end);
        Ok(())
    }

    /// Set (or clear, with `None`) the mark attribute on every run in `[index, index + len)`.
    ///
    /// Newlines never carry marks. Runs are split at the range boundaries as needed.
    pub fn format_text(
        &mut self,
        index: usize,
        len: usize,
        mark: Option<&Mark>,
        source: Source,
    ) -> Result<(), DocumentError> {
        self.check_range(index, len)?;
        if len == 0 {
            return Ok(());
        }
        let from = self.split_at(index);
        let to = self.split_at(index + len);
        for segment in &mut self.segments[from..to] {
            if !matches!(segment.content, Content::Newline) {
                segment.mark = mark.cloned();
            }
        }
        self.normalize();
        self.commit(ChangeKind::Format, source, index..index + len);
        Ok(())
    }

    /// Set (or clear) the mark attribute of a single embed.
    pub fn format_embed(
        &mut self,
        key: EmbedKey,
        mark: Option<&Mark>,
        source: Source,
    ) -> Result<(), DocumentError> {
        let index = self
            .embed_index(key)
            .ok_or(DocumentError::EmbedNotFound(key))?;
        self.format_text(index, 1, mark, source)
    }

    /// Lines overlapping `[index, index + len]`; with `len == 0`, the line containing `index`.
    pub fn lines(&self, index: usize, len: usize) -> Vec<LineRef> {
        let end = index.saturating_add(len);
        self.line_table()
            .into_iter()
            .filter(|line| {
                if len == 0 {
                    line.start <= index && index < line.end()
                } else {
                    line.start < end && index < line.end()
                }
            })
            .collect()
    }

    /// The line containing `index` and the offset within it.
    pub fn line_at(&self, index: usize) -> Option<(LineRef, usize)> {
        self.lines(index, 0)
            .into_iter()
            .next()
            .map(|line| (line, index - line.start))
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.line_table().len()
    }

    /// Runs of a line (text runs and embeds; the newline is not a run).
    pub fn runs(&self, line: &LineRef) -> Vec<RunRef<'_>> {
        let mut out = Vec::new();
        let mut pos = line.start;
        for segment in &self.segments[line.first_segment..line.end_segment] {
            let len = segment.len();
            let leaf = match &segment.content {
                Content::Text(text) => Leaf::Text(text),
                Content::Embed(embed, placement) => Leaf::Embed(embed, *placement),
                Content::Newline => {
                    pos += len;
                    continue;
                }
            };
            out.push(RunRef {
                start: pos,
                len,
                leaf,
                mark: segment.mark.as_ref(),
            });
            pos += len;
        }
        out
    }

    /// The leaf at `index` and the offset within it. Newlines are not leaves.
    pub fn leaf(&self, index: usize) -> Option<(Leaf<'_>, usize)> {
        let (seg, offset) = self.segment_at(index)?;
        match &self.segments[seg].content {
            Content::Text(text) => Some((Leaf::Text(text), offset)),
            Content::Embed(embed, placement) => Some((Leaf::Embed(embed, *placement), offset)),
            Content::Newline => None,
        }
    }

    /// Offset of an embed (`getIndex`).
    pub fn embed_index(&self, key: EmbedKey) -> Option<usize> {
        let mut pos = 0usize;
        for segment in &self.segments {
            if let Content::Embed(embed, _) = &segment.content
                && embed.key == key
            {
                return Some(pos);
            }
            pos += segment.len();
        }
        None
    }

    /// An embed by key.
    pub fn embed(&self, key: EmbedKey) -> Option<&Embed> {
        self.segments.iter().find_map(|segment| match &segment.content {
            Content::Embed(embed, _) if embed.key == key => Some(embed),
            _ => None,
        })
    }

    /// Mark attribute of the run at `index`.
    pub fn mark_at(&self, index: usize) -> Option<&Mark> {
        let (seg, _) = self.segment_at(index)?;
        self.segments[seg].mark.as_ref()
    }

    /// Mark attribute of an embed.
    pub fn embed_mark(&self, key: EmbedKey) -> Option<&Mark> {
        self.segments.iter().find_map(|segment| match &segment.content {
            Content::Embed(embed, _) if embed.key == key => segment.mark.as_ref(),
            _ => None,
        })
    }

    /// Every physical run or embed whose mark carries `id`, in document order.
    pub fn spans_with(&self, id: &ThreadId) -> Vec<MarkedSpan> {
        self.marked_spans()
            .into_iter()
            .filter(|span| span.mark.contains(id))
            .collect()
    }

    /// Every marked run or embed, in document order.
    pub fn marked_spans(&self) -> Vec<MarkedSpan> {
        let mut out = Vec::new();
        let mut pos = 0usize;
        for segment in &self.segments {
            let len = segment.len();
            if let Some(mark) = &segment.mark {
                let embed = match &segment.content {
                    Content::Embed(embed, _) => Some(embed.key),
                    _ => None,
                };
                out.push(MarkedSpan {
                    index: pos,
                    len,
                    embed,
                    mark: mark.clone(),
                });
            }
            pos += len;
        }
        out
    }

    /// Keys of block embeds with [`EmbedSize::Large`].
    pub fn large_embeds(&self) -> Vec<EmbedKey> {
        self.segments
            .iter()
            .filter_map(|segment| match &segment.content {
                Content::Embed(embed, EmbedPlacement::Block) if embed.size == EmbedSize::Large => {
                    Some(embed.key)
                }
                _ => None,
            })
            .collect()
    }

    fn line_table(&self) -> Vec<LineRef> {
        let mut lines = Vec::new();
        let mut start = 0usize;
        let mut pos = 0usize;
        let mut first = 0usize;
        for (idx, segment) in self.segments.iter().enumerate() {
            let is_block = matches!(segment.content, Content::Embed(_, EmbedPlacement::Block));
            if is_block && first < idx {
                // Text directly followed by a block embed forms a line without newline.
                lines.push(LineRef {
                    line: lines.len(),
                    start,
                    len: pos - start,
                    kind: LineKind::Text,
                    first_segment: first,
                    end_segment: idx,
                });
                start = pos;
                first = idx;
            }
            pos += segment.len();
            if segment.ends_line() {
                lines.push(LineRef {
                    line: lines.len(),
                    start,
                    len: pos - start,
                    kind: if is_block { LineKind::Embed } else { LineKind::Text },
                    first_segment: first,
                    end_segment: idx + 1,
                });
                start = pos;
                first = idx + 1;
            }
        }
        lines
    }

    fn text_segments(text: &str, mark: Option<Mark>) -> Vec<Segment> {
        let mut out = Vec::new();
        let mut parts = text.split('\n').peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                out.push(Segment::text(part, mark.clone()));
            }
            if parts.peek().is_some() {
                out.push(Segment::newline());
            }
        }
        out
    }

    /// Segment containing `index` and the offset within it.
    fn segment_at(&self, index: usize) -> Option<(usize, usize)> {
        let mut pos = 0usize;
        for (idx, segment) in self.segments.iter().enumerate() {
            let len = segment.len();
            if index < pos + len {
                return Some((idx, index - pos));
            }
            pos += len;
        }
        None
    }

    fn text_run_strictly_containing(&self, index: usize) -> Option<usize> {
        let (seg, offset) = self.segment_at(index)?;
        match &self.segments[seg].content {
            Content::Text(_) if offset > 0 => Some(seg),
            _ => None,
        }
    }

    /// Ensure a segment boundary at `index`; returns the index of the first segment at or
    /// after it.
    fn split_at(&mut self, index: usize) -> usize {
        let Some((seg, offset)) = self.segment_at(index) else {
            return self.segments.len();
        };
        if offset == 0 {
            return seg;
        }
        let Content::Text(text) = &mut self.segments[seg].content else {
            // Embeds and newlines have length 1, so a non-zero offset lands in text.
            return seg + 1;
        };
        let byte = text
            .char_indices()
            .nth(offset)
            .map(|(byte, _)| byte)
            .unwrap_or(text.len());
        let tail = text.split_off(byte);
        let mark = self.segments[seg].mark.clone();
        self.segments.insert(seg + 1, Segment::text(tail, mark));
        seg + 1
    }

    fn normalize(&mut self) {
        let mut out: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            if let Content::Text(text) = &segment.content {
                if text.is_empty() {
                    continue;
                }
                if let Some(prev) = out.last_mut()
                    && prev.mark == segment.mark
                    && let Content::Text(prev_text) = &mut prev.content
                {
                    prev_text.push_str(text);
                    continue;
                }
            }
            out.push(segment);
        }
        if !matches!(out.last().map(|s| &s.content), Some(Content::Newline)) {
            out.push(Segment::newline());
        }
        self.segments = out;
    }

    fn alloc_embed_key(&mut self) -> EmbedKey {
        let key = EmbedKey(self.next_embed);
        self.next_embed += 1;
        key
    }

    fn check_insert_offset(&self, index: usize) -> Result<(), DocumentError> {
        let len = self.len();
        if index >= len {
            return Err(DocumentError::InvalidOffset { offset: index, len });
        }
        Ok(())
    }

    fn check_range(&self, index: usize, len: usize) -> Result<(), DocumentError> {
        let doc_len = self.len();
        let end = index.checked_add(len);
        match end {
            Some(end) if end <= doc_len => Ok(()),
            _ => Err(DocumentError::InvalidRange {
                start: index,
                end: end.unwrap_or(usize::MAX),
                len: doc_len,
            }),
        }
    }

    fn commit(&mut self, kind: ChangeKind, source: Source, range: Range<usize>) {
        self.version += 1;
        if source == Source::Silent {
            return;
        }
        let change = DocumentChange {
            kind,
            source,
            range,
            version: self.version,
        };
        for callback in &mut self.callbacks {
            callback(&change);
        }
    }
}
