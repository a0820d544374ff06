//! Attributed range store: the comment mark attribute.
//!
//! A [`Mark`] is the attribute a document run (or embed) carries when one or more comment
//! threads are anchored to it. It holds an ordered, duplicate-free list of [`ThreadId`]s; the
//! first id is the primary one (topmost when rendering overlapping highlights).
//!
//! Marks are never empty: [`Mark::new`] and [`Mark::without`] return `None` instead of an
//! empty mark, and callers clear the attribute from the document in that case.
//!
//! The raw id list ([`Mark::ids`]) may briefly contain threads that are not yet confirmed by
//! the backend, or that are gone from application state. [`formats_of`] is the filtered view
//! that hides those, driven by a [`ThreadFilter`] supplied by application state.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of a comment thread.
///
/// Before the backend confirms a thread, its id is the mark id generated locally; afterwards
/// it is the server-assigned id. Marks always carry the mark id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ThreadId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Comment mark attribute attached to a run of document content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<ThreadId>", into = "Vec<ThreadId>")]
pub struct Mark {
    ids: Vec<ThreadId>,
}

impl Mark {
    /// Build a mark from ids, dropping duplicates (first occurrence wins).
    ///
    /// Returns `None` for an empty id list: a zero-id mark cannot exist.
    pub fn new<I>(ids: I) -> Option<Self>
    where
        I: IntoIterator<Item = ThreadId>,
    {
        let mut out: Vec<ThreadId> = Vec::new();
        for id in ids {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(Self { ids: out })
        }
    }

    /// Single-id mark.
    pub fn single(id: ThreadId) -> Self {
        Self { ids: vec![id] }
    }

    /// Raw, unfiltered ids in priority order.
    pub fn ids(&self) -> &[ThreadId] {
        &self.ids
    }

    /// The primary (first) id.
    pub fn primary(&self) -> &ThreadId {
        &self.ids[0]
    }

    /// Returns `true` if this mark carries `id`.
    pub fn contains(&self, id: &ThreadId) -> bool {
        self.ids.contains(id)
    }

    /// Number of ids on this mark.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Union `id` into this mark. A new id is prepended so the newest thread becomes primary;
    /// an id that is already present leaves the order untouched.
    pub fn with(&self, id: &ThreadId) -> Self {
        if self.contains(id) {
            return self.clone();
        }
        let mut ids = Vec::with_capacity(self.ids.len() + 1);
        ids.push(id.clone());
        ids.extend(self.ids.iter().cloned());
        Self { ids }
    }

    /// Remove `id`, preserving the relative order of the rest.
    ///
    /// Returns `None` when `id` was the only id (the attribute must be cleared).
    pub fn without(&self, id: &ThreadId) -> Option<Self> {
        Self::new(self.ids.iter().filter(|other| *other != id).cloned())
    }

    /// Union `id` into an optional existing mark.
    pub fn union(existing: Option<&Mark>, id: &ThreadId) -> Self {
        match existing {
            Some(mark) => mark.with(id),
            None => Self::single(id.clone()),
        }
    }
}

impl TryFrom<Vec<ThreadId>> for Mark {
    type Error = EmptyMark;

    fn try_from(ids: Vec<ThreadId>) -> Result<Self, Self::Error> {
        Mark::new(ids).ok_or(EmptyMark)
    }
}

impl From<Mark> for Vec<ThreadId> {
    fn from(mark: Mark) -> Self {
        mark.ids
    }
}

/// Error produced when deserializing a mark with no ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a comment mark must carry at least one thread id")]
pub struct EmptyMark;

/// Decides which thread ids are hidden from the filtered mark view.
///
/// Application state implements this: a mark id is hidden unless its thread exists and has
/// been confirmed by the backend.
pub trait ThreadFilter {
    /// Returns `true` if `id` must not be reported by [`formats_of`].
    fn is_hidden(&self, id: &ThreadId) -> bool;
}

/// A filter that hides nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowAll;

impl ThreadFilter for ShowAll {
    fn is_hidden(&self, _id: &ThreadId) -> bool {
        false
    }
}

impl<F> ThreadFilter for F
where
    F: Fn(&ThreadId) -> bool,
{
    fn is_hidden(&self, id: &ThreadId) -> bool {
        self(id)
    }
}

/// Filtered ids of a run's mark, or `None` when nothing visible remains.
pub fn formats_of(mark: Option<&Mark>, filter: &dyn ThreadFilter) -> Option<Vec<ThreadId>> {
    let mark = mark?;
    let ids: Vec<ThreadId> = mark
        .ids()
        .iter()
        .filter(|id| !filter.is_hidden(id))
        .cloned()
        .collect();
    if ids.is_empty() { None } else { Some(ids) }
}

/// Build a mark attribute for the given ids (the `createMark` primitive).
pub fn create_mark<I>(ids: I) -> Option<Mark>
where
    I: IntoIterator<Item = ThreadId>,
{
    Mark::new(ids)
}

/// Raw ids of a run's mark (the `idsOf` primitive). Empty for an unmarked run.
pub fn ids_of(mark: Option<&Mark>) -> &[ThreadId] {
    mark.map(Mark::ids).unwrap_or(&[])
}
