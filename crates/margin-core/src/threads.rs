//! Comment threads and the application-state reducer.
//!
//! Threads are the source of truth for whether a mark is still live. The store is driven
//! exclusively through [`Action`]s (see [`ThreadStore::reduce`]) so every state transition
//! is observable by subscribers.
//!
//! # Lifecycle
//!
//! ```text
//!  Draft ──dispatch first comment──▶ Posting ──backend confirms──▶ Created
//!    │                                  │
//!    └──cancel (still empty)            └──failure: comment Delivery::Failed, kept for retry
//! ```
//!
//! Resolving removes a thread from the active set at any stage.
//!
//! Submission is optimistic and two-phase: [`ThreadStore::prepare_submit`] yields the
//! `NewCommentDispatched` action plus a [`Submission`] describing the backend request; once
//! the backend answers, [`Submission::settle`] yields either `NewCommentPosted` or
//! `NewCommentError`. A failed comment keeps its text and stays in place.

use crate::marks::{ThreadFilter, ThreadId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Comment identifier: temporary until the backend confirms it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CommentId {
    /// Locally generated, not yet confirmed.
    Temporary(Uuid),
    /// Server-assigned.
    Confirmed(String),
}

/// Delivery state of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Sent to the backend, no answer yet.
    #[default]
    Pending,
    /// Confirmed by the backend.
    Sent,
    /// The backend rejected it or the request failed; kept for manual retry.
    Failed,
}

/// One message within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment id.
    pub id: CommentId,
    /// Author.
    pub user_id: u64,
    /// Raw text, possibly with mention tokens.
    pub comment: String,
    /// Creation time (ms).
    pub created_at: i64,
    /// Last update time (ms).
    pub updated_at: i64,
    /// Delivery state.
    #[serde(default)]
    pub delivery: Delivery,
}

impl Comment {
    /// A new local comment with a temporary id.
    pub fn local(user_id: u64, comment: impl Into<String>, now: i64) -> Self {
        Self {
            id: CommentId::Temporary(Uuid::new_v4()),
            user_id,
            comment: comment.into(),
            created_at: now,
            updated_at: now,
            delivery: Delivery::Pending,
        }
    }

    /// A confirmed comment (as fetched from the backend).
    pub fn confirmed(id: impl Into<String>, user_id: u64, comment: impl Into<String>, at: i64) -> Self {
        Self {
            id: CommentId::Confirmed(id.into()),
            user_id,
            comment: comment.into(),
            created_at: at,
            updated_at: at,
            delivery: Delivery::Sent,
        }
    }

    /// Returns `true` if submitting this comment failed.
    pub fn has_error(&self) -> bool {
        self.delivery == Delivery::Failed
    }

    /// The temporary id, if the comment is not confirmed yet.
    pub fn temp_id(&self) -> Option<Uuid> {
        match self.id {
            CommentId::Temporary(id) => Some(id),
            CommentId::Confirmed(_) => None,
        }
    }

    /// Numeric ids of users mentioned in the body.
    pub fn mentioned_user_ids(&self) -> Vec<u64> {
        margin_mentions::mentioned_user_ids(&self.comment)
    }
}

/// A non-empty, ordered comment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comments {
    first: Comment,
    rest: Vec<Comment>,
}

impl Comments {
    /// A list holding one comment.
    pub fn one(first: Comment) -> Self {
        Self {
            first,
            rest: Vec::new(),
        }
    }

    /// Build from a vector; `None` when empty.
    pub fn from_vec(mut comments: Vec<Comment>) -> Option<Self> {
        if comments.is_empty() {
            return None;
        }
        let first = comments.remove(0);
        Some(Self {
            first,
            rest: comments,
        })
    }

    /// The first comment.
    pub fn first(&self) -> &Comment {
        &self.first
    }

    /// Append a comment.
    pub fn push(&mut self, comment: Comment) {
        self.rest.push(comment);
    }

    /// Number of comments (at least 1).
    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    /// Always `false`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate in order.
    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        std::iter::once(&self.first).chain(self.rest.iter())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Comment> {
        std::iter::once(&mut self.first).chain(self.rest.iter_mut())
    }

    fn find_temp_mut(&mut self, temp_id: Uuid) -> Option<&mut Comment> {
        self.iter_mut().find(|c| c.temp_id() == Some(temp_id))
    }
}

/// Where a thread is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "comments", rename_all = "snake_case")]
pub enum ThreadStage {
    /// Created locally, no comment yet.
    Draft,
    /// First comment sent, thread not confirmed yet.
    Posting(Comments),
    /// Confirmed by the backend.
    Created(Comments),
}

/// Coarse thread status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    /// Not yet submitted.
    Draft,
    /// First comment in flight.
    Posting,
    /// Confirmed.
    Created,
    /// The first comment failed; the thread does not exist on the backend.
    Error,
}

/// Anchor range a draft thread was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorSpan {
    /// Start offset.
    pub index: usize,
    /// Length.
    pub len: usize,
}

/// A discussion anchored at one mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Thread id; equals `mark_id` until the backend confirms the thread.
    pub id: ThreadId,
    /// Primary id of the anchoring mark. Immutable.
    pub mark_id: ThreadId,
    /// Whether the thread was resolved.
    #[serde(default)]
    pub resolved: bool,
    /// Start time (ms).
    pub started_at: i64,
    /// Selection the thread was created for (local threads only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorSpan>,
    /// Lifecycle stage with its comments.
    pub stage: ThreadStage,
}

impl Thread {
    /// A fresh local draft.
    pub fn draft(mark_id: ThreadId, anchor: AnchorSpan, now: i64) -> Self {
        Self {
            id: mark_id.clone(),
            mark_id,
            resolved: false,
            started_at: now,
            anchor: Some(anchor),
            stage: ThreadStage::Draft,
        }
    }

    /// A confirmed thread; `None` when `comments` is empty.
    pub fn created(id: ThreadId, mark_id: ThreadId, started_at: i64, comments: Vec<Comment>) -> Option<Self> {
        Some(Self {
            id,
            mark_id,
            resolved: false,
            started_at,
            anchor: None,
            stage: ThreadStage::Created(Comments::from_vec(comments)?),
        })
    }

    /// Coarse status.
    pub fn status(&self) -> ThreadStatus {
        match &self.stage {
            ThreadStage::Draft => ThreadStatus::Draft,
            ThreadStage::Posting(comments) if comments.first().has_error() => ThreadStatus::Error,
            ThreadStage::Posting(_) => ThreadStatus::Posting,
            ThreadStage::Created(_) => ThreadStatus::Created,
        }
    }

    /// Comments in order (empty for drafts).
    pub fn comments(&self) -> Vec<&Comment> {
        match &self.stage {
            ThreadStage::Draft => Vec::new(),
            ThreadStage::Posting(c) | ThreadStage::Created(c) => c.iter().collect(),
        }
    }

    /// Returns `true` if any comment failed to submit.
    pub fn has_error(&self) -> bool {
        self.comments().iter().any(|c| c.has_error())
    }

    fn comments_mut(&mut self) -> Option<&mut Comments> {
        match &mut self.stage {
            ThreadStage::Draft => None,
            ThreadStage::Posting(c) | ThreadStage::Created(c) => Some(c),
        }
    }

    fn failed_comments(&self) -> Vec<Comment> {
        self.comments()
            .into_iter()
            .filter(|c| c.has_error())
            .cloned()
            .collect()
    }
}

/// Application-state actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A draft thread was created for a selection.
    CreateNewCommentThread {
        /// New thread (mark) id.
        id: ThreadId,
        /// Selection start.
        index: usize,
        /// Selection length.
        length: usize,
    },
    /// An empty draft was abandoned.
    CancelNewCommentThread {
        /// Thread (mark) id.
        id: ThreadId,
    },
    /// A thread was opened.
    SelectCommentThread {
        /// Mark id.
        mark_id: ThreadId,
    },
    /// The open thread was closed.
    DeselectCommentThread,
    /// A thread's mark is hovered.
    HighlightCommentThread {
        /// Mark id.
        mark_id: ThreadId,
    },
    /// Hover ended.
    UnhighlightCommentThread,
    /// A comment was submitted (optimistic insert).
    NewCommentDispatched {
        /// Mark id of the thread.
        mark_id: ThreadId,
        /// The comment, with a temporary id.
        comment: Comment,
    },
    /// The backend confirmed a comment.
    NewCommentPosted {
        /// Mark id of the thread.
        mark_id: ThreadId,
        /// Temporary id being confirmed.
        temp_id: Uuid,
        /// Confirmed comment id.
        comment_id: String,
        /// Confirmed thread id.
        thread_id: ThreadId,
    },
    /// Submitting a comment failed.
    NewCommentError {
        /// Mark id of the thread.
        mark_id: ThreadId,
        /// Temporary id of the failed comment.
        temp_id: Uuid,
    },
    /// A failed comment is being resubmitted.
    NewCommentTryAgain {
        /// Mark id of the thread.
        mark_id: ThreadId,
        /// Temporary id of the failed comment.
        temp_id: Uuid,
    },
    /// Full thread list refresh from the backend.
    SetThreads {
        /// Threads as fetched.
        threads: Vec<Thread>,
    },
    /// A thread was resolved.
    ResolveThread {
        /// Thread id or mark id.
        id: ThreadId,
    },
}

/// Anything that accepts dispatched actions.
pub trait Dispatch {
    /// Apply or record one action.
    fn dispatch(&mut self, action: Action);
}

impl Dispatch for Vec<Action> {
    fn dispatch(&mut self, action: Action) {
        self.push(action);
    }
}

/// Active threads plus selection/hover state.
#[derive(Debug, Clone, Default)]
pub struct ThreadStore {
    threads: Vec<Thread>,
    selected: Option<ThreadId>,
    highlighted: Option<ThreadId>,
    version: u64,
}

impl Dispatch for ThreadStore {
    fn dispatch(&mut self, action: Action) {
        self.reduce(&action);
    }
}

impl ThreadFilter for ThreadStore {
    fn is_hidden(&self, id: &ThreadId) -> bool {
        match self.thread(id) {
            None => true,
            Some(thread) => {
                thread.resolved
                    || matches!(thread.stage, ThreadStage::Draft | ThreadStage::Posting(_))
            }
        }
    }
}

impl ThreadStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Active threads, in insertion order.
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// Thread by mark id (or confirmed thread id).
    pub fn thread(&self, id: &ThreadId) -> Option<&Thread> {
        self.threads
            .iter()
            .find(|t| &t.mark_id == id)
            .or_else(|| self.threads.iter().find(|t| &t.id == id))
    }

    /// Returns `true` if an active thread is anchored at `mark_id`.
    pub fn has_thread(&self, mark_id: &ThreadId) -> bool {
        self.threads.iter().any(|t| &t.mark_id == mark_id)
    }

    /// Mark id of the open thread.
    pub fn selected_mark(&self) -> Option<&ThreadId> {
        self.selected.as_ref()
    }

    /// Mark id of the hovered thread.
    pub fn highlighted_mark(&self) -> Option<&ThreadId> {
        self.highlighted.as_ref()
    }

    /// Version, incremented by every state-changing action.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply an action. Actions that reference unknown threads or stale temporary ids leave
    /// the state unchanged.
    pub fn reduce(&mut self, action: &Action) {
        let changed = match action {
            Action::CreateNewCommentThread { id, index, length } => {
                if self.has_thread(id) {
                    false
                } else {
                    let anchor = AnchorSpan {
                        index: *index,
                        len: *length,
                    };
                    self.threads.push(Thread::draft(id.clone(), anchor, now_ms()));
                    true
                }
            }
            Action::CancelNewCommentThread { id } => {
                let before = self.threads.len();
                self.threads
                    .retain(|t| !(&t.mark_id == id && t.stage == ThreadStage::Draft));
                let removed = self.threads.len() != before;
                if removed {
                    self.clear_references(id);
                }
                removed
            }
            Action::SelectCommentThread { mark_id } => {
                self.selected = Some(mark_id.clone());
                if self.highlighted.as_ref() == Some(mark_id) {
                    self.highlighted = None;
                }
                true
            }
            Action::DeselectCommentThread => self.selected.take().is_some(),
            Action::HighlightCommentThread { mark_id } => {
                self.highlighted.replace(mark_id.clone()).as_ref() != Some(mark_id)
            }
            Action::UnhighlightCommentThread => self.highlighted.take().is_some(),
            Action::NewCommentDispatched { mark_id, comment } => {
                self.apply_dispatched(mark_id, comment.clone())
            }
            Action::NewCommentPosted {
                mark_id,
                temp_id,
                comment_id,
                thread_id,
            } => self.apply_posted(mark_id, *temp_id, comment_id, thread_id),
            Action::NewCommentError { mark_id, temp_id } => {
                self.set_delivery(mark_id, *temp_id, Delivery::Pending, Delivery::Failed)
            }
            Action::NewCommentTryAgain { mark_id, temp_id } => {
                self.set_delivery(mark_id, *temp_id, Delivery::Failed, Delivery::Pending)
            }
            Action::SetThreads { threads } => {
                self.apply_set_threads(threads);
                true
            }
            Action::ResolveThread { id } => {
                let Some(pos) = self
                    .threads
                    .iter()
                    .position(|t| &t.id == id || &t.mark_id == id)
                else {
                    return;
                };
                let thread = self.threads.remove(pos);
                self.clear_references(&thread.mark_id);
                true
            }
        };

        if changed {
            self.version += 1;
        }
    }

    fn clear_references(&mut self, mark_id: &ThreadId) {
        if self.selected.as_ref() == Some(mark_id) {
            self.selected = None;
        }
        if self.highlighted.as_ref() == Some(mark_id) {
            self.highlighted = None;
        }
    }

    fn thread_mut(&mut self, mark_id: &ThreadId) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| &t.mark_id == mark_id)
    }

    fn apply_dispatched(&mut self, mark_id: &ThreadId, comment: Comment) -> bool {
        let Some(thread) = self.thread_mut(mark_id) else {
            tracing::warn!(thread = %mark_id, "comment dispatched for unknown thread");
            return false;
        };
        match &mut thread.stage {
            ThreadStage::Draft => thread.stage = ThreadStage::Posting(Comments::one(comment)),
            ThreadStage::Posting(comments) | ThreadStage::Created(comments) => {
                comments.push(comment)
            }
        }
        true
    }

    fn apply_posted(
        &mut self,
        mark_id: &ThreadId,
        temp_id: Uuid,
        comment_id: &str,
        thread_id: &ThreadId,
    ) -> bool {
        let Some(thread) = self.thread_mut(mark_id) else {
            tracing::warn!(thread = %mark_id, "confirmation for unknown thread ignored");
            return false;
        };
        let Some(comment) = thread
            .comments_mut()
            .and_then(|comments| comments.find_temp_mut(temp_id))
        else {
            tracing::warn!(thread = %mark_id, %temp_id, "stale confirmation ignored");
            return false;
        };
        comment.id = CommentId::Confirmed(comment_id.to_string());
        comment.delivery = Delivery::Sent;

        thread.id = thread_id.clone();
        let stage = std::mem::replace(&mut thread.stage, ThreadStage::Draft);
        thread.stage = match stage {
            ThreadStage::Posting(comments) => ThreadStage::Created(comments),
            other => other,
        };
        tracing::debug!(thread = %thread.id, mark = %mark_id, "comment confirmed");
        true
    }

    fn set_delivery(&mut self, mark_id: &ThreadId, temp_id: Uuid, from: Delivery, to: Delivery) -> bool {
        let Some(comment) = self
            .thread_mut(mark_id)
            .and_then(Thread::comments_mut)
            .and_then(|comments| comments.find_temp_mut(temp_id))
        else {
            tracing::warn!(thread = %mark_id, %temp_id, "delivery update for unknown comment ignored");
            return false;
        };
        if comment.delivery != from {
            return false;
        }
        comment.delivery = to;
        true
    }

    fn apply_set_threads(&mut self, incoming: &[Thread]) {
        let mut next: Vec<Thread> = Vec::with_capacity(incoming.len());
        for thread in incoming.iter().filter(|t| !t.resolved) {
            let mut thread = thread.clone();
            if let Some(local) = self.threads.iter().find(|t| t.mark_id == thread.mark_id) {
                let failed = local.failed_comments();
                if !failed.is_empty() {
                    match thread.comments_mut() {
                        Some(comments) => {
                            for comment in failed {
                                comments.push(comment);
                            }
                        }
                        None => thread.stage = local.stage.clone(),
                    }
                }
            }
            next.push(thread);
        }

        // Local threads the backend does not know yet, or that hold unsent failures.
        for local in &self.threads {
            let known = next.iter().any(|t| t.mark_id == local.mark_id);
            let unconfirmed = matches!(local.stage, ThreadStage::Draft | ThreadStage::Posting(_));
            if !known && (unconfirmed || local.has_error()) {
                next.push(local.clone());
            }
        }

        self.threads = next;
    }

    /// Prepare an optimistic submission of `body` to the thread at `mark_id`.
    ///
    /// Returns the backend request plus the `NewCommentDispatched` action to dispatch.
    pub fn prepare_submit(
        &self,
        mark_id: &ThreadId,
        user_id: u64,
        body: &str,
    ) -> Option<(Submission, Action)> {
        let thread = self.threads.iter().find(|t| &t.mark_id == mark_id)?;
        let comment = Comment::local(user_id, body, now_ms());
        let temp_id = comment.temp_id()?;
        let target = match &thread.stage {
            ThreadStage::Draft => SubmitTarget::NewThread {
                anchor: thread.anchor,
            },
            ThreadStage::Posting(_) | ThreadStage::Created(_) => SubmitTarget::Reply {
                thread_id: thread.id.clone(),
            },
        };
        let submission = Submission {
            mark_id: mark_id.clone(),
            temp_id,
            target,
            body: body.to_string(),
            mentions: comment.mentioned_user_ids(),
        };
        let action = Action::NewCommentDispatched {
            mark_id: mark_id.clone(),
            comment,
        };
        Some((submission, action))
    }

    /// Prepare a retry of the first failed comment of the thread at `mark_id`.
    ///
    /// Returns the backend request plus the `NewCommentTryAgain` action to dispatch.
    pub fn prepare_retry(&self, mark_id: &ThreadId) -> Option<(Submission, Action)> {
        let thread = self.threads.iter().find(|t| &t.mark_id == mark_id)?;
        let route = retry_route(thread)?;
        let comment = route.comment();
        let temp_id = comment.temp_id()?;
        let target = match route {
            RetryRoute::NewThread { .. } => SubmitTarget::NewThread {
                anchor: thread.anchor,
            },
            RetryRoute::ExistingComment { .. } => SubmitTarget::Reply {
                thread_id: thread.id.clone(),
            },
        };
        let submission = Submission {
            mark_id: mark_id.clone(),
            temp_id,
            target,
            body: comment.comment.clone(),
            mentions: comment.mentioned_user_ids(),
        };
        let action = Action::NewCommentTryAgain {
            mark_id: mark_id.clone(),
            temp_id,
        };
        Some((submission, action))
    }
}

/// How a failed comment must be resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryRoute<'a> {
    /// The failed comment is the thread's only comment: the thread itself was never created.
    NewThread {
        /// The failed comment.
        comment: &'a Comment,
    },
    /// The thread exists; resubmit the failed comment into it.
    ExistingComment {
        /// The failed comment.
        comment: &'a Comment,
    },
}

impl<'a> RetryRoute<'a> {
    /// The comment to resubmit.
    pub fn comment(&self) -> &'a Comment {
        match self {
            RetryRoute::NewThread { comment } | RetryRoute::ExistingComment { comment } => comment,
        }
    }
}

/// Decide how to retry the first failed comment of `thread`; `None` when nothing failed.
pub fn retry_route(thread: &Thread) -> Option<RetryRoute<'_>> {
    let comments = thread.comments();
    let failed = comments.iter().copied().find(|c| c.has_error())?;
    if comments.len() == 1 {
        Some(RetryRoute::NewThread { comment: failed })
    } else {
        Some(RetryRoute::ExistingComment { comment: failed })
    }
}

/// Backend endpoint a submission goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitTarget {
    /// Create the thread together with its first comment.
    NewThread {
        /// Selection the draft was created for.
        anchor: Option<AnchorSpan>,
    },
    /// Add a comment to an existing thread.
    Reply {
        /// Thread id as currently known.
        thread_id: ThreadId,
    },
}

/// Backend answer for a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    /// Confirmed thread id.
    pub thread_id: ThreadId,
    /// Confirmed comment id.
    pub comment_id: String,
}

/// Submission failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The request failed or was rejected.
    #[error("comment submission failed: {0}")]
    Backend(String),
}

/// A comment in flight to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Mark id of the thread.
    pub mark_id: ThreadId,
    /// Temporary id of the optimistic comment.
    pub temp_id: Uuid,
    /// Endpoint to call.
    pub target: SubmitTarget,
    /// Comment body.
    pub body: String,
    /// Mentioned user ids, for notification fan-out.
    pub mentions: Vec<u64>,
}

impl Submission {
    /// Turn the backend answer into the action to dispatch.
    pub fn settle(&self, result: Result<Confirmation, SubmitError>) -> Action {
        match result {
            Ok(confirmation) => Action::NewCommentPosted {
                mark_id: self.mark_id.clone(),
                temp_id: self.temp_id,
                comment_id: confirmation.comment_id,
                thread_id: confirmation.thread_id,
            },
            Err(err) => {
                tracing::warn!(thread = %self.mark_id, %err, "comment submission failed");
                Action::NewCommentError {
                    mark_id: self.mark_id.clone(),
                    temp_id: self.temp_id,
                }
            }
        }
    }
}
