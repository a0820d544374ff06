#![warn(missing_docs)]
//! Margin Core - Headless Comment Anchoring Engine
//!
//! # Overview
//!
//! `margin-core` anchors discussion threads to ranges of a rich-text document and keeps them
//! anchored while the document is edited. It owns no rendering: the upper layer supplies
//! geometry (anchor rects, card heights) and receives thread card positions back.
//!
//! # Core Features
//!
//! - **Durable marks**: thread ids are stored as a document attribute, so anchors move with
//!   the text they annotate and survive collaborative edits
//! - **Overlapping threads**: one run may carry several thread ids; creating or removing a
//!   thread never disturbs the others
//! - **Cross-editor selection**: one router decides which thread is open or hovered, across the
//!   main body and every embedded sub-document
//! - **Optimistic thread state**: drafts, in-flight comments and failed submissions are
//!   explicit states, and failed text is never discarded
//! - **Comment rail layout**: deterministic stacking of thread cards beside their anchors
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  CommentWorkspace                           │  ← Public API
//! ├──────────────────────┬──────────────────────┤
//! │  MarkRouter          │  Layout + Reflow     │  ← Interaction / Positioning
//! ├──────────────────────┼──────────────────────┤
//! │  MarkManager         │  ThreadStore         │  ← Mark lifecycle / App state
//! ├──────────────────────┴──────────────────────┤
//! │  Document + Mark attribute                  │  ← Attributed range store
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use margin_core::{
//!     CommentWorkspace, Document, FixedGeometry, MAIN_EDITOR, MarginConfig, Rect, SelectionKind,
//! };
//!
//! let mut ws = CommentWorkspace::new(FixedGeometry::new(), MarginConfig::default());
//! ws.open_document(MAIN_EDITOR, Document::from_text("The quick brown fox"));
//!
//! let created = ws.create_thread(MAIN_EDITOR, 4, 5, SelectionKind::Text).unwrap();
//! ws.geometry_mut().set_anchor(created.id.clone(), Rect::new(120.0, 40.0, 60.0, 18.0));
//!
//! let cards = ws.layout();
//! assert_eq!(cards.len(), 1);
//! assert_eq!(cards[0].top, 120.0);
//! ```
//!
//! # Module Description
//!
//! - [`marks`] - Mark attribute, thread ids and the filtered id view
//! - [`document`] - Rich-text document with line/run traversal
//! - [`lifecycle`] - Mark creation/removal and the anchor index
//! - [`router`] - Selection and hover routing
//! - [`threads`] - Thread state reducer and optimistic submission
//! - [`layout`] - Comment rail layout
//! - [`reflow`] - Layout scheduling
//! - [`config`] - Tunable constants
//! - [`workspace`] - Everything wired together
//!
//! Comment bodies are tokenized by the companion `margin-mentions` crate, re-exported here as
//! [`mentions`].

pub mod config;
pub mod document;
pub mod layout;
pub mod lifecycle;
pub mod marks;
pub mod reflow;
pub mod router;
pub mod threads;
pub mod workspace;

pub use margin_mentions as mentions;

pub use config::{ConfigError, MarginConfig};
pub use document::{
    ChangeKind, Document, DocumentChange, DocumentChangeCallback, DocumentError, Embed,
    EmbedKey, EmbedPlacement, EmbedSize, EmbedSpec, Leaf, LineKind, LineRef, MarkedSpan, RunRef,
    Source,
};
pub use layout::{
    FixedGeometry, GeometryProvider, Rect, ScrollOffsets, SortedThread, ThreadAnchor, layout,
};
pub use lifecycle::{
    AnchorIndex, DocumentSet, EditorId, MarkManager, NewThread, RangeSegment, SelectionKind,
    decompose,
};
pub use marks::{Mark, ShowAll, ThreadFilter, ThreadId, create_mark, formats_of, ids_of};
pub use reflow::{ReflowScheduler, ReflowTrigger};
pub use router::{
    MarkRouter, MarkState, MarkTransition, PointerEvent, PointerKind, RouterHost, Viewport,
};
pub use threads::{
    Action, AnchorSpan, Comment, CommentId, Comments, Confirmation, Delivery, Dispatch,
    RetryRoute, SubmitError, SubmitTarget, Submission, Thread, ThreadStage, ThreadStatus,
    ThreadStore, retry_route,
};
pub use workspace::{ActionCallback, CommentWorkspace, MAIN_EDITOR};
