//! Decides when the layout pass must re-run.
//!
//! Layout is recomputed from scratch, never patched, so the scheduler only tracks whether a
//! recompute is owed. Window resizes arrive in bursts and are debounced; every other trigger
//! is due immediately.

use std::time::{Duration, Instant};

/// Why a layout recompute was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReflowTrigger {
    /// Threads were added, removed, resolved or changed state.
    ThreadsChanged,
    /// An anchor disappeared from a document.
    Reposition,
    /// A thread card changed size.
    PanelResized,
    /// The window was resized (debounced).
    WindowResized,
}

/// Tracks owed layout recomputes.
#[derive(Debug, Clone)]
pub struct ReflowScheduler {
    debounce: Duration,
    due_now: bool,
    resize_due: Option<Instant>,
}

impl Default for ReflowScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::RESIZE_DEBOUNCE_MS))
    }
}

impl ReflowScheduler {
    /// Create a scheduler with the given window-resize debounce.
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            due_now: false,
            resize_due: None,
        }
    }

    /// Record a trigger observed at `now`.
    pub fn request(&mut self, trigger: ReflowTrigger, now: Instant) {
        match trigger {
            ReflowTrigger::WindowResized => self.resize_due = Some(now + self.debounce),
            ReflowTrigger::ThreadsChanged
            | ReflowTrigger::Reposition
            | ReflowTrigger::PanelResized => self.due_now = true,
        }
    }

    /// When the next debounced recompute falls due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.resize_due
    }

    /// Returns `true` if nothing is owed.
    pub fn is_idle(&self) -> bool {
        !self.due_now && self.resize_due.is_none()
    }

    /// Returns `true` (and resets) when a recompute should run at `now`.
    ///
    /// An immediate trigger also absorbs a pending debounced resize: the recompute it causes
    /// already sees the latest geometry.
    pub fn take_due(&mut self, now: Instant) -> bool {
        let resize_ready = self.resize_due.is_some_and(|due| now >= due);
        if !self.due_now && !resize_ready {
            return false;
        }
        self.due_now = false;
        self.resize_due = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_burst_yields_one_reflow() {
        let start = Instant::now();
        let mut scheduler = ReflowScheduler::default();
        for ms in [0, 40, 80, 120] {
            scheduler.request(ReflowTrigger::WindowResized, start + Duration::from_millis(ms));
        }
        assert!(!scheduler.take_due(start + Duration::from_millis(200)));
        assert!(scheduler.take_due(start + Duration::from_millis(270)));
        assert!(!scheduler.take_due(start + Duration::from_millis(400)));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_reposition_is_immediate() {
        let now = Instant::now();
        let mut scheduler = ReflowScheduler::default();
        scheduler.request(ReflowTrigger::WindowResized, now);
        scheduler.request(ReflowTrigger::Reposition, now);
        assert!(scheduler.take_due(now));
        assert!(scheduler.is_idle());
    }
}
