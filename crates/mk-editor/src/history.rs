//! Snapshot-based undo/redo history.
//!
//! The unit of history is a full `AnnotationSnapshot` captured *before* each
//! mutation — linear undo, no inverse-operation bookkeeping. Any new edit
//! clears the redo side. History is unbounded for the lifetime of one
//! editing session and is never persisted.

use mk_core::AnnotationSnapshot;

#[derive(Debug, Default)]
pub struct History {
    past: Vec<AnnotationSnapshot>,
    future: Vec<AnnotationSnapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pre-mutation snapshot. Invalidates redo.
    pub fn record(&mut self, pre_mutation: AnnotationSnapshot) {
        self.past.push(pre_mutation);
        self.future.clear();
    }

    /// Step back: returns the snapshot to restore, moving `current`
    /// onto the redo side. `None` when there is nothing to undo.
    pub fn undo(&mut self, current: AnnotationSnapshot) -> Option<AnnotationSnapshot> {
        let prev = self.past.pop()?;
        self.future.push(current);
        Some(prev)
    }

    /// Step forward: mirror of `undo`.
    pub fn redo(&mut self, current: AnnotationSnapshot) -> Option<AnnotationSnapshot> {
        let next = self.future.pop()?;
        self.past.push(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }
}
