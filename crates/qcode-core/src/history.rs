//! Undo/redo for whole-document edits
//!
//! Edits replace the full content, so history stores full snapshots rather
//! than deltas. Two stacks: snapshots that can be undone and snapshots that
//! can be redone. Any new edit after an undo discards the redo stack.
//!
//! `EditSession` ties a document to its history and to the edit claim: it
//! refuses every mutation while the tab does not hold the file.

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::models::Document;

/// Linear undo/redo stack of content snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditHistory {
    undo_stack: Vec<String>,
    redo_stack: Vec<String>,
    limit: Option<usize>,
}

impl EditHistory {
    /// Create an unbounded history
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history keeping at most `limit` undo snapshots
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Record the content as it was before a mutating edit
    pub fn push(&mut self, prior_content: impl Into<String>) {
        self.undo_stack.push(prior_content.into());
        self.redo_stack.clear();
        if let Some(limit) = self.limit {
            if self.undo_stack.len() > limit {
                let excess = self.undo_stack.len() - limit;
                self.undo_stack.drain(..excess);
            }
        }
    }

    /// Step back: returns the previous content, saving `current` for redo
    pub fn undo(&mut self, current: impl Into<String>) -> Option<String> {
        let previous = self.undo_stack.pop()?;
        self.redo_stack.push(current.into());
        Some(previous)
    }

    /// Step forward: returns the undone content, saving `current` for undo
    pub fn redo(&mut self, current: impl Into<String>) -> Option<String> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(current.into());
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

/// A document open for editing in one tab
#[derive(Debug, Clone)]
pub struct EditSession {
    document: Document,
    history: EditHistory,
    editable: bool,
}

impl EditSession {
    /// Open a read-only session; call `set_editable(true)` once the file is claimed
    pub fn new(document: Document, history: EditHistory) -> Self {
        Self {
            document,
            history,
            editable: false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Open or close the edit gate
    pub fn set_editable(&mut self, editable: bool) {
        if self.editable != editable {
            debug!("Edit session editable={}", editable);
        }
        self.editable = editable;
    }

    /// Replace the content, recording the prior content for undo
    pub fn apply(&mut self, content: impl Into<String>) -> CoreResult<()> {
        self.ensure_editable()?;
        let content = content.into();
        if content == self.document.content() {
            return Ok(());
        }
        let prior = self.document.replace(content);
        self.history.push(prior);
        Ok(())
    }

    /// Undo the last edit; returns whether anything changed
    pub fn undo(&mut self) -> CoreResult<bool> {
        self.ensure_editable()?;
        let current = self.document.content().to_string();
        match self.history.undo(current) {
            Some(previous) => {
                self.document.replace(previous);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Redo the last undone edit; returns whether anything changed
    pub fn redo(&mut self) -> CoreResult<bool> {
        self.ensure_editable()?;
        let current = self.document.content().to_string();
        match self.history.redo(current) {
            Some(next) => {
                self.document.replace(next);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn ensure_editable(&self) -> CoreResult<()> {
        if self.editable {
            Ok(())
        } else {
            Err(CoreError::ReadOnly)
        }
    }
}
