// SPDX-License-Identifier: AGPL-3.0-or-later
//! # Undo/Redo History
//!
//! Snapshot based: every successful command records the tree it replaced.
//!
//! - Undo swaps the current tree with the latest recorded snapshot
//! - Redo swaps it back
//! - Recording a new snapshot clears the redo stack
//! - The undo stack is bounded; the oldest entries fall off first

use folio_core::Node;
use std::collections::VecDeque;
use std::sync::Arc;

/// A recorded tree plus the name of the command that replaced it
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub snapshot: Arc<Node>,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct History {
    /// Oldest first
    undo_stack: VecDeque<HistoryEntry>,

    /// Most recently undone last
    redo_stack: Vec<HistoryEntry>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,
}

impl History {
    /// History with the default of 100 levels
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_levels,
        }
    }

    /// Record the tree a command is about to replace
    pub fn record(&mut self, previous: Arc<Node>, description: &'static str) {
        self.undo_stack.push_back(HistoryEntry {
            snapshot: previous,
            description,
        });
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Step back from `current`; returns the tree to restore
    pub fn undo(&mut self, current: Arc<Node>) -> Option<Arc<Node>> {
        let entry = self.undo_stack.pop_back()?;
        self.redo_stack.push(HistoryEntry {
            snapshot: current,
            description: entry.description,
        });
        Some(entry.snapshot)
    }

    /// Step forward from `current`; returns the tree to restore
    pub fn redo(&mut self, current: Arc<Node>) -> Option<Arc<Node>> {
        let entry = self.redo_stack.pop()?;
        self.undo_stack.push_back(HistoryEntry {
            snapshot: current,
            description: entry.description,
        });
        Some(entry.snapshot)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Name of the command the next undo reverts
    pub fn undo_description(&self) -> Option<&'static str> {
        self.undo_stack.back().map(|e| e.description)
    }

    pub fn redo_description(&self) -> Option<&'static str> {
        self.redo_stack.last().map(|e| e.description)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
