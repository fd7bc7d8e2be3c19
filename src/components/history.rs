use std::collections::VecDeque;

use crate::canvas::{CanvasState, LabelBuffer};

// ============================================================================
// CANVAS SNAPSHOT – deep copy of every layer's label buffer
// ============================================================================

/// Immutable copy of all layer masks, tagged with the action it precedes.
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasSnapshot {
    pub description: String,
    pub masks: Vec<LabelBuffer>,
}

impl CanvasSnapshot {
    pub fn capture(description: impl Into<String>, state: &CanvasState) -> Self {
        Self {
            description: description.into(),
            masks: state.layers.iter().map(|l| l.mask().clone()).collect(),
        }
    }

    /// Write the stored masks back into the matching layers.
    pub fn restore_into(self, state: &mut CanvasState) {
        if let Some(first) = self.masks.first() {
            state.width = first.width();
            state.height = first.height();
        }
        for (layer, mask) in state.layers.iter_mut().zip(self.masks) {
            layer.set_mask(mask);
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.masks.iter().map(|m| m.memory_bytes()).sum::<usize>() + self.description.len()
    }
}

// ============================================================================
// HISTORY MANAGER – undo/redo stacks with count and memory limits
// ============================================================================

/// Undo/redo history of full canvas snapshots.
///
/// `snapshot` is taken *before* a mutation.  Undo and redo exchange the
/// current state with the top of the opposite stack, so both directions
/// always restore a complete state.
pub struct HistoryManager {
    undo_stack: VecDeque<CanvasSnapshot>,
    redo_stack: VecDeque<CanvasSnapshot>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(200)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes: Some(512 * 1024 * 1024),
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_memory_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_memory_bytes;
        self
    }

    /// Record the current state before a mutation. Clears the redo stack.
    pub fn snapshot(&mut self, description: impl Into<String>, canvas: &CanvasState) {
        for entry in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(entry.memory_bytes());
        }
        let entry = CanvasSnapshot::capture(description, canvas);
        self.total_memory += entry.memory_bytes();
        self.undo_stack.push_back(entry);
        self.prune();
    }

    pub fn undo(&mut self, canvas: &mut CanvasState) -> Option<String> {
        let entry = self.undo_stack.pop_back()?;
        let description = entry.description.clone();
        let current = CanvasSnapshot::capture(description.clone(), canvas);
        self.total_memory = self.total_memory.saturating_sub(entry.memory_bytes()) + current.memory_bytes();
        self.redo_stack.push_back(current);
        entry.restore_into(canvas);
        Some(description)
    }

    pub fn redo(&mut self, canvas: &mut CanvasState) -> Option<String> {
        let entry = self.redo_stack.pop_back()?;
        let description = entry.description.clone();
        let current = CanvasSnapshot::capture(description.clone(), canvas);
        self.total_memory = self.total_memory.saturating_sub(entry.memory_bytes()) + current.memory_bytes();
        self.undo_stack.push_back(current);
        entry.restore_into(canvas);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|e| e.description.as_str())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|e| e.description.clone()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        let before = self.undo_stack.len();
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_bytes());
            }
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_bytes());
                }
            }
        }
        let dropped = before - self.undo_stack.len();
        if dropped > 0 {
            crate::log_info!("History: pruned {} oldest step(s), {} bytes held", dropped, self.total_memory);
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}
