//! Bounded undo/redo over the tile and ent grids of one map.

mod action;

pub use action::{Action, EntAction, TileAction};

use crate::world::{EntGrid, TileGrid};
use std::collections::VecDeque;

pub const DEFAULT_UNDO_MAX: usize = 30;

/// Undo and redo stacks. The undo stack never holds more than `max` actions;
/// the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<Action>,
    redo: VecDeque<Action>,
    max: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_MAX)
    }
}

impl History {
    pub fn new(max: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            max,
        }
    }

    /// Apply `action` and record it. Clears the redo stack.
    pub fn execute(&mut self, action: Action, tiles: &mut TileGrid, ents: &mut EntGrid) {
        action.apply(tiles, ents);
        self.undo.push_back(action);
        self.trim();
        self.redo.clear();
    }

    /// Revert the latest action. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self, tiles: &mut TileGrid, ents: &mut EntGrid) -> bool {
        let Some(action) = self.undo.pop_back() else {
            return false;
        };
        action.revert(tiles, ents);
        self.redo.push_back(action);
        true
    }

    /// Re-apply the latest undone action. Returns `false` if there was none.
    pub fn redo(&mut self, tiles: &mut TileGrid, ents: &mut EntGrid) -> bool {
        let Some(action) = self.redo.pop_back() else {
            return false;
        };
        action.apply(tiles, ents);
        self.undo.push_back(action);
        true
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Change the depth limit, evicting the oldest actions if needed.
    pub fn set_max(&mut self, max: usize) {
        self.max = max;
        self.trim();
    }

    fn trim(&mut self) {
        while self.undo.len() > self.max {
            self.undo.pop_front();
        }
    }
}
