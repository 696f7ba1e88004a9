//! Per-page editing state: output order and deletion flags.
//!
//! Deleting a page only sets a flag; the collection keeps one entry per source
//! page until a rebuild reads it. Reordering swaps `current_position` values,
//! so positions stay a permutation of `0..len` at all times.

use crate::error::{PdfToolError, Result};
use crate::thumbnail::Thumbnail;

#[derive(Debug, Clone)]
pub struct PageEntry {
    current_position: usize,
    original_index: usize,
    deleted: bool,
    /// Preview owned by the UI side. The engine never reads it.
    pub thumbnail: Option<Thumbnail>,
}

impl PageEntry {
    pub fn current_position(&self) -> usize {
        self.current_position
    }

    pub fn original_index(&self) -> usize {
        self.original_index
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    pub total: usize,
    pub deleted: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PageCollection {
    entries: Vec<PageEntry>,
}

impl PageCollection {
    pub fn new(page_count: usize) -> Self {
        let entries = (0..page_count)
            .map(|index| PageEntry {
                current_position: index,
                original_index: index,
                deleted: false,
                thumbnail: None,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PageEntry] {
        &self.entries
    }

    pub fn entry_at(&self, position: usize) -> Option<&PageEntry> {
        self.entries
            .iter()
            .find(|entry| entry.current_position == position)
    }

    fn entry_at_mut(&mut self, position: usize) -> Option<&mut PageEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.current_position == position)
    }

    /// Flips the deletion flag of the page at `position` and returns the new flag.
    pub fn toggle_deleted(&mut self, position: usize) -> Result<bool> {
        let entry = self
            .entry_at_mut(position)
            .ok_or(PdfToolError::EntryNotFound { position })?;
        entry.deleted = !entry.deleted;
        log::debug!(
            "page {} (source {}) deleted={}",
            position,
            entry.original_index,
            entry.deleted
        );
        Ok(entry.deleted)
    }

    pub fn select_all(&mut self) {
        for entry in &mut self.entries {
            entry.deleted = true;
        }
    }

    pub fn restore_all(&mut self) {
        for entry in &mut self.entries {
            entry.deleted = false;
        }
    }

    /// Exchanges the positions of two pages. Returns `false` and changes
    /// nothing unless both positions are occupied and distinct.
    pub fn swap_positions(&mut self, a: usize, b: usize) -> bool {
        if a == b {
            return false;
        }
        let first = self.entries.iter().position(|e| e.current_position == a);
        let second = self.entries.iter().position(|e| e.current_position == b);
        match (first, second) {
            (Some(i), Some(j)) => {
                self.entries[i].current_position = b;
                self.entries[j].current_position = a;
                true
            }
            _ => false,
        }
    }

    pub fn stats(&self) -> PageStats {
        let total = self.entries.len();
        let deleted = self.entries.iter().filter(|e| e.deleted).count();
        PageStats {
            total,
            deleted,
            remaining: total - deleted,
        }
    }

    /// All entries, deleted ones included, sorted by current position.
    pub fn in_output_order(&self) -> Vec<&PageEntry> {
        let mut ordered: Vec<&PageEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|entry| entry.current_position);
        ordered
    }

    /// Source indices of the pages a rebuild would emit, in output order.
    pub fn surviving_original_indices(&self) -> Vec<usize> {
        self.in_output_order()
            .into_iter()
            .filter(|entry| !entry.deleted)
            .map(|entry| entry.original_index)
            .collect()
    }

    /// Associates a rendered preview with the entry for source page `original_index`.
    pub fn attach_thumbnail(&mut self, original_index: usize, thumbnail: Thumbnail) -> bool {
        match self.entries.get_mut(original_index) {
            Some(entry) => {
                entry.thumbnail = Some(thumbnail);
                true
            }
            None => false,
        }
    }
}
