//! Precomputed left-move results for every possible row.
//!
//! The table is indexed by the raw 16-bit row encoding. Right, up and down
//! moves reuse it through row reversal and board transposition, so applying a
//! move costs four lookups.

use bytemuck::{Pod, Zeroable};

use crate::constants::ROW_COUNT;
use crate::row::shift_row_left;

/// Result of sliding one row to the left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RowEntry {
    /// Row after compaction and merging.
    pub result: u16,
    _pad: u16,
    /// Sum of the values of the tiles created by merges.
    pub score: u32,
}

/// A complete table, one entry per row encoding.
pub type RowTable = [RowEntry; ROW_COUNT];

impl RowEntry {
    /// Creates an entry from a result row and its score delta.
    pub const fn new(result: u16, score: u32) -> Self {
        RowEntry {
            result,
            _pad: 0,
            score,
        }
    }

    /// Computes the entry for a single row.
    pub fn for_row(row: u16) -> Self {
        let (result, score) = shift_row_left(row);
        RowEntry::new(result, score)
    }
}

/// Owned move lookup table.
pub struct MoveTable {
    entries: Box<RowTable>,
}

impl MoveTable {
    /// Builds the table by simulating every row encoding.
    pub fn build() -> Self {
        let mut entries: Box<RowTable> = bytemuck::zeroed_box();
        fill(&mut entries[..]);
        MoveTable { entries }
    }

    /// Returns the table for use by the board engine.
    #[inline]
    pub fn table(&self) -> &RowTable {
        &self.entries
    }

    /// Returns the entry for a row.
    #[inline]
    pub fn get(&self, row: u16) -> RowEntry {
        self.entries[row as usize]
    }
}

impl Default for MoveTable {
    fn default() -> Self {
        Self::build()
    }
}

/// Fills `entries[i]` with the entry for row `i`.
///
/// Used to build a table in place, e.g. inside a shared-memory segment.
///
/// # Panics
///
/// Panics if `entries` does not hold exactly [`ROW_COUNT`] entries.
pub fn fill(entries: &mut [RowEntry]) {
    assert_eq!(entries.len(), ROW_COUNT, "a row table has exactly {ROW_COUNT} entries");
    for (row, entry) in entries.iter_mut().enumerate() {
        *entry = RowEntry::for_row(row as u16);
    }
}

/// Views a slice of exactly [`ROW_COUNT`] entries as a table.
pub fn as_table(entries: &[RowEntry]) -> Option<&RowTable> {
    entries.try_into().ok()
}
