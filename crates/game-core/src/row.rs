//! Operations on a single packed board row.
//!
//! A row is a `u16` holding four 4-bit tile exponents. The most significant
//! nibble is the leftmost cell:
//!
//! ```text
//!   bits 15..12 | 11..8 | 7..4 | 3..0
//!   cell  0     |  1    |  2   |  3
//! ```

use crate::constants::{MAX_EXPONENT, TILE_VALUES};

/// Splits a packed row into its four tile exponents, leftmost first.
#[inline]
pub const fn unpack_row(row: u16) -> [u8; 4] {
    [
        ((row >> 12) & 0xF) as u8,
        ((row >> 8) & 0xF) as u8,
        ((row >> 4) & 0xF) as u8,
        (row & 0xF) as u8,
    ]
}

/// Packs four tile exponents (leftmost first) into a row.
///
/// Exponents are masked to 4 bits.
#[inline]
pub const fn pack_row(cells: [u8; 4]) -> u16 {
    ((cells[0] as u16 & 0xF) << 12)
        | ((cells[1] as u16 & 0xF) << 8)
        | ((cells[2] as u16 & 0xF) << 4)
        | (cells[3] as u16 & 0xF)
}

/// Reverses the nibble order of a row.
///
/// Used to express right and down moves through the left-move table.
#[inline]
pub const fn reverse_row(row: u16) -> u16 {
    let r = row.rotate_left(8);
    ((r & 0x0F0F) << 4) | ((r & 0xF0F0) >> 4)
}

/// Returns `true` if sliding the row to the left would change it.
#[inline]
pub const fn row_can_move_left(row: u16) -> bool {
    let [t0, t1, t2, t3] = unpack_row(row);

    (t0 == 0 && (t1 | t2 | t3) != 0)
        || (t1 == 0 && (t2 | t3) != 0)
        || (t2 == 0 && t3 != 0)
        || can_merge(t0, t1)
        || can_merge(t1, t2)
        || can_merge(t2, t3)
}

#[inline]
const fn can_merge(a: u8, b: u8) -> bool {
    a != 0 && a == b && a < MAX_EXPONENT
}

/// Moves every non-empty tile to the left, keeping their order.
fn compact(cells: &mut [u8; 4]) {
    let mut write = 0;
    for read in 0..4 {
        if cells[read] != 0 {
            cells[write] = cells[read];
            write += 1;
        }
    }
    cells[write..].fill(0);
}

/// Slides a row to the left by direct simulation.
///
/// Compacts, runs a single left-to-right merge pass in which every tile merges
/// at most once, then compacts again. Returns the resulting row and the sum of
/// the values of the tiles created by merges.
pub fn shift_row_left(row: u16) -> (u16, u32) {
    let mut cells = unpack_row(row);
    compact(&mut cells);

    let mut score = 0;
    let mut i = 0;
    while i < 3 {
        if can_merge(cells[i], cells[i + 1]) {
            cells[i] += 1;
            cells[i + 1] = 0;
            score += TILE_VALUES[cells[i] as usize];
            i += 2;
        } else {
            i += 1;
        }
    }

    compact(&mut cells);
    (pack_row(cells), score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_row() {
        assert_eq!(pack_row([1, 2, 3, 4]), 0b0001_0010_0011_0100);
        assert_eq!(pack_row([15, 15, 15, 15]), 0xFFFF);
        assert_eq!(pack_row([0, 0, 0, 0]), 0);
        assert_eq!(pack_row([8, 4, 2, 1]), 0b1000_0100_0010_0001);
    }

    #[test]
    fn test_unpack_row() {
        assert_eq!(unpack_row(0b0001_0010_0011_0100), [1, 2, 3, 4]);
        assert_eq!(unpack_row(0xFFFF), [15, 15, 15, 15]);
        assert_eq!(unpack_row(0), [0, 0, 0, 0]);
        assert_eq!(unpack_row(0b1000_0100_0010_0001), [8, 4, 2, 1]);
    }

    #[test]
    fn test_pack_unpack_all_rows() {
        for row in 0..=u16::MAX {
            assert_eq!(pack_row(unpack_row(row)), row);
        }
    }

    #[test]
    fn test_reverse_row() {
        assert_eq!(reverse_row(0b1000_0101_1111_1010), 0b1010_1111_0101_1000);
        assert_eq!(reverse_row(0x1234), 0x4321);
    }

    #[test]
    fn test_reverse_row_is_involution() {
        for row in 0..=u16::MAX {
            assert_eq!(reverse_row(reverse_row(row)), row);
        }
    }

    #[test]
    fn test_shift_slides() {
        for row in [0x1000, 0x0100, 0x0010, 0x0001] {
            assert_eq!(shift_row_left(row), (0x1000, 0));
        }
        for row in [0x2100, 0x2010, 0x2001, 0x0210, 0x0201, 0x0021] {
            assert_eq!(shift_row_left(row), (0x2100, 0));
        }
        for row in [0x3210, 0x3201, 0x3021, 0x0321] {
            assert_eq!(shift_row_left(row), (0x3210, 0));
        }
    }

    #[test]
    fn test_shift_merges() {
        assert_eq!(shift_row_left(0x0000), (0x0000, 0));
        assert_eq!(shift_row_left(0x1234), (0x1234, 0));
        assert_eq!(shift_row_left(0x1100), (0x2000, 4));
        assert_eq!(shift_row_left(0x1010), (0x2000, 4));
        assert_eq!(shift_row_left(0x0011), (0x2000, 4));
        assert_eq!(shift_row_left(0x1122), (0x2300, 12));
        assert_eq!(shift_row_left(0x1102), (0x2200, 4));
        assert_eq!(shift_row_left(0x1221), (0x1310, 8));
        assert_eq!(shift_row_left(0x1111), (0x2200, 8));
        assert_eq!(shift_row_left(0x2220), (0x3200, 8));
    }

    #[test]
    fn test_max_tiles_do_not_merge() {
        assert_eq!(shift_row_left(0xFF00), (0xFF00, 0));
        assert_eq!(shift_row_left(0xEE00), (0xF000, 32768));
        assert!(!row_can_move_left(0xFF00));
    }

    #[test]
    fn test_row_can_move_left() {
        assert!(!row_can_move_left(0x0000));
        assert!(!row_can_move_left(0x1234));
        assert!(!row_can_move_left(0x1000));
        assert!(row_can_move_left(0x0001));
        assert!(row_can_move_left(0x1120));
        assert!(row_can_move_left(0x1203));
    }
}
