//! 2048 board representation using four packed rows.

use std::fmt;

use crate::constants::{BOARD_CELLS, BOARD_SIZE, CORNER_CELLS, TILE_VALUES};
use crate::lookup_table::RowTable;
use crate::moves::{Direction, DOWN, LEFT, MoveSet, RIGHT, UP};
use crate::row::{pack_row, reverse_row, row_can_move_left, unpack_row};

/// A 4x4 board of tile exponents.
///
/// Each row is a `u16` of four nibbles (see [`crate::row`]); row 0 is the top
/// row. A nibble of 0 is an empty cell, `e > 0` is a tile of value `2^e`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Board {
    rows: [u16; 4],
}

impl Board {
    /// Creates an empty board.
    pub const fn empty() -> Board {
        Board { rows: [0; 4] }
    }

    /// Creates a board from four packed rows, top row first.
    pub const fn from_rows(rows: [u16; 4]) -> Board {
        Board { rows }
    }

    /// Creates a board from 16 exponents in row-major order.
    pub fn from_cells(cells: [u8; BOARD_CELLS]) -> Board {
        let mut rows = [0; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            let base = i * BOARD_SIZE;
            *row = pack_row([cells[base], cells[base + 1], cells[base + 2], cells[base + 3]]);
        }
        Board { rows }
    }

    /// Decodes the 64-bit wire encoding, most significant row first.
    pub const fn from_packed(packed: u64) -> Board {
        Board {
            rows: [
                (packed >> 48) as u16,
                (packed >> 32) as u16,
                (packed >> 16) as u16,
                packed as u16,
            ],
        }
    }

    /// Encodes the board for the wire: `r0 << 48 | r1 << 32 | r2 << 16 | r3`.
    #[inline]
    pub const fn to_packed(&self) -> u64 {
        ((self.rows[0] as u64) << 48)
            | ((self.rows[1] as u64) << 32)
            | ((self.rows[2] as u64) << 16)
            | self.rows[3] as u64
    }

    /// Returns the packed rows, top row first.
    #[inline]
    pub const fn rows(&self) -> [u16; 4] {
        self.rows
    }

    /// Returns all 16 exponents in row-major order.
    pub fn cells(&self) -> [u8; BOARD_CELLS] {
        let mut cells = [0; BOARD_CELLS];
        for (i, &row) in self.rows.iter().enumerate() {
            cells[i * BOARD_SIZE..(i + 1) * BOARD_SIZE].copy_from_slice(&unpack_row(row));
        }
        cells
    }

    /// Returns the exponent at `index` (row-major).
    #[inline]
    pub fn get(&self, index: usize) -> u8 {
        debug_assert!(index < BOARD_CELLS);
        let shift = 4 * (3 - index % BOARD_SIZE);
        ((self.rows[index / BOARD_SIZE] >> shift) & 0xF) as u8
    }

    /// Places a tile on a cell that is currently empty.
    #[inline]
    pub fn set_empty_cell(&mut self, index: usize, exponent: u8) {
        debug_assert!(self.get(index) == 0, "cell {index} is occupied");
        let shift = 4 * (3 - index % BOARD_SIZE);
        self.rows[index / BOARD_SIZE] |= ((exponent & 0xF) as u16) << shift;
    }

    /// Exchanges rows and columns.
    #[inline]
    pub const fn transpose(&self) -> Board {
        let [r0, r1, r2, r3] = self.rows;
        Board {
            rows: [
                (r0 & 0xF000) | ((r1 & 0xF000) >> 4) | ((r2 & 0xF000) >> 8) | ((r3 & 0xF000) >> 12),
                ((r0 & 0x0F00) << 4) | (r1 & 0x0F00) | ((r2 & 0x0F00) >> 4) | ((r3 & 0x0F00) >> 8),
                ((r0 & 0x00F0) << 8) | ((r1 & 0x00F0) << 4) | (r2 & 0x00F0) | ((r3 & 0x00F0) >> 4),
                ((r0 & 0x000F) << 12) | ((r1 & 0x000F) << 8) | ((r2 & 0x000F) << 4) | (r3 & 0x000F),
            ],
        }
    }

    /// Number of empty cells.
    pub fn count_empty(&self) -> u32 {
        self.cells().iter().filter(|&&c| c == 0).count() as u32
    }

    /// Row-major indices of the empty cells, in ascending order.
    pub fn empty_cells(&self) -> impl Iterator<Item = usize> + '_ {
        (0..BOARD_CELLS).filter(move |&i| self.get(i) == 0)
    }

    /// Sum of the values of all tiles.
    pub fn total_value(&self) -> u32 {
        self.cells().iter().map(|&c| TILE_VALUES[c as usize]).sum()
    }

    /// Largest exponent on the board and the cell holding it.
    ///
    /// When the largest exponent occurs more than once, a corner occurrence
    /// wins over a non-corner one.
    pub fn max_tile(&self) -> (u8, usize) {
        let mut max = 0;
        let mut max_index = 0;
        for (i, c) in self.cells().into_iter().enumerate() {
            if c > max || (c == max && CORNER_CELLS.contains(&i)) {
                max = c;
                max_index = i;
            }
        }
        (max, max_index)
    }

    /// Computes the valid-move mask.
    pub fn valid_moves(&self) -> MoveSet {
        let mut bits = 0;
        for &row in &self.rows {
            if row_can_move_left(row) {
                bits |= LEFT;
            }
            if row_can_move_left(reverse_row(row)) {
                bits |= RIGHT;
            }
        }
        for &column in &self.transpose().rows {
            if row_can_move_left(column) {
                bits |= UP;
            }
            if row_can_move_left(reverse_row(column)) {
                bits |= DOWN;
            }
        }
        MoveSet::from_directions(bits)
    }

    /// Slides the board in a direction using the lookup table.
    ///
    /// Does not spawn a tile. Returns the new board and the merge score.
    pub fn shift(&self, direction: Direction, table: &RowTable) -> (Board, u32) {
        match direction {
            Direction::Left => self.shift_left(table),
            Direction::Right => self.shift_right(table),
            Direction::Up => {
                let (board, score) = self.transpose().shift_left(table);
                (board.transpose(), score)
            }
            Direction::Down => {
                let (board, score) = self.transpose().shift_right(table);
                (board.transpose(), score)
            }
        }
    }

    #[inline]
    fn shift_left(&self, table: &RowTable) -> (Board, u32) {
        let mut rows = self.rows;
        let mut score = 0;
        for row in rows.iter_mut() {
            let entry = table[*row as usize];
            *row = entry.result;
            score += entry.score;
        }
        (Board { rows }, score)
    }

    #[inline]
    fn shift_right(&self, table: &RowTable) -> (Board, u32) {
        let mut rows = self.rows;
        let mut score = 0;
        for row in rows.iter_mut() {
            let entry = table[reverse_row(*row) as usize];
            *row = reverse_row(entry.result);
            score += entry.score;
        }
        (Board { rows }, score)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.cells().into_iter().enumerate() {
            write!(f, "[{:>5}]", TILE_VALUES[c as usize])?;
            if i % BOARD_SIZE == BOARD_SIZE - 1 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup_table::MoveTable;
    use crate::rng::XorShift32;
    use rand::RngCore;

    fn random_board(rng: &mut XorShift32) -> Board {
        let packed = ((rng.next_u32() as u64) << 32) | rng.next_u32() as u64;
        Board::from_packed(packed)
    }

    #[test]
    fn test_transpose() {
        let board = Board::from_rows([
            pack_row([0, 1, 2, 3]),
            pack_row([4, 5, 6, 7]),
            pack_row([8, 9, 10, 11]),
            pack_row([12, 13, 14, 15]),
        ]);
        let expected = Board::from_rows([
            pack_row([0, 4, 8, 12]),
            pack_row([1, 5, 9, 13]),
            pack_row([2, 6, 10, 14]),
            pack_row([3, 7, 11, 15]),
        ]);
        assert_eq!(board.transpose(), expected);
    }

    #[test]
    fn test_transpose_is_involution() {
        let mut rng = XorShift32::new(7);
        for _ in 0..100_000 {
            let board = random_board(&mut rng);
            assert_eq!(board.transpose().transpose(), board);
        }
    }

    #[test]
    fn test_packed_round_trip() {
        let board = Board::from_rows([0x1234, 0x5678, 0x9ABC, 0xDEF0]);
        assert_eq!(board.to_packed(), 0x1234_5678_9ABC_DEF0);
        assert_eq!(Board::from_packed(0x1234_5678_9ABC_DEF0), board);
    }

    #[test]
    fn test_cells_and_get() {
        let board = Board::from_rows([0x1234, 0, 0, 0x000F]);
        assert_eq!(board.get(0), 1);
        assert_eq!(board.get(3), 4);
        assert_eq!(board.get(15), 15);
        assert_eq!(Board::from_cells(board.cells()), board);
    }

    #[test]
    fn test_set_empty_cell() {
        let mut board = Board::empty();
        board.set_empty_cell(5, 2);
        assert_eq!(board.rows(), [0, 0x0200, 0, 0]);
        assert_eq!(board.count_empty(), 15);
    }

    #[test]
    fn test_shift_directions() {
        let table = MoveTable::build();
        let board = Board::from_rows([0x1100, 0, 0, 0x0001]);

        let (left, score) = board.shift(Direction::Left, table.table());
        assert_eq!(left.rows(), [0x2000, 0, 0, 0x1000]);
        assert_eq!(score, 4);

        let (right, score) = board.shift(Direction::Right, table.table());
        assert_eq!(right.rows(), [0x0002, 0, 0, 0x0001]);
        assert_eq!(score, 4);

        let (up, score) = board.shift(Direction::Up, table.table());
        assert_eq!(up.rows(), [0x1101, 0, 0, 0]);
        assert_eq!(score, 0);

        let (down, score) = board.shift(Direction::Down, table.table());
        assert_eq!(down.rows(), [0, 0, 0, 0x1101]);
        assert_eq!(score, 0);
    }

    #[test]
    fn test_valid_moves() {
        let board = Board::from_rows([0x1000, 0, 0, 0]);
        assert_eq!(board.valid_moves().bits(), RIGHT | DOWN);

        let full = Board::from_rows([0x1212, 0x2121, 0x1212, 0x2121]);
        assert!(full.valid_moves().is_game_over());

        let mergeable = Board::from_rows([0x1212, 0x2121, 0x1212, 0x2122]);
        assert_eq!(mergeable.valid_moves().bits(), LEFT | RIGHT | UP | DOWN);
    }

    #[test]
    fn test_valid_moves_match_shift() {
        let table = MoveTable::build();
        let mut rng = XorShift32::new(99);
        for _ in 0..20_000 {
            let board = random_board(&mut rng);
            let moves = board.valid_moves();
            for direction in Direction::ALL {
                let (next, _) = board.shift(direction, table.table());
                assert_eq!(moves.contains(direction), next != board);
            }
        }
    }

    #[test]
    fn test_max_tile_prefers_corner() {
        let board = Board::from_rows([0x0300, 0, 0, 0x0003]);
        assert_eq!(board.max_tile(), (3, 15));
        assert_eq!(Board::empty().max_tile().0, 0);
    }
}
