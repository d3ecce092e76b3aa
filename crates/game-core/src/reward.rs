//! Per-step reward handed to the training loop.

use crate::board::Board;
use crate::constants::CORNER_CELLS;

/// Divisor applied to the change in total board value.
const VALUE_SCALE: f64 = 1024.0;
/// Bonus per empty cell.
const EMPTY_CELL_BONUS: f64 = 0.1;
/// Weight of the largest-tile term.
const MAX_TILE_WEIGHT: f64 = 0.2;
/// Exponent of the 2048 tile, used to normalize the largest-tile term.
const MAX_TILE_NORM: f64 = 11.0;
/// Bonus for keeping the largest tile in a corner.
const CORNER_BONUS: f64 = 0.2;

/// Scores the transition from `previous` to `current`.
///
/// Combines the normalized change in total tile value, a bonus per empty
/// cell, a bonus proportional to `log2` of the largest tile and a fixed bonus
/// when the largest tile sits in a corner.
pub fn reward(previous: &Board, current: &Board) -> f64 {
    let value_delta = current.total_value() as f64 - previous.total_value() as f64;
    let (max_exponent, max_index) = current.max_tile();

    let mut reward = value_delta / VALUE_SCALE;
    reward += EMPTY_CELL_BONUS * current.count_empty() as f64;
    // log2 of a tile value is its exponent.
    reward += MAX_TILE_WEIGHT * (max_exponent as f64 / MAX_TILE_NORM);
    if CORNER_CELLS.contains(&max_index) {
        reward += CORNER_BONUS;
    }
    reward
}
