//! Wire record published by a worker once per simulated step.

use bytemuck::{Pod, Zeroable};

use crate::board::Board;
use crate::moves::MoveSet;

/// Size of one message on the wire.
pub const MESSAGE_SIZE: usize = std::mem::size_of::<Message>();

/// Fixed-layout state record: `id:u8, packed_board:u64, valid_moves:u8,
/// reward:f64`, 18 bytes, no padding.
///
/// The struct is packed, so read fields through the accessors (or copy them
/// out) instead of taking references to them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct Message {
    pub worker_id: u8,
    pub packed_board: u64,
    pub valid_moves: u8,
    pub reward: f64,
}

impl Message {
    pub fn new(worker_id: u8, board: &Board, valid_moves: MoveSet, reward: f64) -> Self {
        Message {
            worker_id,
            packed_board: board.to_packed(),
            valid_moves: valid_moves.bits(),
            reward,
        }
    }

    #[inline]
    pub fn worker_id(&self) -> u8 {
        self.worker_id
    }

    #[inline]
    pub fn board(&self) -> Board {
        Board::from_packed(self.packed_board)
    }

    #[inline]
    pub fn valid_moves(&self) -> MoveSet {
        MoveSet::from_directions(self.valid_moves)
    }

    #[inline]
    pub fn reward(&self) -> f64 {
        self.reward
    }

    /// Returns `true` if the worker's game has ended.
    #[inline]
    pub fn is_game_over(&self) -> bool {
        self.valid_moves().is_game_over()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::{LEFT, NO_MOVE, UP};

    #[test]
    fn test_layout() {
        assert_eq!(MESSAGE_SIZE, 18);
        assert_eq!(std::mem::align_of::<Message>(), 1);
    }

    #[test]
    fn test_field_offsets() {
        let board = Board::from_rows([0x1234, 0, 0, 0x0001]);
        let msg = Message::new(7, &board, MoveSet::from_directions(LEFT | UP), 1.5);
        let bytes = bytemuck::bytes_of(&msg);

        assert_eq!(bytes[0], 7);
        assert_eq!(u64::from_ne_bytes(bytes[1..9].try_into().unwrap()), board.to_packed());
        assert_eq!(bytes[9], LEFT | UP);
        assert_eq!(f64::from_ne_bytes(bytes[10..18].try_into().unwrap()), 1.5);
    }

    #[test]
    fn test_accessors() {
        let board = Board::from_rows([0x2000, 0, 0, 0]);
        let msg = Message::new(3, &board, MoveSet::NONE, -0.25);
        assert_eq!(msg.worker_id(), 3);
        assert_eq!(msg.board(), board);
        assert_eq!(msg.valid_moves().bits(), NO_MOVE);
        assert!(msg.is_game_over());
        assert_eq!(msg.reward(), -0.25);
    }
}
