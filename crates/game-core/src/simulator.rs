//! Single-game 2048 engine driven by move codes from the agent.
//!
//! The simulator owns one board and its RNG. It borrows the row lookup table,
//! which may live in a shared-memory segment or in an owned [`MoveTable`].
//!
//! [`MoveTable`]: crate::lookup_table::MoveTable

use crate::board::Board;
use crate::lookup_table::RowTable;
use crate::message::Message;
use crate::moves::{Direction, MoveSet, RESET};
use crate::reward::reward;
use crate::rng::XorShift32;

/// Probability denominator for tile spawns: one roll in ten spawns a 4.
const SPAWN_ROLLS: u32 = 10;

/// Result of applying a move code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The board moved; carries the merge score of the move.
    Moved { score_delta: u32 },
    /// A new episode was started.
    Reset,
    /// The game is over, either because no direction is left or because the
    /// code was rejected.
    GameOver,
}

/// Game engine for one worker.
pub struct Simulator<'t> {
    id: u8,
    table: &'t RowTable,
    rng: XorShift32,
    board: Board,
    previous: Board,
    score: u64,
    moves: MoveSet,
    game_over: bool,
    episodes: u64,
}

impl<'t> Simulator<'t> {
    /// Creates a simulator with a fresh board holding two seed tiles.
    pub fn new(id: u8, seed: u32, table: &'t RowTable) -> Self {
        let mut sim = Simulator {
            id,
            table,
            rng: XorShift32::new(seed),
            board: Board::empty(),
            previous: Board::empty(),
            score: 0,
            moves: MoveSet::NONE,
            game_over: false,
            episodes: 0,
        };
        sim.reset();
        sim
    }

    /// Starts a new episode in place.
    pub fn reset(&mut self) {
        self.board = Board::empty();
        self.spawn_tile();
        self.spawn_tile();
        self.previous = self.board;
        self.score = 0;
        self.moves = self.board.valid_moves();
        self.game_over = self.moves.is_game_over();
        self.episodes += 1;
    }

    /// Applies a move code received from the agent.
    ///
    /// [`RESET`] starts a new episode. A one-hot direction that is currently
    /// valid slides the board and spawns a tile. Anything else fails closed:
    /// the board is left untouched and the game is reported over.
    pub fn apply(&mut self, code: u8) -> StepOutcome {
        if code == RESET {
            self.reset();
            return StepOutcome::Reset;
        }

        let direction = match Direction::from_code(code) {
            Some(d) if !self.game_over && self.moves.contains(d) => d,
            _ => {
                self.end_game();
                return StepOutcome::GameOver;
            }
        };

        let (board, score_delta) = self.board.shift(direction, self.table);
        self.previous = self.board;
        self.board = board;
        self.score += score_delta as u64;
        self.spawn_tile();

        self.moves = self.board.valid_moves();
        if self.moves.is_game_over() {
            self.game_over = true;
            return StepOutcome::GameOver;
        }
        StepOutcome::Moved { score_delta }
    }

    /// Encodes the current state for the transport queue.
    pub fn message(&self) -> Message {
        Message::new(self.id, &self.board, self.valid_moves(), self.reward())
    }

    /// Reward for the most recent step.
    pub fn reward(&self) -> f64 {
        reward(&self.previous, &self.board)
    }

    /// Valid-move mask; [`MoveSet::NONE`] once the game is over.
    pub fn valid_moves(&self) -> MoveSet {
        if self.game_over { MoveSet::NONE } else { self.moves }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Cumulative merge score of the current episode.
    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Number of episodes started, including the current one.
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    fn end_game(&mut self) {
        self.game_over = true;
        self.moves = MoveSet::NONE;
    }

    /// Places a 2 (9 in 10) or a 4 (1 in 10) on a uniformly chosen empty cell.
    ///
    /// Draw order is fixed: cell index first, then the value roll.
    fn spawn_tile(&mut self) {
        let empty_count = self.board.count_empty();
        if empty_count == 0 {
            return;
        }
        let pick = self.rng.below(empty_count) as usize;
        let roll = self.rng.below(SPAWN_ROLLS);
        let exponent = if roll == SPAWN_ROLLS - 1 { 2 } else { 1 };

        let cell = self.board.empty_cells().nth(pick);
        if let Some(cell) = cell {
            self.board.set_empty_cell(cell, exponent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup_table::MoveTable;
    use crate::moves::{DOWN, LEFT, NO_MOVE, RIGHT, UP};

    #[test]
    fn test_new_board_has_two_tiles() {
        let table = MoveTable::build();
        for seed in 1..200 {
            let sim = Simulator::new(0, seed, table.table());
            assert_eq!(sim.board().count_empty(), 14);
            assert!(sim.board().cells().iter().all(|&c| c <= 2));
            assert_eq!(sim.score(), 0);
            assert!(!sim.is_game_over());
        }
    }

    #[test]
    fn test_reset_sentinel() {
        let table = MoveTable::build();
        let mut sim = Simulator::new(1, 5, table.table());
        let direction = sim.valid_moves().iter().next().unwrap();
        sim.apply(direction.code());

        assert_eq!(sim.apply(RESET), StepOutcome::Reset);
        assert_eq!(sim.score(), 0);
        assert_eq!(sim.board().count_empty(), 14);
        assert_eq!(sim.episodes(), 2);
        assert_eq!(sim.reward(), reward(sim.board(), sim.board()));
    }

    #[test]
    fn test_invalid_codes_fail_closed() {
        let table = MoveTable::build();
        for code in [0, LEFT | RIGHT, UP | DOWN | LEFT, 0x20, 0xFF] {
            let mut sim = Simulator::new(2, 11, table.table());
            let before = *sim.board();
            assert_eq!(sim.apply(code), StepOutcome::GameOver);
            assert_eq!(*sim.board(), before);
            assert_eq!(sim.valid_moves().bits(), NO_MOVE);
            assert_eq!(sim.message().valid_moves().bits(), NO_MOVE);
        }
    }

    #[test]
    fn test_direction_outside_mask_fails_closed() {
        let table = MoveTable::build();
        let mut sim = Simulator::new(3, 1, table.table());
        // Force a board where only right and down are possible.
        sim.board = Board::from_rows([0x1000, 0, 0, 0]);
        sim.moves = sim.board.valid_moves();

        assert_eq!(sim.apply(LEFT), StepOutcome::GameOver);
        assert_eq!(sim.board().rows(), [0x1000, 0, 0, 0]);
        assert!(sim.is_game_over());

        // Further directions stay rejected until a reset.
        assert_eq!(sim.apply(RIGHT), StepOutcome::GameOver);
        assert_eq!(sim.apply(RESET), StepOutcome::Reset);
        assert!(!sim.is_game_over());
    }

    #[test]
    fn test_move_spawns_one_tile_and_scores() {
        let table = MoveTable::build();
        let mut sim = Simulator::new(4, 9, table.table());
        sim.board = Board::from_rows([0x1100, 0, 0, 0]);
        sim.moves = sim.board.valid_moves();

        assert_eq!(sim.apply(LEFT), StepOutcome::Moved { score_delta: 4 });
        assert_eq!(sim.score(), 4);
        assert_eq!(sim.board().count_empty(), 14);
        assert_eq!(sim.board().get(0), 2);
    }

    #[test]
    fn test_message_reflects_state() {
        let table = MoveTable::build();
        let sim = Simulator::new(9, 3, table.table());
        let msg = sim.message();
        assert_eq!(msg.worker_id(), 9);
        assert_eq!(msg.board(), *sim.board());
        assert_eq!(msg.valid_moves(), sim.valid_moves());
    }

    #[test]
    fn test_random_games_terminate() {
        let table = MoveTable::build();
        let mut picker = XorShift32::new(77);
        for seed in 1..20 {
            let mut sim = Simulator::new(0, seed, table.table());
            let mut steps = 0;
            while !sim.is_game_over() {
                let moves: Vec<_> = sim.valid_moves().iter().collect();
                let direction = moves[picker.below(moves.len() as u32) as usize];
                sim.apply(direction.code());
                steps += 1;
                assert!(steps < 100_000);
            }
            assert!(sim.board().valid_moves().is_game_over());
        }
    }
}
