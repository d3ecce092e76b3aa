//! Move directions and the valid-move bitmask exchanged with the agent.

use std::fmt;

/// Bit set for a left move.
pub const LEFT: u8 = 0b0000_0001;
/// Bit set for a right move.
pub const RIGHT: u8 = 0b0000_0010;
/// Bit set for an up move.
pub const UP: u8 = 0b0000_0100;
/// Bit set for a down move.
pub const DOWN: u8 = 0b0000_1000;
/// Bit set when no direction is available.
pub const NO_MOVE: u8 = 0b0001_0000;

/// Move code that asks a worker to start a new episode.
///
/// Shares its bit with [`NO_MOVE`]: the agent echoes the game-over flag back
/// to request a fresh board.
pub const RESET: u8 = NO_MOVE;

const DIRECTION_BITS: u8 = LEFT | RIGHT | UP | DOWN;

/// A sliding direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Left = LEFT,
    Right = RIGHT,
    Up = UP,
    Down = DOWN,
}

impl Direction {
    /// All directions in bit order.
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    /// Decodes a one-hot move code.
    ///
    /// Returns `None` for anything that is not exactly one direction bit.
    #[inline]
    pub fn from_code(code: u8) -> Option<Direction> {
        match code {
            LEFT => Some(Direction::Left),
            RIGHT => Some(Direction::Right),
            UP => Some(Direction::Up),
            DOWN => Some(Direction::Down),
            _ => None,
        }
    }

    /// Returns the one-hot move code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        };
        f.write_str(name)
    }
}

/// Valid-move bitmask: bits 0-3 are directions, bit 4 is set exactly when
/// bits 0-3 are all clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveSet(u8);

impl MoveSet {
    /// The game-over mask.
    pub const NONE: MoveSet = MoveSet(NO_MOVE);

    /// Builds a mask from direction bits, setting [`NO_MOVE`] when none are set.
    #[inline]
    pub fn from_directions(bits: u8) -> MoveSet {
        let bits = bits & DIRECTION_BITS;
        if bits == 0 { MoveSet::NONE } else { MoveSet(bits) }
    }

    /// Raw byte as written to the wire.
    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if the direction is available.
    #[inline]
    pub fn contains(self, direction: Direction) -> bool {
        self.0 & direction.code() != 0
    }

    /// Returns `true` if no direction is available.
    #[inline]
    pub fn is_game_over(self) -> bool {
        self.0 & NO_MOVE != 0
    }

    /// Iterates over the available directions in bit order.
    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |d| self.contains(*d))
    }

    /// Number of available directions.
    #[inline]
    pub fn count(self) -> u32 {
        (self.0 & DIRECTION_BITS).count_ones()
    }
}

impl fmt::Display for MoveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05b}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(Direction::from_code(LEFT), Some(Direction::Left));
        assert_eq!(Direction::from_code(DOWN), Some(Direction::Down));
        assert_eq!(Direction::from_code(0), None);
        assert_eq!(Direction::from_code(LEFT | UP), None);
        assert_eq!(Direction::from_code(RESET), None);
    }

    #[test]
    fn test_move_set_no_move_bit() {
        assert_eq!(MoveSet::from_directions(0).bits(), NO_MOVE);
        assert!(MoveSet::from_directions(0).is_game_over());

        let set = MoveSet::from_directions(LEFT | DOWN);
        assert_eq!(set.bits(), 0b01001);
        assert!(!set.is_game_over());
        assert_eq!(set.count(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Direction::Left, Direction::Down]);
    }
}
