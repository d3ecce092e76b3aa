//! Global constants

/// Number of cells along one side of the board.
pub const BOARD_SIZE: usize = 4;

/// Number of cells on the board.
pub const BOARD_CELLS: usize = BOARD_SIZE * BOARD_SIZE;

/// Number of distinct 16-bit row encodings.
pub const ROW_COUNT: usize = 1 << 16;

/// Largest tile exponent a nibble can hold (2^15 = 32768).
pub const MAX_EXPONENT: u8 = 15;

/// Seed used by the XorShift generator when it is handed a zero seed.
pub const DEFAULT_SEED: u32 = 2_463_534_242;

/// Tile value for every exponent, `TILE_VALUES[e] == 2^e` and `TILE_VALUES[0] == 0`.
pub const TILE_VALUES: [u32; 16] = [
    0, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768,
];

/// Indices of the four corner cells in row-major order.
pub const CORNER_CELLS: [usize; 4] = [0, 3, 12, 15];
