//! Shared constants: move directions, the tile spawn rule, and block sizes
//! for the packed disk formats.

/// A swipe direction. The discriminant doubles as the 2-bit policy code and
/// as the tie-break priority during backup: the first direction in this order
/// that achieves the maximum action value is the one the policy records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
}

/// All four directions in backup priority order.
pub const DIRECTIONS: [Direction; 4] = [
    Direction::Left,
    Direction::Right,
    Direction::Up,
    Direction::Down,
];

impl Direction {
    /// Decode a 2-bit policy code.
    pub fn from_code(code: u8) -> Direction {
        match code & 0x3 {
            0 => Direction::Left,
            1 => Direction::Right,
            2 => Direction::Up,
            _ => Direction::Down,
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Tile spawn rule: a 2 (exponent 1) with probability 0.9, a 4 (exponent 2)
/// with probability 0.1, uniformly over the empty cells.
pub const RANDOM_TILES: [(u8, f64); 2] = [(1, 0.9), (2, 0.1)];

/// Tolerance for checking that a transition map's probabilities sum to one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Granularity of the sparse vbyte index: one entry per crossed page.
pub const VBYTE_INDEX_PAGE_BYTES: u64 = 4096;

/// Alternate-action files are written in 6-byte blocks (16 states of 3 bits).
pub const ALTERNATE_ACTION_BLOCK_BYTES: usize = 6;
