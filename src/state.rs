//! A full `N`x`N` board packed into a `u64`: 4 bits per cell holding the
//! base-2 exponent of the tile (0 for an empty cell), with cell 0 in the
//! most significant used nybble. Cells are numbered row-major, so cell
//! `y * N + x` is column `x` of row `y`.
//!
//! All moves are built from the single slide-toward-0 primitive in
//! [`crate::line`]: moving right or down reverses the line, slides, and
//! reverses back. Board symmetries (the 8 elements of the dihedral group)
//! are index permutations, and [`State::canonicalize`] picks the minimum
//! image so that symmetric boards share one representative.

use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{Direction, DIRECTIONS, RANDOM_TILES};
use crate::line::Line;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct State<const N: usize>(u64);

impl<const N: usize> State<N> {
    pub fn new(nybbles: u64) -> Self {
        State(nybbles)
    }

    pub fn from_cells(cells: &[u8]) -> Self {
        assert_eq!(cells.len(), N * N, "expected {} cells", N * N);
        let mut nybbles = 0u64;
        for &cell in cells {
            nybbles = (nybbles << 4) | ((cell & 0xf) as u64);
        }
        State(nybbles)
    }

    #[inline]
    pub fn nybbles(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn get(self, i: usize) -> u8 {
        ((self.0 >> (4 * (N * N - i - 1))) & 0xf) as u8
    }

    pub fn to_cells(self) -> Vec<u8> {
        (0..N * N).map(|i| self.get(i)).collect()
    }

    #[inline]
    fn row(self, y: usize) -> Line<N> {
        let shift = 4 * N * (N - y - 1);
        let mask = (1u64 << (4 * N)) - 1;
        Line::new(((self.0 >> shift) & mask) as u16)
    }

    #[inline]
    fn with_row(self, y: usize, line: Line<N>) -> Self {
        let shift = 4 * N * (N - y - 1);
        let mask = ((1u64 << (4 * N)) - 1) << shift;
        State((self.0 & !mask) | ((line.nybbles() as u64) << shift))
    }

    #[inline]
    fn col(self, x: usize) -> Line<N> {
        let mut nybbles = 0u16;
        for y in 0..N {
            nybbles = (nybbles << 4) | (self.get(y * N + x) as u16);
        }
        Line::new(nybbles)
    }

    fn with_col(self, x: usize, line: Line<N>) -> Self {
        let mut state = self;
        for y in 0..N {
            let i = y * N + x;
            let shift = 4 * (N * N - i - 1);
            let mask = 0xfu64 << shift;
            state.0 = (state.0 & !mask) | ((line.get(y) as u64) << shift);
        }
        state
    }

    /// Apply a swipe in the given direction. Total: if no tile can slide or
    /// merge, the result equals `self`, and the caller decides whether that
    /// makes the move infeasible.
    pub fn move_in(self, direction: Direction) -> Self {
        self.apply_move(direction, false)
    }

    /// Like [`State::move_in`] but treating zero cells as unknown contents,
    /// for conservative lookahead over unresolved spawns.
    pub fn move_in_unknown(self, direction: Direction) -> Self {
        self.apply_move(direction, true)
    }

    fn apply_move(self, direction: Direction, zeros_unknown: bool) -> Self {
        let slide = |line: Line<N>| {
            if zeros_unknown {
                line.moved_unknown()
            } else {
                line.moved()
            }
        };
        let mut state = self;
        match direction {
            Direction::Left => {
                for y in 0..N {
                    state = state.with_row(y, slide(self.row(y)));
                }
            }
            Direction::Right => {
                for y in 0..N {
                    state = state.with_row(y, slide(self.row(y).reversed()).reversed());
                }
            }
            Direction::Up => {
                for x in 0..N {
                    state = state.with_col(x, slide(self.col(x)));
                }
            }
            Direction::Down => {
                for x in 0..N {
                    state = state.with_col(x, slide(self.col(x).reversed()).reversed());
                }
            }
        }
        state
    }

    /// Permute cells with an index map `(n, x, y) -> i'`; the value at
    /// column `x`, row `y` moves to cell `i'`.
    fn transform(self, f: impl Fn(usize, usize, usize) -> usize) -> Self {
        let mut nybbles = 0u64;
        for y in 0..N {
            for x in 0..N {
                let value = self.get(y * N + x) as u64;
                let i = f(N, x, y);
                nybbles |= value << (4 * (N * N - i - 1));
            }
        }
        State(nybbles)
    }

    pub fn reflect_horizontally(self) -> Self {
        self.transform(|n, x, y| n * (y + 1) - (x + 1))
    }

    pub fn reflect_vertically(self) -> Self {
        self.transform(|n, x, y| n * (n - y - 1) + x)
    }

    pub fn transpose(self) -> Self {
        self.transform(|n, x, y| n * x + y)
    }

    /// The minimum of the 8 dihedral images of the board. Idempotent, and
    /// equal for any two boards related by rotation or reflection.
    pub fn canonicalize(self) -> Self {
        let mut best = self;
        let transpose = self.transpose();
        for image in [
            self.reflect_horizontally(),
            self.reflect_vertically(),
            self.reflect_horizontally().reflect_vertically(),
            transpose,
            transpose.reflect_horizontally(),
            transpose.reflect_vertically(),
            transpose.reflect_horizontally().reflect_vertically(),
        ] {
            if image < best {
                best = image;
            }
        }
        best
    }

    pub fn cells_available(self) -> usize {
        (0..N * N).filter(|&i| self.get(i) == 0).count()
    }

    pub fn max_value(self) -> u8 {
        (0..N * N).map(|i| self.get(i)).max().unwrap_or(0)
    }

    /// Total of the tile face values, `sum of 2^cell` over nonzero cells.
    /// Every spawn adds 2 or 4 and merges conserve it, so the sum increases
    /// by exactly 2 or 4 per completed move.
    pub fn sum(self) -> u32 {
        (0..N * N)
            .map(|i| self.get(i))
            .filter(|&cell| cell > 0)
            .map(|cell| 1u32 << cell)
            .sum()
    }

    pub fn new_state_with_tile(self, i: usize, value: u8) -> Self {
        let shift = 4 * (N * N - i - 1);
        debug_assert_eq!((self.0 >> shift) & 0xf, 0, "cell {} is occupied", i);
        State(self.0 | ((value as u64) << shift))
    }

    /// The chance outcomes of a spawn: each canonicalized successor mapped
    /// to its probability. Tiles land uniformly on the empty cells, a 2 with
    /// probability 0.9 and a 4 with probability 0.1.
    ///
    /// Panics if the board is full; a spawn only ever follows a completed
    /// move, which guarantees at least one empty cell.
    pub fn random_transitions(self) -> BTreeMap<State<N>, f64> {
        let cells_available = self.cells_available();
        assert!(cells_available > 0, "no cells available for a new tile");
        let mut transitions = BTreeMap::new();
        for i in 0..N * N {
            if self.get(i) != 0 {
                continue;
            }
            for (value, tile_pr) in RANDOM_TILES {
                let successor = self.new_state_with_tile(i, value).canonicalize();
                *transitions.entry(successor).or_insert(0.0) +=
                    tile_pr / cells_available as f64;
            }
        }
        transitions
    }

    /// True if no direction changes the board.
    pub fn lose(self) -> bool {
        DIRECTIONS
            .iter()
            .all(|&direction| self.move_in(direction) == self)
    }

    /// True if some row or column contains a mergeable pair of `value`
    /// tiles. See [`Line::has_adjacent_pair`] for the `zeros_unknown`
    /// semantics.
    pub fn has_adjacent_pair(self, value: u8, zeros_unknown: bool) -> bool {
        (0..N).any(|y| self.row(y).has_adjacent_pair(value, zeros_unknown))
            || (0..N).any(|x| self.col(x).has_adjacent_pair(value, zeros_unknown))
    }
}

impl<const N: usize> fmt::Display for State<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$x}", self.0, width = N * N)
    }
}

impl<const N: usize> fmt::Debug for State<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State({:0width$x})", self.0, width = N * N)
    }
}
