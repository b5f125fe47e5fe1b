//! A single row or column of the board, packed into a `u16` (4 bits per
//! cell, cell 0 in the most significant used nybble), and the precomputed
//! slide-and-merge tables.
//!
//! Two tables are built per board size:
//!
//! - `slide`: the ordinary 2048 move: tiles slide toward cell 0, adjacent
//!   equal tiles merge once per move.
//! - `slide_unknown`: the conservative variant used for lookahead, in which
//!   a zero cell means "contents unknown" rather than "empty": sliding stops
//!   at the first zero, since we cannot know what is behind it.
//!
//! The tables are process-wide, built lazily exactly once, and immutable
//! thereafter. There are at most 65,536 entries per table, so even the 4x4
//! tables only take 256 KiB.

use std::sync::OnceLock;

struct LineTables {
    slide: Box<[u16]>,
    slide_unknown: Box<[u16]>,
}

// Indexed by board size - 2 (sizes 2, 3, 4).
static LINE_TABLES: [OnceLock<LineTables>; 3] =
    [OnceLock::new(), OnceLock::new(), OnceLock::new()];

fn tables(size: usize) -> &'static LineTables {
    assert!((2..=4).contains(&size), "bad board size: {}", size);
    LINE_TABLES[size - 2].get_or_init(|| build_tables(size))
}

fn build_tables(size: usize) -> LineTables {
    let table_len = 1usize << (4 * size);
    let mut slide = vec![0u16; table_len];
    let mut slide_unknown = vec![0u16; table_len];
    for nybbles in 0..table_len {
        let cells = unpack(size, nybbles as u16);
        slide[nybbles] = pack(size, &slide_line(&cells[..size], false));
        slide_unknown[nybbles] = pack(size, &slide_line(&cells[..size], true));
    }
    LineTables {
        slide: slide.into_boxed_slice(),
        slide_unknown: slide_unknown.into_boxed_slice(),
    }
}

/// Slide a line toward index 0, merging each pair of adjacent equal tiles at
/// most once. With `zeros_unknown`, stop at the first zero: everything
/// behind an unknown cell is itself unknown.
fn slide_line(cells: &[u8], zeros_unknown: bool) -> [u8; 4] {
    let mut result = [0u8; 4];
    let mut out = 0;
    let mut last: Option<u8> = None;
    for &value in cells {
        if value == 0 {
            if zeros_unknown {
                break;
            }
            continue;
        }
        if last == Some(value) {
            result[out - 1] += 1;
            last = None;
        } else {
            result[out] = value;
            out += 1;
            last = Some(value);
        }
    }
    result
}

fn unpack(size: usize, nybbles: u16) -> [u8; 4] {
    let mut cells = [0u8; 4];
    for (i, cell) in cells.iter_mut().enumerate().take(size) {
        *cell = ((nybbles >> (4 * (size - i - 1))) & 0xf) as u8;
    }
    cells
}

fn pack(size: usize, cells: &[u8]) -> u16 {
    let mut nybbles = 0u16;
    for (i, &cell) in cells.iter().enumerate().take(size) {
        nybbles |= ((cell & 0xf) as u16) << (4 * (size - i - 1));
    }
    nybbles
}

/// One row or column of an `N`x`N` board: `N` 4-bit cells in a `u16`, cell 0
/// in the most significant used nybble.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Line<const N: usize>(u16);

impl<const N: usize> Line<N> {
    pub fn new(nybbles: u16) -> Self {
        Line(nybbles)
    }

    pub fn from_cells(cells: [u8; N]) -> Self {
        Line(pack(N, &cells))
    }

    #[inline]
    pub fn nybbles(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn get(self, i: usize) -> u8 {
        assert!(i < N, "line index out of range: {}", i);
        ((self.0 >> (4 * (N - i - 1))) & 0xf) as u8
    }

    pub fn to_cells(self) -> [u8; N] {
        let mut cells = [0u8; N];
        for (i, cell) in cells.iter_mut().enumerate() {
            *cell = self.get(i);
        }
        cells
    }

    /// Slide toward cell 0 via the precomputed table.
    pub fn moved(self) -> Self {
        Line(tables(N).slide[self.0 as usize])
    }

    /// Slide toward cell 0 treating zeros as unknown contents.
    pub fn moved_unknown(self) -> Self {
        Line(tables(N).slide_unknown[self.0 as usize])
    }

    /// The same cells in reverse order (used to move right/down via the
    /// single slide-toward-0 primitive).
    pub fn reversed(self) -> Self {
        let mut nybbles = 0u16;
        for i in 0..N {
            nybbles |= ((self.get(i) as u16) & 0xf) << (4 * i);
        }
        Line(nybbles)
    }

    /// True if the line contains two cells of value `value` separated only
    /// by zeros. If so, a single swipe along the line merges them into a
    /// `value + 1` tile.
    ///
    /// With `zeros_unknown`, a zero between the pair blocks the match, since
    /// it might hide another tile; this makes the predicate conservative for
    /// lookahead over unresolved spawns.
    pub fn has_adjacent_pair(self, value: u8, zeros_unknown: bool) -> bool {
        let mut found_first = false;
        for i in 0..N {
            let cell = self.get(i);
            if found_first {
                if !zeros_unknown && cell == 0 {
                    continue;
                }
                return cell == value;
            }
            if cell == value {
                found_first = true;
            }
        }
        false
    }
}
