//! Shallow state valuation for use during layer construction and solving.
//!
//! The valuer looks at most one move ahead and returns a definite value
//! when it can: 1.0 for a board that already holds the target tile,
//! `discount` for a board that must win on the next move, 0.0 for a board
//! that must lose within the search depth. Everything else is `None` and
//! gets expanded and solved normally.

use crate::constants::DIRECTIONS;
use crate::state::State;

#[derive(Clone, Copy, Debug)]
pub struct Valuer {
    max_exponent: u8,
    max_depth: usize,
    discount: f64,
}

impl Valuer {
    pub fn new(max_exponent: u8, max_depth: usize, discount: f64) -> Self {
        assert!(max_depth <= 1, "bad max depth: {}", max_depth);
        Valuer {
            max_exponent,
            max_depth,
            discount,
        }
    }

    pub fn max_exponent(&self) -> u8 {
        self.max_exponent
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    /// The exact value of `state`, if it is decidable within `max_depth`
    /// moves.
    pub fn value<const N: usize>(&self, state: State<N>) -> Option<f64> {
        let win_delta = self.max_exponent as i32 - state.max_value() as i32;
        if win_delta <= 0 {
            return Some(1.0);
        }

        if win_delta == 1
            && self.max_depth > 0
            && state.has_adjacent_pair(self.max_exponent - 1, false)
        {
            // A merge to the target is available whichever tile spawns.
            return Some(self.discount);
        }

        // We can only lose on a full board, and each move fills at most one
        // cell.
        if state.cells_available() > self.max_depth {
            return None;
        }

        if self.lose_within(state, self.max_depth) {
            return Some(0.0);
        }

        None
    }

    fn lose_within<const N: usize>(&self, state: State<N>, moves: usize) -> bool {
        DIRECTIONS.iter().all(|&direction| {
            let moved = state.move_in(direction);
            if moved == state {
                return true;
            }
            if moves == 0 {
                return false;
            }
            moved
                .random_transitions()
                .keys()
                .all(|&successor| self.lose_within(successor, moves - 1))
        })
    }
}
