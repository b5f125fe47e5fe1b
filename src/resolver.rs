//! Bounded-depth win/lose resolution.
//!
//! States that are certain to reach the target tile within `max_win_depth`
//! moves regardless of tile placement, or certain to dead-end within
//! `max_lose_depth` moves, do not need to be expanded or solved
//! individually. The resolver maps each such state onto one of a small set
//! of sentinel states: a per-depth "win in k" state, or the empty board as
//! the lose state. All other states pass through unchanged.

use crate::constants::{Direction, DIRECTIONS};
use crate::state::State;

pub struct Resolver<const N: usize> {
    max_exponent: u8,
    max_lose_depth: usize,
    win_states: Vec<State<N>>,
    lose_state: State<N>,
}

impl<const N: usize> Resolver<N> {
    pub fn new(max_exponent: u8, max_lose_depth: usize, win_states: Vec<State<N>>) -> Self {
        assert!(!win_states.is_empty(), "need at least one win state");
        Resolver {
            max_exponent,
            max_lose_depth,
            win_states,
            lose_state: State::new(0),
        }
    }

    /// Build a resolver whose win states come from
    /// [`resolved_win_states`].
    pub fn with_depths(max_exponent: u8, max_win_depth: usize, max_lose_depth: usize) -> Self {
        Self::new(
            max_exponent,
            max_lose_depth,
            resolved_win_states(max_exponent, max_win_depth),
        )
    }

    pub fn max_exponent(&self) -> u8 {
        self.max_exponent
    }

    pub fn max_lose_depth(&self) -> usize {
        self.max_lose_depth
    }

    pub fn max_win_depth(&self) -> usize {
        self.win_states.len() - 1
    }

    pub fn win_states(&self) -> &[State<N>] {
        &self.win_states
    }

    pub fn lose_state(&self) -> State<N> {
        self.lose_state
    }

    /// Map a state onto a win or lose sentinel if its outcome is already
    /// certain within the resolution depths; otherwise return it unchanged.
    pub fn resolve(&self, state: State<N>) -> State<N> {
        if let Some(win_in) = self.moves_to_win(state) {
            return self.win_states[win_in];
        }
        if self.lose_within(state, self.max_lose_depth) {
            return self.lose_state;
        }
        state
    }

    /// The number of moves in which a win is certain, if that is knowable
    /// within `max_win_depth` moves.
    pub fn moves_to_win(&self, state: State<N>) -> Option<usize> {
        self.inner_moves_to_win(state, self.max_win_depth(), false)
    }

    /// True if every move sequence from `state` dead-ends within `moves`
    /// moves, whatever tiles spawn.
    pub fn lose_within(&self, state: State<N>, moves: usize) -> bool {
        // The number of filled cells increases by at most one per move, so
        // the board cannot fill up in time if too many cells are open.
        if state.cells_available() > moves {
            return false;
        }
        if state.lose() {
            return true;
        }
        if moves == 0 {
            return false;
        }
        DIRECTIONS
            .iter()
            .all(|&direction| self.lose_within_after_move(state, moves - 1, direction))
    }

    fn lose_within_after_move(
        &self,
        state: State<N>,
        moves: usize,
        direction: Direction,
    ) -> bool {
        let moved = state.move_in(direction);
        if moved == state {
            // Cannot move in this direction.
            return true;
        }
        moved
            .random_transitions()
            .keys()
            .all(|&successor| self.lose_within(successor, moves))
    }

    // After the first move the new tile's position is unknown, so deeper
    // levels treat zeros as unknown contents and only count merges that
    // work out no matter what spawned.
    fn inner_moves_to_win(
        &self,
        state: State<N>,
        max_depth: usize,
        zeros_unknown: bool,
    ) -> Option<usize> {
        // The maximum value increases by at most one per move.
        let delta = self.max_exponent as i32 - state.max_value() as i32;
        if delta > max_depth as i32 {
            return None;
        }
        if delta <= 0 {
            return Some(0);
        }
        if delta == 1 && state.has_adjacent_pair(self.max_exponent - 1, zeros_unknown) {
            return Some(1);
        }

        DIRECTIONS
            .iter()
            .filter_map(|&direction| {
                let moved = if zeros_unknown {
                    state.move_in_unknown(direction)
                } else {
                    state.move_in(direction)
                };
                self.inner_moves_to_win(moved, max_depth - 1, true)
            })
            .min()
            .map(|moves| moves + 1)
    }
}

/// The "win in k" sentinel states for `k` in `0..=max_win_depth`.
///
/// Each state is a board from which the player is guaranteed to reach the
/// `max_exponent` tile in exactly `k` moves even with adversarial spawns.
/// They are built by unwinding merges along a boustrophedon path from the
/// target tile: the tile at the head of the path splits into a pair one
/// exponent lower, with exponents clamped at 1.
pub fn resolved_win_states<const N: usize>(
    max_exponent: u8,
    max_win_depth: usize,
) -> Vec<State<N>> {
    assert!(max_exponent >= 2, "bad max exponent: {}", max_exponent);
    let cells = N * N;
    let mut values = vec![0u8; cells];
    values[cells - 1] = max_exponent;
    let mut top = cells - 1;
    let mut sign: isize = -1;

    let mut win_states = Vec::with_capacity(max_win_depth + 1);
    win_states.push(State::from_cells(&values).canonicalize());

    for mv in 0..max_win_depth {
        let new_top = values[top] - 1;
        assert!(new_top >= 1, "not enough tile values to unwind {} moves", mv + 1);
        let new_top_index = if (mv + 1) % N == 0 {
            sign = -sign;
            top - N
        } else {
            (top as isize + sign) as usize
        };
        values[new_top_index] = new_top.max(1);
        values[top] = new_top;
        top = new_top_index;
        win_states.push(State::from_cells(&values).canonicalize());
    }
    win_states
}
