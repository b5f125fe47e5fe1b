//! The game's start distribution: two random tiles spawn on an empty board
//! before the first move, so the reachable start states are the canonical
//! boards with exactly two tiles.

use std::collections::{BTreeMap, BTreeSet};

use crate::state::State;

/// All distinct canonical start states, sorted.
pub fn generate_start_states<const N: usize>() -> Vec<State<N>> {
    let mut start_states = BTreeSet::new();
    let empty = State::<N>::new(0);
    for &one_tile in empty.random_transitions().keys() {
        for &two_tiles in one_tile.random_transitions().keys() {
            start_states.insert(two_tiles.canonicalize());
        }
    }
    start_states.into_iter().collect()
}

/// Each canonical start state mapped to its probability under the spawn
/// distribution. The probabilities sum to 1.
pub fn start_state_probabilities<const N: usize>() -> BTreeMap<State<N>, f64> {
    let mut probabilities = BTreeMap::new();
    let empty = State::<N>::new(0);
    for (&one_tile, &pr_one) in &empty.random_transitions() {
        for (&two_tiles, &pr_two) in &one_tile.random_transitions() {
            *probabilities.entry(two_tiles.canonicalize()).or_insert(0.0) += pr_one * pr_two;
        }
    }
    probabilities
}
