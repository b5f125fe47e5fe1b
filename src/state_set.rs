//! A fixed-capacity open-addressing set of states, used to deduplicate
//! successors while expanding a batch of states.
//!
//! The table never grows: the caller sizes it from the batch size and the
//! maximum number of successors per state, and a full table is a fatal
//! sizing error. Slot value 0 marks an empty slot, so the empty board is
//! treated as always present.

use std::hash::{BuildHasher, BuildHasherDefault};

use rustc_hash::FxHasher;

use crate::state::State;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

pub struct StateHashSet<const N: usize> {
    data: Vec<u64>,
    count: usize,
    hasher: FxBuildHasher,
}

impl<const N: usize> StateHashSet<N> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bad state hash set capacity");
        StateHashSet {
            data: vec![0; capacity],
            count: 0,
            hasher: FxBuildHasher::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Insert a state; returns true if it was not already present. The
    /// empty board is always considered present.
    ///
    /// Panics if the table is full: capacity is fixed up front, so filling
    /// it means the sizing was wrong.
    pub fn insert(&mut self, state: State<N>) -> bool {
        let nybbles = state.nybbles();
        if nybbles == 0 {
            return false;
        }
        let mut index = self.probe_start(nybbles);
        for _ in 0..self.data.len() {
            let slot = self.data[index];
            if slot == 0 {
                self.data[index] = nybbles;
                self.count += 1;
                return true;
            }
            if slot == nybbles {
                return false;
            }
            index += 1;
            if index == self.data.len() {
                index = 0;
            }
        }
        panic!("state hash set is full");
    }

    pub fn member(&self, state: State<N>) -> bool {
        let nybbles = state.nybbles();
        if nybbles == 0 {
            return true;
        }
        let mut index = self.probe_start(nybbles);
        for _ in 0..self.data.len() {
            let slot = self.data[index];
            if slot == 0 {
                return false;
            }
            if slot == nybbles {
                return true;
            }
            index += 1;
            if index == self.data.len() {
                index = 0;
            }
        }
        false
    }

    /// Empty the set and return its contents in ascending order.
    pub fn drain_sorted(&mut self) -> Vec<State<N>> {
        let mut states: Vec<State<N>> = self
            .data
            .iter()
            .filter(|&&slot| slot != 0)
            .map(|&slot| State::new(slot))
            .collect();
        states.sort_unstable();
        for slot in &mut self.data {
            *slot = 0;
        }
        self.count = 0;
        states
    }

    fn probe_start(&self, nybbles: u64) -> usize {
        (self.hasher.hash_one(nybbles) % self.data.len() as u64) as usize
    }
}
