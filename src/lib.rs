//! # Twenty48 — Exact Layered Solver for the Game 2048
//!
//! Computes the optimal probability of reaching a target tile for every
//! reachable 2048 state using **backward induction** over a layered DAG of
//! states, streamed through on-disk layer files so the full model never has
//! to fit in memory.
//!
//! ## Pipeline overview
//!
//! | Stage | Rust module | Description |
//! |-------|-------------|-------------|
//! | 1 | [`layer_builder`] | Forward enumeration of canonical states, layer by layer of increasing tile sum, sharded into (sum, max tile) parts |
//! | 2 | [`layer_solver`] | Backward induction from the highest layer down, writing a packed policy and per-state win probabilities |
//! | 2' | [`layer_q_solver`] | Alternative backward pass that accumulates per-action values in place, one successor part at a time |
//! | 3 | [`tranche`] | Forward probability propagation under the optimal policy, splitting each part into transient, win and loss tranches |
//!
//! ## State representation
//!
//! A board is a [`state::State`]: 64 bits, 4 bits per cell, each cell holding
//! the base 2 logarithm of its tile (0 for empty). Moves are computed one row
//! or column at a time via precomputed [`line`] tables. States are stored in
//! canonical form, the minimum over the 8 symmetries of the square, which
//! shrinks the model by nearly a factor of 8.
//!
//! Layers are keyed by tile sum: every move adds 2 or 4 to the sum, so layer
//! `s` depends only on layers `s + 2` and `s + 4`. Within a layer, parts are
//! keyed by maximum tile, which a move preserves or increments.
//!
//! ## Resolution
//!
//! States close to a sure win or a sure loss are cut off by the
//! [`valuer::Valuer`] rather than expanded: their values are re-derived on
//! demand during the backward pass, so they never appear in the layer files.

pub mod constants;
pub mod layer_builder;
pub mod layer_q_solver;
pub mod layer_solver;
pub mod layers;
pub mod line;
pub mod resolver;
pub mod start_states;
pub mod state;
pub mod state_set;
pub mod storage;
pub mod tranche;
pub mod valuer;
