//! Disk-resident storage primitives.
//!
//! The solver's working set is much larger than memory, so every large
//! structure lives in a file with a compact encoding:
//!
//! | Module | Format |
//! |--------|--------|
//! | [`vbyte`] | sorted `u64` streams as delta varints |
//! | [`binary`] | fixed-size little-endian records |
//! | [`policy`] | 2 bits per state |
//! | [`bitset`] | 1 bit per state |
//! | [`alternate_actions`] | 3 bits per state in 6-byte blocks |
//! | [`mmap`] | memory-mapped random-access readers |
//! | [`merge`] | external k-way merges over sorted shards |

pub mod alternate_actions;
pub mod binary;
pub mod bitset;
pub mod merge;
pub mod mmap;
pub mod policy;
pub mod vbyte;
