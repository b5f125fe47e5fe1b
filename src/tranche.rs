//! Tranche analysis: which states does an optimal game actually visit?
//!
//! The solved policy induces a Markov chain over the layer DAG. Starting
//! from the start state distribution, the tranche builder pushes each
//! part's transient probabilities forward through the policy, recording
//! for every part a bitset of the states whose visit probability exceeds a
//! threshold, their probabilities, and the absorbing probability mass that
//! leaves the chain as a win or a loss.
//!
//! Each part's run emits per-successor-part probability shards; shards
//! for the same part are combined with
//! [`crate::storage::merge::merge_state_probabilities`] before that part
//! is processed.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::Path;

use crate::layers::PartName;
use crate::start_states::start_state_probabilities;
use crate::state::State;
use crate::storage::alternate_actions::{AlternateActionReader, AlternateActionWriter};
use crate::storage::binary::{BinaryWriter, StateProbability};
use crate::storage::bitset::BitSetWriter;
use crate::storage::mmap::MmapValueReader;
use crate::storage::policy::{PolicyReader, PolicyWriter};
use crate::storage::vbyte::VByteReader;

type StateProbabilityMap = BTreeMap<u64, f64>;

pub struct TrancheBuilder<const N: usize> {
    max_exponent: u8,
    threshold: f64,
    start_sum: u32,
    start_max_value: u8,
    transient: MmapValueReader,
    // Successor shards indexed by [sum step - 1][max value jump].
    transient_maps: [[StateProbabilityMap; 2]; 2],
    loss_maps: [[StateProbabilityMap; 2]; 2],
    // Win shards indexed by sum step - 1.
    win_maps: [StateProbabilityMap; 2],
}

impl<const N: usize> TrancheBuilder<N> {
    /// `transient_pathname` holds the `{state, probability}` records for
    /// the part being processed, merged from its predecessors' shards.
    pub fn new(
        max_exponent: u8,
        threshold: f64,
        part: PartName,
        transient_pathname: &Path,
    ) -> io::Result<Self> {
        Ok(TrancheBuilder {
            max_exponent,
            threshold,
            start_sum: part.sum,
            start_max_value: part.max_value,
            transient: MmapValueReader::open(transient_pathname)?,
            transient_maps: Default::default(),
            loss_maps: Default::default(),
            win_maps: Default::default(),
        })
    }

    /// Stream the part's states and policy together, writing the tranche
    /// bitset and kept probabilities, and accumulating successor shards.
    pub fn build<R: Read>(
        &mut self,
        vbyte_reader: &mut VByteReader<R>,
        policy_reader: &mut PolicyReader,
        bitset_pathname: &Path,
        transient_pr_pathname: &Path,
    ) -> io::Result<()> {
        let mut bit_set_writer = BitSetWriter::create(bitset_pathname)?;
        let mut transient_pr_writer = BinaryWriter::<f64>::create(transient_pr_pathname)?;

        loop {
            let nybbles = vbyte_reader.read()?;
            if nybbles == 0 {
                break;
            }
            let state = State::<N>::new(nybbles);
            let direction = policy_reader.read()?;

            // A state we never assigned probability to is unreachable
            // under the policy.
            let state_pr = match self.transient.try_get_value(nybbles) {
                Some(state_pr) => state_pr,
                None => {
                    bit_set_writer.write(false)?;
                    continue;
                }
            };

            if state_pr > self.threshold {
                bit_set_writer.write(true)?;
                transient_pr_writer.write(&state_pr)?;
            } else {
                bit_set_writer.write(false)?;
            }

            // Propagation ignores the threshold so the probabilities stay
            // exact.
            let moved = state.move_in(direction);
            for (&successor, &probability) in &moved.random_transitions() {
                self.add_pr(successor, state_pr * probability);
            }
        }
        bit_set_writer.finish()?;
        transient_pr_writer.finish()
    }

    /// Dump the accumulated shards. Transient shards keep every state;
    /// win and loss shards are filtered by the threshold since nothing is
    /// propagated from them.
    pub fn write(
        &mut self,
        transient_pathnames: [[Option<&Path>; 2]; 2],
        loss_pathnames: [[Option<&Path>; 2]; 2],
        win_pathnames: [Option<&Path>; 2],
    ) -> io::Result<()> {
        for i in 0..2 {
            for j in 0..2 {
                let map = std::mem::take(&mut self.transient_maps[i][j]);
                self.write_state_probability_map(map, transient_pathnames[i][j], true)?;
                let map = std::mem::take(&mut self.loss_maps[i][j]);
                self.write_state_probability_map(map, loss_pathnames[i][j], false)?;
            }
            let map = std::mem::take(&mut self.win_maps[i]);
            self.write_state_probability_map(map, win_pathnames[i], false)?;
        }
        Ok(())
    }

    fn add_pr(&mut self, state: State<N>, probability: f64) {
        let sum_delta = state.sum() - self.start_sum;
        assert!(
            sum_delta == 2 || sum_delta == 4,
            "bad successor sum delta {}",
            sum_delta
        );
        let i = (sum_delta / 2 - 1) as usize;

        if state.max_value() >= self.max_exponent {
            *self.win_maps[i].entry(state.nybbles()).or_insert(0.0) += probability;
            return;
        }

        let value_delta = state.max_value() - self.start_max_value;
        assert!(value_delta <= 1, "bad successor max value delta {}", value_delta);
        let j = value_delta as usize;

        let map = if state.lose() {
            &mut self.loss_maps[i][j]
        } else {
            &mut self.transient_maps[i][j]
        };
        *map.entry(state.nybbles()).or_insert(0.0) += probability;
    }

    fn write_state_probability_map(
        &self,
        map: StateProbabilityMap,
        pathname: Option<&Path>,
        all_states: bool,
    ) -> io::Result<()> {
        let pathname = match pathname {
            Some(pathname) if !map.is_empty() => pathname,
            _ => return Ok(()),
        };
        let mut writer = BinaryWriter::<StateProbability>::create(pathname)?;
        for (state, probability) in map {
            if all_states || probability > self.threshold {
                writer.write(&StateProbability { state, probability })?;
            }
        }
        writer.finish()
    }
}

/// Seed one part's transient probability file from the start state
/// distribution. Returns the number of states written.
pub fn write_start_state_probabilities<const N: usize>(
    part: PartName,
    pathname: &Path,
) -> io::Result<u64> {
    let mut writer = BinaryWriter::<StateProbability>::create(pathname)?;
    for (state, probability) in start_state_probabilities::<N>() {
        if state.sum() == part.sum && state.max_value() == part.max_value {
            writer.write(&StateProbability {
                state: state.nybbles(),
                probability,
            })?;
        }
    }
    let num_states = writer.records_written();
    writer.finish()?;
    Ok(num_states)
}

/// Copy the policy entries for a sorted subset of a part's states.
///
/// Both state streams are sorted, so this is a single linear scan.
/// Running off the end of the original stream means the subset contains a
/// state the part does not, which is fatal.
pub fn subset_policy<R1: Read, R2: Read>(
    original_vbyte_reader: &mut VByteReader<R1>,
    original_policy_reader: &mut PolicyReader,
    subset_vbyte_reader: &mut VByteReader<R2>,
    subset_policy_writer: &mut PolicyWriter,
) -> io::Result<()> {
    loop {
        let subset_nybbles = subset_vbyte_reader.read()?;
        if subset_nybbles == 0 {
            return Ok(());
        }
        let direction = loop {
            let original_nybbles = original_vbyte_reader.read()?;
            if original_nybbles == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "subset state not present in original states",
                ));
            }
            let direction = original_policy_reader.read()?;
            if original_nybbles == subset_nybbles {
                break direction;
            }
        };
        subset_policy_writer.write(direction)?;
    }
}

/// As [`subset_policy`], also carrying the alternate action flags.
pub fn subset_policy_with_alternate_actions<R1: Read, R2: Read>(
    original_vbyte_reader: &mut VByteReader<R1>,
    original_policy_reader: &mut PolicyReader,
    original_alternate_action_reader: &mut AlternateActionReader,
    subset_vbyte_reader: &mut VByteReader<R2>,
    subset_policy_writer: &mut PolicyWriter,
    subset_alternate_action_writer: &mut AlternateActionWriter,
) -> io::Result<()> {
    loop {
        let subset_nybbles = subset_vbyte_reader.read()?;
        if subset_nybbles == 0 {
            return Ok(());
        }
        let (direction, alternate_actions) = loop {
            let original_nybbles = original_vbyte_reader.read()?;
            if original_nybbles == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "subset state not present in original states",
                ));
            }
            let direction = original_policy_reader.read()?;
            let alternate_actions = original_alternate_action_reader.read(direction)?;
            if original_nybbles == subset_nybbles {
                break (direction, alternate_actions);
            }
        };
        subset_policy_writer.write(direction)?;
        subset_alternate_action_writer.write_actions(direction, alternate_actions)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Direction;
    use crate::storage::binary::BinaryReader;
    use crate::storage::bitset::BitSetReader;
    use crate::storage::vbyte::write_states_vbyte;
    use std::path::PathBuf;

    fn temp_directory(tag: &str) -> PathBuf {
        let directory =
            std::env::temp_dir().join(format!("tranche_{}_{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&directory);
        std::fs::create_dir_all(&directory).unwrap();
        directory
    }

    #[test]
    fn test_start_state_probabilities_shard() {
        let directory = temp_directory("start");
        let pathname = directory.join("0004-1.transient");
        // Two tiles of value 1: adjacent or diagonal.
        let num_states =
            write_start_state_probabilities::<2>(PartName::new(4, 1), &pathname).unwrap();
        assert_eq!(num_states, 2);

        let mut reader = BinaryReader::<StateProbability>::open(&pathname).unwrap();
        let mut total = 0.0;
        while let Some(record) = reader.read().unwrap() {
            let state = State::<2>::new(record.state);
            assert_eq!(state.sum(), 4);
            assert_eq!(state.max_value(), 1);
            total += record.probability;
        }
        // Both spawned tiles were 2s.
        assert!((total - 0.81).abs() < 1e-12);
        std::fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    fn test_build_propagates_probability() {
        let directory = temp_directory("build");
        let part = PartName::new(4, 1);
        let state = State::<2>::from_cells(&[0, 1, 1, 0]).canonicalize();

        let states_pathname = directory.join("states.vbyte");
        write_states_vbyte(&[state.nybbles()], &states_pathname).unwrap();
        let policy_pathname = directory.join("solution.policy");
        let mut policy_writer = PolicyWriter::create(&policy_pathname).unwrap();
        policy_writer.write(Direction::Left).unwrap();
        policy_writer.finish().unwrap();

        let transient_pathname = directory.join("0004-1.transient");
        let mut transient_writer =
            BinaryWriter::<StateProbability, _>::create(&transient_pathname).unwrap();
        transient_writer
            .write(&StateProbability { state: state.nybbles(), probability: 0.5 })
            .unwrap();
        transient_writer.finish().unwrap();

        let mut builder =
            TrancheBuilder::<2>::new(6, 1e-6, part, &transient_pathname).unwrap();
        let mut vbyte_reader = VByteReader::open(&states_pathname).unwrap();
        let mut policy_reader = PolicyReader::open(&policy_pathname).unwrap();
        let bitset_pathname = directory.join("tranche.bitset");
        let transient_pr_pathname = directory.join("tranche.transient_pr");
        builder
            .build(
                &mut vbyte_reader,
                &mut policy_reader,
                &bitset_pathname,
                &transient_pr_pathname,
            )
            .unwrap();

        let mut bitset_reader = BitSetReader::open(&bitset_pathname).unwrap();
        assert!(bitset_reader.read().unwrap());
        let mut pr_reader = BinaryReader::<f64>::open(&transient_pr_pathname).unwrap();
        assert!((pr_reader.read().unwrap().unwrap() - 0.5).abs() < 1e-12);

        // All outgoing probability lands in successor transient shards.
        let shard_pathnames = [
            [directory.join("shard-1-0.bin"), directory.join("shard-1-1.bin")],
            [directory.join("shard-2-0.bin"), directory.join("shard-2-1.bin")],
        ];
        builder
            .write(
                [
                    [Some(shard_pathnames[0][0].as_path()), Some(shard_pathnames[0][1].as_path())],
                    [Some(shard_pathnames[1][0].as_path()), Some(shard_pathnames[1][1].as_path())],
                ],
                [[None, None], [None, None]],
                [None, None],
            )
            .unwrap();

        let mut total = 0.0;
        for pathname in shard_pathnames.iter().flatten() {
            if !pathname.exists() {
                continue;
            }
            let mut reader = BinaryReader::<StateProbability>::open(pathname).unwrap();
            while let Some(record) = reader.read().unwrap() {
                total += record.probability;
            }
        }
        assert!((total - 0.5).abs() < 1e-12);
        std::fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    fn test_subset_policy() {
        let directory = temp_directory("subset");
        let original_states = [10u64, 20, 30, 40];
        let directions = [
            Direction::Left,
            Direction::Right,
            Direction::Up,
            Direction::Down,
        ];
        let original_states_pathname = directory.join("original.vbyte");
        write_states_vbyte(&original_states, &original_states_pathname).unwrap();
        let original_policy_pathname = directory.join("original.policy");
        let mut policy_writer = PolicyWriter::create(&original_policy_pathname).unwrap();
        for &direction in &directions {
            policy_writer.write(direction).unwrap();
        }
        policy_writer.finish().unwrap();

        let subset_states_pathname = directory.join("subset.vbyte");
        write_states_vbyte(&[20, 40], &subset_states_pathname).unwrap();

        let subset_policy_pathname = directory.join("subset.policy");
        let mut subset_writer = PolicyWriter::create(&subset_policy_pathname).unwrap();
        subset_policy(
            &mut VByteReader::open(&original_states_pathname).unwrap(),
            &mut PolicyReader::open(&original_policy_pathname).unwrap(),
            &mut VByteReader::open(&subset_states_pathname).unwrap(),
            &mut subset_writer,
        )
        .unwrap();
        subset_writer.finish().unwrap();

        let mut reader = PolicyReader::open(&subset_policy_pathname).unwrap();
        assert_eq!(reader.read().unwrap(), Direction::Right);
        assert_eq!(reader.read().unwrap(), Direction::Down);
        std::fs::remove_dir_all(&directory).unwrap();
    }
}
