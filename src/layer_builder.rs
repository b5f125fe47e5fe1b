//! Builds the reachable state space layer by layer.
//!
//! Every move increases the tile sum by exactly 2 or 4, so the layers form
//! a DAG: the successors of a state with sum `s` all have sum `s + 2` or
//! `s + 4`. The builder expands each layer part in parallel batches,
//! writes the successors of each batch as sorted fragment files, and
//! merges fragments into the next layers' part files once no more
//! fragments can arrive for them.
//!
//! States whose value is already decided by the [`Valuer`] are not stored
//! at all; the solver re-derives their values on lookup.

use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::constants::DIRECTIONS;
use crate::layers::{
    find_max_values, list_fragments, read_part_info, write_part_info, FragmentName, PartInfo,
    PartName,
};
use crate::start_states::generate_start_states;
use crate::state::State;
use crate::state_set::StateHashSet;
use crate::storage::merge::merge_states;
use crate::storage::vbyte::{write_states_vbyte, VByteIndexEntry, VByteReader};
use crate::valuer::Valuer;

const STATE_BYTE_SIZE: usize = 8;

/// How many successor states can one batch safely hold if every core runs
/// a batch at once?
pub fn find_max_successor_states(working_memory: usize) -> usize {
    let batch_memory = working_memory / rayon::current_num_threads();
    batch_memory / STATE_BYTE_SIZE
}

pub struct LayerBuilder<const N: usize> {
    layer_directory: PathBuf,
    batch_size: u64,
    max_successor_states: usize,
    valuer: Valuer,
    verbose: bool,
}

impl<const N: usize> LayerBuilder<N> {
    pub fn new(
        layer_directory: impl Into<PathBuf>,
        batch_size: u64,
        max_successor_states: usize,
        valuer: Valuer,
        verbose: bool,
    ) -> Self {
        assert!(batch_size > 0, "bad batch size");
        LayerBuilder {
            layer_directory: layer_directory.into(),
            batch_size,
            max_successor_states,
            valuer,
            verbose,
        }
    }

    pub fn layer_directory(&self) -> &Path {
        &self.layer_directory
    }

    pub fn valuer(&self) -> &Valuer {
        &self.valuer
    }

    /// Write the layers that contain start states, with sums 4, 6 and 8.
    ///
    /// The sum 4 layer is complete as soon as the start states are known,
    /// so it gets a finished part file. The sum 6 and 8 layers also
    /// receive successors from earlier layers, so their start states are
    /// written as fragments for the normal merge to pick up.
    pub fn build_start_state_layers(&self) -> io::Result<()> {
        let start_states = generate_start_states::<N>();
        for layer_sum in [4u32, 6, 8] {
            let mut by_max_value: Vec<(u8, Vec<u64>)> = Vec::new();
            for state in &start_states {
                if state.sum() != layer_sum {
                    continue;
                }
                let max_value = state.max_value();
                match by_max_value.iter_mut().find(|(mv, _)| *mv == max_value) {
                    Some((_, states)) => states.push(state.nybbles()),
                    None => by_max_value.push((max_value, vec![state.nybbles()])),
                }
            }
            for (max_value, states) in by_max_value {
                let name = PartName::new(layer_sum, max_value);
                if layer_sum == 4 {
                    write_states_vbyte(&states, name.states_pathname(&self.layer_directory))?;
                    write_part_info(
                        &self.layer_directory,
                        name,
                        &PartInfo {
                            num_states: states.len() as u64,
                            batch_size: self.batch_size,
                            index: Vec::new(),
                        },
                    )?;
                } else {
                    let fragment = FragmentName {
                        input_sum: layer_sum,
                        input_max_value: max_value,
                        output_sum: layer_sum,
                        output_max_value: max_value,
                        batch: 0,
                    };
                    write_states_vbyte(&states, fragment.pathname(&self.layer_directory))?;
                }
            }
        }
        Ok(())
    }

    /// Build every layer, starting from the output of
    /// [`LayerBuilder::build_start_state_layers`]. Stops after two
    /// consecutive empty layers; a single empty layer can still feed a
    /// later one through sum jumps of 4.
    pub fn build(&self) -> io::Result<()> {
        self.build_from(4)
    }

    pub fn build_from(&self, start_layer_sum: u32) -> io::Result<()> {
        let mut skips = 0;
        let mut layer_sum = start_layer_sum;
        while skips < 2 {
            let num_states = self.build_layer(layer_sum)?;
            if num_states > 0 {
                skips = 0;
            } else {
                skips += 1;
            }
            layer_sum += 2;
        }
        self.remove_empty_parts(layer_sum + 4)
    }

    /// Expand all parts of one layer and merge the completed successor
    /// parts. Returns the number of states in the layer.
    pub fn build_layer(&self, layer_sum: u32) -> io::Result<u64> {
        let max_values = find_max_values(&self.layer_directory, layer_sum)?;
        let mut num_states = 0;
        for &max_value in &max_values {
            self.build_part(layer_sum, max_value)?;
            self.reduce_parts(layer_sum, max_value)?;
            num_states += self.count_states(layer_sum, max_value)?;
        }
        if let Some(&max_value) = max_values.last() {
            self.reduce_parts(layer_sum, max_value + 1)?;
        }
        Ok(num_states)
    }

    /// Expand one part in parallel batches, writing one fragment per
    /// batch and successor part.
    pub fn build_part(&self, sum: u32, max_value: u8) -> io::Result<()> {
        let name = PartName::new(sum, max_value);
        let info = read_part_info(&self.layer_directory, name)?;
        if info.num_states == 0 {
            return Ok(());
        }
        let batches = info.batches();
        self.log(format_args!(
            "build {:04}-{:x}: {} states ({} batches)",
            sum,
            max_value,
            info.num_states,
            batches.len()
        ));

        batches
            .par_iter()
            .enumerate()
            .try_for_each(|(batch, &entry)| {
                self.build_part_batch(name, info.batch_size, batch as u32, entry)
            })
    }

    fn build_part_batch(
        &self,
        name: PartName,
        batch_size: u64,
        batch: u32,
        entry: VByteIndexEntry,
    ) -> io::Result<()> {
        let states_pathname = name.states_pathname(&self.layer_directory);
        let mut reader =
            VByteReader::open_at(&states_pathname, entry.byte_offset, entry.previous, batch_size)?;

        // One successor set per (sum step, max value jump).
        let mut successors: Vec<StateHashSet<N>> = (0..4)
            .map(|_| StateHashSet::new(self.max_successor_states))
            .collect();

        loop {
            let nybbles = reader.read()?;
            if nybbles == 0 {
                break;
            }
            let state = State::<N>::new(nybbles);
            for &direction in &DIRECTIONS {
                let moved = state.move_in(direction);
                if moved == state {
                    continue;
                }
                for &successor in moved.random_transitions().keys() {
                    if self.valuer.value(successor).is_some() {
                        continue;
                    }
                    let step = (successor.sum() - name.sum) / 2;
                    let jump = successor.max_value() - name.max_value;
                    assert!(
                        (1..=2).contains(&step) && jump <= 1,
                        "unexpected successor {} of {}",
                        successor,
                        state
                    );
                    successors[(step as usize - 1) * 2 + jump as usize].insert(successor);
                }
            }
        }

        for (i, set) in successors.iter_mut().enumerate() {
            let step = (i / 2 + 1) as u32;
            let jump = (i % 2) as u8;
            let fragment = FragmentName {
                input_sum: name.sum,
                input_max_value: name.max_value,
                output_sum: name.sum + 2 * step,
                output_max_value: name.max_value + jump,
                batch,
            };
            let states: Vec<u64> = set.drain_sorted().iter().map(|s| s.nybbles()).collect();
            write_states_vbyte(&states, fragment.pathname(&self.layer_directory))?;
        }
        Ok(())
    }

    /// Merge the fragments of every successor part that can no longer
    /// receive new fragments.
    ///
    /// Parts are expanded in ascending `max_value` order, so after
    /// expanding `(sum, max_value)` every part with sum `sum + 2` and
    /// maximum value at most `max_value` is final. If an output part file
    /// already exists it is folded into the merge, so an interrupted and
    /// restarted build converges to the same union.
    pub fn reduce_parts(&self, sum: u32, max_value: u8) -> io::Result<()> {
        let fragments: Vec<FragmentName> = list_fragments(&self.layer_directory)?
            .into_iter()
            .filter(|name| name.output_sum == sum + 2 && name.output_max_value <= max_value)
            .collect();

        let mut output_parts: Vec<PartName> = fragments.iter().map(|f| f.output_part()).collect();
        output_parts.sort();
        output_parts.dedup();

        for output_part in output_parts {
            let mut input_pathnames: Vec<PathBuf> = fragments
                .iter()
                .filter(|name| name.output_part() == output_part)
                .map(|name| name.pathname(&self.layer_directory))
                .collect();

            let output_pathname = output_part.states_pathname(&self.layer_directory);
            let merged_pathname = output_part.pathname(&self.layer_directory, "vbyte.tmp");
            if output_pathname.exists() {
                input_pathnames.push(output_pathname.clone());
            }
            self.log_reduce(output_part, &input_pathnames)?;

            let (num_states, index) =
                merge_states(&input_pathnames, &merged_pathname, self.batch_size)?;
            std::fs::rename(&merged_pathname, &output_pathname)?;
            write_part_info(
                &self.layer_directory,
                output_part,
                &PartInfo {
                    num_states,
                    batch_size: self.batch_size,
                    index,
                },
            )?;

            for pathname in &input_pathnames {
                if pathname != &output_pathname {
                    std::fs::remove_file(pathname)?;
                }
            }
        }
        Ok(())
    }

    pub fn count_states(&self, sum: u32, max_value: u8) -> io::Result<u64> {
        Ok(read_part_info(&self.layer_directory, PartName::new(sum, max_value))?.num_states)
    }

    /// The expansion can leave empty part files behind; clean them up once
    /// the build is done.
    pub fn remove_empty_parts(&self, max_layer_sum: u32) -> io::Result<()> {
        for name in crate::layers::list_parts(&self.layer_directory)? {
            if name.sum > max_layer_sum {
                continue;
            }
            let states_pathname = name.states_pathname(&self.layer_directory);
            if std::fs::metadata(&states_pathname)?.len() == 0 {
                std::fs::remove_file(&states_pathname)?;
                let info_pathname = name.info_pathname(&self.layer_directory);
                if info_pathname.exists() {
                    std::fs::remove_file(&info_pathname)?;
                }
            }
        }
        Ok(())
    }

    fn log_reduce(&self, output_part: PartName, input_pathnames: &[PathBuf]) -> io::Result<()> {
        if !self.verbose {
            return Ok(());
        }
        let mut total_size = 0;
        let mut max_size = 0;
        for pathname in input_pathnames {
            let size = std::fs::metadata(pathname)?.len();
            total_size += size;
            max_size = max_size.max(size);
        }
        self.log(format_args!(
            "reduce {:04}-{:x}: {:.1}MiB ({:.1}MiB max)",
            output_part.sum,
            output_part.max_value,
            total_size as f64 / (1024.0 * 1024.0),
            max_size as f64 / (1024.0 * 1024.0)
        ));
        Ok(())
    }

    fn log(&self, message: std::fmt::Arguments<'_>) {
        if self.verbose {
            println!("{}", message);
        }
    }
}
