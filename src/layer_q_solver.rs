//! Action-value (Q) solving for one layer part.
//!
//! The plain solver maps all four successor parts at once. When even two
//! mapped parts are too big for memory, the Q solver trades passes for
//! space: it keeps a `Q` file with four action values per state and makes
//! one pass per successor part, each pass accumulating only the
//! contributions of successors that fall in that part. After all passes
//! the `Q` file is complete and [`LayerQSolver::finish`] picks the optimal
//! actions.
//!
//! Infeasible actions are marked with negative infinity on the first pass
//! so later passes can skip them.

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::constants::{Direction, DIRECTIONS};
use crate::layer_solver::SolutionWriter;
use crate::state::State;
use crate::storage::binary::{BinaryWriter, Record};
use crate::storage::mmap::MmapValueReader;
use crate::storage::vbyte::VByteReader;
use crate::valuer::Valuer;

/// Four action values for one state, indexed by direction code.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QValues(pub [f64; 4]);

impl Record for QValues {
    const SIZE: usize = 32;

    fn write_to(&self, buffer: &mut [u8]) {
        for (i, value) in self.0.iter().enumerate() {
            buffer[8 * i..8 * (i + 1)].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn read_from(buffer: &[u8]) -> Self {
        let mut values = [0.0; 4];
        for (i, value) in values.iter_mut().enumerate() {
            *value = f64::from_le_bytes(buffer[8 * i..8 * (i + 1)].try_into().unwrap());
        }
        QValues(values)
    }
}

/// Create a `Q` file of zeroed records, one per state in the part.
pub fn initialize_q(q_pathname: &Path, num_states: u64) -> io::Result<()> {
    let mut writer = BinaryWriter::<QValues>::create(q_pathname)?;
    for _ in 0..num_states {
        writer.write(&QValues([0.0; 4]))?;
    }
    writer.finish()
}

/// One accumulation pass, bound to a single successor part.
pub struct LayerQSolver<const N: usize> {
    valuer: Valuer,
    successor_sum: u32,
    successor_max_value: u8,
    value_reader: Option<MmapValueReader>,
}

impl<const N: usize> LayerQSolver<N> {
    pub fn new(
        valuer: Valuer,
        successor_sum: u32,
        successor_max_value: u8,
        values_pathname: Option<&Path>,
    ) -> io::Result<Self> {
        let value_reader = match values_pathname {
            Some(pathname) => Some(MmapValueReader::open(pathname)?),
            None => None,
        };
        Ok(LayerQSolver {
            valuer,
            successor_sum,
            successor_max_value,
            value_reader,
        })
    }

    pub fn discount(&self) -> f64 {
        self.valuer.discount()
    }

    /// Accumulate this successor part's contributions into the `Q` file.
    /// Records are rewritten in place only when they change.
    pub fn solve<R: Read>(
        &self,
        vbyte_reader: &mut VByteReader<R>,
        q_pathname: &Path,
    ) -> io::Result<()> {
        let mut q_file = OpenOptions::new().read(true).write(true).open(q_pathname)?;
        let mut offset = 0u64;
        let mut buffer = [0u8; QValues::SIZE];
        loop {
            let nybbles = vbyte_reader.read()?;
            if nybbles == 0 {
                break;
            }
            let state = State::<N>::new(nybbles);

            q_file.read_exact(&mut buffer)?;
            let mut q = QValues::read_from(&buffer);

            let mut changed = false;
            for &direction in &DIRECTIONS {
                changed |= self.backup(state, direction, &mut q.0[direction.code() as usize]);
            }

            if changed {
                q.write_to(&mut buffer);
                q_file.seek(SeekFrom::Start(offset))?;
                q_file.write_all(&buffer)?;
            }
            offset += QValues::SIZE as u64;
        }
        q_file.flush()
    }

    /// After all passes, read back the completed `Q` file and write the
    /// solution.
    pub fn finish<R: Read>(
        vbyte_reader: &mut VByteReader<R>,
        q_pathname: &Path,
        solution_writer: &mut SolutionWriter,
    ) -> io::Result<()> {
        let mut q_reader =
            crate::storage::binary::BinaryReader::<QValues>::open(q_pathname)?;
        loop {
            let nybbles = vbyte_reader.read()?;
            if nybbles == 0 {
                break;
            }
            let q = q_reader.read()?.ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "q file shorter than state file")
            })?;
            solution_writer.choose(nybbles, q.0)?;
        }
        Ok(())
    }

    fn backup(&self, state: State<N>, direction: Direction, q_value: &mut f64) -> bool {
        // Already marked infeasible by an earlier pass.
        if *q_value < 0.0 {
            return false;
        }

        let moved = state.move_in(direction);
        if moved == state {
            *q_value = f64::NEG_INFINITY;
            return true;
        }

        let mut changed = false;
        for (&successor, &probability) in &moved.random_transitions() {
            if let Some(value) = self.lookup_value(successor) {
                changed = true;
                *q_value += probability * self.discount() * value;
            }
        }
        changed
    }

    /// The value of a successor, if it belongs to this pass's part.
    fn lookup_value(&self, state: State<N>) -> Option<f64> {
        if state.sum() != self.successor_sum || state.max_value() != self.successor_max_value {
            return None;
        }
        if let Some(value) = self.valuer.value(state) {
            return Some(value);
        }
        match &self.value_reader {
            Some(reader) => Some(reader.get_value(state.nybbles())),
            None => panic!("no values loaded for successor state {}", state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::binary::{BinaryReader, StateValue};
    use crate::storage::policy::PolicyReader;
    use crate::storage::vbyte::write_states_vbyte;
    use std::path::PathBuf;

    fn temp_directory(tag: &str) -> PathBuf {
        let directory =
            std::env::temp_dir().join(format!("layer_q_solver_{}_{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&directory);
        std::fs::create_dir_all(&directory).unwrap();
        directory
    }

    #[test]
    fn test_q_values_record_round_trip() {
        let q = QValues([0.25, -1.0, f64::NEG_INFINITY, 1.0]);
        let mut buffer = [0u8; QValues::SIZE];
        q.write_to(&mut buffer);
        assert_eq!(QValues::read_from(&buffer), q);
    }

    #[test]
    fn test_passes_match_direct_solve() {
        let directory = temp_directory("passes");
        let valuer = Valuer::new(5, 1, 1.0);

        // One state, one merge from the 32 tile. All successors resolve
        // through the valuer, so the passes need no value files.
        let state = State::<2>::from_cells(&[1, 0, 4, 4]);
        let states_pathname = directory.join("states.vbyte");
        write_states_vbyte(&[state.nybbles()], &states_pathname).unwrap();

        let q_pathname = directory.join("part.q");
        initialize_q(&q_pathname, 1).unwrap();

        let sum = state.sum();
        let max_value = state.max_value();
        for (step, jump) in [(2u32, 0u8), (2, 1), (4, 0), (4, 1)] {
            let solver =
                LayerQSolver::<2>::new(valuer, sum + step, max_value + jump, None).unwrap();
            let mut reader = VByteReader::open(&states_pathname).unwrap();
            solver.solve(&mut reader, &q_pathname).unwrap();
        }

        let mut writer = SolutionWriter::new(
            &directory.join("solution.policy"),
            &directory.join("solution.values"),
            None,
        )
        .unwrap();
        let mut reader = VByteReader::open(&states_pathname).unwrap();
        LayerQSolver::<2>::finish(&mut reader, &q_pathname, &mut writer).unwrap();
        writer.finish().unwrap();

        // Merging the 16s wins whatever spawns; Left is the first such
        // action.
        let mut policy = PolicyReader::open(&directory.join("solution.policy")).unwrap();
        assert_eq!(policy.read().unwrap(), Direction::Left);
        let mut values =
            BinaryReader::<StateValue>::open(&directory.join("solution.values")).unwrap();
        let record = values.read().unwrap().unwrap();
        assert_eq!(record.state, state.nybbles());
        assert!((record.value - 1.0).abs() < 1e-12);

        std::fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    fn test_infeasible_actions_marked_once() {
        let directory = temp_directory("infeasible");
        // Up and Down cannot move this board.
        let state = State::<2>::from_cells(&[1, 1, 2, 3]);
        assert_eq!(state.move_in(Direction::Up), state);
        assert_eq!(state.move_in(Direction::Down), state);

        let states_pathname = directory.join("states.vbyte");
        write_states_vbyte(&[state.nybbles()], &states_pathname).unwrap();
        let q_pathname = directory.join("part.q");
        initialize_q(&q_pathname, 1).unwrap();

        let valuer = Valuer::new(11, 1, 1.0);
        // A pass whose partition matches none of the successors still
        // marks the infeasible actions.
        let solver = LayerQSolver::<2>::new(valuer, 9999, 11, None).unwrap();
        let mut reader = VByteReader::open(&states_pathname).unwrap();
        solver.solve(&mut reader, &q_pathname).unwrap();

        let mut q_reader = BinaryReader::<QValues>::open(&q_pathname).unwrap();
        let q = q_reader.read().unwrap().unwrap();
        assert_eq!(q.0[Direction::Left.code() as usize], 0.0);
        assert_eq!(q.0[Direction::Right.code() as usize], 0.0);
        assert_eq!(q.0[Direction::Up.code() as usize], f64::NEG_INFINITY);
        assert_eq!(q.0[Direction::Down.code() as usize], f64::NEG_INFINITY);

        std::fs::remove_dir_all(&directory).unwrap();
    }
}
