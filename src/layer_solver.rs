//! Backward induction over one layer part.
//!
//! Solving part `(sum, max_value)` requires the value functions of the up
//! to four successor parts, `(sum + 2, max_value)`, `(sum + 2, max_value +
//! 1)`, `(sum + 4, max_value)` and `(sum + 4, max_value + 1)`, already on
//! disk. They are memory mapped and looked up by binary search; states the
//! [`Valuer`] can decide are valued directly and never touch the maps.
//!
//! Output is a policy file, a sorted `{state, value}` file, and optionally
//! an alternate action file, all written through [`SolutionWriter`].

use std::io::{self, Read};
use std::path::Path;

use crate::constants::{Direction, DIRECTIONS};
use crate::state::State;
use crate::storage::alternate_actions::AlternateActionWriter;
use crate::storage::binary::{BinaryWriter, StateValue};
use crate::storage::mmap::MmapValueReader;
use crate::storage::policy::PolicyWriter;
use crate::storage::vbyte::VByteReader;
use crate::valuer::Valuer;

/// Marks an action that cannot be taken. Any feasible action's value is at
/// least 0, so the marker never wins the argmax and never registers as an
/// alternate action.
pub const INFEASIBLE_ACTION_VALUE: f64 = -1.0;

/// Writes the solved policy, values and optional alternate actions for one
/// part, one state at a time in state order.
pub struct SolutionWriter {
    policy_writer: PolicyWriter,
    values_writer: BinaryWriter<StateValue>,
    alternate_action_writer: Option<AlternateActionWriter>,
}

impl SolutionWriter {
    pub fn new(
        policy_pathname: &Path,
        values_pathname: &Path,
        alternate_actions: Option<(&Path, f64)>,
    ) -> io::Result<Self> {
        let alternate_action_writer = match alternate_actions {
            Some((pathname, tolerance)) => Some(AlternateActionWriter::create(pathname, tolerance)?),
            None => None,
        };
        Ok(SolutionWriter {
            policy_writer: PolicyWriter::create(policy_pathname)?,
            values_writer: BinaryWriter::create(values_pathname)?,
            alternate_action_writer,
        })
    }

    /// Pick the best action for a state and record it. Ties go to the
    /// earliest direction in `Left, Right, Up, Down` order.
    ///
    /// Panics if no action is feasible: states without a feasible action
    /// are losses, which the build already resolved, so one here means the
    /// layer files are inconsistent.
    pub fn choose(&mut self, state: u64, action_values: [f64; 4]) -> io::Result<()> {
        let mut action = Direction::Left;
        let mut value = action_values[0];
        for (code, &action_value) in action_values.iter().enumerate().skip(1) {
            if action_value > value {
                action = Direction::from_code(code as u8);
                value = action_value;
            }
        }
        if value < 0.0 {
            panic!("no feasible action for state {:016x}", state);
        }

        self.policy_writer.write(action)?;
        if let Some(writer) = &mut self.alternate_action_writer {
            writer.write(action, value, action_values)?;
        }
        self.values_writer.write(&StateValue { state, value })
    }

    pub fn finish(self) -> io::Result<()> {
        self.policy_writer.finish()?;
        if let Some(writer) = self.alternate_action_writer {
            writer.finish()?;
        }
        self.values_writer.finish()
    }
}

pub struct LayerSolver<const N: usize> {
    valuer: Valuer,
    // Indexed by [sum step - 1][max value jump].
    value_readers: [[Option<MmapValueReader>; 2]; 2],
}

impl<const N: usize> LayerSolver<N> {
    pub fn new(valuer: Valuer) -> Self {
        LayerSolver {
            valuer,
            value_readers: [[None, None], [None, None]],
        }
    }

    pub fn discount(&self) -> f64 {
        self.valuer.discount()
    }

    /// Map in the successor parts' value files. `pathnames[i][j]` is the
    /// values file for sum `sum + 2 * (i + 1)` and maximum value
    /// `max_value + j`, or `None` if that part has no states.
    pub fn load(&mut self, pathnames: [[Option<&Path>; 2]; 2]) -> io::Result<()> {
        for (i, row) in pathnames.iter().enumerate() {
            for (j, pathname) in row.iter().enumerate() {
                self.value_readers[i][j] = match pathname {
                    Some(pathname) => Some(MmapValueReader::open(pathname)?),
                    None => None,
                };
            }
        }
        Ok(())
    }

    /// Solve one part by streaming its states in order.
    pub fn solve<R: Read>(
        &self,
        vbyte_reader: &mut VByteReader<R>,
        sum: u32,
        max_value: u8,
        writer: &mut SolutionWriter,
    ) -> io::Result<()> {
        loop {
            let nybbles = vbyte_reader.read()?;
            if nybbles == 0 {
                break;
            }
            let state = State::<N>::new(nybbles);
            let mut action_values = [0.0; 4];
            for &direction in &DIRECTIONS {
                action_values[direction.code() as usize] =
                    self.backup_state_action(state, sum, max_value, direction);
            }
            writer.choose(nybbles, action_values)?;
        }
        Ok(())
    }

    fn backup_state_action(
        &self,
        state: State<N>,
        sum: u32,
        max_value: u8,
        direction: Direction,
    ) -> f64 {
        let moved = state.move_in(direction);
        if moved == state {
            return INFEASIBLE_ACTION_VALUE;
        }
        let mut action_value = 0.0;
        for (&successor, &probability) in &moved.random_transitions() {
            let value = self.lookup_value(successor, sum, max_value);
            action_value += probability * self.discount() * value;
        }
        action_value
    }

    fn lookup_value(&self, state: State<N>, sum: u32, max_value: u8) -> f64 {
        if let Some(value) = self.valuer.value(state) {
            return value;
        }

        let state_sum = state.sum();
        let state_max_value = state.max_value();
        let i = match state_sum {
            s if s == sum + 2 => 0,
            s if s == sum + 4 => 1,
            _ => panic!("lookup: bad successor sum {} from layer {}", state_sum, sum),
        };
        let j = match state_max_value {
            m if m == max_value => 0,
            m if m == max_value + 1 => 1,
            _ => panic!(
                "lookup: bad successor max value {:x} from part {:x}",
                state_max_value, max_value
            ),
        };
        match &self.value_readers[i][j] {
            Some(reader) => reader.get_value(state.nybbles()),
            None => panic!(
                "lookup: no values loaded for sum {} max value {:x}",
                state_sum, state_max_value
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::binary::BinaryReader;
    use crate::storage::policy::PolicyReader;
    use std::path::PathBuf;

    fn temp_directory(tag: &str) -> PathBuf {
        let directory =
            std::env::temp_dir().join(format!("layer_solver_{}_{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&directory);
        std::fs::create_dir_all(&directory).unwrap();
        directory
    }

    #[test]
    fn test_solution_writer_picks_first_best() {
        let directory = temp_directory("writer");
        let mut writer = SolutionWriter::new(
            &directory.join("solution.policy"),
            &directory.join("solution.values"),
            Some((&directory.join("solution.alternate"), 1e-9)),
        )
        .unwrap();
        // Right and Down tie; Right comes first in code order.
        writer.choose(0x12, [0.1, 0.7, 0.3, 0.7]).unwrap();
        // Only Up is feasible.
        writer
            .choose(
                0x21,
                [
                    INFEASIBLE_ACTION_VALUE,
                    INFEASIBLE_ACTION_VALUE,
                    0.0,
                    INFEASIBLE_ACTION_VALUE,
                ],
            )
            .unwrap();
        writer.finish().unwrap();

        let mut policy = PolicyReader::open(&directory.join("solution.policy")).unwrap();
        assert_eq!(policy.read().unwrap(), Direction::Right);
        assert_eq!(policy.read().unwrap(), Direction::Up);

        let mut values =
            BinaryReader::<StateValue>::open(&directory.join("solution.values")).unwrap();
        let first = values.read().unwrap().unwrap();
        assert_eq!(first.state, 0x12);
        assert_eq!(first.value, 0.7);
        let second = values.read().unwrap().unwrap();
        assert_eq!(second.value, 0.0);

        std::fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    #[should_panic(expected = "no feasible action")]
    fn test_solution_writer_rejects_all_infeasible() {
        let directory = temp_directory("infeasible");
        let mut writer = SolutionWriter::new(
            &directory.join("solution.policy"),
            &directory.join("solution.values"),
            None,
        )
        .unwrap();
        let _ = writer.choose(0x1, [INFEASIBLE_ACTION_VALUE; 4]);
    }

    #[test]
    fn test_solve_final_layer_against_valuer() {
        // With the 32 tile as the target, every state in the last layers
        // resolves through the valuer, so no value files are needed.
        let directory = temp_directory("final");
        let valuer = Valuer::new(5, 1, 1.0);
        let solver = LayerSolver::<2>::new(valuer);

        // A state one merge from the target: [4, 4] on the bottom row.
        let state = State::<2>::from_cells(&[1, 0, 4, 4]);
        let states = [state.nybbles()];
        let states_pathname = directory.join("states.vbyte");
        crate::storage::vbyte::write_states_vbyte(&states, &states_pathname).unwrap();

        let mut writer = SolutionWriter::new(
            &directory.join("solution.policy"),
            &directory.join("solution.values"),
            None,
        )
        .unwrap();
        let mut reader = VByteReader::open(&states_pathname).unwrap();
        solver
            .solve(&mut reader, state.sum(), state.max_value(), &mut writer)
            .unwrap();
        writer.finish().unwrap();

        let mut values =
            BinaryReader::<StateValue>::open(&directory.join("solution.values")).unwrap();
        let record = values.read().unwrap().unwrap();
        assert_eq!(record.state, state.nybbles());
        // Merging the pair wins regardless of the spawned tile.
        assert!((record.value - 1.0).abs() < 1e-12);

        std::fs::remove_dir_all(&directory).unwrap();
    }
}
