//! Property-based tests for board mechanics and the vbyte codec.

use proptest::prelude::*;

use twenty48::constants::{Direction, DIRECTIONS, PROBABILITY_TOLERANCE};
use twenty48::state::State;
use twenty48::storage::vbyte::{VByteReader, VByteWriter};

/// Strategy: generate a 4x4 board with cells up to the 2048 tile.
fn cells_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0..=11u8, 16)
}

/// Strategy: generate a direction.
fn direction_strategy() -> impl Strategy<Value = Direction> {
    (0..4u8).prop_map(Direction::from_code)
}

proptest! {
    // 1. Canonicalization is idempotent
    #[test]
    fn canonicalize_idempotent(cells in cells_strategy()) {
        let state = State::<4>::from_cells(&cells);
        let canonical = state.canonicalize();
        prop_assert_eq!(canonical.canonicalize(), canonical);
    }

    // 2. All 8 symmetries of a board share a canonical form
    #[test]
    fn canonicalize_invariant_under_symmetry(cells in cells_strategy()) {
        let state = State::<4>::from_cells(&cells);
        let canonical = state.canonicalize();
        prop_assert_eq!(state.reflect_horizontally().canonicalize(), canonical);
        prop_assert_eq!(state.reflect_vertically().canonicalize(), canonical);
        prop_assert_eq!(state.transpose().canonicalize(), canonical);
        prop_assert_eq!(
            state.transpose().reflect_horizontally().canonicalize(),
            canonical
        );
    }

    // 3. The canonical form is never larger than the original packed value
    #[test]
    fn canonical_is_minimal(cells in cells_strategy()) {
        let state = State::<4>::from_cells(&cells);
        prop_assert!(state.canonicalize().nybbles() <= state.nybbles());
    }

    // 4. Moves preserve the tile sum (merging two 2^k tiles makes one 2^(k+1))
    #[test]
    fn move_preserves_sum(cells in cells_strategy(), direction in direction_strategy()) {
        let state = State::<4>::from_cells(&cells);
        prop_assert_eq!(state.move_in(direction).sum(), state.sum());
    }

    // 5. Moves never decrease the maximum tile
    #[test]
    fn move_never_loses_max(cells in cells_strategy(), direction in direction_strategy()) {
        let state = State::<4>::from_cells(&cells);
        prop_assert!(state.move_in(direction).max_value() >= state.max_value());
    }

    // 6. Spawn transition probabilities sum to 1
    #[test]
    fn transitions_sum_to_one(cells in cells_strategy()) {
        let state = State::<4>::from_cells(&cells);
        prop_assume!(state.cells_available() > 0);
        let total: f64 = state.random_transitions().values().sum();
        prop_assert!((total - 1.0).abs() < PROBABILITY_TOLERANCE);
    }

    // 7. Spawning raises the tile sum by exactly 2 or 4
    #[test]
    fn transitions_raise_sum(cells in cells_strategy()) {
        let state = State::<4>::from_cells(&cells);
        prop_assume!(state.cells_available() > 0);
        for successor in state.random_transitions().keys() {
            let delta = successor.sum() - state.sum();
            prop_assert!(delta == 2 || delta == 4);
        }
    }

    // 8. A nonempty board is lost exactly when no direction moves
    #[test]
    fn lose_iff_no_move(cells in cells_strategy()) {
        let state = State::<4>::from_cells(&cells);
        prop_assume!(state.nybbles() != 0);
        let stuck = DIRECTIONS.iter().all(|&direction| state.move_in(direction) == state);
        prop_assert_eq!(state.lose(), stuck);
    }

    // 9. Cell packing round trips
    #[test]
    fn cells_round_trip(cells in cells_strategy()) {
        let state = State::<4>::from_cells(&cells);
        prop_assert_eq!(state.to_cells(), cells);
    }

    // 10. The vbyte codec round trips any strictly increasing sequence
    #[test]
    fn vbyte_round_trip(deltas in prop::collection::vec(1..=u32::MAX as u64, 0..100)) {
        let mut values = Vec::with_capacity(deltas.len());
        let mut current = 0u64;
        for delta in deltas {
            current += delta;
            values.push(current);
        }

        let directory = std::env::temp_dir();
        let pathname = directory.join(format!(
            "test_properties_vbyte_{}_{}",
            std::process::id(),
            values.last().copied().unwrap_or(0)
        ));
        let mut writer = VByteWriter::create(&pathname).unwrap();
        for &value in &values {
            writer.write(value).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = VByteReader::open(&pathname).unwrap();
        let mut decoded = Vec::with_capacity(values.len());
        loop {
            let value = reader.read().unwrap();
            if value == 0 {
                break;
            }
            decoded.push(value);
        }
        std::fs::remove_file(&pathname).unwrap();
        prop_assert_eq!(decoded, values);
    }
}

// 11. A full board with no adjacent pair is lost in every direction
#[test]
fn checkerboard_is_lost() {
    let state = State::<4>::from_cells(&[
        1, 2, 1, 2, //
        2, 1, 2, 1, //
        1, 2, 1, 2, //
        2, 1, 2, 1,
    ]);
    assert!(state.lose());
    for &direction in &DIRECTIONS {
        assert_eq!(state.move_in(direction), state);
    }
}
