//! End-to-end solve of the 2x2 game with a 32 tile target.
//!
//! Builds the full layered model, solves it backward, and then pushes the
//! start state probabilities forward under the solved policy. The forward
//! pass must conserve probability, and the total win probability it finds
//! must agree with the expected value from backward induction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use twenty48::layer_builder::LayerBuilder;
use twenty48::layer_solver::{LayerSolver, SolutionWriter};
use twenty48::layers::{list_parts, read_part_info, PartName};
use twenty48::start_states::start_state_probabilities;
use twenty48::state::State;
use twenty48::storage::binary::{BinaryReader, StateProbability, StateValue};
use twenty48::storage::merge::merge_state_probabilities;
use twenty48::storage::mmap::MmapValueReader;
use twenty48::storage::policy::PolicyReader;
use twenty48::storage::vbyte::VByteReader;
use twenty48::tranche::{write_start_state_probabilities, TrancheBuilder};
use twenty48::valuer::Valuer;

const MAX_EXPONENT: u8 = 5;

fn sum_probabilities(pathname: &PathBuf) -> f64 {
    let mut reader = BinaryReader::<StateProbability>::open(pathname).unwrap();
    let mut total = 0.0;
    while let Some(record) = reader.read().unwrap() {
        total += record.probability;
    }
    total
}

// Build the full layered model and solve each part, highest layer first.
// Parts within a layer only depend on later layers, so any order within a
// layer works.
fn build_and_solve(directory: &Path, max_exponent: u8) -> Vec<PartName> {
    let valuer = Valuer::new(max_exponent, 0, 1.0);
    let builder = LayerBuilder::<2>::new(directory, 1000, 1 << 16, valuer, false);
    builder.build_start_state_layers().unwrap();
    builder.build().unwrap();

    let parts = list_parts(directory).unwrap();
    assert!(!parts.is_empty());
    for &part in parts.iter().rev() {
        let mut solver = LayerSolver::<2>::new(Valuer::new(max_exponent, 0, 1.0));
        let mut successor_pathnames: [[Option<PathBuf>; 2]; 2] = [[None, None], [None, None]];
        for (i, row) in successor_pathnames.iter_mut().enumerate() {
            for (j, entry) in row.iter_mut().enumerate() {
                let successor =
                    PartName::new(part.sum + 2 * (i as u32 + 1), part.max_value + j as u8);
                let pathname = successor.pathname(directory, "values");
                if pathname.exists() {
                    *entry = Some(pathname);
                }
            }
        }
        solver
            .load([
                [
                    successor_pathnames[0][0].as_deref(),
                    successor_pathnames[0][1].as_deref(),
                ],
                [
                    successor_pathnames[1][0].as_deref(),
                    successor_pathnames[1][1].as_deref(),
                ],
            ])
            .unwrap();

        let mut vbyte_reader = VByteReader::open(part.states_pathname(directory)).unwrap();
        let mut writer = SolutionWriter::new(
            &part.pathname(directory, "policy"),
            &part.pathname(directory, "values"),
            Some((&part.pathname(directory, "alternate_actions"), 1e-9)),
        )
        .unwrap();
        solver.solve(&mut vbyte_reader, part.sum, part.max_value, &mut writer).unwrap();
        writer.finish().unwrap();
    }
    parts
}

#[test]
fn test_build_solve_and_propagate_2x2() {
    let directory =
        std::env::temp_dir().join(format!("end_to_end_2x2_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&directory);
    std::fs::create_dir_all(&directory).unwrap();

    let parts = build_and_solve(&directory, MAX_EXPONENT);

    // Every part's values file covers all of its states with values that
    // are probabilities.
    for &part in &parts {
        let info = read_part_info(&directory, part).unwrap();
        let mut reader =
            BinaryReader::<StateValue>::open(part.pathname(&directory, "values")).unwrap();
        let mut num_records = 0;
        while let Some(record) = reader.read().unwrap() {
            assert!(record.value >= 0.0 && record.value <= 1.0);
            num_records += 1;
        }
        assert_eq!(num_records, info.num_states);
    }

    // Expected win probability over the start states.
    let mut expected_win = 0.0;
    for (state, probability) in &start_state_probabilities::<2>() {
        let value = match Valuer::new(MAX_EXPONENT, 0, 1.0).value(*state) {
            Some(value) => value,
            None => {
                let part = PartName::new(state.sum(), state.max_value());
                let reader =
                    MmapValueReader::open(&part.pathname(&directory, "values")).unwrap();
                reader.get_value(state.nybbles())
            }
        };
        expected_win += probability * value;
    }
    assert!(expected_win > 0.0 && expected_win < 1.0);

    // Forward pass: start state shards first, then each part in sum order.
    let mut pending: BTreeMap<PartName, Vec<PathBuf>> = BTreeMap::new();
    for &part in &parts {
        let pathname =
            directory.join(format!("start-{:04}-{:x}.transient", part.sum, part.max_value));
        if write_start_state_probabilities::<2>(part, &pathname).unwrap() > 0 {
            pending.entry(part).or_default().push(pathname);
        }
    }

    let mut total_win = 0.0;
    let mut total_loss = 0.0;
    for &part in &parts {
        let shards = match pending.remove(&part) {
            Some(shards) => shards,
            None => continue,
        };
        let transient_pathname = part.pathname(&directory, "transient");
        merge_state_probabilities(&shards, &transient_pathname).unwrap();

        let mut tranche_builder =
            TrancheBuilder::<2>::new(MAX_EXPONENT, 0.0, part, &transient_pathname).unwrap();
        let mut vbyte_reader = VByteReader::open(part.states_pathname(&directory)).unwrap();
        let mut policy_reader =
            PolicyReader::open(&part.pathname(&directory, "policy")).unwrap();
        tranche_builder
            .build(
                &mut vbyte_reader,
                &mut policy_reader,
                &part.pathname(&directory, "bitset"),
                &part.pathname(&directory, "transient_pr"),
            )
            .unwrap();

        let shard_pathname = |kind: &str, i: usize, j: usize| {
            directory.join(format!(
                "shard-{:04}-{:x}-{}-{}-{}.transient",
                part.sum, part.max_value, kind, i, j
            ))
        };
        let transient_pathnames: [[PathBuf; 2]; 2] = [
            [shard_pathname("t", 0, 0), shard_pathname("t", 0, 1)],
            [shard_pathname("t", 1, 0), shard_pathname("t", 1, 1)],
        ];
        let loss_pathnames: [[PathBuf; 2]; 2] = [
            [shard_pathname("l", 0, 0), shard_pathname("l", 0, 1)],
            [shard_pathname("l", 1, 0), shard_pathname("l", 1, 1)],
        ];
        let win_pathnames = [shard_pathname("w", 0, 0), shard_pathname("w", 1, 0)];
        tranche_builder
            .write(
                [
                    [
                        Some(transient_pathnames[0][0].as_path()),
                        Some(transient_pathnames[0][1].as_path()),
                    ],
                    [
                        Some(transient_pathnames[1][0].as_path()),
                        Some(transient_pathnames[1][1].as_path()),
                    ],
                ],
                [
                    [
                        Some(loss_pathnames[0][0].as_path()),
                        Some(loss_pathnames[0][1].as_path()),
                    ],
                    [
                        Some(loss_pathnames[1][0].as_path()),
                        Some(loss_pathnames[1][1].as_path()),
                    ],
                ],
                [Some(win_pathnames[0].as_path()), Some(win_pathnames[1].as_path())],
            )
            .unwrap();

        for i in 0..2 {
            for j in 0..2 {
                if transient_pathnames[i][j].exists() {
                    let successor =
                        PartName::new(part.sum + 2 * (i as u32 + 1), part.max_value + j as u8);
                    pending
                        .entry(successor)
                        .or_default()
                        .push(transient_pathnames[i][j].clone());
                }
                if loss_pathnames[i][j].exists() {
                    total_loss += sum_probabilities(&loss_pathnames[i][j]);
                }
            }
            if win_pathnames[i].exists() {
                total_win += sum_probabilities(&win_pathnames[i]);
            }
        }
    }

    // No probability may leak into parts that were never enumerated.
    assert!(pending.is_empty());
    assert!((total_win + total_loss - 1.0).abs() < 1e-9);
    assert!((total_win - expected_win).abs() < 1e-9);

    std::fs::remove_dir_all(&directory).unwrap();
}

#[test]
fn test_adjacent_start_state_value_with_8_tile_target() {
    let directory =
        std::env::temp_dir().join(format!("end_to_end_2x2_8_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&directory);
    std::fs::create_dir_all(&directory).unwrap();

    build_and_solve(&directory, 3);

    // Both start tiles were 2s, side by side. The 8 is reachable but not
    // guaranteed, so the solved value is strictly between 0 and 1.
    let start = State::<2>::from_cells(&[1, 1, 0, 0]).canonicalize();
    let part = PartName::new(start.sum(), start.max_value());
    let reader = MmapValueReader::open(&part.pathname(&directory, "values")).unwrap();
    let value = reader.get_value(start.nybbles());
    assert!(value > 0.0 && value < 1.0, "start value {}", value);

    std::fs::remove_dir_all(&directory).unwrap();
}
