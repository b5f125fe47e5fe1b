//! External k-way merges over sorted shard files.
//!
//! Expansion writes one sorted fragment per batch; merging combines the
//! fragments into one sorted, deduplicated part file. The same shape of
//! merge combines per-tranche probability shards, summing instead of
//! deduplicating.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::path::Path;

use crate::storage::binary::{BinaryReader, BinaryWriter, StateProbability};
use crate::storage::vbyte::{VByteIndex, VByteIndexEntry, VByteReader, VByteWriter};

/// Merge sorted vbyte state files into one sorted file with duplicates
/// removed. Returns the number of distinct states written and an index
/// with one resume entry per `index_stride` states (not counting the
/// implicit entry at offset 0).
pub fn merge_states<P: AsRef<Path>, Q: AsRef<Path>>(
    input_pathnames: &[P],
    output_pathname: Q,
    index_stride: u64,
) -> io::Result<(u64, VByteIndex)> {
    assert!(index_stride > 0, "bad index stride");
    let mut writer = VByteWriter::create(output_pathname)?;
    let mut index = VByteIndex::new();
    let mut num_states = 0u64;

    let mut readers = Vec::with_capacity(input_pathnames.len());
    let mut heap = BinaryHeap::new();
    for pathname in input_pathnames {
        let mut reader = VByteReader::open(pathname)?;
        let state = reader.read()?;
        let reader_index = readers.len();
        readers.push(reader);
        if state != 0 {
            heap.push(Reverse((state, reader_index)));
        }
    }

    let mut last_written = 0u64;
    while let Some(Reverse((state, reader_index))) = heap.pop() {
        if state != last_written {
            if num_states > 0 && num_states % index_stride == 0 {
                index.push(VByteIndexEntry {
                    byte_offset: writer.bytes_written(),
                    previous: writer.previous(),
                });
            }
            writer.write(state)?;
            last_written = state;
            num_states += 1;
        }
        let next = readers[reader_index].read()?;
        if next != 0 {
            heap.push(Reverse((next, reader_index)));
        }
    }
    writer.finish()?;
    Ok((num_states, index))
}

/// Linear-scan variant of [`merge_states`]: holds every stream's head and
/// scans for the minimum instead of keeping a heap. Faster for the small
/// stream counts a single part reduce sees, and the shape the resumable
/// merge's index bookkeeping was originally written around.
pub fn merge_states_linear<P: AsRef<Path>, Q: AsRef<Path>>(
    input_pathnames: &[P],
    output_pathname: Q,
    index_stride: u64,
) -> io::Result<(u64, VByteIndex)> {
    assert!(index_stride > 0, "bad index stride");
    let mut writer = VByteWriter::create(output_pathname)?;
    let mut index = VByteIndex::new();
    let mut num_states = 0u64;

    let mut readers = Vec::with_capacity(input_pathnames.len());
    let mut heads = Vec::with_capacity(input_pathnames.len());
    for pathname in input_pathnames {
        let mut reader = VByteReader::open(pathname)?;
        heads.push(reader.read()?);
        readers.push(reader);
    }

    loop {
        let minimum = match heads.iter().copied().filter(|&head| head != 0).min() {
            Some(minimum) => minimum,
            None => break,
        };
        if num_states > 0 && num_states % index_stride == 0 {
            index.push(VByteIndexEntry {
                byte_offset: writer.bytes_written(),
                previous: writer.previous(),
            });
        }
        writer.write(minimum)?;
        num_states += 1;
        // Advance every stream sitting on the minimum, deduplicating.
        for (head, reader) in heads.iter_mut().zip(readers.iter_mut()) {
            if *head == minimum {
                *head = reader.read()?;
            }
        }
    }
    writer.finish()?;
    Ok((num_states, index))
}

/// Merge sorted `{state, probability}` record files, summing the
/// probabilities of equal states. Returns the number of distinct states.
pub fn merge_state_probabilities<P: AsRef<Path>, Q: AsRef<Path>>(
    input_pathnames: &[P],
    output_pathname: Q,
) -> io::Result<u64> {
    let mut writer = BinaryWriter::<StateProbability>::create(output_pathname)?;

    let mut readers = Vec::with_capacity(input_pathnames.len());
    let mut heap = BinaryHeap::new();
    for pathname in input_pathnames {
        let mut reader = BinaryReader::<StateProbability>::open(pathname)?;
        let record = reader.read()?;
        let reader_index = readers.len();
        readers.push(reader);
        if let Some(record) = record {
            heap.push(Reverse((record.state, reader_index, record.probability.to_bits())));
        }
    }

    let mut current: Option<StateProbability> = None;
    while let Some(Reverse((state, reader_index, probability_bits))) = heap.pop() {
        let probability = f64::from_bits(probability_bits);
        match &mut current {
            Some(record) if record.state == state => {
                record.probability += probability;
            }
            Some(record) => {
                writer.write(record)?;
                current = Some(StateProbability { state, probability });
            }
            None => {
                current = Some(StateProbability { state, probability });
            }
        }
        if let Some(next) = readers[reader_index].read()? {
            heap.push(Reverse((next.state, reader_index, next.probability.to_bits())));
        }
    }
    let mut num_states = writer.records_written();
    if let Some(record) = current {
        writer.write(&record)?;
        num_states += 1;
    }
    writer.finish()?;
    Ok(num_states)
}
