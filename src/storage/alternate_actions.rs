//! Alternate optimal actions, 3 bits per state in 48-bit blocks.
//!
//! The policy file stores one optimal action per state, but ties are
//! common. For each state we store one bit per non-chosen action saying
//! whether that action's value is within `tolerance` of the chosen one.
//! Three bits per state pack evenly into 6-byte blocks (16 states each),
//! least significant bit first.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::constants::{Direction, ALTERNATE_ACTION_BLOCK_BYTES};

const BLOCK_BITS: u32 = ALTERNATE_ACTION_BLOCK_BYTES as u32 * 8;
const BLOCK_STATES: u64 = (BLOCK_BITS / 3) as u64;

pub struct AlternateActionWriter {
    writer: BufWriter<File>,
    tolerance: f64,
    data: u64,
    offset: u32,
}

impl AlternateActionWriter {
    pub fn create<P: AsRef<Path>>(pathname: P, tolerance: f64) -> io::Result<Self> {
        Ok(AlternateActionWriter {
            writer: BufWriter::new(File::create(pathname)?),
            tolerance,
            data: 0,
            offset: 0,
        })
    }

    /// Record which of the non-chosen actions are as good as the chosen
    /// one. `action_values` is indexed by direction code; infeasible
    /// actions must carry values below `value - tolerance`.
    pub fn write(
        &mut self,
        action: Direction,
        value: f64,
        action_values: [f64; 4],
    ) -> io::Result<()> {
        for (i, &action_value) in action_values.iter().enumerate() {
            if i == action.code() as usize {
                continue;
            }
            if action_value > value - self.tolerance {
                self.data |= 1 << self.offset;
            }
            self.offset += 1;
            if self.offset == BLOCK_BITS {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    /// Copy already-computed optimality flags, for subsetting an existing
    /// file.
    pub fn write_actions(
        &mut self,
        action: Direction,
        alternate_actions: [bool; 4],
    ) -> io::Result<()> {
        for (i, &flag) in alternate_actions.iter().enumerate() {
            if i == action.code() as usize {
                continue;
            }
            if flag {
                self.data |= 1 << self.offset;
            }
            self.offset += 1;
            if self.offset == BLOCK_BITS {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.offset == 0 {
            return Ok(());
        }
        self.writer
            .write_all(&self.data.to_le_bytes()[..ALTERNATE_ACTION_BLOCK_BYTES])?;
        self.data = 0;
        self.offset = 0;
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.flush_block()?;
        self.writer.flush()
    }
}

pub struct AlternateActionReader {
    reader: BufReader<File>,
    data: u64,
    offset: u32,
}

impl AlternateActionReader {
    pub fn open<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        Ok(AlternateActionReader {
            reader: BufReader::new(File::open(pathname)?),
            data: 0,
            offset: 0,
        })
    }

    /// Skip ahead so the next read is for state `num_states`. Only valid
    /// immediately after opening.
    pub fn skip(&mut self, num_states: u64) -> io::Result<()> {
        let byte_offset = ALTERNATE_ACTION_BLOCK_BYTES as u64 * (num_states / BLOCK_STATES);
        self.reader.seek(SeekFrom::Start(byte_offset))?;
        for _ in 0..num_states % BLOCK_STATES {
            self.read(Direction::Left)?;
        }
        Ok(())
    }

    /// The per-direction optimality flags for the next state, given its
    /// chosen action (which is always optimal).
    pub fn read(&mut self, action: Direction) -> io::Result<[bool; 4]> {
        if self.offset % BLOCK_BITS == 0 {
            let mut block = [0u8; 8];
            self.reader
                .read_exact(&mut block[..ALTERNATE_ACTION_BLOCK_BYTES])?;
            self.data = u64::from_le_bytes(block);
            self.offset = 0;
        }
        let mut alternate_actions = [false; 4];
        for (i, flag) in alternate_actions.iter_mut().enumerate() {
            if i == action.code() as usize {
                *flag = true;
                continue;
            }
            *flag = (self.data >> self.offset) & 0x1 != 0;
            self.offset += 1;
        }
        Ok(alternate_actions)
    }
}
