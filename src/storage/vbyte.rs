//! Variable-byte encoding for sorted `u64` streams.
//!
//! States within a layer part are written in strictly increasing order, so
//! we store the difference from the previous value as a little-endian
//! base-128 varint (low 7 bits first, high bit set on continuation bytes).
//! Because the stream is strictly increasing, every delta is at least 1 and
//! a decoded value of 0 never occurs; readers return 0 to signal end of
//! stream.
//!
//! Decoding is stateful: to resume mid-file you need the byte offset and
//! the value decoded just before it. An index entry captures that pair.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A resume point in a vbyte stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VByteIndexEntry {
    pub byte_offset: u64,
    pub previous: u64,
}

pub type VByteIndex = Vec<VByteIndexEntry>;

fn encode_delta(delta: u64, buffer: &mut [u8; 10]) -> usize {
    let mut remaining = delta;
    let mut len = 0;
    loop {
        let byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buffer[len] = byte;
            len += 1;
            return len;
        }
        buffer[len] = byte | 0x80;
        len += 1;
    }
}

pub struct VByteWriter<W: Write> {
    writer: W,
    previous: u64,
    bytes_written: u64,
}

impl VByteWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        Ok(VByteWriter::new(BufWriter::new(File::create(pathname)?)))
    }
}

impl<W: Write> VByteWriter<W> {
    pub fn new(writer: W) -> Self {
        VByteWriter {
            writer,
            previous: 0,
            bytes_written: 0,
        }
    }

    pub fn previous(&self) -> u64 {
        self.previous
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append a value. Values must be strictly increasing and nonzero.
    pub fn write(&mut self, value: u64) -> io::Result<()> {
        assert!(
            value > self.previous,
            "vbyte values must be strictly increasing: {} after {}",
            value,
            self.previous
        );
        let mut buffer = [0u8; 10];
        let len = encode_delta(value - self.previous, &mut buffer);
        self.writer.write_all(&buffer[..len])?;
        self.previous = value;
        self.bytes_written += len as u64;
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub struct VByteReader<R: Read> {
    reader: R,
    previous: u64,
    states_read: u64,
    max_states: u64,
}

impl VByteReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        Self::open_at(pathname, 0, 0, u64::MAX)
    }

    /// Resume decoding from an index entry, reading at most `max_states`
    /// values.
    pub fn open_at<P: AsRef<Path>>(
        pathname: P,
        byte_offset: u64,
        previous: u64,
        max_states: u64,
    ) -> io::Result<Self> {
        let mut file = File::open(pathname)?;
        file.seek(SeekFrom::Start(byte_offset))?;
        Ok(VByteReader {
            reader: BufReader::new(file),
            previous,
            states_read: 0,
            max_states,
        })
    }
}

impl<R: Read> VByteReader<R> {
    pub fn new(reader: R) -> Self {
        VByteReader {
            reader,
            previous: 0,
            states_read: 0,
            max_states: u64::MAX,
        }
    }

    /// The next value, or 0 at end of stream.
    pub fn read(&mut self) -> io::Result<u64> {
        if self.states_read >= self.max_states {
            return Ok(0);
        }
        let mut delta = 0u64;
        let mut shift = 0u32;
        loop {
            let mut byte = [0u8; 1];
            match self.reader.read(&mut byte)? {
                0 if shift == 0 => return Ok(0),
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "truncated vbyte value",
                    ))
                }
                _ => {}
            }
            delta |= ((byte[0] & 0x7f) as u64) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 63 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "vbyte value too long",
                ));
            }
        }
        self.previous += delta;
        self.states_read += 1;
        Ok(self.previous)
    }
}

/// Write a sorted list of states to a vbyte file.
pub fn write_states_vbyte<P: AsRef<Path>>(states: &[u64], pathname: P) -> io::Result<()> {
    let mut writer = VByteWriter::create(pathname)?;
    for &state in states {
        writer.write(state)?;
    }
    writer.finish()
}

/// Read a whole vbyte file into memory.
pub fn read_states_vbyte<P: AsRef<Path>>(pathname: P) -> io::Result<Vec<u64>> {
    let mut reader = VByteReader::open(pathname)?;
    let mut states = Vec::new();
    loop {
        let state = reader.read()?;
        if state == 0 {
            break;
        }
        states.push(state);
    }
    Ok(states)
}
