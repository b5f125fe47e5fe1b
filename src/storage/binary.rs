//! Fixed-size little-endian binary records.
//!
//! Value and probability files are flat arrays of fixed-size records so
//! they can be memory mapped and binary searched. Each record type defines
//! its own byte layout; all fields are little-endian.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

pub trait Record: Sized {
    const SIZE: usize;

    fn write_to(&self, buffer: &mut [u8]);
    fn read_from(buffer: &[u8]) -> Self;
}

impl Record for u64 {
    const SIZE: usize = 8;

    fn write_to(&self, buffer: &mut [u8]) {
        buffer[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn read_from(buffer: &[u8]) -> Self {
        u64::from_le_bytes(buffer[..8].try_into().unwrap())
    }
}

impl Record for f64 {
    const SIZE: usize = 8;

    fn write_to(&self, buffer: &mut [u8]) {
        buffer[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn read_from(buffer: &[u8]) -> Self {
        f64::from_le_bytes(buffer[..8].try_into().unwrap())
    }
}

/// A solved state and its expected win probability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateValue {
    pub state: u64,
    pub value: f64,
}

impl Record for StateValue {
    const SIZE: usize = 16;

    fn write_to(&self, buffer: &mut [u8]) {
        buffer[..8].copy_from_slice(&self.state.to_le_bytes());
        buffer[8..16].copy_from_slice(&self.value.to_le_bytes());
    }

    fn read_from(buffer: &[u8]) -> Self {
        StateValue {
            state: u64::from_le_bytes(buffer[..8].try_into().unwrap()),
            value: f64::from_le_bytes(buffer[8..16].try_into().unwrap()),
        }
    }
}

/// A state and the probability that an optimal game passes through it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateProbability {
    pub state: u64,
    pub probability: f64,
}

impl Record for StateProbability {
    const SIZE: usize = 16;

    fn write_to(&self, buffer: &mut [u8]) {
        buffer[..8].copy_from_slice(&self.state.to_le_bytes());
        buffer[8..16].copy_from_slice(&self.probability.to_le_bytes());
    }

    fn read_from(buffer: &[u8]) -> Self {
        StateProbability {
            state: u64::from_le_bytes(buffer[..8].try_into().unwrap()),
            probability: f64::from_le_bytes(buffer[8..16].try_into().unwrap()),
        }
    }
}

pub struct BinaryWriter<T: Record, W: Write = BufWriter<File>> {
    writer: W,
    records_written: u64,
    _marker: PhantomData<T>,
}

impl<T: Record> BinaryWriter<T> {
    pub fn create<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        Ok(Self::from_writer(BufWriter::new(File::create(pathname)?)))
    }
}

impl<T: Record, W: Write> BinaryWriter<T, W> {
    pub fn from_writer(writer: W) -> Self {
        BinaryWriter {
            writer,
            records_written: 0,
            _marker: PhantomData,
        }
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn write(&mut self, record: &T) -> io::Result<()> {
        let mut buffer = [0u8; 32];
        record.write_to(&mut buffer[..T::SIZE]);
        self.writer.write_all(&buffer[..T::SIZE])?;
        self.records_written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub struct BinaryReader<T: Record, R: Read = BufReader<File>> {
    reader: R,
    _marker: PhantomData<T>,
}

impl<T: Record> BinaryReader<T> {
    pub fn open<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        Ok(Self::from_reader(BufReader::new(File::open(pathname)?)))
    }
}

impl<T: Record, R: Read> BinaryReader<T, R> {
    pub fn from_reader(reader: R) -> Self {
        BinaryReader {
            reader,
            _marker: PhantomData,
        }
    }

    /// The next record, or `None` at a clean end of file. A partial record
    /// is an error.
    pub fn read(&mut self) -> io::Result<Option<T>> {
        let mut buffer = [0u8; 32];
        let mut filled = 0;
        while filled < T::SIZE {
            let n = self.reader.read(&mut buffer[filled..T::SIZE])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "partial record at end of file",
                ));
            }
            filled += n;
        }
        Ok(Some(T::read_from(&buffer[..T::SIZE])))
    }
}

/// The number of fixed-size records in a file. Errors if the file size is
/// not a whole number of records.
pub fn count_records_in_file<P: AsRef<Path>>(pathname: P, record_size: u64) -> io::Result<u64> {
    let len = std::fs::metadata(pathname)?.len();
    if len % record_size != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("file size {} is not a multiple of {}", len, record_size),
        ));
    }
    Ok(len / record_size)
}
