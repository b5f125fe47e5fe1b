//! The policy file: one 2-bit direction code per state, four states per
//! byte, most significant pair first. States appear in the same sorted
//! order as the layer part's state file, so the two streams zip together.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::constants::Direction;

pub struct PolicyWriter {
    writer: BufWriter<File>,
    data: u8,
    offset: u32,
}

impl PolicyWriter {
    pub fn create<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        Ok(PolicyWriter {
            writer: BufWriter::new(File::create(pathname)?),
            data: 0,
            offset: 0,
        })
    }

    pub fn write(&mut self, direction: Direction) -> io::Result<()> {
        let shift = 2 * (3 - self.offset);
        self.data |= (direction.code() & 0x3) << shift;
        self.offset += 1;
        if self.offset == 4 {
            self.flush_byte()?;
        }
        Ok(())
    }

    fn flush_byte(&mut self) -> io::Result<()> {
        if self.offset == 0 {
            return Ok(());
        }
        self.writer.write_all(&[self.data])?;
        self.data = 0;
        self.offset = 0;
        Ok(())
    }

    /// Flush any partial final byte and sync to disk.
    pub fn finish(mut self) -> io::Result<()> {
        self.flush_byte()?;
        self.writer.flush()
    }
}

pub struct PolicyReader {
    reader: BufReader<File>,
    data: u8,
    offset: u32,
}

impl PolicyReader {
    pub fn open<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        Ok(PolicyReader {
            reader: BufReader::new(File::open(pathname)?),
            data: 0,
            offset: 0,
        })
    }

    /// The next direction. Reading past the number of written directions
    /// either returns padding from the final partial byte or fails with
    /// `UnexpectedEof`; the caller tracks the state count.
    pub fn read(&mut self) -> io::Result<Direction> {
        if self.offset % 4 == 0 {
            let mut byte = [0u8; 1];
            self.reader.read_exact(&mut byte)?;
            self.data = byte[0];
            self.offset = 1;
        } else {
            self.offset += 1;
        }
        let shift = 2 * (4 - self.offset);
        Ok(Direction::from_code((self.data >> shift) & 0x3))
    }
}
