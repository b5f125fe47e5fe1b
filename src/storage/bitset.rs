//! A 1-bit-per-state membership file, least significant bit first within
//! each byte. Used to mark which states in a layer part belong to a
//! tranche.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub struct BitSetWriter {
    writer: BufWriter<File>,
    data: u8,
    offset: u32,
}

impl BitSetWriter {
    pub fn create<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        Ok(BitSetWriter {
            writer: BufWriter::new(File::create(pathname)?),
            data: 0,
            offset: 0,
        })
    }

    pub fn write(&mut self, member: bool) -> io::Result<()> {
        if member {
            self.data |= 1 << self.offset;
        }
        self.offset += 1;
        if self.offset == 8 {
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

    pub fn finish(mut self) -> io::Result<()> {
        self.flush_byte()?;
        self.writer.flush()
    }
}

pub struct BitSetReader {
    reader: BufReader<File>,
    data: u8,
    offset: u32,
}

impl BitSetReader {
    pub fn open<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        Ok(BitSetReader {
            reader: BufReader::new(File::open(pathname)?),
            data: 0,
            offset: 0,
        })
    }

    /// Skip ahead so the next read returns member `num_members`. Only valid
    /// immediately after opening.
    pub fn skip(&mut self, num_members: u64) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(num_members / 8))?;
        for _ in 0..num_members % 8 {
            self.read()?;
        }
        Ok(())
    }

    pub fn read(&mut self) -> io::Result<bool> {
        if self.offset % 8 == 0 {
            let mut byte = [0u8; 1];
            self.reader.read_exact(&mut byte)?;
            self.data = byte[0];
            self.offset = 0;
        }
        let member = (self.data >> self.offset) & 0x1 != 0;
        self.offset += 1;
        Ok(member)
    }
}
