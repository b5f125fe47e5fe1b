//! Memory-mapped random-access readers.
//!
//! Solving a layer needs random lookups into the already-solved successor
//! layers. Those are too big to load eagerly, so they stay on disk and are
//! memory mapped. The mapping is owned by the reader and all access goes
//! through bounds-checked methods; no raw pointers escape.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::constants::VBYTE_INDEX_PAGE_BYTES;
use crate::storage::binary::{Record, StateValue};

/// Random lookup over a sorted file of fixed 16-byte `{state, value}`
/// records.
pub struct MmapValueReader {
    mmap: Option<Mmap>,
}

impl MmapValueReader {
    pub fn open<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        let file = File::open(&pathname)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(MmapValueReader { mmap: None });
        }
        if len % StateValue::SIZE as u64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("value file size {} is not a multiple of 16", len),
            ));
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(MmapValueReader { mmap: Some(mmap) })
    }

    pub fn len(&self) -> usize {
        self.mmap
            .as_ref()
            .map_or(0, |mmap| mmap.len() / StateValue::SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> StateValue {
        let mmap = self.mmap.as_ref().expect("value file is empty");
        let offset = index * StateValue::SIZE;
        StateValue::read_from(&mmap[offset..offset + StateValue::SIZE])
    }

    pub fn try_get_value(&self, state: u64) -> Option<f64> {
        let mut lo = 0;
        let mut hi = self.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let record = self.get(mid);
            match record.state.cmp(&state) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(record.value),
            }
        }
        None
    }

    /// The value of `state`. Every successor of a solved layer must be
    /// present in one of the loaded value files, so a miss is fatal.
    pub fn get_value(&self, state: u64) -> f64 {
        match self.try_get_value(state) {
            Some(value) => value,
            None => panic!("state not found: {:016x}", state),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PageIndexEntry {
    /// Value decoded just before `byte_offset`.
    previous: u64,
    byte_offset: u64,
    record_index: u64,
}

/// Random lookup of a state's ordinal position in a vbyte-compressed
/// sorted state file.
///
/// Opening builds a sparse index with one entry per crossed page boundary.
/// A lookup binary searches the index for the enclosing page, then decodes
/// forward within it, so the scan is bounded by the page size.
pub struct MmapVByteReader {
    mmap: Option<Mmap>,
    index: Vec<PageIndexEntry>,
    num_records: u64,
}

impl MmapVByteReader {
    pub fn open<P: AsRef<Path>>(pathname: P) -> io::Result<Self> {
        let file = File::open(&pathname)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(MmapVByteReader {
                mmap: None,
                index: Vec::new(),
                num_records: 0,
            });
        }
        let mmap = unsafe { Mmap::map(&file)? };

        let mut index = vec![PageIndexEntry {
            previous: 0,
            byte_offset: 0,
            record_index: 0,
        }];
        let mut next_page = VBYTE_INDEX_PAGE_BYTES;
        let mut pos = 0u64;
        let mut previous = 0u64;
        let mut num_records = 0u64;
        while (pos as usize) < mmap.len() {
            if pos >= next_page {
                index.push(PageIndexEntry {
                    previous,
                    byte_offset: pos,
                    record_index: num_records,
                });
                next_page = (pos / VBYTE_INDEX_PAGE_BYTES + 1) * VBYTE_INDEX_PAGE_BYTES;
            }
            let (value, bytes_in) = decode_at(&mmap, pos as usize, previous)?;
            previous = value;
            pos += bytes_in as u64;
            num_records += 1;
        }
        Ok(MmapVByteReader {
            mmap: Some(mmap),
            index,
            num_records,
        })
    }

    pub fn len(&self) -> u64 {
        self.num_records
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    /// The ordinal position of `state` in the file, if present.
    pub fn find(&self, state: u64) -> io::Result<Option<u64>> {
        let mmap = match &self.mmap {
            Some(mmap) => mmap,
            None => return Ok(None),
        };
        // Last index entry whose resume value is below the target.
        let partition = self.index.partition_point(|entry| entry.previous < state);
        if partition == 0 {
            return Ok(None);
        }
        let entry = self.index[partition - 1];

        let mut pos = entry.byte_offset as usize;
        let mut previous = entry.previous;
        let mut record_index = entry.record_index;
        while pos < mmap.len() {
            let (value, bytes_in) = decode_at(mmap, pos, previous)?;
            if value == state {
                return Ok(Some(record_index));
            }
            if value > state {
                return Ok(None);
            }
            previous = value;
            pos += bytes_in;
            record_index += 1;
        }
        Ok(None)
    }
}

fn decode_at(data: &[u8], pos: usize, previous: u64) -> io::Result<(u64, usize)> {
    let mut delta = 0u64;
    let mut shift = 0u32;
    let mut len = 0usize;
    loop {
        let byte = *data.get(pos + len).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "truncated vbyte value")
        })?;
        delta |= ((byte & 0x7f) as u64) << shift;
        len += 1;
        if byte & 0x80 == 0 {
            return Ok((previous + delta, len));
        }
        shift += 7;
        if shift > 63 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "vbyte value too long",
            ));
        }
    }
}
