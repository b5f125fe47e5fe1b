//! Naming and metadata for layer part files.
//!
//! A layer holds every canonical state with a given tile sum; a part is
//! the slice of a layer with a given maximum tile value. Each part owns a
//! family of files in the layer directory, keyed by `{sum:04}-{max:x}`:
//!
//! | Extension | Contents |
//! |-----------|----------|
//! | `vbyte` | sorted states |
//! | `json` | [`PartInfo`] metadata |
//! | `policy` | optimal action per state |
//! | `values` | `{state, value}` records |
//! | `alternate` | equal-value action flags |
//!
//! Expansion batches write intermediate fragment files named by the input
//! part, the output part, and the batch number; they are merged into the
//! output part's `vbyte` file and deleted.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::vbyte::{VByteIndex, VByteIndexEntry};

/// A layer part: the states with tile sum `sum` and maximum value
/// `max_value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartName {
    pub sum: u32,
    pub max_value: u8,
}

impl PartName {
    pub fn new(sum: u32, max_value: u8) -> Self {
        PartName { sum, max_value }
    }

    pub fn pathname(&self, directory: &Path, extension: &str) -> PathBuf {
        directory.join(format!("{:04}-{:x}.{}", self.sum, self.max_value, extension))
    }

    pub fn states_pathname(&self, directory: &Path) -> PathBuf {
        self.pathname(directory, "vbyte")
    }

    pub fn info_pathname(&self, directory: &Path) -> PathBuf {
        self.pathname(directory, "json")
    }

    /// Parse a `{sum:04}-{max:x}.{extension}` filename.
    pub fn parse(pathname: &Path, extension: &str) -> Option<Self> {
        if pathname.extension()?.to_str()? != extension {
            return None;
        }
        let stem = pathname.file_stem()?.to_str()?;
        let (sum, max_value) = stem.split_once('-')?;
        Some(PartName {
            sum: sum.parse().ok()?,
            max_value: u8::from_str_radix(max_value, 16).ok()?,
        })
    }
}

/// An expansion output shard: successors with sum `output_sum` and maximum
/// value `output_max_value`, generated from one batch of the input part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentName {
    pub input_sum: u32,
    pub input_max_value: u8,
    pub output_sum: u32,
    pub output_max_value: u8,
    pub batch: u32,
}

impl FragmentName {
    pub fn pathname(&self, directory: &Path) -> PathBuf {
        directory.join(format!(
            "fragment-{:04}-{:x}-{:04}-{:x}-{:04}.vbyte",
            self.input_sum,
            self.input_max_value,
            self.output_sum,
            self.output_max_value,
            self.batch
        ))
    }

    pub fn output_part(&self) -> PartName {
        PartName::new(self.output_sum, self.output_max_value)
    }

    pub fn parse(pathname: &Path) -> Option<Self> {
        if pathname.extension()?.to_str()? != "vbyte" {
            return None;
        }
        let stem = pathname.file_stem()?.to_str()?;
        let rest = stem.strip_prefix("fragment-")?;
        let mut fields = rest.split('-');
        let fragment = FragmentName {
            input_sum: fields.next()?.parse().ok()?,
            input_max_value: u8::from_str_radix(fields.next()?, 16).ok()?,
            output_sum: fields.next()?.parse().ok()?,
            output_max_value: u8::from_str_radix(fields.next()?, 16).ok()?,
            batch: fields.next()?.parse().ok()?,
        };
        if fields.next().is_some() {
            return None;
        }
        Some(fragment)
    }
}

/// Part metadata, stored as JSON next to the states file.
///
/// `index` holds one vbyte resume point per `batch_size` states, not
/// counting the implicit entry at offset 0; [`PartInfo::batches`] restores
/// that entry, so its length is the number of expansion batches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartInfo {
    pub num_states: u64,
    pub batch_size: u64,
    pub index: VByteIndex,
}

impl PartInfo {
    pub fn batches(&self) -> Vec<VByteIndexEntry> {
        let mut batches = Vec::with_capacity(self.index.len() + 1);
        batches.push(VByteIndexEntry::default());
        batches.extend_from_slice(&self.index);
        batches
    }
}

pub fn read_part_info(directory: &Path, name: PartName) -> io::Result<PartInfo> {
    let file = File::open(name.info_pathname(directory))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

pub fn write_part_info(directory: &Path, name: PartName, info: &PartInfo) -> io::Result<()> {
    let file = File::create(name.info_pathname(directory))?;
    serde_json::to_writer(BufWriter::new(file), info)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// All parts with state files in the directory, sorted by sum then
/// maximum value.
pub fn list_parts(directory: &Path) -> io::Result<Vec<PartName>> {
    let mut parts = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        if let Some(name) = PartName::parse(&entry?.path(), "vbyte") {
            parts.push(name);
        }
    }
    parts.sort();
    Ok(parts)
}

/// All expansion fragments awaiting a merge, sorted.
pub fn list_fragments(directory: &Path) -> io::Result<Vec<FragmentName>> {
    let mut fragments = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        if let Some(name) = FragmentName::parse(&entry?.path()) {
            fragments.push(name);
        }
    }
    fragments.sort();
    Ok(fragments)
}

/// The maximum values present in a layer, ascending.
pub fn find_max_values(directory: &Path, sum: u32) -> io::Result<Vec<u8>> {
    Ok(list_parts(directory)?
        .into_iter()
        .filter(|name| name.sum == sum)
        .map(|name| name.max_value)
        .collect())
}
