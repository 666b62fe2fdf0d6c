//! The binary container format shared by both model flavors.
//!
//! Layout: a 10-byte magic discriminating the flavor, a 10-byte field
//! holding an unsigned varint with the header length, the bincode-encoded
//! header (vocabulary word list, sentence boundaries, per-state counts),
//! padding up to the entry alignment, then the flat entry array written
//! byte-for-byte as it sits in memory. Loading maps the file read-only and
//! slices the entry array straight out of the mapping.
//!
//! Entries are fixed-width little-endian records; the format is not
//! byte-order portable.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hashed::Hashed;
use crate::model::{Model, StateId, Transition, Weight, WordId};
use crate::sorted::Sorted;
use crate::vocab::{Vocab, VocabError};

/// Magic bytes opening a hashed-model container.
pub const MAGIC_HASHED: &[u8; 10] = b"#fslm.hash";
/// Magic bytes opening a sorted-model container.
pub const MAGIC_SORTED: &[u8; 10] = b"#fslm.sort";
// Shared prefix of all container flavors.
const MAGIC_PREFIX: &[u8; 6] = b"#fslm.";

// Fixed width of the header-length field; a varint never needs more.
const MAX_VARINT_LEN: usize = 10;

const ENTRY_SIZE: usize = std::mem::size_of::<Transition>();
const ENTRY_ALIGN: usize = std::mem::align_of::<Transition>();

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("not a fslm binary file")]
    BadMagic,
    #[error("truncated model file")]
    Truncated,
    #[error("malformed header: {0}")]
    Header(#[from] bincode::Error),
    #[error(transparent)]
    Vocab(#[from] VocabError),
    #[error("sentence boundary {0:?} not in vocabulary")]
    MissingBoundary(String),
    #[error("entry section length is not a multiple of the entry size")]
    EntrySection,
    #[error("entry section is misaligned")]
    Misaligned,
    #[error("per-state counts do not match the entry section")]
    CountMismatch,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The self-describing part of a container. For hashed models `counts`
/// holds per-state bucket counts; for sorted models it holds per-state
/// lexical-transition counts (the terminal back-off entry is implicit).
#[derive(Serialize, Deserialize)]
pub(crate) struct Header {
    pub words: Vec<String>,
    pub bos: String,
    pub eos: String,
    pub counts: Vec<u64>,
}

fn put_uvarint(buf: &mut [u8; MAX_VARINT_LEN], mut v: u64) {
    let mut i = 0;
    while v >= 0x80 {
        buf[i] = (v as u8) | 0x80;
        v >>= 7;
        i += 1;
    }
    buf[i] = v as u8;
}

fn uvarint(buf: &[u8]) -> Option<u64> {
    let mut v = 0u64;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        if b < 0x80 {
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return None; // overflows 64 bits
            }
            return Some(v | (b as u64) << shift);
        }
        v |= ((b & 0x7f) as u64) << shift;
        shift += 7;
    }
    None
}

#[inline]
fn padding(pos: usize) -> usize {
    (ENTRY_ALIGN - pos % ENTRY_ALIGN) % ENTRY_ALIGN
}

pub(crate) fn write_container(
    path: &Path,
    magic: &[u8; 10],
    header: &Header,
    entries: &[Transition],
) -> Result<(), FormatError> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(magic)?;
    let header_bytes = bincode::serialize(header)?;
    let mut len_field = [0u8; MAX_VARINT_LEN];
    put_uvarint(&mut len_field, header_bytes.len() as u64);
    w.write_all(&len_field)?;
    w.write_all(&header_bytes)?;
    // Pad so the entries land at their natural alignment.
    let written = magic.len() + MAX_VARINT_LEN + header_bytes.len();
    let zeros = [0u8; ENTRY_ALIGN];
    w.write_all(&zeros[..padding(written)])?;
    w.write_all(bytemuck::cast_slice(entries))?;
    w.flush()?;
    Ok(())
}

pub(crate) struct Container {
    pub header: Header,
    pub map: Mmap,
    pub entries_start: usize,
    pub num_entries: usize,
}

pub(crate) fn read_container(path: &Path, magic: &[u8; 10]) -> Result<Container, FormatError> {
    let file = File::open(path)?;
    // Safety: the mapping is read-only; mutating the file while a model is
    // loaded from it is the caller's responsibility to avoid.
    let map = unsafe { Mmap::map(&file)? };
    let (header, entries_start, num_entries) = {
        let raw: &[u8] = &map;
        if raw.len() < magic.len() {
            return Err(FormatError::BadMagic);
        }
        if &raw[..magic.len()] != magic {
            return Err(FormatError::BadMagic);
        }
        let mut read = magic.len();
        if raw.len() < read + MAX_VARINT_LEN {
            return Err(FormatError::Truncated);
        }
        let header_len =
            uvarint(&raw[read..read + MAX_VARINT_LEN]).ok_or(FormatError::Truncated)? as usize;
        read += MAX_VARINT_LEN;
        if raw.len() < read + header_len {
            return Err(FormatError::Truncated);
        }
        let header: Header = bincode::deserialize(&raw[read..read + header_len])?;
        read += header_len;
        read += padding(read);
        if raw.len() < read {
            return Err(FormatError::Truncated);
        }
        let blob = &raw[read..];
        if blob.len() % ENTRY_SIZE != 0 {
            return Err(FormatError::EntrySection);
        }
        if bytemuck::try_cast_slice::<u8, Transition>(blob).is_err() {
            return Err(FormatError::Misaligned);
        }
        (header, read, blob.len() / ENTRY_SIZE)
    };
    Ok(Container {
        header,
        map,
        entries_start,
        num_entries,
    })
}

/// The flavor of a compiled model container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Hashed,
    Sorted,
}

/// Reads just enough of `path` to tell which container flavor it holds.
pub fn detect_kind<P: AsRef<Path>>(path: P) -> Result<ModelKind, FormatError> {
    let mut magic = [0u8; 10];
    File::open(path)?
        .read_exact(&mut magic)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FormatError::BadMagic,
            _ => FormatError::Io(e),
        })?;
    if &magic == MAGIC_HASHED {
        Ok(ModelKind::Hashed)
    } else if &magic == MAGIC_SORTED {
        Ok(ModelKind::Sorted)
    } else {
        Err(FormatError::BadMagic)
    }
}

/// Whether `path` starts with the `#fslm.` prefix shared by all container
/// flavors.
pub fn is_binary<P: AsRef<Path>>(path: P) -> bool {
    let mut prefix = [0u8; 6];
    match File::open(path).and_then(|mut f| f.read_exact(&mut prefix)) {
        Ok(()) => &prefix == MAGIC_PREFIX,
        Err(_) => false,
    }
}

/// Whether `path` holds a hashed-model container.
pub fn is_hashed_binary<P: AsRef<Path>>(path: P) -> bool {
    matches!(detect_kind(path), Ok(ModelKind::Hashed))
}

/// Whether `path` holds a sorted-model container.
pub fn is_sorted_binary<P: AsRef<Path>>(path: P) -> bool {
    matches!(detect_kind(path), Ok(ModelKind::Sorted))
}

/// A compiled model of either flavor, as loaded from disk.
#[derive(Debug)]
pub enum AnyModel {
    Hashed(Hashed),
    Sorted(Sorted),
}

impl AnyModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            AnyModel::Hashed(_) => ModelKind::Hashed,
            AnyModel::Sorted(_) => ModelKind::Sorted,
        }
    }
}

/// Loads a compiled model of whichever flavor `path` holds.
pub fn from_binary<P: AsRef<Path>>(path: P) -> Result<AnyModel, FormatError> {
    match detect_kind(&path)? {
        ModelKind::Hashed => Ok(AnyModel::Hashed(Hashed::from_binary_file(path)?)),
        ModelKind::Sorted => Ok(AnyModel::Sorted(Sorted::from_binary_file(path)?)),
    }
}

impl Model for AnyModel {
    fn next_id(&self, p: StateId, x: WordId) -> (StateId, Weight) {
        match self {
            AnyModel::Hashed(m) => m.next_id(p, x),
            AnyModel::Sorted(m) => m.next_id(p, x),
        }
    }

    fn back_off(&self, p: StateId) -> (StateId, Weight) {
        match self {
            AnyModel::Hashed(m) => m.back_off(p),
            AnyModel::Sorted(m) => m.back_off(p),
        }
    }

    fn num_states(&self) -> usize {
        match self {
            AnyModel::Hashed(m) => m.num_states(),
            AnyModel::Sorted(m) => m.num_states(),
        }
    }

    fn num_transitions(&self) -> usize {
        match self {
            AnyModel::Hashed(m) => m.num_transitions(),
            AnyModel::Sorted(m) => m.num_transitions(),
        }
    }

    fn transitions(&self, p: StateId) -> Box<dyn Iterator<Item = Transition> + '_> {
        match self {
            AnyModel::Hashed(m) => m.transitions(p),
            AnyModel::Sorted(m) => m.transitions(p),
        }
    }

    fn vocab(&self) -> &Vocab {
        match self {
            AnyModel::Hashed(m) => m.vocab(),
            AnyModel::Sorted(m) => m.vocab(),
        }
    }

    fn bos_id(&self) -> WordId {
        match self {
            AnyModel::Hashed(m) => m.bos_id(),
            AnyModel::Sorted(m) => m.bos_id(),
        }
    }

    fn eos_id(&self) -> WordId {
        match self {
            AnyModel::Hashed(m) => m.eos_id(),
            AnyModel::Sorted(m) => m.eos_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uvarint_round_trips() {
        for v in [0u64, 1, 127, 128, 300, 1 << 20, u64::MAX] {
            let mut buf = [0u8; MAX_VARINT_LEN];
            put_uvarint(&mut buf, v);
            assert_eq!(uvarint(&buf), Some(v), "value {}", v);
        }
    }

    #[test]
    fn uvarint_rejects_unterminated_input() {
        assert_eq!(uvarint(&[0x80u8; MAX_VARINT_LEN]), None);
    }

    #[test]
    fn padding_reaches_alignment() {
        for pos in 0..32 {
            let padded = pos + padding(pos);
            assert_eq!(padded % ENTRY_ALIGN, 0);
            assert!(padded - pos < ENTRY_ALIGN);
        }
    }
}
