//! USTAR header block layout and field decoding.

use std::mem::{offset_of, size_of};

use bstr::{BString, ByteSlice};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::ArchiveError;

/// Size of every header and payload block in the archive.
pub const BLOCK_SIZE: usize = 512;

/// One raw archive block.
pub type Block = [u8; BLOCK_SIZE];

const USTAR_MAGIC: [u8; 6] = *b"ustar\0";
const USTAR_VERSION: [u8; 2] = *b"00";

/// Raw POSIX ustar header, field for field.
#[derive(Debug, Clone, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned)]
#[repr(C)]
pub struct UstarHeader {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub checksum: [u8; 8],
    pub typeflag: u8,
    pub linkname: [u8; 100],
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub devmajor: [u8; 8],
    pub devminor: [u8; 8],
    pub prefix: [u8; 155],
    pub padding: [u8; 12],
}

const _: () = assert!(size_of::<UstarHeader>() == BLOCK_SIZE);
const _: () = assert!(offset_of!(UstarHeader, size) == 124);
const _: () = assert!(offset_of!(UstarHeader, typeflag) == 156);
const _: () = assert!(offset_of!(UstarHeader, magic) == 257);
const _: () = assert!(offset_of!(UstarHeader, prefix) == 345);

const CHECKSUM_OFFSET: usize = offset_of!(UstarHeader, checksum);
const CHECKSUM_LEN: usize = 8;

/// Kind of entry announced by a header's type flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Regular,
    HardLink,
    Symlink,
    Directory,
    /// PAX extended header applying to the next entry.
    Extended,
}

impl EntryType {
    /// Map a raw type flag onto a supported entry type.
    pub fn from_byte(flag: u8) -> Result<Self, ArchiveError> {
        match flag {
            b'0' | b'\0' => Ok(Self::Regular),
            b'1' => Ok(Self::HardLink),
            b'2' => Ok(Self::Symlink),
            b'5' => Ok(Self::Directory),
            b'x' => Ok(Self::Extended),
            other => Err(ArchiveError::UnsupportedEntry(other)),
        }
    }
}

/// Decoded view of a header, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Entry path as stored: `prefix/name`, or `name` when the prefix is empty.
    pub path: BString,
    pub entry_type: EntryType,
    pub size: u64,
    pub link_target: BString,
    pub mtime: Option<u64>,
}

impl HeaderRecord {
    /// Apply a PAX `path` override.
    #[must_use]
    pub fn with_path(mut self, path: BString) -> Self {
        self.path = path;
        self
    }

    /// Entry path as UTF-8.
    pub fn path_str(&self) -> Result<&str, ArchiveError> {
        self.path
            .to_str()
            .map_err(|_| ArchiveError::NonUtf8Path(self.path.clone()))
    }

    /// Link target as UTF-8.
    pub fn link_target_str(&self) -> Result<&str, ArchiveError> {
        self.link_target
            .to_str()
            .map_err(|_| ArchiveError::NonUtf8Path(self.link_target.clone()))
    }
}

impl UstarHeader {
    /// View a raw block as a header without copying.
    #[must_use]
    pub fn from_block(block: &Block) -> &Self {
        zerocopy::transmute_ref!(block)
    }

    /// Validate the format marker and decode the fields the walker needs.
    pub fn decode(&self, verify_checksum: bool) -> Result<HeaderRecord, ArchiveError> {
        if self.magic != USTAR_MAGIC || self.version != USTAR_VERSION {
            return Err(ArchiveError::UnsupportedFormat {
                magic: BString::from(&self.magic[..]),
                version: BString::from(&self.version[..]),
            });
        }

        if verify_checksum {
            let expected = decode_octal(&self.checksum)?;
            let actual = self.compute_checksum();
            if expected != actual {
                return Err(ArchiveError::ChecksumMismatch { expected, actual });
            }
        }

        let entry_type = EntryType::from_byte(self.typeflag)?;
        let size = decode_octal(&self.size)?;

        Ok(HeaderRecord {
            path: self.full_path(),
            entry_type,
            size,
            link_target: BString::from(until_nul(&self.linkname)),
            mtime: decode_octal(&self.mtime).ok(),
        })
    }

    /// Unsigned byte sum of the header with the checksum field counted as spaces.
    #[must_use]
    pub fn compute_checksum(&self) -> u64 {
        let checksum_field = CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_LEN;
        self.as_bytes()
            .iter()
            .enumerate()
            .map(|(index, &byte)| {
                if checksum_field.contains(&index) {
                    u64::from(b' ')
                } else {
                    u64::from(byte)
                }
            })
            .sum()
    }

    fn full_path(&self) -> BString {
        let name = until_nul(&self.name);
        let prefix = until_nul(&self.prefix);
        if prefix.is_empty() {
            return BString::from(name);
        }
        let mut joined = BString::from(prefix);
        if !prefix.ends_with(b"/") {
            joined.push(b'/');
        }
        joined.extend_from_slice(name);
        joined
    }
}

/// True when every byte of the raw block is zero.
#[must_use]
pub fn is_zero_block(block: &Block) -> bool {
    block.iter().all(|&byte| byte == 0)
}

/// Decode an octal numeric field.
///
/// Leading spaces or NULs are padding. The digit run ends at the first NUL or
/// space terminator; it is then scanned from its last digit backward,
/// accumulating `digit * 8^position`. Any other byte in the run is an error.
pub fn decode_octal(field: &[u8]) -> Result<u64, ArchiveError> {
    let is_pad = |byte: &u8| *byte == b' ' || *byte == 0;
    let start = field
        .iter()
        .position(|byte| !is_pad(byte))
        .unwrap_or(field.len());
    let rest = &field[start..];
    let end = rest.iter().position(is_pad).unwrap_or(rest.len());
    let digits = &rest[..end];

    let invalid = || ArchiveError::InvalidOctal(BString::from(field));
    let mut value: u64 = 0;
    for (position, &byte) in digits.iter().rev().enumerate() {
        if !(b'0'..=b'7').contains(&byte) {
            return Err(invalid());
        }
        let digit = u64::from(byte - b'0');
        if digit == 0 {
            continue;
        }
        let term = u32::try_from(position)
            .ok()
            .and_then(|position| 8u64.checked_pow(position))
            .and_then(|weight| weight.checked_mul(digit))
            .ok_or_else(invalid)?;
        value = value.checked_add(term).ok_or_else(invalid)?;
    }
    Ok(value)
}

/// Number of NUL bytes that follow a payload of `size` bytes.
#[must_use]
pub fn padding_for(size: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    (block - size % block) % block
}

fn until_nul(field: &[u8]) -> &[u8] {
    match field.find_byte(0) {
        Some(end) => &field[..end],
        None => field,
    }
}
