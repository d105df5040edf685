//! Raw ustar block builders shared by the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use camino::Utf8PathBuf;

pub const BLOCK: usize = 512;

/// A single 512-byte header block, edited field by field.
#[derive(Clone)]
pub struct RawHeader {
    block: [u8; BLOCK],
}

impl RawHeader {
    pub fn new(name: &str, typeflag: u8) -> Self {
        let mut header = Self { block: [0; BLOCK] };
        header.put(0, 100, name.as_bytes());
        header.put(100, 8, b"0000644\0");
        header.put(108, 8, b"0000000\0");
        header.put(116, 8, b"0000000\0");
        header.put(136, 12, b"00000000000\0");
        header.block[156] = typeflag;
        header.put(257, 6, b"ustar\0");
        header.put(263, 2, b"00");
        header.size(0)
    }

    pub fn file(name: &str, size: u64) -> Self {
        Self::new(name, b'0').size(size)
    }

    pub fn size(mut self, size: u64) -> Self {
        self.put(124, 12, format!("{size:011o}\0").as_bytes());
        self
    }

    pub fn raw_size(mut self, field: &[u8; 12]) -> Self {
        self.put(124, 12, field);
        self
    }

    pub fn link(mut self, target: &str) -> Self {
        self.put(157, 100, target.as_bytes());
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.put(345, 155, prefix.as_bytes());
        self
    }

    pub fn magic(mut self, magic: &[u8; 6], version: &[u8; 2]) -> Self {
        self.put(257, 6, magic);
        self.put(263, 2, version);
        self
    }

    /// Fill in a correct checksum field.
    pub fn checksummed(mut self) -> Self {
        self.block[148..156].copy_from_slice(b"        ");
        let sum: u32 = self.block.iter().map(|&b| u32::from(b)).sum();
        self.put(148, 8, format!("{sum:06o}\0 ").as_bytes());
        self
    }

    pub fn bytes(&self) -> &[u8; BLOCK] {
        &self.block
    }

    fn put(&mut self, offset: usize, width: usize, value: &[u8]) {
        assert!(value.len() <= width, "field overflow at offset {offset}");
        self.block[offset..offset + width].fill(0);
        self.block[offset..offset + value.len()].copy_from_slice(value);
    }
}

/// Appends headers and padded payloads into an in-memory archive.
#[derive(Default)]
pub struct ArchiveBuilder {
    data: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, header: &RawHeader) -> Self {
        self.data.extend_from_slice(header.bytes());
        self
    }

    /// Append payload bytes followed by NUL padding to the block boundary.
    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.data.extend_from_slice(payload);
        let rem = payload.len() % BLOCK;
        if rem != 0 {
            self.data.resize(self.data.len() + BLOCK - rem, 0);
        }
        self
    }

    pub fn file(self, name: &str, contents: &[u8]) -> Self {
        self.header(&RawHeader::file(name, contents.len() as u64))
            .payload(contents)
    }

    pub fn dir(self, name: &str) -> Self {
        self.header(&RawHeader::new(name, b'5'))
    }

    pub fn symlink(self, name: &str, target: &str) -> Self {
        self.header(&RawHeader::new(name, b'2').link(target))
    }

    pub fn hardlink(self, name: &str, target: &str) -> Self {
        self.header(&RawHeader::new(name, b'1').link(target))
    }

    /// PAX extended header carrying `records` as its payload.
    pub fn pax(self, records: &str) -> Self {
        self.header(&RawHeader::new("PaxHeaders/entry", b'x').size(records.len() as u64))
            .payload(records.as_bytes())
    }

    pub fn zero_block(mut self) -> Self {
        self.data.extend_from_slice(&[0; BLOCK]);
        self
    }

    /// Append the two zero-block terminator and return the bytes.
    pub fn finish(self) -> Vec<u8> {
        self.zero_block().zero_block().data
    }

    /// Return the bytes without a terminator.
    pub fn unterminated(self) -> Vec<u8> {
        self.data
    }
}

/// POSIX `"<len> key=value\n"` record.
pub fn pax_record(key: &str, value: &str) -> String {
    let body = format!(" {key}={value}\n");
    let mut len = body.len();
    while len != body.len() + len.to_string().len() {
        len = body.len() + len.to_string().len();
    }
    format!("{len}{body}")
}

pub fn utf8_dir(dir: &tempfile::TempDir) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|_| anyhow!("tempdir path not utf8"))
}
