//! SHA-512 content digests and MD5 header checksums.
//!
//! Every column carries one digest pair (uncompressed, compressed). The
//! session-wide [`DigestManager`] keeps a running context per column and
//! commits each block's per-column pair into it in block order, so the
//! table at the archive tail covers every block even though block encoding
//! itself may finish out of order.

use std::collections::BTreeMap;

use md5::Md5;
use sha2::{Digest, Sha512};
use strata_base::{ByteBuffer, ByteCursor, Error, Result};

pub fn sha512(bytes: &[u8]) -> [u8; 64] {
    let out = Sha512::digest(bytes);
    let mut digest = [0u8; 64];
    digest.copy_from_slice(&out);
    digest
}

pub fn md5(bytes: &[u8]) -> [u8; 16] {
    let out = Md5::digest(bytes);
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&out);
    digest
}

/// One SHA-512 digest per buffer variant of a column.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DigestPair {
    pub uncompressed: [u8; 64],
    pub compressed: [u8; 64],
}

impl Default for DigestPair {
    fn default() -> Self {
        DigestPair {
            uncompressed: [0; 64],
            compressed: [0; 64],
        }
    }
}

impl DigestPair {
    pub fn of(uncompressed: &[u8], compressed: &[u8]) -> Self {
        DigestPair {
            uncompressed: sha512(uncompressed),
            compressed: sha512(compressed),
        }
    }

    pub fn write(&self, buf: &mut ByteBuffer) {
        buf.put_bytes(&self.uncompressed);
        buf.put_bytes(&self.compressed);
    }

    pub fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let mut pair = DigestPair::default();
        pair.uncompressed.copy_from_slice(cur.get_bytes(64)?);
        pair.compressed.copy_from_slice(cur.get_bytes(64)?);
        Ok(pair)
    }
}

/// Running digest contexts for one column across a whole session.
#[derive(Clone)]
pub struct ColumnDigest {
    uncompressed: Sha512,
    compressed: Sha512,
}

impl Default for ColumnDigest {
    fn default() -> Self {
        ColumnDigest {
            uncompressed: Sha512::new(),
            compressed: Sha512::new(),
        }
    }
}

impl ColumnDigest {
    pub fn update(&mut self, pair: &DigestPair) {
        self.uncompressed.update(pair.uncompressed);
        self.compressed.update(pair.compressed);
    }

    pub fn finalize(self) -> DigestPair {
        let mut pair = DigestPair::default();
        pair.uncompressed
            .copy_from_slice(&self.uncompressed.finalize());
        pair.compressed.copy_from_slice(&self.compressed.finalize());
        pair
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum FieldKind {
    Meta = 0,
    Info = 1,
    Format = 2,
}

impl FieldKind {
    fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(FieldKind::Meta),
            1 => Ok(FieldKind::Info),
            2 => Ok(FieldKind::Format),
            other => Err(Error::truncated(format!("unknown digest kind {other}"))),
        }
    }
}

/// Aggregates per-block column digests for the archive-tail table.
pub struct DigestManager {
    meta: Vec<ColumnDigest>,
    info: BTreeMap<u32, ColumnDigest>,
    format: BTreeMap<u32, ColumnDigest>,
}

impl DigestManager {
    pub fn new(n_meta: usize) -> Self {
        DigestManager {
            meta: vec![ColumnDigest::default(); n_meta],
            info: BTreeMap::new(),
            format: BTreeMap::new(),
        }
    }

    pub fn update_meta(&mut self, index: usize, pair: &DigestPair) {
        self.meta[index].update(pair);
    }

    pub fn update_info(&mut self, global_key: u32, pair: &DigestPair) {
        self.info.entry(global_key).or_default().update(pair);
    }

    pub fn update_format(&mut self, global_key: u32, pair: &DigestPair) {
        self.format.entry(global_key).or_default().update(pair);
    }

    pub fn finalize(self) -> DigestTable {
        DigestTable {
            meta: self.meta.into_iter().map(ColumnDigest::finalize).collect(),
            info: self
                .info
                .into_iter()
                .map(|(key, digest)| (key, digest.finalize()))
                .collect(),
            format: self
                .format
                .into_iter()
                .map(|(key, digest)| (key, digest.finalize()))
                .collect(),
        }
    }
}

/// The aggregated digest record written between the index and the footer.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct DigestTable {
    pub meta: Vec<DigestPair>,
    pub info: Vec<(u32, DigestPair)>,
    pub format: Vec<(u32, DigestPair)>,
}

impl DigestTable {
    pub fn write(&self, buf: &mut ByteBuffer) {
        let total = self.meta.len() + self.info.len() + self.format.len();
        buf.put(total as u32);
        for (index, pair) in self.meta.iter().enumerate() {
            buf.put(FieldKind::Meta as u8);
            buf.put(index as u32);
            pair.write(buf);
        }
        for (key, pair) in &self.info {
            buf.put(FieldKind::Info as u8);
            buf.put(*key);
            pair.write(buf);
        }
        for (key, pair) in &self.format {
            buf.put(FieldKind::Format as u8);
            buf.put(*key);
            pair.write(buf);
        }
    }

    pub fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let total = cur.get::<u32>()? as usize;
        let mut table = DigestTable::default();
        for _ in 0..total {
            let kind = FieldKind::from_u8(cur.get::<u8>()?)?;
            let key = cur.get::<u32>()?;
            let pair = DigestPair::read(cur)?;
            match kind {
                FieldKind::Meta => {
                    if key as usize != table.meta.len() {
                        return Err(Error::truncated("meta digest entries out of order"));
                    }
                    table.meta.push(pair);
                }
                FieldKind::Info => table.info.push((key, pair)),
                FieldKind::Format => table.format.push((key, pair)),
            }
        }
        Ok(table)
    }
}
