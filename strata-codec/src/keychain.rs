//! Append-only store of per-column encryption material, persisted as a
//! sibling artifact next to the archive. A single lock guards appends;
//! containers are encrypted on worker threads but entries land here in
//! whatever order workers finish, so lookups go through the full map.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Mutex;

use strata_base::{ByteBuffer, ByteCursor, Error, Result};

use crate::encrypt::{CipherKind, KEY_WIDTH, NONCE_WIDTH, TAG_WIDTH};

const KEYCHAIN_MAGIC: [u8; 8] = *b"STRAKEY\x01";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct KeychainEntry {
    pub block_id: u64,
    pub column_id: u32,
    pub cipher: CipherKind,
    pub key: [u8; KEY_WIDTH],
    pub nonce: [u8; NONCE_WIDTH],
    pub tag: [u8; TAG_WIDTH],
}

impl KeychainEntry {
    fn write(&self, buf: &mut ByteBuffer) {
        buf.put(self.block_id);
        buf.put(self.column_id);
        buf.put(self.cipher as u8);
        buf.put_bytes(&self.key);
        buf.put_bytes(&self.nonce);
        buf.put_bytes(&self.tag);
    }

    fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let block_id = cur.get::<u64>()?;
        let column_id = cur.get::<u32>()?;
        let cipher = CipherKind::from_u8(cur.get::<u8>()?)?;
        let mut key = [0u8; KEY_WIDTH];
        let mut nonce = [0u8; NONCE_WIDTH];
        let mut tag = [0u8; TAG_WIDTH];
        key.copy_from_slice(cur.get_bytes(KEY_WIDTH)?);
        nonce.copy_from_slice(cur.get_bytes(NONCE_WIDTH)?);
        tag.copy_from_slice(cur.get_bytes(TAG_WIDTH)?);
        Ok(KeychainEntry {
            block_id,
            column_id,
            cipher,
            key,
            nonce,
            tag,
        })
    }
}

#[derive(Default, Debug)]
pub struct Keychain {
    entries: Mutex<BTreeMap<(u64, u32), KeychainEntry>>,
}

impl Keychain {
    pub fn new() -> Self {
        Keychain::default()
    }

    pub fn push(&self, entry: KeychainEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert((entry.block_id, entry.column_id), entry);
    }

    pub fn lookup(&self, block_id: u64, column_id: u32) -> Option<KeychainEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(&(block_id, column_id)).copied()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_to(&self, sink: &mut impl Write) -> Result<()> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut buf = ByteBuffer::with_capacity(16 + entries.len() * 77);
        buf.put_bytes(&KEYCHAIN_MAGIC);
        buf.put(entries.len() as u64);
        for entry in entries.values() {
            entry.write(&mut buf);
        }
        sink.write_all(buf.as_slice())?;
        Ok(())
    }

    pub fn read_from(source: &mut impl Read) -> Result<Self> {
        let mut raw = Vec::new();
        source.read_to_end(&mut raw)?;
        let mut cur = ByteCursor::new(&raw);
        if cur.get_bytes(8)? != KEYCHAIN_MAGIC {
            return Err(Error::version("bad keychain magic"));
        }
        let count = cur.get::<u64>()? as usize;
        let keychain = Keychain::new();
        for _ in 0..count {
            keychain.push(KeychainEntry::read(&mut cur)?);
        }
        Ok(keychain)
    }
}
