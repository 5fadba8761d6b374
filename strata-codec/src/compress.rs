//! Compression codecs. One identifier is reserved for stored/identity so
//! the writer can fall back to raw bytes when compression would inflate.

use strata_base::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[repr(u8)]
pub enum CodecId {
    Stored = 0,
    Zstd = 1,
    Lz4 = 2,
}

impl CodecId {
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(CodecId::Stored),
            1 => Ok(CodecId::Zstd),
            2 => Ok(CodecId::Lz4),
            other => Err(Error::version(format!("unknown codec id {other}"))),
        }
    }
}

pub trait Codec: Send + Sync {
    fn id(&self) -> CodecId;

    /// Compress `src` into `dst`, replacing its contents.
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>, level: i32) -> Result<()>;

    /// Decompress `src` into `dst`, replacing its contents.
    /// `uncompressed_len` is the exact expected output length.
    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>, uncompressed_len: usize) -> Result<()>;
}

pub fn codec(id: CodecId) -> &'static dyn Codec {
    match id {
        CodecId::Stored => &StoredCodec,
        CodecId::Zstd => &ZstdCodec,
        CodecId::Lz4 => &Lz4Codec,
    }
}

struct StoredCodec;

impl Codec for StoredCodec {
    fn id(&self) -> CodecId {
        CodecId::Stored
    }

    fn compress(&self, src: &[u8], dst: &mut Vec<u8>, _level: i32) -> Result<()> {
        dst.clear();
        dst.extend_from_slice(src);
        Ok(())
    }

    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>, uncompressed_len: usize) -> Result<()> {
        if src.len() != uncompressed_len {
            return Err(Error::codec(format!(
                "stored payload is {} bytes, expected {}",
                src.len(),
                uncompressed_len
            )));
        }
        dst.clear();
        dst.extend_from_slice(src);
        Ok(())
    }
}

struct ZstdCodec;

impl Codec for ZstdCodec {
    fn id(&self) -> CodecId {
        CodecId::Zstd
    }

    fn compress(&self, src: &[u8], dst: &mut Vec<u8>, level: i32) -> Result<()> {
        let out = zstd::bulk::compress(src, level)
            .map_err(|e| Error::codec(format!("zstd compress: {e}")))?;
        *dst = out;
        Ok(())
    }

    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>, uncompressed_len: usize) -> Result<()> {
        let out = zstd::bulk::decompress(src, uncompressed_len)
            .map_err(|e| Error::codec(format!("zstd decompress: {e}")))?;
        if out.len() != uncompressed_len {
            return Err(Error::codec(format!(
                "zstd produced {} bytes, expected {}",
                out.len(),
                uncompressed_len
            )));
        }
        *dst = out;
        Ok(())
    }
}

struct Lz4Codec;

impl Codec for Lz4Codec {
    fn id(&self) -> CodecId {
        CodecId::Lz4
    }

    fn compress(&self, src: &[u8], dst: &mut Vec<u8>, _level: i32) -> Result<()> {
        *dst = lz4_flex::block::compress(src);
        Ok(())
    }

    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>, uncompressed_len: usize) -> Result<()> {
        let out = lz4_flex::block::decompress(src, uncompressed_len)
            .map_err(|e| Error::codec(format!("lz4 decompress: {e}")))?;
        *dst = out;
        Ok(())
    }
}
