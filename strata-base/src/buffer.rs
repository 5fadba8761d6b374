//! Growable little-endian byte sequence underlying every column payload.
//!
//! All integer and floating-point serialization in the archive goes through
//! [`ByteBuffer`] and [`ByteCursor`]; strings and opaque byte runs are
//! length-prefixed with a 32-bit unsigned count. Reads past the logical
//! length fail with `BufferBounds` rather than panicking.

use crate::{Error, Result};

/// Fixed-width primitive with a little-endian wire form.
///
/// Implemented for the integer and float types a column may carry. Code
/// that needs integer-only behaviour (narrowing, range checks) bounds the
/// same parameter with `funty::Integral` on top of this.
pub trait Primitive: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    const WIDTH: usize;
    fn put_le(self, dst: &mut Vec<u8>);
    /// `src` must be exactly `WIDTH` bytes; bounds are the caller's problem.
    fn get_le(src: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($t:ty),*) => {$(
        impl Primitive for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();
            fn put_le(self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&self.to_le_bytes());
            }
            fn get_le(src: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(src);
                <$t>::from_le_bytes(raw)
            }
        }
    )*};
}

impl_primitive!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

#[derive(Clone, Default, Debug, PartialEq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        ByteBuffer { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteBuffer {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    /// Drops the logical contents but keeps the allocation for the next block.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn put<T: Primitive>(&mut self, val: T) {
        val.put_le(&mut self.data);
    }

    pub fn put_slice<T: Primitive>(&mut self, vals: &[T]) {
        self.data.reserve(vals.len() * T::WIDTH);
        for val in vals {
            val.put_le(&mut self.data);
        }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// 32-bit unsigned length prefix followed by the raw bytes.
    pub fn put_prefixed_bytes(&mut self, bytes: &[u8]) {
        self.put(bytes.len() as u32);
        self.data.extend_from_slice(bytes);
    }

    pub fn put_str(&mut self, s: &str) {
        self.put_prefixed_bytes(s.as_bytes());
    }

    /// Positional read at an absolute byte offset.
    pub fn get<T: Primitive>(&self, offset: usize) -> Result<T> {
        let end = offset
            .checked_add(T::WIDTH)
            .ok_or_else(|| Error::bounds("offset overflow"))?;
        if end > self.data.len() {
            return Err(Error::bounds(format!(
                "read of {} bytes at {} past logical length {}",
                T::WIDTH,
                offset,
                self.data.len()
            )));
        }
        Ok(T::get_le(&self.data[offset..end]))
    }

    pub fn cursor(&self) -> ByteCursor<'_> {
        ByteCursor::new(&self.data)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        ByteBuffer { data }
    }
}

/// Forward, restartable read position over a byte slice.
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteCursor { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn get<T: Primitive>(&mut self) -> Result<T> {
        if self.remaining() < T::WIDTH {
            return Err(Error::bounds(format!(
                "read of {} bytes with {} remaining",
                T::WIDTH,
                self.remaining()
            )));
        }
        let val = T::get_le(&self.buf[self.pos..self.pos + T::WIDTH]);
        self.pos += T::WIDTH;
        Ok(val)
    }

    pub fn get_vec<T: Primitive>(&mut self, count: usize) -> Result<Vec<T>> {
        let mut vals = Vec::with_capacity(count);
        for _ in 0..count {
            vals.push(self.get::<T>()?);
        }
        Ok(vals)
    }

    pub fn get_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::bounds(format!(
                "read of {} bytes with {} remaining",
                count,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    pub fn get_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.get::<u32>()? as usize;
        self.get_bytes(len)
    }

    pub fn get_string(&mut self) -> Result<String> {
        let bytes = self.get_prefixed_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::schema("string payload is not valid utf-8"))
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.get_bytes(count).map(|_| ())
    }

    pub fn seek_to(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(Error::bounds(format!(
                "seek to {} past logical length {}",
                pos,
                self.buf.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }
}
