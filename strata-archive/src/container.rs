//! The data container: one logical column inside a block.
//!
//! A container is created empty, collects typed primitives during one
//! block, and is then finalized (uniformity collapse, integer narrowing,
//! stride resolution), compressed, digested and optionally encrypted
//! before being written. The read path runs the same steps backwards and
//! refuses to expose bytes whose digests do not verify.

use funty::Integral;
use strata_base::{ByteBuffer, ByteCursor, Error, Primitive, Result};
use strata_codec::{
    codec, decrypt_in_place, encrypt_in_place, generate_material, md5, CipherKind, CodecId,
    DigestPair, Keychain, KeychainEntry,
};

/// Primitive type tag carried in every data header.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum TypeTag {
    I8 = 0,
    I16 = 1,
    I32 = 2,
    I64 = 3,
    U8 = 4,
    U16 = 5,
    U32 = 6,
    U64 = 7,
    F32 = 8,
    F64 = 9,
    Char = 10,
    Bool = 11,
}

impl TypeTag {
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(TypeTag::I8),
            1 => Ok(TypeTag::I16),
            2 => Ok(TypeTag::I32),
            3 => Ok(TypeTag::I64),
            4 => Ok(TypeTag::U8),
            5 => Ok(TypeTag::U16),
            6 => Ok(TypeTag::U32),
            7 => Ok(TypeTag::U64),
            8 => Ok(TypeTag::F32),
            9 => Ok(TypeTag::F64),
            10 => Ok(TypeTag::Char),
            11 => Ok(TypeTag::Bool),
            other => Err(Error::version(format!("unknown type tag {other}"))),
        }
    }

    pub fn width(self) -> usize {
        match self {
            TypeTag::I8 | TypeTag::U8 | TypeTag::Char | TypeTag::Bool => 1,
            TypeTag::I16 | TypeTag::U16 => 2,
            TypeTag::I32 | TypeTag::U32 | TypeTag::F32 => 4,
            TypeTag::I64 | TypeTag::U64 | TypeTag::F64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeTag::I8
                | TypeTag::I16
                | TypeTag::I32
                | TypeTag::I64
                | TypeTag::U8
                | TypeTag::U16
                | TypeTag::U32
                | TypeTag::U64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(self, TypeTag::I8 | TypeTag::I16 | TypeTag::I32 | TypeTag::I64)
    }
}

/// Maps an appendable primitive to its tag.
pub trait ColumnValue: Primitive {
    const TAG: TypeTag;
}

macro_rules! impl_column_value {
    ($($t:ty => $tag:expr),*) => {$(
        impl ColumnValue for $t {
            const TAG: TypeTag = $tag;
        }
    )*};
}

impl_column_value!(
    i8 => TypeTag::I8, i16 => TypeTag::I16, i32 => TypeTag::I32, i64 => TypeTag::I64,
    u8 => TypeTag::U8, u16 => TypeTag::U16, u32 => TypeTag::U32, u64 => TypeTag::U64,
    f32 => TypeTag::F32, f64 => TypeTag::F64
);

// Data-header controller bits.
const FLAG_VARIABLE_STRIDE: u16 = 1 << 0;
const FLAG_UNIFORM: u16 = 1 << 1;
const FLAG_SIGNED: u16 = 1 << 2;
const FLAG_PREPROCESSED: u16 = 1 << 3;
const FLAG_ENCRYPTED: u16 = 1 << 4;

/// Fixed-size column header; 16 bytes of MD5 over its serialized form
/// follow it on disk.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct DataHeader {
    pub controller: u16,
    pub type_tag: TypeTag,
    pub codec: CodecId,
    pub cipher: CipherKind,
    /// -1 for variable stride, else primitives per record entry.
    pub stride: i32,
    /// Primitive element count in the uncompressed payload.
    pub n_entries: u32,
    /// Record entry count (`add_stride` calls).
    pub n_additions: u32,
    pub u_length: u32,
    pub c_length: u32,
    /// Global annotation id; -1 for meta columns.
    pub global_key: i32,
    pub digests: DigestPair,
}

impl Default for DataHeader {
    fn default() -> Self {
        DataHeader {
            controller: 0,
            type_tag: TypeTag::U8,
            codec: CodecId::Stored,
            cipher: CipherKind::None,
            stride: 1,
            n_entries: 0,
            n_additions: 0,
            u_length: 0,
            c_length: 0,
            global_key: -1,
            digests: DigestPair::default(),
        }
    }
}

impl DataHeader {
    pub const SERIALIZED_LEN: usize = 2 + 1 + 1 + 1 + 4 + 4 + 4 + 4 + 4 + 4 + 128;

    pub fn uniform(&self) -> bool {
        self.controller & FLAG_UNIFORM != 0
    }

    pub fn variable_stride(&self) -> bool {
        self.controller & FLAG_VARIABLE_STRIDE != 0
    }

    pub fn encrypted(&self) -> bool {
        self.controller & FLAG_ENCRYPTED != 0
    }

    pub fn write(&self, buf: &mut ByteBuffer) {
        let start = buf.len();
        buf.put(self.controller);
        buf.put(self.type_tag as u8);
        buf.put(self.codec as u8);
        buf.put(self.cipher as u8);
        buf.put(self.stride);
        buf.put(self.n_entries);
        buf.put(self.n_additions);
        buf.put(self.u_length);
        buf.put(self.c_length);
        buf.put(self.global_key);
        self.digests.write(buf);
        debug_assert_eq!(buf.len() - start, Self::SERIALIZED_LEN);
    }

    pub fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let controller = cur.get::<u16>()?;
        let type_tag = TypeTag::from_u8(cur.get::<u8>()?)?;
        let codec = CodecId::from_u8(cur.get::<u8>()?)?;
        let cipher = CipherKind::from_u8(cur.get::<u8>()?)?;
        let stride = cur.get::<i32>()?;
        let n_entries = cur.get::<u32>()?;
        let n_additions = cur.get::<u32>()?;
        let u_length = cur.get::<u32>()?;
        let c_length = cur.get::<u32>()?;
        let global_key = cur.get::<i32>()?;
        let digests = DigestPair::read(cur)?;
        if controller & FLAG_PREPROCESSED != 0 {
            // The preprocessor transform is undefined in this format
            // revision; refuse rather than misinterpret bytes.
            return Err(Error::version("preprocessed container flag set"));
        }
        Ok(DataHeader {
            controller,
            type_tag,
            codec,
            cipher,
            stride,
            n_entries,
            n_additions,
            u_length,
            c_length,
            global_key,
            digests,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ContainerState {
    Appending,
    Finalized,
    Compressed,
    Verified,
}

/// One column: header, data stream, optional stride stream.
#[derive(Clone, Debug)]
pub struct DataContainer {
    header: DataHeader,
    stride_header: Option<DataHeader>,
    data: ByteBuffer,
    data_compressed: Vec<u8>,
    strides_raw: Vec<u32>,
    strides: ByteBuffer,
    strides_compressed: Vec<u8>,
    type_tag: Option<TypeTag>,
    values_since_stride: u32,
    state: ContainerState,
}

impl Default for DataContainer {
    fn default() -> Self {
        DataContainer::new(-1)
    }
}

impl DataContainer {
    pub fn new(global_key: i32) -> Self {
        let mut header = DataHeader::default();
        header.global_key = global_key;
        DataContainer {
            header,
            stride_header: None,
            data: ByteBuffer::new(),
            data_compressed: Vec::new(),
            strides_raw: Vec::new(),
            strides: ByteBuffer::new(),
            strides_compressed: Vec::new(),
            type_tag: None,
            values_since_stride: 0,
            state: ContainerState::Appending,
        }
    }

    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    pub fn is_empty(&self) -> bool {
        self.header.n_entries == 0 && self.data.is_empty()
    }

    pub fn n_additions(&self) -> u32 {
        self.header.n_additions
    }

    fn check_tag(&mut self, tag: TypeTag) -> Result<()> {
        debug_assert_eq!(self.state, ContainerState::Appending);
        match self.type_tag {
            None => {
                self.type_tag = Some(tag);
                Ok(())
            }
            Some(set) if set == tag => Ok(()),
            Some(set) => Err(Error::schema(format!(
                "append of {tag:?} to a {set:?} column"
            ))),
        }
    }

    /// Append one primitive of the column's declared type. The first
    /// append fixes the type.
    pub fn append<T: ColumnValue>(&mut self, val: T) -> Result<()> {
        self.check_tag(T::TAG)?;
        self.data.put(val);
        self.header.n_entries += 1;
        self.values_since_stride += 1;
        Ok(())
    }

    pub fn append_slice<T: ColumnValue>(&mut self, vals: &[T]) -> Result<()> {
        self.check_tag(T::TAG)?;
        self.data.put_slice(vals);
        self.header.n_entries += vals.len() as u32;
        self.values_since_stride += vals.len() as u32;
        Ok(())
    }

    /// Raw byte append for string-ish columns; tagged `char`.
    pub fn append_chars(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_tag(TypeTag::Char)?;
        self.data.put_bytes(bytes);
        self.header.n_entries += bytes.len() as u32;
        self.values_since_stride += bytes.len() as u32;
        Ok(())
    }

    pub fn append_bool(&mut self, val: bool) -> Result<()> {
        self.check_tag(TypeTag::Bool)?;
        self.data.put(val as u8);
        self.header.n_entries += 1;
        self.values_since_stride += 1;
        Ok(())
    }

    /// Close one record entry of `n` primitives.
    pub fn add_stride(&mut self, n: u32) -> Result<()> {
        if n > self.values_since_stride {
            return Err(Error::schema(format!(
                "stride {n} covers more than the {} appended values",
                self.values_since_stride
            )));
        }
        self.strides_raw.push(n);
        self.header.n_additions += 1;
        self.values_since_stride = 0;
        Ok(())
    }

    /// Uniformity collapse, integer narrowing, stride resolution.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state != ContainerState::Appending {
            return Err(Error::schema("container finalized twice"));
        }
        self.state = ContainerState::Finalized;
        if self.is_empty() {
            // Record entries may exist with zero payload (all-empty
            // strings); their shared stride is zero.
            if !self.strides_raw.is_empty() {
                self.header.stride = 0;
            }
            return Ok(());
        }

        let tag = self
            .type_tag
            .ok_or_else(|| Error::schema("container has entries but no type"))?;
        self.header.type_tag = tag;
        if tag.is_signed() {
            self.header.controller |= FLAG_SIGNED;
        }

        // Stride resolution: one shared value means fixed mode.
        let fixed = match self.strides_raw.as_slice() {
            [] => {
                // Never striped: the whole payload is one entry per value.
                self.header.n_additions = self.header.n_entries;
                Some(1u32)
            }
            [first, rest @ ..] => rest.iter().all(|s| s == first).then_some(*first),
        };

        // Uniformity: every record entry byte-identical. Requires at
        // least two entries and equal byte lengths.
        if self.detect_uniform(tag) {
            self.header.controller |= FLAG_UNIFORM;
            let entry_bytes = self.data.len() / self.header.n_additions as usize;
            let first: Vec<u8> = self.data.as_slice()[..entry_bytes].to_vec();
            self.data.clear();
            self.data.put_bytes(&first);
            self.header.n_entries = (entry_bytes / tag.width()) as u32;
            // A uniform column is fixed-stride by construction.
            self.header.stride = self.header.n_entries as i32;
            self.strides_raw.clear();
            return Ok(());
        }

        match fixed {
            Some(stride) => {
                self.header.stride = stride as i32;
            }
            None => {
                self.header.controller |= FLAG_VARIABLE_STRIDE;
                self.header.stride = -1;
                for &s in &self.strides_raw {
                    self.strides.put(s);
                }
                let mut sh = DataHeader::default();
                sh.type_tag = TypeTag::U32;
                sh.stride = 1;
                sh.n_entries = self.strides_raw.len() as u32;
                sh.n_additions = self.strides_raw.len() as u32;
                sh.global_key = self.header.global_key;
                self.stride_header = Some(sh);
            }
        }

        // Narrowing, on non-uniform integer columns only.
        if tag.is_integer() {
            self.narrow_integers(tag)?;
        }
        Ok(())
    }

    fn detect_uniform(&self, _tag: TypeTag) -> bool {
        let n = self.header.n_additions as usize;
        if n < 2 {
            return false;
        }
        if !self.strides_raw.is_empty() {
            let first = self.strides_raw[0];
            if self.strides_raw.iter().any(|&s| s != first) {
                return false;
            }
        }
        let bytes = self.data.as_slice();
        if bytes.len() % n != 0 {
            return false;
        }
        let entry = bytes.len() / n;
        if entry == 0 {
            return false;
        }
        let first = &bytes[..entry];
        bytes.chunks_exact(entry).all(|chunk| chunk == first)
    }

    fn narrow_integers(&mut self, tag: TypeTag) -> Result<()> {
        let narrowed = if tag.is_signed() {
            let vals = self.decode_signed(tag)?;
            let (lo, hi) = match (vals.iter().min(), vals.iter().max()) {
                (Some(&lo), Some(&hi)) => (lo, hi),
                _ => return Ok(()),
            };
            let target = if lo >= i8::MIN as i64 && hi <= i8::MAX as i64 {
                TypeTag::I8
            } else if lo >= i16::MIN as i64 && hi <= i16::MAX as i64 {
                TypeTag::I16
            } else if lo >= i32::MIN as i64 && hi <= i32::MAX as i64 {
                TypeTag::I32
            } else {
                TypeTag::I64
            };
            if target.width() >= tag.width() {
                return Ok(());
            }
            let mut data = ByteBuffer::with_capacity(vals.len() * target.width());
            for v in vals {
                match target {
                    TypeTag::I8 => data.put(v as i8),
                    TypeTag::I16 => data.put(v as i16),
                    TypeTag::I32 => data.put(v as i32),
                    _ => data.put(v),
                }
            }
            Some((target, data))
        } else {
            let vals = self.decode_unsigned(tag)?;
            let hi = match vals.iter().max() {
                Some(&hi) => hi,
                None => return Ok(()),
            };
            let target = if hi <= u8::MAX as u64 {
                TypeTag::U8
            } else if hi <= u16::MAX as u64 {
                TypeTag::U16
            } else if hi <= u32::MAX as u64 {
                TypeTag::U32
            } else {
                TypeTag::U64
            };
            if target.width() >= tag.width() {
                return Ok(());
            }
            let mut data = ByteBuffer::with_capacity(vals.len() * target.width());
            for v in vals {
                match target {
                    TypeTag::U8 => data.put(v as u8),
                    TypeTag::U16 => data.put(v as u16),
                    TypeTag::U32 => data.put(v as u32),
                    _ => data.put(v),
                }
            }
            Some((target, data))
        };

        if let Some((target, data)) = narrowed {
            self.header.type_tag = target;
            self.data = data;
        }
        Ok(())
    }

    fn decode_fixed<T: Primitive>(bytes: &[u8]) -> Vec<T> {
        bytes.chunks_exact(T::WIDTH).map(T::get_le).collect()
    }

    fn decode_signed(&self, tag: TypeTag) -> Result<Vec<i64>> {
        let b = self.data.as_slice();
        Ok(match tag {
            TypeTag::I8 => widen::<i8>(b),
            TypeTag::I16 => widen::<i16>(b),
            TypeTag::I32 => widen::<i32>(b),
            TypeTag::I64 => Self::decode_fixed::<i64>(b),
            other => return Err(Error::schema(format!("{other:?} is not signed"))),
        })
    }

    fn decode_unsigned(&self, tag: TypeTag) -> Result<Vec<u64>> {
        let b = self.data.as_slice();
        Ok(match tag {
            TypeTag::U8 => widen_u::<u8>(b),
            TypeTag::U16 => widen_u::<u16>(b),
            TypeTag::U32 => widen_u::<u32>(b),
            TypeTag::U64 => Self::decode_fixed::<u64>(b),
            other => return Err(Error::schema(format!("{other:?} is not unsigned"))),
        })
    }

    /// Compress both streams, record lengths and digests. The identity
    /// codec takes over whenever real compression would inflate.
    pub fn compress(&mut self, codec_id: CodecId, level: i32) -> Result<()> {
        if self.state != ContainerState::Finalized {
            return Err(Error::schema("compress before finalize"));
        }
        self.state = ContainerState::Compressed;

        let (data_codec, data_c) = compress_best(codec_id, level, self.data.as_slice())?;
        self.header.codec = data_codec;
        self.header.u_length = self.data.len() as u32;
        self.header.c_length = data_c.len() as u32;
        self.header.digests = DigestPair::of(self.data.as_slice(), &data_c);
        self.data_compressed = data_c;

        if let Some(sh) = self.stride_header.as_mut() {
            let (stride_codec, stride_c) = compress_best(codec_id, level, self.strides.as_slice())?;
            sh.codec = stride_codec;
            sh.u_length = self.strides.len() as u32;
            sh.c_length = stride_c.len() as u32;
            sh.digests = DigestPair::of(self.strides.as_slice(), &stride_c);
            sh.controller = self.header.controller & !FLAG_ENCRYPTED;
            self.strides_compressed = stride_c;
        }
        Ok(())
    }

    pub fn digest_pair(&self) -> DigestPair {
        self.header.digests
    }

    /// Encrypt the compressed payloads, pushing material to the keychain.
    /// The stride stream gets its own entry under the stride flag bit.
    pub fn encrypt(
        &mut self,
        cipher: CipherKind,
        block_id: u64,
        column_id: u32,
        keychain: &Keychain,
    ) -> Result<()> {
        if cipher == CipherKind::None {
            return Ok(());
        }
        if self.state != ContainerState::Compressed {
            return Err(Error::schema("encrypt before compress"));
        }

        let (key, nonce) = generate_material();
        let tag = encrypt_in_place(cipher, &key, &nonce, &mut self.data_compressed)?;
        keychain.push(KeychainEntry {
            block_id,
            column_id,
            cipher,
            key,
            nonce,
            tag,
        });
        self.header.controller |= FLAG_ENCRYPTED;
        self.header.cipher = cipher;

        if let Some(sh) = self.stride_header.as_mut() {
            let (skey, snonce) = generate_material();
            let stag = encrypt_in_place(cipher, &skey, &snonce, &mut self.strides_compressed)?;
            keychain.push(KeychainEntry {
                block_id,
                column_id: column_id | COLUMN_STRIDE_FLAG,
                cipher,
                key: skey,
                nonce: snonce,
                tag: stag,
            });
            sh.controller |= FLAG_ENCRYPTED;
            sh.cipher = cipher;
        }
        Ok(())
    }

    /// Serialized on-disk form: header, header-MD5, payload; then the
    /// stride triple when the stride is variable.
    pub fn write(&self, buf: &mut ByteBuffer) {
        write_record(&self.header, &self.data_compressed, buf);
        if let Some(sh) = &self.stride_header {
            write_record(sh, &self.strides_compressed, buf);
        }
    }

    /// Parse one column record (and its stride record when flagged) from
    /// `cur`, leaving the container in compressed state.
    pub fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let (header, payload) = read_record(cur)?;
        let mut container = DataContainer::new(header.global_key);
        let (stride_header, stride_payload) = if header.variable_stride() {
            let (sh, sp) = read_record(cur)?;
            (Some(sh), sp)
        } else {
            (None, Vec::new())
        };
        container.type_tag = Some(header.type_tag);
        container.header = header;
        container.stride_header = stride_header;
        container.data_compressed = payload;
        container.strides_compressed = stride_payload;
        container.state = ContainerState::Compressed;
        Ok(container)
    }

    /// Decrypt the compressed payloads using keychain material.
    pub fn decrypt(&mut self, block_id: u64, column_id: u32, keychain: &Keychain) -> Result<()> {
        if !self.header.encrypted() {
            return Ok(());
        }
        let entry = keychain.lookup(block_id, column_id).ok_or_else(|| {
            Error::auth(format!(
                "no keychain entry for block {block_id} column {column_id}"
            ))
        })?;
        decrypt_in_place(
            entry.cipher,
            &entry.key,
            &entry.nonce,
            &entry.tag,
            &mut self.data_compressed,
        )?;
        self.header.controller &= !FLAG_ENCRYPTED;

        if let Some(sh) = self.stride_header.as_mut() {
            if sh.encrypted() {
                let sid = column_id | COLUMN_STRIDE_FLAG;
                let entry = keychain.lookup(block_id, sid).ok_or_else(|| {
                    Error::auth(format!(
                        "no keychain entry for block {block_id} stride column {column_id}"
                    ))
                })?;
                decrypt_in_place(
                    entry.cipher,
                    &entry.key,
                    &entry.nonce,
                    &entry.tag,
                    &mut self.strides_compressed,
                )?;
                sh.controller &= !FLAG_ENCRYPTED;
            }
        }
        Ok(())
    }

    /// Decompress and verify both digests; only verified bytes are ever
    /// exposed to consumers.
    pub fn decompress(&mut self) -> Result<()> {
        if self.state != ContainerState::Compressed {
            return Err(Error::schema("decompress before read"));
        }
        if self.header.encrypted() {
            return Err(Error::auth("decompress of an encrypted container"));
        }

        let compressed_digest = strata_codec::sha512(&self.data_compressed);
        if compressed_digest != self.header.digests.compressed {
            return Err(Error::checksum("compressed column payload"));
        }
        let mut out = Vec::new();
        codec(self.header.codec).decompress(
            &self.data_compressed,
            &mut out,
            self.header.u_length as usize,
        )?;
        if strata_codec::sha512(&out) != self.header.digests.uncompressed {
            return Err(Error::checksum("uncompressed column payload"));
        }
        self.data = ByteBuffer::from(out);

        if let Some(sh) = &self.stride_header {
            if strata_codec::sha512(&self.strides_compressed) != sh.digests.compressed {
                return Err(Error::checksum("compressed stride payload"));
            }
            let mut out = Vec::new();
            codec(sh.codec).decompress(&self.strides_compressed, &mut out, sh.u_length as usize)?;
            if strata_codec::sha512(&out) != sh.digests.uncompressed {
                return Err(Error::checksum("uncompressed stride payload"));
            }
            self.strides = ByteBuffer::from(out);
        }
        self.state = ContainerState::Verified;
        Ok(())
    }

    fn verified_payload(&self) -> Result<&[u8]> {
        if self.state != ContainerState::Verified && self.state != ContainerState::Finalized {
            return Err(Error::schema("payload access before verification"));
        }
        Ok(self.data.as_slice())
    }

    /// Per-record-entry strides, uniform entries expanded.
    pub fn entry_strides(&self) -> Result<Vec<u32>> {
        if self.header.variable_stride() {
            let bytes = self.strides.as_slice();
            let mut cur = ByteCursor::new(bytes);
            cur.get_vec::<u32>(self.header.n_additions as usize)
        } else {
            Ok(vec![
                self.header.stride.max(0) as u32;
                self.header.n_additions as usize
            ])
        }
    }

    /// Integer payload widened to i64, uniform entries expanded, in
    /// record-entry order.
    pub fn read_integers(&self) -> Result<Vec<i64>> {
        let bytes = self.verified_payload()?;
        let tag = self.header.type_tag;
        let vals: Vec<i64> = match tag {
            TypeTag::I8 => widen::<i8>(bytes),
            TypeTag::I16 => widen::<i16>(bytes),
            TypeTag::I32 => widen::<i32>(bytes),
            TypeTag::I64 => Self::decode_fixed::<i64>(bytes),
            TypeTag::U8 | TypeTag::Bool | TypeTag::Char => {
                widen_u::<u8>(bytes).into_iter().map(|v| v as i64).collect()
            }
            TypeTag::U16 => widen_u::<u16>(bytes).into_iter().map(|v| v as i64).collect(),
            TypeTag::U32 => widen_u::<u32>(bytes).into_iter().map(|v| v as i64).collect(),
            TypeTag::U64 => Self::decode_fixed::<u64>(bytes)
                .into_iter()
                .map(|v| v as i64)
                .collect(),
            other => return Err(Error::schema(format!("{other:?} is not an integer column"))),
        };
        Ok(self.expand_uniform(vals))
    }

    /// Unsigned payload widened to u64 (genotype word streams).
    pub fn read_words(&self) -> Result<Vec<u64>> {
        let bytes = self.verified_payload()?;
        let vals: Vec<u64> = match self.header.type_tag {
            TypeTag::U8 => widen_u::<u8>(bytes),
            TypeTag::U16 => widen_u::<u16>(bytes),
            TypeTag::U32 => widen_u::<u32>(bytes),
            TypeTag::U64 => Self::decode_fixed::<u64>(bytes),
            other => return Err(Error::schema(format!("{other:?} is not a word column"))),
        };
        Ok(self.expand_uniform(vals))
    }

    pub fn read_floats(&self) -> Result<Vec<f32>> {
        let bytes = self.verified_payload()?;
        if self.header.type_tag != TypeTag::F32 {
            return Err(Error::schema(format!(
                "{:?} is not an f32 column",
                self.header.type_tag
            )));
        }
        let vals = Self::decode_fixed::<f32>(bytes);
        Ok(self.expand_uniform(vals))
    }

    /// Raw bytes of the verified payload, uniform entries expanded.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let bytes = self.verified_payload()?.to_vec();
        Ok(self.expand_uniform(bytes))
    }

    fn expand_uniform<T: Clone>(&self, vals: Vec<T>) -> Vec<T> {
        if !self.header.uniform() {
            return vals;
        }
        let n = self.header.n_additions as usize;
        let mut out = Vec::with_capacity(vals.len() * n);
        for _ in 0..n {
            out.extend(vals.iter().cloned());
        }
        out
    }
}

/// Keychain column-id bit marking a stride sub-stream.
pub const COLUMN_STRIDE_FLAG: u32 = 0x8000_0000;

fn write_record(header: &DataHeader, payload: &[u8], buf: &mut ByteBuffer) {
    let mut head = ByteBuffer::with_capacity(DataHeader::SERIALIZED_LEN);
    header.write(&mut head);
    buf.put_bytes(head.as_slice());
    buf.put_bytes(&md5(head.as_slice()));
    buf.put_bytes(payload);
}

fn read_record(cur: &mut ByteCursor<'_>) -> Result<(DataHeader, Vec<u8>)> {
    let head_bytes = cur.get_bytes(DataHeader::SERIALIZED_LEN)?;
    let mut stored_md5 = [0u8; 16];
    stored_md5.copy_from_slice(cur.get_bytes(16)?);
    if md5(head_bytes) != stored_md5 {
        return Err(Error::checksum("column header MD5"));
    }
    let header = DataHeader::read(&mut ByteCursor::new(head_bytes))?;
    let payload = cur.get_bytes(header.c_length as usize)?.to_vec();
    Ok((header, payload))
}

fn compress_best(codec_id: CodecId, level: i32, src: &[u8]) -> Result<(CodecId, Vec<u8>)> {
    if codec_id == CodecId::Stored || src.is_empty() {
        return Ok((CodecId::Stored, src.to_vec()));
    }
    let mut out = Vec::new();
    codec(codec_id).compress(src, &mut out, level)?;
    if out.len() >= src.len() {
        Ok((CodecId::Stored, src.to_vec()))
    } else {
        Ok((codec_id, out))
    }
}

fn widen<T: Primitive + Integral>(bytes: &[u8]) -> Vec<i64>
where
    i64: From<T>,
{
    bytes
        .chunks_exact(T::WIDTH)
        .map(|c| i64::from(T::get_le(c)))
        .collect()
}

fn widen_u<T: Primitive + Integral>(bytes: &[u8]) -> Vec<u64>
where
    u64: From<T>,
{
    bytes
        .chunks_exact(T::WIDTH)
        .map(|c| u64::from(T::get_le(c)))
        .collect()
}
