//! The variant block: a fixed schema of twenty meta columns plus dynamic
//! INFO and FORMAT columns, collected from records and emitted as one
//! self-contained, independently decodable unit.

use std::collections::BTreeMap;

use strata_base::{
    BlockController, ByteBuffer, ByteCursor, Error, RecordController, Result,
};
use strata_codec::{codec, md5, CodecId, DigestPair, FieldKind, Keychain};
use strata_gt::{encode_block as encode_genotypes, GtMethod, GtVariant, GtVariantEncoding};

use crate::config::WriterConfig;
use crate::container::DataContainer;
use crate::header::{ArchiveHeader, FieldType};
use crate::magic::{self, BLOCK_EOF};
use crate::pattern::PatternDictionary;
use crate::record::{FieldValue, VariantRecord};
use crate::stats::CompressionStats;

/// The twenty fixed meta columns, in deterministic write order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(usize)]
pub enum MetaColumn {
    Contig = 0,
    Position = 1,
    Controller = 2,
    Quality = 3,
    Names = 4,
    RefAltPacked = 5,
    RefAltStrings = 6,
    InfoPatterns = 7,
    FormatPatterns = 8,
    FilterPatterns = 9,
    GtSupport = 10,
    GtPermutation = 11,
    GtRle8 = 12,
    GtRle16 = 13,
    GtRle32 = 14,
    GtRle64 = 15,
    GtSimple8 = 16,
    GtSimple16 = 17,
    GtSimple32 = 18,
    GtSimple64 = 19,
}

impl MetaColumn {
    pub const ALL: [MetaColumn; 20] = [
        MetaColumn::Contig,
        MetaColumn::Position,
        MetaColumn::Controller,
        MetaColumn::Quality,
        MetaColumn::Names,
        MetaColumn::RefAltPacked,
        MetaColumn::RefAltStrings,
        MetaColumn::InfoPatterns,
        MetaColumn::FormatPatterns,
        MetaColumn::FilterPatterns,
        MetaColumn::GtSupport,
        MetaColumn::GtPermutation,
        MetaColumn::GtRle8,
        MetaColumn::GtRle16,
        MetaColumn::GtRle32,
        MetaColumn::GtRle64,
        MetaColumn::GtSimple8,
        MetaColumn::GtSimple16,
        MetaColumn::GtSimple32,
        MetaColumn::GtSimple64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetaColumn::Contig => "MetaContig",
            MetaColumn::Position => "MetaPositions",
            MetaColumn::Controller => "MetaController",
            MetaColumn::Quality => "MetaQuality",
            MetaColumn::Names => "MetaNames",
            MetaColumn::RefAltPacked => "MetaRefAlt",
            MetaColumn::RefAltStrings => "MetaAlleles",
            MetaColumn::InfoPatterns => "MetaInfoMaps",
            MetaColumn::FormatPatterns => "MetaFormatMaps",
            MetaColumn::FilterPatterns => "MetaFilterMaps",
            MetaColumn::GtSupport => "GT-Support",
            MetaColumn::GtPermutation => "GT-PPA",
            MetaColumn::GtRle8 => "GT-RLE8",
            MetaColumn::GtRle16 => "GT-RLE16",
            MetaColumn::GtRle32 => "GT-RLE32",
            MetaColumn::GtRle64 => "GT-RLE64",
            MetaColumn::GtSimple8 => "GT-Simple8",
            MetaColumn::GtSimple16 => "GT-Simple16",
            MetaColumn::GtSimple32 => "GT-Simple32",
            MetaColumn::GtSimple64 => "GT-Simple64",
        }
    }
}

/// Keychain column-id spaces for the three column families.
pub const COLUMN_INFO_BASE: u32 = 0x1000_0000;
pub const COLUMN_FORMAT_BASE: u32 = 0x2000_0000;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BlockHeader {
    pub block_id: u64,
    pub contig: i32,
    pub min_position: u64,
    pub max_position: u64,
    pub n_variants: u32,
    pub controller: BlockController,
    /// Offset of the block footer record, relative to the block start.
    pub footer_offset: u64,
}

impl BlockHeader {
    pub const SERIALIZED_LEN: usize = 8 + 4 + 8 + 8 + 4 + 2 + 8;

    fn write(&self, buf: &mut ByteBuffer) {
        buf.put(self.block_id);
        buf.put(self.contig);
        buf.put(self.min_position);
        buf.put(self.max_position);
        buf.put(self.n_variants);
        buf.put(self.controller.bits());
        buf.put(self.footer_offset);
    }

    pub(crate) fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(BlockHeader {
            block_id: cur.get::<u64>()?,
            contig: cur.get::<i32>()?,
            min_position: cur.get::<u64>()?,
            max_position: cur.get::<u64>()?,
            n_variants: cur.get::<u32>()?,
            controller: BlockController::from_bits(cur.get::<u16>()?),
            footer_offset: cur.get::<u64>()?,
        })
    }
}

/// Where each column record sits inside the block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ColumnLocation {
    pub key: u32,
    pub offset: u64,
    pub length: u64,
}

impl ColumnLocation {
    fn write(&self, buf: &mut ByteBuffer) {
        buf.put(self.key);
        buf.put(self.offset);
        buf.put(self.length);
    }

    fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(ColumnLocation {
            key: cur.get::<u32>()?,
            offset: cur.get::<u64>()?,
            length: cur.get::<u64>()?,
        })
    }
}

/// The block footer: column locations and the three pattern tables. It is
/// written as a compressed, MD5-protected record followed by the
/// end-of-block sentinel.
#[derive(Clone, Default, Debug)]
pub struct BlockFooter {
    pub meta: Vec<ColumnLocation>,
    pub info: Vec<ColumnLocation>,
    pub format: Vec<ColumnLocation>,
    pub info_patterns: PatternDictionary,
    pub format_patterns: PatternDictionary,
    pub filter_patterns: PatternDictionary,
}

impl BlockFooter {
    fn write(&self, buf: &mut ByteBuffer) {
        buf.put(self.meta.len() as u32);
        for loc in &self.meta {
            loc.write(buf);
        }
        buf.put(self.info.len() as u32);
        for loc in &self.info {
            loc.write(buf);
        }
        buf.put(self.format.len() as u32);
        for loc in &self.format {
            loc.write(buf);
        }
        self.info_patterns.write(buf);
        self.format_patterns.write(buf);
        self.filter_patterns.write(buf);
    }

    fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let mut footer = BlockFooter::default();
        let n_meta = cur.get::<u32>()? as usize;
        if n_meta != MetaColumn::ALL.len() {
            return Err(Error::truncated(format!(
                "block footer lists {n_meta} meta columns"
            )));
        }
        for _ in 0..n_meta {
            footer.meta.push(ColumnLocation::read(cur)?);
        }
        let n_info = cur.get::<u32>()? as usize;
        for _ in 0..n_info {
            footer.info.push(ColumnLocation::read(cur)?);
        }
        let n_format = cur.get::<u32>()? as usize;
        for _ in 0..n_format {
            footer.format.push(ColumnLocation::read(cur)?);
        }
        footer.info_patterns = PatternDictionary::read(cur)?;
        footer.format_patterns = PatternDictionary::read(cur)?;
        footer.filter_patterns = PatternDictionary::read(cur)?;
        Ok(footer)
    }
}

/// Accumulates position-sorted records until a flush trigger fires.
#[derive(Default, Debug)]
pub struct BlockBuilder {
    records: Vec<VariantRecord>,
    contig: i32,
    min_position: u64,
    max_position: u64,
}

impl BlockBuilder {
    pub fn new() -> Self {
        BlockBuilder {
            records: Vec::new(),
            contig: -1,
            min_position: 0,
            max_position: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn contig(&self) -> i32 {
        self.contig
    }

    pub fn min_position(&self) -> u64 {
        self.min_position
    }

    pub fn max_position(&self) -> u64 {
        self.max_position
    }

    /// Push one record. Ordering and range validation is the writer's
    /// responsibility; the builder just tracks span bookkeeping.
    pub fn push(&mut self, record: VariantRecord) {
        if self.records.is_empty() {
            self.contig = record.contig;
            self.min_position = record.position;
            self.max_position = record.position;
        } else {
            self.max_position = self.max_position.max(record.position);
        }
        self.records.push(record);
    }
}

/// A fully encoded block ready for the sink, with everything the writer
/// needs to update the index, digests, and statistics afterwards.
pub struct EncodedBlock {
    pub block_id: u64,
    pub contig: i32,
    pub min_position: u64,
    pub max_position: u64,
    pub n_variants: u32,
    pub bytes: Vec<u8>,
    pub digest_updates: Vec<(FieldKind, u32, DigestPair)>,
    pub stats: CompressionStats,
    /// Per-record (position, index end position), for bin indexing.
    pub record_spans: Vec<(u64, u64)>,
}

struct GtColumns {
    encodings: Vec<GtVariantEncoding>,
    has_permutation: bool,
}

/// Flush-time encoding of one block: genotype codec, column routing,
/// finalize, compress, digest, optional encrypt, serialize.
pub fn encode_block(
    builder: BlockBuilder,
    block_id: u64,
    archive_header: &ArchiveHeader,
    config: &WriterConfig,
    keychain: &Keychain,
) -> Result<EncodedBlock> {
    let records = builder.records;
    let n_variants = records.len() as u32;
    let min_position = builder.min_position;
    let span = builder.max_position - min_position;
    if span > u32::MAX as u64 {
        return Err(Error::schema(format!(
            "block position span {span} exceeds the 32-bit position offset"
        )));
    }

    let mut meta: [DataContainer; MetaColumn::ALL.len()] =
        std::array::from_fn(|_| DataContainer::new(-1));
    let mut info_columns: BTreeMap<u32, DataContainer> = BTreeMap::new();
    let mut format_columns: BTreeMap<u32, DataContainer> = BTreeMap::new();
    let mut info_patterns = PatternDictionary::new();
    let mut format_patterns = PatternDictionary::new();
    let mut filter_patterns = PatternDictionary::new();

    let gt = encode_gt_columns(&records, archive_header, config, &mut meta)?;

    let mut record_spans = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        record_spans.push((record.position, record.index_end()));
        append_meta(
            record,
            i,
            min_position,
            gt.as_ref(),
            &mut meta,
        )?;
        append_patterns(
            record,
            &mut meta,
            &mut info_patterns,
            &mut format_patterns,
            &mut filter_patterns,
        )?;
        append_annotations(
            record,
            archive_header,
            &mut info_columns,
            &mut format_columns,
        )?;
    }

    // Finalize and compress every column; collect digests and stats.
    let cipher = config.effective_cipher();
    let mut digest_updates = Vec::new();
    let mut stats = CompressionStats::new();
    for (idx, container) in meta.iter_mut().enumerate() {
        container.finalize()?;
        container.compress(config.codec, config.compression_level)?;
        container.encrypt(cipher, block_id, idx as u32, keychain)?;
        digest_updates.push((FieldKind::Meta, idx as u32, container.digest_pair()));
        let h = container.header();
        stats.add_meta(MetaColumn::ALL[idx], h.u_length as u64, h.c_length as u64);
    }
    for (&key, container) in info_columns.iter_mut() {
        container.finalize()?;
        container.compress(config.codec, config.compression_level)?;
        container.encrypt(cipher, block_id, COLUMN_INFO_BASE | key, keychain)?;
        digest_updates.push((FieldKind::Info, key, container.digest_pair()));
        let h = container.header();
        stats.add_info(h.u_length as u64, h.c_length as u64);
    }
    for (&key, container) in format_columns.iter_mut() {
        container.finalize()?;
        container.compress(config.codec, config.compression_level)?;
        container.encrypt(cipher, block_id, COLUMN_FORMAT_BASE | key, keychain)?;
        digest_updates.push((FieldKind::Format, key, container.digest_pair()));
        let h = container.header();
        stats.add_format(h.u_length as u64, h.c_length as u64);
    }

    // Assemble: columns first so the header can carry the footer offset.
    let mut body = ByteBuffer::new();
    let mut footer = BlockFooter {
        info_patterns,
        format_patterns,
        filter_patterns,
        ..BlockFooter::default()
    };
    let base = BlockHeader::SERIALIZED_LEN as u64;
    for (idx, container) in meta.iter().enumerate() {
        let offset = base + body.len() as u64;
        container.write(&mut body);
        footer.meta.push(ColumnLocation {
            key: idx as u32,
            offset,
            length: base + body.len() as u64 - offset,
        });
    }
    for (&key, container) in &info_columns {
        let offset = base + body.len() as u64;
        container.write(&mut body);
        footer.info.push(ColumnLocation {
            key,
            offset,
            length: base + body.len() as u64 - offset,
        });
    }
    for (&key, container) in &format_columns {
        let offset = base + body.len() as u64;
        container.write(&mut body);
        footer.format.push(ColumnLocation {
            key,
            offset,
            length: base + body.len() as u64 - offset,
        });
    }

    let mut controller = BlockController::default();
    controller.set(BlockController::HAS_GT, gt.is_some());
    controller.set(
        BlockController::HAS_PERMUTATION,
        gt.as_ref().map(|g| g.has_permutation).unwrap_or(false),
    );
    controller.set(BlockController::ANY_ENCRYPTED, cipher != strata_codec::CipherKind::None);

    let header = BlockHeader {
        block_id,
        contig: builder.contig,
        min_position,
        max_position: builder.max_position,
        n_variants,
        controller,
        footer_offset: base + body.len() as u64,
    };

    let mut bytes = ByteBuffer::with_capacity(
        BlockHeader::SERIALIZED_LEN + body.len() + 1024,
    );
    header.write(&mut bytes);
    bytes.put_bytes(body.as_slice());
    write_footer_record(&footer, config, &mut bytes)?;
    bytes.put(BLOCK_EOF);

    Ok(EncodedBlock {
        block_id,
        contig: builder.contig,
        min_position,
        max_position: builder.max_position,
        n_variants,
        bytes: bytes.into_vec(),
        digest_updates,
        stats,
        record_spans,
    })
}

fn encode_gt_columns(
    records: &[VariantRecord],
    archive_header: &ArchiveHeader,
    config: &WriterConfig,
    meta: &mut [DataContainer; MetaColumn::ALL.len()],
) -> Result<Option<GtColumns>> {
    let n_samples = archive_header.n_samples();
    let any_gt = records.iter().any(|r| r.genotypes.is_some());
    if !any_gt || n_samples == 0 {
        return Ok(None);
    }

    let mut gt_variants = Vec::with_capacity(records.len());
    for record in records {
        let genotypes = record.genotypes.clone().ok_or_else(|| {
            Error::schema("mixed genotype presence within one block")
        })?;
        gt_variants.push(GtVariant {
            n_alleles: record.n_alleles(),
            genotypes,
        });
    }

    let enc = encode_genotypes(
        &gt_variants,
        n_samples,
        config.permute_genotypes,
        config.declared_ploidy,
    )?;

    // Support column: 10 fixed bytes per variant.
    let support = &mut meta[MetaColumn::GtSupport as usize];
    for v in &enc.variants {
        let mut entry = ByteBuffer::with_capacity(10);
        entry.put(v.method as u8);
        entry.put(v.width.code());
        entry.put(v.ploidy);
        let mut flags = 0u8;
        if v.any_missing {
            flags |= 1;
        }
        if v.mixed_phase {
            flags |= 1 << 1;
        }
        if v.phase {
            flags |= 1 << 2;
        }
        if v.mixed_ploidy {
            flags |= 1 << 3;
        }
        entry.put(flags);
        entry.put(v.n_alleles);
        entry.put(v.n_words);
        support.append_chars(entry.as_slice())?;
        support.add_stride(10)?;
    }

    if let Some(ppa) = &enc.ppa {
        meta[MetaColumn::GtPermutation as usize].append_slice(ppa.ordering())?;
    }
    meta[MetaColumn::GtRle8 as usize].append_slice(&enc.streams.rle8)?;
    meta[MetaColumn::GtRle16 as usize].append_slice(&enc.streams.rle16)?;
    meta[MetaColumn::GtRle32 as usize].append_slice(&enc.streams.rle32)?;
    meta[MetaColumn::GtRle64 as usize].append_slice(&enc.streams.rle64)?;
    meta[MetaColumn::GtSimple8 as usize].append_slice(&enc.streams.simple8)?;
    meta[MetaColumn::GtSimple16 as usize].append_slice(&enc.streams.simple16)?;
    meta[MetaColumn::GtSimple32 as usize].append_slice(&enc.streams.simple32)?;
    meta[MetaColumn::GtSimple64 as usize].append_slice(&enc.streams.simple64)?;

    Ok(Some(GtColumns {
        encodings: enc.variants,
        has_permutation: enc.ppa.is_some(),
    }))
}

fn append_meta(
    record: &VariantRecord,
    index: usize,
    min_position: u64,
    gt: Option<&GtColumns>,
    meta: &mut [DataContainer; MetaColumn::ALL.len()],
) -> Result<()> {
    meta[MetaColumn::Contig as usize].append(record.contig)?;
    meta[MetaColumn::Position as usize].append((record.position - min_position) as u32)?;
    meta[MetaColumn::Quality as usize].append(record.quality)?;

    let names = &mut meta[MetaColumn::Names as usize];
    names.append_chars(record.name.as_bytes())?;
    names.add_stride(record.name.len() as u32)?;

    // Ref/alt routing: a biallelic pair of table alleles packs into one
    // byte, everything else goes to the string column.
    let packed = pack_refalt(record);
    match packed {
        Some(byte) => meta[MetaColumn::RefAltPacked as usize].append(byte)?,
        None => {
            let mut entry = ByteBuffer::new();
            for allele in &record.alleles {
                entry.put_str(allele);
            }
            let alleles = &mut meta[MetaColumn::RefAltStrings as usize];
            alleles.append_chars(entry.as_slice())?;
            alleles.add_stride(entry.len() as u32)?;
        }
    }

    let mut ctrl = RecordController::new();
    let all_snv = !record.alleles.is_empty()
        && record.alleles.iter().all(|a| magic::is_snv_allele(a));
    let biallelic = record.alleles.len() == 2;
    ctrl.set(RecordController::BIALLELIC, biallelic);
    ctrl.set(RecordController::ALL_SNV, all_snv);
    ctrl.set(RecordController::SIMPLE_SNV, biallelic && all_snv);
    ctrl.set(RecordController::ALLELES_PACKED, packed.is_some());
    if let Some(gt) = gt {
        let enc = &gt.encodings[index];
        ctrl.set(RecordController::GT_AVAILABLE, true);
        ctrl.set(RecordController::ANY_MISSING, enc.any_missing);
        ctrl.set(RecordController::MIXED_PHASE, enc.mixed_phase);
        ctrl.set(RecordController::UNIFORM_PHASE, !enc.mixed_phase);
        ctrl.set(
            RecordController::GT_METHOD_SIMPLE,
            enc.method == GtMethod::NallelicSimple,
        );
        ctrl.set_width_code(enc.width.code());
        ctrl.set(RecordController::MIXED_PLOIDY, enc.mixed_ploidy);
        ctrl.set(RecordController::DIPLOID, enc.ploidy == 2);
    }
    meta[MetaColumn::Controller as usize].append(ctrl.bits())?;
    Ok(())
}

fn pack_refalt(record: &VariantRecord) -> Option<u8> {
    if record.alleles.len() != 2 {
        return None;
    }
    let r = magic::packed_allele_code(&record.alleles[0])?;
    let a = magic::packed_allele_code(&record.alleles[1])?;
    Some(r | (a << 4))
}

fn append_patterns(
    record: &VariantRecord,
    meta: &mut [DataContainer; MetaColumn::ALL.len()],
    info_patterns: &mut PatternDictionary,
    format_patterns: &mut PatternDictionary,
    filter_patterns: &mut PatternDictionary,
) -> Result<()> {
    let info_ids: Vec<u32> = record.info.iter().map(|f| f.key).collect();
    let format_ids: Vec<u32> = record.format.iter().map(|f| f.key).collect();

    let info_id = info_patterns.intern(&info_ids)?;
    let format_id = format_patterns.intern(&format_ids)?;
    let filter_id = filter_patterns.intern(&record.filters)?;

    meta[MetaColumn::InfoPatterns as usize].append(info_id)?;
    meta[MetaColumn::FormatPatterns as usize].append(format_id)?;
    meta[MetaColumn::FilterPatterns as usize].append(filter_id)?;
    Ok(())
}

fn append_annotations(
    record: &VariantRecord,
    archive_header: &ArchiveHeader,
    info_columns: &mut BTreeMap<u32, DataContainer>,
    format_columns: &mut BTreeMap<u32, DataContainer>,
) -> Result<()> {
    for field in &record.info {
        let descriptor = archive_header.info_field(field.key).ok_or_else(|| {
            Error::schema(format!("INFO key {} not in the archive header", field.key))
        })?;
        let container = info_columns
            .entry(field.key)
            .or_insert_with(|| DataContainer::new(field.key as i32));
        append_value(container, &field.value, descriptor.ty)?;
    }

    let n_samples = archive_header.n_samples();
    for field in &record.format {
        let descriptor = archive_header.format_field(field.key).ok_or_else(|| {
            Error::schema(format!("FORMAT key {} not in the archive header", field.key))
        })?;
        if field.values.len() != n_samples {
            return Err(Error::schema(format!(
                "FORMAT {} carries {} values for {} samples",
                descriptor.name,
                field.values.len(),
                n_samples
            )));
        }
        let container = format_columns
            .entry(field.key)
            .or_insert_with(|| DataContainer::new(field.key as i32));
        append_format_entry(container, &field.values, descriptor.ty)?;
    }
    Ok(())
}

fn append_value(
    container: &mut DataContainer,
    value: &FieldValue,
    declared: FieldType,
) -> Result<()> {
    match (value, declared) {
        (FieldValue::Flag, FieldType::Flag) => {
            container.append_bool(true)?;
            container.add_stride(1)
        }
        (FieldValue::Int(vals), FieldType::Integer) => {
            for &v in vals {
                container.append(v)?;
            }
            container.add_stride(vals.len() as u32)
        }
        (FieldValue::Float(vals), FieldType::Float) => {
            for &v in vals {
                container.append(v)?;
            }
            container.add_stride(vals.len() as u32)
        }
        (FieldValue::Str(s), FieldType::String) => {
            container.append_chars(s.as_bytes())?;
            container.add_stride(s.len() as u32)
        }
        (value, declared) => Err(Error::schema(format!(
            "{value:?} under a field declared {declared:?}"
        ))),
    }
}

fn append_format_entry(
    container: &mut DataContainer,
    values: &[FieldValue],
    declared: FieldType,
) -> Result<()> {
    let arity = match &values[0] {
        FieldValue::Int(v) => v.len(),
        FieldValue::Float(v) => v.len(),
        FieldValue::Str(_) => 0,
        FieldValue::Flag => {
            return Err(Error::schema("Flag values are not valid under FORMAT"))
        }
    };

    let mut total = 0u32;
    for value in values {
        match (value, declared) {
            (FieldValue::Int(vals), FieldType::Integer) if vals.len() == arity => {
                for &v in vals {
                    container.append(v)?;
                }
                total += vals.len() as u32;
            }
            (FieldValue::Float(vals), FieldType::Float) if vals.len() == arity => {
                for &v in vals {
                    container.append(v)?;
                }
                total += vals.len() as u32;
            }
            (FieldValue::Str(s), FieldType::String) => {
                let mut entry = ByteBuffer::new();
                entry.put_str(s);
                container.append_chars(entry.as_slice())?;
                total += entry.len() as u32;
            }
            (FieldValue::Int(_), FieldType::Integer)
            | (FieldValue::Float(_), FieldType::Float) => {
                return Err(Error::schema(
                    "per-sample value arity varies within one record",
                ))
            }
            (value, declared) => {
                return Err(Error::schema(format!(
                    "{value:?} under a FORMAT field declared {declared:?}"
                )))
            }
        }
    }
    container.add_stride(total)
}

fn write_footer_record(
    footer: &BlockFooter,
    config: &WriterConfig,
    buf: &mut ByteBuffer,
) -> Result<()> {
    let mut raw = ByteBuffer::new();
    footer.write(&mut raw);
    let mut packed = Vec::new();
    codec(config.codec).compress(raw.as_slice(), &mut packed, config.compression_level)?;
    let (codec_id, payload) = if packed.len() >= raw.len() {
        (CodecId::Stored, raw.as_slice().to_vec())
    } else {
        (config.codec, packed)
    };
    buf.put(raw.len() as u32);
    buf.put(payload.len() as u32);
    buf.put(codec_id as u8);
    buf.put_bytes(&md5(&payload));
    buf.put_bytes(&payload);
    Ok(())
}

/// Parse the footer record written by [`write_footer_record`].
pub(crate) fn read_footer_record(cur: &mut ByteCursor<'_>) -> Result<BlockFooter> {
    let u_len = cur.get::<u32>()? as usize;
    let c_len = cur.get::<u32>()? as usize;
    let codec_id = CodecId::from_u8(cur.get::<u8>()?)?;
    let mut stored_md5 = [0u8; 16];
    stored_md5.copy_from_slice(cur.get_bytes(16)?);
    let payload = cur.get_bytes(c_len)?;
    if md5(payload) != stored_md5 {
        return Err(Error::checksum("block footer MD5"));
    }
    let mut raw = Vec::new();
    codec(codec_id).decompress(payload, &mut raw, u_len)?;
    read_footer_from(&raw)
}

fn read_footer_from(raw: &[u8]) -> Result<BlockFooter> {
    BlockFooter::read(&mut ByteCursor::new(raw))
}
