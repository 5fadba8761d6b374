//! Read-side view of one block: parse the footer, materialize only the
//! columns a consumer asks for, and reassemble records on demand.

use strata_base::{BlockController, ByteCursor, Error, RecordController, Result};
use strata_codec::Keychain;
use strata_gt::{
    decode_variant, expand_runs, Genotype, GtMethod, GtVariantEncoding, GtWidth, PermutationArray,
};

use crate::block::{
    read_footer_record, BlockFooter, BlockHeader, ColumnLocation, MetaColumn, COLUMN_FORMAT_BASE,
    COLUMN_INFO_BASE,
};
use crate::config::ReaderConfig;
use crate::container::DataContainer;
use crate::header::{ArchiveHeader, FieldType};
use crate::magic::{self, BLOCK_EOF};
use crate::record::{FieldValue, FormatField, InfoField, VariantRecord};

/// Which parts of a record to materialize when decoding a block.
#[derive(Clone, Debug)]
pub struct ColumnMask {
    pub names: bool,
    pub quality: bool,
    pub alleles: bool,
    pub genotypes: bool,
    /// INFO keys to load; `None` loads everything in the block.
    pub info: Option<Vec<u32>>,
    /// FORMAT keys to load; `None` loads everything in the block.
    pub format: Option<Vec<u32>>,
}

impl Default for ColumnMask {
    fn default() -> Self {
        ColumnMask {
            names: true,
            quality: true,
            alleles: true,
            genotypes: true,
            info: None,
            format: None,
        }
    }
}

impl ColumnMask {
    pub fn wants_info(&self, key: u32) -> bool {
        match &self.info {
            None => true,
            Some(keys) => keys.contains(&key),
        }
    }

    pub fn wants_format(&self, key: u32) -> bool {
        match &self.format {
            None => true,
            Some(keys) => keys.contains(&key),
        }
    }
}

/// One block fetched from the archive, footer parsed, columns untouched
/// until asked for.
pub struct LoadedBlock {
    pub header: BlockHeader,
    pub footer: BlockFooter,
    raw: Vec<u8>,
}

impl LoadedBlock {
    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        if raw.len() < BlockHeader::SERIALIZED_LEN + 8 {
            return Err(Error::truncated("block shorter than header and sentinel"));
        }
        let sentinel = u64::from_le_bytes(
            raw[raw.len() - 8..]
                .try_into()
                .map_err(|_| Error::truncated("block sentinel missing"))?,
        );
        if sentinel != BLOCK_EOF {
            return Err(Error::truncated("end-of-block sentinel missing"));
        }

        let mut cur = ByteCursor::new(&raw);
        let header = BlockHeader::read(&mut cur)?;
        if header.footer_offset as usize >= raw.len() {
            return Err(Error::truncated("block footer offset out of range"));
        }
        cur.seek_to(header.footer_offset as usize)?;
        let footer = read_footer_record(&mut cur)?;
        Ok(LoadedBlock {
            header,
            footer,
            raw,
        })
    }

    fn load_at(
        &self,
        loc: ColumnLocation,
        column_id: u32,
        keychain: Option<&Keychain>,
    ) -> Result<DataContainer> {
        let mut cur = ByteCursor::new(&self.raw);
        cur.seek_to(loc.offset as usize)?;
        let mut container = DataContainer::read(&mut cur)?;
        if container.header().encrypted() {
            let keychain = keychain
                .ok_or_else(|| Error::auth("block is encrypted and no keychain was supplied"))?;
            container.decrypt(self.header.block_id, column_id, keychain)?;
        }
        container.decompress()?;
        Ok(container)
    }

    pub fn meta_column(
        &self,
        column: MetaColumn,
        keychain: Option<&Keychain>,
    ) -> Result<DataContainer> {
        let loc = self.footer.meta[column as usize];
        self.load_at(loc, column as u32, keychain)
    }

    pub fn info_column(
        &self,
        key: u32,
        keychain: Option<&Keychain>,
    ) -> Result<Option<DataContainer>> {
        match self.footer.info.iter().find(|loc| loc.key == key) {
            Some(&loc) => Ok(Some(self.load_at(loc, COLUMN_INFO_BASE | key, keychain)?)),
            None => Ok(None),
        }
    }

    pub fn format_column(
        &self,
        key: u32,
        keychain: Option<&Keychain>,
    ) -> Result<Option<DataContainer>> {
        match self.footer.format.iter().find(|loc| loc.key == key) {
            Some(&loc) => Ok(Some(self.load_at(loc, COLUMN_FORMAT_BASE | key, keychain)?)),
            None => Ok(None),
        }
    }

    /// Reassemble the block's records, honoring the column mask.
    pub fn records(
        &self,
        archive_header: &ArchiveHeader,
        config: &ReaderConfig,
        mask: &ColumnMask,
        keychain: Option<&Keychain>,
    ) -> Result<Vec<VariantRecord>> {
        let n = self.header.n_variants as usize;

        let contigs = self.meta_column(MetaColumn::Contig, keychain)?.read_integers()?;
        let positions = self
            .meta_column(MetaColumn::Position, keychain)?
            .read_integers()?;
        let controllers: Vec<RecordController> = self
            .meta_column(MetaColumn::Controller, keychain)?
            .read_integers()?
            .into_iter()
            .map(|v| RecordController::from_bits(v as u16))
            .collect();
        if contigs.len() != n || positions.len() != n || controllers.len() != n {
            return Err(Error::truncated("meta column entry count mismatch"));
        }

        let qualities = if mask.quality {
            self.meta_column(MetaColumn::Quality, keychain)?.read_floats()?
        } else {
            vec![0.0; n]
        };

        let names = if mask.names {
            let col = self.meta_column(MetaColumn::Names, keychain)?;
            split_strings(&col.read_bytes()?, &col.entry_strides()?)?
        } else {
            vec![String::new(); n]
        };

        let alleles = if mask.alleles {
            Some(self.decode_alleles(&controllers, keychain)?)
        } else {
            None
        };

        let filter_ids = self
            .meta_column(MetaColumn::FilterPatterns, keychain)?
            .read_integers()?;
        let info_ids = self
            .meta_column(MetaColumn::InfoPatterns, keychain)?
            .read_integers()?;
        let format_ids = self
            .meta_column(MetaColumn::FormatPatterns, keychain)?
            .read_integers()?;

        let mut info_streams = self.decode_info_streams(archive_header, mask, keychain)?;
        let mut format_streams = self.decode_format_streams(archive_header, mask, keychain)?;

        let genotypes = if mask.genotypes
            && self.header.controller.test(BlockController::HAS_GT)
        {
            Some(self.decode_genotypes(archive_header, config, keychain)?)
        } else {
            None
        };

        let mut records = Vec::with_capacity(n);
        for i in 0..n {
            let filters = self
                .footer
                .filter_patterns
                .get(filter_ids[i] as u16)
                .ok_or_else(|| Error::truncated("filter pattern id out of range"))?
                .to_vec();

            let mut info = Vec::new();
            let info_pattern = self
                .footer
                .info_patterns
                .get(info_ids[i] as u16)
                .ok_or_else(|| Error::truncated("info pattern id out of range"))?;
            for &key in info_pattern {
                if let Some(stream) = info_streams.get_mut(&key) {
                    let value = stream.next_value()?;
                    if mask.wants_info(key) {
                        info.push(InfoField { key, value });
                    }
                }
            }

            let mut format = Vec::new();
            let format_pattern = self
                .footer
                .format_patterns
                .get(format_ids[i] as u16)
                .ok_or_else(|| Error::truncated("format pattern id out of range"))?;
            for &key in format_pattern {
                if let Some(stream) = format_streams.get_mut(&key) {
                    let values = stream.next_values()?;
                    if mask.wants_format(key) {
                        format.push(FormatField { key, values });
                    }
                }
            }

            records.push(VariantRecord {
                contig: contigs[i] as i32,
                position: self.header.min_position + positions[i] as u64,
                quality: qualities[i],
                name: names[i].clone(),
                alleles: alleles
                    .as_ref()
                    .map(|a| a[i].clone())
                    .unwrap_or_default(),
                filters,
                info,
                format,
                genotypes: genotypes.as_ref().map(|g| g[i].clone()),
            });
        }
        Ok(records)
    }

    fn decode_alleles(
        &self,
        controllers: &[RecordController],
        keychain: Option<&Keychain>,
    ) -> Result<Vec<Vec<String>>> {
        let packed = self
            .meta_column(MetaColumn::RefAltPacked, keychain)?
            .read_bytes()?;
        let strings_col = self.meta_column(MetaColumn::RefAltStrings, keychain)?;
        let string_bytes = strings_col.read_bytes()?;
        let string_strides = strings_col.entry_strides()?;

        let mut out = Vec::with_capacity(controllers.len());
        let mut packed_next = 0usize;
        let mut string_entry = 0usize;
        let mut string_off = 0usize;
        for ctrl in controllers {
            if ctrl.test(RecordController::ALLELES_PACKED) {
                let byte = *packed
                    .get(packed_next)
                    .ok_or_else(|| Error::truncated("packed ref/alt column exhausted"))?;
                packed_next += 1;
                let r = magic::packed_allele_str(byte & 0x0f)
                    .ok_or_else(|| Error::truncated("bad packed ref allele code"))?;
                let a = magic::packed_allele_str(byte >> 4)
                    .ok_or_else(|| Error::truncated("bad packed alt allele code"))?;
                out.push(vec![r.to_owned(), a.to_owned()]);
            } else {
                let stride = *string_strides
                    .get(string_entry)
                    .ok_or_else(|| Error::truncated("allele string column exhausted"))?
                    as usize;
                string_entry += 1;
                let end = string_off + stride;
                if end > string_bytes.len() {
                    return Err(Error::truncated("allele string entry out of range"));
                }
                let mut cur = ByteCursor::new(&string_bytes[string_off..end]);
                string_off = end;
                let mut alleles = Vec::new();
                while !cur.at_end() {
                    alleles.push(cur.get_string()?);
                }
                out.push(alleles);
            }
        }
        Ok(out)
    }

    fn decode_info_streams(
        &self,
        archive_header: &ArchiveHeader,
        mask: &ColumnMask,
        keychain: Option<&Keychain>,
    ) -> Result<std::collections::BTreeMap<u32, ValueStream>> {
        let mut streams = std::collections::BTreeMap::new();
        for loc in &self.footer.info {
            // Each key has its own container, so unselected keys are
            // never materialized at all.
            if !mask.wants_info(loc.key) {
                continue;
            }
            let descriptor = archive_header.info_field(loc.key).ok_or_else(|| {
                Error::version(format!("INFO key {} not in the archive header", loc.key))
            })?;
            let container = self.load_at(*loc, COLUMN_INFO_BASE | loc.key, keychain)?;
            streams.insert(loc.key, ValueStream::from_info(&container, descriptor.ty)?);
        }
        Ok(streams)
    }

    fn decode_format_streams(
        &self,
        archive_header: &ArchiveHeader,
        mask: &ColumnMask,
        keychain: Option<&Keychain>,
    ) -> Result<std::collections::BTreeMap<u32, SampleValueStream>> {
        let n_samples = archive_header.n_samples();
        let mut streams = std::collections::BTreeMap::new();
        for loc in &self.footer.format {
            if !mask.wants_format(loc.key) {
                continue;
            }
            let descriptor = archive_header.format_field(loc.key).ok_or_else(|| {
                Error::version(format!("FORMAT key {} not in the archive header", loc.key))
            })?;
            let container = self.load_at(*loc, COLUMN_FORMAT_BASE | loc.key, keychain)?;
            streams.insert(
                loc.key,
                SampleValueStream::from_format(&container, descriptor.ty, n_samples)?,
            );
        }
        Ok(streams)
    }

    fn decode_genotypes(
        &self,
        archive_header: &ArchiveHeader,
        config: &ReaderConfig,
        keychain: Option<&Keychain>,
    ) -> Result<Vec<Vec<Genotype>>> {
        let n_samples = archive_header.n_samples();
        let support_col = self.meta_column(MetaColumn::GtSupport, keychain)?;
        let support_bytes = support_col.read_bytes()?;
        let encodings = parse_support_entries(&support_bytes, self.header.n_variants as usize)?;

        let ppa = if self
            .header
            .controller
            .test(BlockController::HAS_PERMUTATION)
        {
            let ordering = self
                .meta_column(MetaColumn::GtPermutation, keychain)?
                .read_words()?
                .into_iter()
                .map(|v| v as u32)
                .collect();
            Some(PermutationArray::from_ordering(ordering)?)
        } else {
            None
        };

        let mut streams: [Option<Vec<u64>>; 8] = Default::default();
        let mut offsets = [0usize; 8];
        let mut out = Vec::with_capacity(encodings.len());
        for enc in &encodings {
            let slot = stream_slot(enc.method, enc.width);
            if streams[slot].is_none() {
                let column = stream_column(enc.method, enc.width);
                streams[slot] = Some(self.meta_column(column, keychain)?.read_words()?);
            }
            let stream = streams[slot]
                .as_deref()
                .ok_or_else(|| Error::truncated("genotype stream missing"))?;
            let start = offsets[slot];
            let end = start + enc.n_words as usize;
            let words = stream
                .get(start..end)
                .ok_or_else(|| Error::truncated("genotype stream exhausted"))?;
            offsets[slot] += enc.n_words as usize;
            let runs = decode_variant(enc, words)?;
            out.push(expand_runs(
                &runs,
                n_samples,
                ppa.as_ref(),
                config.restore_sample_order,
            )?);
        }
        Ok(out)
    }
}

fn stream_slot(method: GtMethod, width: GtWidth) -> usize {
    let base = match method {
        GtMethod::BiallelicRle => 0,
        GtMethod::NallelicSimple => 4,
    };
    base + width.code() as usize
}

fn stream_column(method: GtMethod, width: GtWidth) -> MetaColumn {
    match (method, width) {
        (GtMethod::BiallelicRle, GtWidth::W8) => MetaColumn::GtRle8,
        (GtMethod::BiallelicRle, GtWidth::W16) => MetaColumn::GtRle16,
        (GtMethod::BiallelicRle, GtWidth::W32) => MetaColumn::GtRle32,
        (GtMethod::BiallelicRle, GtWidth::W64) => MetaColumn::GtRle64,
        (GtMethod::NallelicSimple, GtWidth::W8) => MetaColumn::GtSimple8,
        (GtMethod::NallelicSimple, GtWidth::W16) => MetaColumn::GtSimple16,
        (GtMethod::NallelicSimple, GtWidth::W32) => MetaColumn::GtSimple32,
        (GtMethod::NallelicSimple, GtWidth::W64) => MetaColumn::GtSimple64,
    }
}

fn parse_support_entries(bytes: &[u8], n_variants: usize) -> Result<Vec<GtVariantEncoding>> {
    let mut cur = ByteCursor::new(bytes);
    let mut out = Vec::with_capacity(n_variants);
    for _ in 0..n_variants {
        let method = GtMethod::from_u8(cur.get::<u8>()?)?;
        let width = GtWidth::from_code(cur.get::<u8>()?)?;
        let ploidy = cur.get::<u8>()?;
        let flags = cur.get::<u8>()?;
        let n_alleles = cur.get::<u16>()?;
        let n_words = cur.get::<u32>()?;
        out.push(GtVariantEncoding {
            method,
            width,
            ploidy,
            n_alleles,
            any_missing: flags & 1 != 0,
            mixed_phase: flags & (1 << 1) != 0,
            phase: flags & (1 << 2) != 0,
            mixed_ploidy: flags & (1 << 3) != 0,
            n_words,
        });
    }
    if !cur.at_end() {
        return Err(Error::truncated("trailing bytes in the gt support column"));
    }
    Ok(out)
}

fn split_strings(bytes: &[u8], strides: &[u32]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(strides.len());
    let mut off = 0usize;
    for &stride in strides {
        let end = off + stride as usize;
        if end > bytes.len() {
            return Err(Error::truncated("string entry out of range"));
        }
        out.push(
            String::from_utf8(bytes[off..end].to_vec())
                .map_err(|_| Error::schema("string column is not valid utf-8"))?,
        );
        off = end;
    }
    Ok(out)
}

/// Sequential per-record-entry values of one INFO column.
struct ValueStream {
    values: Vec<FieldValue>,
    next: usize,
}

impl ValueStream {
    fn from_info(container: &DataContainer, ty: FieldType) -> Result<Self> {
        let strides = container.entry_strides()?;
        let values = match ty {
            FieldType::Flag => strides.iter().map(|_| FieldValue::Flag).collect(),
            FieldType::Integer => {
                let vals = container.read_integers()?;
                split_by_strides(vals, &strides)?
                    .into_iter()
                    .map(FieldValue::Int)
                    .collect()
            }
            FieldType::Float => {
                let vals = container.read_floats()?;
                split_by_strides(vals, &strides)?
                    .into_iter()
                    .map(FieldValue::Float)
                    .collect()
            }
            FieldType::String => split_strings(&container.read_bytes()?, &strides)?
                .into_iter()
                .map(FieldValue::Str)
                .collect(),
        };
        Ok(ValueStream { values, next: 0 })
    }

    fn next_value(&mut self) -> Result<FieldValue> {
        let value = self
            .values
            .get(self.next)
            .cloned()
            .ok_or_else(|| Error::truncated("info value stream exhausted"))?;
        self.next += 1;
        Ok(value)
    }
}

/// Sequential per-record-entry sample vectors of one FORMAT column.
struct SampleValueStream {
    entries: Vec<Vec<FieldValue>>,
    next: usize,
}

impl SampleValueStream {
    fn from_format(container: &DataContainer, ty: FieldType, n_samples: usize) -> Result<Self> {
        let strides = container.entry_strides()?;
        let entries = match ty {
            FieldType::Flag => {
                return Err(Error::schema("Flag values are not valid under FORMAT"))
            }
            FieldType::Integer => {
                let grouped = split_by_strides(container.read_integers()?, &strides)?;
                grouped
                    .into_iter()
                    .map(|entry| split_samples(entry, n_samples).map(|per| {
                        per.into_iter().map(FieldValue::Int).collect()
                    }))
                    .collect::<Result<Vec<_>>>()?
            }
            FieldType::Float => {
                let grouped = split_by_strides(container.read_floats()?, &strides)?;
                grouped
                    .into_iter()
                    .map(|entry| split_samples(entry, n_samples).map(|per| {
                        per.into_iter().map(FieldValue::Float).collect()
                    }))
                    .collect::<Result<Vec<_>>>()?
            }
            FieldType::String => {
                let bytes = container.read_bytes()?;
                let mut entries = Vec::with_capacity(strides.len());
                let mut off = 0usize;
                for &stride in &strides {
                    let end = off + stride as usize;
                    if end > bytes.len() {
                        return Err(Error::truncated("format string entry out of range"));
                    }
                    let mut cur = ByteCursor::new(&bytes[off..end]);
                    off = end;
                    let mut per_sample = Vec::with_capacity(n_samples);
                    for _ in 0..n_samples {
                        per_sample.push(FieldValue::Str(cur.get_string()?));
                    }
                    entries.push(per_sample);
                }
                entries
            }
        };
        Ok(SampleValueStream { entries, next: 0 })
    }

    fn next_values(&mut self) -> Result<Vec<FieldValue>> {
        let values = self
            .entries
            .get(self.next)
            .cloned()
            .ok_or_else(|| Error::truncated("format value stream exhausted"))?;
        self.next += 1;
        Ok(values)
    }
}

fn split_by_strides<T>(vals: Vec<T>, strides: &[u32]) -> Result<Vec<Vec<T>>> {
    let mut out = Vec::with_capacity(strides.len());
    let mut iter = vals.into_iter();
    for &stride in strides {
        let mut entry = Vec::with_capacity(stride as usize);
        for _ in 0..stride {
            entry.push(
                iter.next()
                    .ok_or_else(|| Error::truncated("column entry count mismatch"))?,
            );
        }
        out.push(entry);
    }
    if iter.next().is_some() {
        return Err(Error::truncated("trailing values in column"));
    }
    Ok(out)
}

fn split_samples<T>(entry: Vec<T>, n_samples: usize) -> Result<Vec<Vec<T>>> {
    if n_samples == 0 || entry.len() % n_samples != 0 {
        return Err(Error::truncated(format!(
            "format entry of {} values does not divide into {} samples",
            entry.len(),
            n_samples
        )));
    }
    let per = entry.len() / n_samples;
    let mut iter = entry.into_iter();
    let mut out = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let mut vals = Vec::with_capacity(per);
        for _ in 0..per {
            if let Some(v) = iter.next() {
                vals.push(v);
            }
        }
        out.push(vals);
    }
    Ok(out)
}
