//! The read pipeline: open and validate an archive, load the index and
//! digest table, fetch and decode blocks, iterate records.

use std::io::SeekFrom;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use strata_base::{ByteCursor, Error, Result};
use strata_codec::{DigestTable, Keychain};

use crate::config::ReaderConfig;
use crate::footer::ArchiveFooter;
use crate::header::ArchiveHeader;
use crate::index::{IndexEntry, VariantIndex};
use crate::ioutil::Source;
use crate::lazy::{ColumnMask, LoadedBlock};
use crate::magic::{FILE_MAGIC, FOOTER_LENGTH};
use crate::record::VariantRecord;

#[derive(Debug)]
pub struct VariantReader<R: Source> {
    source: R,
    config: ReaderConfig,
    header: ArchiveHeader,
    footer: ArchiveFooter,
    index: VariantIndex,
    digest_table: DigestTable,
    keychain: Option<Arc<Keychain>>,
    mask: ColumnMask,
}

impl<R: Source> VariantReader<R> {
    /// Validate the magic, read the header, then jump to the tail for the
    /// footer, index, and aggregated digest table.
    pub fn open(mut source: R, config: ReaderConfig) -> Result<Self> {
        let mut magic = [0u8; 8];
        source.read_exact(&mut magic).map_err(|_| {
            Error::truncated("archive shorter than the file magic")
        })?;
        if magic != FILE_MAGIC {
            return Err(Error::version("unrecognized file magic"));
        }
        let header = ArchiveHeader::read_from(&mut source)?;

        let file_len = source.seek(SeekFrom::End(0))?;
        if file_len < FOOTER_LENGTH as u64 {
            return Err(Error::truncated("archive shorter than the footer"));
        }
        source.seek(SeekFrom::End(-(FOOTER_LENGTH as i64)))?;
        let mut footer_bytes = vec![0u8; FOOTER_LENGTH];
        source.read_exact(&mut footer_bytes)?;
        let footer = ArchiveFooter::read(&mut ByteCursor::new(&footer_bytes))?;
        footer.validate()?;

        // The region between end-of-data and the footer holds the index
        // and the digest table.
        if footer.offset_end_of_data > file_len - FOOTER_LENGTH as u64 {
            return Err(Error::truncated("end-of-data offset past the footer"));
        }
        let tail_len = file_len - FOOTER_LENGTH as u64 - footer.offset_end_of_data;
        source.seek(SeekFrom::Start(footer.offset_end_of_data))?;
        let mut tail = vec![0u8; tail_len as usize];
        source.read_exact(&mut tail)?;
        let mut cur = ByteCursor::new(&tail);
        let index = VariantIndex::read(&mut cur)?;
        let digest_table = DigestTable::read(&mut cur)?;

        if index.n_blocks() as u64 != footer.n_blocks {
            return Err(Error::truncated(format!(
                "index lists {} blocks, footer {}",
                index.n_blocks(),
                footer.n_blocks
            )));
        }

        Ok(VariantReader {
            source,
            config,
            header,
            footer,
            index,
            digest_table,
            keychain: None,
            mask: ColumnMask::default(),
        })
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    pub fn n_blocks(&self) -> u64 {
        self.footer.n_blocks
    }

    pub fn n_variants(&self) -> u64 {
        self.footer.n_variants
    }

    pub fn digest_table(&self) -> &DigestTable {
        &self.digest_table
    }

    pub fn set_keychain(&mut self, keychain: Keychain) {
        self.keychain = Some(Arc::new(keychain));
    }

    /// Column selection for subsequent block reads.
    pub fn set_column_mask(&mut self, mask: ColumnMask) {
        self.mask = mask;
    }

    /// Linear-index entries in block-id (write) order.
    pub fn block_entries(&self) -> Vec<IndexEntry> {
        self.index.linear_entries()
    }

    /// Blocks whose position span intersects the interval, in block-id
    /// order. Record-exact filtering is still the caller's step.
    pub fn query(&self, contig: &str, pos_min: u64, pos_max: u64) -> Result<Vec<IndexEntry>> {
        let contig_id = self
            .header
            .contig_id(contig)
            .ok_or_else(|| Error::contig_range(format!("unknown contig {contig}")))?;
        self.index.query(contig_id as i32, pos_min, pos_max)
    }

    /// Fetch one block's raw bytes and parse its footer.
    pub fn fetch_block(&mut self, entry: &IndexEntry) -> Result<LoadedBlock> {
        if entry.byte_offset_end <= entry.byte_offset {
            return Err(Error::truncated("index entry with an empty byte range"));
        }
        let len = (entry.byte_offset_end - entry.byte_offset) as usize;
        self.source.seek(SeekFrom::Start(entry.byte_offset))?;
        let mut raw = vec![0u8; len];
        self.source.read_exact(&mut raw).map_err(|_| {
            Error::truncated("block ends before its declared length")
        })?;
        LoadedBlock::parse(raw)
    }

    /// Decode one block's records with the current mask.
    pub fn block_records(&mut self, entry: &IndexEntry) -> Result<Vec<VariantRecord>> {
        let block = self.fetch_block(entry)?;
        block.records(
            &self.header,
            &self.config,
            &self.mask,
            self.keychain.as_deref(),
        )
    }

    /// Records of every block intersecting the interval, filtered to the
    /// exact positions.
    pub fn query_records(
        &mut self,
        contig: &str,
        pos_min: u64,
        pos_max: u64,
    ) -> Result<Vec<VariantRecord>> {
        let entries = self.query(contig, pos_min, pos_max)?;
        let contig_id = self.header.contig_id(contig).map(|c| c as i32);
        let mut out = Vec::new();
        for entry in entries {
            let records = self.block_records(&entry)?;
            out.extend(records.into_iter().filter(|r| {
                Some(r.contig) == contig_id && r.position >= pos_min && r.position <= pos_max
            }));
        }
        Ok(out)
    }

    /// Iterate all records in linear-index order. With
    /// `continue_on_block_error` set, a failing block is logged and
    /// skipped instead of ending the iteration.
    pub fn records(&mut self) -> RecordIter<'_, R> {
        let entries = self.block_entries();
        RecordIter {
            reader: self,
            entries,
            next_entry: 0,
            current: Vec::new(),
            current_next: 0,
            failed: false,
        }
    }

    /// Fetch every block, decode them on the worker pool, and return all
    /// records in write order. Block decode is the unit of parallelism.
    pub fn all_records_parallel(&mut self, threads: usize) -> Result<Vec<VariantRecord>> {
        let entries = self.block_entries();
        let mut blocks = Vec::with_capacity(entries.len());
        for entry in &entries {
            blocks.push(self.fetch_block(entry)?);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| Error::schema(format!("thread pool: {e}")))?;
        let header = &self.header;
        let config = &self.config;
        let mask = &self.mask;
        let keychain = self.keychain.as_deref();
        let decoded: Vec<Result<Vec<VariantRecord>>> = pool.install(|| {
            blocks
                .par_iter()
                .map(|block| block.records(header, config, mask, keychain))
                .collect()
        });
        let mut out = Vec::new();
        for records in decoded {
            out.extend(records?);
        }
        Ok(out)
    }
}

/// Forward record iterator over an archive, one block at a time.
pub struct RecordIter<'a, R: Source> {
    reader: &'a mut VariantReader<R>,
    entries: Vec<IndexEntry>,
    next_entry: usize,
    current: Vec<VariantRecord>,
    current_next: usize,
    failed: bool,
}

impl<R: Source> Iterator for RecordIter<'_, R> {
    type Item = Result<VariantRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }
            if self.current_next < self.current.len() {
                let record = self.current[self.current_next].clone();
                self.current_next += 1;
                return Some(Ok(record));
            }
            if self.next_entry >= self.entries.len() {
                return None;
            }
            let entry = self.entries[self.next_entry];
            self.next_entry += 1;
            match self.reader.block_records(&entry) {
                Ok(records) => {
                    self.current = records;
                    self.current_next = 0;
                }
                Err(err) if self.reader.config.continue_on_block_error => {
                    debug!(target: "strata", block = entry.block_id, "skipping failed block: {err}");
                    continue;
                }
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
