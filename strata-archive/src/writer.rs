//! The write pipeline: accumulate records into blocks, encode sealed
//! blocks on a worker pool, and drain them to the sink strictly in block
//! order while the index, digest manager and statistics keep up.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use strata_base::{ByteBuffer, Error, FileController, Result};
use strata_codec::{DigestManager, FieldKind, Keychain};
use strata_gt::{classify, is_invariant, GtVariant};

use crate::block::{encode_block, BlockBuilder, EncodedBlock, MetaColumn};
use crate::config::WriterConfig;
use crate::footer::ArchiveFooter;
use crate::header::ArchiveHeader;
use crate::index::{IndexEntry, VariantIndex};
use crate::ioutil::Sink;
use crate::magic::FILE_MAGIC;
use crate::record::VariantRecord;
use crate::stats::CompressionStats;

/// What `close()` hands back besides the finished sink: the sidecar
/// artifacts and the session totals.
pub struct ArchiveSummary {
    pub n_blocks: u64,
    pub n_variants: u64,
    pub keychain: Arc<Keychain>,
    pub stats: CompressionStats,
}

/// Stores out-of-order encoded blocks until the writer can drain them in
/// block-id sequence.
struct ReorderRegister {
    expected: u64,
    pending: BTreeMap<u64, EncodedBlock>,
}

impl ReorderRegister {
    fn new() -> Self {
        ReorderRegister {
            expected: 0,
            pending: BTreeMap::new(),
        }
    }

    fn insert(&mut self, block: EncodedBlock) {
        self.pending.insert(block.block_id, block);
    }

    fn drain_in_order(&mut self, mut sink: impl FnMut(EncodedBlock) -> Result<()>) -> Result<()> {
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() != self.expected {
                break;
            }
            let block = entry.remove();
            sink(block)?;
            self.expected += 1;
        }
        Ok(())
    }
}

pub struct VariantWriter<W: Sink> {
    sink: W,
    config: WriterConfig,
    header: Option<ArchiveHeader>,
    builder: BlockBuilder,
    sealed: Vec<BlockBuilder>,
    register: ReorderRegister,
    index: VariantIndex,
    digests: DigestManager,
    keychain: Arc<Keychain>,
    stats: CompressionStats,
    next_block_id: u64,
    n_variants_written: u64,
    last_contig: i32,
    last_position: u64,
    pool: rayon::ThreadPool,
}

impl<W: Sink> VariantWriter<W> {
    pub fn open(sink: W, config: WriterConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads.max(1))
            .build()
            .map_err(|e| Error::schema(format!("thread pool: {e}")))?;
        Ok(VariantWriter {
            sink,
            config,
            header: None,
            builder: BlockBuilder::new(),
            sealed: Vec::new(),
            register: ReorderRegister::new(),
            index: VariantIndex::new(),
            digests: DigestManager::new(MetaColumn::ALL.len()),
            keychain: Arc::new(Keychain::new()),
            stats: CompressionStats::new(),
            next_block_id: 0,
            n_variants_written: 0,
            last_contig: -1,
            last_position: 0,
            pool,
        })
    }

    /// Writes the file magic and the compressed archive header. Must be
    /// called exactly once, before any record.
    pub fn set_header(&mut self, mut header: ArchiveHeader) -> Result<()> {
        if self.header.is_some() {
            return Err(Error::schema("archive header set twice"));
        }
        header.stamp_import(&format!(
            "checkpoint_variants={};checkpoint_bases={};level={};permute={};encrypt={}",
            self.config.checkpoint_variants,
            self.config.checkpoint_bases,
            self.config.compression_level,
            self.config.permute_genotypes,
            self.config.encrypt,
        ));
        self.sink.write_all(&FILE_MAGIC)?;
        header.write_to(&mut self.sink, self.config.compression_level)?;
        self.index = VariantIndex::setup(&header.contigs);
        self.header = Some(header);
        Ok(())
    }

    pub fn header(&self) -> Option<&ArchiveHeader> {
        self.header.as_ref()
    }

    /// Append one record, flushing the current block first when a
    /// checkpoint trips. Per-record logical errors reject the record but
    /// leave the writer usable.
    pub fn push(&mut self, record: VariantRecord) -> Result<()> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| Error::schema("record pushed before the archive header"))?;

        let contig = header.contig(record.contig).ok_or_else(|| {
            Error::contig_range(format!("contig {} not declared", record.contig))
        })?;
        if record.position >= contig.length {
            return Err(Error::contig_range(format!(
                "position {} beyond {} ({} bp)",
                record.position, contig.name, contig.length
            )));
        }
        if record.alleles.len() > u16::MAX as usize {
            return Err(Error::schema(format!(
                "{} alleles at one site",
                record.alleles.len()
            )));
        }

        if let Some(genotypes) = &record.genotypes {
            let site = GtVariant {
                n_alleles: record.n_alleles(),
                genotypes: genotypes.clone(),
            };
            // Reject bad genotype data record-by-record; the block goes on.
            classify(&site, self.config.declared_ploidy)?;
            if self.config.drop_invariant_sites && is_invariant(&site) {
                debug!(target: "strata", position = record.position, "dropping invariant site");
                return Ok(());
            }
        }

        if record.contig == self.last_contig && record.position < self.last_position {
            return Err(Error::unsorted(format!(
                "position {} after {}",
                record.position, self.last_position
            )));
        }

        if !self.builder.is_empty() {
            if record.contig != self.builder.contig()
                || self.builder.len() as u32 >= self.config.checkpoint_variants
                || record.position - self.builder.min_position() > self.config.checkpoint_bases
            {
                self.seal()?;
            }
        }

        self.last_contig = record.contig;
        self.last_position = record.position;
        self.builder.push(record);
        Ok(())
    }

    fn seal(&mut self) -> Result<()> {
        if self.builder.is_empty() {
            return Ok(());
        }
        let builder = std::mem::take(&mut self.builder);
        self.sealed.push(builder);
        if self.sealed.len() >= self.config.threads.max(1) {
            self.flush_sealed()?;
        }
        Ok(())
    }

    /// Encode one batch of sealed blocks in parallel, then drain them to
    /// the sink in block-id order.
    fn flush_sealed(&mut self) -> Result<()> {
        if self.sealed.is_empty() {
            return Ok(());
        }
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| Error::schema("flush before the archive header"))?;

        let batch: Vec<(u64, BlockBuilder)> = self
            .sealed
            .drain(..)
            .map(|b| {
                let id = self.next_block_id;
                self.next_block_id += 1;
                (id, b)
            })
            .collect();

        let config = &self.config;
        let keychain = &self.keychain;
        let encoded: Vec<Result<EncodedBlock>> = self.pool.install(|| {
            batch
                .into_par_iter()
                .map(|(id, builder)| encode_block(builder, id, header, config, keychain))
                .collect()
        });

        for result in encoded {
            self.register.insert(result?);
        }

        let register = &mut self.register;
        let sink = &mut self.sink;
        let index = &mut self.index;
        let digests = &mut self.digests;
        let stats = &mut self.stats;
        let mut written = 0u64;
        register.drain_in_order(|block| {
            let byte_offset = sink.pos()?;
            sink.write_all(&block.bytes)?;
            let byte_offset_end = sink.pos()?;

            let mut entry = IndexEntry {
                block_id: block.block_id,
                contig: block.contig,
                n_variants: block.n_variants,
                byte_offset,
                byte_offset_end,
                min_position: block.min_position,
                max_position: block.max_position,
                ..IndexEntry::default()
            };
            for &(pos, end) in &block.record_spans {
                let bin = index.add_record(block.contig, pos, end, block.block_id as u32)?;
                entry.min_bin = entry.min_bin.min(bin as i32);
                entry.max_bin = entry.max_bin.max(bin as i32);
                entry.max_position = entry.max_position.max(end);
            }
            index.push_block(entry)?;

            for (kind, key, pair) in &block.digest_updates {
                match kind {
                    FieldKind::Meta => digests.update_meta(*key as usize, pair),
                    FieldKind::Info => digests.update_info(*key, pair),
                    FieldKind::Format => digests.update_format(*key, pair),
                }
            }
            stats.merge(&block.stats);
            written += block.n_variants as u64;

            info!(
                target: "strata",
                block = block.block_id,
                contig = block.contig,
                variants = block.n_variants,
                bytes = block.bytes.len(),
                "block written"
            );
            Ok(())
        })?;
        self.n_variants_written += written;
        Ok(())
    }

    /// Flush the tail block, then append the index, the aggregated digest
    /// table, and the footer.
    pub fn close(mut self) -> Result<(W, ArchiveSummary)> {
        self.seal()?;
        self.flush_sealed()?;

        let offset_end_of_data = self.sink.pos()?;

        let mut tail = ByteBuffer::new();
        self.index.write(&mut tail);
        let table = self.digests.finalize();
        table.write(&mut tail);
        self.sink.write_all(tail.as_slice())?;

        let mut controller = FileController::default();
        controller.set(FileController::ANY_ENCRYPTED, self.config.encrypt);
        controller.set(FileController::GT_PERMUTED, self.config.permute_genotypes);
        let footer = ArchiveFooter {
            offset_end_of_data,
            n_blocks: self.next_block_id,
            n_variants: self.n_variants_written,
            controller,
            eof_marker: crate::magic::FILE_EOF,
        };
        let mut buf = ByteBuffer::new();
        footer.write(&mut buf);
        self.sink.write_all(buf.as_slice())?;
        self.sink.flush()?;

        info!(
            target: "strata",
            blocks = self.next_block_id,
            variants = self.n_variants_written,
            "archive closed"
        );

        let summary = ArchiveSummary {
            n_blocks: self.next_block_id,
            n_variants: self.n_variants_written,
            keychain: self.keychain,
            stats: self.stats,
        };
        Ok((self.sink, summary))
    }

    /// Cooperative cancel: pending work is dropped, the current block is
    /// not flushed, and the sink is closed without a valid footer.
    /// Readers of such an archive report `TruncatedArchive`.
    pub fn abort(mut self) -> Result<W> {
        self.sealed.clear();
        self.builder = BlockBuilder::new();
        self.sink.flush()?;
        Ok(self.sink)
    }
}
