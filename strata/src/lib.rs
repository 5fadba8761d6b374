//! Public surface of the strata storage engine.
//!
//! The typical write path:
//!
//! ```no_run
//! use strata::{ArchiveHeader, FieldType, VariantWriter, WriterConfig};
//!
//! # fn main() -> strata::Result<()> {
//! let mut header = ArchiveHeader::new();
//! header.add_contig("chr1", 248_956_422);
//! header.add_sample("NA12878");
//! header.add_info("DP", FieldType::Integer);
//!
//! let sink = strata::ioutil::create_archive_file("cohort.str")?;
//! let mut writer = VariantWriter::open(sink, WriterConfig::default())?;
//! writer.set_header(header)?;
//! // for record in source { writer.push(record)?; }
//! let (_sink, summary) = writer.close()?;
//! eprintln!("{} variants in {} blocks", summary.n_variants, summary.n_blocks);
//! # Ok(())
//! # }
//! ```

pub use strata_archive::{
    ioutil, magic, ArchiveFooter, ArchiveHeader, ArchiveSummary, BlockBuilder, ColumnMask,
    CompressionStats, ContigDescriptor, DataContainer, FieldDescriptor, FieldType, FieldValue,
    FormatField, IndexEntry, InfoField, LoadedBlock, MetaColumn, ReaderConfig, RecordIter,
    TypeTag, VariantReader, VariantRecord, VariantWriter, WriterConfig,
};
pub use strata_base::{ByteBuffer, ByteCursor, Error, Result};
pub use strata_codec::{CipherKind, CodecId, DigestTable, Keychain};
pub use strata_gt::{Genotype, GtVariant, PermutationArray};
