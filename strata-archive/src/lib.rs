//! Columnar archive engine for variant data: blocks of independently
//! decodable columns, a genotype codec, per-column compression, digests
//! and optional encryption, and a hierarchical interval index, written
//! behind a seekable footer.

mod block;
mod config;
mod container;
mod footer;
mod header;
mod index;
pub mod ioutil;
mod lazy;
pub mod magic;
mod pattern;
mod record;
mod stats;
mod writer;

mod reader;

pub use block::{
    encode_block, BlockBuilder, BlockFooter, BlockHeader, ColumnLocation, EncodedBlock,
    MetaColumn, COLUMN_FORMAT_BASE, COLUMN_INFO_BASE,
};
pub use config::{ReaderConfig, WriterConfig};
pub use container::{ColumnValue, DataContainer, DataHeader, TypeTag};
pub use footer::ArchiveFooter;
pub use header::{ArchiveHeader, ContigDescriptor, FieldDescriptor, FieldType};
pub use index::{ContigIndex, IndexEntry, VariantIndex};
pub use lazy::{ColumnMask, LoadedBlock};
pub use pattern::PatternDictionary;
pub use record::{FieldValue, FormatField, InfoField, VariantRecord};
pub use stats::{ColumnStats, CompressionStats};
pub use reader::{RecordIter, VariantReader};
pub use writer::{ArchiveSummary, VariantWriter};

#[cfg(test)]
mod test;
