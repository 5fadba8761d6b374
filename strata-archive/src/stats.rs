//! Per-column byte accounting, persisted as a JSON sidecar next to the
//! archive.

use std::io::Write;

use serde::{Deserialize, Serialize};
use strata_base::{Error, Result};

use crate::block::MetaColumn;

#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ColumnStats {
    pub name: String,
    pub uncompressed: u64,
    pub compressed: u64,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CompressionStats {
    pub columns: Vec<ColumnStats>,
}

impl Default for CompressionStats {
    fn default() -> Self {
        let mut columns: Vec<ColumnStats> = MetaColumn::ALL
            .iter()
            .map(|col| ColumnStats {
                name: col.name().to_owned(),
                ..ColumnStats::default()
            })
            .collect();
        columns.push(ColumnStats {
            name: "INFO".to_owned(),
            ..ColumnStats::default()
        });
        columns.push(ColumnStats {
            name: "FORMAT".to_owned(),
            ..ColumnStats::default()
        });
        CompressionStats { columns }
    }
}

impl CompressionStats {
    pub fn new() -> Self {
        CompressionStats::default()
    }

    pub fn add_meta(&mut self, column: MetaColumn, uncompressed: u64, compressed: u64) {
        let slot = &mut self.columns[column as usize];
        slot.uncompressed += uncompressed;
        slot.compressed += compressed;
    }

    pub fn add_info(&mut self, uncompressed: u64, compressed: u64) {
        let slot = &mut self.columns[MetaColumn::ALL.len()];
        slot.uncompressed += uncompressed;
        slot.compressed += compressed;
    }

    pub fn add_format(&mut self, uncompressed: u64, compressed: u64) {
        let slot = &mut self.columns[MetaColumn::ALL.len() + 1];
        slot.uncompressed += uncompressed;
        slot.compressed += compressed;
    }

    pub fn merge(&mut self, other: &CompressionStats) {
        for (slot, theirs) in self.columns.iter_mut().zip(&other.columns) {
            slot.uncompressed += theirs.uncompressed;
            slot.compressed += theirs.compressed;
        }
    }

    pub fn total_uncompressed(&self) -> u64 {
        self.columns.iter().map(|c| c.uncompressed).sum()
    }

    pub fn total_compressed(&self) -> u64 {
        self.columns.iter().map(|c| c.compressed).sum()
    }

    pub fn write_to(&self, sink: &mut impl Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *sink, self)
            .map_err(|e| Error::codec(format!("statistics serialization: {e}")))?;
        sink.write_all(b"\n")?;
        Ok(())
    }

    pub fn read_from(source: &mut impl std::io::Read) -> Result<Self> {
        serde_json::from_reader(source)
            .map_err(|e| Error::codec(format!("statistics deserialization: {e}")))
    }
}
