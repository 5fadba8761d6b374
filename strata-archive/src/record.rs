//! The record model presented by upstream parsers and yielded back by the
//! reader. One record is one site: meta fields, annotation values keyed by
//! the global field ids of the archive header, and optional genotypes.

use strata_gt::Genotype;

/// A typed annotation payload. Integer values travel as i64 regardless of
/// the narrowed on-disk width.
#[derive(Clone, PartialEq, Debug)]
pub enum FieldValue {
    Flag,
    Int(Vec<i64>),
    Float(Vec<f32>),
    Str(String),
}

#[derive(Clone, PartialEq, Debug)]
pub struct InfoField {
    /// Global INFO id from the archive header.
    pub key: u32,
    pub value: FieldValue,
}

#[derive(Clone, PartialEq, Debug)]
pub struct FormatField {
    /// Global FORMAT id from the archive header.
    pub key: u32,
    /// One value per sample, in sample order.
    pub values: Vec<FieldValue>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct VariantRecord {
    /// Contig id from the archive header.
    pub contig: i32,
    /// 0-based position.
    pub position: u64,
    /// Site quality; NaN-free inputs only, 0.0 when absent upstream.
    pub quality: f32,
    /// Site name; empty when absent.
    pub name: String,
    /// Reference allele first, then alternates.
    pub alleles: Vec<String>,
    /// Global FILTER ids, in input order.
    pub filters: Vec<u32>,
    pub info: Vec<InfoField>,
    pub format: Vec<FormatField>,
    /// One genotype per sample when the archive carries genotypes.
    pub genotypes: Option<Vec<Genotype>>,
}

impl VariantRecord {
    pub fn n_alleles(&self) -> u16 {
        self.alleles.len() as u16
    }

    /// End position used for interval indexing: the reference span of the
    /// longest canonical-base allele, or the point position otherwise.
    pub fn index_end(&self) -> u64 {
        let longest = self
            .alleles
            .iter()
            .filter(|a| a.bytes().all(|b| matches!(b, b'A' | b'T' | b'G' | b'C')))
            .map(|a| a.len() as u64)
            .max()
            .unwrap_or(0);
        if longest > 1 {
            self.position + longest
        } else {
            self.position
        }
    }
}
