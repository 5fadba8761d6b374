use strata_base::{Error, Result};
use strata_codec::{CipherKind, CodecId};

/// Import-side knobs. Callable parameters, never environment state.
#[derive(Clone, Debug)]
pub struct WriterConfig {
    /// Variants per block before a flush.
    pub checkpoint_variants: u32,
    /// Base-pair span within a block before a flush.
    pub checkpoint_bases: u64,
    /// Compression level handed to the codec, 1..=20.
    pub compression_level: i32,
    pub codec: CodecId,
    pub permute_genotypes: bool,
    pub encrypt: bool,
    pub cipher: CipherKind,
    /// Worker threads for block encoding.
    pub threads: usize,
    /// Skip sites whose genotype matrix carries no non-reference allele.
    pub drop_invariant_sites: bool,
    /// Promise every sample the given ploidy; records that break the
    /// promise are rejected with a ploidy mismatch.
    pub declared_ploidy: Option<u8>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            checkpoint_variants: 1000,
            checkpoint_bases: 5_000_000,
            compression_level: 6,
            codec: CodecId::Zstd,
            permute_genotypes: true,
            encrypt: false,
            cipher: CipherKind::None,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            drop_invariant_sites: false,
            declared_ploidy: None,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=20).contains(&self.compression_level) {
            return Err(Error::schema(format!(
                "compression level {} outside 1..=20",
                self.compression_level
            )));
        }
        if self.checkpoint_variants == 0 {
            return Err(Error::schema("checkpoint_variants must be positive"));
        }
        if self.encrypt && self.cipher == CipherKind::None {
            return Err(Error::schema("encryption enabled without a cipher"));
        }
        if !self.encrypt && self.cipher != CipherKind::None {
            return Err(Error::schema("cipher configured without encryption"));
        }
        Ok(())
    }

    /// The cipher actually applied to containers.
    pub fn effective_cipher(&self) -> CipherKind {
        if self.encrypt {
            self.cipher
        } else {
            CipherKind::None
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReaderConfig {
    /// Keep iterating past a block whose decode fails.
    pub continue_on_block_error: bool,
    /// Undo the stored sample permutation when expanding genotypes.
    pub restore_sample_order: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            continue_on_block_error: false,
            restore_sample_order: true,
        }
    }
}
