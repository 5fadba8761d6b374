//! Genotype codec: adaptive sample permutation plus run-length encoding.
//!
//! A block's genotype matrix (V variants x N samples) is encoded in three
//! steps. Each variant is classified by ploidy, allele count, missingness
//! and phase mix, and routed to one of two methods: a tight bit-packing
//! for diploid biallelic sites ("rle") and a wider-slot packing for
//! everything else ("simple"), each at an 8, 16, 32 or 64-bit word width.
//! If enabled, samples are reordered by a stable radix pass over the whole
//! matrix so that similar genotype strings become contiguous, and the
//! resulting permutation array is stored as a column of its own. Finally
//! each variant's samples are walked in permuted order and folded into
//! run-length words.
//!
//! Allele values use the canonical encoding of the wire format throughout:
//! 0 is the missing sentinel, 1 is end-of-vector (a sample whose ploidy is
//! shorter than the variant's base ploidy), and a real allele `a` is stored
//! as `a + 2`. The low bit of a packed allele carries phase where phase is
//! mixed within the variant.

mod model;
mod ppa;
mod rle;

pub use model::{classify, is_invariant, Genotype, GtMethod, GtVariant, GtWidth, VariantClass};
pub use ppa::PermutationArray;
pub use rle::{
    decode_variant, encode_block, expand_runs, GtBlockEncoding, GtRun, GtStreams,
    GtVariantEncoding,
};

#[cfg(test)]
mod test;
