//! Bit packing and run folding for the eight genotype streams.
//!
//! A word holds, from least to most significant: the phase bit (only when
//! phase is mixed within the variant), one allele slot per ploidy, and the
//! run length in whatever bits remain. Runs longer than the run field can
//! hold are split. Word width is chosen once per method class per block:
//! the smallest of 8/16/32/64 that fits every variant routed to that class
//! with at least one run-length bit to spare.

use strata_base::{Error, Result};
use tracing::debug;

use crate::model::{
    canonical_tuple, classify, Genotype, GtMethod, GtVariant, GtWidth, VariantClass, EOV_CODE,
    MISSING_CODE,
};
use crate::ppa::{build_radix_ppa, PermutationArray};

/// Per-variant facts the decoder needs; persisted in the gt-support column.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GtVariantEncoding {
    pub method: GtMethod,
    pub width: GtWidth,
    pub ploidy: u8,
    pub n_alleles: u16,
    pub any_missing: bool,
    pub mixed_phase: bool,
    /// The shared phase value when phase is uniform.
    pub phase: bool,
    pub mixed_ploidy: bool,
    pub n_words: u32,
}

/// The eight word streams, one per (method, width) pair, matching the
/// eight genotype meta columns of a block.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct GtStreams {
    pub rle8: Vec<u8>,
    pub rle16: Vec<u16>,
    pub rle32: Vec<u32>,
    pub rle64: Vec<u64>,
    pub simple8: Vec<u8>,
    pub simple16: Vec<u16>,
    pub simple32: Vec<u32>,
    pub simple64: Vec<u64>,
}

#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct GtBlockEncoding {
    pub ppa: Option<PermutationArray>,
    pub variants: Vec<GtVariantEncoding>,
    pub streams: GtStreams,
}

/// One decoded run: canonical allele codes, phase, and how many permuted
/// samples in sequence share them.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GtRun {
    pub alleles: Vec<u16>,
    pub phase: bool,
    pub run_length: u32,
}

fn bits_for(max_value: u32) -> u32 {
    debug_assert!(max_value >= 1);
    32 - max_value.leading_zeros()
}

fn allele_bits(class: &VariantClass) -> u32 {
    match class.method() {
        // 1 bit covers ref/alt; 2 bits add the missing sentinel.
        GtMethod::BiallelicRle => {
            if class.any_missing {
                2
            } else {
                1
            }
        }
        // Canonical codes run up to n_alleles + 1 (the last allele, + 2
        // for the sentinels).
        GtMethod::NallelicSimple => bits_for(class.n_alleles as u32 + 1),
    }
}

fn value_bits(class: &VariantClass) -> u32 {
    class.ploidy as u32 * allele_bits(class) + class.mixed_phase as u32
}

fn slot_from_canonical(canon: u16, method: GtMethod, a_bits: u32) -> u64 {
    if method == GtMethod::BiallelicRle && a_bits == 1 {
        // No sentinels present; store the raw allele.
        (canon - 2) as u64
    } else {
        canon as u64
    }
}

fn canonical_from_slot(slot: u64, method: GtMethod, a_bits: u32) -> u16 {
    if method == GtMethod::BiallelicRle && a_bits == 1 {
        slot as u16 + 2
    } else {
        slot as u16
    }
}

/// Encode a whole block's genotype matrix.
pub fn encode_block(
    variants: &[GtVariant],
    n_samples: usize,
    permute: bool,
    declared_ploidy: Option<u8>,
) -> Result<GtBlockEncoding> {
    let mut classes = Vec::with_capacity(variants.len());
    for variant in variants {
        if variant.genotypes.len() != n_samples {
            return Err(Error::schema(format!(
                "variant carries {} genotypes in a block of {} samples",
                variant.genotypes.len(),
                n_samples
            )));
        }
        classes.push(classify(variant, declared_ploidy)?);
    }

    // Sample permutation is pointless for a single sample.
    let ppa = if permute && n_samples > 1 && !variants.is_empty() {
        Some(build_radix_ppa(variants, n_samples)?)
    } else {
        None
    };

    // One width per method class per block: the smallest fitting every
    // variant of that class.
    let mut rle_bits = 0u32;
    let mut simple_bits = 0u32;
    for class in &classes {
        let bits = value_bits(class);
        match class.method() {
            GtMethod::BiallelicRle => rle_bits = rle_bits.max(bits),
            GtMethod::NallelicSimple => simple_bits = simple_bits.max(bits),
        }
    }
    let rle_width = if rle_bits > 0 {
        Some(GtWidth::smallest_for(rle_bits)?)
    } else {
        None
    };
    let simple_width = if simple_bits > 0 {
        Some(GtWidth::smallest_for(simple_bits)?)
    } else {
        None
    };

    let mut enc = GtBlockEncoding::default();
    for (variant, class) in variants.iter().zip(&classes) {
        let method = class.method();
        let width = match method {
            GtMethod::BiallelicRle => rle_width,
            GtMethod::NallelicSimple => simple_width,
        }
        .ok_or_else(|| Error::gt_overflow("method class has no width"))?;

        let words = encode_variant_words(variant, class, width, ppa.as_ref())?;
        let n_words = words.len() as u32;
        push_words(&mut enc.streams, method, width, &words);
        enc.variants.push(GtVariantEncoding {
            method,
            width,
            ploidy: class.ploidy,
            n_alleles: class.n_alleles,
            any_missing: class.any_missing,
            mixed_phase: class.mixed_phase,
            phase: class.phase,
            mixed_ploidy: class.mixed_ploidy,
            n_words,
        });
    }
    enc.ppa = ppa;
    debug!(
        target: "strata",
        variants = variants.len(),
        rle_bits,
        simple_bits,
        permuted = enc.ppa.is_some(),
        "genotype block encoded"
    );
    Ok(enc)
}

fn push_words(streams: &mut GtStreams, method: GtMethod, width: GtWidth, words: &[u64]) {
    match (method, width) {
        (GtMethod::BiallelicRle, GtWidth::W8) => {
            streams.rle8.extend(words.iter().map(|&w| w as u8))
        }
        (GtMethod::BiallelicRle, GtWidth::W16) => {
            streams.rle16.extend(words.iter().map(|&w| w as u16))
        }
        (GtMethod::BiallelicRle, GtWidth::W32) => {
            streams.rle32.extend(words.iter().map(|&w| w as u32))
        }
        (GtMethod::BiallelicRle, GtWidth::W64) => streams.rle64.extend_from_slice(words),
        (GtMethod::NallelicSimple, GtWidth::W8) => {
            streams.simple8.extend(words.iter().map(|&w| w as u8))
        }
        (GtMethod::NallelicSimple, GtWidth::W16) => {
            streams.simple16.extend(words.iter().map(|&w| w as u16))
        }
        (GtMethod::NallelicSimple, GtWidth::W32) => {
            streams.simple32.extend(words.iter().map(|&w| w as u32))
        }
        (GtMethod::NallelicSimple, GtWidth::W64) => streams.simple64.extend_from_slice(words),
    }
}

fn encode_variant_words(
    variant: &GtVariant,
    class: &VariantClass,
    width: GtWidth,
    ppa: Option<&PermutationArray>,
) -> Result<Vec<u64>> {
    let n_samples = variant.genotypes.len();
    let method = class.method();
    let a_bits = allele_bits(class);
    let v_bits = value_bits(class);
    let run_bits = width.bits() - v_bits;
    let max_run = if run_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << run_bits) - 1
    };

    let mut words = Vec::new();
    let mut current: Option<(Vec<u16>, bool)> = None;
    let mut run: u64 = 0;

    for pos in 0..n_samples {
        let orig = match ppa {
            Some(p) => p.original_index(pos) as usize,
            None => pos,
        };
        let gt = &variant.genotypes[orig];
        let tuple = canonical_tuple(gt, class.ploidy)?;
        let phase = gt.phased;

        match &current {
            Some((prev_tuple, prev_phase)) if *prev_tuple == tuple && *prev_phase == phase => {
                run += 1;
                if run == max_run {
                    words.push(pack_word(prev_tuple, *prev_phase, run, class, method, a_bits)?);
                    current = None;
                    run = 0;
                }
            }
            Some((prev_tuple, prev_phase)) => {
                words.push(pack_word(prev_tuple, *prev_phase, run, class, method, a_bits)?);
                current = Some((tuple, phase));
                run = 1;
            }
            None => {
                current = Some((tuple, phase));
                run = 1;
            }
        }
    }
    if let Some((tuple, phase)) = current {
        words.push(pack_word(&tuple, phase, run, class, method, a_bits)?);
    }

    debug_assert!(words.len() <= n_samples);
    Ok(words)
}

fn pack_word(
    tuple: &[u16],
    phase: bool,
    run: u64,
    class: &VariantClass,
    method: GtMethod,
    a_bits: u32,
) -> Result<u64> {
    let mut word: u64 = 0;
    let mut shift: u32 = 0;
    if class.mixed_phase {
        word |= phase as u64;
        shift = 1;
    }
    for &canon in tuple {
        let slot = slot_from_canonical(canon, method, a_bits);
        if slot >> a_bits != 0 {
            return Err(Error::gt_overflow(format!(
                "allele code {canon} does not fit {a_bits} slot bits"
            )));
        }
        word |= slot << shift;
        shift += a_bits;
    }
    word |= run << shift;
    Ok(word)
}

/// Unpack one variant's words back into runs of canonical allele codes.
pub fn decode_variant(enc: &GtVariantEncoding, words: &[u64]) -> Result<Vec<GtRun>> {
    if words.len() != enc.n_words as usize {
        return Err(Error::truncated(format!(
            "expected {} genotype words, got {}",
            enc.n_words,
            words.len()
        )));
    }
    let a_bits = match enc.method {
        GtMethod::BiallelicRle => {
            if enc.any_missing {
                2
            } else {
                1
            }
        }
        GtMethod::NallelicSimple => bits_for(enc.n_alleles as u32 + 1),
    };
    let v_bits = enc.ploidy as u32 * a_bits + enc.mixed_phase as u32;
    let run_bits = enc.width.bits() - v_bits;
    let a_mask = (1u64 << a_bits) - 1;
    let run_mask = if run_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << run_bits) - 1
    };

    let mut runs = Vec::with_capacity(words.len());
    for &word in words {
        let mut shift: u32 = 0;
        let phase = if enc.mixed_phase {
            shift = 1;
            word & 1 != 0
        } else {
            enc.phase
        };
        let mut alleles = Vec::with_capacity(enc.ploidy as usize);
        for _ in 0..enc.ploidy {
            let slot = (word >> shift) & a_mask;
            alleles.push(canonical_from_slot(slot, enc.method, a_bits));
            shift += a_bits;
        }
        let run = (word >> shift) & run_mask;
        if run == 0 || run > u32::MAX as u64 {
            return Err(Error::truncated(format!("bad genotype run length {run}")));
        }
        runs.push(GtRun {
            alleles,
            phase,
            run_length: run as u32,
        });
    }
    Ok(runs)
}

/// Expand runs back to one genotype per sample. Consumers see permuted
/// order unless they ask for the original order and the block stored a
/// permutation.
pub fn expand_runs(
    runs: &[GtRun],
    n_samples: usize,
    ppa: Option<&PermutationArray>,
    restore_input_order: bool,
) -> Result<Vec<Genotype>> {
    let mut out = vec![Genotype::default(); n_samples];
    let mut pos = 0usize;
    for run in runs {
        for _ in 0..run.run_length {
            if pos >= n_samples {
                return Err(Error::truncated(
                    "genotype runs cover more than the sample count",
                ));
            }
            let mut alleles = Vec::with_capacity(run.alleles.len());
            for &code in &run.alleles {
                if code == EOV_CODE {
                    break;
                }
                if code == MISSING_CODE {
                    alleles.push(-1);
                } else {
                    alleles.push(code as i32 - 2);
                }
            }
            let gt = Genotype {
                alleles,
                phased: run.phase,
            };
            match (ppa, restore_input_order) {
                (Some(p), true) => out[p.original_index(pos) as usize] = gt,
                _ => out[pos] = gt,
            }
            pos += 1;
        }
    }
    if pos != n_samples {
        return Err(Error::truncated(format!(
            "genotype runs cover {pos} of {n_samples} samples"
        )));
    }
    Ok(out)
}
