use strata_base::{Error, Result};

/// One sample's call at one site: 0-based allele indexes with -1 for
/// missing, and a phase flag. Ploidy is `alleles.len()`.
#[derive(Clone, Default, PartialEq, Eq, Debug, Hash)]
pub struct Genotype {
    pub alleles: Vec<i32>,
    pub phased: bool,
}

impl Genotype {
    pub fn unphased(alleles: &[i32]) -> Self {
        Genotype {
            alleles: alleles.to_vec(),
            phased: false,
        }
    }

    pub fn phased(alleles: &[i32]) -> Self {
        Genotype {
            alleles: alleles.to_vec(),
            phased: true,
        }
    }

    pub fn ploidy(&self) -> usize {
        self.alleles.len()
    }
}

/// The genotype matrix slice for one variant.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct GtVariant {
    /// Total allele count at the site (reference included).
    pub n_alleles: u16,
    /// One entry per sample, in input order.
    pub genotypes: Vec<Genotype>,
}

/// True when the site carries no called non-reference allele.
pub fn is_invariant(variant: &GtVariant) -> bool {
    variant
        .genotypes
        .iter()
        .all(|gt| gt.alleles.iter().all(|&a| a <= 0))
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[repr(u8)]
pub enum GtMethod {
    /// Diploid biallelic sites, 1-2 bits per allele.
    BiallelicRle = 0,
    /// Everything else: allele slots wide enough for the site's codes.
    NallelicSimple = 1,
}

impl GtMethod {
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(GtMethod::BiallelicRle),
            1 => Ok(GtMethod::NallelicSimple),
            other => Err(Error::version(format!("unknown gt method {other}"))),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[repr(u8)]
pub enum GtWidth {
    W8 = 0,
    W16 = 1,
    W32 = 2,
    W64 = 3,
}

impl GtWidth {
    pub fn bits(self) -> u32 {
        match self {
            GtWidth::W8 => 8,
            GtWidth::W16 => 16,
            GtWidth::W32 => 32,
            GtWidth::W64 => 64,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(GtWidth::W8),
            1 => Ok(GtWidth::W16),
            2 => Ok(GtWidth::W32),
            3 => Ok(GtWidth::W64),
            other => Err(Error::version(format!("unknown gt width code {other}"))),
        }
    }

    /// Smallest width holding `bits` payload bits plus at least one
    /// run-length bit. Ties go to the smaller width.
    pub fn smallest_for(bits: u32) -> Result<Self> {
        for width in [GtWidth::W8, GtWidth::W16, GtWidth::W32, GtWidth::W64] {
            if bits < width.bits() {
                return Ok(width);
            }
        }
        Err(Error::gt_overflow(format!(
            "{bits} payload bits exceed the 64-bit genotype word"
        )))
    }
}

/// Per-variant classification driving method, width and bit shares.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VariantClass {
    pub ploidy: u8,
    pub mixed_ploidy: bool,
    pub n_alleles: u16,
    pub biallelic: bool,
    pub any_missing: bool,
    pub mixed_phase: bool,
    pub uniform_phase: bool,
    /// The shared phase value when `uniform_phase`.
    pub phase: bool,
}

impl VariantClass {
    pub fn method(&self) -> GtMethod {
        if self.ploidy == 2 && self.biallelic && !self.mixed_ploidy {
            GtMethod::BiallelicRle
        } else {
            GtMethod::NallelicSimple
        }
    }
}

/// Classify one variant. `declared_ploidy` enforces block-uniform ploidy
/// when the caller has promised one.
pub fn classify(variant: &GtVariant, declared_ploidy: Option<u8>) -> Result<VariantClass> {
    let mut max_ploidy = 0usize;
    let mut min_ploidy = usize::MAX;
    let mut any_missing = false;
    let mut any_phased = false;
    let mut any_unphased = false;

    for gt in &variant.genotypes {
        let p = gt.ploidy();
        if let Some(declared) = declared_ploidy {
            if p != declared as usize {
                return Err(Error::ploidy(format!(
                    "sample ploidy {p} in a block declared ploidy-{declared}"
                )));
            }
        }
        max_ploidy = max_ploidy.max(p);
        min_ploidy = min_ploidy.min(p);
        if gt.alleles.iter().any(|&a| a < 0) {
            any_missing = true;
        }
        if gt.phased {
            any_phased = true;
        } else {
            any_unphased = true;
        }
        for &a in &gt.alleles {
            if a >= variant.n_alleles as i32 {
                return Err(Error::gt_overflow(format!(
                    "allele {a} at a site with {} alleles",
                    variant.n_alleles
                )));
            }
        }
    }

    if variant.genotypes.is_empty() {
        min_ploidy = 0;
    }
    if max_ploidy > u8::MAX as usize {
        return Err(Error::gt_overflow(format!("ploidy {max_ploidy} > 255")));
    }

    let mixed_phase = any_phased && any_unphased;
    Ok(VariantClass {
        ploidy: max_ploidy as u8,
        mixed_ploidy: min_ploidy != max_ploidy,
        n_alleles: variant.n_alleles,
        biallelic: variant.n_alleles == 2,
        any_missing,
        mixed_phase,
        uniform_phase: !mixed_phase,
        phase: any_phased,
    })
}

pub(crate) const MISSING_CODE: u16 = 0;
pub(crate) const EOV_CODE: u16 = 1;

/// Canonical allele code: 0 missing, 1 end-of-vector, else allele + 2.
pub(crate) fn canonical_code(allele: i32) -> Result<u16> {
    if allele < 0 {
        return Ok(MISSING_CODE);
    }
    let code = allele as u32 + 2;
    if code > u16::MAX as u32 {
        return Err(Error::gt_overflow(format!("allele {allele} > 65533")));
    }
    Ok(code as u16)
}

/// Canonical codes for one sample at one site, padded to the variant's
/// base ploidy with the end-of-vector sentinel.
pub(crate) fn canonical_tuple(gt: &Genotype, ploidy: u8) -> Result<Vec<u16>> {
    let mut codes = Vec::with_capacity(ploidy as usize);
    for &a in &gt.alleles {
        codes.push(canonical_code(a)?);
    }
    while codes.len() < ploidy as usize {
        codes.push(EOV_CODE);
    }
    Ok(codes)
}
