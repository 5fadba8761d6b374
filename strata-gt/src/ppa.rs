//! The sample permutation array and its radix-style builder.

use std::collections::BTreeMap;

use strata_base::{Error, Result};

use crate::model::{canonical_tuple, classify, GtVariant};

/// A bijection over `[0, n_samples)`. `ordering[i]` is the original index
/// of the sample sitting at permuted position `i`; the genotype streams of
/// a permuted block are written in `ordering` order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PermutationArray {
    ordering: Vec<u32>,
}

impl PermutationArray {
    pub fn identity(n_samples: usize) -> Self {
        PermutationArray {
            ordering: (0..n_samples as u32).collect(),
        }
    }

    /// Validates the bijection invariant on data read back from a block.
    pub fn from_ordering(ordering: Vec<u32>) -> Result<Self> {
        let mut seen = vec![false; ordering.len()];
        for &orig in &ordering {
            let slot = seen
                .get_mut(orig as usize)
                .ok_or_else(|| Error::truncated("permutation index out of range"))?;
            if *slot {
                return Err(Error::truncated("permutation repeats a sample index"));
            }
            *slot = true;
        }
        Ok(PermutationArray { ordering })
    }

    pub fn len(&self) -> usize {
        self.ordering.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordering.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.ordering.iter().enumerate().all(|(i, &o)| i as u32 == o)
    }

    pub fn ordering(&self) -> &[u32] {
        &self.ordering
    }

    /// Original sample index at permuted position `pos`.
    pub fn original_index(&self, pos: usize) -> u32 {
        self.ordering[pos]
    }

    /// `inverse[original] = permuted position`; composing with `ordering`
    /// yields the identity.
    pub fn inverse(&self) -> Vec<u32> {
        let mut inv = vec![0u32; self.ordering.len()];
        for (pos, &orig) in self.ordering.iter().enumerate() {
            inv[orig as usize] = pos as u32;
        }
        inv
    }
}

/// Build the permutation by a stable radix pass: for each variant from
/// last to first, partition samples by that variant's canonical allele
/// tuple, preserving order within buckets. Samples with identical or
/// near-identical genotype strings end up contiguous, which is what the
/// run-length encoder wants.
pub fn build_radix_ppa(variants: &[GtVariant], n_samples: usize) -> Result<PermutationArray> {
    let mut order: Vec<u32> = (0..n_samples as u32).collect();
    if n_samples <= 1 {
        return Ok(PermutationArray { ordering: order });
    }

    for variant in variants.iter().rev() {
        let class = classify(variant, None)?;
        let mut buckets: BTreeMap<Vec<u32>, Vec<u32>> = BTreeMap::new();
        for &sample in &order {
            let gt = &variant.genotypes[sample as usize];
            let phase = gt.phased as u32;
            // Phase participates in run identity, so it participates here.
            let key: Vec<u32> = canonical_tuple(gt, class.ploidy)?
                .into_iter()
                .map(|code| ((code as u32) << 1) | phase)
                .collect();
            buckets.entry(key).or_default().push(sample);
        }
        order.clear();
        for (_, bucket) in buckets {
            order.extend(bucket);
        }
    }

    Ok(PermutationArray { ordering: order })
}
