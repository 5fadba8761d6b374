use strata_base::Error;
use test_log::test;

use crate::ppa::build_radix_ppa;
use crate::{
    classify, decode_variant, encode_block, expand_runs, is_invariant, Genotype, GtMethod,
    GtVariant, GtWidth,
};

fn diploid(a: i32, b: i32, phased: bool) -> Genotype {
    Genotype {
        alleles: vec![a, b],
        phased,
    }
}

fn variant(n_alleles: u16, gts: Vec<Genotype>) -> GtVariant {
    GtVariant {
        n_alleles,
        genotypes: gts,
    }
}

#[test]
fn test_classify_diploid_biallelic() {
    let v = variant(
        2,
        vec![
            diploid(0, 0, true),
            diploid(0, 1, true),
            diploid(1, 1, true),
        ],
    );
    let class = classify(&v, None).unwrap();
    assert_eq!(class.ploidy, 2);
    assert!(class.biallelic);
    assert!(!class.any_missing);
    assert!(class.uniform_phase && class.phase);
    assert_eq!(class.method(), GtMethod::BiallelicRle);
}

#[test]
fn test_classify_rejects_allele_overflow() {
    let v = variant(2, vec![diploid(0, 2, false)]);
    assert!(matches!(classify(&v, None), Err(Error::GtOverflow(_))));
}

#[test]
fn test_classify_rejects_declared_ploidy_violation() {
    let v = variant(
        2,
        vec![
            diploid(0, 0, false),
            Genotype::unphased(&[0]),
        ],
    );
    assert!(matches!(classify(&v, Some(2)), Err(Error::PloidyMismatch(_))));
}

#[test]
fn test_single_site_four_samples() {
    // One biallelic SNV over [0|0, 0|1, 1|1, 0|0].
    let v = variant(
        2,
        vec![
            diploid(0, 0, true),
            diploid(0, 1, true),
            diploid(1, 1, true),
            diploid(0, 0, true),
        ],
    );

    // Without permutation the 0|0 samples are split: four runs.
    let plain = encode_block(&[v.clone()], 4, false, None).unwrap();
    assert_eq!(plain.variants[0].method, GtMethod::BiallelicRle);
    assert_eq!(plain.variants[0].width, GtWidth::W8);
    assert_eq!(plain.streams.rle8.len(), 4);

    // With permutation the identical samples become adjacent: three runs.
    let permuted = encode_block(&[v], 4, true, None).unwrap();
    assert_eq!(permuted.streams.rle8.len(), 3);
    assert!(permuted.ppa.is_some());
}

#[test]
fn test_uniform_sites_collapse_to_one_word_per_variant() {
    // Two adjacent sites, 3 samples, everything 0|0.
    let gts = vec![
        diploid(0, 0, true),
        diploid(0, 0, true),
        diploid(0, 0, true),
    ];
    let vs = vec![variant(2, gts.clone()), variant(2, gts)];
    let enc = encode_block(&vs, 3, true, None).unwrap();
    assert_eq!(enc.streams.rle8.len(), 2);
    let ppa = enc.ppa.unwrap();
    assert!(ppa.is_identity());

    for v_enc in &enc.variants {
        assert_eq!(v_enc.n_words, 1);
    }
}

#[test]
fn test_roundtrip_restores_input_order() {
    let vs = vec![
        variant(
            2,
            vec![
                diploid(1, 1, false),
                diploid(0, 0, false),
                diploid(0, 1, false),
                diploid(0, 0, false),
                diploid(1, 1, false),
            ],
        ),
        variant(
            2,
            vec![
                diploid(0, 1, false),
                diploid(0, 1, false),
                diploid(0, 0, false),
                diploid(-1, -1, false),
                diploid(1, 1, false),
            ],
        ),
    ];
    let enc = encode_block(&vs, 5, true, None).unwrap();
    let ppa = enc.ppa.as_ref().unwrap();

    let mut offset = 0usize;
    for (i, v_enc) in enc.variants.iter().enumerate() {
        let words: Vec<u64> = enc.streams.rle8[offset..offset + v_enc.n_words as usize]
            .iter()
            .map(|&w| w as u64)
            .collect();
        offset += v_enc.n_words as usize;
        let runs = decode_variant(v_enc, &words).unwrap();
        let decoded = expand_runs(&runs, 5, Some(ppa), true).unwrap();
        assert_eq!(decoded, vs[i].genotypes, "variant {i}");
    }
}

#[test]
fn test_permutation_is_a_bijection() {
    let vs = vec![variant(
        2,
        vec![
            diploid(0, 1, false),
            diploid(1, 1, false),
            diploid(0, 0, false),
            diploid(0, 1, false),
            diploid(1, 0, false),
            diploid(0, 0, false),
        ],
    )];
    let ppa = build_radix_ppa(&vs, 6).unwrap();
    let inv = ppa.inverse();
    for orig in 0..6u32 {
        assert_eq!(ppa.original_index(inv[orig as usize] as usize), orig);
    }
}

#[test]
fn test_run_count_never_exceeds_matrix_size() {
    // 3 variants x 7 samples with at least two distinct strings.
    let mut vs = Vec::new();
    for seed in 0..3 {
        let gts = (0..7)
            .map(|i| diploid((i + seed) % 2, (i * seed) % 2, false))
            .collect();
        vs.push(variant(2, gts));
    }
    let enc = encode_block(&vs, 7, true, None).unwrap();
    let total_words = enc.streams.rle8.len()
        + enc.streams.rle16.len()
        + enc.streams.rle32.len()
        + enc.streams.rle64.len()
        + enc.streams.simple8.len()
        + enc.streams.simple16.len()
        + enc.streams.simple32.len()
        + enc.streams.simple64.len();
    assert!(total_words <= 3 * 7);
}

#[test]
fn test_long_runs_split_at_capacity() {
    // 200 identical diploid samples; v_bits = 2 so an 8-bit word keeps 6
    // run bits (max 63) and the run must split into ceil(200/63) words.
    let gts = vec![diploid(0, 0, false); 200];
    let enc = encode_block(&[variant(2, gts)], 200, false, None).unwrap();
    assert_eq!(enc.variants[0].width, GtWidth::W8);
    assert_eq!(enc.streams.rle8.len(), 4);

    let words: Vec<u64> = enc.streams.rle8.iter().map(|&w| w as u64).collect();
    let runs = decode_variant(&enc.variants[0], &words).unwrap();
    let total: u32 = runs.iter().map(|r| r.run_length).sum();
    assert_eq!(total, 200);
}

#[test]
fn test_missing_and_mixed_phase_roundtrip() {
    let vs = vec![variant(
        2,
        vec![
            diploid(0, -1, false),
            diploid(0, 1, true),
            diploid(-1, -1, false),
            diploid(1, 1, true),
        ],
    )];
    let enc = encode_block(&vs, 4, false, None).unwrap();
    let v_enc = &enc.variants[0];
    assert!(v_enc.any_missing);
    assert!(v_enc.mixed_phase);
    assert_eq!(v_enc.method, GtMethod::BiallelicRle);

    let words: Vec<u64> = enc.streams.rle8.iter().map(|&w| w as u64).collect();
    let runs = decode_variant(v_enc, &words).unwrap();
    let decoded = expand_runs(&runs, 4, None, false).unwrap();
    assert_eq!(decoded, vs[0].genotypes);
}

#[test]
fn test_multiallelic_routes_to_simple() {
    let vs = vec![variant(
        4,
        vec![
            diploid(0, 3, false),
            diploid(2, 1, false),
            diploid(3, 3, false),
        ],
    )];
    let enc = encode_block(&vs, 3, false, None).unwrap();
    let v_enc = &enc.variants[0];
    assert_eq!(v_enc.method, GtMethod::NallelicSimple);
    // Canonical codes reach 5; 3 allele bits x 2 slots fits an 8-bit word.
    assert_eq!(v_enc.width, GtWidth::W8);
    assert_eq!(enc.streams.simple8.len(), 3);

    let words: Vec<u64> = enc.streams.simple8.iter().map(|&w| w as u64).collect();
    let runs = decode_variant(v_enc, &words).unwrap();
    let decoded = expand_runs(&runs, 3, None, false).unwrap();
    assert_eq!(decoded, vs[0].genotypes);
}

#[test]
fn test_mixed_ploidy_pads_with_end_of_vector() {
    let vs = vec![variant(
        2,
        vec![
            Genotype::unphased(&[0, 1]),
            Genotype::unphased(&[1]),
            Genotype::unphased(&[0, 0]),
        ],
    )];
    let enc = encode_block(&vs, 3, false, None).unwrap();
    let v_enc = &enc.variants[0];
    assert!(v_enc.mixed_ploidy);
    assert_eq!(v_enc.method, GtMethod::NallelicSimple);

    let words: Vec<u64> = enc.streams.simple8.iter().map(|&w| w as u64).collect();
    let runs = decode_variant(v_enc, &words).unwrap();
    let decoded = expand_runs(&runs, 3, None, false).unwrap();
    assert_eq!(decoded[1].alleles, vec![1]);
    assert_eq!(decoded[0].alleles, vec![0, 1]);
}

#[test]
fn test_invariant_site_detection() {
    let hom_ref = variant(1, vec![Genotype::unphased(&[0, 0]); 3]);
    assert!(is_invariant(&hom_ref));
    let with_alt = variant(2, vec![diploid(0, 0, false), diploid(0, 1, false)]);
    assert!(!with_alt.genotypes.is_empty());
    assert!(!is_invariant(&with_alt));
}

#[test]
fn test_single_sample_disables_permutation() {
    let vs = vec![variant(2, vec![diploid(0, 1, false)])];
    let enc = encode_block(&vs, 1, true, None).unwrap();
    assert!(enc.ppa.is_none());
}
