//! End-to-end write/read scenarios over in-memory archives.

use std::io::Cursor;

use strata_base::Error;
use strata_codec::CipherKind;
use strata_gt::Genotype;
use test_log::test;

use crate::{
    ArchiveHeader, ColumnMask, FieldType, FieldValue, FormatField, InfoField, MetaColumn,
    ReaderConfig, VariantReader, VariantRecord, VariantWriter, WriterConfig,
};

fn test_header(contig_len: u64, n_samples: usize) -> ArchiveHeader {
    let mut header = ArchiveHeader::new();
    header.add_contig("chr1", contig_len);
    for i in 0..n_samples {
        header.add_sample(format!("S{i}"));
    }
    header.add_info("DP", FieldType::Integer); // key 0
    header.add_info("AF", FieldType::Float); // key 1
    header.add_info("DB", FieldType::Flag); // key 2
    header.add_info("CSQ", FieldType::String); // key 3
    header.add_format("GQ", FieldType::Integer); // key 0
    header.add_filter("PASS"); // key 0
    header.add_filter("LowQual"); // key 1
    header
}

fn diploid(a: i32, b: i32, phased: bool) -> Genotype {
    Genotype {
        alleles: vec![a, b],
        phased,
    }
}

fn snv(position: u64, genotypes: Vec<Genotype>) -> VariantRecord {
    VariantRecord {
        contig: 0,
        position,
        quality: 29.5,
        name: format!("rs{position}"),
        alleles: vec!["A".into(), "G".into()],
        filters: vec![0],
        info: vec![InfoField {
            key: 0,
            value: FieldValue::Int(vec![30]),
        }],
        format: vec![],
        genotypes: Some(genotypes),
    }
}

fn write_archive(
    header: ArchiveHeader,
    records: Vec<VariantRecord>,
    config: WriterConfig,
) -> (Vec<u8>, crate::ArchiveSummary) {
    let mut writer = VariantWriter::open(Cursor::new(Vec::new()), config).unwrap();
    writer.set_header(header).unwrap();
    for record in records {
        writer.push(record).unwrap();
    }
    let (sink, summary) = writer.close().unwrap();
    (sink.into_inner(), summary)
}

fn open_reader(bytes: Vec<u8>, config: ReaderConfig) -> VariantReader<Cursor<Vec<u8>>> {
    VariantReader::open(Cursor::new(bytes), config).unwrap()
}

#[test]
fn test_single_snv_block_layout() {
    // One biallelic SNV, four samples, genotypes [0|0, 0|1, 1|1, 0|0].
    let genotypes = vec![
        diploid(0, 0, true),
        diploid(0, 1, true),
        diploid(1, 1, true),
        diploid(0, 0, true),
    ];
    let record = snv(100, genotypes.clone());
    let (bytes, summary) = write_archive(
        test_header(100_000, 4),
        vec![record.clone()],
        WriterConfig::default(),
    );
    assert_eq!(summary.n_blocks, 1);
    assert_eq!(summary.n_variants, 1);

    let mut reader = open_reader(bytes, ReaderConfig::default());
    let entries = reader.block_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].min_position, 100);
    assert_eq!(entries[0].max_position, 100);

    let block = reader.fetch_block(&entries[0]).unwrap();
    assert_eq!(block.header.min_position, 100);
    assert_eq!(block.header.max_position, 100);

    // The packed ref/alt byte is present and the permuted RLE column
    // holds three words (the two 0|0 samples fold into one run).
    let packed = block.meta_column(MetaColumn::RefAltPacked, None).unwrap();
    assert_eq!(packed.header().n_entries, 1);
    let rle8 = block.meta_column(MetaColumn::GtRle8, None).unwrap();
    assert_eq!(rle8.header().n_entries, 3);

    let records = reader.block_records(&entries[0]).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].genotypes.as_ref().unwrap(), &genotypes);
    assert_eq!(records[0].alleles, vec!["A".to_owned(), "G".to_owned()]);
    assert_eq!(records[0].position, 100);
}

#[test]
fn test_uniform_sites_one_word_per_variant() {
    let genotypes = vec![diploid(0, 0, true); 3];
    let records = vec![snv(10, genotypes.clone()), snv(11, genotypes)];
    let (bytes, _) = write_archive(test_header(100_000, 3), records, WriterConfig::default());

    let mut reader = open_reader(bytes, ReaderConfig::default());
    let entries = reader.block_entries();
    let block = reader.fetch_block(&entries[0]).unwrap();
    let rle8 = block.meta_column(MetaColumn::GtRle8, None).unwrap();
    // One run word per variant, each covering all three samples.
    assert_eq!(rle8.read_words().unwrap().len(), 2);
}

#[test]
fn test_flush_on_base_span() {
    let config = WriterConfig {
        checkpoint_bases: 5_000_000,
        ..WriterConfig::default()
    };
    let records = vec![
        snv(1, vec![diploid(0, 1, false)]),
        snv(10, vec![diploid(0, 0, false)]),
        snv(5_000_010, vec![diploid(1, 1, false)]),
    ];
    let (bytes, summary) = write_archive(test_header(10_000_000, 1), records, config);
    assert_eq!(summary.n_blocks, 2);

    let reader = open_reader(bytes, ReaderConfig::default());
    let entries = reader.block_entries();
    assert_eq!(entries[0].n_variants, 2);
    assert_eq!(entries[1].n_variants, 1);
    assert_eq!(entries[1].min_position, 5_000_010);
}

#[test]
fn test_flush_on_variant_count() {
    let config = WriterConfig {
        checkpoint_variants: 10,
        ..WriterConfig::default()
    };
    let records: Vec<VariantRecord> = (0..25)
        .map(|i| snv(i * 100, vec![diploid(0, 1, false)]))
        .collect();
    let (bytes, summary) = write_archive(test_header(100_000, 1), records, config);
    assert_eq!(summary.n_blocks, 3);
    assert_eq!(summary.n_variants, 25);

    let reader = open_reader(bytes, ReaderConfig::default());
    let counts: Vec<u32> = reader.block_entries().iter().map(|e| e.n_variants).collect();
    assert_eq!(counts, vec![10, 10, 5]);
}

#[test]
fn test_interval_query() {
    let config = WriterConfig {
        checkpoint_variants: 1,
        ..WriterConfig::default()
    };
    let records: Vec<VariantRecord> = [50_000u64, 150_000, 250_000, 350_000]
        .iter()
        .map(|&p| snv(p, vec![diploid(0, 1, false)]))
        .collect();
    let (bytes, summary) = write_archive(test_header(400_000, 1), records, config);
    assert_eq!(summary.n_blocks, 4);

    let mut reader = open_reader(bytes, ReaderConfig::default());
    let hits = reader.query("chr1", 150_000, 250_000).unwrap();
    let ids: Vec<u64> = hits.iter().map(|e| e.block_id).collect();
    assert_eq!(ids, vec![1, 2]);

    // Soundness: a point query at each record's position finds its block.
    for (i, &p) in [50_000u64, 150_000, 250_000, 350_000].iter().enumerate() {
        let hits = reader.query("chr1", p, p).unwrap();
        assert!(hits.iter().any(|e| e.block_id == i as u64), "position {p}");
    }

    let records = reader.query_records("chr1", 150_000, 250_000).unwrap();
    let positions: Vec<u64> = records.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![150_000, 250_000]);
}

#[test]
fn test_unsorted_input_rejected() {
    let mut writer = VariantWriter::open(Cursor::new(Vec::new()), WriterConfig::default()).unwrap();
    writer.set_header(test_header(100_000, 1)).unwrap();
    writer.push(snv(200, vec![diploid(0, 0, false)])).unwrap();
    let err = writer
        .push(snv(100, vec![diploid(0, 0, false)]))
        .unwrap_err();
    assert!(matches!(err, Error::UnsortedInput(_)));
}

#[test]
fn test_contig_range_violation_rejects_record_only() {
    let mut writer = VariantWriter::open(Cursor::new(Vec::new()), WriterConfig::default()).unwrap();
    writer.set_header(test_header(1_000, 1)).unwrap();
    let err = writer
        .push(snv(5_000, vec![diploid(0, 0, false)]))
        .unwrap_err();
    assert!(matches!(err, Error::ContigRangeViolation(_)));

    // The offending record is rejected but the writer keeps going.
    writer.push(snv(500, vec![diploid(0, 1, false)])).unwrap();
    let (_, summary) = writer.close().unwrap();
    assert_eq!(summary.n_variants, 1);
}

#[test]
fn test_gt_overflow_rejects_record_only() {
    let mut writer = VariantWriter::open(Cursor::new(Vec::new()), WriterConfig::default()).unwrap();
    writer.set_header(test_header(100_000, 1)).unwrap();

    // Allele id 2 at a biallelic site is rejected, but the block goes on.
    let err = writer.push(snv(100, vec![diploid(0, 2, false)])).unwrap_err();
    assert!(matches!(err, Error::GtOverflow(_)));
    writer.push(snv(150, vec![diploid(0, 1, false)])).unwrap();
    let (_, summary) = writer.close().unwrap();
    assert_eq!(summary.n_variants, 1);
}

#[test]
fn test_declared_ploidy_rejects_record_only() {
    let config = WriterConfig {
        declared_ploidy: Some(2),
        ..WriterConfig::default()
    };
    let mut writer = VariantWriter::open(Cursor::new(Vec::new()), config).unwrap();
    writer.set_header(test_header(100_000, 1)).unwrap();

    // A haploid call under a diploid promise is rejected; the block goes on.
    let err = writer
        .push(snv(100, vec![Genotype::unphased(&[1])]))
        .unwrap_err();
    assert!(matches!(err, Error::PloidyMismatch(_)));
    writer.push(snv(150, vec![diploid(0, 1, false)])).unwrap();
    let (_, summary) = writer.close().unwrap();
    assert_eq!(summary.n_variants, 1);
}

#[test]
fn test_on_disk_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cohort.str");
    let records = vec![
        snv(100, vec![diploid(0, 1, true), diploid(1, 1, true)]),
        snv(250, vec![diploid(0, 0, true), diploid(0, 1, true)]),
    ];

    let sink = crate::ioutil::create_archive_file(&path).unwrap();
    let mut writer = VariantWriter::open(sink, WriterConfig::default()).unwrap();
    writer.set_header(test_header(100_000, 2)).unwrap();
    for record in &records {
        writer.push(record.clone()).unwrap();
    }
    let (mut sink, summary) = writer.close().unwrap();
    use std::io::Write as _;
    sink.flush().unwrap();
    drop(sink);
    assert_eq!(summary.n_variants, 2);

    // Creating over an existing archive is refused.
    assert!(crate::ioutil::create_archive_file(&path).is_err());

    let source = crate::ioutil::open_archive_file(&path).unwrap();
    let mut reader = VariantReader::open(source, ReaderConfig::default()).unwrap();
    let decoded: Vec<VariantRecord> = reader
        .records()
        .collect::<strata_base::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(decoded, records);
}

#[test]
fn test_full_annotation_roundtrip() {
    let mut records = Vec::new();
    for i in 0..40u64 {
        let mut record = VariantRecord {
            contig: 0,
            position: 1_000 + i * 17,
            quality: 10.0 + i as f32,
            name: format!("site{i}"),
            alleles: if i % 5 == 0 {
                vec!["AT".into(), "A".into(), "ATT".into()]
            } else {
                vec!["A".into(), "G".into()]
            },
            filters: if i % 3 == 0 { vec![0] } else { vec![0, 1] },
            info: vec![
                InfoField {
                    key: 0,
                    value: FieldValue::Int(vec![20 + i as i64]),
                },
                InfoField {
                    key: 1,
                    value: FieldValue::Float(vec![0.25]),
                },
            ],
            format: vec![FormatField {
                key: 0,
                values: vec![
                    FieldValue::Int(vec![99]),
                    FieldValue::Int(vec![35 + i as i64]),
                ],
            }],
            genotypes: Some(vec![
                diploid((i % 2) as i32, 0, false),
                if i % 7 == 0 {
                    diploid(-1, -1, false)
                } else {
                    diploid(1, 1, false)
                },
            ]),
        };
        if i % 4 == 0 {
            record.info.push(InfoField {
                key: 2,
                value: FieldValue::Flag,
            });
            record.info.push(InfoField {
                key: 3,
                value: FieldValue::Str(format!("ann-{i}")),
            });
        }
        records.push(record);
    }

    let config = WriterConfig {
        checkpoint_variants: 16,
        ..WriterConfig::default()
    };
    let (bytes, summary) = write_archive(test_header(1_000_000, 2), records.clone(), config);
    assert_eq!(summary.n_blocks, 3);

    let mut reader = open_reader(bytes, ReaderConfig::default());
    assert_eq!(reader.n_variants(), 40);
    let decoded: Vec<VariantRecord> = reader
        .records()
        .collect::<strata_base::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(decoded, records);
}

#[test]
fn test_parallel_read_matches_sequential() {
    let records: Vec<VariantRecord> = (0..60u64)
        .map(|i| snv(i * 11, vec![diploid(0, (i % 2) as i32, false), diploid(1, 1, false)]))
        .collect();
    let config = WriterConfig {
        checkpoint_variants: 8,
        threads: 3,
        ..WriterConfig::default()
    };
    let (bytes, _) = write_archive(test_header(100_000, 2), records, config);

    let mut seq_reader = open_reader(bytes.clone(), ReaderConfig::default());
    let sequential: Vec<VariantRecord> = seq_reader
        .records()
        .collect::<strata_base::Result<Vec<_>>>()
        .unwrap();
    let mut par_reader = open_reader(bytes, ReaderConfig::default());
    let parallel = par_reader.all_records_parallel(4).unwrap();
    assert_eq!(parallel, sequential);
}

#[test]
fn test_column_mask_skips_payloads() {
    let records = vec![snv(100, vec![diploid(0, 1, true)])];
    let (bytes, _) = write_archive(test_header(100_000, 1), records, WriterConfig::default());

    let mut reader = open_reader(bytes, ReaderConfig::default());
    reader.set_column_mask(ColumnMask {
        names: false,
        quality: false,
        alleles: false,
        genotypes: false,
        info: Some(vec![]),
        format: Some(vec![]),
    });
    let entries = reader.block_entries();
    let records = reader.block_records(&entries[0]).unwrap();
    assert_eq!(records[0].position, 100);
    assert!(records[0].genotypes.is_none());
    assert!(records[0].name.is_empty());
    assert!(records[0].alleles.is_empty());
    assert!(records[0].info.is_empty());
    assert_eq!(records[0].quality, 0.0);
    // Filters always travel with the record.
    assert_eq!(records[0].filters, vec![0]);
}

#[test]
fn test_tamper_detection_at_read() {
    let records = vec![snv(100, vec![diploid(0, 1, false)])];
    let (bytes, _) = write_archive(test_header(100_000, 1), records, WriterConfig::default());

    let reader = open_reader(bytes.clone(), ReaderConfig::default());
    let entry = reader.block_entries()[0];
    drop(reader);

    // Flip one bit inside the first column's compressed payload.
    let payload_byte = entry.byte_offset as usize
        + crate::BlockHeader::SERIALIZED_LEN
        + crate::DataHeader::SERIALIZED_LEN
        + 16;
    let mut tampered = bytes;
    tampered[payload_byte] ^= 0x04;

    let mut reader = open_reader(tampered, ReaderConfig::default());
    let entries = reader.block_entries();
    let err = reader.block_records(&entries[0]).unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch(_)));
}

#[test]
fn test_continue_on_block_error_skips_damaged_block() {
    let config = WriterConfig {
        checkpoint_variants: 1,
        ..WriterConfig::default()
    };
    let records = vec![
        snv(100, vec![diploid(0, 1, false)]),
        snv(200, vec![diploid(1, 1, false)]),
    ];
    let (bytes, _) = write_archive(test_header(100_000, 1), records, config);

    let reader = open_reader(bytes.clone(), ReaderConfig::default());
    let entry = reader.block_entries()[0];
    drop(reader);
    let payload_byte = entry.byte_offset as usize
        + crate::BlockHeader::SERIALIZED_LEN
        + crate::DataHeader::SERIALIZED_LEN
        + 16;
    let mut tampered = bytes;
    tampered[payload_byte] ^= 0x40;

    let mut reader = open_reader(
        tampered,
        ReaderConfig {
            continue_on_block_error: true,
            ..ReaderConfig::default()
        },
    );
    let surviving: Vec<VariantRecord> = reader
        .records()
        .collect::<strata_base::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(surviving.len(), 1);
    assert_eq!(surviving[0].position, 200);
}

#[test]
fn test_encryption_roundtrip_and_tamper() {
    let config = WriterConfig {
        encrypt: true,
        cipher: CipherKind::Aes256Gcm,
        ..WriterConfig::default()
    };
    let genotypes = vec![diploid(0, 1, true), diploid(1, 1, true)];
    let records = vec![snv(100, genotypes.clone())];
    let (bytes, summary) = write_archive(test_header(100_000, 2), records, config);
    assert!(!summary.keychain.is_empty());

    // Without the keychain the block must refuse to decode.
    let mut locked = open_reader(bytes.clone(), ReaderConfig::default());
    let entries = locked.block_entries();
    assert!(matches!(
        locked.block_records(&entries[0]),
        Err(Error::AuthFailure(_))
    ));

    // With it, the record comes back intact.
    let mut keychain_bytes = Vec::new();
    summary.keychain.write_to(&mut keychain_bytes).unwrap();
    let mut reader = open_reader(bytes.clone(), ReaderConfig::default());
    reader.set_keychain(strata_codec::Keychain::read_from(&mut keychain_bytes.as_slice()).unwrap());
    let records = reader.block_records(&entries[0]).unwrap();
    assert_eq!(records[0].genotypes.as_ref().unwrap(), &genotypes);

    // A flipped payload bit fails authentication before decompression.
    let payload_byte = entries[0].byte_offset as usize
        + crate::BlockHeader::SERIALIZED_LEN
        + crate::DataHeader::SERIALIZED_LEN
        + 16;
    let mut tampered = bytes;
    tampered[payload_byte] ^= 0x02;
    let mut reader = open_reader(tampered, ReaderConfig::default());
    reader.set_keychain(strata_codec::Keychain::read_from(&mut keychain_bytes.as_slice()).unwrap());
    let err = reader.block_records(&entries[0]).unwrap_err();
    assert!(matches!(err, Error::AuthFailure(_)));
}

#[test]
fn test_ctr_encryption_roundtrip() {
    let config = WriterConfig {
        encrypt: true,
        cipher: CipherKind::Aes256Ctr,
        ..WriterConfig::default()
    };
    let records = vec![snv(42, vec![diploid(0, 0, false)])];
    let (bytes, summary) = write_archive(test_header(100_000, 1), records.clone(), config);

    let mut reader = open_reader(bytes, ReaderConfig::default());
    let mut keychain_bytes = Vec::new();
    summary.keychain.write_to(&mut keychain_bytes).unwrap();
    reader.set_keychain(strata_codec::Keychain::read_from(&mut keychain_bytes.as_slice()).unwrap());
    let decoded: Vec<VariantRecord> = reader
        .records()
        .collect::<strata_base::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(decoded, records);
}

#[test]
fn test_drop_invariant_sites() {
    let config = WriterConfig {
        drop_invariant_sites: true,
        ..WriterConfig::default()
    };
    let records = vec![
        snv(100, vec![diploid(0, 0, false), diploid(0, -1, false)]),
        snv(200, vec![diploid(0, 1, false), diploid(0, 0, false)]),
    ];
    let (bytes, summary) = write_archive(test_header(100_000, 2), records, config);
    assert_eq!(summary.n_variants, 1);

    let mut reader = open_reader(bytes, ReaderConfig::default());
    let decoded: Vec<VariantRecord> = reader
        .records()
        .collect::<strata_base::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].position, 200);
}

#[test]
fn test_aborted_archive_reports_truncation() {
    let mut writer = VariantWriter::open(Cursor::new(Vec::new()), WriterConfig::default()).unwrap();
    writer.set_header(test_header(100_000, 1)).unwrap();
    writer.push(snv(100, vec![diploid(0, 1, false)])).unwrap();
    let sink = writer.abort().unwrap();

    let err = VariantReader::open(
        Cursor::new(sink.into_inner()),
        ReaderConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::TruncatedArchive(_)));
}

#[test]
fn test_bad_magic_reports_version_mismatch() {
    let err = VariantReader::open(
        Cursor::new(b"NOTSTRATAFILE___padding_padding_".to_vec()),
        ReaderConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::VersionMismatch(_)));
}

#[test]
fn test_sample_order_restoration_is_optional() {
    // Permutation reorders samples; without restoration consumers see
    // permuted order, whose multiset still matches.
    let genotypes = vec![
        diploid(1, 1, false),
        diploid(0, 0, false),
        diploid(0, 0, false),
        diploid(0, 1, false),
    ];
    let records = vec![snv(100, genotypes.clone())];
    let (bytes, _) = write_archive(test_header(100_000, 4), records, WriterConfig::default());

    let mut restored = open_reader(bytes.clone(), ReaderConfig::default());
    let entries = restored.block_entries();
    let back = restored.block_records(&entries[0]).unwrap();
    assert_eq!(back[0].genotypes.as_ref().unwrap(), &genotypes);

    let mut permuted = open_reader(
        bytes,
        ReaderConfig {
            restore_sample_order: false,
            ..ReaderConfig::default()
        },
    );
    let back = permuted.block_records(&entries[0]).unwrap();
    let mut seen = back[0].genotypes.clone().unwrap();
    let mut expected = genotypes;
    seen.sort_by_key(|g| g.alleles.clone());
    expected.sort_by_key(|g| g.alleles.clone());
    assert_eq!(seen, expected);
}
