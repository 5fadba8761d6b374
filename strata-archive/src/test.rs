use strata_base::{ByteBuffer, ByteCursor, Error};
use strata_codec::CodecId;
use test_log::test;

use crate::container::DataContainer;
use crate::footer::ArchiveFooter;
use crate::header::{ArchiveHeader, FieldType};
use crate::index::{ContigIndex, IndexEntry, VariantIndex};
use crate::pattern::PatternDictionary;
use crate::stats::CompressionStats;
use crate::{magic, MetaColumn, TypeTag};

pub(crate) mod pipeline;

fn compressed_roundtrip(mut container: DataContainer) -> DataContainer {
    container.finalize().unwrap();
    container.compress(CodecId::Zstd, 6).unwrap();
    let mut buf = ByteBuffer::new();
    container.write(&mut buf);
    let mut back = DataContainer::read(&mut ByteCursor::new(buf.as_slice())).unwrap();
    back.decompress().unwrap();
    back
}

#[test]
fn test_container_narrowing_roundtrip() {
    let mut c = DataContainer::new(-1);
    for v in [1i32, -7, 100, 42] {
        c.append(v).unwrap();
    }
    let back = compressed_roundtrip(c);
    // Values all fit i8, so the payload narrows; sign is preserved.
    assert_eq!(back.header().type_tag, TypeTag::I8);
    assert_eq!(back.read_integers().unwrap(), vec![1, -7, 100, 42]);
}

#[test]
fn test_container_uniform_collapse() {
    let mut c = DataContainer::new(-1);
    for _ in 0..500 {
        c.append(7_i32).unwrap();
    }
    let back = compressed_roundtrip(c);
    assert!(back.header().uniform());
    // Uniform forbids narrowing: the single stored entry keeps its type.
    assert_eq!(back.header().type_tag, TypeTag::I32);
    assert_eq!(back.read_integers().unwrap(), vec![7; 500]);
}

#[test]
fn test_container_variable_stride_roundtrip() {
    let mut c = DataContainer::new(3);
    for s in ["chr1", "contig-with-a-long-name", ""] {
        c.append_chars(s.as_bytes()).unwrap();
        c.add_stride(s.len() as u32).unwrap();
    }
    let back = compressed_roundtrip(c);
    assert!(back.header().variable_stride());
    assert_eq!(back.entry_strides().unwrap(), vec![4, 23, 0]);
    assert_eq!(back.header().global_key, 3);
    let bytes = back.read_bytes().unwrap();
    assert_eq!(&bytes, b"chr1contig-with-a-long-name");
}

#[test]
fn test_container_mixed_types_rejected() {
    let mut c = DataContainer::new(-1);
    c.append(1_i32).unwrap();
    assert!(matches!(
        c.append(1.0_f32),
        Err(Error::SchemaMismatch(_))
    ));
}

#[test]
fn test_container_tamper_detection() {
    let mut c = DataContainer::new(-1);
    for v in 0..256i32 {
        c.append(v * 1000).unwrap();
    }
    c.finalize().unwrap();
    c.compress(CodecId::Zstd, 6).unwrap();
    let mut buf = ByteBuffer::new();
    c.write(&mut buf);

    let mut bytes = buf.as_slice().to_vec();
    let payload_start = crate::container::DataHeader::SERIALIZED_LEN + 16;
    bytes[payload_start + 4] ^= 0x01;
    let mut back = DataContainer::read(&mut ByteCursor::new(&bytes)).unwrap();
    assert!(matches!(
        back.decompress(),
        Err(Error::ChecksumMismatch(_))
    ));
}

#[test]
fn test_container_header_tamper_detection() {
    let mut c = DataContainer::new(-1);
    c.append(5_u16).unwrap();
    c.finalize().unwrap();
    c.compress(CodecId::Zstd, 6).unwrap();
    let mut buf = ByteBuffer::new();
    c.write(&mut buf);

    let mut bytes = buf.as_slice().to_vec();
    bytes[3] ^= 0x80;
    assert!(matches!(
        DataContainer::read(&mut ByteCursor::new(&bytes)),
        Err(Error::ChecksumMismatch(_))
    ));
}

#[test]
fn test_pattern_dedup_and_reserved_empty() {
    let mut dict = PatternDictionary::new();
    assert_eq!(dict.intern(&[]).unwrap(), 0);
    let a = dict.intern(&[3, 1, 2]).unwrap();
    let b = dict.intern(&[1, 2, 3]).unwrap();
    assert_eq!(a, b);
    let c = dict.intern(&[1, 2]).unwrap();
    assert_ne!(a, c);
    assert_eq!(dict.get(a).unwrap(), &[1, 2, 3]);
    assert_eq!(dict.len(), 3);

    let mut buf = ByteBuffer::new();
    dict.write(&mut buf);
    let back = PatternDictionary::read(&mut ByteCursor::new(buf.as_slice())).unwrap();
    assert_eq!(back.get(a).unwrap(), &[1, 2, 3]);
    assert_eq!(back.get(0).unwrap(), &[] as &[u32]);
}

#[test]
fn test_index_levels_and_query() {
    let mut index = ContigIndex::new(0, 400_000);
    assert!(index.levels >= 1 && index.levels <= 7);
    let bin0 = index.add(0, 0, 99_999);
    let bin1 = index.add(1, 100_000, 199_999);
    index.add(2, 200_000, 299_999);
    index.add(3, 300_000, 399_999);
    assert_ne!(bin0, bin1);

    let hits = index.query(150_000, 250_000);
    assert!(hits.contains(&1));
    assert!(hits.contains(&2));
}

#[test]
fn test_index_add_dedups_last_id() {
    let mut index = ContigIndex::new(0, 1_000_000);
    let bin_a = index.add(7, 10, 10);
    let bin_b = index.add(7, 11, 11);
    if bin_a == bin_b {
        // Same bin twice must not duplicate the id.
        assert_eq!(index.query(10, 11), vec![7]);
    }
}

#[test]
fn test_variant_index_exact_filtering() {
    let mut index = VariantIndex::setup(&[crate::ContigDescriptor {
        id: 0,
        name: "chr1".into(),
        length: 400_000,
    }]);
    for (block, range) in [(0u32, (0u64, 99_999u64)), (1, (100_000, 199_999)),
                           (2, (200_000, 299_999)), (3, (300_000, 399_999))] {
        index.add_record(0, range.0, range.0, block).unwrap();
        index.add_record(0, range.1, range.1, block).unwrap();
        index
            .push_block(IndexEntry {
                block_id: block as u64,
                contig: 0,
                n_variants: 2,
                byte_offset: 0,
                byte_offset_end: 1,
                min_position: range.0,
                max_position: range.1,
                min_bin: 0,
                max_bin: 0,
            })
            .unwrap();
    }

    let hits = index.query(0, 150_000, 250_000).unwrap();
    let ids: Vec<u64> = hits.iter().map(|e| e.block_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_index_serialization_roundtrip() {
    let mut index = VariantIndex::setup(&[
        crate::ContigDescriptor {
            id: 0,
            name: "chr1".into(),
            length: 400_000,
        },
        crate::ContigDescriptor {
            id: 1,
            name: "chr2".into(),
            length: 50_000,
        },
    ]);
    index.add_record(0, 1000, 1000, 0).unwrap();
    index.add_record(1, 2000, 2100, 1).unwrap();
    index
        .push_block(IndexEntry {
            block_id: 0,
            contig: 0,
            n_variants: 1,
            byte_offset: 10,
            byte_offset_end: 20,
            min_position: 1000,
            max_position: 1000,
            min_bin: 0,
            max_bin: 0,
        })
        .unwrap();
    index
        .push_block(IndexEntry {
            block_id: 1,
            contig: 1,
            n_variants: 1,
            byte_offset: 20,
            byte_offset_end: 30,
            min_position: 2000,
            max_position: 2100,
            min_bin: 0,
            max_bin: 0,
        })
        .unwrap();

    let mut buf = ByteBuffer::new();
    index.write(&mut buf);
    let back = VariantIndex::read(&mut ByteCursor::new(buf.as_slice())).unwrap();
    assert_eq!(back.n_blocks(), 2);
    assert_eq!(back.linear_entries(), index.linear_entries());
    assert_eq!(back.query(0, 1000, 1000).unwrap().len(), 1);
}

#[test]
fn test_header_text_roundtrip() {
    let mut header = ArchiveHeader::new();
    header.add_contig("chr1", 248_956_422);
    header.add_contig("chrM", 16_569);
    header.add_sample("NA12878");
    header.add_sample("NA12891");
    header.add_info("DP", FieldType::Integer);
    header.add_info("AF", FieldType::Float);
    header.add_format("GQ", FieldType::Integer);
    header.add_filter("PASS");
    header.add_filter("LowQual");
    header.add_literal("source=unit-test");

    let mut sink = Vec::new();
    header.write_to(&mut sink, 6).unwrap();
    let back = ArchiveHeader::read_from(&mut sink.as_slice()).unwrap();
    assert_eq!(back, header);
    assert_eq!(back.contig_id("chrM"), Some(1));
    assert_eq!(back.info_field(1).unwrap().name, "AF");
    assert_eq!(back.filter_field(1).unwrap().name, "LowQual");
}

#[test]
fn test_footer_roundtrip_and_validation() {
    let footer = ArchiveFooter {
        offset_end_of_data: 4096,
        n_blocks: 3,
        n_variants: 2999,
        ..ArchiveFooter::default()
    };
    let mut buf = ByteBuffer::new();
    footer.write(&mut buf);
    assert_eq!(buf.len(), magic::FOOTER_LENGTH);
    let back = ArchiveFooter::read(&mut ByteCursor::new(buf.as_slice())).unwrap();
    assert_eq!(back, footer);
    back.validate().unwrap();

    let mut damaged = back;
    damaged.eof_marker[0] ^= 0xff;
    assert!(matches!(
        damaged.validate(),
        Err(Error::TruncatedArchive(_))
    ));
}

#[test]
fn test_stats_accounting() {
    let mut a = CompressionStats::new();
    a.add_meta(MetaColumn::Position, 100, 40);
    a.add_info(50, 25);
    let mut b = CompressionStats::new();
    b.add_meta(MetaColumn::Position, 10, 5);
    b.add_format(8, 8);
    a.merge(&b);
    assert_eq!(a.total_uncompressed(), 168);
    assert_eq!(a.total_compressed(), 78);

    let mut sink = Vec::new();
    a.write_to(&mut sink).unwrap();
    let back = CompressionStats::read_from(&mut sink.as_slice()).unwrap();
    assert_eq!(back, a);
}
