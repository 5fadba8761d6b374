//! Every format constant lives here; nothing in the archive layout is
//! defined anywhere else.

pub const FILE_MAGIC: [u8; 8] = *b"STRATA\x01\x00";

pub const VERSION_MAJOR: i32 = 0;
pub const VERSION_MINOR: i32 = 1;
pub const VERSION_PATCH: i32 = 0;
pub const VERSION_NUMBER: i32 = VERSION_MAJOR * 100 * 100 + VERSION_MINOR * 100 + VERSION_PATCH;

pub fn version_string() -> String {
    format!("{VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_PATCH}")
}

/// End-of-block sentinel, ASCII "STRABLKE" packed big-endian.
pub const BLOCK_EOF: u64 = 0x5354_5241_424c_4b45;

/// 32-byte end-of-file marker carried in the footer.
pub const FILE_EOF: [u8; 32] = [
    0x9e, 0x5c, 0x21, 0xd4, 0x53, 0x54, 0x52, 0x41, 0x74, 0x61, 0x0b, 0xe2, 0x8a, 0x17, 0x4c,
    0x03, 0xfd, 0x30, 0xab, 0x6b, 0x5a, 0x0d, 0x9c, 0xc4, 0x41, 0x52, 0x43, 0x48, 0x66, 0x29,
    0xe0, 0x7f,
];

/// Fixed footer length: end-of-data offset, block count, variant count,
/// controller, EOF marker.
pub const FOOTER_LENGTH: usize = 8 + 8 + 8 + 2 + 32;

/// Alleles eligible for the packed ref/alt byte. A biallelic site whose
/// ref and alt both match gets a single meta byte instead of string
/// storage: 4-bit codes, alt in the high nibble.
pub const PACKED_ALLELES: [&str; 7] = ["A", "T", "G", "C", "N", ".", "<NON_REF>"];

pub fn packed_allele_code(allele: &str) -> Option<u8> {
    PACKED_ALLELES
        .iter()
        .position(|&a| a == allele)
        .map(|i| i as u8)
}

pub fn packed_allele_str(code: u8) -> Option<&'static str> {
    PACKED_ALLELES.get(code as usize).copied()
}

/// True when the allele is a single canonical base (a "simple SNV" allele).
pub fn is_snv_allele(allele: &str) -> bool {
    allele.len() == 1 && matches!(allele.as_bytes()[0], b'A' | b'T' | b'G' | b'C' | b'N')
}
