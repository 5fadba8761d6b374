use strata_base::{ByteBuffer, ByteCursor, Error};
use test_log::test;

use crate::{
    codec, decrypt_in_place, encrypt_in_place, generate_material, md5, sha512, CipherKind,
    CodecId, DigestManager, DigestPair, DigestTable, Keychain, KeychainEntry,
};

fn sample_bytes() -> Vec<u8> {
    // Compressible but not degenerate.
    (0u32..2000).flat_map(|i| ((i / 7) as u16).to_le_bytes()).collect()
}

#[test]
fn test_codec_roundtrip() {
    let src = sample_bytes();
    for id in [CodecId::Stored, CodecId::Zstd, CodecId::Lz4] {
        let c = codec(id);
        let mut packed = Vec::new();
        c.compress(&src, &mut packed, 6).unwrap();
        let mut unpacked = Vec::new();
        c.decompress(&packed, &mut unpacked, src.len()).unwrap();
        assert_eq!(unpacked, src, "codec {id:?}");
    }
}

#[test]
fn test_zstd_shrinks_repetitive_input() {
    let src = sample_bytes();
    let mut packed = Vec::new();
    codec(CodecId::Zstd).compress(&src, &mut packed, 6).unwrap();
    assert!(packed.len() < src.len());
}

#[test]
fn test_stored_rejects_length_mismatch() {
    let mut out = Vec::new();
    let err = codec(CodecId::Stored)
        .decompress(b"abc", &mut out, 5)
        .unwrap_err();
    assert!(matches!(err, Error::CodecFailure(_)));
}

#[test]
fn test_digest_widths() {
    assert_eq!(sha512(b"strata").len(), 64);
    assert_eq!(md5(b"strata").len(), 16);
    assert_ne!(sha512(b"a"), sha512(b"b"));
}

#[test]
fn test_digest_table_roundtrip() {
    let mut mgr = DigestManager::new(3);
    let pair = DigestPair::of(b"uncompressed", b"compressed");
    mgr.update_meta(0, &pair);
    mgr.update_meta(1, &pair);
    mgr.update_meta(2, &pair);
    mgr.update_info(17, &pair);
    mgr.update_format(4, &pair);
    let table = mgr.finalize();

    let mut buf = ByteBuffer::new();
    table.write(&mut buf);
    let back = DigestTable::read(&mut ByteCursor::new(buf.as_slice())).unwrap();
    assert_eq!(back, table);
    assert_eq!(back.info[0].0, 17);
    assert_eq!(back.format[0].0, 4);
}

#[test]
fn test_digest_order_sensitivity() {
    // The aggregate commits to per-block digests in order.
    let a = DigestPair::of(b"block0", b"block0c");
    let b = DigestPair::of(b"block1", b"block1c");

    let mut fwd = DigestManager::new(1);
    fwd.update_meta(0, &a);
    fwd.update_meta(0, &b);
    let mut rev = DigestManager::new(1);
    rev.update_meta(0, &b);
    rev.update_meta(0, &a);
    assert_ne!(fwd.finalize().meta[0], rev.finalize().meta[0]);
}

#[test]
fn test_ctr_roundtrip() {
    let (key, nonce) = generate_material();
    let plain = sample_bytes();
    let mut buf = plain.clone();
    let tag = encrypt_in_place(CipherKind::Aes256Ctr, &key, &nonce, &mut buf).unwrap();
    assert_eq!(tag, [0u8; 16]);
    assert_ne!(buf, plain);
    decrypt_in_place(CipherKind::Aes256Ctr, &key, &nonce, &tag, &mut buf).unwrap();
    assert_eq!(buf, plain);
}

#[test]
fn test_gcm_roundtrip_and_tamper() {
    let (key, nonce) = generate_material();
    let plain = sample_bytes();
    let mut buf = plain.clone();
    let tag = encrypt_in_place(CipherKind::Aes256Gcm, &key, &nonce, &mut buf).unwrap();

    let mut ok = buf.clone();
    decrypt_in_place(CipherKind::Aes256Gcm, &key, &nonce, &tag, &mut ok).unwrap();
    assert_eq!(ok, plain);

    // Any single-bit flip must fail authentication.
    let mut tampered = buf.clone();
    tampered[3] ^= 0x10;
    let err =
        decrypt_in_place(CipherKind::Aes256Gcm, &key, &nonce, &tag, &mut tampered).unwrap_err();
    assert!(matches!(err, Error::AuthFailure(_)));
}

#[test]
fn test_keychain_roundtrip() {
    let (key, nonce) = generate_material();
    let chain = Keychain::new();
    chain.push(KeychainEntry {
        block_id: 0,
        column_id: 3,
        cipher: CipherKind::Aes256Gcm,
        key,
        nonce,
        tag: [7u8; 16],
    });
    chain.push(KeychainEntry {
        block_id: 1,
        column_id: 0,
        cipher: CipherKind::Aes256Ctr,
        key,
        nonce,
        tag: [0u8; 16],
    });

    let mut raw = Vec::new();
    chain.write_to(&mut raw).unwrap();
    let back = Keychain::read_from(&mut raw.as_slice()).unwrap();
    assert_eq!(back.len(), 2);
    let entry = back.lookup(0, 3).unwrap();
    assert_eq!(entry.cipher, CipherKind::Aes256Gcm);
    assert_eq!(entry.tag, [7u8; 16]);
    assert!(back.lookup(2, 0).is_none());
}
