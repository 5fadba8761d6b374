//! Byte-in/byte-out adapters the block pipeline runs every column through:
//! compression codecs, symmetric ciphers, and cryptographic digests, plus
//! the append-only keychain that holds per-column encryption material.

mod compress;
mod digest;
mod encrypt;
mod keychain;

pub use compress::{codec, Codec, CodecId};
pub use digest::{md5, sha512, ColumnDigest, DigestManager, DigestPair, DigestTable, FieldKind};
pub use encrypt::{decrypt_in_place, encrypt_in_place, generate_material, CipherKind};
pub use keychain::{Keychain, KeychainEntry};

#[cfg(test)]
mod test;
