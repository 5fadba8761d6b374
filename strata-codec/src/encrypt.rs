//! Symmetric ciphers wrapping the compressed column payloads.
//!
//! Key and nonce material is generated per container and handed to the
//! keychain; nothing here persists keys. GCM tags are detached and travel
//! in the keychain entry rather than the payload.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes256;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use strata_base::{Error, Result};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

pub const KEY_WIDTH: usize = 32;
pub const NONCE_WIDTH: usize = 16;
pub const TAG_WIDTH: usize = 16;

// GCM nonces are 96 bits; the keychain stores the full 16-byte field and
// GCM uses only the leading 12 bytes of it.
const GCM_NONCE_WIDTH: usize = 12;

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum CipherKind {
    #[default]
    None = 0,
    Aes256Ctr = 1,
    Aes256Gcm = 2,
}

impl CipherKind {
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(CipherKind::None),
            1 => Ok(CipherKind::Aes256Ctr),
            2 => Ok(CipherKind::Aes256Gcm),
            other => Err(Error::version(format!("unknown cipher id {other}"))),
        }
    }
}

/// Fresh (key, nonce) material for one container.
pub fn generate_material() -> ([u8; KEY_WIDTH], [u8; NONCE_WIDTH]) {
    let mut key = [0u8; KEY_WIDTH];
    let mut nonce = [0u8; NONCE_WIDTH];
    OsRng.fill_bytes(&mut key);
    OsRng.fill_bytes(&mut nonce);
    (key, nonce)
}

/// Encrypts `buf` in place and returns the authentication tag (zero for
/// the unauthenticated CTR mode).
pub fn encrypt_in_place(
    kind: CipherKind,
    key: &[u8; KEY_WIDTH],
    nonce: &[u8; NONCE_WIDTH],
    buf: &mut Vec<u8>,
) -> Result<[u8; TAG_WIDTH]> {
    match kind {
        CipherKind::None => Ok([0; TAG_WIDTH]),
        CipherKind::Aes256Ctr => {
            let mut cipher = Aes256Ctr::new(key.into(), nonce.into());
            cipher.apply_keystream(buf);
            Ok([0; TAG_WIDTH])
        }
        CipherKind::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.into());
            let nonce = Nonce::from_slice(&nonce[..GCM_NONCE_WIDTH]);
            let tag = cipher
                .encrypt_in_place_detached(nonce, &[], buf)
                .map_err(|_| Error::codec("aes-256-gcm encrypt failed"))?;
            let mut out = [0u8; TAG_WIDTH];
            out.copy_from_slice(&tag);
            Ok(out)
        }
    }
}

/// Decrypts `buf` in place; verifies the tag first under GCM.
pub fn decrypt_in_place(
    kind: CipherKind,
    key: &[u8; KEY_WIDTH],
    nonce: &[u8; NONCE_WIDTH],
    tag: &[u8; TAG_WIDTH],
    buf: &mut Vec<u8>,
) -> Result<()> {
    match kind {
        CipherKind::None => Ok(()),
        CipherKind::Aes256Ctr => {
            let mut cipher = Aes256Ctr::new(key.into(), nonce.into());
            cipher.apply_keystream(buf);
            Ok(())
        }
        CipherKind::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.into());
            let nonce = Nonce::from_slice(&nonce[..GCM_NONCE_WIDTH]);
            cipher
                .decrypt_in_place_detached(nonce, &[], buf, Tag::from_slice(tag))
                .map_err(|_| Error::auth("aes-256-gcm tag did not verify"))
        }
    }
}
