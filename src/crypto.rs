//! Passphrase locking for post content.
//!
//! Layout of a locked value: base64(salt[16] || nonce[12] || ciphertext || tag[16]).
//! The key is PBKDF2-HMAC-SHA256 over the passphrase with the stored salt.

use std::num::NonZeroU32;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("wrong key")]
    WrongKey,
    #[error("content is not encrypted data")]
    Malformed,
    #[error("cipher failure")]
    Internal,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<LessSafeKey, CryptoError> {
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).ok_or(CryptoError::Internal)?;
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations, salt, passphrase.as_bytes(), &mut key);
    let unbound = UnboundKey::new(&AES_256_GCM, &key).map_err(|_| CryptoError::Internal)?;
    Ok(LessSafeKey::new(unbound))
}

pub fn lock(plaintext: &str, passphrase: &str) -> Result<String, CryptoError> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut salt).map_err(|_| CryptoError::Internal)?;
    rng.fill(&mut nonce).map_err(|_| CryptoError::Internal)?;

    let key = derive_key(passphrase, &salt)?;
    let mut sealed = plaintext.as_bytes().to_vec();
    key.seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut sealed)
        .map_err(|_| CryptoError::Internal)?;

    let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + sealed.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(STANDARD.encode(out))
}

pub fn unlock(locked: &str, passphrase: &str) -> Result<String, CryptoError> {
    let raw = STANDARD.decode(locked.trim()).map_err(|_| CryptoError::Malformed)?;
    if raw.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Malformed);
    }
    let (salt, rest) = raw.split_at(SALT_LEN);
    let (nonce, sealed) = rest.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| CryptoError::Malformed)?;

    let key = derive_key(passphrase, salt)?;
    let mut buf = sealed.to_vec();
    let plain = key
        .open_in_place(nonce, Aad::empty(), &mut buf)
        .map_err(|_| CryptoError::WrongKey)?;
    String::from_utf8(plain.to_vec()).map_err(|_| CryptoError::Malformed)
}
