//! AES-256-CTR payload encryption. No authentication tag is produced here —
//! integrity is the checksum's job (see `codec`), encryption is only for
//! confidentiality, matching spec's split between "checksum" and "cipher".

use crate::IV_SIZE;
use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes256;
use ctr::Ctr128BE;
use rand::RngCore;

type Aes256Ctr = Ctr128BE<Aes256>;

/// Encrypts `plain` in place into a freshly allocated buffer of the same
/// length (CTR mode is a stream cipher: ciphertext length == plaintext
/// length, no padding).
#[inline]
pub fn encrypt(plain: &[u8], key: &[u8; 32], iv: &[u8; IV_SIZE]) -> Vec<u8> {
    let mut buf = plain.to_vec();
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(&mut buf);
    buf
}

/// Decrypts `cipher` in place into a freshly allocated buffer of the same
/// length. CTR mode is its own inverse: this calls the same keystream
/// application as `encrypt`.
#[inline]
pub fn decrypt(cipher: &[u8], key: &[u8; 32], iv: &[u8; IV_SIZE]) -> Vec<u8> {
    encrypt(cipher, key, iv)
}

/// Draws a fresh, cryptographically random IV. Drawing one per packet is
/// what keeps two encryptions of identical plaintext from producing
/// identical ciphertext (see `codec`'s IV-uniqueness test).
#[inline]
pub fn random_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}
