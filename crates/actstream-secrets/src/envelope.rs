//! Encrypted-at-rest envelope for the credential vault (spec §4.2, §9).
//!
//! Resolves §9's flagged Open Question in favor of the salted,
//! IV-prefixed scheme: each encrypted file is `salt(16) || iv(16) ||
//! ciphertext`, where the AES-256 key is derived from
//! `VAULT_ENCRYPTION_KEY` via PBKDF2-HMAC-SHA256 with 100,000 iterations.
//! The deprecated unsalted derivation is never implemented here, not even
//! behind a flag.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use actstream_error::CoreError;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;
const PBKDF2_ROUNDS: u32 = 100_000;
const KEY_LEN: usize = 32;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

/// The PBKDF2 password, wrapped so it is never logged and is zeroed on
/// drop.
#[derive(Clone)]
pub struct VaultKey(Vec<u8>);

impl VaultKey {
    #[must_use]
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self(password.into())
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(***)")
    }
}

fn derive_key(password: &[u8], salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0_u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ROUNDS, &mut key);
    key
}

/// Encrypts `plaintext` with a fresh random salt and IV, returning the
/// `salt || iv || ciphertext` envelope.
pub fn encrypt(plaintext: &[u8], key: &VaultKey) -> Vec<u8> {
    let mut salt = [0_u8; SALT_LEN];
    let mut iv = [0_u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let derived = derive_key(&key.0, &salt);
    let ciphertext = Encryptor::new(&derived.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut envelope = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    envelope
}

/// Decrypts an envelope produced by [`encrypt`].
pub fn decrypt(envelope: &[u8], key: &VaultKey) -> actstream_error::Result<Vec<u8>> {
    if envelope.len() < SALT_LEN + IV_LEN {
        return Err(CoreError::internal("credential envelope is truncated"));
    }
    let (salt, rest) = envelope.split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);

    let derived = derive_key(&key.0, salt);
    Decryptor::new(&derived.into(), iv.try_into().expect("iv is 16 bytes"))
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CoreError::internal_with_source("credential envelope decryption failed", InvalidPadding(e.to_string())))
}

#[derive(Debug, thiserror::Error)]
#[error("invalid padding: {0}")]
struct InvalidPadding(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_envelope() {
        let key = VaultKey::new("correct horse battery staple");
        let plaintext = b"s3cret-password-value";
        let envelope = encrypt(plaintext, &key);
        assert!(envelope.len() > SALT_LEN + IV_LEN);
        let decrypted = decrypt(&envelope, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key = VaultKey::new("right-key");
        let wrong_key = VaultKey::new("wrong-key");
        let envelope = encrypt(b"payload", &key);
        assert!(decrypt(&envelope, &wrong_key).is_err());
    }

    #[test]
    fn each_encryption_uses_a_fresh_salt_and_iv() {
        let key = VaultKey::new("shared-key");
        let a = encrypt(b"same-plaintext", &key);
        let b = encrypt(b"same-plaintext", &key);
        assert_ne!(a, b, "salt/IV must differ across calls");
    }
}
