/*!
Codec for the `secret` attribute type: AES-256-GCM with a PBKDF2-derived
key, 100,000 iterations, random salt and nonce per encryption.

The key material itself (a passphrase or raw key) is sourced by the
embedder (spec.md §1, "secret sourcing" is out of scope) and handed to the
engine once at startup as [`AesKeyMaterial`]; it is never logged, and a
decryption failure never reveals ciphertext (spec.md §7).
*/

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{Error, Result};

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// The raw key material the `secret` codec derives an AES-256 key from.
/// `Debug` is implemented by hand so the key material is never printed.
#[derive(Clone)]
pub struct AesKeyMaterial(Vec<u8>);

impl AesKeyMaterial {
    /// Wrap raw key material bytes (a passphrase or a raw secret).
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        AesKeyMaterial(bytes.into())
    }
}

impl std::fmt::Debug for AesKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AesKeyMaterial(<redacted>)")
    }
}

fn derive_key(material: &AesKeyMaterial, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(&material.0, salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt `plaintext`, producing `base64(salt)|base64(nonce)|base64(ct)|base64(tag)`.
pub fn encrypt(plaintext: &str, material: &AesKeyMaterial) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let key_bytes = derive_key(material, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ciphertext_and_tag = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| Error::CryptoFailure)?;
    let tag = ciphertext_and_tag.split_off(ciphertext_and_tag.len() - TAG_LEN);

    Ok(format!(
        "{}|{}|{}|{}",
        STANDARD.encode(salt),
        STANDARD.encode(nonce_bytes),
        STANDARD.encode(&ciphertext_and_tag),
        STANDARD.encode(&tag),
    ))
}

/// Decrypt a value produced by [`encrypt`]. Any malformed input or
/// authentication failure collapses to [`Error::CryptoFailure`] without
/// revealing which component was at fault.
pub fn decrypt(value: &str, material: &AesKeyMaterial) -> Result<String> {
    let parts: Vec<&str> = value.split('|').collect();
    let [salt_b64, nonce_b64, ct_b64, tag_b64] = parts.as_slice() else {
        return Err(Error::CryptoFailure);
    };

    let salt = STANDARD.decode(salt_b64).map_err(|_| Error::CryptoFailure)?;
    let nonce_bytes = STANDARD
        .decode(nonce_b64)
        .map_err(|_| Error::CryptoFailure)?;
    let mut ciphertext = STANDARD.decode(ct_b64).map_err(|_| Error::CryptoFailure)?;
    let tag = STANDARD.decode(tag_b64).map_err(|_| Error::CryptoFailure)?;
    if nonce_bytes.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(Error::CryptoFailure);
    }
    ciphertext.extend_from_slice(&tag);

    let key_bytes = derive_key(material, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| Error::CryptoFailure)?;
    String::from_utf8(plaintext).map_err(|_| Error::CryptoFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_explicit_decrypt() {
        let material = AesKeyMaterial::new(b"a very secret passphrase".to_vec());
        let plaintext = "4111-1111-1111-1111";
        let encrypted = encrypt(plaintext, &material).unwrap();
        assert_ne!(encrypted, plaintext);
        assert_eq!(decrypt(&encrypted, &material).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails_closed() {
        let material = AesKeyMaterial::new(b"right key".to_vec());
        let wrong = AesKeyMaterial::new(b"wrong key".to_vec());
        let encrypted = encrypt("top secret", &material).unwrap();
        assert!(matches!(decrypt(&encrypted, &wrong), Err(Error::CryptoFailure)));
    }

    #[test]
    fn malformed_input_fails_closed() {
        let material = AesKeyMaterial::new(b"key".to_vec());
        assert!(matches!(decrypt("not-the-right-shape", &material), Err(Error::CryptoFailure)));
    }
}
