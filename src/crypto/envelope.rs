// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passphrase-sealed container for the client local store.
//!
//! The container is self-describing: it carries the KDF name, salt, and
//! iteration count alongside the cipher name, nonce, and ciphertext, so any
//! machine holding the passphrase can open it. A fresh salt and nonce are
//! generated on every `encrypt_bytes` call; nonces are never reused under a
//! derived key.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{CryptoError, Result};

/// Authenticated-but-unencrypted tag binding ciphertexts to this application.
const AAD: &[u8] = b"body-metrics-tracker";

/// Container format version this build reads and writes.
const CONTAINER_VERSION: i64 = 1;

const KDF_NAME: &str = "pbkdf2-sha256";
const CIPHER_NAME: &str = "aes-256-gcm";

/// Default PBKDF2 iteration count for newly written containers.
pub const DEFAULT_KDF_ITERATIONS: u32 = 310_000;

const SALT_BYTES: usize = 16;
const NONCE_BYTES: usize = 12;

/// Key-derivation parameters stored inside the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub name: String,
    /// Base64-encoded 16-byte salt.
    pub salt: String,
    pub iterations: u32,
}

/// Cipher parameters and ciphertext stored inside the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParams {
    pub name: String,
    /// Base64-encoded 12-byte nonce.
    pub nonce: String,
    /// Base64-encoded ciphertext with appended GCM tag.
    pub ciphertext: String,
}

/// The on-disk envelope: `{version, kdf, cipher}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedContainer {
    pub version: i64,
    pub kdf: KdfParams,
    pub cipher: CipherParams,
}

/// Derive a 32-byte key from a passphrase with PBKDF2-HMAC-SHA256.
pub fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> Result<[u8; 32]> {
    if passphrase.is_empty() {
        return Err(CryptoError::EmptyPassphrase);
    }
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);
    Ok(key)
}

/// Seal `plaintext` under `passphrase` with a fresh salt and nonce.
pub fn encrypt_bytes(
    plaintext: &[u8],
    passphrase: &str,
    iterations: u32,
) -> Result<EncryptedContainer> {
    let mut salt = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let key = derive_key(passphrase, &salt, iterations)?;

    let mut nonce_bytes = [0u8; NONCE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: AAD,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedContainer {
        version: CONTAINER_VERSION,
        kdf: KdfParams {
            name: KDF_NAME.to_string(),
            salt: BASE64.encode(salt),
            iterations,
        },
        cipher: CipherParams {
            name: CIPHER_NAME.to_string(),
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(&ciphertext),
        },
    })
}

/// Open a container with `passphrase`, re-deriving the key from the stored
/// parameters.
///
/// Unknown versions or algorithm names fail with a distinct error before any
/// key derivation happens; an AEAD tag mismatch maps to
/// [`CryptoError::DecryptionFailed`].
pub fn decrypt_bytes(container: &EncryptedContainer, passphrase: &str) -> Result<Vec<u8>> {
    if container.version != CONTAINER_VERSION {
        return Err(CryptoError::UnsupportedVersion(container.version));
    }
    if container.kdf.name != KDF_NAME || container.cipher.name != CIPHER_NAME {
        return Err(CryptoError::UnsupportedAlgorithm);
    }

    let salt = BASE64
        .decode(&container.kdf.salt)
        .map_err(|_| CryptoError::InvalidContainer)?;
    let nonce_bytes = BASE64
        .decode(&container.cipher.nonce)
        .map_err(|_| CryptoError::InvalidContainer)?;
    let ciphertext = BASE64
        .decode(&container.cipher.ciphertext)
        .map_err(|_| CryptoError::InvalidContainer)?;
    if nonce_bytes.len() != NONCE_BYTES {
        return Err(CryptoError::InvalidContainer);
    }

    let key = derive_key(passphrase, &salt, container.kdf.iterations)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: ciphertext.as_slice(),
                aad: AAD,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low iteration count keeps the suite fast; production callers use
    // DEFAULT_KDF_ITERATIONS.
    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn round_trip_recovers_plaintext() {
        let container = encrypt_bytes(b"hello vault", "passphrase", TEST_ITERATIONS).unwrap();
        let plaintext = decrypt_bytes(&container, "passphrase").unwrap();
        assert_eq!(plaintext, b"hello vault");
    }

    #[test]
    fn decryption_is_idempotent() {
        let container = encrypt_bytes(b"stable bytes", "pw", TEST_ITERATIONS).unwrap();
        let first = decrypt_bytes(&container, "pw").unwrap();
        let second = decrypt_bytes(&container, "pw").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn wrong_passphrase_fails_closed() {
        let container = encrypt_bytes(b"secret", "right", TEST_ITERATIONS).unwrap();
        let err = decrypt_bytes(&container, "wrong").unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn empty_passphrase_rejected() {
        let err = encrypt_bytes(b"data", "", TEST_ITERATIONS).unwrap_err();
        assert!(matches!(err, CryptoError::EmptyPassphrase));
    }

    #[test]
    fn fresh_salt_and_nonce_every_call() {
        let a = encrypt_bytes(b"same input", "pw", TEST_ITERATIONS).unwrap();
        let b = encrypt_bytes(b"same input", "pw", TEST_ITERATIONS).unwrap();
        assert_ne!(a.kdf.salt, b.kdf.salt);
        assert_ne!(a.cipher.nonce, b.cipher.nonce);
        assert_ne!(a.cipher.ciphertext, b.cipher.ciphertext);
    }

    #[test]
    fn unsupported_version_is_distinct_error() {
        let mut container = encrypt_bytes(b"data", "pw", TEST_ITERATIONS).unwrap();
        container.version = 2;
        let err = decrypt_bytes(&container, "pw").unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedVersion(2)));
    }

    #[test]
    fn unknown_algorithm_names_rejected() {
        let mut container = encrypt_bytes(b"data", "pw", TEST_ITERATIONS).unwrap();
        container.kdf.name = "scrypt".to_string();
        let err = decrypt_bytes(&container, "pw").unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedAlgorithm));

        let mut container = encrypt_bytes(b"data", "pw", TEST_ITERATIONS).unwrap();
        container.cipher.name = "chacha20-poly1305".to_string();
        let err = decrypt_bytes(&container, "pw").unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedAlgorithm));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let container = encrypt_bytes(b"integrity matters", "pw", TEST_ITERATIONS).unwrap();
        let mut raw = BASE64.decode(&container.cipher.ciphertext).unwrap();
        raw[0] ^= 0xFF;
        let tampered = EncryptedContainer {
            cipher: CipherParams {
                ciphertext: BASE64.encode(&raw),
                ..container.cipher.clone()
            },
            ..container
        };
        let err = decrypt_bytes(&tampered, "pw").unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn garbage_base64_is_invalid_container() {
        let mut container = encrypt_bytes(b"data", "pw", TEST_ITERATIONS).unwrap();
        container.kdf.salt = "not base64 !!!".to_string();
        let err = decrypt_bytes(&container, "pw").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidContainer));
    }

    #[test]
    fn derive_key_is_deterministic() {
        let salt = [7u8; 16];
        let a = derive_key("pw", &salt, TEST_ITERATIONS).unwrap();
        let b = derive_key("pw", &salt, TEST_ITERATIONS).unwrap();
        assert_eq!(a, b);

        let c = derive_key("other", &salt, TEST_ITERATIONS).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn container_serializes_with_expected_field_names() {
        let container = encrypt_bytes(b"data", "pw", TEST_ITERATIONS).unwrap();
        let json = serde_json::to_value(&container).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["kdf"]["name"], "pbkdf2-sha256");
        assert_eq!(json["cipher"]["name"], "aes-256-gcm");
        assert!(json["kdf"]["salt"].is_string());
        assert!(json["cipher"]["nonce"].is_string());
    }
}
