// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server-side key hierarchy and payload sealing.
//!
//! The vault is configured with a single 32-byte master key; every user's
//! rows are encrypted under an HKDF-SHA256 sub-key whose info string binds
//! the key to that `user_id`. Compromise of one user's sub-key does not
//! reveal any other user's data, and the database file alone reveals
//! nothing.
//!
//! Rotating the master key requires re-deriving every sub-key and
//! re-encrypting all rows; there is no incremental rotation.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

use super::{CryptoError, Result};

/// Authenticated tag for vault payloads; also the HKDF info prefix.
const AAD_PREFIX: &[u8] = b"body-metrics-vault";

const NONCE_BYTES: usize = 12;

/// Parse `VAULT_MASTER_KEY` into raw key bytes.
///
/// Accepts base64 or hex; anything that does not decode to exactly 32 bytes
/// is rejected.
pub fn load_master_key(raw: &str) -> Result<[u8; 32]> {
    if raw.is_empty() {
        return Err(CryptoError::InvalidMasterKey(
            "VAULT_MASTER_KEY is required for persistent storage".to_string(),
        ));
    }

    let decoded = BASE64
        .decode(raw)
        .ok()
        .or_else(|| decode_hex(raw))
        .ok_or_else(|| {
            CryptoError::InvalidMasterKey(
                "VAULT_MASTER_KEY must be 32 bytes (base64 or hex)".to_string(),
            )
        })?;

    <[u8; 32]>::try_from(decoded.as_slice()).map_err(|_| {
        CryptoError::InvalidMasterKey(
            "VAULT_MASTER_KEY must be 32 bytes (base64 or hex)".to_string(),
        )
    })
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&raw[i..i + 2], 16).ok())
        .collect()
}

/// Derive the per-user sub-key: HKDF-SHA256, no salt, info bound to the
/// user id.
pub fn derive_user_key(master_key: &[u8; 32], user_id: Uuid) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, master_key);
    let mut info = AAD_PREFIX.to_vec();
    info.extend_from_slice(user_id.to_string().as_bytes());
    let mut key = [0u8; 32];
    // Expand cannot fail for a 32-byte output with SHA-256.
    hk.expand(&info, &mut key)
        .expect("HKDF expand with 32-byte output");
    key
}

/// Seal a JSON payload under a user key; returns base64 of `nonce || ciphertext`.
pub fn encrypt_payload(payload: &serde_json::Value, user_key: &[u8; 32]) -> Result<String> {
    let plaintext = serde_json::to_vec(payload).map_err(|_| CryptoError::InvalidContainer)?;

    let mut nonce_bytes = [0u8; NONCE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(user_key));
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext.as_slice(),
                aad: AAD_PREFIX,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(&blob))
}

/// Open a sealed payload back into JSON.
pub fn decrypt_payload(blob: &str, user_key: &[u8; 32]) -> Result<serde_json::Value> {
    let raw = BASE64
        .decode(blob)
        .map_err(|_| CryptoError::InvalidContainer)?;
    if raw.len() <= NONCE_BYTES {
        return Err(CryptoError::InvalidContainer);
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_BYTES);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(user_key));
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: AAD_PREFIX,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;

    serde_json::from_slice(&plaintext).map_err(|_| CryptoError::InvalidContainer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn test_master_key() -> [u8; 32] {
        [0x42u8; 32]
    }

    #[test]
    fn master_key_parses_base64_and_hex() {
        let key = test_master_key();
        let from_b64 = load_master_key(&STANDARD.encode(key)).unwrap();
        assert_eq!(from_b64, key);

        let hex: String = key.iter().map(|b| format!("{b:02x}")).collect();
        let from_hex = load_master_key(&hex).unwrap();
        assert_eq!(from_hex, key);
    }

    #[test]
    fn master_key_rejects_bad_input() {
        assert!(matches!(
            load_master_key(""),
            Err(CryptoError::InvalidMasterKey(_))
        ));
        assert!(matches!(
            load_master_key("too-short"),
            Err(CryptoError::InvalidMasterKey(_))
        ));
        // 16 bytes decodes fine but is the wrong length.
        assert!(matches!(
            load_master_key(&STANDARD.encode([1u8; 16])),
            Err(CryptoError::InvalidMasterKey(_))
        ));
    }

    #[test]
    fn user_keys_are_independent_per_user() {
        let master = test_master_key();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        assert_ne!(derive_user_key(&master, user_a), derive_user_key(&master, user_b));
        // Deterministic for the same user.
        assert_eq!(derive_user_key(&master, user_a), derive_user_key(&master, user_a));
    }

    #[test]
    fn payload_round_trip() {
        let key = derive_user_key(&test_master_key(), Uuid::new_v4());
        let payload = serde_json::json!({"weight_kg": 70.2, "version": 1});
        let blob = encrypt_payload(&payload, &key).unwrap();
        let opened = decrypt_payload(&blob, &key).unwrap();
        assert_eq!(opened, payload);
    }

    #[test]
    fn payload_under_wrong_user_key_fails() {
        let master = test_master_key();
        let key_a = derive_user_key(&master, Uuid::new_v4());
        let key_b = derive_user_key(&master, Uuid::new_v4());
        let blob = encrypt_payload(&serde_json::json!({"x": 1}), &key_a).unwrap();
        assert!(matches!(
            decrypt_payload(&blob, &key_b),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn truncated_blob_rejected() {
        let key = derive_user_key(&test_master_key(), Uuid::new_v4());
        let short = STANDARD.encode([0u8; 8]);
        assert!(matches!(
            decrypt_payload(&short, &key),
            Err(CryptoError::InvalidContainer)
        ));
    }
}
