//! Password-based AEAD records.
//!
//! Every call to [`seal`] draws a fresh salt and IV, so no two ciphertexts
//! ever share key-stretching or nonce material. The record's purpose is
//! bound as associated data: a mnemonic record can never be opened as a
//! seed record, even with the right password.

use std::fmt;

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::core::errors::WalletError;
use crate::crypto::kdf::{KeyDerivation, KDF_NAME};
use crate::security::SecretVec;

pub const ALGORITHM_ID: &str = "aes-256-gcm";
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// What a ciphertext holds. Bound into the AEAD tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPurpose {
    Seed,
    Mnemonic,
    PrivateKey,
    RecoveryShare,
}

impl KeyPurpose {
    fn aad(&self) -> &'static [u8] {
        match self {
            KeyPurpose::Seed => b"custody-wallet/v1/seed",
            KeyPurpose::Mnemonic => b"custody-wallet/v1/mnemonic",
            KeyPurpose::PrivateKey => b"custody-wallet/v1/private-key",
            KeyPurpose::RecoveryShare => b"custody-wallet/v1/recovery-share",
        }
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KeyPurpose::Seed => "seed",
            KeyPurpose::Mnemonic => "mnemonic",
            KeyPurpose::PrivateKey => "private-key",
            KeyPurpose::RecoveryShare => "recovery-share",
        };
        f.write_str(label)
    }
}

/// One self-contained encryption unit: ciphertext plus the exact salt, IV
/// and tag it was produced with.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionRecord {
    pub purpose: KeyPurpose,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub salt: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub iv: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub auth_tag: Vec<u8>,
    pub algorithm_id: String,
    pub kdf_name: String,
    pub kdf_iterations: u32,
}

impl fmt::Debug for EncryptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionRecord")
            .field("purpose", &self.purpose)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("algorithm_id", &self.algorithm_id)
            .field("kdf_name", &self.kdf_name)
            .field("kdf_iterations", &self.kdf_iterations)
            .finish()
    }
}

/// Encrypt `plaintext` under a key stretched from `password`.
pub fn seal(
    plaintext: &[u8],
    password: &str,
    purpose: KeyPurpose,
    kdf: KeyDerivation,
) -> Result<EncryptionRecord, WalletError> {
    let salt = KeyDerivation::generate_salt();
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let key = kdf.derive_key(password.as_bytes(), &salt);
    let cipher = Aes256Gcm::new_from_slice(&*key)
        .map_err(|_| WalletError::EncryptionError("Failed to create AES cipher".into()))?;

    let mut buffer = Zeroizing::new(plaintext.to_vec());
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), purpose.aad(), &mut *buffer)
        .map_err(|_| WalletError::EncryptionError(format!("Failed to encrypt {}", purpose)))?;

    Ok(EncryptionRecord {
        purpose,
        ciphertext: buffer.to_vec(),
        salt: salt.to_vec(),
        iv: iv.to_vec(),
        auth_tag: tag.to_vec(),
        algorithm_id: ALGORITHM_ID.to_string(),
        kdf_name: KDF_NAME.to_string(),
        kdf_iterations: kdf.iterations(),
    })
}

/// Decrypt a record, expecting it to hold `purpose`.
///
/// Fails with `DecryptionError` on a wrong password, a tampered field, or a
/// purpose mismatch. No plaintext is returned unless the tag verifies.
pub fn open(
    record: &EncryptionRecord,
    password: &str,
    purpose: KeyPurpose,
) -> Result<SecretVec, WalletError> {
    if record.purpose != purpose {
        return Err(WalletError::DecryptionError(format!(
            "record holds {} but {} was requested",
            record.purpose, purpose
        )));
    }
    if record.algorithm_id != ALGORITHM_ID || record.kdf_name != KDF_NAME {
        return Err(WalletError::DecryptionError(format!(
            "unsupported scheme {}/{}",
            record.algorithm_id, record.kdf_name
        )));
    }
    if record.iv.len() != IV_LEN {
        return Err(WalletError::DecryptionError(format!(
            "Invalid IV length: {} (expected {})",
            record.iv.len(),
            IV_LEN
        )));
    }
    if record.auth_tag.len() != TAG_LEN {
        return Err(WalletError::DecryptionError(format!(
            "Invalid auth tag length: {} (expected {})",
            record.auth_tag.len(),
            TAG_LEN
        )));
    }

    let kdf = KeyDerivation::pbkdf2(record.kdf_iterations);
    let key = kdf.derive_key(password.as_bytes(), &record.salt);
    let cipher = Aes256Gcm::new_from_slice(&*key)
        .map_err(|_| WalletError::DecryptionError("Failed to create AES cipher".into()))?;

    let mut buffer = Zeroizing::new(record.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&record.iv),
            purpose.aad(),
            &mut *buffer,
            Tag::from_slice(&record.auth_tag),
        )
        .map_err(|_| {
            WalletError::DecryptionError(
                "Decryption failed: incorrect password or corrupted data".to_string(),
            )
        })?;

    Ok(buffer)
}
