//! Shamir secret sharing over the prime field GF(2^521 - 1).
//!
//! The secret is read as a big-endian integer and used as the constant term
//! of a random polynomial of degree `threshold - 1`. Share `i` is the
//! polynomial evaluated at `x = i`. Reconstruction is Lagrange interpolation
//! at `x = 0`; every operation, including the interpolation denominators, is
//! reduced modulo the prime, with division done through the modular inverse.
//!
//! The modulus is the Mersenne prime M521, so any secret of up to 65 bytes
//! (a 64-byte BIP39 seed included) is a field element.

use std::collections::HashSet;
use std::fmt;

use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::core::errors::WalletError;
use crate::crypto::encryption::{self, EncryptionRecord, KeyPurpose};
use crate::crypto::kdf::KeyDerivation;
use crate::security::SecretVec;

/// Bytes needed to hold a field element.
pub const FIELD_BYTES: usize = 66;
/// Largest secret that is guaranteed to be smaller than the modulus.
pub const MAX_SECRET_LEN: usize = 65;

fn prime() -> BigUint {
    (BigUint::from(1u8) << 521usize) - BigUint::from(1u8)
}

/// A plaintext share. The value is zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct RawShare {
    pub index: u8,
    pub threshold: u8,
    pub total_shares: u8,
    /// Length of the original secret, so leading zero bytes survive.
    pub secret_len: u16,
    pub value: SecretVec,
}

impl fmt::Debug for RawShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawShare")
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("total_shares", &self.total_shares)
            .finish_non_exhaustive()
    }
}

/// Uniform field element in `[0, p)` by rejection sampling 521-bit candidates.
fn random_field_element(p: &BigUint) -> BigUint {
    let mut buf = Zeroizing::new([0u8; FIELD_BYTES]);
    loop {
        OsRng.fill_bytes(&mut *buf);
        buf[0] &= 0x01;
        let candidate = BigUint::from_bytes_be(&*buf);
        if &candidate < p {
            return candidate;
        }
    }
}

fn to_field_bytes(value: &BigUint) -> SecretVec {
    let raw = Zeroizing::new(value.to_bytes_be());
    let mut out = vec![0u8; FIELD_BYTES];
    out[FIELD_BYTES - raw.len()..].copy_from_slice(&raw);
    Zeroizing::new(out)
}

/// Horner evaluation of `coeffs[0] + coeffs[1]·x + …` modulo `p`.
fn eval_poly_at(coeffs: &[BigUint], x: &BigUint, p: &BigUint) -> BigUint {
    coeffs
        .iter()
        .rev()
        .fold(BigUint::from(0u8), |acc, c| (acc * x + c) % p)
}

fn mod_inverse(a: &BigUint, p: &BigUint) -> BigUint {
    // Fermat: a^(p-2) mod p, valid because p is prime and a != 0
    a.modpow(&(p - BigUint::from(2u8)), p)
}

/// Split `secret` into `total_shares` shares, any `threshold` of which recover it.
pub fn split_secret(
    secret: &[u8],
    threshold: u8,
    total_shares: u8,
) -> Result<Vec<RawShare>, WalletError> {
    if threshold == 0 || total_shares == 0 {
        return Err(WalletError::ValidationError(
            "threshold and total shares must be at least 1".into(),
        ));
    }
    if threshold > total_shares {
        return Err(WalletError::ValidationError(format!(
            "threshold {} exceeds total shares {}",
            threshold, total_shares
        )));
    }
    if secret.is_empty() || secret.len() > MAX_SECRET_LEN {
        return Err(WalletError::ValidationError(format!(
            "secret must be 1..={} bytes (got {})",
            MAX_SECRET_LEN,
            secret.len()
        )));
    }

    let p = prime();
    let mut coeffs = Vec::with_capacity(threshold as usize);
    coeffs.push(BigUint::from_bytes_be(secret));
    for _ in 1..threshold {
        coeffs.push(random_field_element(&p));
    }

    let shares = (1..=total_shares)
        .map(|index| {
            let y = eval_poly_at(&coeffs, &BigUint::from(index), &p);
            RawShare {
                index,
                threshold,
                total_shares,
                secret_len: secret.len() as u16,
                value: to_field_bytes(&y),
            }
        })
        .collect();
    Ok(shares)
}

/// Reconstruct the secret from at least `threshold` consistent shares.
pub fn combine_shares(shares: &[RawShare]) -> Result<SecretVec, WalletError> {
    let first = shares
        .first()
        .ok_or_else(|| WalletError::InsufficientShares("no shares supplied".into()))?;
    let (threshold, total, secret_len) = (first.threshold, first.total_shares, first.secret_len);

    let mut seen = HashSet::with_capacity(shares.len());
    for share in shares {
        if share.threshold != threshold || share.total_shares != total {
            return Err(WalletError::ValidationError(format!(
                "share {} belongs to a {}-of-{} set, expected {}-of-{}",
                share.index, share.threshold, share.total_shares, threshold, total
            )));
        }
        if share.secret_len != secret_len {
            return Err(WalletError::ValidationError("shares disagree on secret length".into()));
        }
        if share.index == 0 || share.index > total {
            return Err(WalletError::ValidationError(format!(
                "share index {} outside 1..={}",
                share.index, total
            )));
        }
        if !seen.insert(share.index) {
            return Err(WalletError::ValidationError(format!(
                "duplicate share index {}",
                share.index
            )));
        }
    }
    if shares.len() < threshold as usize {
        return Err(WalletError::InsufficientShares(format!(
            "got {} shares, need {}",
            shares.len(),
            threshold
        )));
    }

    let p = prime();
    let subset = &shares[..threshold as usize];
    let xs: Vec<BigUint> = subset.iter().map(|s| BigUint::from(s.index)).collect();
    let mut secret = BigUint::from(0u8);

    for (j, share) in subset.iter().enumerate() {
        let yj = BigUint::from_bytes_be(&share.value);
        if yj >= p {
            return Err(WalletError::ValidationError(format!(
                "share {} value is not a field element",
                share.index
            )));
        }
        // l_j(0) = prod_{m != j} x_m / (x_m - x_j)
        let mut num = BigUint::from(1u8);
        let mut den = BigUint::from(1u8);
        for (m, xm) in xs.iter().enumerate() {
            if m == j {
                continue;
            }
            num = (num * xm) % &p;
            let diff = (xm + &p - &xs[j]) % &p;
            den = (den * diff) % &p;
        }
        let lj = (num * mod_inverse(&den, &p)) % &p;
        secret = (secret + yj * lj) % &p;
    }

    let raw = Zeroizing::new(secret.to_bytes_be());
    let len = secret_len as usize;
    if raw.len() > len {
        return Err(WalletError::ValidationError(
            "reconstructed value exceeds the recorded secret length".into(),
        ));
    }
    let mut out = vec![0u8; len];
    out[len - raw.len()..].copy_from_slice(&raw);
    Ok(Zeroizing::new(out))
}

/// A share at rest: metadata in the clear, value sealed under its own salt and IV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShamirShare {
    pub share_index: u8,
    pub threshold: u8,
    pub total_shares: u8,
    pub secret_len: u16,
    /// What the reconstructed secret is (`Seed` or `PrivateKey`).
    pub secret_kind: KeyPurpose,
    pub encrypted_value: EncryptionRecord,
}

/// Seal each share independently.
pub fn encrypt_shares(
    raw: &[RawShare],
    secret_kind: KeyPurpose,
    password: &str,
    kdf: KeyDerivation,
) -> Result<Vec<ShamirShare>, WalletError> {
    raw.iter()
        .map(|share| {
            Ok(ShamirShare {
                share_index: share.index,
                threshold: share.threshold,
                total_shares: share.total_shares,
                secret_len: share.secret_len,
                secret_kind,
                encrypted_value: encryption::seal(
                    &share.value,
                    password,
                    KeyPurpose::RecoveryShare,
                    kdf,
                )?,
            })
        })
        .collect()
}

/// Check set consistency and count, then decrypt and interpolate.
///
/// Metadata is validated before any share is decrypted, so a short or mixed
/// set fails without paying for key stretching.
pub fn recover_secret(
    shares: &[ShamirShare],
    password: &str,
) -> Result<(SecretVec, KeyPurpose), WalletError> {
    recover_secret_checked(shares, password, None)
}

/// [`recover_secret`] for shares from outside: every share's iteration
/// count must pass [`KeyDerivation::check_imported`] against `kdf`.
pub fn recover_secret_checked(
    shares: &[ShamirShare],
    password: &str,
    kdf: Option<KeyDerivation>,
) -> Result<(SecretVec, KeyPurpose), WalletError> {
    let first = shares
        .first()
        .ok_or_else(|| WalletError::InsufficientShares("no shares supplied".into()))?;
    if shares
        .iter()
        .any(|s| s.threshold != first.threshold || s.total_shares != first.total_shares)
    {
        return Err(WalletError::ValidationError(
            "shares do not belong to the same threshold/total set".into(),
        ));
    }
    if shares.iter().any(|s| s.secret_kind != first.secret_kind) {
        return Err(WalletError::ValidationError("shares disagree on secret kind".into()));
    }
    if shares.len() < first.threshold as usize {
        return Err(WalletError::InsufficientShares(format!(
            "got {} shares, need {}",
            shares.len(),
            first.threshold
        )));
    }
    if let Some(kdf) = kdf {
        for share in shares {
            kdf.check_imported(share.encrypted_value.kdf_iterations)?;
        }
    }

    let raw = shares
        .iter()
        .map(|s| {
            Ok(RawShare {
                index: s.share_index,
                threshold: s.threshold,
                total_shares: s.total_shares,
                secret_len: s.secret_len,
                value: encryption::open(&s.encrypted_value, password, KeyPurpose::RecoveryShare)?,
            })
        })
        .collect::<Result<Vec<_>, WalletError>>()?;
    Ok((combine_shares(&raw)?, first.secret_kind))
}
