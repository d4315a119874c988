use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::core::errors::WalletError;

/// Name recorded alongside every ciphertext produced with this KDF.
pub const KDF_NAME: &str = "pbkdf2-hmac-sha256";
pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
/// Upper bound on the iteration count accepted from imported records.
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// Password stretching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDerivation {
    iterations: u32,
}

impl KeyDerivation {
    pub fn pbkdf2(iterations: u32) -> Self {
        Self { iterations }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive a 256-bit key from `password` and `salt`.
    pub fn derive_key(&self, password: &[u8], salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        debug!("Using PBKDF2 with {} iterations", self.iterations);
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(password, salt, self.iterations, &mut *key);
        key
    }

    /// Accept an iteration count read from outside only if it is at least
    /// this KDF's own count and at most [`MAX_ITERATIONS`].
    pub fn check_imported(&self, iterations: u32) -> Result<(), WalletError> {
        if iterations < self.iterations || iterations > MAX_ITERATIONS {
            return Err(WalletError::ValidationError(format!(
                "KDF iteration count {} outside {}..={}",
                iterations, self.iterations, MAX_ITERATIONS
            )));
        }
        Ok(())
    }

    pub fn generate_salt() -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbkdf2_is_deterministic() {
        let kdf = KeyDerivation::pbkdf2(1_000);
        let salt = [7u8; SALT_LEN];
        let a = kdf.derive_key(b"correct", &salt);
        let b = kdf.derive_key(b"correct", &salt);
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_salt_and_password_change_key() {
        let kdf = KeyDerivation::pbkdf2(1_000);
        let salt = [7u8; SALT_LEN];
        let base = kdf.derive_key(b"correct", &salt);
        assert_ne!(*base, *kdf.derive_key(b"wrong", &salt));
        assert_ne!(*base, *kdf.derive_key(b"correct", &[8u8; SALT_LEN]));
    }

    #[test]
    fn test_imported_iteration_bounds() {
        let kdf = KeyDerivation::pbkdf2(100_000);
        assert!(kdf.check_imported(100_000).is_ok());
        assert!(kdf.check_imported(MAX_ITERATIONS).is_ok());
        assert!(matches!(kdf.check_imported(1), Err(WalletError::ValidationError(_))));
        assert!(matches!(kdf.check_imported(u32::MAX), Err(WalletError::ValidationError(_))));
    }

    #[test]
    fn test_generated_salts_differ() {
        assert_ne!(KeyDerivation::generate_salt(), KeyDerivation::generate_salt());
    }
}
