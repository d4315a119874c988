use thiserror::Error;

/// Custom error type for custody operations.
///
/// Payloads describe the violated precondition and never carry key material.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Wrong password or tampered ciphertext.
    #[error("Decryption error: {0}")]
    DecryptionError(String),
    /// Encryption could not be performed.
    #[error("Encryption error: {0}")]
    EncryptionError(String),
    /// Unknown wallet, transaction, session or recovery attempt.
    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error("Insufficient shares: {0}")]
    InsufficientShares(String),
    /// Malformed input or configuration (e.g. threshold > total shares).
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Recovery request or time lock past its window.
    #[error("Expired: {0}")]
    Expired(String),
    /// Guardian not registered, or password verification failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Unsupported asset kind: {0}")]
    UnsupportedAssetKind(String),
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    /// Ledger or feed unavailable.
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Crypto error: {0}")]
    CryptoError(String),
    #[error("Mnemonic error: {0}")]
    MnemonicError(String),
    #[error("Key derivation error: {0}")]
    KeyDerivationError(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WalletError {
    /// Errors that indicate a cryptographic failure and must never be retried blindly.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            WalletError::DecryptionError(_)
                | WalletError::EncryptionError(_)
                | WalletError::CryptoError(_)
        )
    }

    /// Errors caused by a transiently unavailable collaborator.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::NetworkError(_))
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for WalletError {
    fn from(err: toml::de::Error) -> Self {
        WalletError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for WalletError {
    fn from(err: std::io::Error) -> Self {
        WalletError::ConfigError(err.to_string())
    }
}
