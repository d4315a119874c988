//! Cryptographic building blocks: password stretching, AEAD records and
//! secret sharing. Nothing here knows about wallets.

pub mod encryption;
pub mod kdf;
pub mod shamir;

pub use self::encryption::{open, seal, EncryptionRecord, KeyPurpose};
pub use self::kdf::KeyDerivation;
pub use self::shamir::{
    combine_shares, encrypt_shares, recover_secret, split_secret, RawShare, ShamirShare,
};
