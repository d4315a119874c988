//! Custodial security core of a multi-asset wallet: key management,
//! transaction signing and tracking, balance aggregation and recovery.

pub mod balance;
pub mod core;
pub mod crypto;
pub mod ledger;
pub mod oracle;
pub mod recovery;
pub mod security;
pub mod transactions;

pub use crate::core::errors::WalletError;
pub use crate::core::wallet_manager::{Credential, WalletManager};
