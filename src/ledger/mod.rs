//! Narrow interfaces to the external services the core depends on.
//!
//! Every method is fallible and may be slow; callers never hold a lock
//! across one of these awaits.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::errors::WalletError;

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: H256,
    pub success: bool,
    pub block_number: u64,
    pub block_hash: H256,
    pub gas_used: U256,
}

/// Defines the interface the core uses to read from and submit to a chain.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Native balance in the smallest unit.
    async fn get_balance(&self, address: Address) -> Result<U256, WalletError>;

    /// Read-only contract call; returns the raw ABI-encoded result.
    async fn call(&self, contract: Address, data: Bytes) -> Result<Bytes, WalletError>;

    /// Submit a signed raw transaction and return its hash.
    async fn broadcast(&self, raw_tx: Bytes) -> Result<H256, WalletError>;

    /// `None` while the transaction is still unmined.
    async fn get_receipt(&self, hash: H256) -> Result<Option<Receipt>, WalletError>;

    /// Current gas price estimate in wei.
    async fn get_fee_estimate(&self) -> Result<U256, WalletError>;

    /// Next nonce the chain expects for `address`.
    async fn get_nonce(&self, address: Address) -> Result<u64, WalletError>;
}

/// Market data source.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// USD prices keyed by symbol; unknown symbols are simply absent.
    async fn get_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>, WalletError>;
}
