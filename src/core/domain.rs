//! Shared value types: asset kinds, transactions and balances.
//!
//! Amounts are `U256` in memory and decimal strings on the wire; addresses
//! and hashes serialize as fixed-length `0x` hex.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::errors::WalletError;

/// Token standard an asset or transfer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    Native,
    Fungible,
    NonFungible,
    MultiToken,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Native => "native",
            AssetKind::Fungible => "fungible",
            AssetKind::NonFungible => "non-fungible",
            AssetKind::MultiToken => "multi-token",
        }
    }

    pub fn requires_contract(&self) -> bool {
        !matches!(self, AssetKind::Native)
    }

    pub fn requires_token_id(&self) -> bool {
        matches!(self, AssetKind::NonFungible | AssetKind::MultiToken)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "eth" => Ok(AssetKind::Native),
            "fungible" | "erc20" | "erc-20" => Ok(AssetKind::Fungible),
            "non-fungible" | "nft" | "erc721" | "erc-721" => Ok(AssetKind::NonFungible),
            "multi-token" | "erc1155" | "erc-1155" => Ok(AssetKind::MultiToken),
            other => Err(WalletError::UnsupportedAssetKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

/// A broadcast transaction and its tracked on-chain outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub wallet_id: String,
    pub hash: H256,
    pub from: Address,
    pub to: Address,
    #[serde(with = "dec_u256")]
    pub value: U256,
    pub token_kind: AssetKind,
    pub contract_address: Option<Address>,
    #[serde(with = "dec_u256_opt")]
    pub token_id: Option<U256>,
    pub nonce: u64,
    #[serde(with = "dec_u256")]
    pub gas_price: U256,
    #[serde(with = "dec_u256")]
    pub gas_limit: U256,
    #[serde(with = "dec_u256_opt")]
    pub gas_used: Option<U256>,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub block_hash: Option<H256>,
    pub timestamp: DateTime<Utc>,
}

/// An asset the balance tracker should resolve for an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAsset {
    pub kind: AssetKind,
    pub contract_address: Address,
    pub symbol: String,
    pub decimals: u32,
    #[serde(with = "dec_u256_opt")]
    pub token_id: Option<U256>,
}

/// Snapshot of one asset held by a tracked address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub token_kind: AssetKind,
    pub contract_address: Option<Address>,
    #[serde(with = "dec_u256_opt")]
    pub token_id: Option<U256>,
    /// Enumerated non-fungible ids, capped by `BalanceConfig::max_nft_ids`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owned_token_ids: Vec<String>,
    #[serde(with = "dec_u256")]
    pub balance: U256,
    pub decimals: u32,
    pub symbol: String,
    pub usd_value: Option<Decimal>,
    pub last_updated: DateTime<Utc>,
}

impl AssetBalance {
    /// Registry key: `(symbol, contract)` within one wallet address.
    pub fn key(&self) -> (String, Option<Address>) {
        (self.symbol.clone(), self.contract_address)
    }
}

/// Parse a `0x`-prefixed 20-byte hex address.
pub fn parse_address(raw: &str) -> Result<Address, WalletError> {
    let hex_part = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| WalletError::InvalidAddress(format!("{} is missing the 0x prefix", raw)))?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WalletError::InvalidAddress(format!(
            "{} is not 40 hex characters",
            raw
        )));
    }
    Address::from_str(hex_part).map_err(|e| WalletError::InvalidAddress(e.to_string()))
}

/// Lowercase `0x` hex rendering used for map keys and log lines.
pub fn format_address(addr: &Address) -> String {
    format!("{:?}", addr)
}

/// Parse a decimal-string integer amount.
pub fn parse_amount(raw: &str) -> Result<U256, WalletError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(WalletError::ValidationError(format!(
            "amount '{}' must be a non-negative integer string",
            raw
        )));
    }
    U256::from_dec_str(trimmed)
        .map_err(|_| WalletError::ValidationError(format!("amount '{}' exceeds 256 bits", raw)))
}

/// `U256` as a decimal string.
pub mod dec_u256 {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(d)?;
        U256::from_dec_str(&raw).map_err(D::Error::custom)
    }
}

/// `Option<U256>` as an optional decimal string.
pub mod dec_u256_opt {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<U256>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_some(&v.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<U256>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| U256::from_dec_str(&raw).map_err(D::Error::custom))
            .transpose()
    }
}
