//! Turns a transfer request into the concrete call a signer needs.

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::core::abi;
use crate::core::domain::{parse_address, parse_amount, AssetKind};
use crate::core::errors::WalletError;
use crate::oracle::GasSpeed;

pub const NATIVE_GAS_LIMIT: u64 = 21_000;
pub const FUNGIBLE_GAS_LIMIT: u64 = 65_000;
pub const NON_FUNGIBLE_GAS_LIMIT: u64 = 100_000;
pub const MULTI_TOKEN_GAS_LIMIT: u64 = 120_000;

/// Caller-facing transfer description. Amounts are decimal strings in the
/// asset's smallest unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub to: String,
    pub amount: String,
    /// `native`, `fungible`, `non-fungible` or `multi-token` (token standard names also accepted).
    pub asset_kind: String,
    pub contract_address: Option<String>,
    pub token_id: Option<String>,
    /// Explicit gas price in wei; otherwise taken from the gas oracle.
    pub gas_price: Option<String>,
    pub gas_limit: Option<u64>,
    pub speed: Option<GasSpeed>,
    pub nonce: Option<u64>,
}

impl TransferRequest {
    pub fn native(to: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            amount: amount.into(),
            asset_kind: AssetKind::Native.to_string(),
            ..Default::default()
        }
    }

    pub fn token(
        kind: AssetKind,
        contract: impl Into<String>,
        to: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            amount: amount.into(),
            asset_kind: kind.to_string(),
            contract_address: Some(contract.into()),
            ..Default::default()
        }
    }

    pub fn with_token_id(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    pub fn with_gas_price(mut self, wei: impl Into<String>) -> Self {
        self.gas_price = Some(wei.into());
        self
    }
}

/// The on-chain call a request resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPlan {
    pub kind: AssetKind,
    /// Logical recipient of the asset.
    pub recipient: Address,
    /// Logical amount moved.
    pub amount: U256,
    pub contract_address: Option<Address>,
    pub token_id: Option<U256>,
    /// Address the transaction is sent to (recipient or token contract).
    pub tx_to: Address,
    /// Native value attached to the transaction.
    pub tx_value: U256,
    pub data: Bytes,
    pub default_gas_limit: u64,
}

fn required<'a>(field: &'a Option<String>, name: &str, kind: AssetKind) -> Result<&'a str, WalletError> {
    field
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| WalletError::MissingParameter(format!("{} is required for {} transfers", name, kind)))
}

/// Validate `request` and encode its call data for a transfer sent by `from`.
pub fn plan_call(request: &TransferRequest, from: Address) -> Result<CallPlan, WalletError> {
    let kind: AssetKind = request.asset_kind.parse()?;
    let recipient = parse_address(&request.to)?;

    let contract_address = if kind.requires_contract() {
        Some(parse_address(required(&request.contract_address, "contract_address", kind)?)?)
    } else {
        None
    };
    let token_id = if kind.requires_token_id() {
        Some(parse_amount(required(&request.token_id, "token_id", kind)?)?)
    } else {
        None
    };
    let amount = match kind {
        // a non-fungible transfer always moves exactly one token
        AssetKind::NonFungible => U256::one(),
        _ => parse_amount(&request.amount)?,
    };

    let (tx_to, tx_value, data, default_gas_limit) = match (kind, contract_address, token_id) {
        (AssetKind::Native, _, _) => (recipient, amount, Vec::new(), NATIVE_GAS_LIMIT),
        (AssetKind::Fungible, Some(contract), _) => (
            contract,
            U256::zero(),
            abi::encode_erc20_transfer(&recipient, amount),
            FUNGIBLE_GAS_LIMIT,
        ),
        (AssetKind::NonFungible, Some(contract), Some(id)) => (
            contract,
            U256::zero(),
            abi::encode_erc721_safe_transfer(&from, &recipient, id),
            NON_FUNGIBLE_GAS_LIMIT,
        ),
        (AssetKind::MultiToken, Some(contract), Some(id)) => (
            contract,
            U256::zero(),
            abi::encode_erc1155_safe_transfer(&from, &recipient, id, amount),
            MULTI_TOKEN_GAS_LIMIT,
        ),
        _ => {
            return Err(WalletError::InternalError(format!(
                "inconsistent parameters for {} transfer",
                kind
            )))
        }
    };

    Ok(CallPlan {
        kind,
        recipient,
        amount,
        contract_address,
        token_id,
        tx_to,
        tx_value,
        data: Bytes::from(data),
        default_gas_limit,
    })
}
