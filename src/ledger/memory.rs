//! In-process ledger and price feed.
//!
//! Both are scriptable and can be switched offline to exercise the
//! fallback and retry paths without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::{LedgerClient, PriceFeed, Receipt};
use crate::core::abi;
use crate::core::errors::WalletError;

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    calls: HashMap<(Address, Vec<u8>), Vec<u8>>,
    broadcasts: Vec<Bytes>,
    receipts: HashMap<H256, Receipt>,
    fee_estimate: U256,
    next_block: u64,
}

/// Scriptable ledger.
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    offline: AtomicBool,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                fee_estimate: U256::from(20_000_000_000u64),
                next_block: 1,
                ..Default::default()
            }),
            offline: AtomicBool::new(false),
        }
    }

    /// While offline every call fails with `NetworkError`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_balance(&self, address: Address, amount: U256) {
        self.state.write().balances.insert(address, amount);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.write().nonces.insert(address, nonce);
    }

    pub fn set_fee_estimate(&self, wei: U256) {
        self.state.write().fee_estimate = wei;
    }

    /// Answer `call(contract, data)` with `response`.
    pub fn set_call_response(&self, contract: Address, data: Vec<u8>, response: Vec<u8>) {
        self.state.write().calls.insert((contract, data), response);
    }

    /// Script `balanceOf(owner)` on a fungible token contract.
    pub fn set_token_balance(&self, contract: Address, owner: Address, amount: U256) {
        self.set_call_response(
            contract,
            abi::encode_balance_of(&owner),
            abi::abi_word_uint256(amount).to_vec(),
        );
    }

    /// Script `balanceOf` and `tokenOfOwnerByIndex` on a non-fungible contract.
    pub fn set_owned_tokens(&self, contract: Address, owner: Address, ids: &[U256]) {
        self.set_token_balance(contract, owner, U256::from(ids.len()));
        for (i, id) in ids.iter().enumerate() {
            self.set_call_response(
                contract,
                abi::encode_token_of_owner_by_index(&owner, i as u64),
                abi::abi_word_uint256(*id).to_vec(),
            );
        }
    }

    /// Mine a broadcast transaction.
    pub fn mine(&self, hash: H256, success: bool, gas_used: U256) -> Receipt {
        let mut state = self.state.write();
        let block_number = state.next_block;
        state.next_block += 1;
        let receipt = Receipt {
            tx_hash: hash,
            success,
            block_number,
            block_hash: H256::from(keccak256(block_number.to_be_bytes())),
            gas_used,
        };
        state.receipts.insert(hash, receipt.clone());
        receipt
    }

    pub fn broadcasts(&self) -> Vec<Bytes> {
        self.state.read().broadcasts.clone()
    }

    fn check_online(&self) -> Result<(), WalletError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(WalletError::NetworkError("ledger unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_balance(&self, address: Address) -> Result<U256, WalletError> {
        self.check_online()?;
        Ok(self.state.read().balances.get(&address).copied().unwrap_or_default())
    }

    async fn call(&self, contract: Address, data: Bytes) -> Result<Bytes, WalletError> {
        self.check_online()?;
        let state = self.state.read();
        // unscripted reads behave like a contract returning zero
        let out = state
            .calls
            .get(&(contract, data.to_vec()))
            .cloned()
            .unwrap_or_else(|| vec![0u8; 32]);
        Ok(Bytes::from(out))
    }

    async fn broadcast(&self, raw_tx: Bytes) -> Result<H256, WalletError> {
        self.check_online()?;
        let hash = H256::from(keccak256(&raw_tx));
        self.state.write().broadcasts.push(raw_tx);
        Ok(hash)
    }

    async fn get_receipt(&self, hash: H256) -> Result<Option<Receipt>, WalletError> {
        self.check_online()?;
        Ok(self.state.read().receipts.get(&hash).cloned())
    }

    async fn get_fee_estimate(&self) -> Result<U256, WalletError> {
        self.check_online()?;
        Ok(self.state.read().fee_estimate)
    }

    async fn get_nonce(&self, address: Address) -> Result<u64, WalletError> {
        self.check_online()?;
        Ok(self.state.read().nonces.get(&address).copied().unwrap_or(0))
    }
}

/// Fixed price table with an offline switch and a request counter.
pub struct StaticPriceFeed {
    prices: RwLock<HashMap<String, Decimal>>,
    offline: AtomicBool,
    requests: AtomicUsize,
}

impl StaticPriceFeed {
    pub fn new(prices: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            prices: RwLock::new(prices.into_iter().collect()),
            offline: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().insert(symbol.to_string(), price);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `get_prices` calls served or refused so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn get_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>, WalletError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(WalletError::NetworkError("price feed unavailable".into()));
        }
        let prices = self.prices.read();
        Ok(symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }
}
