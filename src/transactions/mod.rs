//! Transaction preparation, broadcast and confirmation tracking.
//!
//! Lifecycle: `building -> signed -> broadcast (pending) -> confirmed | failed`.
//! A transaction leaves `pending` exactly once; the watcher re-checks the
//! status under the write lock before applying a receipt.

pub mod builder;
pub mod nonce;
pub mod watcher;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::abi;
use crate::core::config::{NetworkConfig, TransactionConfig};
use crate::core::domain::{format_address, parse_amount, AssetKind, Transaction, TxStatus};
use crate::core::errors::WalletError;
use crate::core::key_manager::{EncryptedWallet, KeyManager, RootKey};
use crate::ledger::LedgerClient;
use crate::oracle::{GasOracle, GasSpeed};

pub use builder::{plan_call, CallPlan, TransferRequest};
pub use nonce::NonceTracker;

const EVENT_CAPACITY: usize = 256;

/// A signed, not yet broadcast, transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: H256,
    pub from: Address,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub kind: AssetKind,
    pub recipient: Address,
    pub amount: U256,
    pub contract_address: Option<Address>,
    pub token_id: Option<U256>,
    /// Set on replacements: the hash of the transaction being cancelled.
    pub replaces: Option<H256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxEvent {
    Submitted { id: String, wallet_id: String, hash: H256 },
    StatusChanged {
        id: String,
        wallet_id: String,
        hash: H256,
        status: TxStatus,
        block_number: Option<u64>,
    },
}

/// Transaction manager
pub struct TransactionManager {
    key_manager: KeyManager,
    ledger: Arc<dyn LedgerClient>,
    gas: Arc<GasOracle>,
    chain_id: u64,
    config: TransactionConfig,
    pub(crate) transactions: Arc<RwLock<HashMap<String, Transaction>>>,
    by_hash: Arc<RwLock<HashMap<H256, String>>>,
    nonces: NonceTracker,
    events: broadcast::Sender<TxEvent>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl TransactionManager {
    pub fn new(
        key_manager: KeyManager,
        ledger: Arc<dyn LedgerClient>,
        gas: Arc<GasOracle>,
        network: &NetworkConfig,
        config: &TransactionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            key_manager,
            ledger,
            gas,
            chain_id: network.chain_id,
            config: config.clone(),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            by_hash: Arc::new(RwLock::new(HashMap::new())),
            nonces: NonceTracker::new(),
            events,
            watcher: Mutex::new(None),
            shutdown,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.events.subscribe()
    }

    /// Decrypt the wallet root with `password` and prepare a signed transfer.
    pub async fn prepare_transaction(
        &self,
        request: &TransferRequest,
        wallet: &EncryptedWallet,
        password: &str,
    ) -> Result<SignedTransaction, WalletError> {
        let root = self.key_manager.unlock_root(wallet, password).await?;
        self.prepare_with_root(request, wallet, &root).await
    }

    /// Prepare a signed transfer with an already unlocked root.
    pub async fn prepare_with_root(
        &self,
        request: &TransferRequest,
        wallet: &EncryptedWallet,
        root: &RootKey,
    ) -> Result<SignedTransaction, WalletError> {
        let from = wallet.address;
        let plan = plan_call(request, from)?;

        let gas_price = match request.gas_price.as_deref() {
            Some(raw) => parse_amount(raw)?,
            None => self.gas.gas_price(request.speed.unwrap_or(GasSpeed::Standard)).await,
        };
        let gas_limit = U256::from(request.gas_limit.unwrap_or(plan.default_gas_limit));
        self.check_balance(&plan, from, gas_price, gas_limit).await?;

        let nonce = match request.nonce {
            Some(n) => {
                self.nonces.mark_used(from, n);
                n
            }
            None => {
                let chain_nonce = self.ledger.get_nonce(from).await?;
                self.nonces.reserve(from, chain_nonce)?
            }
        };

        let signed = self
            .sign(root, wallet, &plan, nonce, gas_price, gas_limit, None)
            .map_err(|e| {
                self.nonces.release(from, nonce);
                e
            })?;
        info!(
            "Signed {} transfer from {} nonce {}",
            plan.kind,
            format_address(&from),
            nonce
        );
        Ok(signed)
    }

    /// Fails with `InsufficientBalance` when the ledger reports too little.
    async fn check_balance(
        &self,
        plan: &CallPlan,
        from: Address,
        gas_price: U256,
        gas_limit: U256,
    ) -> Result<(), WalletError> {
        match plan.kind {
            AssetKind::Native => {
                let required = plan
                    .tx_value
                    .checked_add(gas_limit.saturating_mul(gas_price))
                    .ok_or_else(|| WalletError::ValidationError("transfer cost overflows".into()))?;
                let balance = self.ledger.get_balance(from).await?;
                if balance < required {
                    return Err(WalletError::InsufficientBalance(format!(
                        "have {} wei, need {} wei (value + gas)",
                        balance, required
                    )));
                }
            }
            AssetKind::Fungible => {
                let out = self
                    .ledger
                    .call(plan.tx_to, abi::encode_balance_of(&from).into())
                    .await?;
                let balance = abi::decode_uint256(&out)?;
                if balance < plan.amount {
                    return Err(WalletError::InsufficientBalance(format!(
                        "have {} token units, need {}",
                        balance, plan.amount
                    )));
                }
            }
            // ownership is enforced by the token contract itself
            AssetKind::NonFungible | AssetKind::MultiToken => {}
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn sign(
        &self,
        root: &RootKey,
        wallet: &EncryptedWallet,
        plan: &CallPlan,
        nonce: u64,
        gas_price: U256,
        gas_limit: U256,
        replaces: Option<H256>,
    ) -> Result<SignedTransaction, WalletError> {
        let signing_key = self.key_manager.derive_signing_key(root, &wallet.derivation_path)?;
        let signer = LocalWallet::from(signing_key).with_chain_id(self.chain_id);
        if signer.address() != wallet.address {
            return Err(WalletError::Unauthorized(
                "unlocked key does not match the wallet address".into(),
            ));
        }

        let request = TransactionRequest::new()
            .from(wallet.address)
            .to(plan.tx_to)
            .value(plan.tx_value)
            .data(plan.data.clone())
            .nonce(nonce)
            .gas(gas_limit)
            .gas_price(gas_price)
            .chain_id(self.chain_id);
        let typed: TypedTransaction = request.into();
        let signature = signer
            .sign_transaction_sync(&typed)
            .map_err(|e| WalletError::CryptoError(format!("Signing failed: {}", e)))?;
        let raw = typed.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));

        Ok(SignedTransaction {
            raw,
            hash,
            from: wallet.address,
            nonce,
            gas_price,
            gas_limit,
            kind: plan.kind,
            recipient: plan.recipient,
            amount: plan.amount,
            contract_address: plan.contract_address,
            token_id: plan.token_id,
            replaces,
        })
    }

    /// Submit to the ledger, record a pending transaction and make sure the
    /// confirmation watcher is running. Returns as soon as the ledger accepts.
    pub async fn broadcast_transaction(
        &self,
        signed: SignedTransaction,
        wallet_id: &str,
    ) -> Result<Transaction, WalletError> {
        let hash = match self.ledger.broadcast(signed.raw.clone()).await {
            Ok(hash) => hash,
            Err(e) => {
                if signed.replaces.is_none() {
                    self.nonces.release(signed.from, signed.nonce);
                }
                return Err(e);
            }
        };
        if hash != signed.hash {
            warn!("Ledger reported hash {:?}, expected {:?}", hash, signed.hash);
        }

        let tx = Transaction {
            id: Uuid::new_v4().to_string(),
            wallet_id: wallet_id.to_string(),
            hash,
            from: signed.from,
            to: signed.recipient,
            value: signed.amount,
            token_kind: signed.kind,
            contract_address: signed.contract_address,
            token_id: signed.token_id,
            nonce: signed.nonce,
            gas_price: signed.gas_price,
            gas_limit: signed.gas_limit,
            gas_used: None,
            status: TxStatus::Pending,
            block_number: None,
            block_hash: None,
            timestamp: Utc::now(),
        };
        self.transactions.write().insert(tx.id.clone(), tx.clone());
        self.by_hash.write().insert(hash, tx.id.clone());
        info!("Broadcast transaction {} ({:?}) for wallet {}", tx.id, hash, wallet_id);

        let _ = self.events.send(TxEvent::Submitted {
            id: tx.id.clone(),
            wallet_id: tx.wallet_id.clone(),
            hash,
        });
        self.ensure_watcher();
        Ok(tx)
    }

    /// Sign a zero-value self-transfer that reuses the stuck transaction's
    /// nonce at `cancel_gas_bump_percent` (at least 150%) of its gas price.
    pub async fn cancel_transaction(
        &self,
        hash: H256,
        wallet: &EncryptedWallet,
        password: &str,
    ) -> Result<SignedTransaction, WalletError> {
        let root = self.key_manager.unlock_root(wallet, password).await?;
        self.cancel_with_root(hash, wallet, &root)
    }

    pub fn cancel_with_root(
        &self,
        hash: H256,
        wallet: &EncryptedWallet,
        root: &RootKey,
    ) -> Result<SignedTransaction, WalletError> {
        let original = self
            .get_by_hash(&hash)
            .ok_or_else(|| WalletError::NotFoundError(format!("transaction {:?}", hash)))?;
        if original.from != wallet.address {
            return Err(WalletError::Unauthorized(format!(
                "transaction {:?} was not sent by wallet {}",
                hash, wallet.id
            )));
        }
        if original.status.is_terminal() {
            return Err(WalletError::ValidationError(format!(
                "transaction {:?} is already {:?}",
                hash, original.status
            )));
        }

        let gas_price = bumped_gas_price(original.gas_price, self.config.cancel_gas_bump_percent)?;
        let plan = CallPlan {
            kind: AssetKind::Native,
            recipient: wallet.address,
            amount: U256::zero(),
            contract_address: None,
            token_id: None,
            tx_to: wallet.address,
            tx_value: U256::zero(),
            data: Bytes::new(),
            default_gas_limit: builder::NATIVE_GAS_LIMIT,
        };
        let signed = self.sign(
            root,
            wallet,
            &plan,
            original.nonce,
            gas_price,
            U256::from(builder::NATIVE_GAS_LIMIT),
            Some(hash),
        )?;
        info!(
            "Prepared cancellation of {:?} with nonce {} at {} wei",
            hash, original.nonce, gas_price
        );
        Ok(signed)
    }

    pub fn get_transaction(&self, id: &str) -> Option<Transaction> {
        self.transactions.read().get(id).cloned()
    }

    pub fn get_by_hash(&self, hash: &H256) -> Option<Transaction> {
        let id = self.by_hash.read().get(hash).cloned()?;
        self.get_transaction(&id)
    }

    /// All transactions of a wallet, oldest first.
    pub fn list_for_wallet(&self, wallet_id: &str) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = self
            .transactions
            .read()
            .values()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect();
        txs.sort_by_key(|tx| tx.timestamp);
        txs
    }

    pub fn pending_count(&self) -> usize {
        self.transactions
            .read()
            .values()
            .filter(|tx| tx.status == TxStatus::Pending)
            .count()
    }
}

/// `ceil(original * percent / 100)`, never below 150%.
///
/// Fails with `ValidationError` when the bumped price does not fit in 256 bits.
pub fn bumped_gas_price(original: U256, percent: u64) -> Result<U256, WalletError> {
    let percent = U256::from(percent.max(150));
    let hundred = U256::from(100u64);
    // split so the intermediate product never exceeds the result
    let whole = (original / hundred).checked_mul(percent);
    let rest = ((original % hundred) * percent + hundred - U256::one()) / hundred;
    whole.and_then(|w| w.checked_add(rest)).ok_or_else(|| {
        WalletError::ValidationError(format!(
            "gas price {} cannot be raised by {}% without overflowing",
            original, percent
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bumped_gas_price_rounds_up() {
        assert_eq!(bumped_gas_price(U256::from(100u64), 150).unwrap(), U256::from(150u64));
        assert_eq!(bumped_gas_price(U256::from(3u64), 150).unwrap(), U256::from(5u64));
        assert_eq!(bumped_gas_price(U256::from(101u64), 150).unwrap(), U256::from(152u64));
        // a configured bump below 150 is raised
        assert_eq!(bumped_gas_price(U256::from(100u64), 110).unwrap(), U256::from(150u64));
        assert_eq!(bumped_gas_price(U256::from(100u64), 200).unwrap(), U256::from(200u64));
    }

    #[test]
    fn test_bumped_gas_price_near_the_top_of_the_range() {
        let largest = U256::MAX / U256::from(3u64) * U256::from(2u64);
        let bumped = bumped_gas_price(largest, 150).unwrap();
        assert!(bumped >= largest + largest / U256::from(2u64));

        assert!(matches!(bumped_gas_price(U256::MAX / U256::from(100u64), 150), Ok(_)));
        assert!(matches!(bumped_gas_price(U256::MAX, 150), Err(WalletError::ValidationError(_))));
        assert!(matches!(
            bumped_gas_price(U256::MAX / U256::from(2u64), 400),
            Err(WalletError::ValidationError(_))
        ));
    }
}
