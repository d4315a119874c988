//! Wallet manager: the orchestrator over key management, transactions,
//! balances and recovery.
//!
//! ## Module Structure
//! - `lifecycle` - create, import, remove, export, list
//! - `session` - password and session credentials
//! - `transactions` - submit, cancel, query
//! - `balance` - balance tracking and stats
//! - `recovery` - recovery backups and attempts
//! - `audit` - event forwarding and the bounded audit log
//! - `batch` - per-wallet batch execution

pub mod audit;
pub mod balance;
pub mod batch;
pub mod lifecycle;
pub mod recovery;
pub mod session;
pub mod transactions;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::balance::BalanceTracker;
use crate::core::config::WalletConfig;
use crate::core::errors::WalletError;
use crate::core::key_manager::{EncryptedWallet, KeyManager};
use crate::crypto::kdf::KeyDerivation;
use crate::ledger::{LedgerClient, PriceFeed};
use crate::oracle::{GasOracle, PriceOracle};
use crate::recovery::RecoveryManager;
use crate::transactions::TransactionManager;

pub use audit::{AuditEntry, AuditLog, WalletEvent};
pub use lifecycle::{CreatedWallet, WalletInfo};
pub use session::Credential;

use session::Session;

const EVENT_CAPACITY: usize = 256;

/// wallet管理器
///
/// Owns the wallet registry; every other component is reached through its methods.
pub struct WalletManager {
    pub config: WalletConfig,
    key_manager: KeyManager,
    /// wallet id → encrypted wallet
    wallets: Arc<RwLock<HashMap<String, EncryptedWallet>>>,
    /// wallet id → unlocked root
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    transactions: TransactionManager,
    balances: BalanceTracker,
    recovery: Arc<RecoveryManager>,
    gas: Arc<GasOracle>,
    prices: Arc<PriceOracle>,
    audit: Arc<RwLock<AuditLog>>,
    events: broadcast::Sender<WalletEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl WalletManager {
    /// Build every component over the given collaborators and start the
    /// event forwarder, session sweep and recovery sweep.
    pub async fn new(
        config: &WalletConfig,
        ledger: Arc<dyn LedgerClient>,
        price_feed: Arc<dyn PriceFeed>,
    ) -> Result<Self, WalletError> {
        config.validate()?;
        let shutdown = CancellationToken::new();
        let key_manager = KeyManager::new(
            KeyDerivation::pbkdf2(config.security.pbkdf2_iterations),
            config.network.default_derivation_path.clone(),
        );
        let gas = Arc::new(GasOracle::new(ledger.clone(), &config.gas));
        let prices = Arc::new(PriceOracle::new(
            price_feed,
            Duration::from_secs(config.balance.price_cache_ttl_secs),
        ));
        let transactions = TransactionManager::new(
            key_manager.clone(),
            ledger.clone(),
            gas.clone(),
            &config.network,
            &config.transactions,
            shutdown.clone(),
        );
        let balances = BalanceTracker::new(
            ledger,
            prices.clone(),
            &config.network,
            &config.balance,
            shutdown.clone(),
        );
        let recovery = Arc::new(RecoveryManager::new(
            key_manager.clone(),
            &config.recovery,
            shutdown.clone(),
        ));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let manager = Self {
            config: config.clone(),
            key_manager,
            wallets: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            transactions,
            balances,
            recovery,
            gas,
            prices,
            audit: Arc::new(RwLock::new(AuditLog::new(config.security.audit_log_capacity))),
            events,
            tasks: Mutex::new(Vec::new()),
            shutdown,
        };
        manager.recovery.start_sweeper();
        let forwarder = manager.spawn_event_forwarder();
        let sweeper = manager.spawn_session_sweeper();
        manager.tasks.lock().extend([forwarder, sweeper]);
        info!(
            "Wallet manager ready (chain {}, {} PBKDF2 iterations)",
            config.network.chain_id, config.security.pbkdf2_iterations
        );
        Ok(manager)
    }

    pub fn key_manager(&self) -> &KeyManager {
        &self.key_manager
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn balances(&self) -> &BalanceTracker {
        &self.balances
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    pub fn gas_oracle(&self) -> &Arc<GasOracle> {
        &self.gas
    }

    pub fn price_oracle(&self) -> &Arc<PriceOracle> {
        &self.prices
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    /// Cancel every background loop and wait for the manager's own tasks.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        self.sessions.write().clear();
        info!("Wallet manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn wallet(&self, wallet_id: &str) -> Result<EncryptedWallet, WalletError> {
        self.wallets
            .read()
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| WalletError::NotFoundError(format!("wallet {}", wallet_id)))
    }
}
