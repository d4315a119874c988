//! Multi-asset balance tracking.
//!
//! Every tracked address is refreshed by one shared loop. The loop starts
//! with the first tracked address and is cancelled when the last one is
//! removed. A refresh reads the ledger with no lock held and replaces the
//! address's balances in one write, so readers never see half a refresh.
//!
//! Lock order: `refresh_loop` before `tracked`. Changes to the tracked set
//! and to the loop happen under the `refresh_loop` lock together.

pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ethers::types::{Address, U256};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::abi;
use crate::core::config::{BalanceConfig, NetworkConfig};
use crate::core::domain::{format_address, AssetBalance, AssetKind, TrackedAsset, Transaction};
use crate::core::errors::WalletError;
use crate::ledger::LedgerClient;
use crate::oracle::PriceOracle;

pub use stats::{calculate_stats, usd_value, WalletStats};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BalanceEvent {
    Tracked { address: Address },
    Untracked { address: Address },
    Refreshed { address: Address, total_usd: Decimal },
}

#[derive(Debug, Default)]
struct TrackedEntry {
    assets: Vec<TrackedAsset>,
    balances: Vec<AssetBalance>,
}

struct RefreshLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Shared state the refresh loop needs without borrowing the tracker.
#[derive(Clone)]
struct Refresher {
    ledger: Arc<dyn LedgerClient>,
    prices: Arc<PriceOracle>,
    native_symbol: String,
    native_decimals: u32,
    max_nft_ids: usize,
    tracked: Arc<RwLock<HashMap<Address, TrackedEntry>>>,
    events: broadcast::Sender<BalanceEvent>,
}

pub struct BalanceTracker {
    refresher: Refresher,
    period: Duration,
    refresh_loop: Mutex<Option<RefreshLoop>>,
    shutdown: CancellationToken,
}

impl BalanceTracker {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        prices: Arc<PriceOracle>,
        network: &NetworkConfig,
        config: &BalanceConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            refresher: Refresher {
                ledger,
                prices,
                native_symbol: network.native_symbol.clone(),
                native_decimals: network.native_decimals,
                max_nft_ids: config.max_nft_ids,
                tracked: Arc::new(RwLock::new(HashMap::new())),
                events,
            },
            period: Duration::from_secs(config.refresh_interval_secs),
            refresh_loop: Mutex::new(None),
            shutdown,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BalanceEvent> {
        self.refresher.events.subscribe()
    }

    /// Track `address` (native asset plus `assets`), refresh it immediately and
    /// join the shared refresh loop. Re-tracking replaces the asset list.
    pub async fn track_address(
        &self,
        address: Address,
        assets: Vec<TrackedAsset>,
    ) -> Result<Vec<AssetBalance>, WalletError> {
        {
            let mut slot = self.refresh_loop.lock();
            self.refresher.tracked.write().entry(address).or_default().assets = assets;
            self.ensure_loop(&mut slot);
        }
        info!("Tracking balances for {}", format_address(&address));
        let _ = self.refresher.events.send(BalanceEvent::Tracked { address });
        self.refresher.refresh_address(address).await
    }

    /// Stop tracking `address`; the shared loop stops with the last address.
    pub fn stop_tracking(&self, address: &Address) -> bool {
        let removed = {
            let mut slot = self.refresh_loop.lock();
            let mut tracked = self.refresher.tracked.write();
            let removed = tracked.remove(address).is_some();
            if tracked.is_empty() {
                if let Some(running) = slot.take() {
                    running.token.cancel();
                    debug!("Balance refresh loop stopped");
                }
            }
            removed
        };
        if removed {
            info!("Stopped tracking {}", format_address(address));
            let _ = self.refresher.events.send(BalanceEvent::Untracked { address: *address });
        }
        removed
    }

    pub fn is_tracking(&self, address: &Address) -> bool {
        self.refresher.tracked.read().contains_key(address)
    }

    pub fn is_loop_running(&self) -> bool {
        self.refresh_loop
            .lock()
            .as_ref()
            .map_or(false, |l| !l.handle.is_finished() && !l.token.is_cancelled())
    }

    /// Refresh one tracked address now.
    pub async fn refresh(&self, address: Address) -> Result<Vec<AssetBalance>, WalletError> {
        self.refresher.refresh_address(address).await
    }

    pub fn get_balances(&self, address: &Address) -> Option<Vec<AssetBalance>> {
        self.refresher.tracked.read().get(address).map(|e| e.balances.clone())
    }

    /// Sum of the stored USD values for `address`.
    pub fn total_usd(&self, address: &Address) -> Decimal {
        self.get_balances(address)
            .map(|b| b.iter().filter_map(|a| a.usd_value).sum())
            .unwrap_or(Decimal::ZERO)
    }

    pub fn calculate_stats(&self, address: Address, transactions: &[Transaction]) -> WalletStats {
        let balances = self.get_balances(&address).unwrap_or_default();
        calculate_stats(address, &balances, transactions)
    }

    fn ensure_loop(&self, slot: &mut Option<RefreshLoop>) {
        if slot
            .as_ref()
            .map_or(false, |l| !l.handle.is_finished() && !l.token.is_cancelled())
        {
            return;
        }
        let token = self.shutdown.child_token();
        let refresher = self.refresher.clone();
        let period = self.period.max(Duration::from_millis(1));
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // tracking an address already refreshes it once
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => refresher.refresh_all().await,
                }
            }
            debug!("Balance refresh loop exited");
        });
        *slot = Some(RefreshLoop { token, handle });
        info!("Balance refresh loop started ({:?} interval)", period);
    }
}

impl Refresher {
    async fn refresh_all(&self) {
        let addresses: Vec<Address> = self.tracked.read().keys().copied().collect();
        for address in addresses {
            if let Err(e) = self.refresh_address(address).await {
                warn!("Balance refresh for {} failed: {}", format_address(&address), e);
            }
        }
    }

    async fn refresh_address(&self, address: Address) -> Result<Vec<AssetBalance>, WalletError> {
        let assets = self
            .tracked
            .read()
            .get(&address)
            .map(|e| e.assets.clone())
            .ok_or_else(|| {
                WalletError::NotFoundError(format!("{} is not tracked", format_address(&address)))
            })?;

        let now = Utc::now();
        let mut balances = Vec::with_capacity(assets.len() + 1);
        balances.push(AssetBalance {
            token_kind: AssetKind::Native,
            contract_address: None,
            token_id: None,
            owned_token_ids: Vec::new(),
            balance: self.ledger.get_balance(address).await?,
            decimals: self.native_decimals,
            symbol: self.native_symbol.clone(),
            usd_value: None,
            last_updated: now,
        });

        for asset in &assets {
            let (balance, owned_token_ids) = match asset.kind {
                AssetKind::Native => continue,
                AssetKind::Fungible => (self.balance_of(asset.contract_address, address).await?, Vec::new()),
                AssetKind::NonFungible => {
                    let count = self.balance_of(asset.contract_address, address).await?;
                    let ids = self.owned_token_ids(asset.contract_address, address, count).await?;
                    (count, ids)
                }
                // per-id balances need the token ids the holder owns, which
                // the standard does not enumerate
                AssetKind::MultiToken => (U256::zero(), Vec::new()),
            };
            balances.push(AssetBalance {
                token_kind: asset.kind,
                contract_address: Some(asset.contract_address),
                token_id: asset.token_id,
                owned_token_ids,
                balance,
                decimals: asset.decimals,
                symbol: asset.symbol.clone(),
                usd_value: None,
                last_updated: now,
            });
        }

        let symbols = price_symbols(&balances);
        let prices = self.prices.get_prices(&symbols).await;
        for b in balances.iter_mut() {
            b.usd_value = prices
                .get(&b.symbol)
                .and_then(|price| usd_value(b.balance, b.decimals, *price));
        }

        {
            let mut tracked = self.tracked.write();
            match tracked.get_mut(&address) {
                Some(entry) => entry.balances = balances.clone(),
                // untracked while the ledger was being read
                None => return Ok(balances),
            }
        }
        let total_usd = balances.iter().filter_map(|b| b.usd_value).sum();
        debug!("Refreshed {} assets for {}", balances.len(), format_address(&address));
        let _ = self.events.send(BalanceEvent::Refreshed { address, total_usd });
        Ok(balances)
    }

    async fn balance_of(&self, contract: Address, owner: Address) -> Result<U256, WalletError> {
        let out = self.ledger.call(contract, abi::encode_balance_of(&owner).into()).await?;
        abi::decode_uint256(&out)
    }

    /// At most `max_nft_ids` ids; further ids are not enumerated.
    async fn owned_token_ids(
        &self,
        contract: Address,
        owner: Address,
        count: U256,
    ) -> Result<Vec<String>, WalletError> {
        let limit = if count > U256::from(self.max_nft_ids) {
            self.max_nft_ids
        } else {
            count.as_usize()
        };
        let mut ids = Vec::with_capacity(limit);
        for index in 0..limit {
            let data = abi::encode_token_of_owner_by_index(&owner, index as u64);
            let out = self.ledger.call(contract, data.into()).await?;
            ids.push(abi::decode_uint256(&out)?.to_string());
        }
        Ok(ids)
    }
}

/// Distinct symbols to price, sorted.
fn price_symbols(balances: &[AssetBalance]) -> Vec<String> {
    let mut symbols: Vec<String> = balances.iter().map(|b| b.symbol.clone()).collect();
    symbols.sort();
    symbols.dedup();
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::{InMemoryLedger, StaticPriceFeed};

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        tracker: BalanceTracker,
    }

    fn fixture(refresh_secs: u64) -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let feed = Arc::new(StaticPriceFeed::new([
            ("ETH".to_string(), Decimal::new(2000, 0)),
            ("USDC".to_string(), Decimal::ONE),
            ("PUNK".to_string(), Decimal::new(50, 0)),
        ]));
        let prices = Arc::new(PriceOracle::new(feed, Duration::from_secs(300)));
        let config = BalanceConfig { refresh_interval_secs: refresh_secs, ..Default::default() };
        let tracker = BalanceTracker::new(
            ledger.clone(),
            prices,
            &NetworkConfig::default(),
            &config,
            CancellationToken::new(),
        );
        Fixture { ledger, tracker }
    }

    fn asset(kind: AssetKind, byte: u8, symbol: &str, decimals: u32) -> TrackedAsset {
        TrackedAsset {
            kind,
            contract_address: Address::repeat_byte(byte),
            symbol: symbol.into(),
            decimals,
            token_id: None,
        }
    }

    #[tokio::test]
    async fn test_track_address_refreshes_immediately() {
        let f = fixture(30);
        let owner = Address::repeat_byte(0x01);
        f.ledger.set_balance(owner, U256::exp10(18) * U256::from(2u64));
        f.ledger.set_token_balance(Address::repeat_byte(0xAA), owner, U256::from(1_500_000u64));

        let balances = f
            .tracker
            .track_address(owner, vec![asset(AssetKind::Fungible, 0xAA, "USDC", 6)])
            .await
            .unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].usd_value, Some(Decimal::new(4000, 0)));
        assert_eq!(balances[1].usd_value, Some(Decimal::new(15, 1)));
        assert_eq!(f.tracker.total_usd(&owner), Decimal::new(40015, 1));
        assert!(f.tracker.is_loop_running());
    }

    #[tokio::test]
    async fn test_nft_ids_are_capped_and_multi_token_reports_zero() {
        let f = fixture(30);
        let owner = Address::repeat_byte(0x02);
        let ids: Vec<U256> = (100..112u64).map(U256::from).collect();
        f.ledger.set_owned_tokens(Address::repeat_byte(0xBB), owner, &ids);

        let balances = f
            .tracker
            .track_address(
                owner,
                vec![
                    asset(AssetKind::NonFungible, 0xBB, "PUNK", 0),
                    asset(AssetKind::MultiToken, 0xCC, "ITEMS", 0),
                ],
            )
            .await
            .unwrap();
        let nft = &balances[1];
        assert_eq!(nft.balance, U256::from(12u64));
        assert_eq!(nft.owned_token_ids.len(), 10);
        assert_eq!(nft.owned_token_ids[0], "100");
        assert_eq!(nft.usd_value, Some(Decimal::new(600, 0)));
        assert_eq!(balances[2].balance, U256::zero());
        assert_eq!(balances[2].usd_value, None);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let f = fixture(30);
        let owner = Address::repeat_byte(0x03);
        f.ledger.set_balance(owner, U256::from(5u64));
        f.tracker.track_address(owner, vec![]).await.unwrap();

        f.ledger.set_offline(true);
        f.ledger.set_balance(owner, U256::from(9u64));
        assert!(matches!(f.tracker.refresh(owner).await, Err(WalletError::NetworkError(_))));
        assert_eq!(f.tracker.get_balances(&owner).unwrap()[0].balance, U256::from(5u64));
    }

    #[tokio::test]
    async fn test_stop_tracking_last_address_stops_loop() {
        let f = fixture(30);
        let a = Address::repeat_byte(0x04);
        let b = Address::repeat_byte(0x05);
        f.tracker.track_address(a, vec![]).await.unwrap();
        f.tracker.track_address(b, vec![]).await.unwrap();

        assert!(f.tracker.stop_tracking(&a));
        assert!(f.tracker.is_loop_running());
        assert!(f.tracker.stop_tracking(&b));
        assert!(!f.tracker.is_loop_running());
        assert!(!f.tracker.stop_tracking(&b));
        assert!(matches!(f.tracker.refresh(a).await, Err(WalletError::NotFoundError(_))));
    }

    #[tokio::test]
    async fn test_shared_loop_picks_up_new_balances() {
        let f = fixture(1);
        let owner = Address::repeat_byte(0x06);
        let mut events = f.tracker.subscribe();
        f.tracker.track_address(owner, vec![]).await.unwrap();
        f.ledger.set_balance(owner, U256::exp10(18));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::time::timeout_at(deadline, events.recv()).await.unwrap().unwrap();
            if let BalanceEvent::Refreshed { total_usd, .. } = event {
                if total_usd == Decimal::new(2000, 0) {
                    break;
                }
            }
        }
        assert_eq!(f.tracker.get_balances(&owner).unwrap()[0].balance, U256::exp10(18));
    }

    #[test]
    fn test_price_symbols_are_distinct() {
        let balance = |symbol: &str| AssetBalance {
            token_kind: AssetKind::Fungible,
            contract_address: None,
            token_id: None,
            owned_token_ids: Vec::new(),
            balance: U256::one(),
            decimals: 18,
            symbol: symbol.into(),
            usd_value: None,
            last_updated: Utc::now(),
        };
        let balances = vec![balance("ETH"), balance("USDC"), balance("ETH"), balance("DAI"), balance("USDC")];
        assert_eq!(price_symbols(&balances), vec!["DAI", "ETH", "USDC"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_track_and_stop_keep_the_loop_alive() {
        let f = fixture(30);
        let tracker = Arc::new(f.tracker);
        for round in 0..50u8 {
            let leaving = Address::repeat_byte(0x10);
            let joining = Address::repeat_byte(0x20 + round % 8);
            tracker.track_address(leaving, vec![]).await.unwrap();

            let stopper = {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.stop_tracking(&leaving) })
            };
            let joiner = {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.track_address(joining, vec![]).await })
            };
            assert!(stopper.await.unwrap());
            joiner.await.unwrap().unwrap();

            assert!(tracker.is_tracking(&joining));
            assert!(tracker.is_loop_running(), "round {} lost the refresh loop", round);
            assert!(tracker.stop_tracking(&joining));
            assert!(!tracker.is_loop_running());
        }
    }
}
