//! Confirmation watcher: one shared polling loop for every pending transaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{TransactionManager, TxEvent};
use crate::core::domain::{Transaction, TxStatus};
use crate::ledger::{LedgerClient, Receipt};

/// Query receipts for every pending transaction and apply the results.
///
/// Receipts are fetched with no lock held. A result is only applied if the
/// transaction is still pending, so a concurrent poll can never move a
/// transaction twice. Network errors leave the transaction pending for the
/// next round. Returns how many transactions reached a terminal state.
pub(crate) async fn poll_pending(
    ledger: &dyn LedgerClient,
    transactions: &RwLock<HashMap<String, Transaction>>,
    events: &broadcast::Sender<TxEvent>,
) -> usize {
    let pending: Vec<(String, ethers::types::H256)> = transactions
        .read()
        .values()
        .filter(|tx| tx.status == TxStatus::Pending)
        .map(|tx| (tx.id.clone(), tx.hash))
        .collect();
    if pending.is_empty() {
        return 0;
    }
    debug!("Polling {} pending transactions", pending.len());

    let mut receipts: Vec<(String, Receipt)> = Vec::new();
    for (id, hash) in pending {
        match ledger.get_receipt(hash).await {
            Ok(Some(receipt)) => receipts.push((id, receipt)),
            Ok(None) => {}
            Err(e) => warn!("Receipt lookup for {:?} failed, will retry: {}", hash, e),
        }
    }

    let mut resolved = Vec::new();
    {
        let mut txs = transactions.write();
        for (id, receipt) in receipts {
            let Some(tx) = txs.get_mut(&id) else { continue };
            if tx.status != TxStatus::Pending {
                continue;
            }
            tx.status = if receipt.success { TxStatus::Confirmed } else { TxStatus::Failed };
            tx.block_number = Some(receipt.block_number);
            tx.block_hash = Some(receipt.block_hash);
            tx.gas_used = Some(receipt.gas_used);
            resolved.push(tx.clone());
        }

        // a mined transaction invalidates every other pending one with the same sender and nonce
        let mined: Vec<(ethers::types::Address, u64)> =
            resolved.iter().map(|tx| (tx.from, tx.nonce)).collect();
        for tx in txs.values_mut() {
            if tx.status == TxStatus::Pending && mined.contains(&(tx.from, tx.nonce)) {
                tx.status = TxStatus::Failed;
                resolved.push(tx.clone());
            }
        }
    }

    for tx in &resolved {
        info!("Transaction {} ({:?}) is now {:?}", tx.id, tx.hash, tx.status);
        let _ = events.send(TxEvent::StatusChanged {
            id: tx.id.clone(),
            wallet_id: tx.wallet_id.clone(),
            hash: tx.hash,
            status: tx.status,
            block_number: tx.block_number,
        });
    }
    resolved.len()
}

impl TransactionManager {
    /// Run one confirmation round immediately.
    pub async fn poll_pending(&self) -> usize {
        poll_pending(self.ledger.as_ref(), &self.transactions, &self.events).await
    }

    /// Start the shared polling loop unless it is already running.
    pub(crate) fn ensure_watcher(&self) {
        let mut slot = self.watcher.lock();
        if slot.as_ref().map_or(false, |h| !h.is_finished()) {
            return;
        }

        let ledger: Arc<dyn LedgerClient> = self.ledger.clone();
        let transactions = self.transactions.clone();
        let events = self.events.clone();
        let period = self.config.poll_interval().max(Duration::from_millis(1));
        let shutdown = self.shutdown.child_token();

        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately; confirmations cannot exist yet
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Confirmation watcher shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        poll_pending(ledger.as_ref(), &transactions, &events).await;
                    }
                }
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::AssetKind;
    use crate::ledger::memory::InMemoryLedger;
    use chrono::Utc;
    use ethers::types::{Address, H256, U256};

    fn pending_tx(id: &str, hash: H256, nonce: u64) -> Transaction {
        Transaction {
            id: id.to_string(),
            wallet_id: "w".into(),
            hash,
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            value: U256::one(),
            token_kind: AssetKind::Native,
            contract_address: None,
            token_id: None,
            nonce,
            gas_price: U256::from(10u64),
            gas_limit: U256::from(21_000u64),
            gas_used: None,
            status: TxStatus::Pending,
            block_number: None,
            block_hash: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_poll_applies_receipts_once() {
        let ledger = InMemoryLedger::new();
        let (events, mut rx) = broadcast::channel(16);
        let txs = RwLock::new(HashMap::new());
        let hash = H256::repeat_byte(0xAA);
        txs.write().insert("a".to_string(), pending_tx("a", hash, 0));

        assert_eq!(poll_pending(&ledger, &txs, &events).await, 0);
        ledger.mine(hash, false, U256::from(21_000u64));
        assert_eq!(poll_pending(&ledger, &txs, &events).await, 1);
        assert_eq!(txs.read()["a"].status, TxStatus::Failed);
        assert_eq!(txs.read()["a"].block_number, Some(1));
        assert!(matches!(
            rx.try_recv().unwrap(),
            TxEvent::StatusChanged { status: TxStatus::Failed, .. }
        ));

        // terminal state is never revisited
        assert_eq!(poll_pending(&ledger, &txs, &events).await, 0);
    }

    #[tokio::test]
    async fn test_network_errors_keep_pending() {
        let ledger = InMemoryLedger::new();
        let (events, _rx) = broadcast::channel(16);
        let txs = RwLock::new(HashMap::new());
        let hash = H256::repeat_byte(0xBB);
        txs.write().insert("b".to_string(), pending_tx("b", hash, 0));
        ledger.mine(hash, true, U256::from(21_000u64));

        ledger.set_offline(true);
        assert_eq!(poll_pending(&ledger, &txs, &events).await, 0);
        assert_eq!(txs.read()["b"].status, TxStatus::Pending);

        ledger.set_offline(false);
        assert_eq!(poll_pending(&ledger, &txs, &events).await, 1);
        assert_eq!(txs.read()["b"].status, TxStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_mined_replacement_fails_the_original() {
        let ledger = InMemoryLedger::new();
        let (events, _rx) = broadcast::channel(16);
        let txs = RwLock::new(HashMap::new());
        let original = H256::repeat_byte(0x01);
        let replacement = H256::repeat_byte(0x02);
        txs.write().insert("orig".to_string(), pending_tx("orig", original, 4));
        txs.write().insert("repl".to_string(), pending_tx("repl", replacement, 4));

        ledger.mine(replacement, true, U256::from(21_000u64));
        assert_eq!(poll_pending(&ledger, &txs, &events).await, 2);
        assert_eq!(txs.read()["repl"].status, TxStatus::Confirmed);
        assert_eq!(txs.read()["orig"].status, TxStatus::Failed);
    }
}
