//! Event fan-in and the bounded audit log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::WalletManager;
use crate::balance::BalanceEvent;
use crate::core::key_manager::ExportFormat;
use crate::recovery::RecoveryEvent;
use crate::transactions::TxEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalletEvent {
    Created { wallet_id: String, address: Address },
    Imported { wallet_id: String, address: Address },
    Removed { wallet_id: String },
    Exported { wallet_id: String, format: ExportFormat },
    Unlocked { wallet_id: String, expires_at: DateTime<Utc> },
    Locked { wallet_id: String },
    Transaction { event: TxEvent },
    Balance { event: BalanceEvent },
    Recovery { event: RecoveryEvent },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: WalletEvent,
}

/// Append-only ring: the oldest entry is dropped once `capacity` is reached.
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    entries: VecDeque<AuditEntry>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: VecDeque::with_capacity(capacity.min(1024)) }
    }

    pub fn push(&mut self, event: WalletEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(AuditEntry { timestamp: Utc::now(), event });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }
}

/// Map a closed channel to `None` and skip over lag.
fn forwarded<T>(result: Result<T, RecvError>, source: &str) -> Option<Option<T>> {
    match result {
        Ok(event) => Some(Some(event)),
        Err(RecvError::Lagged(n)) => {
            warn!("Audit forwarder lagged {} {} events", n, source);
            Some(None)
        }
        Err(RecvError::Closed) => None,
    }
}

impl WalletManager {
    /// Record `event` in the audit log and publish it to subscribers.
    pub(crate) fn record(&self, event: WalletEvent) {
        record(&self.audit, &self.events, event);
    }

    /// Audit entries, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.read().entries().cloned().collect()
    }

    pub fn audit_len(&self) -> usize {
        self.audit.read().len()
    }

    pub(super) fn spawn_event_forwarder(&self) -> JoinHandle<()> {
        let mut tx_events = self.transactions.subscribe();
        let mut balance_events = self.balances.subscribe();
        let mut recovery_events = self.recovery.subscribe();
        let audit = self.audit.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown.child_token();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    r = tx_events.recv() => match forwarded(r, "transaction") {
                        Some(e) => e.map(|event| WalletEvent::Transaction { event }),
                        None => break,
                    },
                    r = balance_events.recv() => match forwarded(r, "balance") {
                        Some(e) => e.map(|event| WalletEvent::Balance { event }),
                        None => break,
                    },
                    r = recovery_events.recv() => match forwarded(r, "recovery") {
                        Some(e) => e.map(|event| WalletEvent::Recovery { event }),
                        None => break,
                    },
                };
                if let Some(event) = event {
                    record(&audit, &events, event);
                }
            }
            debug!("Audit forwarder stopped");
        })
    }
}

fn record(
    audit: &parking_lot::RwLock<AuditLog>,
    events: &broadcast::Sender<WalletEvent>,
    event: WalletEvent,
) {
    audit.write().push(event.clone());
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wallet_manager::testing::harness;
    use std::time::Duration;

    #[test]
    fn test_audit_log_is_bounded() {
        let mut log = AuditLog::new(3);
        for i in 0..5 {
            log.push(WalletEvent::Removed { wallet_id: format!("w{}", i) });
        }
        assert_eq!(log.len(), 3);
        let ids: Vec<_> = log
            .entries()
            .map(|e| match &e.event {
                WalletEvent::Removed { wallet_id } => wallet_id.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec!["w2", "w3", "w4"]);
    }

    #[tokio::test]
    async fn test_component_events_reach_the_audit_log() {
        let h = harness().await;
        let mut events = h.manager.subscribe();
        let created = h.manager.create_wallet("pw").await.unwrap();
        h.manager
            .recovery()
            .register_guardians(&created.wallet_id, vec!["g1".into()])
            .unwrap();
        h.manager
            .initiate_timelock_recovery(&created.wallet_id, "owner")
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::time::timeout_at(deadline, events.recv()).await.unwrap().unwrap();
            if matches!(event, WalletEvent::Recovery { event: RecoveryEvent::AttemptOpened { .. } }) {
                break;
            }
        }
        let log = h.manager.audit_log();
        assert!(matches!(log[0].event, WalletEvent::Created { .. }));
        assert!(log
            .iter()
            .any(|e| matches!(e.event, WalletEvent::Recovery { event: RecoveryEvent::AttemptOpened { .. } })));
    }
}
