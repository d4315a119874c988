//! Local nonce tracking.
//!
//! The chain only learns about a nonce once a transaction is broadcast, so
//! back-to-back submissions from one address would otherwise collide. The
//! tracker hands out `max(chain nonce, last local nonce + 1)`.

use std::collections::HashMap;

use ethers::types::Address;
use parking_lot::RwLock;
use tracing::debug;

use crate::core::domain::format_address;
use crate::core::errors::WalletError;

#[derive(Debug, Default)]
pub struct NonceTracker {
    next: RwLock<HashMap<Address, u64>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next nonce for `address` given what the chain reports.
    pub fn reserve(&self, address: Address, chain_nonce: u64) -> Result<u64, WalletError> {
        let mut next = self.next.write();
        let slot = next.entry(address).or_insert(0);
        let nonce = (*slot).max(chain_nonce);
        *slot = nonce.checked_add(1).ok_or_else(|| {
            WalletError::ValidationError(format!("Nonce overflow for {}", format_address(&address)))
        })?;
        debug!("Reserved nonce {} for {}", nonce, format_address(&address));
        Ok(nonce)
    }

    /// Record a nonce consumed outside `reserve` (e.g. an explicit override).
    pub fn mark_used(&self, address: Address, nonce: u64) {
        let mut next = self.next.write();
        let slot = next.entry(address).or_insert(0);
        if nonce >= *slot {
            *slot = nonce.saturating_add(1);
        }
    }

    /// Give back the most recent reservation after a failed broadcast.
    pub fn release(&self, address: Address, nonce: u64) {
        let mut next = self.next.write();
        if let Some(slot) = next.get_mut(&address) {
            if *slot == nonce.saturating_add(1) {
                *slot = nonce;
            }
        }
    }

    pub fn peek(&self, address: &Address) -> Option<u64> {
        self.next.read().get(address).copied()
    }
}
