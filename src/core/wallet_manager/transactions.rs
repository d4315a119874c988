//! Transaction operations

use ethers::types::H256;
use tracing::info;

use super::{Credential, WalletManager};
use crate::core::domain::Transaction;
use crate::core::errors::WalletError;
use crate::transactions::TransferRequest;

impl WalletManager {
    /// Sign and broadcast a transfer. Returns the pending transaction as soon
    /// as the ledger accepts it; confirmation arrives via events or queries.
    pub async fn submit_transaction(
        &self,
        wallet_id: &str,
        request: &TransferRequest,
        credential: Credential<'_>,
    ) -> Result<Transaction, WalletError> {
        let wallet = self.wallet(wallet_id)?;
        let root = self.resolve_root(&wallet, credential).await?;
        let signed = self.transactions.prepare_with_root(request, &wallet, &root).await?;
        self.transactions.broadcast_transaction(signed, wallet_id).await
    }

    /// Replace a pending transaction of `wallet_id` with a zero-value self-transfer.
    pub async fn cancel_transaction(
        &self,
        wallet_id: &str,
        hash: H256,
        credential: Credential<'_>,
    ) -> Result<Transaction, WalletError> {
        let wallet = self.wallet(wallet_id)?;
        match self.transactions.get_by_hash(&hash) {
            Some(tx) if tx.wallet_id == wallet_id => {}
            Some(_) => {
                return Err(WalletError::Unauthorized(format!(
                    "transaction {:?} does not belong to wallet {}",
                    hash, wallet_id
                )))
            }
            None => return Err(WalletError::NotFoundError(format!("transaction {:?}", hash))),
        }
        let root = self.resolve_root(&wallet, credential).await?;
        let replacement = self.transactions.cancel_with_root(hash, &wallet, &root)?;
        let tx = self.transactions.broadcast_transaction(replacement, wallet_id).await?;
        info!("Cancellation {:?} broadcast for {:?}", tx.hash, hash);
        Ok(tx)
    }

    pub fn get_transaction(&self, id: &str) -> Result<Transaction, WalletError> {
        self.transactions
            .get_transaction(id)
            .ok_or_else(|| WalletError::NotFoundError(format!("transaction {}", id)))
    }

    pub fn list_transactions(&self, wallet_id: &str) -> Result<Vec<Transaction>, WalletError> {
        self.wallet(wallet_id)?;
        Ok(self.transactions.list_for_wallet(wallet_id))
    }
}
