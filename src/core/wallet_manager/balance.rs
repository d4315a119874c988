//! Balance queries

use super::WalletManager;
use crate::balance::WalletStats;
use crate::core::domain::{AssetBalance, TrackedAsset};
use crate::core::errors::WalletError;

impl WalletManager {
    /// Start tracking a wallet's address with `assets` on top of the native balance.
    pub async fn track_wallet(
        &self,
        wallet_id: &str,
        assets: Vec<TrackedAsset>,
    ) -> Result<Vec<AssetBalance>, WalletError> {
        let wallet = self.wallet(wallet_id)?;
        self.balances.track_address(wallet.address, assets).await
    }

    pub fn untrack_wallet(&self, wallet_id: &str) -> Result<bool, WalletError> {
        let wallet = self.wallet(wallet_id)?;
        Ok(self.balances.stop_tracking(&wallet.address))
    }

    /// Latest balances; an untracked wallet starts being tracked (native only).
    pub async fn get_balances(&self, wallet_id: &str) -> Result<Vec<AssetBalance>, WalletError> {
        let wallet = self.wallet(wallet_id)?;
        match self.balances.get_balances(&wallet.address) {
            Some(balances) => Ok(balances),
            None => self.balances.track_address(wallet.address, Vec::new()).await,
        }
    }

    pub fn get_stats(&self, wallet_id: &str) -> Result<WalletStats, WalletError> {
        let wallet = self.wallet(wallet_id)?;
        let transactions = self.transactions.list_for_wallet(wallet_id);
        Ok(self.balances.calculate_stats(wallet.address, &transactions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::AssetKind;
    use crate::core::wallet_manager::testing::harness;
    use crate::core::wallet_manager::Credential;
    use crate::transactions::TransferRequest;
    use ethers::types::{Address, U256};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_balances_and_stats() {
        let h = harness().await;
        let w = h.manager.create_wallet("pw").await.unwrap();
        let usdc = Address::repeat_byte(0xAA);
        h.ledger.set_balance(w.address, U256::exp10(18));
        h.ledger.set_token_balance(usdc, w.address, U256::from(2_500_000u64));

        let balances = h
            .manager
            .track_wallet(
                &w.wallet_id,
                vec![TrackedAsset {
                    kind: AssetKind::Fungible,
                    contract_address: usdc,
                    symbol: "USDC".into(),
                    decimals: 6,
                    token_id: None,
                }],
            )
            .await
            .unwrap();
        assert_eq!(balances.len(), 2);

        let request = TransferRequest::native("0x2222222222222222222222222222222222222222", "500")
            .with_gas_price("1000000000");
        h.manager
            .submit_transaction(&w.wallet_id, &request, Credential::Password("pw"))
            .await
            .unwrap();

        let stats = h.manager.get_stats(&w.wallet_id).unwrap();
        assert_eq!(stats.transaction_count, 1);
        assert_eq!(stats.volume_by_kind[&AssetKind::Native], U256::from(500u64));
        assert_eq!(stats.non_zero_assets, 2);
        assert_eq!(stats.total_usd, Decimal::new(20025, 1));

        assert!(h.manager.untrack_wallet(&w.wallet_id).unwrap());
    }

    #[tokio::test]
    async fn test_get_balances_tracks_on_demand() {
        let h = harness().await;
        let w = h.manager.create_wallet("pw").await.unwrap();
        h.ledger.set_balance(w.address, U256::exp10(17));
        let balances = h.manager.get_balances(&w.wallet_id).await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].usd_value, Some(Decimal::new(200, 0)));
        assert!(h.manager.balances().is_tracking(&w.address));
    }
}
