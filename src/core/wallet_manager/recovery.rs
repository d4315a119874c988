//! Recovery surface of the wallet manager.

use tracing::info;

use super::{WalletEvent, WalletInfo, WalletManager};
use crate::core::errors::WalletError;
use crate::core::key_manager::WalletRecovery;
use crate::crypto::shamir::ShamirShare;
use crate::recovery::{
    BackupReport, MultisigConfig, RecoveryAttempt, RecoveryConfig, RecoveryStatus, SocialRecoveryRequest,
    TimeLock, TimeLockStatus,
};
use crate::security::SecretString;

impl WalletManager {
    pub async fn create_recovery_backup(
        &self,
        wallet_id: &str,
        config: &RecoveryConfig,
        password: &str,
    ) -> Result<BackupReport, WalletError> {
        let wallet = self.wallet(wallet_id)?;
        self.recovery
            .create_recovery_backup(wallet_id, &wallet, config, password)
            .await
    }

    /// Rebuild a wallet from encrypted shares and register it under `new_password`.
    pub async fn recover_from_shares(
        &self,
        shares: Vec<ShamirShare>,
        share_password: SecretString,
        new_password: &str,
    ) -> Result<WalletInfo, WalletError> {
        let info = self
            .import_wallet(WalletRecovery::RecoveryShares { shares, share_password }, new_password)
            .await?;
        info!("Recovered wallet {} from shares", info.id);
        Ok(info)
    }

    pub fn initiate_social_recovery(
        &self,
        wallet_id: &str,
        requester: &str,
        guardians: Vec<String>,
    ) -> Result<SocialRecoveryRequest, WalletError> {
        self.wallet(wallet_id)?;
        self.recovery.initiate_social_recovery(wallet_id, requester, guardians)
    }

    pub fn approve_social_recovery(
        &self,
        request_id: &str,
        guardian: &str,
        approved: bool,
    ) -> Result<RecoveryStatus, WalletError> {
        self.recovery.approve_social_recovery(request_id, guardian, approved)
    }

    pub fn initiate_timelock_recovery(
        &self,
        wallet_id: &str,
        requester: &str,
    ) -> Result<TimeLock, WalletError> {
        self.wallet(wallet_id)?;
        self.recovery.initiate_timelock_recovery(wallet_id, requester)
    }

    pub fn check_timelock_status(&self, lock_id: &str) -> Result<TimeLockStatus, WalletError> {
        self.recovery.check_timelock_status(lock_id)
    }

    pub fn configure_multisig(
        &self,
        wallet_id: &str,
        config: MultisigConfig,
    ) -> Result<MultisigConfig, WalletError> {
        self.wallet(wallet_id)?;
        self.recovery.configure_multisig(wallet_id, config)
    }

    /// Execute an approved attempt. A wallet the attempt belongs to is
    /// locked afterwards so no session outlives a completed recovery.
    pub fn execute_recovery(&self, attempt_id: &str) -> Result<RecoveryAttempt, WalletError> {
        let attempt = self.recovery.execute_recovery(attempt_id)?;
        if self.sessions.write().remove(&attempt.wallet_id).is_some() {
            self.record(WalletEvent::Locked { wallet_id: attempt.wallet_id.clone() });
        }
        Ok(attempt)
    }

    pub fn list_recovery_attempts(&self, wallet_id: &str) -> Vec<RecoveryAttempt> {
        self.recovery.list_attempts(wallet_id)
    }
}
