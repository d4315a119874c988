//! Wallet lifecycle management
//!
//! Provides wallet creation, import, removal, export and listing.

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::session::verify_password;
use super::{WalletEvent, WalletManager};
use crate::core::errors::WalletError;
use crate::core::key_manager::{EncryptedWallet, ExportFormat, ExportedWallet, WalletRecovery};
use crate::security::SecretString;

/// Public view of a registered wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub id: String,
    pub address: Address,
    pub derivation_path: String,
    pub has_mnemonic: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&EncryptedWallet> for WalletInfo {
    fn from(wallet: &EncryptedWallet) -> Self {
        Self {
            id: wallet.id.clone(),
            address: wallet.address,
            derivation_path: wallet.derivation_path.clone(),
            has_mnemonic: wallet.mnemonic.is_some(),
            created_at: wallet.created_at,
        }
    }
}

/// Result of [`WalletManager::create_wallet`]. The mnemonic is shown once.
pub struct CreatedWallet {
    pub wallet_id: String,
    pub address: Address,
    pub mnemonic: SecretString,
}

impl std::fmt::Debug for CreatedWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedWallet")
            .field("wallet_id", &self.wallet_id)
            .field("address", &self.address)
            .field("mnemonic", &"<redacted>")
            .finish()
    }
}

impl WalletManager {
    /// Generate a fresh 24-word wallet encrypted under `password`.
    pub async fn create_wallet(&self, password: &str) -> Result<CreatedWallet, WalletError> {
        if password.is_empty() {
            return Err(WalletError::ValidationError("password cannot be empty".into()));
        }
        let generated = self.key_manager.generate_wallet(None)?;
        let id = Uuid::new_v4().to_string();
        let wallet = self
            .key_manager
            .create_encrypted_wallet(&generated.mnemonic, password, &id)
            .await?;
        let address = wallet.address;
        self.wallets.write().insert(id.clone(), wallet);
        info!("Created wallet {}", id);
        self.record(WalletEvent::Created { wallet_id: id.clone(), address });
        Ok(CreatedWallet { wallet_id: id, address, mnemonic: generated.mnemonic })
    }

    /// Import from exactly one recovery source and register under a fresh id.
    pub async fn import_wallet(
        &self,
        recovery: WalletRecovery,
        password: &str,
    ) -> Result<WalletInfo, WalletError> {
        if password.is_empty() {
            return Err(WalletError::ValidationError("password cannot be empty".into()));
        }
        let wallet = self.key_manager.import_wallet(recovery, password).await?;
        let info = WalletInfo::from(&wallet);
        {
            let mut wallets = self.wallets.write();
            if let Some(existing) = wallets.values().find(|w| w.address == wallet.address) {
                warn!("Imported address is already held by wallet {}", existing.id);
            }
            wallets.insert(wallet.id.clone(), wallet);
        }
        info!("Imported wallet {}", info.id);
        self.record(WalletEvent::Imported { wallet_id: info.id.clone(), address: info.address });
        Ok(info)
    }

    /// Remove a wallet after verifying `password`. All of its sessions,
    /// balance tracking and recovery state go with it.
    pub async fn remove_wallet(&self, wallet_id: &str, password: &str) -> Result<(), WalletError> {
        let wallet = self.wallet(wallet_id)?;
        verify_password(&self.key_manager, &wallet, password).await?;

        if self.wallets.write().remove(wallet_id).is_none() {
            return Err(WalletError::NotFoundError(format!("wallet {}", wallet_id)));
        }
        self.sessions.write().remove(wallet_id);
        let still_used = self.wallets.read().values().any(|w| w.address == wallet.address);
        if !still_used {
            self.balances.stop_tracking(&wallet.address);
        }
        self.recovery.remove_wallet(wallet_id);
        info!("Removed wallet {}", wallet_id);
        self.record(WalletEvent::Removed { wallet_id: wallet_id.to_string() });
        Ok(())
    }

    pub async fn export_wallet(
        &self,
        wallet_id: &str,
        password: &str,
        format: ExportFormat,
    ) -> Result<ExportedWallet, WalletError> {
        let wallet = self.wallet(wallet_id)?;
        let exported = self.key_manager.export_wallet(&wallet, password, format).await?;
        info!("Exported wallet {} as {:?}", wallet_id, format);
        self.record(WalletEvent::Exported { wallet_id: wallet_id.to_string(), format });
        Ok(exported)
    }

    pub fn get_wallet(&self, wallet_id: &str) -> Result<WalletInfo, WalletError> {
        self.wallet(wallet_id).map(|w| WalletInfo::from(&w))
    }

    /// Registered wallets, oldest first.
    pub fn list_wallets(&self) -> Vec<WalletInfo> {
        let mut wallets: Vec<WalletInfo> = self.wallets.read().values().map(WalletInfo::from).collect();
        wallets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        wallets
    }
}
