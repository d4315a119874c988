//! Multisig recovery configuration. Signing itself happens outside this crate.

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::RecoveryManager;
use crate::core::domain::format_address;
use crate::core::errors::WalletError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigConfig {
    pub signers: Vec<Address>,
    pub threshold: u8,
}

impl MultisigConfig {
    pub fn validate(&self) -> Result<(), WalletError> {
        if self.signers.is_empty() {
            return Err(WalletError::ValidationError("signer list cannot be empty".into()));
        }
        if self.threshold == 0 {
            return Err(WalletError::ValidationError("threshold must be at least 1".into()));
        }
        if self.threshold as usize > self.signers.len() {
            return Err(WalletError::ValidationError(format!(
                "threshold ({}) cannot exceed signer count ({})",
                self.threshold,
                self.signers.len()
            )));
        }
        for (i, signer) in self.signers.iter().enumerate() {
            if self.signers[..i].contains(signer) {
                return Err(WalletError::ValidationError(format!(
                    "duplicate signer {}",
                    format_address(signer)
                )));
            }
        }
        Ok(())
    }

    pub fn is_signer(&self, address: &Address) -> bool {
        self.signers.contains(address)
    }
}

impl RecoveryManager {
    pub fn configure_multisig(
        &self,
        wallet_id: &str,
        config: MultisigConfig,
    ) -> Result<MultisigConfig, WalletError> {
        config.validate()?;
        self.state.write().multisig.insert(wallet_id.to_string(), config.clone());
        info!(
            "Multisig recovery for {}: {} of {} signers",
            wallet_id,
            config.threshold,
            config.signers.len()
        );
        Ok(config)
    }

    pub fn get_multisig_config(&self, wallet_id: &str) -> Option<MultisigConfig> {
        self.state.read().multisig.get(wallet_id).cloned()
    }
}
