//! Credentials and the short-lived session cache.
//!
//! `unlock` keeps the decrypted root in memory (zeroized on drop) for
//! `session_ttl_secs`, so signing does not pay for key stretching on every
//! call. Callers that never unlock keep the password-per-call behavior.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{WalletEvent, WalletManager};
use crate::core::errors::WalletError;
use crate::core::key_manager::{EncryptedWallet, KeyManager, RootKey};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How a signing or destructive operation proves access to a wallet.
#[derive(Clone, Copy)]
pub enum Credential<'a> {
    Password(&'a str),
    /// Use the root cached by [`WalletManager::unlock`].
    Session,
}

impl std::fmt::Debug for Credential<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Credential::Password(<redacted>)"),
            Credential::Session => f.write_str("Credential::Session"),
        }
    }
}

pub(crate) struct Session {
    root: RootKey,
    expires_at: Instant,
}

impl Session {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Decrypt the wallet root, reporting a bad password as `Unauthorized`.
pub(crate) async fn verify_password(
    key_manager: &KeyManager,
    wallet: &EncryptedWallet,
    password: &str,
) -> Result<RootKey, WalletError> {
    key_manager.unlock_root(wallet, password).await.map_err(|e| match e {
        WalletError::DecryptionError(_) => {
            WalletError::Unauthorized(format!("password verification failed for wallet {}", wallet.id))
        }
        other => other,
    })
}

impl WalletManager {
    /// Verify `password` and cache the root for the configured session TTL.
    pub async fn unlock(&self, wallet_id: &str, password: &str) -> Result<DateTime<Utc>, WalletError> {
        let wallet = self.wallet(wallet_id)?;
        let root = verify_password(&self.key_manager, &wallet, password).await?;
        let ttl = Duration::from_secs(self.config.security.session_ttl_secs);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|_| WalletError::ConfigError("session_ttl_secs is too large".into()))?;
        self.sessions
            .write()
            .insert(wallet_id.to_string(), Session { root, expires_at: Instant::now() + ttl });
        info!("Wallet {} unlocked until {}", wallet_id, expires_at);
        self.record(WalletEvent::Unlocked { wallet_id: wallet_id.to_string(), expires_at });
        Ok(expires_at)
    }

    /// Drop the cached root. Returns whether a session existed.
    pub fn lock(&self, wallet_id: &str) -> bool {
        let removed = self.sessions.write().remove(wallet_id).is_some();
        if removed {
            info!("Wallet {} locked", wallet_id);
            self.record(WalletEvent::Locked { wallet_id: wallet_id.to_string() });
        }
        removed
    }

    pub fn is_unlocked(&self, wallet_id: &str) -> bool {
        let now = Instant::now();
        self.sessions.read().get(wallet_id).map_or(false, |s| s.is_live(now))
    }

    /// Remove expired sessions.
    pub fn sweep_sessions(&self) -> usize {
        sweep(&self.sessions)
    }

    pub(crate) async fn resolve_root(
        &self,
        wallet: &EncryptedWallet,
        credential: Credential<'_>,
    ) -> Result<RootKey, WalletError> {
        match credential {
            Credential::Password(password) => verify_password(&self.key_manager, wallet, password).await,
            Credential::Session => {
                let now = Instant::now();
                self.sessions
                    .read()
                    .get(&wallet.id)
                    .filter(|s| s.is_live(now))
                    .map(|s| s.root.clone())
                    .ok_or_else(|| {
                        WalletError::Unauthorized(format!("wallet {} has no active session", wallet.id))
                    })
            }
        }
    }

    pub(super) fn spawn_session_sweeper(&self) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move {
            let mut ticker = interval(SESSION_SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = sweep(&sessions);
                        if purged > 0 {
                            debug!("Expired {} wallet sessions", purged);
                        }
                    }
                }
            }
        })
    }
}

fn sweep(sessions: &parking_lot::RwLock<std::collections::HashMap<String, Session>>) -> usize {
    let now = Instant::now();
    let mut sessions = sessions.write();
    let before = sessions.len();
    sessions.retain(|_, s| s.is_live(now));
    before - sessions.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wallet_manager::testing::{harness, harness_with, test_config};

    #[tokio::test]
    async fn test_unlock_and_lock() {
        let h = harness().await;
        let w = h.manager.create_wallet("pw").await.unwrap();
        assert!(!h.manager.is_unlocked(&w.wallet_id));

        assert!(matches!(
            h.manager.unlock(&w.wallet_id, "nope").await,
            Err(WalletError::Unauthorized(_))
        ));
        h.manager.unlock(&w.wallet_id, "pw").await.unwrap();
        assert!(h.manager.is_unlocked(&w.wallet_id));

        let wallet = h.manager.wallet(&w.wallet_id).unwrap();
        assert!(h.manager.resolve_root(&wallet, Credential::Session).await.is_ok());

        assert!(h.manager.lock(&w.wallet_id));
        assert!(!h.manager.lock(&w.wallet_id));
        assert!(matches!(
            h.manager.resolve_root(&wallet, Credential::Session).await,
            Err(WalletError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_sessions_are_rejected_and_swept() {
        let mut config = test_config();
        config.security.session_ttl_secs = 0;
        let h = harness_with(config).await;
        let w = h.manager.create_wallet("pw").await.unwrap();
        h.manager.unlock(&w.wallet_id, "pw").await.unwrap();

        assert!(!h.manager.is_unlocked(&w.wallet_id));
        let wallet = h.manager.wallet(&w.wallet_id).unwrap();
        assert!(h.manager.resolve_root(&wallet, Credential::Session).await.is_err());
        assert_eq!(h.manager.sweep_sessions(), 1);
    }

    #[test]
    fn test_credential_debug_redacts_password() {
        let shown = format!("{:?}", Credential::Password("hunter2"));
        assert!(!shown.contains("hunter2"));
    }
}
