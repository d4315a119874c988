//! Recovery methods: secret sharing, social (guardian) approval, time locks
//! and multisig configuration.
//!
//! All recovery state lives in one store behind one lock. Every operation
//! computes its outcome first and applies it in a single write, so a
//! concurrent reader sees an attempt either before or after a change, never
//! in between.

pub mod multisig;
pub mod social;
pub mod timelock;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::core::config::RecoverySettings;
use crate::core::errors::WalletError;
use crate::core::key_manager::{run_blocking, EncryptedWallet, KeyManager};
use crate::crypto::shamir::{self, ShamirShare};

pub use multisig::MultisigConfig;
pub use social::{social_threshold, GuardianSet, SocialRecoveryRequest};
pub use timelock::{TimeLock, TimeLockStatus};

const EVENT_CAPACITY: usize = 256;

/// How long a purged attempt keeps answering `Expired` before it is forgotten.
const TOMBSTONE_TTL_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMethod {
    Shamir,
    Social,
    Timelock,
    Multisig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl RecoveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecoveryStatus::Rejected | RecoveryStatus::Executed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub id: String,
    pub wallet_id: String,
    pub method: RecoveryMethod,
    pub status: RecoveryStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShamirSetup {
    pub threshold: u8,
    pub total_shares: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLockSetup {
    /// Overrides the configured delay.
    #[serde(default)]
    pub delay_secs: Option<u64>,
}

/// Which methods a backup sets up. Unset methods are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default)]
    pub shamir: Option<ShamirSetup>,
    /// Guardian identifiers.
    #[serde(default)]
    pub social: Option<Vec<String>>,
    #[serde(default)]
    pub timelock: Option<TimeLockSetup>,
    #[serde(default)]
    pub multisig: Option<MultisigConfig>,
}

/// Per-method outcome of [`RecoveryManager::create_recovery_backup`].
#[derive(Debug, Default)]
pub struct BackupReport {
    pub wallet_id: String,
    /// Encrypted shares for the caller to distribute; they are not retained.
    pub shamir: Option<Result<Vec<ShamirShare>, WalletError>>,
    pub social: Option<Result<GuardianSet, WalletError>>,
    pub timelock: Option<Result<Duration, WalletError>>,
    pub multisig: Option<Result<MultisigConfig, WalletError>>,
}

impl BackupReport {
    pub fn succeeded(&self) -> Vec<RecoveryMethod> {
        let mut methods = Vec::new();
        if matches!(self.shamir, Some(Ok(_))) {
            methods.push(RecoveryMethod::Shamir);
        }
        if matches!(self.social, Some(Ok(_))) {
            methods.push(RecoveryMethod::Social);
        }
        if matches!(self.timelock, Some(Ok(_))) {
            methods.push(RecoveryMethod::Timelock);
        }
        if matches!(self.multisig, Some(Ok(_))) {
            methods.push(RecoveryMethod::Multisig);
        }
        methods
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryEvent {
    BackupCreated { wallet_id: String, methods: Vec<RecoveryMethod> },
    AttemptOpened { attempt_id: String, wallet_id: String, method: RecoveryMethod },
    StatusChanged { attempt_id: String, wallet_id: String, status: RecoveryStatus },
    Purged { attempt_id: String, wallet_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ShareSetInfo {
    pub threshold: u8,
    pub total_shares: u8,
    pub created_at: DateTime<Utc>,
}

/// Everything the recovery component owns, keyed by wallet or attempt id.
#[derive(Debug, Default)]
pub(crate) struct RecoveryState {
    pub share_sets: HashMap<String, ShareSetInfo>,
    pub guardians: HashMap<String, GuardianSet>,
    pub timelock_delays: HashMap<String, Duration>,
    pub multisig: HashMap<String, MultisigConfig>,
    pub attempts: HashMap<String, RecoveryAttempt>,
    pub social_requests: HashMap<String, SocialRecoveryRequest>,
    pub time_locks: HashMap<String, TimeLock>,
    /// Purged attempt ids, so late calls report expiry instead of "not found".
    pub expired: HashMap<String, Tombstone>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tombstone {
    pub wallet_id: String,
    pub purged_at: DateTime<Utc>,
}

impl RecoveryState {
    pub fn open_attempt(
        &mut self,
        wallet_id: &str,
        method: RecoveryMethod,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> RecoveryAttempt {
        let attempt = RecoveryAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            wallet_id: wallet_id.to_string(),
            method,
            status: RecoveryStatus::Pending,
            created_at,
            expires_at,
        };
        self.attempts.insert(attempt.id.clone(), attempt.clone());
        attempt
    }

    /// Drop every expired, unexecuted attempt with its request or lock, and
    /// forget tombstones older than [`TOMBSTONE_TTL_SECS`].
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> Vec<RecoveryAttempt> {
        let horizon = now - secs(TOMBSTONE_TTL_SECS);
        self.expired.retain(|_, t| t.purged_at > horizon);
        let expired: Vec<String> = self
            .attempts
            .values()
            .filter(|a| a.status != RecoveryStatus::Executed && a.expires_at <= now)
            .map(|a| a.id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.purge(&id, now))
            .collect()
    }

    pub fn purge(&mut self, attempt_id: &str, now: DateTime<Utc>) -> Option<RecoveryAttempt> {
        self.social_requests.remove(attempt_id);
        self.time_locks.remove(attempt_id);
        let attempt = self.attempts.remove(attempt_id)?;
        self.expired.insert(
            attempt.id.clone(),
            Tombstone { wallet_id: attempt.wallet_id.clone(), purged_at: now },
        );
        Some(attempt)
    }

    /// `NotFoundError`, or `Expired` for an attempt purged after its window.
    pub fn missing(&self, attempt_id: &str) -> WalletError {
        if self.expired.contains_key(attempt_id) {
            WalletError::Expired(format!("recovery attempt {} has expired", attempt_id))
        } else {
            WalletError::NotFoundError(format!("recovery attempt {}", attempt_id))
        }
    }
}

/// Recovery manager
pub struct RecoveryManager {
    key_manager: KeyManager,
    settings: RecoverySettings,
    pub(crate) state: Arc<RwLock<RecoveryState>>,
    events: broadcast::Sender<RecoveryEvent>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl RecoveryManager {
    pub fn new(key_manager: KeyManager, settings: &RecoverySettings, shutdown: CancellationToken) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            key_manager,
            settings: settings.clone(),
            state: Arc::new(RwLock::new(RecoveryState::default())),
            events,
            sweeper: Mutex::new(None),
            shutdown,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: RecoveryEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn settings(&self) -> &RecoverySettings {
        &self.settings
    }

    /// Decrypt the wallet root once, then set up every method in `config`.
    ///
    /// A wrong password fails the whole call before anything is stored.
    /// After that each method succeeds or fails on its own and a failure
    /// never undoes another method's registration.
    pub async fn create_recovery_backup(
        &self,
        wallet_id: &str,
        wallet: &EncryptedWallet,
        config: &RecoveryConfig,
        password: &str,
    ) -> Result<BackupReport, WalletError> {
        let root = self.key_manager.unlock_root(wallet, password).await?;
        let mut report = BackupReport { wallet_id: wallet_id.to_string(), ..Default::default() };

        if let Some(setup) = &config.shamir {
            let material = Zeroizing::new(root.material().to_vec());
            let purpose = root.purpose();
            let share_password = Zeroizing::new(password.to_string());
            let kdf = self.key_manager.kdf();
            let (threshold, total) = (setup.threshold, setup.total_shares);
            let outcome = run_blocking(move || {
                let raw = shamir::split_secret(&material, threshold, total)?;
                shamir::encrypt_shares(&raw, purpose, &share_password, kdf)
            })
            .await;
            if outcome.is_ok() {
                self.state.write().share_sets.insert(
                    wallet_id.to_string(),
                    ShareSetInfo { threshold, total_shares: total, created_at: Utc::now() },
                );
            }
            report.shamir = Some(outcome);
        }
        if let Some(guardians) = &config.social {
            report.social = Some(self.register_guardians(wallet_id, guardians.clone()));
        }
        if let Some(setup) = &config.timelock {
            let delay = Duration::from_secs(setup.delay_secs.unwrap_or(self.settings.timelock_delay_secs));
            self.state.write().timelock_delays.insert(wallet_id.to_string(), delay);
            report.timelock = Some(Ok(delay));
        }
        if let Some(multisig) = &config.multisig {
            report.multisig = Some(self.configure_multisig(wallet_id, multisig.clone()));
        }

        for (method, failed) in [
            (RecoveryMethod::Shamir, matches!(report.shamir, Some(Err(_)))),
            (RecoveryMethod::Social, matches!(report.social, Some(Err(_)))),
            (RecoveryMethod::Multisig, matches!(report.multisig, Some(Err(_)))),
        ] {
            if failed {
                warn!("Recovery backup for {}: {:?} setup failed", wallet_id, method);
            }
        }
        let methods = report.succeeded();
        info!("Recovery backup for {} set up {:?}", wallet_id, methods);
        self.emit(RecoveryEvent::BackupCreated { wallet_id: wallet_id.to_string(), methods });
        Ok(report)
    }

    /// Share-set parameters registered for `wallet_id`, if any.
    pub fn share_set(&self, wallet_id: &str) -> Option<(u8, u8)> {
        self.state
            .read()
            .share_sets
            .get(wallet_id)
            .map(|s| (s.threshold, s.total_shares))
    }

    pub fn get_attempt(&self, attempt_id: &str) -> Option<RecoveryAttempt> {
        self.state.read().attempts.get(attempt_id).cloned()
    }

    pub fn list_attempts(&self, wallet_id: &str) -> Vec<RecoveryAttempt> {
        let mut attempts: Vec<RecoveryAttempt> = self
            .state
            .read()
            .attempts
            .values()
            .filter(|a| a.wallet_id == wallet_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.created_at);
        attempts
    }

    /// Mark an approved attempt executed. Succeeds exactly once per attempt.
    ///
    /// A time lock whose delay has elapsed counts as approved.
    pub fn execute_recovery(&self, attempt_id: &str) -> Result<RecoveryAttempt, WalletError> {
        let now = Utc::now();
        let executed = {
            let mut state = self.state.write();
            let ready_at = state.time_locks.get(attempt_id).map(|l| l.ready_at);
            if !state.attempts.contains_key(attempt_id) {
                return Err(state.missing(attempt_id));
            }
            let attempt = state
                .attempts
                .get_mut(attempt_id)
                .ok_or_else(|| WalletError::NotFoundError(format!("recovery attempt {}", attempt_id)))?;
            if attempt.status != RecoveryStatus::Executed && attempt.expires_at <= now {
                return Err(WalletError::Expired(format!(
                    "recovery attempt {} expired at {}",
                    attempt_id, attempt.expires_at
                )));
            }
            if attempt.status == RecoveryStatus::Pending && ready_at.map_or(false, |t| t <= now) {
                attempt.status = RecoveryStatus::Approved;
            }
            match attempt.status {
                RecoveryStatus::Approved => {
                    attempt.status = RecoveryStatus::Executed;
                    attempt.clone()
                }
                other => {
                    return Err(WalletError::ValidationError(format!(
                        "recovery attempt {} is {:?}, not approved",
                        attempt_id, other
                    )))
                }
            }
        };
        info!("Recovery attempt {} executed for wallet {}", executed.id, executed.wallet_id);
        self.emit(RecoveryEvent::StatusChanged {
            attempt_id: executed.id.clone(),
            wallet_id: executed.wallet_id.clone(),
            status: RecoveryStatus::Executed,
        });
        Ok(executed)
    }

    /// Reject an attempt that has not reached a terminal state.
    pub fn cancel_recovery(&self, attempt_id: &str) -> Result<RecoveryAttempt, WalletError> {
        let cancelled = {
            let mut state = self.state.write();
            let attempt = state
                .attempts
                .get_mut(attempt_id)
                .ok_or_else(|| WalletError::NotFoundError(format!("recovery attempt {}", attempt_id)))?;
            if attempt.status.is_terminal() {
                return Err(WalletError::ValidationError(format!(
                    "recovery attempt {} is already {:?}",
                    attempt_id, attempt.status
                )));
            }
            attempt.status = RecoveryStatus::Rejected;
            attempt.clone()
        };
        info!("Recovery attempt {} cancelled", attempt_id);
        self.emit(RecoveryEvent::StatusChanged {
            attempt_id: cancelled.id.clone(),
            wallet_id: cancelled.wallet_id.clone(),
            status: RecoveryStatus::Rejected,
        });
        Ok(cancelled)
    }

    /// Purge expired attempts, social requests and time locks.
    pub fn sweep_expired(&self) -> usize {
        let purged = self.state.write().purge_expired(Utc::now());
        for attempt in &purged {
            debug!("Purged expired recovery attempt {}", attempt.id);
            self.emit(RecoveryEvent::Purged {
                attempt_id: attempt.id.clone(),
                wallet_id: attempt.wallet_id.clone(),
            });
        }
        purged.len()
    }

    /// Forget all recovery state of a removed wallet.
    pub fn remove_wallet(&self, wallet_id: &str) {
        let mut state = self.state.write();
        state.share_sets.remove(wallet_id);
        state.guardians.remove(wallet_id);
        state.timelock_delays.remove(wallet_id);
        state.multisig.remove(wallet_id);
        state.attempts.retain(|_, a| a.wallet_id != wallet_id);
        state.social_requests.retain(|_, r| r.wallet_id != wallet_id);
        state.time_locks.retain(|_, l| l.wallet_id != wallet_id);
        state.expired.retain(|_, t| t.wallet_id != wallet_id);
    }

    /// Start the periodic expiry sweep unless it is already running.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock();
        if slot.as_ref().map_or(false, |h| !h.is_finished()) {
            return;
        }
        let manager = Arc::downgrade(self);
        let period = Duration::from_secs(self.settings.sweep_interval_secs.max(1));
        let shutdown = self.shutdown.child_token();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        manager.sweep_expired();
                    }
                }
            }
            debug!("Recovery sweep stopped");
        }));
    }

}

/// Seconds as a chrono duration, saturating at a century.
pub(crate) fn secs(secs: u64) -> chrono::Duration {
    const CENTURY: i64 = 100 * 365 * 24 * 3600;
    chrono::Duration::seconds(i64::try_from(secs).unwrap_or(CENTURY).min(CENTURY))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::kdf::KeyDerivation;
    use ethers::types::Address;

    pub(crate) const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    pub(crate) fn manager(settings: RecoverySettings) -> RecoveryManager {
        let km = KeyManager::new(KeyDerivation::pbkdf2(1_000), "m/44'/60'/0'/0/0");
        RecoveryManager::new(km, &settings, CancellationToken::new())
    }

    async fn wallet(m: &RecoveryManager) -> EncryptedWallet {
        m.key_manager.create_encrypted_wallet(ABANDON, "correct", "w1").await.unwrap()
    }

    #[tokio::test]
    async fn test_backup_methods_are_independent() {
        let m = manager(RecoverySettings::default());
        let w = wallet(&m).await;
        let config = RecoveryConfig {
            shamir: Some(ShamirSetup { threshold: 3, total_shares: 5 }),
            // invalid: more signatures than signers
            multisig: Some(MultisigConfig { signers: vec![Address::repeat_byte(1)], threshold: 2 }),
            social: Some(vec!["alice".into(), "bob".into(), "carol".into()]),
            timelock: Some(TimeLockSetup::default()),
        };
        let report = m.create_recovery_backup("w1", &w, &config, "correct").await.unwrap();

        let shares = report.shamir.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(shares.len(), 5);
        assert!(matches!(report.multisig, Some(Err(WalletError::ValidationError(_)))));
        assert_eq!(report.social.as_ref().unwrap().as_ref().unwrap().threshold, 2);
        assert_eq!(report.timelock.as_ref().unwrap().as_ref().unwrap(), &Duration::from_secs(86_400));
        assert_eq!(
            report.succeeded(),
            vec![RecoveryMethod::Shamir, RecoveryMethod::Social, RecoveryMethod::Timelock]
        );
        assert_eq!(m.share_set("w1"), Some((3, 5)));
        assert!(m.get_multisig_config("w1").is_none());

        let (secret, _) = shamir::recover_secret(&shares[1..4], "correct").unwrap();
        let root = m.key_manager.unlock_root(&w, "correct").await.unwrap();
        assert_eq!(&secret[..], root.material());
    }

    #[tokio::test]
    async fn test_backup_with_wrong_password_stores_nothing() {
        let m = manager(RecoverySettings::default());
        let w = wallet(&m).await;
        let config = RecoveryConfig {
            social: Some(vec!["alice".into()]),
            ..Default::default()
        };
        let err = m.create_recovery_backup("w1", &w, &config, "wrong").await.unwrap_err();
        assert!(matches!(err, WalletError::DecryptionError(_)));
        assert!(m.guardians("w1").is_none());
    }

    #[tokio::test]
    async fn test_sweep_purges_expired_attempts() {
        let settings = RecoverySettings { social_request_ttl_secs: 0, ..Default::default() };
        let m = manager(settings);
        let mut events = m.subscribe();
        let req = m
            .initiate_social_recovery("w1", "owner", vec!["g1".into(), "g2".into()])
            .unwrap();
        assert_eq!(m.sweep_expired(), 1);
        assert!(m.get_attempt(&req.request_id).is_none());
        assert!(m.get_social_request(&req.request_id).is_none());

        let mut saw_purge = false;
        while let Ok(event) = events.try_recv() {
            saw_purge |= matches!(event, RecoveryEvent::Purged { .. });
        }
        assert!(saw_purge);
    }

    #[tokio::test]
    async fn test_tombstones_are_forgotten_after_their_ttl() {
        let settings = RecoverySettings { social_request_ttl_secs: 0, ..Default::default() };
        let m = manager(settings);
        let req = m
            .initiate_social_recovery("w1", "owner", vec!["g1".into(), "g2".into()])
            .unwrap();
        assert_eq!(m.sweep_expired(), 1);
        assert!(matches!(m.execute_recovery(&req.request_id), Err(WalletError::Expired(_))));

        let later = Utc::now() + secs(TOMBSTONE_TTL_SECS) - chrono::Duration::seconds(60);
        m.state.write().purge_expired(later);
        assert_eq!(m.state.read().expired.len(), 1);

        let much_later = Utc::now() + secs(TOMBSTONE_TTL_SECS) + chrono::Duration::seconds(60);
        m.state.write().purge_expired(much_later);
        assert!(m.state.read().expired.is_empty());
        assert!(matches!(m.execute_recovery(&req.request_id), Err(WalletError::NotFoundError(_))));
    }

    #[tokio::test]
    async fn test_cancel_and_execute_are_exclusive() {
        let settings = RecoverySettings { timelock_delay_secs: 0, ..Default::default() };
        let m = manager(settings);
        let lock = m.initiate_timelock_recovery("w1", "owner").unwrap();
        m.cancel_recovery(&lock.id).unwrap();
        assert!(matches!(m.execute_recovery(&lock.id), Err(WalletError::ValidationError(_))));
        assert!(matches!(m.cancel_recovery(&lock.id), Err(WalletError::ValidationError(_))));
        assert!(matches!(m.execute_recovery("nope"), Err(WalletError::NotFoundError(_))));
    }

    #[tokio::test]
    async fn test_remove_wallet_clears_state() {
        let m = manager(RecoverySettings::default());
        m.register_guardians("w1", vec!["a".into()]).unwrap();
        m.initiate_timelock_recovery("w1", "owner").unwrap();
        m.remove_wallet("w1");
        assert!(m.guardians("w1").is_none());
        assert!(m.list_attempts("w1").is_empty());
    }
}
