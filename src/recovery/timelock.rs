//! Delay-based recovery: claimable once the delay has passed, until the claim window closes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{secs, RecoveryEvent, RecoveryManager, RecoveryMethod, RecoveryStatus};
use crate::core::errors::WalletError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLock {
    /// Also the id of the matching recovery attempt.
    pub id: String,
    pub wallet_id: String,
    pub requester: String,
    pub created_at: DateTime<Utc>,
    pub ready_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeLockStatus {
    pub lock_id: String,
    pub ready: bool,
    /// Time left until `ready`; zero once ready.
    pub remaining: Duration,
    pub ready_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: RecoveryStatus,
}

enum Check {
    Live { status: TimeLockStatus, wallet_id: String, became_ready: bool },
    Expired { wallet_id: String },
}

impl RecoveryManager {
    /// Start a time-locked recovery. One live lock per wallet.
    pub fn initiate_timelock_recovery(
        &self,
        wallet_id: &str,
        requester: &str,
    ) -> Result<TimeLock, WalletError> {
        let now = Utc::now();
        let lock = {
            let mut state = self.state.write();
            if state
                .time_locks
                .values()
                .any(|l| l.wallet_id == wallet_id && l.expires_at > now && !is_closed(&state.attempts, &l.id))
            {
                return Err(WalletError::ValidationError(format!(
                    "wallet {} already has a time-lock recovery in progress",
                    wallet_id
                )));
            }
            let delay = state
                .timelock_delays
                .get(wallet_id)
                .map(|d| d.as_secs())
                .unwrap_or(self.settings().timelock_delay_secs);
            let ready_at = now + secs(delay);
            let expires_at = ready_at + secs(self.settings().timelock_claim_window_secs);
            let attempt = state.open_attempt(wallet_id, RecoveryMethod::Timelock, now, expires_at);
            let lock = TimeLock {
                id: attempt.id,
                wallet_id: wallet_id.to_string(),
                requester: requester.to_string(),
                created_at: now,
                ready_at,
                expires_at,
            };
            state.time_locks.insert(lock.id.clone(), lock.clone());
            lock
        };
        info!("Time-lock recovery {} opened for {}, ready at {}", lock.id, wallet_id, lock.ready_at);
        self.emit(RecoveryEvent::AttemptOpened {
            attempt_id: lock.id.clone(),
            wallet_id: wallet_id.to_string(),
            method: RecoveryMethod::Timelock,
        });
        Ok(lock)
    }

    /// Report readiness. A lock past its claim window is purged and reported `Expired`.
    pub fn check_timelock_status(&self, lock_id: &str) -> Result<TimeLockStatus, WalletError> {
        let now = Utc::now();
        let check = {
            let mut state = self.state.write();
            let Some(lock) = state.time_locks.get(lock_id).cloned() else {
                return Err(state.missing(lock_id));
            };
            if lock.expires_at <= now {
                state.purge(lock_id, now);
                Check::Expired { wallet_id: lock.wallet_id }
            } else {
                let ready = lock.ready_at <= now;
                let attempt = state
                    .attempts
                    .get_mut(lock_id)
                    .ok_or_else(|| WalletError::InternalError(format!("attempt {} missing", lock_id)))?;
                let became_ready = ready && attempt.status == RecoveryStatus::Pending;
                if became_ready {
                    attempt.status = RecoveryStatus::Approved;
                }
                let remaining = (lock.ready_at - now).to_std().unwrap_or(Duration::ZERO);
                Check::Live {
                    status: TimeLockStatus {
                        lock_id: lock.id,
                        ready,
                        remaining,
                        ready_at: lock.ready_at,
                        expires_at: lock.expires_at,
                        status: attempt.status,
                    },
                    wallet_id: lock.wallet_id,
                    became_ready,
                }
            }
        };

        match check {
            Check::Expired { wallet_id } => {
                self.emit(RecoveryEvent::Purged { attempt_id: lock_id.to_string(), wallet_id });
                Err(WalletError::Expired(format!("time lock {} claim window has closed", lock_id)))
            }
            Check::Live { status, wallet_id, became_ready } => {
                if became_ready {
                    info!("Time-lock recovery {} is ready", lock_id);
                    self.emit(RecoveryEvent::StatusChanged {
                        attempt_id: lock_id.to_string(),
                        wallet_id,
                        status: RecoveryStatus::Approved,
                    });
                }
                Ok(status)
            }
        }
    }
}

fn is_closed(attempts: &std::collections::HashMap<String, super::RecoveryAttempt>, id: &str) -> bool {
    attempts.get(id).map_or(true, |a| a.status.is_terminal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RecoverySettings;
    use crate::recovery::tests::manager;

    #[test]
    fn test_lock_is_not_ready_before_delay() {
        let m = manager(RecoverySettings::default());
        let lock = m.initiate_timelock_recovery("w1", "owner").unwrap();
        assert_eq!(lock.ready_at - lock.created_at, chrono::Duration::hours(24));

        let status = m.check_timelock_status(&lock.id).unwrap();
        assert!(!status.ready);
        assert!(status.remaining > Duration::from_secs(23 * 3600));
        assert_eq!(status.status, RecoveryStatus::Pending);
        assert!(matches!(m.execute_recovery(&lock.id), Err(WalletError::ValidationError(_))));
    }

    #[test]
    fn test_lock_ready_after_zero_delay() {
        let settings = RecoverySettings { timelock_delay_secs: 0, ..Default::default() };
        let m = manager(settings);
        let lock = m.initiate_timelock_recovery("w1", "owner").unwrap();
        let status = m.check_timelock_status(&lock.id).unwrap();
        assert!(status.ready);
        assert_eq!(status.remaining, Duration::ZERO);
        assert_eq!(status.status, RecoveryStatus::Approved);
        assert_eq!(m.execute_recovery(&lock.id).unwrap().status, RecoveryStatus::Executed);
    }

    #[test]
    fn test_one_live_lock_per_wallet() {
        let m = manager(RecoverySettings::default());
        let first = m.initiate_timelock_recovery("w1", "owner").unwrap();
        assert!(matches!(
            m.initiate_timelock_recovery("w1", "owner"),
            Err(WalletError::ValidationError(_))
        ));
        m.cancel_recovery(&first.id).unwrap();
        assert!(m.initiate_timelock_recovery("w1", "owner").is_ok());
        assert!(m.initiate_timelock_recovery("w2", "owner").is_ok());
    }

    #[test]
    fn test_closed_claim_window_expires() {
        let settings = RecoverySettings {
            timelock_delay_secs: 0,
            timelock_claim_window_secs: 0,
            ..Default::default()
        };
        let m = manager(settings);
        let lock = m.initiate_timelock_recovery("w1", "owner").unwrap();
        assert!(matches!(m.check_timelock_status(&lock.id), Err(WalletError::Expired(_))));
        assert!(matches!(m.execute_recovery(&lock.id), Err(WalletError::Expired(_))));
    }

    #[tokio::test]
    async fn test_registered_delay_overrides_default() {
        let m = manager(RecoverySettings::default());
        m.state.write().timelock_delays.insert("w1".into(), Duration::from_secs(60));
        let lock = m.initiate_timelock_recovery("w1", "owner").unwrap();
        assert_eq!(lock.ready_at - lock.created_at, chrono::Duration::seconds(60));
    }
}
