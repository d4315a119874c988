//! Guardian-approved recovery.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{secs, RecoveryEvent, RecoveryManager, RecoveryMethod, RecoveryStatus};
use crate::core::errors::WalletError;

/// Approvals needed out of `guardians`: ceil(0.6 × guardians).
pub fn social_threshold(guardians: usize) -> usize {
    (3 * guardians + 4) / 5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSet {
    pub guardians: Vec<String>,
    pub threshold: usize,
}

impl GuardianSet {
    /// Trimmed, de-duplicated guardian ids in first-seen order.
    pub fn new(guardians: Vec<String>) -> Result<Self, WalletError> {
        let mut unique: Vec<String> = Vec::with_capacity(guardians.len());
        for g in guardians {
            let g = g.trim().to_string();
            if !g.is_empty() && !unique.contains(&g) {
                unique.push(g);
            }
        }
        if unique.is_empty() {
            return Err(WalletError::ValidationError("at least one guardian is required".into()));
        }
        Ok(Self { threshold: social_threshold(unique.len()), guardians: unique })
    }

    pub fn contains(&self, guardian: &str) -> bool {
        self.guardians.iter().any(|g| g == guardian)
    }

    /// Same guardians, in any order.
    pub fn same_members(&self, other: &GuardianSet) -> bool {
        self.guardians.len() == other.guardians.len() && other.guardians.iter().all(|g| self.contains(g))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialRecoveryRequest {
    pub wallet_id: String,
    /// Also the id of the matching recovery attempt.
    pub request_id: String,
    pub requester: String,
    pub guardians: GuardianSet,
    /// One vote per guardian; `true` approves.
    pub approvals: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SocialRecoveryRequest {
    pub fn approval_count(&self) -> usize {
        self.approvals.values().filter(|v| **v).count()
    }

    /// Status implied by the votes cast so far.
    fn tally(&self) -> RecoveryStatus {
        let approved = self.approval_count();
        let undecided = self.guardians.guardians.len() - self.approvals.len();
        if approved >= self.guardians.threshold {
            RecoveryStatus::Approved
        } else if approved + undecided < self.guardians.threshold {
            RecoveryStatus::Rejected
        } else {
            RecoveryStatus::Pending
        }
    }
}

enum Vote {
    Recorded { wallet_id: String, status: RecoveryStatus, changed: bool },
    Expired { wallet_id: String },
}

impl RecoveryManager {
    /// Register the guardian set used when a request names no guardians.
    pub fn register_guardians(
        &self,
        wallet_id: &str,
        guardians: Vec<String>,
    ) -> Result<GuardianSet, WalletError> {
        let set = GuardianSet::new(guardians)?;
        self.state.write().guardians.insert(wallet_id.to_string(), set.clone());
        info!(
            "Registered {} guardians for {} (threshold {})",
            set.guardians.len(),
            wallet_id,
            set.threshold
        );
        Ok(set)
    }

    pub fn guardians(&self, wallet_id: &str) -> Option<GuardianSet> {
        self.state.read().guardians.get(wallet_id).cloned()
    }

    /// Open a social recovery request.
    ///
    /// A wallet with a registered guardian set always uses it; a non-empty
    /// `guardians` list must then name exactly that set, or the call fails
    /// with `Unauthorized`. Only a wallet without a registered set takes the
    /// supplied list.
    pub fn initiate_social_recovery(
        &self,
        wallet_id: &str,
        requester: &str,
        guardians: Vec<String>,
    ) -> Result<SocialRecoveryRequest, WalletError> {
        let now = Utc::now();
        let expires_at = now + secs(self.settings().social_request_ttl_secs);
        let request = {
            let mut state = self.state.write();
            let set = match state.guardians.get(wallet_id) {
                Some(registered) => {
                    if !guardians.is_empty() && !registered.same_members(&GuardianSet::new(guardians)?) {
                        return Err(WalletError::Unauthorized(format!(
                            "guardians do not match the set registered for wallet {}",
                            wallet_id
                        )));
                    }
                    registered.clone()
                }
                None if guardians.is_empty() => {
                    return Err(WalletError::ValidationError(format!(
                        "wallet {} has no registered guardians",
                        wallet_id
                    )))
                }
                None => GuardianSet::new(guardians)?,
            };
            let attempt = state.open_attempt(wallet_id, RecoveryMethod::Social, now, expires_at);
            let request = SocialRecoveryRequest {
                wallet_id: wallet_id.to_string(),
                request_id: attempt.id,
                requester: requester.to_string(),
                guardians: set,
                approvals: BTreeMap::new(),
                created_at: now,
                expires_at,
            };
            state.social_requests.insert(request.request_id.clone(), request.clone());
            request
        };
        info!(
            "Social recovery {} opened for {} ({} of {} guardians needed)",
            request.request_id,
            wallet_id,
            request.guardians.threshold,
            request.guardians.guardians.len()
        );
        self.emit(RecoveryEvent::AttemptOpened {
            attempt_id: request.request_id.clone(),
            wallet_id: wallet_id.to_string(),
            method: RecoveryMethod::Social,
        });
        Ok(request)
    }

    /// Record `guardian`'s vote and return the request's status.
    ///
    /// Only the first vote of each guardian counts. Votes on a request that
    /// is no longer pending change nothing.
    pub fn approve_social_recovery(
        &self,
        request_id: &str,
        guardian: &str,
        approved: bool,
    ) -> Result<RecoveryStatus, WalletError> {
        let now = Utc::now();
        let vote = {
            let mut state = self.state.write();
            let Some(request) = state.social_requests.get(request_id) else {
                return Err(state.missing(request_id));
            };
            if request.expires_at <= now {
                let wallet_id = request.wallet_id.clone();
                state.purge(request_id, now);
                Vote::Expired { wallet_id }
            } else {
                if !request.guardians.contains(guardian) {
                    return Err(WalletError::Unauthorized(format!(
                        "{} is not a guardian of wallet {}",
                        guardian, request.wallet_id
                    )));
                }
                let wallet_id = request.wallet_id.clone();
                let current = state
                    .attempts
                    .get(request_id)
                    .map(|a| a.status)
                    .ok_or_else(|| WalletError::InternalError(format!("attempt {} missing", request_id)))?;
                let mut status = current;
                if current == RecoveryStatus::Pending {
                    if let Some(request) = state.social_requests.get_mut(request_id) {
                        request.approvals.entry(guardian.to_string()).or_insert(approved);
                        status = request.tally();
                    }
                    if let Some(attempt) = state.attempts.get_mut(request_id) {
                        attempt.status = status;
                    }
                }
                Vote::Recorded { wallet_id, status, changed: status != current }
            }
        };

        match vote {
            Vote::Expired { wallet_id } => {
                self.emit(RecoveryEvent::Purged { attempt_id: request_id.to_string(), wallet_id });
                Err(WalletError::Expired(format!("social recovery request {} has expired", request_id)))
            }
            Vote::Recorded { wallet_id, status, changed } => {
                if changed {
                    info!("Social recovery {} is now {:?}", request_id, status);
                    self.emit(RecoveryEvent::StatusChanged {
                        attempt_id: request_id.to_string(),
                        wallet_id,
                        status,
                    });
                }
                Ok(status)
            }
        }
    }

    pub fn get_social_request(&self, request_id: &str) -> Option<SocialRecoveryRequest> {
        self.state.read().social_requests.get(request_id).cloned()
    }
}
