//! Run one operation over many wallets.

use std::collections::BTreeMap;
use std::future::Future;

use futures::future::join_all;
use tracing::{debug, warn};

use super::WalletManager;
use crate::core::errors::WalletError;

impl WalletManager {
    /// Run `op` once per wallet id, concurrently. Every id gets its own
    /// result; one failure never stops the others. Duplicate ids run once.
    pub async fn batch_operation<T, F, Fut>(
        &self,
        wallet_ids: &[String],
        op: F,
    ) -> BTreeMap<String, Result<T, WalletError>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, WalletError>>,
    {
        let mut ids: Vec<String> = wallet_ids.to_vec();
        ids.sort();
        ids.dedup();

        let runs = ids.into_iter().map(|id| {
            let fut = op(id.clone());
            async move { (id, fut.await) }
        });
        let results: BTreeMap<String, Result<T, WalletError>> = join_all(runs).await.into_iter().collect();

        let failed = results.values().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!("Batch operation: {} of {} wallets failed", failed, results.len());
        } else {
            debug!("Batch operation over {} wallets succeeded", results.len());
        }
        results
    }
}
