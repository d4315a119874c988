use std::sync::Arc;
use std::time::Duration;

use ethers::types::U256;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::config::{FallbackGwei, GasConfig};
use crate::ledger::LedgerClient;

const GWEI: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasSpeed {
    Slow,
    Standard,
    Fast,
    Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasSource {
    Feed,
    Fallback,
}

/// Gas prices in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasTiers {
    pub slow: U256,
    pub standard: U256,
    pub fast: U256,
    pub instant: U256,
    pub source: GasSource,
}

impl GasTiers {
    /// 80 / 100 / 120 / 150 percent of the feed's current price.
    pub fn from_base(base: U256) -> Self {
        let hundred = U256::from(100u64);
        let pct = |p: u64| {
            let p = U256::from(p);
            (base / hundred).saturating_mul(p).saturating_add(base % hundred * p / hundred)
        };
        Self {
            slow: pct(80),
            standard: base,
            fast: pct(120),
            instant: pct(150),
            source: GasSource::Feed,
        }
    }

    pub fn fallback(cfg: &FallbackGwei) -> Self {
        let gwei = |g: u64| U256::from(g) * U256::from(GWEI);
        Self {
            slow: gwei(cfg.slow),
            standard: gwei(cfg.standard),
            fast: gwei(cfg.fast),
            instant: gwei(cfg.instant),
            source: GasSource::Fallback,
        }
    }

    pub fn price(&self, speed: GasSpeed) -> U256 {
        match speed {
            GasSpeed::Slow => self.slow,
            GasSpeed::Standard => self.standard,
            GasSpeed::Fast => self.fast,
            GasSpeed::Instant => self.instant,
        }
    }
}

/// Fee tiers cached for `cache_ttl_secs`.
pub struct GasOracle {
    ledger: Arc<dyn LedgerClient>,
    ttl: Duration,
    fallback: FallbackGwei,
    cache: RwLock<Option<(Instant, GasTiers)>>,
}

impl GasOracle {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: &GasConfig) -> Self {
        Self {
            ledger,
            ttl: Duration::from_secs(config.cache_ttl_secs),
            fallback: config.fallback_gwei.clone(),
            cache: RwLock::new(None),
        }
    }

    /// Current tiers. Fallback tiers are returned, but not cached, when the feed fails.
    pub async fn get_tiers(&self) -> GasTiers {
        let cached = self
            .cache
            .read()
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, tiers)| tiers.clone());
        if let Some(tiers) = cached {
            debug!("Gas tiers served from cache");
            return tiers;
        }

        match self.ledger.get_fee_estimate().await {
            Ok(base) => {
                let tiers = GasTiers::from_base(base);
                *self.cache.write() = Some((Instant::now(), tiers.clone()));
                tiers
            }
            Err(e) => {
                warn!("Fee estimate unavailable, using fallback tiers: {}", e);
                GasTiers::fallback(&self.fallback)
            }
        }
    }

    pub async fn gas_price(&self, speed: GasSpeed) -> U256 {
        self.get_tiers().await.price(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;

    fn setup() -> (Arc<InMemoryLedger>, GasOracle) {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_fee_estimate(U256::from(100u64) * U256::from(GWEI));
        let oracle = GasOracle::new(ledger.clone(), &GasConfig::default());
        (ledger, oracle)
    }

    #[tokio::test]
    async fn test_tiers_are_percentages_of_base() {
        let (_, oracle) = setup();
        let tiers = oracle.get_tiers().await;
        let g = U256::from(GWEI);
        assert_eq!(tiers.slow, U256::from(80u64) * g);
        assert_eq!(tiers.standard, U256::from(100u64) * g);
        assert_eq!(tiers.fast, U256::from(120u64) * g);
        assert_eq!(tiers.instant, U256::from(150u64) * g);
        assert_eq!(tiers.source, GasSource::Feed);
    }

    #[test]
    fn test_tiers_saturate_for_huge_base() {
        let tiers = GasTiers::from_base(U256::MAX);
        assert_eq!(tiers.standard, U256::MAX);
        assert_eq!(tiers.fast, U256::MAX);
        assert_eq!(tiers.instant, U256::MAX);
        assert_eq!(tiers.slow, U256::MAX / U256::from(5u64) * U256::from(4u64));

        let odd = GasTiers::from_base(U256::from(1_234u64));
        assert_eq!(odd.slow, U256::from(987u64));
        assert_eq!(odd.instant, U256::from(1_851u64));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let (ledger, oracle) = setup();
        let first = oracle.get_tiers().await;
        ledger.set_fee_estimate(U256::from(200u64) * U256::from(GWEI));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(oracle.get_tiers().await, first);

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(oracle.get_tiers().await.standard, U256::from(200u64) * U256::from(GWEI));
    }

    #[tokio::test]
    async fn test_feed_failure_returns_fallback() {
        let (ledger, oracle) = setup();
        ledger.set_offline(true);
        let tiers = oracle.get_tiers().await;
        assert_eq!(tiers.source, GasSource::Fallback);
        assert_eq!(tiers.standard, U256::from(20u64) * U256::from(GWEI));

        // fallback is not cached: the next call sees the recovered feed
        ledger.set_offline(false);
        assert_eq!(oracle.get_tiers().await.source, GasSource::Feed);
    }
}
