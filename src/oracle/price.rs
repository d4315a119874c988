use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::ledger::PriceFeed;

/// Prices used when the feed is down and nothing is cached for a symbol.
pub fn default_fallback_prices() -> HashMap<String, Decimal> {
    [
        ("ETH", Decimal::new(2000, 0)),
        ("USDC", Decimal::ONE),
        ("USDT", Decimal::ONE),
        ("DAI", Decimal::ONE),
    ]
    .into_iter()
    .map(|(s, p)| (s.to_string(), p))
    .collect()
}

/// USD price cache over a [`PriceFeed`].
pub struct PriceOracle {
    feed: Arc<dyn PriceFeed>,
    ttl: Duration,
    fallback: HashMap<String, Decimal>,
    cache: RwLock<HashMap<String, (Instant, Decimal)>>,
}

impl PriceOracle {
    pub fn new(feed: Arc<dyn PriceFeed>, ttl: Duration) -> Self {
        Self::with_fallback(feed, ttl, default_fallback_prices())
    }

    pub fn with_fallback(
        feed: Arc<dyn PriceFeed>,
        ttl: Duration,
        fallback: HashMap<String, Decimal>,
    ) -> Self {
        Self { feed, ttl, fallback, cache: RwLock::new(HashMap::new()) }
    }

    /// Prices for `symbols`. Fresh cache entries are reused; the rest are
    /// fetched in one feed call. On feed failure a stale cache entry, then the
    /// fallback table, stands in. Symbols known to neither are omitted.
    pub async fn get_prices(&self, symbols: &[String]) -> HashMap<String, Decimal> {
        let mut out = HashMap::with_capacity(symbols.len());
        let mut missing = Vec::new();
        {
            let cache = self.cache.read();
            for symbol in symbols {
                match cache.get(symbol) {
                    Some((at, price)) if at.elapsed() < self.ttl => {
                        out.insert(symbol.clone(), *price);
                    }
                    _ => missing.push(symbol.clone()),
                }
            }
        }
        if missing.is_empty() {
            debug!("All {} prices served from cache", symbols.len());
            return out;
        }

        match self.feed.get_prices(&missing).await {
            Ok(fetched) => {
                let now = Instant::now();
                let mut cache = self.cache.write();
                for (symbol, price) in fetched {
                    cache.insert(symbol.clone(), (now, price));
                    out.insert(symbol, price);
                }
            }
            Err(e) => {
                warn!("Price feed unavailable, using fallback prices: {}", e);
                let cache = self.cache.read();
                for symbol in missing {
                    let price = cache
                        .get(&symbol)
                        .map(|(_, p)| *p)
                        .or_else(|| self.fallback.get(&symbol).copied());
                    if let Some(price) = price {
                        out.insert(symbol, price);
                    }
                }
            }
        }
        out
    }

    pub async fn get_price(&self, symbol: &str) -> Option<Decimal> {
        self.get_prices(&[symbol.to_string()]).await.remove(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::StaticPriceFeed;

    fn feed() -> Arc<StaticPriceFeed> {
        Arc::new(StaticPriceFeed::new([
            ("ETH".to_string(), Decimal::new(3000, 0)),
            ("LINK".to_string(), Decimal::new(15, 0)),
        ]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_prices_cached_for_ttl() {
        let feed = feed();
        let oracle = PriceOracle::new(feed.clone(), Duration::from_secs(300));
        assert_eq!(oracle.get_price("ETH").await, Some(Decimal::new(3000, 0)));
        feed.set_price("ETH", Decimal::new(3100, 0));

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(oracle.get_price("ETH").await, Some(Decimal::new(3000, 0)));
        assert_eq!(feed.request_count(), 1);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(oracle.get_price("ETH").await, Some(Decimal::new(3100, 0)));
        assert_eq!(feed.request_count(), 2);
    }

    #[tokio::test]
    async fn test_feed_failure_uses_fallback_table() {
        let feed = feed();
        feed.set_offline(true);
        let oracle = PriceOracle::new(feed, Duration::from_secs(300));
        let prices = oracle
            .get_prices(&["ETH".into(), "USDC".into(), "LINK".into()])
            .await;
        assert_eq!(prices.get("ETH"), Some(&Decimal::new(2000, 0)));
        assert_eq!(prices.get("USDC"), Some(&Decimal::ONE));
        assert!(!prices.contains_key("LINK"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cache_beats_fallback() {
        let feed = feed();
        let oracle = PriceOracle::new(feed.clone(), Duration::from_secs(300));
        oracle.get_price("LINK").await;
        tokio::time::advance(Duration::from_secs(600)).await;
        feed.set_offline(true);
        assert_eq!(oracle.get_price("LINK").await, Some(Decimal::new(15, 0)));
    }
}
