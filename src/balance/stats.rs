use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use crate::core::domain::{AssetBalance, AssetKind, Transaction, TxStatus};

/// Largest integer a `Decimal` mantissa can hold (2^96 - 1).
fn max_mantissa() -> U256 {
    (U256::one() << 96) - U256::one()
}

/// `balance / 10^decimals` as a `Decimal`, truncating digits that do not fit.
pub fn to_decimal_units(balance: U256, decimals: u32) -> Option<Decimal> {
    let ten = U256::from(10u64);
    let mut value = balance;
    let mut scale = decimals;
    while scale > 28 || (value > max_mantissa() && scale > 0) {
        value /= ten;
        scale -= 1;
    }
    if value > max_mantissa() {
        return None;
    }
    Decimal::try_from_i128_with_scale(value.as_u128() as i128, scale).ok()
}

/// USD value of `balance` smallest units at `price` per whole unit.
pub fn usd_value(balance: U256, decimals: u32, price: Decimal) -> Option<Decimal> {
    to_decimal_units(balance, decimals)?.checked_mul(price)
}

fn serialize_volume<S: Serializer>(
    volume: &BTreeMap<AssetKind, U256>,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.collect_map(volume.iter().map(|(k, v)| (k, v.to_string())))
}

/// Activity and holdings summary for one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletStats {
    pub address: Address,
    /// Sum of transferred amounts per asset kind, failed transactions excluded.
    #[serde(serialize_with = "serialize_volume")]
    pub volume_by_kind: BTreeMap<AssetKind, U256>,
    pub transaction_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
    pub non_zero_assets: usize,
    pub total_usd: Decimal,
}

/// Aggregate `transactions` touching `address` together with its balances.
pub fn calculate_stats(
    address: Address,
    balances: &[AssetBalance],
    transactions: &[Transaction],
) -> WalletStats {
    let mut volume_by_kind: BTreeMap<AssetKind, U256> = BTreeMap::new();
    let mut transaction_count = 0;
    let mut last_activity: Option<DateTime<Utc>> = None;

    for tx in transactions.iter().filter(|tx| tx.from == address || tx.to == address) {
        transaction_count += 1;
        last_activity = Some(last_activity.map_or(tx.timestamp, |t| t.max(tx.timestamp)));
        if tx.status != TxStatus::Failed {
            let entry = volume_by_kind.entry(tx.token_kind).or_insert_with(U256::zero);
            *entry = entry.saturating_add(tx.value);
        }
    }

    WalletStats {
        address,
        volume_by_kind,
        transaction_count,
        last_activity,
        non_zero_assets: balances.iter().filter(|b| !b.balance.is_zero()).count(),
        total_usd: balances.iter().filter_map(|b| b.usd_value).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ethers::types::H256;

    fn tx(kind: AssetKind, value: u64, status: TxStatus, age_secs: i64) -> Transaction {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            wallet_id: "w".into(),
            hash: H256::from_low_u64_be(value.wrapping_mul(31).wrapping_add(age_secs as u64)),
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            value: U256::from(value),
            token_kind: kind,
            contract_address: None,
            token_id: None,
            nonce: 0,
            gas_price: U256::one(),
            gas_limit: U256::from(21_000u64),
            gas_used: None,
            status,
            block_number: None,
            block_hash: None,
            timestamp: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_decimal_units() {
        let one_eth = U256::exp10(18);
        assert_eq!(to_decimal_units(one_eth, 18), Some(Decimal::ONE));
        assert_eq!(to_decimal_units(U256::from(1_500_000u64), 6), Some(Decimal::new(15, 1)));
        // wider than a Decimal mantissa: low digits are truncated
        let huge = U256::exp10(40);
        assert_eq!(to_decimal_units(huge, 18), Some(Decimal::from_i128_with_scale(10_i128.pow(22), 0)));
        assert_eq!(to_decimal_units(U256::MAX, 0), None);
    }

    #[test]
    fn test_usd_value() {
        let half_eth = U256::exp10(17) * U256::from(5u64);
        assert_eq!(
            usd_value(half_eth, 18, Decimal::new(3000, 0)),
            Some(Decimal::new(1500, 0))
        );
    }

    #[test]
    fn test_calculate_stats_excludes_failed_volume() {
        let txs = vec![
            tx(AssetKind::Native, 100, TxStatus::Confirmed, 30),
            tx(AssetKind::Native, 50, TxStatus::Pending, 10),
            tx(AssetKind::Fungible, 7, TxStatus::Failed, 5),
            tx(AssetKind::Fungible, 3, TxStatus::Confirmed, 60),
        ];
        let stats = calculate_stats(Address::repeat_byte(1), &[], &txs);
        assert_eq!(stats.transaction_count, 4);
        assert_eq!(stats.volume_by_kind[&AssetKind::Native], U256::from(150u64));
        assert_eq!(stats.volume_by_kind[&AssetKind::Fungible], U256::from(3u64));
        assert_eq!(stats.last_activity, Some(txs[2].timestamp));
        assert_eq!(stats.total_usd, Decimal::ZERO);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["volume_by_kind"]["native"], "150");
    }

    #[test]
    fn test_calculate_stats_ignores_unrelated_transactions() {
        let txs = vec![tx(AssetKind::Native, 100, TxStatus::Confirmed, 30)];
        let stats = calculate_stats(Address::repeat_byte(9), &[], &txs);
        assert_eq!(stats.transaction_count, 0);
        assert!(stats.volume_by_kind.is_empty());
        assert_eq!(stats.last_activity, None);
    }
}
