//! Protocol Aggregator
//!
//! Folds interactions into per-address statistics and ranks them by
//! interaction count.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};

use crate::decoder::ResolvedDestination;
use crate::labels::LabelLookup;

/// One (key, gas, value) observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub key: String,
    pub gas: u64,
    pub value: U256,
}

impl Interaction {
    pub fn new(key: impl Into<String>, gas: u64, value: U256) -> Self {
        Self {
            key: key.into(),
            gas,
            value,
        }
    }
}

impl From<&ResolvedDestination> for Interaction {
    fn from(dest: &ResolvedDestination) -> Self {
        Interaction::new(format_address(dest.address), dest.gas_hint, dest.value_hint)
    }
}

impl From<ResolvedDestination> for Interaction {
    fn from(dest: ResolvedDestination) -> Self {
        Interaction::from(&dest)
    }
}

/// Accumulated statistics for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolStat {
    pub key: String,
    pub interactions: u64,
    pub total_gas: u128,
    pub total_value: U256,
    pub label: Option<String>,
}

impl ProtocolStat {
    fn first(key: String, gas: u64, value: U256) -> Self {
        Self {
            key,
            interactions: 1,
            total_gas: u128::from(gas),
            total_value: value,
            label: None,
        }
    }

    fn record(&mut self, gas: u64, value: U256) {
        self.interactions += 1;
        self.total_gas += u128::from(gas);
        self.total_value = self.total_value.saturating_add(value);
    }

    /// Label if one was attached, otherwise the key itself
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

/// Canonical lower-case form of an address or label key
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Lower-case 0x-prefixed hex form of an address
pub fn format_address(address: Address) -> String {
    format!("{:#x}", address)
}

/// Single-pass accumulator
#[derive(Debug, Default)]
pub struct Aggregator {
    stats: Vec<ProtocolStat>,
    index: HashMap<String, usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one interaction into the statistics
    pub fn record(&mut self, interaction: Interaction) {
        let key = normalize_key(&interaction.key);
        match self.index.get(&key).copied() {
            Some(i) => self.stats[i].record(interaction.gas, interaction.value),
            None => {
                self.index.insert(key.clone(), self.stats.len());
                self.stats
                    .push(ProtocolStat::first(key, interaction.gas, interaction.value));
            }
        }
    }

    /// Number of distinct keys seen so far
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Rank by interaction count and keep the first `top_count` entries
    pub fn finish(self, top_count: usize) -> Aggregation {
        let mut ranked = self.stats.clone();
        // Stable sort keeps first-seen order among ties
        ranked.sort_by(|a, b| b.interactions.cmp(&a.interactions));
        ranked.truncate(top_count);
        Aggregation {
            stats: self.stats,
            index: self.index,
            ranked,
        }
    }
}

impl Extend<Interaction> for Aggregator {
    fn extend<I: IntoIterator<Item = Interaction>>(&mut self, iter: I) {
        for interaction in iter {
            self.record(interaction);
        }
    }
}

/// Full statistics plus the ranked, truncated view
#[derive(Debug, Clone)]
pub struct Aggregation {
    stats: Vec<ProtocolStat>,
    index: HashMap<String, usize>,
    ranked: Vec<ProtocolStat>,
}

impl Aggregation {
    /// Ranked entries, most interactions first
    pub fn ranked(&self) -> &[ProtocolStat] {
        &self.ranked
    }

    /// All entries in first-seen order, before truncation
    pub fn all(&self) -> &[ProtocolStat] {
        &self.stats
    }

    pub fn get(&self, key: &str) -> Option<&ProtocolStat> {
        self.index.get(&normalize_key(key)).map(|&i| &self.stats[i])
    }

    pub fn distinct_keys(&self) -> usize {
        self.stats.len()
    }

    pub fn total_interactions(&self) -> u64 {
        self.stats.iter().map(|s| s.interactions).sum()
    }

    pub fn total_gas(&self) -> u128 {
        self.stats.iter().map(|s| s.total_gas).sum()
    }

    pub fn total_value(&self) -> U256 {
        self.stats
            .iter()
            .fold(U256::ZERO, |acc, s| acc.saturating_add(s.total_value))
    }

    /// Attach display labels to the ranked entries
    pub fn decorate<L: LabelLookup + ?Sized>(&mut self, labels: &L) {
        for stat in &mut self.ranked {
            stat.label = labels.label(&stat.key);
        }
    }
}

/// Fold `records` and rank the result
pub fn aggregate<I>(records: I, top_count: usize) -> Aggregation
where
    I: IntoIterator<Item = Interaction>,
{
    let mut aggregator = Aggregator::new();
    aggregator.extend(records);
    aggregator.finish(top_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Operation;
    use alloy::primitives::address;

    fn triple(key: &str, gas: u64, value: u64) -> Interaction {
        Interaction::new(key, gas, U256::from(value))
    }

    #[test]
    fn test_aggregate_top_one() {
        let result = aggregate(
            vec![triple("A", 10, 100), triple("B", 5, 50), triple("A", 3, 30)],
            1,
        );

        assert_eq!(result.ranked().len(), 1);
        let top = &result.ranked()[0];
        assert_eq!(top.key, "a");
        assert_eq!(top.interactions, 2);
        assert_eq!(top.total_gas, 13);
        assert_eq!(top.total_value, U256::from(130u64));
    }

    #[test]
    fn test_full_map_survives_truncation() {
        let result = aggregate(
            vec![triple("A", 10, 100), triple("B", 5, 50), triple("A", 3, 30)],
            1,
        );
        assert_eq!(result.distinct_keys(), 2);
        assert_eq!(result.get("B").unwrap().interactions, 1);
        assert_eq!(result.total_interactions(), 3);
        assert_eq!(result.total_gas(), 18);
        assert_eq!(result.total_value(), U256::from(180u64));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let result = aggregate(
            vec![
                triple("0xAbCd", 1, 0),
                triple("0xabcd", 1, 0),
                triple(" 0xABCD ", 1, 0),
            ],
            10,
        );
        assert_eq!(result.distinct_keys(), 1);
        assert_eq!(result.ranked()[0].key, "0xabcd");
        assert_eq!(result.ranked()[0].interactions, 3);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let result = aggregate(
            vec![
                triple("c", 0, 0),
                triple("b", 0, 0),
                triple("a", 0, 0),
                triple("b", 0, 0),
            ],
            10,
        );
        let keys: Vec<&str> = result.ranked().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
        let all: Vec<&str> = result.all().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(all, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_empty_input() {
        let result = aggregate(Vec::new(), 5);
        assert!(result.ranked().is_empty());
        assert_eq!(result.total_value(), U256::ZERO);
    }

    #[test]
    fn test_top_count_zero() {
        let result = aggregate(vec![triple("a", 1, 1)], 0);
        assert!(result.ranked().is_empty());
        assert_eq!(result.distinct_keys(), 1);
    }

    #[test]
    fn test_value_saturates() {
        let result = aggregate(
            vec![
                Interaction::new("a", 0, U256::MAX),
                Interaction::new("a", 0, U256::from(1u8)),
            ],
            1,
        );
        assert_eq!(result.ranked()[0].total_value, U256::MAX);
    }

    #[test]
    fn test_interaction_from_destination() {
        let dest = ResolvedDestination {
            address: address!("40a2accbd92bca938b02010e17a5b8929b49130d"),
            gas_hint: 21_000,
            value_hint: U256::from(5u8),
            operation: Operation::DelegateCall,
            method: None,
        };
        let interaction = Interaction::from(&dest);
        assert_eq!(interaction.key, "0x40a2accbd92bca938b02010e17a5b8929b49130d");
        assert_eq!(interaction.gas, 21_000);
    }

    #[test]
    fn test_decorate_with_labels_and_fallback() {
        let mut labels = HashMap::new();
        labels.insert("a".to_string(), "Uniswap".to_string());

        let mut result = aggregate(vec![triple("A", 0, 0), triple("b", 0, 0)], 2);
        result.decorate(&labels);
        assert_eq!(result.ranked()[0].display_name(), "Uniswap");
        assert_eq!(result.ranked()[1].label, None);
        assert_eq!(result.ranked()[1].display_name(), "b");
    }

    #[test]
    fn test_incremental_aggregator() {
        let mut aggregator = Aggregator::new();
        assert!(aggregator.is_empty());
        aggregator.record(triple("x", 1, 1));
        aggregator.extend(vec![triple("y", 1, 1), triple("x", 1, 1)]);
        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.finish(1).ranked()[0].key, "x");
    }
}
