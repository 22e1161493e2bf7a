//! Time-sharded, value-tiered billing weights
//!
//! A weight table answers "what multiplier applies to `amount` of `metric`
//! at `instant`" in two steps: pick the tier set whose activation most
//! recently precedes the instant, then pick the smallest amount threshold
//! that covers the amount. Tables are small and refreshed rarely, so every
//! lookup walks the maps from scratch; there is no incremental index.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cumulo_common::time::epoch_seconds;
use cumulo_common::{CumuloError, Result, UsageMetric};

/// One amount threshold and its multiplier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub threshold: u64,
    pub weight: f64,
}

/// One activation of a tier table, as served by a weight source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEpoch {
    /// Instant this tier set takes effect
    pub activation: NaiveDateTime,
    #[serde(default)]
    pub vcpu_tiers: Vec<Tier>,
    #[serde(default)]
    pub memory_tiers: Vec<Tier>,
}

/// Anything that can produce the ordered sequence of weight epochs
#[async_trait]
pub trait WeightSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<WeightEpoch>>;
}

/// Sorted threshold → multiplier table for one metric
pub type TierTable = BTreeMap<u64, f64>;

/// The committed weight state: activation epoch seconds → per-metric tiers.
///
/// Empty is a valid state and means "multiplier 1 universally".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightTierSet {
    epochs: BTreeMap<i64, BTreeMap<UsageMetric, TierTable>>,
}

impl WeightTierSet {
    /// Build the lookup structure from source epochs
    pub fn from_epochs(epochs: &[WeightEpoch]) -> Self {
        let mut out = BTreeMap::new();
        for epoch in epochs {
            let mut tables: BTreeMap<UsageMetric, TierTable> = BTreeMap::new();
            tables.insert(
                UsageMetric::VcpuHours,
                epoch.vcpu_tiers.iter().map(|t| (t.threshold, t.weight)).collect(),
            );
            tables.insert(
                UsageMetric::MemoryHours,
                epoch.memory_tiers.iter().map(|t| (t.threshold, t.weight)).collect(),
            );
            out.insert(epoch_seconds(epoch.activation), tables);
        }
        Self { epochs: out }
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Number of loaded activations
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// The multiplier for `amount` of `metric` at `instant` (epoch seconds).
    ///
    /// Lookup misses are never an error; they resolve to 1.0 with a
    /// diagnostic.
    pub fn weight_for(&self, metric: UsageMetric, amount: f64, instant: i64) -> f64 {
        if self.epochs.is_empty() {
            return 1.0;
        }

        // most recent activation not after the instant; instants older than
        // every activation fall back to the earliest tier set
        let tables = self
            .epochs
            .range(..=instant)
            .next_back()
            .or_else(|| self.epochs.iter().next())
            .map(|(_, tables)| tables)
            .expect("non-empty tier set has an earliest activation");

        let table = match tables.get(&metric) {
            Some(table) if !table.is_empty() => table,
            _ => {
                debug!(metric = %metric, "no tiers configured for metric, weight 1.0");
                return 1.0;
            }
        };

        // smallest threshold covering the amount; the top tier catches all
        for (threshold, weight) in table {
            if amount <= *threshold as f64 {
                return *weight;
            }
        }
        *table
            .values()
            .next_back()
            .expect("non-empty tier table has a maximum threshold")
    }
}

/// Shared handle to the committed weight table.
///
/// Refresh replaces the whole table under a write lock; `weight_for` readers
/// never observe a half-built table, and a failed refresh leaves the
/// previous table in effect.
#[derive(Clone, Default)]
pub struct WeightTable {
    inner: Arc<RwLock<WeightTierSet>>,
}

impl WeightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a new tier set wholesale
    pub fn replace(&self, next: WeightTierSet) {
        let mut guard = self.inner.write();
        *guard = next;
    }

    /// Resolve a multiplier against the committed table
    pub fn weight_for(&self, metric: UsageMetric, amount: f64, instant: i64) -> f64 {
        self.inner.read().weight_for(metric, amount, instant)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Fetch from a source and commit. On failure the previous table is
    /// retained and a [`CumuloError::WeightRefresh`] is returned for the
    /// caller to log.
    pub async fn refresh_from(&self, source: &dyn WeightSource) -> Result<()> {
        let epochs = source
            .fetch()
            .await
            .map_err(|e| CumuloError::WeightRefresh(e.to_string()))?;
        let next = WeightTierSet::from_epochs(&epochs);
        if next.is_empty() {
            warn!("weight source returned no epochs; all weights fall back to 1.0");
        }
        let activations = next.len();
        self.replace(next);
        info!(activations, "weight table refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn table() -> WeightTierSet {
        WeightTierSet::from_epochs(&[
            WeightEpoch {
                activation: day(1),
                vcpu_tiers: vec![
                    Tier { threshold: 2, weight: 1.0 },
                    Tier { threshold: 8, weight: 1.5 },
                ],
                memory_tiers: vec![
                    Tier { threshold: 16, weight: 1.0 },
                    Tier { threshold: 64, weight: 2.0 },
                ],
            },
            WeightEpoch {
                activation: day(10),
                vcpu_tiers: vec![
                    Tier { threshold: 2, weight: 3.0 },
                    Tier { threshold: 8, weight: 4.0 },
                ],
                memory_tiers: vec![],
            },
        ])
    }

    #[test]
    fn test_empty_table_is_identity() {
        let empty = WeightTierSet::default();
        assert_eq!(empty.weight_for(UsageMetric::VcpuHours, 64.0, 0), 1.0);
        assert_eq!(empty.weight_for(UsageMetric::MemoryHours, 0.5, i64::MAX), 1.0);
    }

    #[test]
    fn test_smallest_covering_threshold_wins() {
        // 4 vCPUs: first threshold >= 4 is 8 -> 1.5
        let t = table();
        let instant = epoch_seconds(day(2));
        assert_eq!(t.weight_for(UsageMetric::VcpuHours, 4.0, instant), 1.5);
        assert_eq!(t.weight_for(UsageMetric::VcpuHours, 2.0, instant), 1.0);
    }

    #[test]
    fn test_top_tier_is_catch_all() {
        let t = table();
        let instant = epoch_seconds(day(2));
        assert_eq!(t.weight_for(UsageMetric::VcpuHours, 128.0, instant), 1.5);
    }

    #[test]
    fn test_most_recent_activation_selected() {
        let t = table();
        let late = epoch_seconds(day(20));
        assert_eq!(t.weight_for(UsageMetric::VcpuHours, 2.0, late), 3.0);
    }

    #[test]
    fn test_prehistoric_instant_uses_earliest_activation() {
        let t = table();
        let before_everything = epoch_seconds(day(1)) - 86_400;
        assert_eq!(t.weight_for(UsageMetric::VcpuHours, 2.0, before_everything), 1.0);
    }

    #[test]
    fn test_metric_without_tiers_is_identity() {
        // the day-10 epoch has no memory tiers
        let t = table();
        let late = epoch_seconds(day(20));
        assert_eq!(t.weight_for(UsageMetric::MemoryHours, 32.0, late), 1.0);
    }

    #[test]
    fn test_replace_is_wholesale() {
        let shared = WeightTable::new();
        assert!(shared.is_empty());
        shared.replace(table());
        assert_eq!(
            shared.weight_for(UsageMetric::VcpuHours, 4.0, epoch_seconds(day(2))),
            1.5
        );
        shared.replace(WeightTierSet::default());
        assert_eq!(
            shared.weight_for(UsageMetric::VcpuHours, 4.0, epoch_seconds(day(2))),
            1.0
        );
    }

    struct FailingSource;

    #[async_trait]
    impl WeightSource for FailingSource {
        async fn fetch(&self) -> Result<Vec<WeightEpoch>> {
            Err(CumuloError::BackendUnavailable("weight endpoint down".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_retains_previous_table() {
        let shared = WeightTable::new();
        shared.replace(table());

        let err = shared.refresh_from(&FailingSource).await.unwrap_err();
        assert!(matches!(err, CumuloError::WeightRefresh(_)));
        // previous table still in effect
        assert_eq!(
            shared.weight_for(UsageMetric::VcpuHours, 4.0, epoch_seconds(day(2))),
            1.5
        );
    }
}
