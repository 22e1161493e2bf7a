//! Usage and inventory records, and the billed metric set
//!
//! Unit convention, end to end: memory crosses the wire in MiB (the upstream
//! control plane's convention) and is converted to GiB exactly once, inside
//! the accountant. Weights and gauges are in GiB.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::project::Project;

/// The closed set of billed metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMetric {
    /// vCPU-hours
    VcpuHours,
    /// Memory GiB-hours
    MemoryHours,
}

impl UsageMetric {
    /// Every billed metric, in publication order
    pub const ALL: [UsageMetric; 2] = [UsageMetric::VcpuHours, UsageMetric::MemoryHours];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageMetric::VcpuHours => "vcpu_hours",
            UsageMetric::MemoryHours => "memory_gib_hours",
        }
    }
}

impl std::fmt::Display for UsageMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One machine's usage over the queried window, as answered by the
/// tenant-usage interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerUsage {
    pub instance_id: String,
    /// Elapsed billable hours; may be zero for machines outside the window
    pub hours: f64,
    pub vcpus: u32,
    /// RAM in MiB (wire unit)
    pub memory_mib: u64,
    /// Boot instant; tier selection is anchored here
    pub started_at: NaiveDateTime,
}

/// One machine's identity and metadata, as answered by the inventory
/// interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub instance_id: String,
    pub metadata: HashMap<String, String>,
}

/// Per-metric usage totals for one (real or synthetic) project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals(BTreeMap<UsageMetric, f64>);

impl UsageTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate into a metric's running total
    pub fn add(&mut self, metric: UsageMetric, amount: f64) {
        *self.0.entry(metric).or_insert(0.0) += amount;
    }

    /// Total for a metric; zero when nothing accumulated
    pub fn get(&self, metric: UsageMetric) -> f64 {
        self.0.get(&metric).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (UsageMetric, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fully aggregated result for one project in one cycle; published whole,
/// never partially
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectUsage {
    pub project: Project,
    pub totals: UsageTotals,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_accumulate() {
        let mut totals = UsageTotals::new();
        totals.add(UsageMetric::VcpuHours, 4.0);
        totals.add(UsageMetric::VcpuHours, 2.5);
        assert_eq!(totals.get(UsageMetric::VcpuHours), 6.5);
        assert_eq!(totals.get(UsageMetric::MemoryHours), 0.0);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(UsageMetric::VcpuHours.as_str(), "vcpu_hours");
        assert_eq!(UsageMetric::MemoryHours.as_str(), "memory_gib_hours");
    }
}
