//! Prometheus metric sink
//!
//! Per-project usage gauges plus a few counters about the exporter itself.
//! Gauges are set only from whole, fully-aggregated cycle results.

use prometheus::{GaugeVec, IntCounter, Opts, Registry};

use cumulo_common::{ProjectUsage, UsageMetric};

/// Labels attached to every per-project gauge
const PROJECT_LABELS: &[&str] = &["project_id", "project_name", "domain_name", "domain_id"];

/// Prometheus metrics published by the exporter
pub struct UsageGauges {
    pub vcpu_hours: GaugeVec,
    pub memory_gib_hours: GaugeVec,
    pub cycles_total: IntCounter,
    pub cycle_failures_total: IntCounter,
    pub weight_refreshes_total: IntCounter,
}

impl UsageGauges {
    pub fn new() -> Self {
        Self {
            vcpu_hours: GaugeVec::new(
                Opts::new("project_vcpu_hours", "Weighted vCPU-hours per project"),
                PROJECT_LABELS,
            )
            .unwrap(),
            memory_gib_hours: GaugeVec::new(
                Opts::new(
                    "project_memory_gib_hours",
                    "Weighted memory GiB-hours per project",
                ),
                PROJECT_LABELS,
            )
            .unwrap(),
            cycles_total: IntCounter::new(
                "usage_exporter_cycles_total",
                "Completed polling cycles",
            )
            .unwrap(),
            cycle_failures_total: IntCounter::new(
                "usage_exporter_cycle_failures_total",
                "Polling cycles that failed before publication",
            )
            .unwrap(),
            weight_refreshes_total: IntCounter::new(
                "usage_exporter_weight_refreshes_total",
                "Successful weight table refreshes",
            )
            .unwrap(),
        }
    }

    pub fn register(&self, registry: &Registry) -> std::result::Result<(), prometheus::Error> {
        registry.register(Box::new(self.vcpu_hours.clone()))?;
        registry.register(Box::new(self.memory_gib_hours.clone()))?;
        registry.register(Box::new(self.cycles_total.clone()))?;
        registry.register(Box::new(self.cycle_failures_total.clone()))?;
        registry.register(Box::new(self.weight_refreshes_total.clone()))?;
        Ok(())
    }

    /// Set the per-project gauges from one cycle's aggregated results
    pub fn publish(&self, results: &[ProjectUsage]) {
        for result in results {
            let labels = [
                result.project.id.as_str(),
                result.project.name.as_str(),
                result.project.domain_name.as_str(),
                result.project.domain_id.as_str(),
            ];
            self.vcpu_hours
                .with_label_values(&labels)
                .set(result.totals.get(UsageMetric::VcpuHours));
            self.memory_gib_hours
                .with_label_values(&labels)
                .set(result.totals.get(UsageMetric::MemoryHours));
        }
    }
}

impl Default for UsageGauges {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulo_common::{Project, UsageTotals};

    fn result(name: &str, vcpu: f64, memory: f64) -> ProjectUsage {
        let mut totals = UsageTotals::new();
        totals.add(UsageMetric::VcpuHours, vcpu);
        totals.add(UsageMetric::MemoryHours, memory);
        ProjectUsage {
            project: Project::new("p-1", name, "d-1", "elixir"),
            totals,
        }
    }

    #[test]
    fn test_register_and_publish() {
        let gauges = UsageGauges::new();
        let registry = Registry::new();
        gauges.register(&registry).unwrap();

        gauges.publish(&[result("alpha", 10.0, 32.0)]);

        let labels = ["p-1", "alpha", "elixir", "d-1"];
        assert_eq!(gauges.vcpu_hours.with_label_values(&labels).get(), 10.0);
        assert_eq!(gauges.memory_gib_hours.with_label_values(&labels).get(), 32.0);
    }

    #[test]
    fn test_republish_overwrites() {
        let gauges = UsageGauges::new();
        gauges.publish(&[result("alpha", 10.0, 32.0)]);
        gauges.publish(&[result("alpha", 11.0, 33.0)]);

        let labels = ["p-1", "alpha", "elixir", "d-1"];
        assert_eq!(gauges.vcpu_hours.with_label_values(&labels).get(), 11.0);
    }
}
