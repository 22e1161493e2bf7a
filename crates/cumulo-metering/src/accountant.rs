//! Per-project usage aggregation
//!
//! One `collect_usage` pass per polling cycle. For every project the
//! accountant asks the backend for per-instance usage records and folds
//! `hours × amount × weight` into per-metric totals. Grouping projects are
//! re-partitioned into synthetic sub-projects by a configured metadata tag.
//!
//! Failure isolation: a project that errors is skipped for the cycle, an
//! instance that looks wrong is skipped for the project. Nothing here aborts
//! a cycle.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use cumulo_common::time::epoch_seconds;
use cumulo_common::{
    Project, ProjectUsage, Result, ServerUsage, UsageMetric, UsageTotals, MIB_PER_GIB,
};

use crate::backend::UsageBackend;
use crate::weights::WeightTable;

/// Grouping configuration for the accountant
#[derive(Debug, Clone)]
pub struct AccountantConfig {
    /// Projects (by id or name) whose usage is split into synthetic
    /// sub-projects
    pub grouping_projects: HashSet<String>,
    /// Metadata key carrying the sub-project name
    pub grouping_tag: String,
}

impl Default for AccountantConfig {
    fn default() -> Self {
        Self {
            grouping_projects: HashSet::new(),
            grouping_tag: "project_name".to_string(),
        }
    }
}

/// Aggregates backend usage records into per-project, per-metric totals
pub struct UsageAccountant<B> {
    backend: Arc<B>,
    weights: WeightTable,
    config: AccountantConfig,
}

impl<B: UsageBackend> UsageAccountant<B> {
    pub fn new(backend: Arc<B>, weights: WeightTable, config: AccountantConfig) -> Self {
        Self {
            backend,
            weights,
            config,
        }
    }

    /// The shared weight table this accountant resolves against
    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    /// Run one full aggregation pass.
    ///
    /// Holds no state across calls: two passes over an unchanged backend
    /// produce the same totals. Per-project failures are logged and skipped.
    pub async fn collect_usage(
        &self,
        projects: &[Project],
        window_start: NaiveDateTime,
    ) -> Vec<ProjectUsage> {
        let mut results = Vec::new();
        for project in projects {
            match self.collect_project(project, window_start).await {
                Ok(mut project_results) => results.append(&mut project_results),
                Err(e) => {
                    warn!(
                        project_id = %project.id,
                        project_name = %project.name,
                        error = %e,
                        "skipping project for this cycle"
                    );
                }
            }
        }
        results
    }

    async fn collect_project(
        &self,
        project: &Project,
        window_start: NaiveDateTime,
    ) -> Result<Vec<ProjectUsage>> {
        let records = self.backend.tenant_usage(&project.id, window_start).await?;
        if records.is_empty() {
            debug!(project_id = %project.id, "no usage records, skipping project");
            return Ok(Vec::new());
        }

        if self.is_grouping(project) {
            self.collect_grouped(project, &records).await
        } else {
            Ok(vec![ProjectUsage {
                project: project.clone(),
                totals: self.accumulate(&project.id, &records),
            }])
        }
    }

    /// Fold usage records into per-metric totals.
    ///
    /// Each instance is billed under the tier set active at its own boot
    /// instant, not at the window start. Memory arrives in MiB and is
    /// converted to GiB here, exactly once.
    fn accumulate(&self, project_id: &str, records: &[ServerUsage]) -> UsageTotals {
        let mut totals = UsageTotals::new();
        for record in records {
            if record.hours <= 0.0 {
                debug!(
                    project_id,
                    instance_id = %record.instance_id,
                    hours = record.hours,
                    "instance contributes no billable hours"
                );
                continue;
            }
            let boot = epoch_seconds(record.started_at);

            let vcpus = f64::from(record.vcpus);
            let vcpu_weight = self.weights.weight_for(UsageMetric::VcpuHours, vcpus, boot);
            totals.add(UsageMetric::VcpuHours, record.hours * vcpus * vcpu_weight);

            let ram_gib = record.memory_mib as f64 / MIB_PER_GIB;
            let mem_weight = self.weights.weight_for(UsageMetric::MemoryHours, ram_gib, boot);
            totals.add(UsageMetric::MemoryHours, record.hours * ram_gib * mem_weight);
        }
        totals
    }

    /// Partition a grouping project's records by the configured metadata tag
    /// and emit one synthetic project per distinct tag value. The parent
    /// project itself is not emitted.
    async fn collect_grouped(
        &self,
        project: &Project,
        records: &[ServerUsage],
    ) -> Result<Vec<ProjectUsage>> {
        let inventory = self.backend.server_inventory(&project.id).await?;

        let tag_by_instance: HashMap<&str, &str> = inventory
            .iter()
            .filter_map(|server| {
                server
                    .metadata
                    .get(&self.config.grouping_tag)
                    .map(|tag| (server.instance_id.as_str(), tag.as_str()))
            })
            .collect();

        // BTreeMap for a stable emission order
        let mut partitions: BTreeMap<&str, Vec<ServerUsage>> = BTreeMap::new();
        for record in records {
            match tag_by_instance.get(record.instance_id.as_str()) {
                Some(tag) => partitions.entry(tag).or_default().push(record.clone()),
                None => {
                    debug!(
                        project_id = %project.id,
                        instance_id = %record.instance_id,
                        tag = %self.config.grouping_tag,
                        "instance missing grouping tag, excluded from synthetic projects"
                    );
                }
            }
        }

        Ok(partitions
            .into_iter()
            .map(|(tag, group)| ProjectUsage {
                project: project.synthetic(tag),
                totals: self.accumulate(&project.id, &group),
            })
            .collect())
    }

    fn is_grouping(&self, project: &Project) -> bool {
        self.config.grouping_projects.contains(&project.id)
            || self.config.grouping_projects.contains(&project.name)
    }
}
