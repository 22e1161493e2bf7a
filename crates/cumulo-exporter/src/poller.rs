//! The polling loop
//!
//! Alternates between sleeping and running one full accounting pass, and
//! refreshes the weight table on a slower cadence. Cycle-level failures are
//! logged and the loop proceeds to the next interval; nothing here
//! terminates the process once it is running.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use cumulo_common::{Project, Result};
use cumulo_metering::{UsageAccountant, UsageBackend, WeightSource};

use crate::metrics::UsageGauges;

/// Drives the accountant on a fixed interval and republishes gauges
pub struct Poller<B> {
    accountant: UsageAccountant<B>,
    backend: Arc<B>,
    gauges: Arc<UsageGauges>,
    weight_source: Option<Box<dyn WeightSource>>,
    /// Domain names to export; empty means every readable project
    domains: Vec<String>,
    window_start: NaiveDateTime,
    update_interval: Duration,
    weight_refresh_cycles: u64,
}

impl<B: UsageBackend> Poller<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accountant: UsageAccountant<B>,
        backend: Arc<B>,
        gauges: Arc<UsageGauges>,
        weight_source: Option<Box<dyn WeightSource>>,
        domains: Vec<String>,
        window_start: NaiveDateTime,
        update_interval: Duration,
        weight_refresh_cycles: u64,
    ) -> Self {
        Self {
            accountant,
            backend,
            gauges,
            weight_source,
            domains,
            window_start,
            update_interval,
            weight_refresh_cycles,
        }
    }

    /// Run forever: one cycle, then sleep, then the next
    pub async fn run(self) {
        let mut cycle: u64 = 0;
        loop {
            self.run_cycle(cycle).await;
            cycle += 1;
            tokio::time::sleep(self.update_interval).await;
        }
    }

    /// One full pass: refresh weights when due, discover projects, aggregate,
    /// publish. Results are published whole or not at all.
    pub async fn run_cycle(&self, cycle: u64) {
        if let Some(source) = &self.weight_source {
            if cycle % self.weight_refresh_cycles == 0 {
                match self.accountant.weights().refresh_from(source.as_ref()).await {
                    Ok(()) => self.gauges.weight_refreshes_total.inc(),
                    Err(e) => {
                        warn!(cycle, error = %e, "weight refresh failed, keeping previous table")
                    }
                }
            }
        }

        match self.discover_projects().await {
            Ok(projects) => {
                if projects.is_empty() {
                    debug!(cycle, "no projects discovered");
                }
                let results = self.accountant.collect_usage(&projects, self.window_start).await;
                self.gauges.publish(&results);
                self.gauges.cycles_total.inc();
                info!(
                    cycle,
                    projects = projects.len(),
                    published = results.len(),
                    "polling cycle complete"
                );
            }
            Err(e) => {
                self.gauges.cycle_failures_total.inc();
                warn!(cycle, error = %e, "polling cycle failed, retrying next interval");
            }
        }
    }

    /// Resolve the configured domains and list their projects. Unknown
    /// domains are skipped with a warning.
    async fn discover_projects(&self) -> Result<Vec<Project>> {
        if self.domains.is_empty() {
            return self.backend.list_projects(None).await;
        }

        let mut projects = Vec::new();
        for domain_name in &self.domains {
            match self.backend.get_domain(domain_name).await? {
                Some(domain) => {
                    let mut listed = self.backend.list_projects(Some(&domain.id)).await?;
                    for project in &mut listed {
                        // backends that only know domain ids get the names
                        // patched in from the resolved domain
                        if project.domain_name.is_empty() {
                            project.domain_name = domain.name.clone();
                        }
                        if project.domain_id.is_empty() {
                            project.domain_id = domain.id.clone();
                        }
                    }
                    projects.append(&mut listed);
                }
                None => warn!(domain = %domain_name, "domain not found, skipping"),
            }
        }
        Ok(projects)
    }
}
