//! The simulated control plane
//!
//! Answers the backend queries from a fixture file that is re-read on every
//! call. State across calls is limited to the process start instant captured
//! at construction; everything else is derived fresh so external fixture
//! edits take effect immediately.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tracing::debug;

use cumulo_common::{CumuloError, Domain, Project, Result, ServerInfo, ServerUsage};
use cumulo_metering::{UsageBackend, WeightEpoch, WeightSource};

use crate::fixture::{parse_fixture, FixtureDoc, ProjectFixture};

/// Simulated backend over a declarative TOML fixture
pub struct SimulatedCloud {
    fixture_path: PathBuf,
    process_start: NaiveDateTime,
}

impl SimulatedCloud {
    /// Open a simulated cloud over a fixture file, capturing the process
    /// start now. The fixture must parse at construction; later calls
    /// re-parse and may fail individually if the file turns invalid.
    pub fn new(fixture_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_process_start(fixture_path, Utc::now().naive_utc())
    }

    /// Construction with an explicit process start; lets tests pin the
    /// flag-style existence origin.
    pub fn with_process_start(
        fixture_path: impl Into<PathBuf>,
        process_start: NaiveDateTime,
    ) -> Result<Self> {
        let cloud = Self {
            fixture_path: fixture_path.into(),
            process_start,
        };
        cloud.load()?;
        Ok(cloud)
    }

    pub fn process_start(&self) -> NaiveDateTime {
        self.process_start
    }

    /// Re-read the fixture from disk
    fn load(&self) -> Result<FixtureDoc> {
        let text = std::fs::read_to_string(&self.fixture_path)?;
        parse_fixture(&text)
    }

    fn find_project<'doc>(
        doc: &'doc FixtureDoc,
        project_id: &str,
    ) -> Option<&'doc ProjectFixture> {
        doc.values()
            .flat_map(|domain| domain.projects.iter())
            .find(|project| project.project_id() == project_id)
    }
}

#[async_trait]
impl UsageBackend for SimulatedCloud {
    async fn list_projects(&self, domain_id: Option<&str>) -> Result<Vec<Project>> {
        let doc = self.load()?;
        let mut projects = Vec::new();
        for (domain_name, domain) in &doc {
            if let Some(wanted) = domain_id {
                if domain.domain_id() != wanted {
                    continue;
                }
            }
            for project in &domain.projects {
                projects.push(project.to_project(domain_name, domain.domain_id()));
            }
        }
        Ok(projects)
    }

    async fn get_domain(&self, name_or_id: &str) -> Result<Option<Domain>> {
        let doc = self.load()?;
        Ok(doc.iter().find_map(|(domain_name, domain)| {
            (domain_name == name_or_id || domain.domain_id() == name_or_id).then(|| Domain {
                id: domain.domain_id().to_string(),
                name: domain_name.clone(),
            })
        }))
    }

    async fn tenant_usage(
        &self,
        project_id: &str,
        window_start: NaiveDateTime,
    ) -> Result<Vec<ServerUsage>> {
        let doc = self.load()?;
        let Some(project) = Self::find_project(&doc, project_id) else {
            // unknown projects answer empty, matching the permissive upstream
            debug!(project_id, "tenant usage for unknown project, answering empty");
            return Ok(Vec::new());
        };

        let now = Utc::now().naive_utc();
        let mut usages = Vec::with_capacity(project.machines.len());
        for machine in &project.machines {
            let spec = machine.to_spec()?;
            usages.push(ServerUsage {
                hours: spec
                    .existence
                    .hours_existed(window_start, self.process_start, now),
                vcpus: spec.cpus,
                memory_mib: spec.ram_mib(),
                started_at: spec.existence.boot_instant(self.process_start),
                instance_id: spec.instance_id,
            });
        }
        Ok(usages)
    }

    async fn server_inventory(&self, project_id: &str) -> Result<Vec<ServerInfo>> {
        let doc = self.load()?;
        let Some(project) = Self::find_project(&doc, project_id) else {
            debug!(project_id, "inventory for unknown project, answering empty");
            return Ok(Vec::new());
        };

        project
            .machines
            .iter()
            .map(|machine| {
                let spec = machine.to_spec()?;
                Ok(ServerInfo {
                    instance_id: spec.instance_id,
                    metadata: spec.metadata,
                })
            })
            .collect()
    }
}

/// Weight source over a TOML file, re-read on every fetch.
///
/// Layout: a top-level `epochs` array of `{activation, vcpu_tiers,
/// memory_tiers}` tables.
pub struct FileWeightSource {
    path: PathBuf,
}

#[derive(Debug, serde::Deserialize)]
struct WeightsDoc {
    #[serde(default)]
    epochs: Vec<WeightEpoch>,
}

impl FileWeightSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl WeightSource for FileWeightSource {
    async fn fetch(&self) -> Result<Vec<WeightEpoch>> {
        let text = std::fs::read_to_string(&self.path)?;
        let doc: WeightsDoc = toml::from_str(&text)
            .map_err(|e| CumuloError::Serialization(format!("weights parse: {e}")))?;
        Ok(doc.epochs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use chrono::NaiveDate;
    use tempfile::NamedTempFile;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn write_fixture(file: &mut NamedTempFile, text: &str) {
        use std::io::Seek;
        file.as_file_mut().set_len(0).unwrap();
        file.as_file_mut().rewind().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    const BASE_FIXTURE: &str = r#"
[elixir]
domain_id = "d-elixir"

[[elixir.projects]]
project_id = "p-1"
project_name = "alpha"

[[elixir.projects.machines]]
cpus = 4
ram = 8
existence = ["2020-01-01T00:00:00", "2020-01-03T00:00:00"]
instance_id = "i-1"

[swift]
domain_id = "d-swift"

[[swift.projects]]
project_id = "p-2"
project_name = "beta"
"#;

    fn cloud_over(file: &NamedTempFile) -> SimulatedCloud {
        SimulatedCloud::with_process_start(file.path(), at(2020, 1, 1, 0)).unwrap()
    }

    #[tokio::test]
    async fn test_list_projects_with_domain_filter() {
        let mut file = NamedTempFile::new().unwrap();
        write_fixture(&mut file, BASE_FIXTURE);
        let cloud = cloud_over(&file);

        let all = cloud.list_projects(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = cloud.list_projects(Some("d-elixir")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "alpha");
        assert_eq!(filtered[0].domain_name, "elixir");
    }

    #[tokio::test]
    async fn test_get_domain_by_name_or_id() {
        let mut file = NamedTempFile::new().unwrap();
        write_fixture(&mut file, BASE_FIXTURE);
        let cloud = cloud_over(&file);

        let by_name = cloud.get_domain("swift").await.unwrap().unwrap();
        assert_eq!(by_name.id, "d-swift");
        let by_id = cloud.get_domain("d-swift").await.unwrap().unwrap();
        assert_eq!(by_id.name, "swift");
        assert!(cloud.get_domain("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tenant_usage_for_bounded_machine() {
        let mut file = NamedTempFile::new().unwrap();
        write_fixture(&mut file, BASE_FIXTURE);
        let cloud = cloud_over(&file);

        // lifespan is entirely in the past: exactly 48 billable hours
        let usages = cloud.tenant_usage("p-1", at(2020, 1, 1, 0)).await.unwrap();
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].hours, 48.0);
        assert_eq!(usages[0].vcpus, 4);
        assert_eq!(usages[0].memory_mib, 8192);
        assert_eq!(usages[0].started_at, at(2020, 1, 1, 0));
    }

    #[tokio::test]
    async fn test_unknown_project_answers_empty() {
        let mut file = NamedTempFile::new().unwrap();
        write_fixture(&mut file, BASE_FIXTURE);
        let cloud = cloud_over(&file);

        assert!(cloud.tenant_usage("p-ghost", at(2020, 1, 1, 0)).await.unwrap().is_empty());
        assert!(cloud.server_inventory("p-ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fixture_edits_are_observed_without_restart() {
        let mut file = NamedTempFile::new().unwrap();
        write_fixture(&mut file, BASE_FIXTURE);
        let cloud = cloud_over(&file);

        let before = cloud.tenant_usage("p-1", at(2020, 1, 1, 0)).await.unwrap();
        assert_eq!(before[0].vcpus, 4);

        // flip the machine to 8 vCPUs and extend its lifespan
        write_fixture(
            &mut file,
            r#"
[elixir]
domain_id = "d-elixir"

[[elixir.projects]]
project_id = "p-1"
project_name = "alpha"

[[elixir.projects.machines]]
cpus = 8
ram = 16
existence = ["2020-01-01T00:00:00", "2020-01-05T00:00:00"]
instance_id = "i-1"
"#,
        );

        let after = cloud.tenant_usage("p-1", at(2020, 1, 1, 0)).await.unwrap();
        assert_eq!(after[0].vcpus, 8);
        assert_eq!(after[0].hours, 96.0);
    }

    #[tokio::test]
    async fn test_invalid_machine_fails_the_call() {
        let mut file = NamedTempFile::new().unwrap();
        write_fixture(&mut file, BASE_FIXTURE);
        let cloud = cloud_over(&file);

        write_fixture(
            &mut file,
            r#"
[elixir]
[[elixir.projects]]
project_id = "p-1"
[[elixir.projects.machines]]
cpus = 0
"#,
        );
        let err = cloud.tenant_usage("p-1", at(2020, 1, 1, 0)).await.unwrap_err();
        assert!(matches!(err, CumuloError::InvalidSpec(_)));
    }

    #[tokio::test]
    async fn test_inventory_returns_metadata() {
        let mut file = NamedTempFile::new().unwrap();
        write_fixture(
            &mut file,
            r#"
[elixir]
[[elixir.projects]]
project_id = "p-1"
[[elixir.projects.machines]]
instance_id = "i-a"
[elixir.projects.machines.metadata]
project_name = "sub-a"
"#,
        );
        let cloud = cloud_over(&file);

        let inventory = cloud.server_inventory("p-1").await.unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].instance_id, "i-a");
        assert_eq!(inventory[0].metadata.get("project_name").unwrap(), "sub-a");
    }

    #[tokio::test]
    async fn test_file_weight_source_reads_epochs() {
        let mut file = NamedTempFile::new().unwrap();
        write_fixture(
            &mut file,
            r#"
[[epochs]]
activation = "2020-01-01T00:00:00"
vcpu_tiers = [{ threshold = 2, weight = 1.0 }, { threshold = 8, weight = 1.5 }]
memory_tiers = [{ threshold = 16, weight = 1.0 }]
"#,
        );
        let source = FileWeightSource::new(file.path());
        let epochs = source.fetch().await.unwrap();
        assert_eq!(epochs.len(), 1);
        assert_eq!(epochs[0].vcpu_tiers.len(), 2);
        assert_eq!(epochs[0].memory_tiers[0].threshold, 16);
    }
}
