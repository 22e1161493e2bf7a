//! Remote control-plane client
//!
//! A thin, token-authenticated consumer of the control plane's two compute
//! queries and its identity lookups. Authentication flows are out of scope:
//! the token is pre-issued and handed over via the environment, and a failed
//! probe at connect time is fatal.
//!
//! Parsing is lenient per record: a malformed instance entry is logged and
//! skipped so one bad record never voids a whole project.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use cumulo_common::time::{format_wire, parse_instant};
use cumulo_common::{CumuloError, Domain, Project, Result, ServerInfo, ServerUsage};
use cumulo_metering::{UsageBackend, WeightEpoch, WeightSource};

/// Client for the real control plane
pub struct RemoteCloud {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RemoteCloud {
    /// Connect and probe the project listing once. A 401/403 surfaces as
    /// [`CumuloError::Authentication`]; anything else unreachable as
    /// [`CumuloError::BackendUnavailable`]. Both are fatal to startup.
    pub async fn connect(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let cloud = Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        };
        cloud.list_projects(None).await?;
        Ok(cloud)
    }

    async fn get_json(&self, path_and_query: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self
            .http
            .get(&url)
            .header("X-Auth-Token", &self.token)
            .send()
            .await
            .map_err(|e| CumuloError::BackendUnavailable(format!("GET {url}: {e}")))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CumuloError::Authentication(
                format!("{url}: {}", response.status()),
            )),
            status if !status.is_success() => Err(CumuloError::BackendUnavailable(format!(
                "{url}: {status}"
            ))),
            _ => response
                .json()
                .await
                .map_err(|e| CumuloError::malformed(url, e.to_string())),
        }
    }
}

#[async_trait]
impl UsageBackend for RemoteCloud {
    async fn list_projects(&self, domain_id: Option<&str>) -> Result<Vec<Project>> {
        let path = match domain_id {
            Some(id) => format!("/identity/v3/projects?domain_id={id}"),
            None => "/identity/v3/projects".to_string(),
        };
        let payload = self.get_json(&path).await?;
        Ok(parse_projects(&payload))
    }

    async fn get_domain(&self, name_or_id: &str) -> Result<Option<Domain>> {
        let payload = self.get_json("/identity/v3/domains").await?;
        Ok(parse_domains(&payload)
            .into_iter()
            .find(|d| d.name == name_or_id || d.id == name_or_id))
    }

    async fn tenant_usage(
        &self,
        project_id: &str,
        window_start: NaiveDateTime,
    ) -> Result<Vec<ServerUsage>> {
        let path = format!(
            "/compute/v2.1/os-simple-tenant-usage/{project_id}?start={}",
            format_wire(window_start)
        );
        let payload = self.get_json(&path).await?;
        Ok(parse_usage_records(&payload, project_id))
    }

    async fn server_inventory(&self, project_id: &str) -> Result<Vec<ServerInfo>> {
        let path = format!("/compute/v2.1/servers/detail?all_tenants=false&project_id={project_id}");
        let payload = self.get_json(&path).await?;
        Ok(parse_servers(&payload, project_id))
    }
}

#[derive(Debug, Deserialize)]
struct WireProject {
    id: String,
    name: String,
    #[serde(default)]
    domain_id: String,
}

fn parse_projects(payload: &Value) -> Vec<Project> {
    let Some(entries) = payload.get("projects").and_then(Value::as_array) else {
        warn!(%payload, "project listing without `projects` key");
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<WireProject>(entry.clone()) {
            // domain_name is resolved separately by the caller
            Ok(wire) => Some(Project::new(wire.id, wire.name, wire.domain_id, "")),
            Err(e) => {
                warn!(payload = %entry, error = %e, "skipping malformed project record");
                None
            }
        })
        .collect()
}

fn parse_domains(payload: &Value) -> Vec<Domain> {
    let Some(entries) = payload.get("domains").and_then(Value::as_array) else {
        warn!(%payload, "domain listing without `domains` key");
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<Domain>(entry.clone()) {
            Ok(domain) => Some(domain),
            Err(e) => {
                warn!(payload = %entry, error = %e, "skipping malformed domain record");
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct WireServerUsage {
    instance_id: String,
    hours: f64,
    vcpus: u32,
    /// MiB despite the upstream field name
    memory_mb: u64,
    started_at: String,
}

fn parse_usage_records(payload: &Value, project_id: &str) -> Vec<ServerUsage> {
    let Some(entries) = payload
        .pointer("/tenant_usage/server_usages")
        .and_then(Value::as_array)
    else {
        // an absent usage body means "skip this project", not an error
        warn!(project_id, %payload, "tenant usage without `server_usages`");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match parse_usage_record(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(project_id, error = %e, "skipping malformed usage record");
                None
            }
        })
        .collect()
}

fn parse_usage_record(entry: &Value) -> Result<ServerUsage> {
    let wire: WireServerUsage = serde_json::from_value(entry.clone())
        .map_err(|e| CumuloError::malformed("server_usage", format!("{e}; payload: {entry}")))?;
    Ok(ServerUsage {
        instance_id: wire.instance_id,
        hours: wire.hours,
        vcpus: wire.vcpus,
        memory_mib: wire.memory_mb,
        started_at: parse_instant(&wire.started_at)?,
    })
}

#[derive(Debug, Deserialize)]
struct WireServer {
    id: String,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

fn parse_servers(payload: &Value, project_id: &str) -> Vec<ServerInfo> {
    let Some(entries) = payload.get("servers").and_then(Value::as_array) else {
        warn!(project_id, %payload, "server detail without `servers` key");
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<WireServer>(entry.clone()) {
            Ok(wire) => Some(ServerInfo {
                instance_id: wire.id,
                metadata: wire.metadata,
            }),
            Err(e) => {
                warn!(project_id, payload = %entry, error = %e, "skipping malformed server record");
                None
            }
        })
        .collect()
}

/// Weight source over an HTTP endpoint returning the ordered epoch sequence
/// as JSON
pub struct HttpWeightSource {
    http: reqwest::Client,
    url: String,
}

impl HttpWeightSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl WeightSource for HttpWeightSource {
    async fn fetch(&self) -> Result<Vec<WeightEpoch>> {
        debug!(url = %self.url, "fetching weight epochs");
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CumuloError::BackendUnavailable(format!("GET {}: {e}", self.url)))?;
        if !response.status().is_success() {
            return Err(CumuloError::BackendUnavailable(format!(
                "{}: {}",
                self.url,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| CumuloError::malformed(self.url.clone(), e.to_string()))
    }
}
