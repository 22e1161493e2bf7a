//! Exporter configuration
//!
//! Pure environment-variable configuration (a `.env` file is honored via
//! dotenvy). Variable names follow the deployment convention of the
//! exporter's predecessors; anything unset takes a documented default.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;

use cumulo_common::time::parse_instant;
use cumulo_common::{CumuloError, Result};

// Environment variable names
pub const START_DATE_VAR: &str = "USAGE_EXPORTER_START_DATE";
pub const UPDATE_INTERVAL_VAR: &str = "USAGE_EXPORTER_UPDATE_INTERVAL";
pub const PROJECT_DOMAINS_VAR: &str = "USAGE_EXPORTER_PROJECT_DOMAINS";
pub const DUMMY_FILE_VAR: &str = "USAGE_EXPORTER_DUMMY_FILE";
pub const WEIGHTS_FILE_VAR: &str = "USAGE_EXPORTER_WEIGHTS_FILE";
pub const WEIGHTS_URL_VAR: &str = "USAGE_EXPORTER_WEIGHTS_URL";
pub const WEIGHT_REFRESH_CYCLES_VAR: &str = "USAGE_EXPORTER_WEIGHT_REFRESH_CYCLES";
pub const GROUPING_PROJECTS_VAR: &str = "USAGE_EXPORTER_GROUPING_PROJECTS";
pub const GROUPING_TAG_VAR: &str = "USAGE_EXPORTER_GROUPING_TAG";
pub const LISTEN_VAR: &str = "USAGE_EXPORTER_LISTEN";
pub const API_URL_VAR: &str = "CLOUD_API_URL";
pub const API_TOKEN_VAR: &str = "CLOUD_API_TOKEN";

/// Exporter service configuration
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Address the /metrics endpoint listens on
    pub listen_addr: String,
    /// Sleep between polling cycles
    pub update_interval: Duration,
    /// Refresh the weight table every this many cycles
    pub weight_refresh_cycles: u64,
    /// Beginning of the usage window; process start when unset
    pub window_start: Option<NaiveDateTime>,
    /// Only export projects of these domains; empty means all readable
    /// projects
    pub domains: Vec<String>,
    /// Fixture path; set selects the simulated backend
    pub fixture_file: Option<PathBuf>,
    /// Weight epochs from a local file (simulated runs)
    pub weights_file: Option<PathBuf>,
    /// Weight epochs from an HTTP endpoint
    pub weights_url: Option<String>,
    /// Projects (ids or names) split into synthetic sub-projects
    pub grouping_projects: HashSet<String>,
    /// Metadata key carrying the sub-project name
    pub grouping_tag: String,
    /// Control plane root URL (real backend)
    pub api_url: Option<String>,
    /// Pre-issued control plane token
    pub api_token: Option<String>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            update_interval: Duration::from_secs(300),
            weight_refresh_cycles: 12,
            window_start: None,
            domains: vec!["elixir".to_string()],
            fixture_file: None,
            weights_file: None,
            weights_url: None,
            grouping_projects: HashSet::new(),
            grouping_tag: "project_name".to_string(),
            api_url: None,
            api_token: None,
        }
    }
}

impl ExporterConfig {
    /// Load configuration from the environment (and a `.env` file if present)
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        if let Some(addr) = env_opt(LISTEN_VAR) {
            cfg.listen_addr = addr;
        }
        if let Some(secs) = env_opt(UPDATE_INTERVAL_VAR) {
            cfg.update_interval = Duration::from_secs(parse_var(UPDATE_INTERVAL_VAR, &secs)?);
        }
        if let Some(cycles) = env_opt(WEIGHT_REFRESH_CYCLES_VAR) {
            cfg.weight_refresh_cycles = parse_var(WEIGHT_REFRESH_CYCLES_VAR, &cycles)?;
            if cfg.weight_refresh_cycles == 0 {
                return Err(CumuloError::Config(format!(
                    "{WEIGHT_REFRESH_CYCLES_VAR} must be positive"
                )));
            }
        }
        if let Some(start) = env_opt(START_DATE_VAR) {
            cfg.window_start = Some(parse_instant(&start)?);
        }
        if let Ok(domains) = std::env::var(PROJECT_DOMAINS_VAR) {
            // explicit empty value means "all readable projects"
            cfg.domains = split_list(&domains);
        }
        cfg.fixture_file = env_opt(DUMMY_FILE_VAR).map(PathBuf::from);
        cfg.weights_file = env_opt(WEIGHTS_FILE_VAR).map(PathBuf::from);
        cfg.weights_url = env_opt(WEIGHTS_URL_VAR);
        if let Some(projects) = env_opt(GROUPING_PROJECTS_VAR) {
            cfg.grouping_projects = split_list(&projects).into_iter().collect();
        }
        if let Some(tag) = env_opt(GROUPING_TAG_VAR) {
            cfg.grouping_tag = tag;
        }
        cfg.api_url = env_opt(API_URL_VAR);
        cfg.api_token = env_opt(API_TOKEN_VAR);

        Ok(cfg)
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CumuloError::Config(format!("{name}: cannot parse '{value}'")))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
