//! Declarative fixture schema
//!
//! Top-level tables are keyed by domain name; each domain carries a
//! `domain_id` and a `projects` array, each project a `machines` array.
//! Machine `existence` accepts a boolean (up since process start / never), a
//! single instant (up since then), or a two-instant array (up in between).
//! Instants may be quoted strings or native TOML datetimes; either way any
//! zone offset is discarded.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::Deserialize;

use cumulo_common::time::parse_instant;
use cumulo_common::{
    CumuloError, ExistenceWindow, MachineSpec, Project, Result, DEFAULT_MACHINE_CPUS,
    DEFAULT_MACHINE_RAM_GIB, UNKNOWN_DOMAIN_ID, UNKNOWN_ID, UNKNOWN_NAME,
};

/// The whole fixture document: domain name → domain content
pub type FixtureDoc = BTreeMap<String, DomainFixture>;

#[derive(Debug, Clone, Deserialize)]
pub struct DomainFixture {
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub projects: Vec<ProjectFixture>,
}

impl DomainFixture {
    pub fn domain_id(&self) -> &str {
        self.domain_id.as_deref().unwrap_or(UNKNOWN_DOMAIN_ID)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFixture {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub machines: Vec<MachineFixture>,
}

impl ProjectFixture {
    pub fn project_id(&self) -> &str {
        self.project_id.as_deref().unwrap_or(UNKNOWN_ID)
    }

    /// The identity record for this fixture entry
    pub fn to_project(&self, domain_name: &str, domain_id: &str) -> Project {
        Project::new(
            self.project_id(),
            self.project_name.as_deref().unwrap_or(UNKNOWN_NAME),
            domain_id,
            domain_name,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineFixture {
    /// Signed so a negative fixture value fails validation, not parsing
    #[serde(default = "default_cpus")]
    pub cpus: i64,
    /// RAM in GiB
    #[serde(default = "default_ram")]
    pub ram: i64,
    #[serde(default)]
    pub existence: ExistenceField,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub instance_id: Option<String>,
}

fn default_cpus() -> i64 {
    DEFAULT_MACHINE_CPUS as i64
}

fn default_ram() -> i64 {
    DEFAULT_MACHINE_RAM_GIB as i64
}

impl MachineFixture {
    /// Validate into a [`MachineSpec`]; fails with `InvalidSpec` on
    /// non-positive resources or a reversed existence span.
    pub fn to_spec(&self) -> Result<MachineSpec> {
        if self.cpus <= 0 || self.ram <= 0 {
            return Err(CumuloError::InvalidSpec(
                "`cpus` and `ram` must be positive".to_string(),
            ));
        }
        MachineSpec::new(
            self.cpus as u32,
            self.ram as u64,
            self.existence.to_window()?,
            self.instance_id.as_deref().unwrap_or(UNKNOWN_ID),
            self.metadata.clone(),
        )
    }
}

/// The `existence` field as written in the fixture
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExistenceField {
    /// `true`: up since process start; `false`: never booted
    Flag(bool),
    /// Up since the given instant
    Since(InstantField),
    /// Up between two instants; must hold exactly two
    Span(Vec<InstantField>),
}

impl Default for ExistenceField {
    fn default() -> Self {
        ExistenceField::Flag(true)
    }
}

impl ExistenceField {
    pub fn to_window(&self) -> Result<ExistenceWindow> {
        match self {
            ExistenceField::Flag(true) => Ok(ExistenceWindow::SinceProcessStart),
            ExistenceField::Flag(false) => Ok(ExistenceWindow::Never),
            ExistenceField::Since(instant) => Ok(ExistenceWindow::SinceInstant(instant.resolve()?)),
            ExistenceField::Span(span) => match span.as_slice() {
                [boot, shutdown] => ExistenceWindow::between(boot.resolve()?, shutdown.resolve()?),
                _ => Err(CumuloError::InvalidSpec(format!(
                    "existence span must hold exactly two instants, got {}",
                    span.len()
                ))),
            },
        }
    }
}

/// A fixture instant: quoted string or native TOML datetime
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InstantField {
    Text(String),
    Native(toml::value::Datetime),
}

impl InstantField {
    pub fn resolve(&self) -> Result<NaiveDateTime> {
        match self {
            InstantField::Text(s) => parse_instant(s),
            InstantField::Native(dt) => parse_instant(&dt.to_string()),
        }
    }
}

/// Parse a fixture document from TOML text
pub fn parse_fixture(text: &str) -> Result<FixtureDoc> {
    toml::from_str(text).map_err(|e| CumuloError::Serialization(format!("fixture parse: {e}")))
}
