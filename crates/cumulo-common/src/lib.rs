//! # Cumulo Common
//!
//! Shared types, errors, and instant handling for the Cumulo usage exporter.
//!
//! ## Core Types
//!
//! - [`ExistenceWindow`]: the modeled lifespan of a virtual machine
//! - [`MachineSpec`]: validated cpu/memory/existence description of a machine
//! - [`Project`]: tenant identity record, real or synthetic
//! - [`ServerUsage`]/[`ServerInfo`]: per-instance usage and inventory records
//! - [`UsageMetric`]/[`UsageTotals`]: the billed metrics and their totals

pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{CumuloError, Result};
pub use types::{
    machine::{ExistenceWindow, MachineSpec},
    project::{Domain, Project},
    usage::{ProjectUsage, ServerInfo, ServerUsage, UsageMetric, UsageTotals},
};

/// Cumulo version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seconds per billable hour
pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// MiB per GiB; memory crosses the wire in MiB and is accounted in GiB
pub const MIB_PER_GIB: f64 = 1024.0;

/// Placeholder id for fixture entries that omit one
pub const UNKNOWN_ID: &str = "UNKNOWN_ID";

/// Placeholder name for fixture entries that omit one
pub const UNKNOWN_NAME: &str = "UNKNOWN_NAME";

/// Placeholder domain id for fixture entries that omit one
pub const UNKNOWN_DOMAIN_ID: &str = "UNKNOWN_DOMAIN_ID";

/// Default vCPU count for fixture machines
pub const DEFAULT_MACHINE_CPUS: u32 = 4;

/// Default RAM (GiB) for fixture machines
pub const DEFAULT_MACHINE_RAM_GIB: u64 = 8;
