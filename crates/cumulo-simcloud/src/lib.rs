//! # Cumulo Simcloud
//!
//! A simulated control plane answering the [`cumulo_metering::UsageBackend`]
//! queries from a declarative TOML fixture. The fixture is re-parsed on every
//! call, so editing it between calls changes the answers without a restart;
//! tests use this to flip machines between lifecycle states mid-run.

pub mod cloud;
pub mod fixture;

pub use cloud::{FileWeightSource, SimulatedCloud};
