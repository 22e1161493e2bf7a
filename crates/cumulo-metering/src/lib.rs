//! # Cumulo Metering
//!
//! The usage-accounting engine: converts per-instance existence hours into
//! billing-adjusted per-project totals.
//!
//! ## Pieces
//!
//! - [`UsageBackend`]: the query surface both the real control plane client
//!   and the simulated cloud implement
//! - [`WeightTierSet`]/[`WeightTable`]: time-sharded, value-tiered billing
//!   multipliers, swapped wholesale on refresh
//! - [`UsageAccountant`]: aggregates hours × amount × weight per project,
//!   including sub-tenant grouping by metadata tag
//!
//! The engine holds no state across polling cycles apart from the weight
//! table; every cycle re-derives everything from the backend.

pub mod accountant;
pub mod backend;
pub mod weights;

pub use accountant::{AccountantConfig, UsageAccountant};
pub use backend::UsageBackend;
pub use weights::{Tier, WeightEpoch, WeightSource, WeightTable, WeightTierSet};
