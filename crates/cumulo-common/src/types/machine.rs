//! Machine existence model
//!
//! A machine's billable lifespan is described by an [`ExistenceWindow`] and
//! converted into elapsed hours relative to an arbitrary query window start.
//! The conversion is pure: the caller supplies both "now" and the process
//! start instant, so tests never need to mock a clock.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{CumuloError, Result};
use crate::SECONDS_PER_HOUR;

/// When a machine is considered to exist.
///
/// The four variants are a closed set; every consumer matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExistenceWindow {
    /// Never booted; contributes no usage
    Never,
    /// Existence began the instant the accounting process started
    SinceProcessStart,
    /// Existence began at the given boot instant
    SinceInstant(NaiveDateTime),
    /// Existence spans `[boot, shutdown]`; `boot <= shutdown` holds by
    /// construction
    Between {
        boot: NaiveDateTime,
        shutdown: NaiveDateTime,
    },
}

impl ExistenceWindow {
    /// Construct a bounded window. Fails unless `boot <= shutdown`.
    pub fn between(boot: NaiveDateTime, shutdown: NaiveDateTime) -> Result<Self> {
        if boot > shutdown {
            return Err(CumuloError::InvalidSpec(format!(
                "existence span boot ({boot}) must not be after shutdown ({shutdown})"
            )));
        }
        Ok(ExistenceWindow::Between { boot, shutdown })
    }

    /// Validate the variant invariants; used when a window arrives
    /// pre-assembled from fixture data.
    pub fn validate(&self) -> Result<()> {
        if let ExistenceWindow::Between { boot, shutdown } = self {
            if boot > shutdown {
                return Err(CumuloError::InvalidSpec(format!(
                    "existence span boot ({boot}) must not be after shutdown ({shutdown})"
                )));
            }
        }
        Ok(())
    }

    /// Elapsed billable hours at `now`, relative to `window_start`.
    ///
    /// `SinceProcessStart` is deliberately unclamped: a `window_start` past
    /// `now` yields a negative value, matching the upstream accounting
    /// surface. The instant-anchored variants clamp at zero so a machine is
    /// never billed negatively before it boots.
    pub fn hours_existed(
        &self,
        window_start: NaiveDateTime,
        process_start: NaiveDateTime,
        now: NaiveDateTime,
    ) -> f64 {
        match self {
            ExistenceWindow::Never => 0.0,
            ExistenceWindow::SinceProcessStart => {
                let origin = if window_start > process_start {
                    window_start
                } else {
                    process_start
                };
                hours_between(origin, now)
            }
            ExistenceWindow::SinceInstant(boot) => {
                let origin = if window_start > *boot { window_start } else { *boot };
                hours_between(origin, now).max(0.0)
            }
            ExistenceWindow::Between { boot, shutdown } => {
                if *boot > now {
                    // machine did not boot yet
                    return 0.0;
                }
                let origin = if window_start > *boot { window_start } else { *boot };
                let end = if *shutdown < now { *shutdown } else { now };
                hours_between(origin, end).max(0.0)
            }
        }
    }

    /// The boot instant reported on the wire as `started_at`.
    ///
    /// Flag-style variants fall back to the process start, like the upstream
    /// control plane does for machines it has always known about.
    pub fn boot_instant(&self, process_start: NaiveDateTime) -> NaiveDateTime {
        match self {
            ExistenceWindow::Never | ExistenceWindow::SinceProcessStart => process_start,
            ExistenceWindow::SinceInstant(boot) => *boot,
            ExistenceWindow::Between { boot, .. } => *boot,
        }
    }
}

fn hours_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_milliseconds() as f64 / (SECONDS_PER_HOUR * 1000.0)
}

/// Validated description of one machine causing usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    /// Number of vCPUs; positive
    pub cpus: u32,
    /// RAM in GiB; positive
    pub ram_gib: u64,
    /// When the machine exists
    pub existence: ExistenceWindow,
    /// Upstream instance identifier
    pub instance_id: String,
    /// Free-form instance metadata (used for sub-tenant grouping)
    pub metadata: HashMap<String, String>,
}

impl MachineSpec {
    /// Construct a validated spec. Fails with [`CumuloError::InvalidSpec`]
    /// unless `cpus` and `ram_gib` are positive and the existence window is
    /// well-formed.
    pub fn new(
        cpus: u32,
        ram_gib: u64,
        existence: ExistenceWindow,
        instance_id: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Result<Self> {
        if cpus == 0 || ram_gib == 0 {
            return Err(CumuloError::InvalidSpec(
                "`cpus` and `ram` must be positive".to_string(),
            ));
        }
        existence.validate()?;
        Ok(Self {
            cpus,
            ram_gib,
            existence,
            instance_id: instance_id.into(),
            metadata,
        })
    }

    /// RAM in MiB, the unit the control plane speaks on the wire
    pub fn ram_mib(&self) -> u64 {
        self.ram_gib * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_never_is_zero() {
        assert_eq!(ExistenceWindow::Never.hours_existed(at(0), at(0), at(12)), 0.0);
    }

    #[test]
    fn test_between_requires_ordered_span() {
        assert!(ExistenceWindow::between(at(5), at(2)).is_err());
        assert!(ExistenceWindow::between(at(2), at(5)).is_ok());
    }

    #[test]
    fn test_bounded_machine_mid_lifespan() {
        // Scenario: up [T0, T0+2h], queried at T0+1h with window start T0
        let window = ExistenceWindow::between(at(0), at(2)).unwrap();
        assert_eq!(window.hours_existed(at(0), at(0), at(1)), 1.0);
    }

    #[test]
    fn test_bounded_machine_after_shutdown() {
        // queried well after shutdown: clamped to the full lifespan
        let window = ExistenceWindow::between(at(0), at(2)).unwrap();
        assert_eq!(window.hours_existed(at(0), at(0), at(5)), 2.0);
    }

    #[test]
    fn test_bounded_machine_not_yet_booted() {
        let window = ExistenceWindow::between(at(6), at(8)).unwrap();
        assert_eq!(window.hours_existed(at(0), at(0), at(3)), 0.0);
    }

    #[test]
    fn test_bounded_machine_window_start_inside_lifespan() {
        // window opens an hour into the lifespan; only the tail counts
        let window = ExistenceWindow::between(at(0), at(4)).unwrap();
        assert_eq!(window.hours_existed(at(1), at(0), at(3)), 2.0);
        // after shutdown the tail is shutdown - window_start
        assert_eq!(window.hours_existed(at(1), at(0), at(9)), 3.0);
    }

    #[test]
    fn test_bounded_never_negative() {
        // window start past the shutdown would be negative unclamped
        let window = ExistenceWindow::between(at(0), at(2)).unwrap();
        assert_eq!(window.hours_existed(at(3), at(0), at(5)), 0.0);
    }

    #[test]
    fn test_bounded_monotonic_then_constant() {
        let window = ExistenceWindow::between(at(1), at(6)).unwrap();
        let mut last = 0.0;
        for now_h in 1..6 {
            let h = window.hours_existed(at(0), at(0), at(now_h));
            assert!(h >= last, "must be non-decreasing while running");
            last = h;
        }
        assert_eq!(window.hours_existed(at(0), at(0), at(6)), 5.0);
        assert_eq!(window.hours_existed(at(0), at(0), at(23)), 5.0);
    }

    #[test]
    fn test_since_instant_clamps_at_zero() {
        let window = ExistenceWindow::SinceInstant(at(10));
        assert_eq!(window.hours_existed(at(0), at(0), at(4)), 0.0);
        assert_eq!(window.hours_existed(at(0), at(0), at(12)), 2.0);
    }

    #[test]
    fn test_since_instant_window_start_after_boot() {
        let window = ExistenceWindow::SinceInstant(at(1));
        assert_eq!(window.hours_existed(at(3), at(0), at(5)), 2.0);
    }

    #[test]
    fn test_since_process_start_uses_later_origin() {
        let window = ExistenceWindow::SinceProcessStart;
        // window start before process start: bill from process start
        assert_eq!(window.hours_existed(at(0), at(2), at(5)), 3.0);
        // window start after process start: bill from window start
        assert_eq!(window.hours_existed(at(3), at(2), at(5)), 2.0);
    }

    #[test]
    fn test_since_process_start_future_window_goes_negative() {
        // Pinned upstream asymmetry: this variant is NOT clamped at zero.
        let window = ExistenceWindow::SinceProcessStart;
        assert_eq!(window.hours_existed(at(8), at(0), at(5)), -3.0);
    }

    #[test]
    fn test_machine_spec_validation() {
        assert!(MachineSpec::new(0, 8, ExistenceWindow::SinceProcessStart, "i-1", HashMap::new())
            .is_err());
        assert!(MachineSpec::new(4, 0, ExistenceWindow::SinceProcessStart, "i-1", HashMap::new())
            .is_err());
        let spec =
            MachineSpec::new(4, 8, ExistenceWindow::SinceProcessStart, "i-1", HashMap::new())
                .unwrap();
        assert_eq!(spec.ram_mib(), 8192);
    }

    #[test]
    fn test_boot_instant_fallback() {
        let spec = ExistenceWindow::SinceProcessStart;
        assert_eq!(spec.boot_instant(at(7)), at(7));
        let booted = ExistenceWindow::SinceInstant(at(3));
        assert_eq!(booted.boot_instant(at(7)), at(3));
    }
}
