//! Periodic motor-driver fault polling.

use puller_traits::{DriverFaultFlags, FaultFlag};

use crate::config::DiagnosticsCfg;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct DiagnosticsMonitor {
    interval_ms: u64,
    stop_on_fault: bool,
    last_poll_ms: u64,
}

impl DiagnosticsMonitor {
    pub fn new(cfg: &DiagnosticsCfg) -> Self {
        Self {
            interval_ms: cfg.interval_ms.max(1),
            stop_on_fault: cfg.stop_on_fault,
            last_poll_ms: 0,
        }
    }

    /// Read the driver at most once per interval and return the asserted flags.
    ///
    /// Returns an empty vector when no poll is due or the read fails.
    pub fn poll_if_due<F>(&mut self, now_ms: u64, read: F) -> Vec<FaultFlag>
    where
        F: FnOnce() -> Result<DriverFaultFlags>,
    {
        if now_ms.saturating_sub(self.last_poll_ms) < self.interval_ms {
            return Vec::new();
        }
        self.last_poll_ms = now_ms;
        match read() {
            Ok(flags) => {
                let asserted = flags.asserted();
                for flag in &asserted {
                    tracing::warn!(%flag, "driver fault");
                }
                asserted
            }
            Err(e) => {
                tracing::error!(error = %e, "driver diagnostics read failed");
                Vec::new()
            }
        }
    }

    /// The flag that should stop motion, if escalation is enabled.
    pub fn escalation(&self, flags: &[FaultFlag]) -> Option<FaultFlag> {
        if !self.stop_on_fault {
            return None;
        }
        flags.iter().copied().find(|f| f.is_critical())
    }
}
