//! Service configuration
//!
//! The reconcile interval is deliberately configurable rather than a
//! hardcoded constant so the loop can be driven by tests without real-time
//! waits.

use std::time::Duration;

use crate::{BsaError, BsaResult};

/// Configuration for the reconciliation core
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Interval between reconciliation cycles
    pub reconcile_interval: Duration,
    /// Committed snapshots to retain; `None` keeps full history
    pub history_limit: Option<usize>,
    /// Recent proposal outcomes kept for inspection
    pub outcome_window: usize,
    /// Consecutive commit failures before the service reports degraded
    pub degraded_after: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            reconcile_interval: Duration::from_secs(5),
            history_limit: None,
            outcome_window: 256,
            degraded_after: 3,
        }
    }
}

impl CoreConfig {
    /// Read configuration from the environment, falling back to defaults
    ///
    /// Recognized variables:
    /// - `BSA_RECONCILE_INTERVAL` — humantime duration, e.g. `5s`, `250ms`
    /// - `BSA_HISTORY_LIMIT` — number of snapshots to retain
    pub fn from_env() -> BsaResult<Self> {
        let mut config = CoreConfig::default();

        if let Ok(raw) = std::env::var("BSA_RECONCILE_INTERVAL") {
            let interval = humantime::parse_duration(&raw).map_err(|e| {
                BsaError::InvalidConfig(format!("BSA_RECONCILE_INTERVAL: {}", e))
            })?;
            if interval.is_zero() {
                return Err(BsaError::InvalidConfig(
                    "BSA_RECONCILE_INTERVAL must be non-zero".to_string(),
                ));
            }
            config.reconcile_interval = interval;
        }

        if let Ok(raw) = std::env::var("BSA_HISTORY_LIMIT") {
            let limit: usize = raw.parse().map_err(|_| {
                BsaError::InvalidConfig(format!("BSA_HISTORY_LIMIT: not a number: {}", raw))
            })?;
            if limit == 0 {
                return Err(BsaError::InvalidConfig(
                    "BSA_HISTORY_LIMIT must be at least 1".to_string(),
                ));
            }
            config.history_limit = Some(limit);
        }

        Ok(config)
    }
}
