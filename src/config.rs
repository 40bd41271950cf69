//! Engine configuration
//!
//! Loaded from JSON; every field has a default so an empty object is valid.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::VitalsError;
use crate::types::{Capability, MetricKind};

/// Default minimum spacing between refreshes (seconds)
pub const DEFAULT_MIN_REFRESH_INTERVAL_SECS: u64 = 30;

/// Default period of the background refresh timer (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 120;

const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Upper bound for both refresh intervals (one day)
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Offset of the user's local day from UTC (minutes east)
    pub utc_offset_minutes: i32,
    /// Runtime permissions that must all be granted
    pub required_capabilities: Vec<Capability>,
    /// Metric kinds requested from the provider
    pub metric_kinds: Vec<MetricKind>,
    pub min_refresh_interval_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            required_capabilities: Capability::ALL.to_vec(),
            metric_kinds: MetricKind::ALL.to_vec(),
            min_refresh_interval_secs: DEFAULT_MIN_REFRESH_INTERVAL_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl SyncConfig {
    /// Load and validate configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, VitalsError> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, VitalsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, VitalsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), VitalsError> {
        if !(-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&self.utc_offset_minutes) {
            return Err(VitalsError::InvalidConfig(format!(
                "utc_offset_minutes {} outside ±{}",
                self.utc_offset_minutes, MAX_OFFSET_MINUTES
            )));
        }
        if self.metric_kinds.is_empty() {
            return Err(VitalsError::InvalidConfig(
                "metric_kinds must not be empty".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(VitalsError::InvalidConfig(
                "poll_interval_secs must be positive".to_string(),
            ));
        }
        for (name, secs) in [
            ("min_refresh_interval_secs", self.min_refresh_interval_secs),
            ("poll_interval_secs", self.poll_interval_secs),
        ] {
            if secs > MAX_INTERVAL_SECS {
                return Err(VitalsError::InvalidConfig(format!(
                    "{} {} exceeds {}",
                    name, secs, MAX_INTERVAL_SECS
                )));
            }
        }
        Ok(())
    }

    /// Offset used for local-day boundaries
    pub fn utc_offset(&self) -> Result<FixedOffset, VitalsError> {
        offset_from_minutes(self.utc_offset_minutes).ok_or_else(|| {
            VitalsError::InvalidConfig(format!(
                "utc_offset_minutes {} is not a valid offset",
                self.utc_offset_minutes
            ))
        })
    }
}

/// Offset east of UTC, or `None` when out of range
pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}
