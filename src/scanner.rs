//! Widening time-window scan
//!
//! Providers sync lazily, so the most recent day may be empty while older
//! data exists. The scanner probes look-back windows of increasing length,
//! all ending at the same "now", and keeps the readings of the first window
//! that returns anything. Readings are never merged across windows.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{FailureReason, ProviderError};
use crate::provider::HealthProvider;
use crate::types::{MetricKind, Reading, TimeRange};

/// Look-back window ending at "now"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookbackWindow {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl LookbackWindow {
    /// Windows in the order they are tried
    pub const SEQUENCE: [LookbackWindow; 4] = [
        LookbackWindow::Day,
        LookbackWindow::ThreeDays,
        LookbackWindow::Week,
        LookbackWindow::Month,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LookbackWindow::Day => "24h",
            LookbackWindow::ThreeDays => "3d",
            LookbackWindow::Week => "7d",
            LookbackWindow::Month => "30d",
        }
    }

    pub fn length(&self) -> Duration {
        match self {
            LookbackWindow::Day => Duration::hours(24),
            LookbackWindow::ThreeDays => Duration::days(3),
            LookbackWindow::Week => Duration::days(7),
            LookbackWindow::Month => Duration::days(30),
        }
    }
}

/// One probed window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowAttempt {
    pub window: LookbackWindow,
    pub range: TimeRange,
    /// Readings returned; `None` when the query failed
    pub point_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every attempt of a scan plus its outcome
#[derive(Debug, Clone, Default)]
pub struct ScanTrace {
    pub attempts: Vec<WindowAttempt>,
    /// Readings of the winning window
    pub readings: Vec<Reading>,
    pub winning_window: Option<LookbackWindow>,
    /// Set when the scan stopped on a permission error
    pub aborted: Option<ScanError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("permission revoked while scanning {window}: {source}")]
    PermissionRevoked {
        window: &'static str,
        #[source]
        source: ProviderError,
    },
}

impl From<ScanError> for FailureReason {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::PermissionRevoked { .. } => FailureReason::PermissionsRevoked,
        }
    }
}

pub struct TimeWindowScanner {
    provider: Arc<dyn HealthProvider>,
    clock: Arc<dyn Clock>,
}

impl TimeWindowScanner {
    pub fn new(provider: Arc<dyn HealthProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { provider, clock }
    }

    /// Readings from the first non-empty window, or none if all are empty
    pub async fn scan(&self, kinds: &[MetricKind]) -> Result<Vec<Reading>, ScanError> {
        let trace = self.scan_traced(kinds).await;
        match trace.aborted {
            Some(err) => Err(err),
            None => Ok(trace.readings),
        }
    }

    /// Scan recording every window tried
    pub async fn scan_traced(&self, kinds: &[MetricKind]) -> ScanTrace {
        let now = self.clock.now();
        let mut trace = ScanTrace::default();

        for window in LookbackWindow::SEQUENCE {
            let range = TimeRange::ending_at(now, window.length());

            match self.provider.query_readings(kinds, range.start, range.end).await {
                Ok(readings) => {
                    debug!(window = window.label(), points = readings.len(), "window queried");
                    trace.attempts.push(WindowAttempt {
                        window,
                        range,
                        point_count: Some(readings.len()),
                        error: None,
                    });
                    if !readings.is_empty() {
                        info!(window = window.label(), points = readings.len(), "found readings");
                        trace.readings = readings;
                        trace.winning_window = Some(window);
                        return trace;
                    }
                }
                Err(e) if e.is_permission_denied() => {
                    warn!(window = window.label(), error = %e, "permission error, aborting scan");
                    trace.attempts.push(WindowAttempt {
                        window,
                        range,
                        point_count: None,
                        error: Some(e.to_string()),
                    });
                    trace.aborted = Some(ScanError::PermissionRevoked {
                        window: window.label(),
                        source: e,
                    });
                    return trace;
                }
                Err(e) => {
                    warn!(window = window.label(), error = %e, "window query failed, trying next");
                    trace.attempts.push(WindowAttempt {
                        window,
                        range,
                        point_count: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!("no readings in any lookback window");
        trace
    }
}
