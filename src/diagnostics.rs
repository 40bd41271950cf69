//! Diagnostic runner
//!
//! Re-runs the fetch pipeline read-only and records what each step saw. A
//! report is always produced: failures become entries in `errors` instead of
//! aborting the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::permissions::PermissionGate;
use crate::reconciler::MetricReconciler;
use crate::scanner::{TimeWindowScanner, WindowAttempt};
use crate::types::{HealthSnapshot, MetricKind, PermissionState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub permission_state: PermissionState,
    /// Every window probed, not only the winning one
    pub windows_tried: Vec<WindowAttempt>,
    /// Readings per kind in the winning window
    pub breakdown_by_metric: BTreeMap<MetricKind, usize>,
    pub snapshot: Option<HealthSnapshot>,
    /// Step-by-step notes, in order
    pub observations: Vec<String>,
    pub errors: Vec<String>,
    pub success: bool,
}

pub struct DiagnosticRunner<'a> {
    gate: &'a PermissionGate,
    scanner: &'a TimeWindowScanner,
    reconciler: &'a MetricReconciler,
    clock: &'a dyn Clock,
    metric_kinds: &'a [MetricKind],
}

impl<'a> DiagnosticRunner<'a> {
    pub fn new(
        gate: &'a PermissionGate,
        scanner: &'a TimeWindowScanner,
        reconciler: &'a MetricReconciler,
        clock: &'a dyn Clock,
        metric_kinds: &'a [MetricKind],
    ) -> Self {
        Self {
            gate,
            scanner,
            reconciler,
            clock,
            metric_kinds,
        }
    }

    pub async fn run(&self) -> DiagnosticReport {
        let mut observations = Vec::new();
        let mut errors = Vec::new();

        // Step 1: permissions
        let check = self.gate.inspect().await;
        for (capability, status) in &check.statuses {
            observations.push(format!("runtime permission {}: {:?}", capability.as_str(), status));
        }
        observations.push(format!(
            "provider available: {}, authorized: {}",
            check.state.provider_available, check.state.provider_authorized
        ));
        errors.extend(check.errors);

        // Step 2: window scan
        let trace = self.scanner.scan_traced(self.metric_kinds).await;
        for attempt in &trace.attempts {
            match (attempt.point_count, &attempt.error) {
                (Some(count), _) => observations.push(format!(
                    "window {}: {} points",
                    attempt.window.label(),
                    count
                )),
                (None, Some(error)) => {
                    observations.push(format!("window {}: query failed", attempt.window.label()));
                    errors.push(format!("window {}: {}", attempt.window.label(), error));
                }
                (None, None) => {}
            }
        }
        if let Some(abort) = &trace.aborted {
            errors.push(format!("scan aborted: {}", abort));
        }

        let mut breakdown: BTreeMap<MetricKind, usize> =
            self.metric_kinds.iter().map(|kind| (*kind, 0)).collect();
        for reading in &trace.readings {
            *breakdown.entry(reading.kind).or_insert(0) += 1;
        }

        // Step 3: reconciliation
        let snapshot = if trace.readings.is_empty() {
            observations.push("no readings to reconcile".to_string());
            None
        } else {
            let snapshot = self.reconciler.reconcile(&trace.readings);
            observations.push(format!(
                "reconciled {} readings into {} metrics with values",
                trace.readings.len(),
                snapshot.present_count()
            ));
            Some(snapshot)
        };

        let data_available = snapshot.as_ref().is_some_and(HealthSnapshot::has_any_value);
        let success =
            data_available && check.state.provider_available && check.state.permissions_verified();

        info!(success, errors = errors.len(), "diagnostic run complete");

        DiagnosticReport {
            report_id: Uuid::new_v4(),
            generated_at: self.clock.now(),
            permission_state: check.state,
            windows_tried: trace.attempts,
            breakdown_by_metric: breakdown,
            snapshot,
            observations,
            errors,
            success,
        }
    }
}
