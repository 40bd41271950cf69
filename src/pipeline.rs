//! Pipeline orchestration
//!
//! This module provides the public entry point of the engine. It wires the
//! components together for one fetch:
//!
//! 1. PermissionGate - runtime and provider permissions must be in place
//! 2. TimeWindowScanner - first non-empty look-back window
//! 3. MetricReconciler - one value per metric kind
//! 4. DataAvailabilityClassifier - snapshot or typed failure
//!
//! Failures that look like "nothing there" or a broken setup attach a
//! diagnostic report to the result.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classifier::DataAvailabilityClassifier;
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::diagnostics::{DiagnosticReport, DiagnosticRunner};
use crate::error::{FailureReason, VitalsError};
use crate::permissions::PermissionGate;
use crate::provider::{HealthProvider, PlatformPermissions};
use crate::reconciler::MetricReconciler;
use crate::scanner::TimeWindowScanner;
use crate::types::{HealthSnapshot, PermissionState};

/// Outcome of one fetch, with a diagnostic report on failure paths
#[derive(Debug, Clone)]
pub struct Fetch {
    pub result: Result<HealthSnapshot, FailureReason>,
    pub diagnostic: Option<DiagnosticReport>,
}

/// Outcome of a coordinated refresh
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Completed(Fetch),
    /// Another refresh is still running
    SkippedInProgress,
    /// Last refresh started too recently
    SkippedThrottled { retry_in: Duration },
    /// Finished after shutdown or after being superseded
    Discarded,
    /// Monitor has been shut down
    Inactive,
}

/// Health data monitor.
///
/// Holds one instance of every component, reused across fetches. Callers
/// that may overlap should go through [`refresh`](Self::refresh), which
/// serializes fetches and drops results that arrive after [`shutdown`](Self::shutdown).
pub struct HealthMonitor {
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    gate: PermissionGate,
    scanner: TimeWindowScanner,
    reconciler: MetricReconciler,
    in_progress: AtomicBool,
    active: AtomicBool,
    generation: AtomicU64,
    last_started: Mutex<Option<DateTime<Utc>>>,
}

/// Clears the in-progress flag even if the refresh future is dropped
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl HealthMonitor {
    pub fn new(
        provider: Arc<dyn HealthProvider>,
        platform: Arc<dyn PlatformPermissions>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Result<Self, VitalsError> {
        config.validate()?;
        let offset = config.utc_offset()?;

        Ok(Self {
            gate: PermissionGate::new(
                platform,
                provider.clone(),
                config.required_capabilities.clone(),
                config.metric_kinds.clone(),
            ),
            scanner: TimeWindowScanner::new(provider, clock.clone()),
            reconciler: MetricReconciler::new(clock.clone(), offset),
            clock,
            config,
            in_progress: AtomicBool::new(false),
            active: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            last_started: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn permission_gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Permission state from the latest check
    pub fn permission_state(&self) -> PermissionState {
        self.gate.current()
    }

    pub async fn get_snapshot(&self) -> Result<HealthSnapshot, FailureReason> {
        self.fetch().await.result
    }

    pub async fn get_diagnostic_report(&self) -> DiagnosticReport {
        DiagnosticRunner::new(
            &self.gate,
            &self.scanner,
            &self.reconciler,
            self.clock.as_ref(),
            &self.config.metric_kinds,
        )
        .run()
        .await
    }

    /// Fetch a snapshot, running diagnostics when the failure calls for it
    pub async fn fetch(&self) -> Fetch {
        let result = self.snapshot().await;

        let diagnostic = match &result {
            Err(reason) if reason.triggers_diagnostics() => {
                warn!(code = reason.code(), "fetch failed, running diagnostics");
                Some(self.get_diagnostic_report().await)
            }
            _ => None,
        };

        Fetch { result, diagnostic }
    }

    async fn snapshot(&self) -> Result<HealthSnapshot, FailureReason> {
        let permissions = self.gate.check_all().await;
        if !permissions.provider_available {
            return Err(FailureReason::ProviderUnavailable);
        }
        if !permissions.permissions_verified() {
            info!(?permissions, "permissions not granted, skipping scan");
            return Err(FailureReason::PermissionsNotGranted);
        }

        let trace = self.scanner.scan_traced(&self.config.metric_kinds).await;
        if let Some(abort) = trace.aborted {
            return Err(abort.into());
        }

        let snapshot = self.reconciler.reconcile(&trace.readings);
        let classified = DataAvailabilityClassifier::classify(snapshot, &self.gate.current());

        // No window answered at all: "no data" would be a guess
        let nothing_answered = trace.attempts.iter().all(|a| a.point_count.is_none());
        match classified {
            Err(FailureReason::NoDataInRange) if nothing_answered => {
                let detail = trace
                    .attempts
                    .last()
                    .and_then(|a| a.error.clone())
                    .unwrap_or_default();
                Err(FailureReason::Unknown(detail))
            }
            other => other,
        }
    }

    /// Fetch unless one is running, the last one is too recent, or the monitor is shut down
    pub async fn refresh(&self) -> RefreshOutcome {
        if !self.is_active() {
            return RefreshOutcome::Inactive;
        }
        if self.in_progress.swap(true, Ordering::SeqCst) {
            debug!("refresh already in progress");
            return RefreshOutcome::SkippedInProgress;
        }
        let _guard = InProgress(&self.in_progress);

        let now = self.clock.now();
        {
            let mut last_started = self
                .last_started
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let min_interval = Duration::from_secs(self.config.min_refresh_interval_secs);
            if let Some(last) = *last_started {
                // a clock that moved backwards counts as no time elapsed
                let elapsed = (now - last).to_std().unwrap_or_default();
                if elapsed < min_interval {
                    let retry_in = min_interval - elapsed;
                    debug!(?retry_in, "refresh throttled");
                    return RefreshOutcome::SkippedThrottled { retry_in };
                }
            }
            *last_started = Some(now);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let fetch = self.fetch().await;

        if !self.is_active() || self.generation.load(Ordering::SeqCst) != generation {
            info!("discarding refresh result delivered after shutdown");
            return RefreshOutcome::Discarded;
        }
        RefreshOutcome::Completed(fetch)
    }

    /// Stop accepting refreshes; results still in flight are discarded
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ProviderError;
    use crate::replay::{ReplayProvider, StaticPermissions};
    use crate::types::{Capability, MetricKind, PermissionStatus, Reading};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn monitor_with(
        provider: Arc<dyn HealthProvider>,
        platform: StaticPermissions,
        clock: Arc<dyn Clock>,
    ) -> HealthMonitor {
        HealthMonitor::new(provider, Arc::new(platform), clock, SyncConfig::default()).unwrap()
    }

    fn monitor(provider: ReplayProvider) -> HealthMonitor {
        monitor_with(
            Arc::new(provider),
            StaticPermissions::granted(),
            Arc::new(FixedClock(now())),
        )
    }

    /// Clock that can be moved forward between calls
    struct SteppingClock(Mutex<DateTime<Utc>>);

    impl SteppingClock {
        fn advance(&self, by: chrono::Duration) {
            let mut now = self.0.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Yields to the executor before every provider call
    struct YieldingProvider(ReplayProvider);

    #[async_trait]
    impl HealthProvider for YieldingProvider {
        async fn query_readings(
            &self,
            kinds: &[MetricKind],
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Reading>, ProviderError> {
            tokio::task::yield_now().await;
            self.0.query_readings(kinds, start, end).await
        }

        async fn request_authorization(&self, kinds: &[MetricKind]) -> Result<bool, ProviderError> {
            tokio::task::yield_now().await;
            self.0.request_authorization(kinds).await
        }
    }

    #[tokio::test]
    async fn test_zero_heart_rate_discarded_end_to_end() {
        let snapshot = monitor(ReplayProvider::new(vec![
            Reading::new(MetricKind::HeartRate, 72.0, at(15, 10)),
            Reading::new(MetricKind::HeartRate, 0.0, at(15, 11)),
        ]))
        .get_snapshot()
        .await
        .unwrap();

        let heart_rate = snapshot.get(MetricKind::HeartRate).unwrap();
        assert_eq!(heart_rate.value(), Some(72.0));
        assert_eq!(heart_rate.observed_at(), Some(at(15, 10)));
    }

    #[tokio::test]
    async fn test_steps_summed_for_today_end_to_end() {
        let snapshot = monitor(ReplayProvider::new(vec![
            Reading::new(MetricKind::Steps, 500.0, at(15, 8)),
            Reading::new(MetricKind::Steps, 300.0, at(15, 15)),
            Reading::new(MetricKind::Steps, 200.0, at(14, 20)),
        ]))
        .get_snapshot()
        .await
        .unwrap();

        assert_eq!(snapshot.value(MetricKind::Steps), Some(800.0));
    }

    #[tokio::test]
    async fn test_empty_windows_no_data_with_diagnostic() {
        let provider = Arc::new(ReplayProvider::new(Vec::new()));
        let monitor = monitor_with(
            provider.clone(),
            StaticPermissions::granted(),
            Arc::new(FixedClock(now())),
        );

        let fetch = monitor.fetch().await;

        assert_eq!(fetch.result, Err(FailureReason::NoDataInRange));
        let report = fetch.diagnostic.expect("diagnostic attached");
        assert!(!report.success);
        assert_eq!(report.windows_tried.len(), 4);
        // 4 windows for the fetch, 4 more for the diagnostic pass
        assert_eq!(provider.query_count(), 8);
    }

    #[tokio::test]
    async fn test_unavailable_provider_skips_scan() {
        let provider = Arc::new(
            ReplayProvider::new(Vec::new())
                .with_authorization(Err(ProviderError::Unavailable("not installed".to_string()))),
        );
        let monitor = monitor_with(
            provider.clone(),
            StaticPermissions::granted(),
            Arc::new(FixedClock(now())),
        );

        let fetch = monitor.fetch().await;

        assert_eq!(fetch.result, Err(FailureReason::ProviderUnavailable));
        assert!(fetch.diagnostic.is_some());
        assert!(!monitor.permission_state().provider_available);
    }

    #[tokio::test]
    async fn test_missing_runtime_permission_skips_scan() {
        let provider = Arc::new(ReplayProvider::new(vec![Reading::new(
            MetricKind::HeartRate,
            70.0,
            at(15, 9),
        )]));
        let monitor = monitor_with(
            provider.clone(),
            StaticPermissions::granted().set(Capability::ActivityRecognition, PermissionStatus::Denied),
            Arc::new(FixedClock(now())),
        );

        let fetch = monitor.fetch().await;

        assert_eq!(fetch.result, Err(FailureReason::PermissionsNotGranted));
        assert!(fetch.diagnostic.is_none());
        assert_eq!(provider.query_count(), 0);
    }

    #[tokio::test]
    async fn test_revoked_mid_scan() {
        let provider = ReplayProvider::new(Vec::new())
            .failing_queries(ProviderError::from_message("SecurityException: READ_HEART_RATE"));

        let result = monitor(provider).get_snapshot().await;

        assert_eq!(result, Err(FailureReason::PermissionsRevoked));
    }

    #[tokio::test]
    async fn test_zero_workout_only_is_all_zero() {
        let result = monitor(ReplayProvider::new(vec![
            Reading::new(MetricKind::Workout, 0.0, at(15, 7)),
            Reading::new(MetricKind::HeartRate, 0.0, at(15, 8)),
        ]))
        .get_snapshot()
        .await;

        assert_eq!(result, Err(FailureReason::DataAllZero));
    }

    #[tokio::test]
    async fn test_every_window_failing_is_unknown_with_detail() {
        let provider = ReplayProvider::new(Vec::new())
            .failing_queries(ProviderError::Query("RemoteException: binder died".to_string()));

        let fetch = monitor(provider).fetch().await;

        match fetch.result {
            Err(FailureReason::Unknown(detail)) => assert!(detail.contains("binder died")),
            other => panic!("expected unknown failure, got {other:?}"),
        }
        assert!(fetch.diagnostic.is_some());
    }

    #[tokio::test]
    async fn test_refresh_throttled_within_interval() {
        let clock = Arc::new(SteppingClock(Mutex::new(now())));
        let monitor = monitor_with(
            Arc::new(ReplayProvider::new(vec![Reading::new(
                MetricKind::Steps,
                100.0,
                now() - chrono::Duration::hours(1),
            )])),
            StaticPermissions::granted(),
            clock.clone(),
        );

        assert!(matches!(monitor.refresh().await, RefreshOutcome::Completed(_)));

        clock.advance(chrono::Duration::seconds(10));
        match monitor.refresh().await {
            RefreshOutcome::SkippedThrottled { retry_in } => {
                assert_eq!(retry_in, Duration::from_secs(20))
            }
            other => panic!("expected throttle, got {other:?}"),
        }

        clock.advance(chrono::Duration::seconds(20));
        assert!(matches!(monitor.refresh().await, RefreshOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_refresh_throttled_at_config_ceiling() {
        let clock = Arc::new(SteppingClock(Mutex::new(now())));
        let config = SyncConfig {
            min_refresh_interval_secs: crate::config::MAX_INTERVAL_SECS,
            ..Default::default()
        };
        let monitor = HealthMonitor::new(
            Arc::new(ReplayProvider::new(Vec::new())),
            Arc::new(StaticPermissions::granted()),
            clock.clone(),
            config,
        )
        .unwrap();

        assert!(matches!(monitor.refresh().await, RefreshOutcome::Completed(_)));
        clock.advance(chrono::Duration::hours(1));
        match monitor.refresh().await {
            RefreshOutcome::SkippedThrottled { retry_in } => {
                assert_eq!(retry_in, Duration::from_secs(23 * 60 * 60))
            }
            other => panic!("expected throttle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clock_moving_backwards_still_throttles() {
        let clock = Arc::new(SteppingClock(Mutex::new(now())));
        let monitor = monitor_with(
            Arc::new(ReplayProvider::new(Vec::new())),
            StaticPermissions::granted(),
            clock.clone(),
        );

        assert!(matches!(monitor.refresh().await, RefreshOutcome::Completed(_)));
        clock.advance(chrono::Duration::minutes(-5));
        assert!(matches!(
            monitor.refresh().await,
            RefreshOutcome::SkippedThrottled { .. }
        ));
    }

    #[test]
    fn test_oversized_refresh_interval_rejected() {
        let config = SyncConfig {
            min_refresh_interval_secs: u64::MAX,
            ..Default::default()
        };
        let result = HealthMonitor::new(
            Arc::new(ReplayProvider::new(Vec::new())),
            Arc::new(StaticPermissions::granted()),
            Arc::new(FixedClock(now())),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_overlapping_refresh_skipped() {
        let monitor = monitor_with(
            Arc::new(YieldingProvider(ReplayProvider::new(Vec::new()))),
            StaticPermissions::granted(),
            Arc::new(FixedClock(now())),
        );

        let (first, second) = tokio::join!(monitor.refresh(), monitor.refresh());

        assert!(matches!(first, RefreshOutcome::Completed(_)));
        assert!(matches!(second, RefreshOutcome::SkippedInProgress));
        assert!(!monitor.in_progress.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_result_after_shutdown_discarded() {
        let monitor = monitor_with(
            Arc::new(YieldingProvider(ReplayProvider::new(Vec::new()))),
            StaticPermissions::granted(),
            Arc::new(FixedClock(now())),
        );

        let (outcome, _) = tokio::join!(monitor.refresh(), async { monitor.shutdown() });

        assert!(matches!(outcome, RefreshOutcome::Discarded));
        assert!(matches!(monitor.refresh().await, RefreshOutcome::Inactive));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SyncConfig {
            metric_kinds: Vec::new(),
            ..Default::default()
        };
        let result = HealthMonitor::new(
            Arc::new(ReplayProvider::new(Vec::new())),
            Arc::new(StaticPermissions::granted()),
            Arc::new(FixedClock(now())),
            config,
        );
        assert!(result.is_err());
    }
}
