//! Core types for the reconciliation engine
//!
//! This module defines the data structures that flow between the components:
//! raw provider readings, reconciled per-metric snapshots, and the combined
//! permission state that gates every fetch.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Physiological metric reported by the health provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    HeartRate,
    BloodOxygen,
    ActiveEnergy,
    SleepDuration,
    Steps,
    Distance,
    Workout,
}

impl MetricKind {
    /// Every metric kind, in reporting order
    pub const ALL: [MetricKind; 7] = [
        MetricKind::HeartRate,
        MetricKind::BloodOxygen,
        MetricKind::ActiveEnergy,
        MetricKind::SleepDuration,
        MetricKind::Steps,
        MetricKind::Distance,
        MetricKind::Workout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::HeartRate => "heart_rate",
            MetricKind::BloodOxygen => "blood_oxygen",
            MetricKind::ActiveEnergy => "active_energy",
            MetricKind::SleepDuration => "sleep_duration",
            MetricKind::Steps => "steps",
            MetricKind::Distance => "distance",
            MetricKind::Workout => "workout",
        }
    }

    /// How multiple readings of this kind collapse into one value
    pub fn policy(&self) -> ReductionPolicy {
        match self {
            MetricKind::HeartRate | MetricKind::BloodOxygen | MetricKind::SleepDuration => {
                ReductionPolicy::LatestNonZero
            }
            MetricKind::ActiveEnergy | MetricKind::Steps | MetricKind::Distance => {
                ReductionPolicy::DailySum
            }
            MetricKind::Workout => ReductionPolicy::Latest,
        }
    }

    /// Unit the provider reports this kind in
    pub fn unit(&self) -> Unit {
        match self {
            MetricKind::HeartRate => Unit::Bpm,
            MetricKind::BloodOxygen => Unit::Percent,
            MetricKind::ActiveEnergy => Unit::Kcal,
            MetricKind::SleepDuration | MetricKind::Workout => Unit::Minutes,
            MetricKind::Steps => Unit::Count,
            MetricKind::Distance => Unit::Meters,
        }
    }

    /// True for kinds summed over the current calendar day
    pub fn is_cumulative(&self) -> bool {
        self.policy() == ReductionPolicy::DailySum
    }
}

/// Reduction rule applied per metric kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionPolicy {
    /// Most recent reading wins; zero-valued readings are discarded
    LatestNonZero,
    /// Most recent reading wins, whatever its value
    Latest,
    /// Sum of readings observed between local midnight and now
    DailySum,
}

/// Measurement unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Bpm,
    Percent,
    Kcal,
    Minutes,
    Count,
    Meters,
}

/// Contiguous time range, inclusive at both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range of the given length ending at `end`
    pub fn ending_at(end: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start: end - length,
            end,
        }
    }

    /// A zero-length range at a single instant
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Descriptive payload carried by workout readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDetail {
    /// Activity name (e.g. "running")
    pub activity: String,
    /// Session length (minutes)
    pub duration_minutes: f64,
    /// Energy burned during the session, when reported (kcal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_kcal: Option<f64>,
}

/// One provider-reported observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub kind: MetricKind,
    pub value: f64,
    pub unit: Unit,
    pub observed_at: DateTime<Utc>,
    pub recorded_interval: TimeRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<WorkoutDetail>,
}

impl Reading {
    /// Point reading in the kind's native unit
    pub fn new(kind: MetricKind, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            value,
            unit: kind.unit(),
            observed_at,
            recorded_interval: TimeRange::instant(observed_at),
            detail: None,
        }
    }

    pub fn with_interval(mut self, interval: TimeRange) -> Self {
        self.recorded_interval = interval;
        self
    }

    pub fn with_detail(mut self, detail: WorkoutDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Reconciled result for one metric kind.
///
/// The value and its timestamp are either both present or both absent; the
/// fields are private so the pairing cannot be broken after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricSnapshotRepr")]
pub struct MetricSnapshot {
    kind: MetricKind,
    value: Option<f64>,
    observed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<WorkoutDetail>,
}

impl MetricSnapshot {
    /// Snapshot for a metric with no qualifying readings
    pub fn absent(kind: MetricKind) -> Self {
        Self {
            kind,
            value: None,
            observed_at: None,
            detail: None,
        }
    }

    pub fn present(kind: MetricKind, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            value: Some(value),
            observed_at: Some(observed_at),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Option<WorkoutDetail>) -> Self {
        if self.value.is_some() {
            self.detail = detail;
        }
        self
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed_at
    }

    pub fn detail(&self) -> Option<&WorkoutDetail> {
        self.detail.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Deserialize)]
struct MetricSnapshotRepr {
    kind: MetricKind,
    value: Option<f64>,
    observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    detail: Option<WorkoutDetail>,
}

impl TryFrom<MetricSnapshotRepr> for MetricSnapshot {
    type Error = String;

    fn try_from(repr: MetricSnapshotRepr) -> Result<Self, Self::Error> {
        match (repr.value, repr.observed_at) {
            (Some(value), Some(at)) => {
                Ok(MetricSnapshot::present(repr.kind, value, at).with_detail(repr.detail))
            }
            (None, None) => Ok(MetricSnapshot::absent(repr.kind)),
            _ => Err(format!(
                "{}: value and observed_at must both be set or both be null",
                repr.kind.as_str()
            )),
        }
    }
}

/// Reconciled snapshot across all metric kinds.
///
/// Holds exactly one entry per [`MetricKind`]; kinds missing from serialized
/// input come back absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HealthSnapshotRepr")]
pub struct HealthSnapshot {
    metrics: BTreeMap<MetricKind, MetricSnapshot>,
}

#[derive(Deserialize)]
struct HealthSnapshotRepr {
    #[serde(default)]
    metrics: BTreeMap<MetricKind, MetricSnapshot>,
}

impl TryFrom<HealthSnapshotRepr> for HealthSnapshot {
    type Error = String;

    fn try_from(repr: HealthSnapshotRepr) -> Result<Self, Self::Error> {
        let mut snapshot = HealthSnapshot::empty();
        for (key, metric) in repr.metrics {
            if key != metric.kind() {
                return Err(format!(
                    "entry {} holds a {} snapshot",
                    key.as_str(),
                    metric.kind().as_str()
                ));
            }
            snapshot.insert(metric);
        }
        Ok(snapshot)
    }
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl HealthSnapshot {
    /// Snapshot with every kind absent
    pub fn empty() -> Self {
        Self {
            metrics: MetricKind::ALL
                .iter()
                .map(|kind| (*kind, MetricSnapshot::absent(*kind)))
                .collect(),
        }
    }

    /// Replace the entry for the snapshot's kind
    pub fn insert(&mut self, snapshot: MetricSnapshot) {
        self.metrics.insert(snapshot.kind(), snapshot);
    }

    pub fn get(&self, kind: MetricKind) -> Option<&MetricSnapshot> {
        self.metrics.get(&kind)
    }

    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.get(kind).and_then(MetricSnapshot::value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSnapshot> {
        self.metrics.values()
    }

    /// Entries carrying a value
    pub fn present(&self) -> impl Iterator<Item = &MetricSnapshot> {
        self.metrics.values().filter(|m| m.is_present())
    }

    pub fn present_count(&self) -> usize {
        self.present().count()
    }

    pub fn has_any_value(&self) -> bool {
        self.present().next().is_some()
    }

    /// At least one value is present and every present value is exactly zero
    pub fn all_present_zero(&self) -> bool {
        self.has_any_value() && self.present().all(|m| m.value() == Some(0.0))
    }
}

/// OS-level runtime capability the app needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ActivityRecognition,
    Location,
    BodySensors,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::ActivityRecognition,
        Capability::Location,
        Capability::BodySensors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ActivityRecognition => "activity_recognition",
            Capability::Location => "location",
            Capability::BodySensors => "body_sensors",
        }
    }
}

/// Runtime permission status as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Denied with "don't ask again"; requesting will not prompt
    Blocked,
    /// Restricted by policy (parental controls, MDM)
    Restricted,
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    /// Whether a request can still surface a prompt
    pub fn is_requestable(&self) -> bool {
        matches!(self, PermissionStatus::Denied | PermissionStatus::Undetermined)
    }
}

/// Combined runtime and provider permission state.
///
/// Always replaced as a whole after a check, never patched field by field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionState {
    pub runtime_granted: bool,
    pub provider_authorized: bool,
    pub provider_available: bool,
}

impl PermissionState {
    /// Runtime permissions and provider grant are both in place
    pub fn permissions_verified(&self) -> bool {
        self.runtime_granted && self.provider_authorized
    }

    pub fn is_ready(&self) -> bool {
        self.provider_available && self.permissions_verified()
    }
}
